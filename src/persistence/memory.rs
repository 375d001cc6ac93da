//! 内存存储（未配置数据库时使用，也用于测试）

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::error::{AppResult, PersistenceError};
use crate::models::{Report, Score, TestStatus};
use crate::persistence::{PersistenceAdapter, TestRecord, INTERRUPTED_BY_RESTART};

#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Uuid, TestRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F>(&self, id: Uuid, f: F) -> AppResult<()>
    where
        F: FnOnce(&mut TestRecord),
    {
        let mut records = self.records.write();
        let record = records.get_mut(&id).ok_or_else(|| PersistenceError::CorruptRecord {
            id: id.to_string(),
            reason: "record does not exist".to_string(),
        })?;
        f(record);
        record.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryStore {
    async fn create_test(&self, id: Uuid, url: &str, status: TestStatus) -> AppResult<()> {
        self.records
            .write()
            .insert(id, TestRecord::new(id, url, status));
        Ok(())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TestStatus,
        progress: u8,
        message: &str,
    ) -> AppResult<()> {
        let mut records = self.records.write();
        let record = records.get_mut(&id).ok_or_else(|| PersistenceError::CorruptRecord {
            id: id.to_string(),
            reason: "record does not exist".to_string(),
        })?;
        // 已结束的记录不再接受进度写入
        if record.status.is_terminal() {
            return Ok(());
        }
        record.status = status;
        record.progress = progress;
        record.message = message.to_string();
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn complete(
        &self,
        id: Uuid,
        status: TestStatus,
        score: &Score,
        duration_ms: u64,
        report_id: Uuid,
        report: &Report,
    ) -> AppResult<()> {
        self.update(id, |r| {
            r.status = status;
            r.progress = 100;
            r.message = "Test completed".to_string();
            r.score = Some(score.clone());
            r.duration_ms = Some(duration_ms);
            r.report_id = Some(report_id);
            r.report = Some(report.clone());
        })
    }

    async fn fail(&self, id: Uuid, error: &str) -> AppResult<()> {
        self.update(id, |r| {
            r.status = TestStatus::Failed;
            r.message = error.to_string();
            r.error = Some(error.to_string());
        })
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<TestRecord>> {
        Ok(self.records.read().get(&id).cloned())
    }

    async fn list(
        &self,
        status: Option<TestStatus>,
        limit: usize,
        offset: usize,
    ) -> AppResult<Vec<TestRecord>> {
        let records = self.records.read();
        let mut matching: Vec<&TestRecord> = records
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn recover_interrupted(&self) -> AppResult<usize> {
        let mut records = self.records.write();
        let now = Utc::now();
        let mut recovered = 0;
        for record in records.values_mut().filter(|r| !r.status.is_terminal()) {
            record.status = TestStatus::Failed;
            record.message = INTERRUPTED_BY_RESTART.to_string();
            record.error = Some(INTERRUPTED_BY_RESTART.to_string());
            record.updated_at = now;
            recovered += 1;
        }
        Ok(recovered)
    }
}
