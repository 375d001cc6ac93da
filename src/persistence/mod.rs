//! 持久化层
//!
//! 内存注册表是运行中测试的唯一真相；这里保存的是历史记录，
//! 用于重启后查询报告和列出历史。写入失败只记录警告。

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Report, Score, TestJobView, TestStatus};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// 重启恢复时写入的失败原因
pub const INTERRUPTED_BY_RESTART: &str = "interrupted by restart";

/// 一条持久化的测试记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRecord {
    pub test_id: Uuid,
    pub url: String,
    pub status: TestStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<Score>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<Uuid>,
    #[serde(skip)]
    pub report: Option<Report>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TestRecord {
    pub fn new(test_id: Uuid, url: &str, status: TestStatus) -> Self {
        let now = Utc::now();
        Self {
            test_id,
            url: url.to_string(),
            status,
            progress: 0,
            message: String::new(),
            error: None,
            score: None,
            duration_ms: None,
            report_id: None,
            report: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 转为与内存任务一致的轮询视图
    pub fn view(&self) -> TestJobView {
        TestJobView {
            test_id: self.test_id,
            status: self.status,
            progress: self.progress,
            message: self.message.clone(),
            phase: None,
            warnings: self
                .report
                .as_ref()
                .map(|r| r.warnings.clone())
                .unwrap_or_default(),
            error: self.error.clone(),
            batch_id: None,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// 持久化适配器
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    async fn create_test(&self, id: Uuid, url: &str, status: TestStatus) -> AppResult<()>;

    async fn update_status(
        &self,
        id: Uuid,
        status: TestStatus,
        progress: u8,
        message: &str,
    ) -> AppResult<()>;

    async fn complete(
        &self,
        id: Uuid,
        status: TestStatus,
        score: &Score,
        duration_ms: u64,
        report_id: Uuid,
        report: &Report,
    ) -> AppResult<()>;

    async fn fail(&self, id: Uuid, error: &str) -> AppResult<()>;

    async fn get(&self, id: Uuid) -> AppResult<Option<TestRecord>>;

    /// 按创建时间倒序列出
    async fn list(
        &self,
        status: Option<TestStatus>,
        limit: usize,
        offset: usize,
    ) -> AppResult<Vec<TestRecord>>;

    /// 把上一个进程遗留的 pending/running 记录标记为失败，返回处理条数
    async fn recover_interrupted(&self) -> AppResult<usize>;
}
