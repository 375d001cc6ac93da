//! 任务注册表
//!
//! 进程内全部测试和批次的唯一真相。读操作走共享锁，
//! 状态变更走独占锁，并且都经过 `TestJob` 的守卫方法。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    BatchCounts, BatchJob, BatchStatus, BatchView, Phase, Report, TestJob, TestJobView, TestStatus,
};

/// 各状态的测试数量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Default)]
pub struct JobRegistry {
    tests: RwLock<HashMap<Uuid, TestJob>>,
    batches: RwLock<HashMap<Uuid, BatchJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ========== 测试 ==========

    pub async fn insert_test(&self, job: TestJob) -> Uuid {
        let id = job.id;
        self.tests.write().await.insert(id, job);
        id
    }

    pub async fn test_view(&self, id: Uuid) -> Option<TestJobView> {
        self.tests.read().await.get(&id).map(TestJob::view)
    }

    pub async fn test_views(&self, ids: &[Uuid]) -> Vec<TestJobView> {
        let tests = self.tests.read().await;
        ids.iter().filter_map(|id| tests.get(id).map(TestJob::view)).collect()
    }

    pub async fn statuses(&self, ids: &[Uuid]) -> Vec<Option<TestStatus>> {
        let tests = self.tests.read().await;
        ids.iter().map(|id| tests.get(id).map(|t| t.status)).collect()
    }

    /// 按测试 ID 或报告 ID 查找报告
    pub async fn report(&self, id: Uuid) -> Option<Arc<Report>> {
        let tests = self.tests.read().await;
        if let Some(job) = tests.get(&id) {
            return job.report.clone();
        }
        tests
            .values()
            .filter_map(|t| t.report.as_ref())
            .find(|r| r.id == id)
            .cloned()
    }

    pub async fn cancel_token(&self, id: Uuid) -> Option<CancellationToken> {
        self.tests
            .read()
            .await
            .get(&id)
            .map(|t| t.cancel_token().clone())
    }

    pub async fn count_by_status(&self) -> StatusCounts {
        let tests = self.tests.read().await;
        let mut counts = StatusCounts::default();
        for job in tests.values() {
            match job.status {
                TestStatus::Pending => counts.pending += 1,
                TestStatus::Running => counts.running += 1,
                TestStatus::Completed => counts.completed += 1,
                TestStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    async fn with_test<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut TestJob) -> AppResult<T>,
    ) -> AppResult<T> {
        let mut tests = self.tests.write().await;
        let job = tests.get_mut(&id).ok_or_else(|| AppError::test_not_found(id))?;
        f(job)
    }

    pub async fn mark_running(&self, id: Uuid) -> AppResult<()> {
        self.with_test(id, |job| job.transition(TestStatus::Running))
            .await
    }

    /// 写入阶段进度，返回实际生效的进度
    pub async fn record_progress(
        &self,
        id: Uuid,
        phase: Phase,
        progress: u8,
        message: &str,
    ) -> AppResult<u8> {
        self.with_test(id, |job| job.record_progress(phase, progress, message))
            .await
    }

    pub async fn add_warning(&self, id: Uuid, warning: &str) -> AppResult<()> {
        self.with_test(id, |job| {
            job.warnings.push(warning.to_string());
            Ok(())
        })
        .await
    }

    pub async fn complete(&self, id: Uuid, report: Arc<Report>) -> AppResult<()> {
        self.with_test(id, |job| job.complete(report)).await
    }

    pub async fn fail(&self, id: Uuid, error: &str) -> AppResult<()> {
        self.with_test(id, |job| job.fail(error)).await
    }

    // ========== 批次 ==========

    pub async fn insert_batch(&self, batch: BatchJob) -> Uuid {
        let id = batch.id;
        self.batches.write().await.insert(id, batch);
        id
    }

    pub async fn batch_test_ids(&self, id: Uuid) -> Option<Vec<Uuid>> {
        self.batches
            .read()
            .await
            .get(&id)
            .map(|b| b.test_ids.clone())
    }

    pub async fn batch_view(&self, id: Uuid) -> Option<BatchView> {
        let batch = self.batches.read().await.get(&id).cloned()?;
        let tests = self.test_views(&batch.test_ids).await;
        Some(batch.view(tests))
    }

    /// 写入最新计数；批次已被清理时返回 None
    pub async fn update_batch(&self, id: Uuid, counts: BatchCounts) -> Option<BatchStatus> {
        self.batches
            .write()
            .await
            .get_mut(&id)
            .map(|b| b.apply_counts(counts))
    }

    pub async fn remove_batch(&self, id: Uuid) -> bool {
        self.batches.write().await.remove(&id).is_some()
    }
}
