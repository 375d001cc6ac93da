//! 批量测试监控 - 编排层
//!
//! ## 职责
//!
//! 批次本身不调度任何东西：每个 URL 都走普通的单测试提交流程。
//! 这里只为每个批次启动一个监控任务：
//!
//! 1. **定期汇总**：按固定间隔统计子测试的 completed / failed / running
//! 2. **判定终态**：全部结束后置为 `completed` 或 `completed_with_failures`
//! 3. **延迟清理**：交给 `RetentionScheduler` 在保留期后移除批次

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::models::BatchCounts;
use crate::orchestrator::registry::JobRegistry;
use crate::orchestrator::retention::RetentionScheduler;
use crate::utils::logging::log_batch_complete;
use crate::utils::short_id;

pub struct BatchMonitor {
    registry: Arc<JobRegistry>,
    retention: Arc<RetentionScheduler>,
    poll_interval: Duration,
    retention_window: Duration,
    shutdown: CancellationToken,
}

impl BatchMonitor {
    pub fn new(
        registry: Arc<JobRegistry>,
        retention: Arc<RetentionScheduler>,
        poll_interval: Duration,
        retention_window: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            retention,
            poll_interval,
            retention_window,
            shutdown,
        }
    }

    pub fn spawn(self: &Arc<Self>, batch_id: Uuid) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move { monitor.watch(batch_id).await })
    }

    async fn watch(&self, batch_id: Uuid) {
        let short = short_id(&batch_id);
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!("批次 {} 监控随程序退出", short);
                    return;
                }
                _ = ticker.tick() => {}
            }

            let Some(test_ids) = self.registry.batch_test_ids(batch_id).await else {
                debug!("批次 {} 已不存在，停止监控", short);
                return;
            };
            let counts = BatchCounts::tally(self.registry.statuses(&test_ids).await);

            match self.registry.update_batch(batch_id, counts).await {
                None => return,
                Some(status) if status.is_terminal() => {
                    log_batch_complete(&batch_id, counts.completed, counts.total);
                    self.retention.schedule(batch_id, self.retention_window);
                    return;
                }
                Some(_) => debug!(
                    "批次 {} 进度: 完成 {} / 失败 {} / 进行中 {}",
                    short, counts.completed, counts.failed, counts.running
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BatchJob, BatchStatus, TestJob, TestRequest};
    use tokio::time::sleep;

    fn job() -> TestJob {
        let request = TestRequest::new("https://example.com/game", None, true).unwrap();
        TestJob::new(request, None, &CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_settles_and_schedules_cleanup() {
        let registry = Arc::new(JobRegistry::new());
        let shutdown = CancellationToken::new();
        let retention = Arc::new(RetentionScheduler::new(registry.clone(), shutdown.clone()));
        let monitor = Arc::new(BatchMonitor::new(
            registry.clone(),
            retention.clone(),
            Duration::from_secs(2),
            Duration::from_secs(3600),
            shutdown,
        ));

        let a = registry.insert_test(job()).await;
        let b = registry.insert_test(job()).await;
        let batch_id = registry.insert_batch(BatchJob::new(Uuid::new_v4(), vec![a, b])).await;
        let handle = monitor.spawn(batch_id);

        registry.mark_running(a).await.unwrap();
        registry.fail(a, "navigation failed").await.unwrap();
        sleep(Duration::from_secs(3)).await;
        let view = registry.batch_view(batch_id).await.unwrap();
        assert_eq!(view.status, BatchStatus::Running);
        assert_eq!(view.failed_tests, 1);
        assert_eq!(view.running_tests, 1);

        registry.mark_running(b).await.unwrap();
        registry.fail(b, "timeout").await.unwrap();
        handle.await.unwrap();

        let view = registry.batch_view(batch_id).await.unwrap();
        assert_eq!(view.status, BatchStatus::CompletedWithFailures);
        assert_eq!(retention.pending(), 1);

        sleep(Duration::from_secs(3601)).await;
        assert!(registry.batch_view(batch_id).await.is_none());
    }
}
