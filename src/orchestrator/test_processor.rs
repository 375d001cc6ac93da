//! 单个测试处理器 - 编排层
//!
//! ## 职责
//!
//! 1. **等待槽位**：排队票换执行槽位，等待期间可被取消
//! 2. **执行上限**：整个运行阶段套在 maxDuration 的超时里
//! 3. **panic 隔离**：流程 panic 只让本测试失败，槽位照常归还
//! 4. **状态落地**：终态写入注册表，再尽力写入持久化

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Phase, Report, TestStatus};
use crate::orchestrator::limiter::{ConcurrencyLimiter, PendingTicket};
use crate::orchestrator::registry::JobRegistry;
use crate::persistence::PersistenceAdapter;
use crate::workflow::{GameFlow, ProgressSink, TestCtx};

/// panic 时对外暴露的通用错误信息
pub const INTERNAL_ERROR_MESSAGE: &str = "internal error during test execution";

pub struct TestProcessor {
    registry: Arc<JobRegistry>,
    limiter: Arc<ConcurrencyLimiter>,
    persistence: Arc<dyn PersistenceAdapter>,
    flow: GameFlow,
}

impl TestProcessor {
    pub fn new(
        registry: Arc<JobRegistry>,
        limiter: Arc<ConcurrencyLimiter>,
        persistence: Arc<dyn PersistenceAdapter>,
        flow: GameFlow,
    ) -> Self {
        Self {
            registry,
            limiter,
            persistence,
            flow,
        }
    }

    /// 为一个已注册的测试启动执行任务
    pub fn spawn(
        self: &Arc<Self>,
        ctx: TestCtx,
        ticket: PendingTicket,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let processor = self.clone();
        tokio::spawn(async move { processor.process(ctx, ticket, cancel).await })
    }

    async fn process(&self, ctx: TestCtx, ticket: PendingTicket, cancel: CancellationToken) {
        let id = ctx.test_id;

        // ========== 等待槽位 ==========
        let slot = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.finish(&ctx, Err(AppError::Cancelled)).await;
                return;
            }
            acquired = self.limiter.acquire(ticket) => match acquired {
                Ok(slot) => slot,
                Err(e) => {
                    self.finish(&ctx, Err(e)).await;
                    return;
                }
            },
        };

        if let Err(e) = self.registry.mark_running(id).await {
            warn!("{} ⚠️ 无法进入运行状态: {}", ctx, e);
            return;
        }
        info!(
            "{} ▶️ 获得执行槽位 (运行中 {}/{})",
            ctx,
            self.limiter.in_use(),
            self.limiter.capacity()
        );
        best_effort(
            &ctx,
            "运行状态",
            self.persistence
                .update_status(id, TestStatus::Running, 0, "Test started"),
        )
        .await;

        // ========== 执行流程 ==========
        let sink = JobProgress {
            ctx: ctx.clone(),
            registry: self.registry.clone(),
            persistence: self.persistence.clone(),
        };
        let max_duration = ctx.request.max_duration;
        let run = AssertUnwindSafe(self.flow.run(&ctx, &sink)).catch_unwind();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            finished = timeout(ctx.request.max_duration(), run) => match finished {
                Err(_) => Err(AppError::Timeout(max_duration)),
                Ok(Err(panic)) => {
                    error!("{} 💥 测试流程 panic: {}", ctx, panic_message(panic.as_ref()));
                    Err(AppError::Other(INTERNAL_ERROR_MESSAGE.to_string()))
                }
                Ok(Ok(result)) => result,
            },
        };

        self.finish(&ctx, outcome).await;
        drop(slot);
    }

    async fn finish(&self, ctx: &TestCtx, outcome: AppResult<Report>) {
        let id = ctx.test_id;
        match outcome {
            Ok(report) => {
                let report = Arc::new(report);
                if let Err(e) = self.registry.complete(id, report.clone()).await {
                    warn!("{} ⚠️ 写入完成状态失败: {}", ctx, e);
                    return;
                }
                info!(
                    "{} ✅ 测试完成: {} 分, 耗时 {}ms",
                    ctx, report.score.playability, report.duration_ms
                );
                best_effort(
                    ctx,
                    "完成结果",
                    self.persistence.complete(
                        id,
                        TestStatus::Completed,
                        &report.score,
                        report.duration_ms,
                        report.id,
                        &report,
                    ),
                )
                .await;
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(e) = self.registry.fail(id, &message).await {
                    warn!("{} ⚠️ 写入失败状态失败: {}", ctx, e);
                    return;
                }
                error!("{} ❌ 测试失败: {}", ctx, message);
                best_effort(ctx, "失败结果", self.persistence.fail(id, &message)).await;
            }
        }
    }
}

/// 持久化写入失败只记录警告
async fn best_effort(ctx: &TestCtx, what: &str, write: impl Future<Output = AppResult<()>>) {
    if let Err(e) = write.await {
        warn!("{} ⚠️ 持久化{}失败: {}", ctx, what, e);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// 把流程阶段写入注册表（同步）和持久化（尽力）
struct JobProgress {
    ctx: TestCtx,
    registry: Arc<JobRegistry>,
    persistence: Arc<dyn PersistenceAdapter>,
}

impl JobProgress {
    fn id(&self) -> Uuid {
        self.ctx.test_id
    }
}

#[async_trait]
impl ProgressSink for JobProgress {
    async fn phase(&self, phase: Phase) {
        match self
            .registry
            .record_progress(self.id(), phase, phase.checkpoint(), phase.message())
            .await
        {
            Ok(progress) => {
                debug!("{} [{}%] {}", self.ctx, progress, phase.message());
                best_effort(
                    &self.ctx,
                    "进度",
                    self.persistence.update_status(
                        self.id(),
                        TestStatus::Running,
                        progress,
                        phase.message(),
                    ),
                )
                .await;
            }
            Err(e) => debug!("{} 忽略阶段更新 {:?}: {}", self.ctx, phase, e),
        }
    }

    async fn progress(&self, phase: Phase, progress: u8) {
        if let Err(e) = self
            .registry
            .record_progress(self.id(), phase, progress, phase.message())
            .await
        {
            debug!("{} 忽略进度更新: {}", self.ctx, e);
        }
    }

    async fn warning(&self, _phase: Phase, warning: &str) {
        if let Err(e) = self.registry.add_warning(self.id(), warning).await {
            debug!("{} 忽略警告记录: {}", self.ctx, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_extracts_payload() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(panic_message(payload.as_ref()), "kaboom");
        let payload: Box<dyn Any + Send> = Box::new(7u32);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
