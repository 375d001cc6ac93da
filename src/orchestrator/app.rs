//! 应用根对象 - 编排层
//!
//! 持有注册表、槽位限制器、清理调度器和持久化，对网关和命令行
//! 暴露全部操作。提交永远不等待执行槽位。

use std::sync::Arc;

use serde::Serialize;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{
    load_games, BatchJob, BatchRequest, BatchView, Report, TestJob, TestJobView, TestRequest,
    TestStatus, MAX_BATCH_URLS,
};
use crate::orchestrator::batch_processor::BatchMonitor;
use crate::orchestrator::limiter::{ConcurrencyLimiter, PendingTicket};
use crate::orchestrator::registry::JobRegistry;
use crate::orchestrator::retention::RetentionScheduler;
use crate::orchestrator::test_processor::TestProcessor;
use crate::persistence::{MemoryStore, PersistenceAdapter, SqliteStore};
use crate::services::Collaborators;
use crate::utils::logging::{log_batch_start, log_startup, print_final_stats};
use crate::workflow::{GameFlow, TestCtx};

/// 批量提交结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSubmission {
    pub batch_id: Uuid,
    pub test_ids: Vec<Uuid>,
}

/// 健康检查用的运行时快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub running_tests: usize,
    pub pending_tests: usize,
    pub max_concurrent: usize,
}

/// 命令行批量模式的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub success: usize,
    pub failed: usize,
    pub total: usize,
}

/// 应用主结构
pub struct App {
    config: Arc<Config>,
    registry: Arc<JobRegistry>,
    limiter: Arc<ConcurrencyLimiter>,
    persistence: Arc<dyn PersistenceAdapter>,
    processor: Arc<TestProcessor>,
    monitor: Arc<BatchMonitor>,
    shutdown: CancellationToken,
}

impl App {
    /// 用给定的协作方和存储组装应用
    pub fn new(
        config: Arc<Config>,
        collaborators: Collaborators,
        persistence: Arc<dyn PersistenceAdapter>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let registry = Arc::new(JobRegistry::new());
        let limiter = Arc::new(ConcurrencyLimiter::new(
            config.max_concurrent_tests,
            config.max_pending_tests,
        ));
        let retention = Arc::new(RetentionScheduler::new(registry.clone(), shutdown.clone()));
        let processor = Arc::new(TestProcessor::new(
            registry.clone(),
            limiter.clone(),
            persistence.clone(),
            GameFlow::new(collaborators, config.clone()),
        ));
        let monitor = Arc::new(BatchMonitor::new(
            registry.clone(),
            retention,
            config.batch_poll_interval(),
            config.batch_retention(),
            shutdown.clone(),
        ));

        Self {
            config,
            registry,
            limiter,
            persistence,
            processor,
            monitor,
            shutdown,
        }
    }

    /// 初始化生产环境的应用：打开存储、恢复遗留记录
    pub async fn initialize(config: Config) -> AppResult<Arc<Self>> {
        log_startup(&config);
        let config = Arc::new(config);

        let persistence: Arc<dyn PersistenceAdapter> = match &config.database_path {
            Some(path) => Arc::new(SqliteStore::open(path).await?),
            None => {
                info!("💾 未配置数据库，使用内存存储");
                Arc::new(MemoryStore::new())
            }
        };

        let app = Self::new(
            config.clone(),
            Collaborators::production(config),
            persistence,
        );
        app.recover().await;
        Ok(Arc::new(app))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn limiter(&self) -> &Arc<ConcurrencyLimiter> {
        &self.limiter
    }

    // ========== 提交 ==========

    /// 提交单个测试，立即返回测试 ID
    pub async fn submit_test(&self, request: TestRequest) -> AppResult<Uuid> {
        let mut tickets = self.limiter.reserve(1)?;
        let ticket = tickets
            .pop()
            .ok_or_else(|| AppError::Other("no pending ticket reserved".to_string()))?;
        Ok(self.enqueue(request, None, ticket).await)
    }

    /// 提交批量测试：每个 URL 独立排队，另起一个监控任务汇总
    pub async fn submit_batch(&self, batch: BatchRequest) -> AppResult<BatchSubmission> {
        let requests = batch.into_test_requests()?;
        self.submit_requests(requests).await
    }

    async fn submit_requests(&self, requests: Vec<TestRequest>) -> AppResult<BatchSubmission> {
        let tickets = self.limiter.reserve(requests.len())?;
        let batch_id = Uuid::new_v4();

        let mut test_ids = Vec::with_capacity(requests.len());
        for (request, ticket) in requests.into_iter().zip(tickets) {
            test_ids.push(self.enqueue(request, Some(batch_id), ticket).await);
        }

        self.registry
            .insert_batch(BatchJob::new(batch_id, test_ids.clone()))
            .await;
        self.monitor.spawn(batch_id);
        info!(
            "📦 批次 {} 已提交，共 {} 个测试",
            crate::utils::short_id(&batch_id),
            test_ids.len()
        );

        Ok(BatchSubmission { batch_id, test_ids })
    }

    async fn enqueue(
        &self,
        request: TestRequest,
        batch_id: Option<Uuid>,
        ticket: PendingTicket,
    ) -> Uuid {
        let job = TestJob::new(request.clone(), batch_id, &self.shutdown);
        let cancel = job.cancel_token().clone();
        let id = self.registry.insert_test(job).await;
        let ctx = TestCtx::new(id, batch_id, request);

        if let Err(e) = self
            .persistence
            .create_test(id, &ctx.request.url, TestStatus::Pending)
            .await
        {
            warn!("{} ⚠️ 持久化新测试失败: {}", ctx, e);
        }
        info!("{} 📥 已提交 {}", ctx, ctx.request.url);

        self.processor.spawn(ctx, ticket, cancel);
        id
    }

    // ========== 查询 ==========

    /// 内存中找不到时回退到持久化记录
    pub async fn get_test(&self, id: Uuid) -> AppResult<TestJobView> {
        if let Some(view) = self.registry.test_view(id).await {
            return Ok(view);
        }
        self.persistence
            .get(id)
            .await?
            .map(|record| record.view())
            .ok_or_else(|| AppError::test_not_found(id))
    }

    pub async fn get_batch(&self, id: Uuid) -> AppResult<BatchView> {
        self.registry
            .batch_view(id)
            .await
            .ok_or_else(|| AppError::batch_not_found(id))
    }

    /// `id` 可以是测试 ID 或报告 ID
    pub async fn get_report(&self, id: Uuid) -> AppResult<Arc<Report>> {
        if let Some(report) = self.registry.report(id).await {
            return Ok(report);
        }
        match self.persistence.get(id).await? {
            Some(record) => record
                .report
                .map(Arc::new)
                .ok_or_else(|| AppError::report_not_found(id)),
            None => Err(AppError::report_not_found(id)),
        }
    }

    /// 历史记录（持久化），按创建时间倒序
    pub async fn list_tests(
        &self,
        status: Option<TestStatus>,
        limit: usize,
        offset: usize,
    ) -> AppResult<Vec<TestJobView>> {
        let records = self.persistence.list(status, limit, offset).await?;
        Ok(records.iter().map(|r| r.view()).collect())
    }

    // ========== 控制 ==========

    /// 取消等待中或运行中的测试；已结束的测试返回冲突
    pub async fn cancel_test(&self, id: Uuid) -> AppResult<TestJobView> {
        let view = self
            .registry
            .test_view(id)
            .await
            .ok_or_else(|| AppError::test_not_found(id))?;
        if view.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "test {} is already {}",
                id, view.status
            )));
        }
        if let Some(token) = self.registry.cancel_token(id).await {
            token.cancel();
            info!("🛑 测试 {} 已请求取消", crate::utils::short_id(&id));
        }
        Ok(view)
    }

    /// 把上次进程遗留的未完成记录标记为失败
    pub async fn recover(&self) -> usize {
        match self.persistence.recover_interrupted().await {
            Ok(0) => 0,
            Ok(n) => {
                warn!("♻️ {} 个测试在上次退出时未完成，已标记为失败", n);
                n
            }
            Err(e) => {
                warn!("⚠️ 恢复遗留记录失败: {}", e);
                0
            }
        }
    }

    pub async fn health(&self) -> HealthSnapshot {
        let counts = self.registry.count_by_status().await;
        HealthSnapshot {
            running_tests: counts.running,
            pending_tests: counts.pending,
            max_concurrent: self.limiter.capacity(),
        }
    }

    /// 轮询直到批次进入终态
    pub async fn wait_for_batch(&self, id: Uuid) -> AppResult<BatchView> {
        loop {
            let view = self.get_batch(id).await?;
            if view.status.is_terminal() {
                return Ok(view);
            }
            if self.shutdown.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            sleep(self.config.batch_poll_interval()).await;
        }
    }

    /// 命令行模式：按每批 10 个提交游戏列表，逐批等待结束
    pub async fn run_batch_file(&self, path: &str) -> AppResult<RunSummary> {
        info!("\n📁 正在加载游戏列表...");
        let requests = load_games(path).await?;
        let mut summary = RunSummary {
            total: requests.len(),
            ..Default::default()
        };
        if requests.is_empty() {
            warn!("⚠️ 没有找到待测试的游戏，程序结束");
            return Ok(summary);
        }

        let total_batches = requests.len().div_ceil(MAX_BATCH_URLS);
        for (idx, chunk) in requests.chunks(MAX_BATCH_URLS).enumerate() {
            let start = idx * MAX_BATCH_URLS + 1;
            log_batch_start(
                idx + 1,
                total_batches,
                start,
                start + chunk.len() - 1,
                summary.total,
            );

            let submission = self.submit_requests(chunk.to_vec()).await?;
            let view = self.wait_for_batch(submission.batch_id).await?;
            summary.success += view.completed_tests;
            summary.failed += view.failed_tests;
        }

        print_final_stats(
            summary.success,
            summary.failed,
            summary.total,
            &self.config.artifacts_dir,
        );
        Ok(summary)
    }

    /// 取消所有测试和后台任务，等待中的测试立即失败
    pub fn shutdown(&self) {
        info!("👋 正在关闭，取消所有未完成的测试");
        self.shutdown.cancel();
        self.limiter.close();
    }
}
