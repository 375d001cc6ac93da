//! 单个测试任务
//!
//! `TestRequest` 是提交后不可变的请求；`TestJob` 是注册表持有的可变记录，
//! 状态迁移和进度更新都必须经过这里的守卫方法。

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{AppError, AppResult, ValidationError};
use crate::models::report::Report;

/// 未指定 maxDuration 时的默认值（秒）
pub const DEFAULT_MAX_DURATION_SECS: u64 = 60;
/// maxDuration 允许的最大值（秒）
pub const MAX_DURATION_LIMIT_SECS: u64 = 3_600;

/// 测试请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRequest {
    pub url: String,
    /// 秒
    pub max_duration: u64,
    pub headless: bool,
}

impl TestRequest {
    /// 校验并创建请求
    pub fn new(url: &str, max_duration: Option<u64>, headless: bool) -> AppResult<Self> {
        let url = validate_url(url)?;
        let max_duration = max_duration.unwrap_or(DEFAULT_MAX_DURATION_SECS);
        if max_duration == 0 || max_duration > MAX_DURATION_LIMIT_SECS {
            return Err(ValidationError::MaxDurationOutOfRange {
                value: max_duration,
                max: MAX_DURATION_LIMIT_SECS,
            }
            .into());
        }
        Ok(Self {
            url,
            max_duration,
            headless,
        })
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration)
    }
}

fn validate_url(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingUrl);
    }
    let parsed = url::Url::parse(trimmed).map_err(|e| ValidationError::InvalidUrl {
        url: trimmed.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ValidationError::UnsupportedScheme {
            url: trimmed.to_string(),
        });
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ValidationError::InvalidUrl {
            url: trimmed.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// 测试状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Pending => "pending",
            TestStatus::Running => "running",
            TestStatus::Completed => "completed",
            TestStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TestStatus::Completed | TestStatus::Failed)
    }

    /// 状态迁移表
    ///
    /// pending → running → {completed, failed}；
    /// pending → failed 用于等待槽位时被取消或重启恢复。
    pub fn can_transition_to(&self, next: TestStatus) -> bool {
        matches!(
            (self, next),
            (TestStatus::Pending, TestStatus::Running)
                | (TestStatus::Pending, TestStatus::Failed)
                | (TestStatus::Running, TestStatus::Completed)
                | (TestStatus::Running, TestStatus::Failed)
        )
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(TestStatus::Pending),
            "running" => Ok(TestStatus::Running),
            "completed" => Ok(TestStatus::Completed),
            "failed" => Ok(TestStatus::Failed),
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

/// 游戏操作阶段的起止进度
pub const GAMEPLAY_PROGRESS_START: u8 = 65;
pub const GAMEPLAY_PROGRESS_END: u8 = 80;

/// 执行流水线阶段，严格按声明顺序推进
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Pending,
    Initializing,
    Navigating,
    CapturingInitial,
    HandlingConsent,
    Starting,
    AwaitingLoad,
    DetectingRenderMode,
    RecordingGameplay,
    CapturingFinal,
    CollectingLogs,
    Evaluating,
    BuildingReport,
    Completed,
    Failed,
}

impl Phase {
    /// 进入该阶段时写入的进度检查点
    pub fn checkpoint(&self) -> u8 {
        match self {
            Phase::Pending => 0,
            Phase::Initializing => 10,
            Phase::Navigating => 20,
            Phase::CapturingInitial => 30,
            Phase::HandlingConsent => 40,
            Phase::Starting => 50,
            Phase::AwaitingLoad => 55,
            Phase::DetectingRenderMode => 60,
            Phase::RecordingGameplay => GAMEPLAY_PROGRESS_START,
            Phase::CapturingFinal => 85,
            Phase::CollectingLogs => 88,
            Phase::Evaluating => 90,
            Phase::BuildingReport => 95,
            Phase::Completed => 100,
            // 失败时保留最后的进度
            Phase::Failed => 0,
        }
    }

    /// 轮询方看到的阶段描述
    pub fn message(&self) -> &'static str {
        match self {
            Phase::Pending => "Waiting for a free browser slot",
            Phase::Initializing => "Launching browser session",
            Phase::Navigating => "Navigating to game",
            Phase::CapturingInitial => "Capturing initial screenshot",
            Phase::HandlingConsent => "Handling cookie consent",
            Phase::Starting => "Starting game",
            Phase::AwaitingLoad => "Waiting for game to load",
            Phase::DetectingRenderMode => "Detecting render mode",
            Phase::RecordingGameplay => "Playing game and recording",
            Phase::CapturingFinal => "Capturing final screenshot",
            Phase::CollectingLogs => "Collecting console logs",
            Phase::Evaluating => "Evaluating playability",
            Phase::BuildingReport => "Building report",
            Phase::Completed => "Test completed",
            Phase::Failed => "Test failed",
        }
    }

    /// 游戏操作阶段内按已用时间线性插值的进度
    pub fn gameplay_progress(elapsed: Duration, total: Duration) -> u8 {
        let span = (GAMEPLAY_PROGRESS_END - GAMEPLAY_PROGRESS_START) as f64;
        let ratio = if total.is_zero() {
            1.0
        } else {
            (elapsed.as_secs_f64() / total.as_secs_f64()).clamp(0.0, 1.0)
        };
        GAMEPLAY_PROGRESS_START + (span * ratio).floor() as u8
    }
}

/// 测试任务记录
#[derive(Debug, Clone)]
pub struct TestJob {
    pub id: Uuid,
    pub request: TestRequest,
    pub batch_id: Option<Uuid>,
    pub status: TestStatus,
    pub phase: Phase,
    pub progress: u8,
    pub message: String,
    pub warnings: Vec<String>,
    pub report: Option<Arc<Report>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    cancel: CancellationToken,
}

impl TestJob {
    /// 创建 pending 任务，取消句柄派生自 `parent`
    pub fn new(request: TestRequest, batch_id: Option<Uuid>, parent: &CancellationToken) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            request,
            batch_id,
            status: TestStatus::Pending,
            phase: Phase::Pending,
            progress: 0,
            message: Phase::Pending.message().to_string(),
            warnings: Vec::new(),
            report: None,
            error: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            cancel: parent.child_token(),
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// 受迁移表保护的状态变更
    pub fn transition(&mut self, next: TestStatus) -> AppResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        if next == TestStatus::Running {
            self.started_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// 记录阶段进度；进度只增不减，终态后拒绝写入
    pub fn record_progress(&mut self, phase: Phase, progress: u8, message: &str) -> AppResult<u8> {
        if self.status != TestStatus::Running {
            return Err(AppError::Conflict(format!(
                "test {} is {}, progress can only be recorded while running",
                self.id, self.status
            )));
        }
        if phase < self.phase {
            return Err(AppError::Conflict(format!(
                "phase {:?} would move test {} backwards from {:?}",
                phase, self.id, self.phase
            )));
        }
        self.phase = phase;
        self.progress = self.progress.max(progress.min(100));
        self.message = message.to_string();
        self.updated_at = Utc::now();
        Ok(self.progress)
    }

    pub fn complete(&mut self, report: Arc<Report>) -> AppResult<()> {
        self.transition(TestStatus::Completed)?;
        self.phase = Phase::Completed;
        self.progress = 100;
        self.message = Phase::Completed.message().to_string();
        self.report = Some(report);
        Ok(())
    }

    pub fn fail(&mut self, error: &str) -> AppResult<()> {
        self.transition(TestStatus::Failed)?;
        self.phase = Phase::Failed;
        self.message = error.to_string();
        self.error = Some(error.to_string());
        Ok(())
    }

    pub fn view(&self) -> TestJobView {
        TestJobView {
            test_id: self.id,
            status: self.status,
            progress: self.progress,
            message: self.message.clone(),
            phase: Some(self.phase),
            warnings: self.warnings.clone(),
            error: self.error.clone(),
            batch_id: self.batch_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// 轮询接口返回的任务视图
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestJobView {
    pub test_id: Uuid,
    pub status: TestStatus,
    pub progress: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
