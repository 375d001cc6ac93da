//! 业务能力层（Services）
//!
//! 每个服务描述"我能做什么"，只处理单个测试会话，不关心流程顺序。

pub mod capture;
pub mod chrome_session;
pub mod contracts;
pub mod llm_service;
pub mod report_builder;
pub mod ui_automation;
pub mod video_recorder;

use std::sync::Arc;

pub use capture::{ChromeConsole, ChromeScreen};
pub use chrome_session::{ChromeLauncher, ChromeSession};
pub use contracts::{
    BrowserSession, Collaborators, ConsoleCapture, Evaluator, ReportBuilder, ReportBuilderFactory,
    ScreenCapture, SessionLauncher, UiAutomation, VideoRecorder,
};
pub use llm_service::LlmEvaluator;
pub use report_builder::{ArtifactReportBuilder, ArtifactReportFactory};
pub use ui_automation::ChromeUi;
pub use video_recorder::FrameRecorder;

use crate::config::Config;

impl Collaborators {
    /// 生产环境的协作方：Chromium 会话、视觉模型评估、产物目录报告
    pub fn production(config: Arc<Config>) -> Self {
        Self {
            launcher: Arc::new(ChromeLauncher::new(config.clone())),
            evaluator: Arc::new(LlmEvaluator::new(&config)),
            reports: Arc::new(ArtifactReportFactory::new(config.artifacts_root())),
        }
    }
}
