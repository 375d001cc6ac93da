//! 协作方契约
//!
//! 流水线只通过这些 trait 使用浏览器、评估器和报告生成器。
//! 会话对象负责派生绑定到自身的控制台、界面、截图和录屏能力，
//! 每个测试独占一套实例，不在测试之间共享。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{LogEntry, RenderMode, Report, Score, Screenshot, TestRequest, VideoSummary};

/// 打开浏览器会话
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn open(&self, headless: bool) -> AppResult<Box<dyn BrowserSession>>;
}

/// 一个浏览器会话（一个浏览器实例 + 一个页面）
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn navigate(&self, url: &str) -> AppResult<()>;

    /// 关闭会话，失败只记录日志
    async fn close(&self);

    fn console_capture(&self) -> Box<dyn ConsoleCapture>;
    fn ui_automation(&self) -> Box<dyn UiAutomation>;
    fn screen_capture(&self) -> Box<dyn ScreenCapture>;
    fn video_recorder(&self) -> Box<dyn VideoRecorder>;
}

/// 控制台日志采集
#[async_trait]
pub trait ConsoleCapture: Send + Sync {
    async fn start(&self) -> AppResult<()>;
    async fn logs(&self) -> Vec<LogEntry>;
}

/// 页面交互
#[async_trait]
pub trait UiAutomation: Send + Sync {
    /// 点击 cookie 同意按钮，返回是否找到
    async fn accept_consent(&self) -> AppResult<bool>;
    /// 点击开始/Play 按钮，返回是否找到
    async fn click_start(&self) -> AppResult<bool>;
    async fn detect_render_mode(&self) -> AppResult<RenderMode>;
    /// 发送一个按键，返回是否送达
    async fn send_key(&self, key: &str) -> AppResult<bool>;
}

/// 截图
#[async_trait]
pub trait ScreenCapture: Send + Sync {
    async fn capture(&self, phase_tag: &str) -> AppResult<Screenshot>;
}

/// 录屏
#[async_trait]
pub trait VideoRecorder: Send + Sync {
    async fn start(&self) -> AppResult<()>;
    async fn stop(&self) -> AppResult<()>;
    fn frame_count(&self) -> usize;
    fn duration(&self) -> Duration;
    /// 把录制内容写入 `dir`，返回实际保存位置
    async fn save_to(&self, dir: &Path) -> AppResult<PathBuf>;
}

/// 可玩性评估
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, images: &[Screenshot], logs: &[LogEntry]) -> AppResult<Score>;
}

/// 报告构建器：流水线逐步累积证据，最后生成报告
#[async_trait]
pub trait ReportBuilder: Send {
    fn add_screenshot(&mut self, screenshot: &Screenshot);
    fn add_logs(&mut self, logs: &[LogEntry]);
    fn set_render_mode(&mut self, mode: RenderMode);
    fn set_video(&mut self, video: VideoSummary);
    fn add_warning(&mut self, warning: &str);
    fn set_score(&mut self, score: Score);
    fn set_duration(&mut self, duration: Duration);
    /// 生成报告；每个构建器只调用一次
    async fn build(&mut self) -> AppResult<Report>;
}

/// 每个测试创建一个新的报告构建器
pub trait ReportBuilderFactory: Send + Sync {
    fn create(&self, test_id: Uuid, request: &TestRequest) -> Box<dyn ReportBuilder>;

    /// 该测试的产物目录（录屏等也写在这里）
    fn artifacts_dir(&self, test_id: Uuid) -> PathBuf;
}

/// 流水线依赖的全部协作方
#[derive(Clone)]
pub struct Collaborators {
    pub launcher: Arc<dyn SessionLauncher>,
    pub evaluator: Arc<dyn Evaluator>,
    pub reports: Arc<dyn ReportBuilderFactory>,
}
