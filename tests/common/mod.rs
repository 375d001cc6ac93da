//! 集成测试共用的假协作方

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use uuid::Uuid;

use game_qa_runner::error::{AppError, AppResult};
use game_qa_runner::models::{
    LogEntry, RenderMode, Report, Score, Screenshot, TestJobView, TestRequest, VideoSummary,
};
use game_qa_runner::persistence::{MemoryStore, PersistenceAdapter};
use game_qa_runner::services::{
    ArtifactReportFactory, BrowserSession, Collaborators, ConsoleCapture, Evaluator,
    ReportBuilder, ReportBuilderFactory, ScreenCapture, SessionLauncher, UiAutomation,
    VideoRecorder,
};
use game_qa_runner::{App, Config};

pub const UNREACHABLE_URL: &str = "https://unreachable.example.com/game";
pub const PANIC_URL: &str = "https://crash.example.com/game";
pub const HANG_URL: &str = "https://hang.example.com/game";

/// 假浏览器的行为开关
#[derive(Default)]
pub struct Scenario {
    pub unreachable: HashSet<String>,
    pub panics: HashSet<String>,
    pub hangs: HashSet<String>,
    /// 设置后每次导航都要先拿到一个许可
    pub gate: Option<Arc<Semaphore>>,
    pub open_error: bool,
    pub consent_error: bool,
    /// 阶段标签以这些前缀开头的截图会失败
    pub failing_shots: Vec<&'static str>,
    pub evaluator_error: bool,
    pub report_error: bool,
}

impl Scenario {
    pub fn standard() -> Self {
        Self {
            unreachable: [UNREACHABLE_URL.to_string()].into_iter().collect(),
            panics: [PANIC_URL.to_string()].into_iter().collect(),
            hangs: [HANG_URL.to_string()].into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::standard()
        }
    }
}

/// 统计会话的打开、关闭和并发峰值
#[derive(Default)]
pub struct Tracker {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub evaluated_images: AtomicUsize,
}

impl Tracker {
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

pub struct FakeLauncher {
    scenario: Arc<Scenario>,
    tracker: Arc<Tracker>,
}

#[async_trait]
impl SessionLauncher for FakeLauncher {
    async fn open(&self, _headless: bool) -> AppResult<Box<dyn BrowserSession>> {
        if self.scenario.open_error {
            return Err(AppError::browser_launch_failed("chrome binary not found"));
        }
        self.tracker.opened.fetch_add(1, Ordering::SeqCst);
        let active = self.tracker.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.tracker.max_active.fetch_max(active, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            scenario: self.scenario.clone(),
            tracker: self.tracker.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct FakeSession {
    scenario: Arc<Scenario>,
    tracker: Arc<Tracker>,
    closed: AtomicBool,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&self, url: &str) -> AppResult<()> {
        if let Some(gate) = &self.scenario.gate {
            gate.acquire()
                .await
                .expect("gate semaphore closed")
                .forget();
        }
        if self.scenario.hangs.contains(url) {
            std::future::pending::<()>().await;
        }
        if self.scenario.panics.contains(url) {
            panic!("renderer crashed");
        }
        if self.scenario.unreachable.contains(url) {
            return Err(AppError::navigation_failed(url, "net::ERR_NAME_NOT_RESOLVED"));
        }
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.tracker.closed.fetch_add(1, Ordering::SeqCst);
            self.tracker.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn console_capture(&self) -> Box<dyn ConsoleCapture> {
        Box::new(FakeConsole)
    }

    fn ui_automation(&self) -> Box<dyn UiAutomation> {
        Box::new(FakeUi {
            consent_error: self.scenario.consent_error,
        })
    }

    fn screen_capture(&self) -> Box<dyn ScreenCapture> {
        Box::new(FakeScreen {
            failing_shots: self.scenario.failing_shots.clone(),
        })
    }

    fn video_recorder(&self) -> Box<dyn VideoRecorder> {
        Box::new(FakeRecorder)
    }
}

struct FakeConsole;

#[async_trait]
impl ConsoleCapture for FakeConsole {
    async fn start(&self) -> AppResult<()> {
        Ok(())
    }

    async fn logs(&self) -> Vec<LogEntry> {
        vec![
            LogEntry {
                level: "log".to_string(),
                text: "game booted".to_string(),
                timestamp: Utc::now(),
            },
            LogEntry {
                level: "error".to_string(),
                text: "Failed to load sound.mp3".to_string(),
                timestamp: Utc::now(),
            },
        ]
    }
}

struct FakeUi {
    consent_error: bool,
}

#[async_trait]
impl UiAutomation for FakeUi {
    async fn accept_consent(&self) -> AppResult<bool> {
        if self.consent_error {
            return Err(AppError::Other("consent frame detached".to_string()));
        }
        Ok(false)
    }

    async fn click_start(&self) -> AppResult<bool> {
        Ok(true)
    }

    async fn detect_render_mode(&self) -> AppResult<RenderMode> {
        Ok(RenderMode::Canvas)
    }

    async fn send_key(&self, _key: &str) -> AppResult<bool> {
        Ok(true)
    }
}

struct FakeScreen {
    failing_shots: Vec<&'static str>,
}

#[async_trait]
impl ScreenCapture for FakeScreen {
    async fn capture(&self, phase_tag: &str) -> AppResult<Screenshot> {
        if self.failing_shots.iter().any(|p| phase_tag.starts_with(p)) {
            return Err(AppError::screenshot_failed(phase_tag, "target closed"));
        }
        Ok(Screenshot::new(phase_tag, vec![0x89, b'P', b'N', b'G']))
    }
}

struct FakeRecorder;

#[async_trait]
impl VideoRecorder for FakeRecorder {
    async fn start(&self) -> AppResult<()> {
        Ok(())
    }

    async fn stop(&self) -> AppResult<()> {
        Ok(())
    }

    fn frame_count(&self) -> usize {
        3
    }

    fn duration(&self) -> Duration {
        Duration::from_millis(1500)
    }

    async fn save_to(&self, dir: &Path) -> AppResult<PathBuf> {
        Ok(dir.to_path_buf())
    }
}

pub struct FakeEvaluator {
    tracker: Arc<Tracker>,
    fail: bool,
}

#[async_trait]
impl Evaluator for FakeEvaluator {
    async fn evaluate(&self, images: &[Screenshot], logs: &[LogEntry]) -> AppResult<Score> {
        self.tracker
            .evaluated_images
            .store(images.len(), Ordering::SeqCst);
        if self.fail {
            return Err(AppError::evaluator_failed("fake-vision", "rate limited"));
        }
        let errors = logs.iter().filter(|l| l.is_error()).count();
        Ok(Score {
            playability: 75,
            passed: true,
            summary: format!("responsive to input, {} console errors", errors),
            issues: vec![],
        })
    }
}

/// 包一层真实的报告工厂，可让 build 失败
pub struct FakeReports {
    inner: ArtifactReportFactory,
    fail_build: bool,
}

impl ReportBuilderFactory for FakeReports {
    fn create(&self, test_id: Uuid, request: &TestRequest) -> Box<dyn ReportBuilder> {
        let inner = self.inner.create(test_id, request);
        if self.fail_build {
            Box::new(FailingBuilder { inner })
        } else {
            inner
        }
    }

    fn artifacts_dir(&self, test_id: Uuid) -> PathBuf {
        self.inner.artifacts_dir(test_id)
    }
}

struct FailingBuilder {
    inner: Box<dyn ReportBuilder>,
}

#[async_trait]
impl ReportBuilder for FailingBuilder {
    fn add_screenshot(&mut self, screenshot: &Screenshot) {
        self.inner.add_screenshot(screenshot);
    }

    fn add_logs(&mut self, logs: &[LogEntry]) {
        self.inner.add_logs(logs);
    }

    fn set_render_mode(&mut self, mode: RenderMode) {
        self.inner.set_render_mode(mode);
    }

    fn set_video(&mut self, video: VideoSummary) {
        self.inner.set_video(video);
    }

    fn add_warning(&mut self, warning: &str) {
        self.inner.add_warning(warning);
    }

    fn set_score(&mut self, score: Score) {
        self.inner.set_score(score);
    }

    fn set_duration(&mut self, duration: Duration) {
        self.inner.set_duration(duration);
    }

    async fn build(&mut self) -> AppResult<Report> {
        Err(AppError::Report("artifact disk full".to_string()))
    }
}

/// 测试用的快节奏配置
pub fn fast_config(max_concurrent: usize) -> Config {
    Config {
        max_concurrent_tests: max_concurrent,
        max_pending_tests: 0,
        batch_poll_interval_ms: 50,
        batch_retention_secs: 3600,
        gameplay_duration_secs: 1,
        screenshot_interval_ms: 200,
        key_delay_ms: 50,
        settle_delay_ms: 10,
        load_wait_ms: 10,
        database_path: None,
        eval_max_images: 4,
        ..Config::default()
    }
}

pub struct Harness {
    pub app: Arc<App>,
    pub tracker: Arc<Tracker>,
    pub store: Arc<MemoryStore>,
    pub artifacts: TempDir,
}

impl Harness {
    pub fn new(config: Config, scenario: Scenario) -> Self {
        let artifacts = tempfile::tempdir().expect("tempdir");
        let tracker = Arc::new(Tracker::default());
        let evaluator_error = scenario.evaluator_error;
        let report_error = scenario.report_error;
        let store = Arc::new(MemoryStore::new());
        let config = Arc::new(Config {
            artifacts_dir: artifacts.path().display().to_string(),
            ..config
        });
        let collaborators = Collaborators {
            launcher: Arc::new(FakeLauncher {
                scenario: Arc::new(scenario),
                tracker: tracker.clone(),
            }),
            evaluator: Arc::new(FakeEvaluator {
                tracker: tracker.clone(),
                fail: evaluator_error,
            }),
            reports: Arc::new(FakeReports {
                inner: ArtifactReportFactory::new(config.artifacts_root()),
                fail_build: report_error,
            }),
        };
        let persistence: Arc<dyn PersistenceAdapter> = store.clone();
        let app = Arc::new(App::new(config, collaborators, persistence));
        Self {
            app,
            tracker,
            store,
            artifacts,
        }
    }

    pub fn standard(max_concurrent: usize) -> Self {
        Self::new(fast_config(max_concurrent), Scenario::standard())
    }
}

/// 轮询直到测试进入终态，顺带记录观察到的进度
pub async fn wait_terminal(app: &App, id: Uuid) -> (TestJobView, Vec<u8>) {
    let mut seen = Vec::new();
    let result = tokio::time::timeout(Duration::from_secs(15), async {
        loop {
            let view = app.get_test(id).await.expect("test exists");
            seen.push(view.progress);
            if view.status.is_terminal() {
                return view;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    (result.expect("test did not finish in time"), seen)
}

/// 轮询直到条件成立
pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
