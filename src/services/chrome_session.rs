//! Chromium 会话 - 业务能力层
//!
//! 每个测试启动一个独立的浏览器实例，会话结束时整个进程一起关闭。

use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::Browser;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::browser::{launch_browser, LaunchedBrowser};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::JsExecutor;
use crate::services::capture::{ChromeConsole, ChromeScreen};
use crate::services::contracts::{
    BrowserSession, ConsoleCapture, ScreenCapture, SessionLauncher, UiAutomation, VideoRecorder,
};
use crate::services::ui_automation::ChromeUi;
use crate::services::video_recorder::FrameRecorder;

/// 通过 chromiumoxide 启动会话
pub struct ChromeLauncher {
    config: Arc<Config>,
}

impl ChromeLauncher {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    async fn open(&self, headless: bool) -> AppResult<Box<dyn BrowserSession>> {
        let launched = launch_browser(&self.config, headless).await?;
        Ok(Box::new(ChromeSession::new(launched, self.config.video_fps)))
    }
}

/// 一个浏览器实例加一个页面
pub struct ChromeSession {
    browser: Mutex<Option<Browser>>,
    handler: Mutex<Option<JoinHandle<()>>>,
    executor: JsExecutor,
    video_fps: u32,
}

impl ChromeSession {
    pub fn new(launched: LaunchedBrowser, video_fps: u32) -> Self {
        let LaunchedBrowser {
            browser,
            page,
            handler,
        } = launched;
        Self {
            browser: Mutex::new(Some(browser)),
            handler: Mutex::new(Some(handler)),
            executor: JsExecutor::new(page),
            video_fps,
        }
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&self, url: &str) -> AppResult<()> {
        if self.browser.lock().await.is_none() {
            return Err(crate::error::BrowserError::SessionClosed.into());
        }
        debug!("导航到 {}", url);
        self.executor
            .page()
            .goto(url)
            .await
            .map_err(|e| AppError::navigation_failed(url, e))?;
        Ok(())
    }

    async fn close(&self) {
        if let Some(mut browser) = self.browser.lock().await.take() {
            if let Err(e) = browser.close().await {
                warn!("关闭浏览器失败: {}", e);
            }
            if let Err(e) = browser.wait().await {
                warn!("等待浏览器进程退出失败: {}", e);
            }
        }
        if let Some(handler) = self.handler.lock().await.take() {
            handler.abort();
        }
    }

    fn console_capture(&self) -> Box<dyn ConsoleCapture> {
        Box::new(ChromeConsole::new(self.executor.clone()))
    }

    fn ui_automation(&self) -> Box<dyn UiAutomation> {
        Box::new(ChromeUi::new(self.executor.clone()))
    }

    fn screen_capture(&self) -> Box<dyn ScreenCapture> {
        Box::new(ChromeScreen::new(self.executor.clone()))
    }

    fn video_recorder(&self) -> Box<dyn VideoRecorder> {
        Box::new(FrameRecorder::new(self.executor.clone(), self.video_fps))
    }
}
