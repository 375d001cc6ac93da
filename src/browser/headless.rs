use std::path::Path;

use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::{AppError, AppResult, BrowserError};

/// 一个已启动的浏览器实例
pub struct LaunchedBrowser {
    pub browser: Browser,
    pub page: Page,
    /// 后台 CDP 事件处理任务，关闭浏览器时中止
    pub handler: JoinHandle<()>,
}

/// 启动浏览器（有头或无头）并打开空白页面
pub async fn launch_browser(config: &Config, headless: bool) -> AppResult<LaunchedBrowser> {
    info!("🚀 启动浏览器 (headless: {})...", headless);

    let mut builder = BrowserConfig::builder()
        .window_size(config.window_width, config.window_height)
        .args(config.browser_args.clone());
    builder = if headless {
        builder.new_headless_mode()
    } else {
        builder.with_head()
    };
    if let Some(executable) = &config.chrome_executable {
        builder = builder.chrome_executable(Path::new(executable));
    }

    let browser_config = builder.build().map_err(|reason| {
        error!("配置浏览器失败: {}", reason);
        AppError::Browser(BrowserError::ConfigurationFailed { reason })
    })?;

    let (browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| {
        error!("启动浏览器失败: {}", e);
        AppError::browser_launch_failed(e)
    })?;
    debug!("浏览器启动成功");

    // 在后台处理浏览器事件
    let handler = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    // 添加短暂延迟以等待浏览器状态同步
    sleep(Duration::from_millis(300)).await;

    let page = match browser.new_page("about:blank").await {
        Ok(page) => page,
        Err(e) => {
            error!("创建页面失败: {}", e);
            handler.abort();
            return Err(AppError::browser_launch_failed(e));
        }
    };
    debug!("空白页面已创建");

    Ok(LaunchedBrowser {
        browser,
        page,
        handler,
    })
}
