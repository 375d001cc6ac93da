//! 截图与控制台采集 - 业务能力层

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::JsExecutor;
use crate::models::{LogEntry, Screenshot};
use crate::services::contracts::{ConsoleCapture, ScreenCapture};

/// 截图服务
pub struct ChromeScreen {
    executor: JsExecutor,
}

impl ChromeScreen {
    pub fn new(executor: JsExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl ScreenCapture for ChromeScreen {
    async fn capture(&self, phase_tag: &str) -> AppResult<Screenshot> {
        let png = self
            .executor
            .screenshot_png()
            .await
            .map_err(|e| AppError::screenshot_failed(phase_tag, e.to_string()))?;
        debug!("截图 {} ({} 字节)", phase_tag, png.len());
        Ok(Screenshot::new(phase_tag, png))
    }
}

/// 注入页面的控制台钩子，日志缓存在 `window.__gameQaLogs`
const CONSOLE_HOOK_JS: &str = r#"
(() => {
    if (window.__gameQaLogs) return;
    window.__gameQaLogs = [];
    const push = (level, args) => {
        try {
            const text = Array.from(args).map((a) => {
                if (a instanceof Error) return a.stack || a.message;
                if (typeof a === 'object') { try { return JSON.stringify(a); } catch (_) { return String(a); } }
                return String(a);
            }).join(' ');
            window.__gameQaLogs.push({ level, text, ts: Date.now() });
            if (window.__gameQaLogs.length > 1000) window.__gameQaLogs.shift();
        } catch (_) {}
    };
    for (const level of ['log', 'info', 'warn', 'error']) {
        const original = console[level];
        console[level] = function (...args) {
            push(level, args);
            return original.apply(console, args);
        };
    }
    window.addEventListener('error', (e) => push('exception', [e.message + ' @ ' + e.filename + ':' + e.lineno]));
    window.addEventListener('unhandledrejection', (e) => push('exception', ['unhandled rejection: ' + (e.reason && (e.reason.stack || e.reason))]));
})()
"#;

#[derive(Debug, Deserialize)]
struct RawLog {
    level: String,
    text: String,
    /// 毫秒时间戳
    ts: f64,
}

impl RawLog {
    fn into_entry(self) -> LogEntry {
        let timestamp: DateTime<Utc> = Utc
            .timestamp_millis_opt(self.ts as i64)
            .single()
            .unwrap_or_else(Utc::now);
        LogEntry {
            level: self.level,
            text: self.text,
            timestamp,
        }
    }
}

/// 控制台日志采集
pub struct ChromeConsole {
    executor: JsExecutor,
}

impl ChromeConsole {
    pub fn new(executor: JsExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl ConsoleCapture for ChromeConsole {
    async fn start(&self) -> AppResult<()> {
        // 之后每次导航都会重新注入，当前页面也立即挂上
        self.executor.eval_on_new_document(CONSOLE_HOOK_JS).await?;
        self.executor.eval(CONSOLE_HOOK_JS).await?;
        Ok(())
    }

    async fn logs(&self) -> Vec<LogEntry> {
        match self
            .executor
            .eval_as::<Option<Vec<RawLog>>>("window.__gameQaLogs || null")
            .await
        {
            Ok(Some(raw)) => raw.into_iter().map(RawLog::into_entry).collect(),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("读取控制台日志失败: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_log_keeps_level_and_time() {
        let raw: Vec<RawLog> = serde_json::from_str(
            r#"[{"level":"error","text":"Uncaught TypeError","ts":1700000000000}]"#,
        )
        .unwrap();
        let entry = raw.into_iter().next().unwrap().into_entry();
        assert!(entry.is_error());
        assert_eq!(entry.timestamp.timestamp_millis(), 1_700_000_000_000);
    }
}
