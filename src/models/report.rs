//! 测试证据与报告
//!
//! 截图、控制台日志、录屏摘要和评分，以及由它们汇总出的最终报告。

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 一张截图（PNG 原始字节）
#[derive(Clone)]
pub struct Screenshot {
    /// 截图所属阶段标签，例如 `initial`、`gameplay-3`、`final`
    pub phase_tag: String,
    pub png: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl Screenshot {
    pub fn new(phase_tag: impl Into<String>, png: Vec<u8>) -> Self {
        Self {
            phase_tag: phase_tag.into(),
            png,
            captured_at: Utc::now(),
        }
    }
}

impl fmt::Debug for Screenshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Screenshot")
            .field("phase_tag", &self.phase_tag)
            .field("bytes", &self.png.len())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

/// 报告中引用的截图（文件已落盘）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotRef {
    pub phase_tag: String,
    pub path: Option<PathBuf>,
    pub bytes: usize,
    pub captured_at: DateTime<Utc>,
}

/// 浏览器控制台日志条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// log / info / warn / error / exception
    pub level: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn is_error(&self) -> bool {
        matches!(self.level.as_str(), "error" | "exception")
    }
}

/// 游戏渲染方式，决定输入事件发往哪里
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// 画布渲染，按键发往 canvas
    Canvas,
    /// DOM 渲染，按键发往 window/body
    Dom,
}

/// 可玩性评分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    /// 0–100
    pub playability: u8,
    pub passed: bool,
    pub summary: String,
    #[serde(default)]
    pub issues: Vec<String>,
}

/// 录屏摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSummary {
    pub frame_count: usize,
    pub duration_ms: u64,
    pub path: Option<PathBuf>,
}

/// 最终测试报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: Uuid,
    pub test_id: Uuid,
    pub url: String,
    pub score: Score,
    pub render_mode: RenderMode,
    pub screenshots: Vec<ScreenshotRef>,
    pub console_logs: Vec<LogEntry>,
    pub video: Option<VideoSummary>,
    pub warnings: Vec<String>,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl Report {
    pub fn console_error_count(&self) -> usize {
        self.console_logs.iter().filter(|l| l.is_error()).count()
    }
}
