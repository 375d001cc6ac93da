//! 报告生成 - 业务能力层
//!
//! 截图写入 `<artifacts>/<test_id>/`，报告本身同时保存为 `report.json`。

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    LogEntry, RenderMode, Report, Score, Screenshot, ScreenshotRef, TestRequest, VideoSummary,
};
use crate::services::contracts::{ReportBuilder, ReportBuilderFactory};

/// 按测试 ID 划分产物目录的报告工厂
pub struct ArtifactReportFactory {
    root: PathBuf,
}

impl ArtifactReportFactory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ReportBuilderFactory for ArtifactReportFactory {
    fn create(&self, test_id: Uuid, request: &TestRequest) -> Box<dyn ReportBuilder> {
        Box::new(ArtifactReportBuilder::new(
            test_id,
            request.url.clone(),
            self.artifacts_dir(test_id),
        ))
    }

    fn artifacts_dir(&self, test_id: Uuid) -> PathBuf {
        self.root.join(test_id.to_string())
    }
}

/// 累积单个测试证据的报告构建器
pub struct ArtifactReportBuilder {
    test_id: Uuid,
    url: String,
    dir: PathBuf,
    screenshots: Vec<Screenshot>,
    logs: Vec<LogEntry>,
    render_mode: RenderMode,
    video: Option<VideoSummary>,
    warnings: Vec<String>,
    score: Option<Score>,
    duration: Duration,
}

impl ArtifactReportBuilder {
    pub fn new(test_id: Uuid, url: String, dir: PathBuf) -> Self {
        Self {
            test_id,
            url,
            dir,
            screenshots: Vec::new(),
            logs: Vec::new(),
            render_mode: RenderMode::Dom,
            video: None,
            warnings: Vec::new(),
            score: None,
            duration: Duration::ZERO,
        }
    }

    async fn write_screenshots(&self) -> AppResult<Vec<ScreenshotRef>> {
        let mut refs = Vec::with_capacity(self.screenshots.len());
        for (idx, shot) in self.screenshots.iter().enumerate() {
            let path = self.dir.join(format!("{:02}-{}.png", idx, sanitize(&shot.phase_tag)));
            fs::write(&path, &shot.png).await?;
            refs.push(ScreenshotRef {
                phase_tag: shot.phase_tag.clone(),
                path: Some(path),
                bytes: shot.png.len(),
                captured_at: shot.captured_at,
            });
        }
        Ok(refs)
    }
}

#[async_trait]
impl ReportBuilder for ArtifactReportBuilder {
    fn add_screenshot(&mut self, screenshot: &Screenshot) {
        self.screenshots.push(screenshot.clone());
    }

    fn add_logs(&mut self, logs: &[LogEntry]) {
        self.logs.extend_from_slice(logs);
    }

    fn set_render_mode(&mut self, mode: RenderMode) {
        self.render_mode = mode;
    }

    fn set_video(&mut self, video: VideoSummary) {
        self.video = Some(video);
    }

    fn add_warning(&mut self, warning: &str) {
        self.warnings.push(warning.to_string());
    }

    fn set_score(&mut self, score: Score) {
        self.score = Some(score);
    }

    fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }

    async fn build(&mut self) -> AppResult<Report> {
        let score = self
            .score
            .take()
            .ok_or_else(|| AppError::Report("no score recorded".to_string()))?;

        fs::create_dir_all(&self.dir).await?;
        let screenshots = self.write_screenshots().await?;

        let report = Report {
            id: Uuid::new_v4(),
            test_id: self.test_id,
            url: self.url.clone(),
            score,
            render_mode: self.render_mode,
            screenshots,
            console_logs: std::mem::take(&mut self.logs),
            video: self.video.take(),
            warnings: std::mem::take(&mut self.warnings),
            duration_ms: self.duration.as_millis() as u64,
            created_at: Utc::now(),
        };

        let json = serde_json::to_vec_pretty(&report)?;
        fs::write(self.dir.join("report.json"), json).await?;
        debug!("报告已写入 {}", self.dir.display());

        Ok(report)
    }
}

fn sanitize(tag: &str) -> String {
    tag.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score() -> Score {
        Score {
            playability: 80,
            passed: true,
            summary: "responsive".to_string(),
            issues: vec![],
        }
    }

    #[tokio::test]
    async fn test_build_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let factory = ArtifactReportFactory::new(dir.path());
        let test_id = Uuid::new_v4();
        let request = TestRequest::new("https://example.com/game", None, true).unwrap();

        let mut builder = factory.create(test_id, &request);
        builder.add_screenshot(&Screenshot::new("initial", vec![1, 2, 3]));
        builder.add_screenshot(&Screenshot::new("gameplay/1", vec![4]));
        builder.add_warning("consent detection failed");
        builder.set_render_mode(RenderMode::Canvas);
        builder.set_score(score());
        builder.set_duration(Duration::from_millis(1500));

        let report = builder.build().await.unwrap();
        assert_eq!(report.test_id, test_id);
        assert_eq!(report.render_mode, RenderMode::Canvas);
        assert_eq!(report.duration_ms, 1500);
        assert_eq!(report.screenshots.len(), 2);
        assert_eq!(report.warnings, vec!["consent detection failed".to_string()]);

        let test_dir = factory.artifacts_dir(test_id);
        assert!(test_dir.join("report.json").exists());
        assert!(test_dir.join("00-initial.png").exists());
        assert!(test_dir.join("01-gameplay_1.png").exists());
    }

    #[tokio::test]
    async fn test_build_without_score_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder =
            ArtifactReportBuilder::new(Uuid::new_v4(), "https://example.com".into(), dir.path().into());
        let err = builder.build().await.unwrap_err();
        assert!(matches!(err, AppError::Report(_)));
    }
}
