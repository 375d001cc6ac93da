//! 游戏测试流程 - 流程层
//!
//! 核心职责：定义"一个游戏"的完整测试流程
//!
//! 流程顺序：
//! 1. 打开会话 → 导航 → 初始截图
//! 2. cookie 同意 → 点击开始 → 等待加载 → 判断渲染方式
//! 3. 操作游戏并录屏、采样截图
//! 4. 最终截图 → 收集日志 → 评估 → 生成报告
//!
//! 硬失败直接返回错误；软失败记录警告后按约定的兜底继续。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::AppResult;
use crate::models::test_job::GAMEPLAY_PROGRESS_END;
use crate::models::{Phase, RenderMode, Report, Screenshot, VideoSummary};
use crate::services::contracts::{
    BrowserSession, Collaborators, ReportBuilder, ScreenCapture, UiAutomation,
};
use crate::workflow::progress::ProgressSink;
use crate::workflow::test_ctx::TestCtx;

/// 画布游戏的按键序列
const CANVAS_KEYS: &[&str] = &["ArrowUp", "ArrowRight", "ArrowDown", "ArrowLeft", " ", "Enter"];
/// DOM 游戏的按键序列
const DOM_KEYS: &[&str] = &["ArrowRight", "ArrowLeft", "ArrowUp", "ArrowDown", "Enter", " "];

fn action_keys(mode: RenderMode) -> &'static [&'static str] {
    match mode {
        RenderMode::Canvas => CANVAS_KEYS,
        RenderMode::Dom => DOM_KEYS,
    }
}

/// 游戏测试流程
///
/// - 编排单个测试的全部阶段
/// - 决定哪些失败是硬失败、哪些只记警告
/// - 不持有会话以外的资源，不关心槽位和注册表
pub struct GameFlow {
    collaborators: Collaborators,
    config: Arc<Config>,
}

impl GameFlow {
    pub fn new(collaborators: Collaborators, config: Arc<Config>) -> Self {
        Self {
            collaborators,
            config,
        }
    }

    /// 执行完整流程；会话一旦打开，在任何退出路径上都会关闭
    pub async fn run(&self, ctx: &TestCtx, progress: &dyn ProgressSink) -> AppResult<Report> {
        progress.phase(Phase::Initializing).await;
        info!("{} 🚀 启动浏览器会话 (headless: {})", ctx, ctx.request.headless);
        let session = SessionGuard::new(
            self.collaborators.launcher.open(ctx.request.headless).await?,
        );

        let result = self.drive(ctx, session.get(), progress).await;
        session.close().await;
        result
    }

    async fn drive(
        &self,
        ctx: &TestCtx,
        session: &dyn BrowserSession,
        progress: &dyn ProgressSink,
    ) -> AppResult<Report> {
        let started = Instant::now();
        let waits = self.config.phase_waits(ctx.request.max_duration());
        let mut builder = self.collaborators.reports.create(ctx.test_id, &ctx.request);

        let console = session.console_capture();
        if let Err(e) = console.start().await {
            soft_fail(
                ctx,
                progress,
                &mut *builder,
                Phase::Initializing,
                format!("console capture unavailable: {}", e),
            )
            .await;
        }

        // ========== 导航 ==========
        progress.phase(Phase::Navigating).await;
        info!("{} 🌐 打开 {}", ctx, ctx.request.url);
        session.navigate(&ctx.request.url).await?;
        sleep(waits.settle).await;

        progress.phase(Phase::CapturingInitial).await;
        let screen = session.screen_capture();
        let initial = screen.capture("initial").await?;
        builder.add_screenshot(&initial);

        // ========== 进入游戏 ==========
        progress.phase(Phase::HandlingConsent).await;
        let ui = session.ui_automation();
        match ui.accept_consent().await {
            Ok(true) => {
                info!("{} ✓ 已接受 cookie 同意", ctx);
                sleep(waits.settle).await;
            }
            Ok(false) => debug!("{} 未发现 cookie 同意弹窗", ctx),
            Err(e) => {
                soft_fail(
                    ctx,
                    progress,
                    &mut *builder,
                    Phase::HandlingConsent,
                    format!("consent handling failed: {}", e),
                )
                .await;
            }
        }

        progress.phase(Phase::Starting).await;
        match ui.click_start().await {
            Ok(true) => info!("{} ▶️ 已点击开始按钮", ctx),
            Ok(false) => info!("{} 未找到开始按钮，假定游戏自动开始", ctx),
            Err(e) => {
                soft_fail(
                    ctx,
                    progress,
                    &mut *builder,
                    Phase::Starting,
                    format!("start button detection failed: {}", e),
                )
                .await;
            }
        }

        progress.phase(Phase::AwaitingLoad).await;
        sleep(waits.load).await;

        progress.phase(Phase::DetectingRenderMode).await;
        let mode = match ui.detect_render_mode().await {
            Ok(mode) => mode,
            Err(e) => {
                soft_fail(
                    ctx,
                    progress,
                    &mut *builder,
                    Phase::DetectingRenderMode,
                    format!("render mode detection failed, assuming dom: {}", e),
                )
                .await;
                RenderMode::Dom
            }
        };
        info!("{} 🖼️ 渲染方式: {:?}", ctx, mode);
        builder.set_render_mode(mode);

        // ========== 游戏操作 ==========
        progress.phase(Phase::RecordingGameplay).await;
        let samples = self
            .play(ctx, session, progress, ui.as_ref(), screen.as_ref(), &mut *builder, mode)
            .await;

        // ========== 收尾 ==========
        progress.phase(Phase::CapturingFinal).await;
        let final_shot = screen.capture("final").await?;
        builder.add_screenshot(&final_shot);

        progress.phase(Phase::CollectingLogs).await;
        let logs = console.logs().await;
        let error_count = logs.iter().filter(|l| l.is_error()).count();
        info!("{} 📋 收集到 {} 条控制台日志（错误 {} 条）", ctx, logs.len(), error_count);
        builder.add_logs(&logs);

        progress.phase(Phase::Evaluating).await;
        let images = select_images(&initial, &samples, &final_shot, self.config.eval_max_images);
        let score = self.collaborators.evaluator.evaluate(&images, &logs).await?;
        info!(
            "{} 🤖 评估完成: {} 分 ({})",
            ctx,
            score.playability,
            if score.passed { "通过" } else { "未通过" }
        );
        builder.set_score(score);

        progress.phase(Phase::BuildingReport).await;
        builder.set_duration(started.elapsed());
        builder.build().await
    }

    /// 按键与截图采样交替进行，直到操作时长用完；返回采样到的截图
    #[allow(clippy::too_many_arguments)]
    async fn play(
        &self,
        ctx: &TestCtx,
        session: &dyn BrowserSession,
        progress: &dyn ProgressSink,
        ui: &dyn UiAutomation,
        screen: &dyn ScreenCapture,
        builder: &mut dyn ReportBuilder,
        mode: RenderMode,
    ) -> Vec<Screenshot> {
        let total = self.config.gameplay_duration(ctx.request.max_duration());
        let sample_interval = self.config.screenshot_interval();
        let key_delay = self.config.key_delay();
        let keys = action_keys(mode);

        let recorder = session.video_recorder();
        let recording = match recorder.start().await {
            Ok(()) => true,
            Err(e) => {
                soft_fail(
                    ctx,
                    progress,
                    builder,
                    Phase::RecordingGameplay,
                    format!("video recording unavailable: {}", e),
                )
                .await;
                false
            }
        };

        info!("{} 🎮 开始操作游戏，时长 {:?}", ctx, total);
        let started = Instant::now();
        let mut next_sample = started + sample_interval;
        let mut samples = Vec::new();
        let mut key_idx = 0usize;
        let mut key_failure_reported = false;

        while started.elapsed() < total {
            let key = keys[key_idx % keys.len()];
            key_idx += 1;
            match ui.send_key(key).await {
                Ok(true) => {}
                Ok(false) => debug!("{} 按键 {:?} 未送达", ctx, key),
                Err(e) => {
                    if !key_failure_reported {
                        key_failure_reported = true;
                        soft_fail(
                            ctx,
                            progress,
                            builder,
                            Phase::RecordingGameplay,
                            format!("key input failed: {}", e),
                        )
                        .await;
                    }
                }
            }
            sleep(key_delay).await;

            if Instant::now() >= next_sample {
                let tag = format!("gameplay-{}", samples.len() + 1);
                match screen.capture(&tag).await {
                    Ok(shot) => {
                        builder.add_screenshot(&shot);
                        samples.push(shot);
                    }
                    Err(e) => {
                        soft_fail(
                            ctx,
                            progress,
                            builder,
                            Phase::RecordingGameplay,
                            format!("gameplay screenshot {} failed: {}", tag, e),
                        )
                        .await;
                    }
                }
                next_sample += sample_interval;
            }

            progress
                .progress(Phase::RecordingGameplay, Phase::gameplay_progress(started.elapsed(), total))
                .await;
        }
        progress.progress(Phase::RecordingGameplay, GAMEPLAY_PROGRESS_END).await;
        info!("{} ✓ 游戏操作结束：{} 次按键，{} 张采样截图", ctx, key_idx, samples.len());

        if recording {
            if let Err(e) = recorder.stop().await {
                soft_fail(
                    ctx,
                    progress,
                    builder,
                    Phase::RecordingGameplay,
                    format!("video stop failed: {}", e),
                )
                .await;
            } else {
                let dir = self.collaborators.reports.artifacts_dir(ctx.test_id).join("video");
                let path = match recorder.save_to(&dir).await {
                    Ok(path) => Some(path),
                    Err(e) => {
                        soft_fail(
                            ctx,
                            progress,
                            builder,
                            Phase::RecordingGameplay,
                            format!("video save failed: {}", e),
                        )
                        .await;
                        None
                    }
                };
                builder.set_video(VideoSummary {
                    frame_count: recorder.frame_count(),
                    duration_ms: duration_ms(recorder.duration()),
                    path,
                });
            }
        }

        samples
    }
}

async fn soft_fail(
    ctx: &TestCtx,
    progress: &dyn ProgressSink,
    builder: &mut dyn ReportBuilder,
    phase: Phase,
    warning: String,
) {
    warn!("{} ⚠️ {}", ctx, warning);
    builder.add_warning(&warning);
    progress.warning(phase, &warning).await;
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// 挑选提交评估的截图：初始 + 均匀分布的采样 + 最终，总数不超过 `max`
pub fn select_images(
    initial: &Screenshot,
    samples: &[Screenshot],
    final_shot: &Screenshot,
    max: usize,
) -> Vec<Screenshot> {
    match max {
        0 => return Vec::new(),
        1 => return vec![final_shot.clone()],
        _ => {}
    }
    let slots = max - 2;
    let mut images = Vec::with_capacity(max.min(samples.len() + 2));
    images.push(initial.clone());
    if samples.len() <= slots {
        images.extend_from_slice(samples);
    } else {
        let n = samples.len();
        images.extend((0..slots).map(|i| samples[(2 * i + 1) * n / (2 * slots)].clone()));
    }
    images.push(final_shot.clone());
    images
}

/// 会话守卫：正常路径显式关闭；若流程被取消或超时中途丢弃，则在后台关闭
struct SessionGuard {
    session: Arc<dyn BrowserSession>,
    closed: bool,
}

impl SessionGuard {
    fn new(session: Box<dyn BrowserSession>) -> Self {
        Self {
            session: Arc::from(session),
            closed: false,
        }
    }

    fn get(&self) -> &dyn BrowserSession {
        self.session.as_ref()
    }

    async fn close(mut self) {
        self.closed = true;
        self.session.close().await;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let session = self.session.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { session.close().await });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shot(tag: &str) -> Screenshot {
        Screenshot::new(tag, vec![0])
    }

    fn tags(images: &[Screenshot]) -> Vec<String> {
        images.iter().map(|s| s.phase_tag.clone()).collect()
    }

    #[test]
    fn test_select_images_keeps_all_when_under_cap() {
        let samples = vec![shot("gameplay-1"), shot("gameplay-2")];
        let images = select_images(&shot("initial"), &samples, &shot("final"), 6);
        assert_eq!(tags(&images), vec!["initial", "gameplay-1", "gameplay-2", "final"]);
    }

    #[test]
    fn test_select_images_spreads_samples() {
        let samples: Vec<Screenshot> = (1..=10).map(|i| shot(&format!("gameplay-{}", i))).collect();
        let images = select_images(&shot("initial"), &samples, &shot("final"), 4);
        assert_eq!(tags(&images), vec!["initial", "gameplay-3", "gameplay-8", "final"]);
    }

    #[test]
    fn test_select_images_tiny_cap() {
        let samples = vec![shot("gameplay-1")];
        assert_eq!(tags(&select_images(&shot("initial"), &samples, &shot("final"), 1)), vec!["final"]);
        assert_eq!(
            tags(&select_images(&shot("initial"), &samples, &shot("final"), 2)),
            vec!["initial", "final"]
        );
    }

    #[test]
    fn test_action_keys_differ_by_mode() {
        assert_eq!(action_keys(RenderMode::Canvas)[0], "ArrowUp");
        assert_eq!(action_keys(RenderMode::Dom)[0], "ArrowRight");
    }
}
