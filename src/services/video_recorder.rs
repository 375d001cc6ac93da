//! 录屏服务 - 业务能力层
//!
//! 按固定帧率截取 PNG 帧，停止后可整体写入产物目录
//! （`frame_00000.png`、`frame_00001.png` …）。

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::fs;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::JsExecutor;
use crate::services::contracts::VideoRecorder;

#[derive(Default)]
struct Recording {
    frames: Vec<Vec<u8>>,
    started_at: Option<Instant>,
    duration: Duration,
}

/// 后台采帧任务，丢弃时立即停止
struct Sampler {
    stop: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Sampler {
    fn spawn<F, Fut>(frame_interval: Duration, state: Arc<Mutex<Recording>>, capture: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = AppResult<Vec<u8>>> + Send + 'static,
    {
        let stop = CancellationToken::new();
        let cancelled = stop.clone();
        let mut ticker = interval(frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        match capture().await {
                            Ok(png) => state.lock().frames.push(png),
                            Err(e) => debug!("录屏帧截取失败: {}", e),
                        }
                    }
                }
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// 正常停止，等待最后一帧写完
    async fn finish(mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("录屏任务异常退出: {}", e);
            }
        }
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// 基于截图采样的录屏
pub struct FrameRecorder {
    executor: JsExecutor,
    frame_interval: Duration,
    state: Arc<Mutex<Recording>>,
    sampler: Mutex<Option<Sampler>>,
}

impl FrameRecorder {
    pub fn new(executor: JsExecutor, fps: u32) -> Self {
        Self {
            executor,
            frame_interval: Duration::from_millis(1_000 / u64::from(fps.max(1))),
            state: Arc::new(Mutex::new(Recording::default())),
            sampler: Mutex::new(None),
        }
    }
}

#[async_trait]
impl VideoRecorder for FrameRecorder {
    async fn start(&self) -> AppResult<()> {
        let mut sampler = self.sampler.lock();
        if sampler.is_some() {
            return Err(AppError::Conflict("recording already started".to_string()));
        }
        {
            let mut state = self.state.lock();
            state.frames.clear();
            state.started_at = Some(Instant::now());
            state.duration = Duration::ZERO;
        }

        let executor = self.executor.clone();
        let capture = move || {
            let executor = executor.clone();
            async move { executor.screenshot_png().await }
        };
        *sampler = Some(Sampler::spawn(self.frame_interval, self.state.clone(), capture));
        Ok(())
    }

    async fn stop(&self) -> AppResult<()> {
        let running = self.sampler.lock().take();
        let Some(sampler) = running else {
            return Err(AppError::Conflict("recording not started".to_string()));
        };
        sampler.finish().await;
        let mut state = self.state.lock();
        if let Some(started_at) = state.started_at {
            state.duration = started_at.elapsed();
        }
        Ok(())
    }

    fn frame_count(&self) -> usize {
        self.state.lock().frames.len()
    }

    fn duration(&self) -> Duration {
        self.state.lock().duration
    }

    async fn save_to(&self, dir: &Path) -> AppResult<PathBuf> {
        let frames = std::mem::take(&mut self.state.lock().frames);
        if frames.is_empty() {
            return Err(AppError::Other("no video frames recorded".to_string()));
        }
        fs::create_dir_all(dir).await?;
        for (idx, frame) in frames.iter().enumerate() {
            fs::write(dir.join(format!("frame_{:05}.png", idx)), frame).await?;
        }
        debug!("已保存 {} 帧到 {}", frames.len(), dir.display());
        // 写盘后保留帧数，报告里仍需要
        self.state.lock().frames = frames;
        Ok(dir.to_path_buf())
    }
}
