use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::ConfigError;

/// 程序配置
///
/// 默认值可直接运行；每一项都可以通过同名（大写）环境变量覆盖。
#[derive(Clone, Debug)]
pub struct Config {
    /// HTTP 监听地址
    pub bind_addr: String,
    /// 同时运行的测试数量（槽位数）
    pub max_concurrent_tests: usize,
    /// 等待槽位的测试数量上限，0 表示不限制
    pub max_pending_tests: usize,
    /// 批量任务状态轮询间隔（毫秒）
    pub batch_poll_interval_ms: u64,
    /// 批量任务结束后保留多久（秒）
    pub batch_retention_secs: u64,
    /// 游戏操作阶段时长上限（秒）
    pub gameplay_duration_secs: u64,
    /// 游戏操作阶段截图间隔（毫秒）
    pub screenshot_interval_ms: u64,
    /// 两次按键之间的间隔（毫秒）
    pub key_delay_ms: u64,
    /// 页面稳定等待（毫秒）
    pub settle_delay_ms: u64,
    /// 点击开始后等待游戏加载（毫秒）
    pub load_wait_ms: u64,
    /// 截图、视频帧和报告的输出目录
    pub artifacts_dir: String,
    /// SQLite 文件路径，为空时使用内存存储
    pub database_path: Option<String>,
    /// 浏览器可执行文件，为空时由 chromiumoxide 自动查找
    pub chrome_executable: Option<String>,
    /// 额外的浏览器启动参数
    pub browser_args: Vec<String>,
    pub window_width: u32,
    pub window_height: u32,
    /// 录屏采样帧率
    pub video_fps: u32,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    /// 每次评估最多提交的截图数量
    pub eval_max_images: usize,
    /// 设置后以命令行模式运行该 TOML 文件中的游戏列表
    pub batch_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            max_concurrent_tests: 20,
            max_pending_tests: 500,
            batch_poll_interval_ms: 2_000,
            batch_retention_secs: 3_600,
            gameplay_duration_secs: 20,
            screenshot_interval_ms: 2_000,
            key_delay_ms: 150,
            settle_delay_ms: 1_500,
            load_wait_ms: 3_000,
            artifacts_dir: "artifacts".to_string(),
            database_path: Some("game_qa.db".to_string()),
            chrome_executable: None,
            browser_args: vec![
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--autoplay-policy=no-user-gesture-required".to_string(),
            ],
            window_width: 1280,
            window_height: 720,
            video_fps: 2,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o".to_string(),
            eval_max_images: 6,
            batch_file: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(default.bind_addr),
            max_concurrent_tests: env_parse("MAX_CONCURRENT_TESTS", default.max_concurrent_tests),
            max_pending_tests: env_parse("MAX_PENDING_TESTS", default.max_pending_tests),
            batch_poll_interval_ms: env_parse("BATCH_POLL_INTERVAL_MS", default.batch_poll_interval_ms),
            batch_retention_secs: env_parse("BATCH_RETENTION_SECS", default.batch_retention_secs),
            gameplay_duration_secs: env_parse("GAMEPLAY_DURATION_SECS", default.gameplay_duration_secs),
            screenshot_interval_ms: env_parse("SCREENSHOT_INTERVAL_MS", default.screenshot_interval_ms),
            key_delay_ms: env_parse("KEY_DELAY_MS", default.key_delay_ms),
            settle_delay_ms: env_parse("SETTLE_DELAY_MS", default.settle_delay_ms),
            load_wait_ms: env_parse("LOAD_WAIT_MS", default.load_wait_ms),
            artifacts_dir: std::env::var("ARTIFACTS_DIR").unwrap_or(default.artifacts_dir),
            database_path: match std::env::var("DATABASE_PATH") {
                Ok(v) if v.trim().is_empty() => None,
                Ok(v) => Some(v),
                Err(_) => default.database_path,
            },
            chrome_executable: env_non_empty("CHROME_EXECUTABLE").or(default.chrome_executable),
            browser_args: env_non_empty("BROWSER_ARGS")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or(default.browser_args),
            window_width: env_parse("WINDOW_WIDTH", default.window_width),
            window_height: env_parse("WINDOW_HEIGHT", default.window_height),
            video_fps: env_parse("VIDEO_FPS", default.video_fps),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            eval_max_images: env_parse("EVAL_MAX_IMAGES", default.eval_max_images),
            batch_file: env_non_empty("BATCH_FILE").or(default.batch_file),
        }
    }

    /// 检查配置中不能为零的数值
    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("MAX_CONCURRENT_TESTS", self.max_concurrent_tests as u64),
            ("BATCH_POLL_INTERVAL_MS", self.batch_poll_interval_ms),
            ("SCREENSHOT_INTERVAL_MS", self.screenshot_interval_ms),
            ("VIDEO_FPS", self.video_fps as u64),
            ("EVAL_MAX_IMAGES", self.eval_max_images as u64),
        ];
        for (var_name, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    var_name: var_name.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn batch_poll_interval(&self) -> Duration {
        Duration::from_millis(self.batch_poll_interval_ms)
    }

    pub fn batch_retention(&self) -> Duration {
        Duration::from_secs(self.batch_retention_secs)
    }

    pub fn screenshot_interval(&self) -> Duration {
        Duration::from_millis(self.screenshot_interval_ms)
    }

    /// 按键间隔至少 1ms，保证操作循环总会让出时间
    pub fn key_delay(&self) -> Duration {
        Duration::from_millis(self.key_delay_ms.max(1))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn load_wait(&self) -> Duration {
        Duration::from_millis(self.load_wait_ms)
    }

    /// 游戏操作时长：配置值与 maxDuration 一半取较小者，保证整个测试能在上限内完成
    pub fn gameplay_duration(&self, max_duration: Duration) -> Duration {
        Duration::from_secs(self.gameplay_duration_secs).min(max_duration / 2)
    }

    /// 固定等待（两次页面稳定 + 加载等待）最多占 maxDuration 的四分之一，超出时按比例缩短
    pub fn phase_waits(&self, max_duration: Duration) -> PhaseWaits {
        let settle = self.settle_delay();
        let load = self.load_wait();
        let total = settle * 2 + load;
        let budget = max_duration / 4;
        if total <= budget || total.is_zero() {
            return PhaseWaits { settle, load };
        }
        let scale = budget.as_secs_f64() / total.as_secs_f64();
        PhaseWaits {
            settle: settle.mul_f64(scale),
            load: load.mul_f64(scale),
        }
    }

    pub fn artifacts_root(&self) -> PathBuf {
        PathBuf::from(&self.artifacts_dir)
    }
}

/// 单个测试实际使用的固定等待
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseWaits {
    pub settle: Duration,
    pub load: Duration,
}

fn env_non_empty(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr + Copy>(var_name: &str, default: T) -> T {
    match std::env::var(var_name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("⚠️ 环境变量 {} 的值 '{}' 无法解析，使用默认值", var_name, raw);
            default
        }),
        Err(_) => default,
    }
}
