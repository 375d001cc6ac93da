use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 应用程序错误类型
///
/// 每个变体对应一类失败，网关据此映射 HTTP 状态码，
/// 执行流水线据此决定硬失败（任务失败）还是软失败（记录警告）。
#[derive(Debug, Error)]
pub enum AppError {
    /// 请求校验失败（网关层 4xx，不会进入流水线）
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    /// 浏览器相关错误
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
    /// 评估服务错误
    #[error("evaluator error: {0}")]
    Evaluator(#[from] EvaluatorError),
    /// 报告生成错误
    #[error("report build failed: {0}")]
    Report(String),
    /// 持久化错误（只记录警告，内存注册表为准）
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    /// 等待槽位的测试数量已达上限
    #[error("capacity exhausted: {pending} tests already waiting for a slot (limit {limit})")]
    Capacity { pending: usize, limit: usize },
    /// 资源不存在
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    /// 非法状态迁移
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    /// 与当前状态冲突的请求
    #[error("conflict: {0}")]
    Conflict(String),
    /// 超过 maxDuration
    #[error("test exceeded max duration of {0}s")]
    Timeout(u64),
    /// 测试被取消
    #[error("test cancelled")]
    Cancelled,
    /// 配置错误
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    /// 文件读写错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON 序列化错误
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// 其他错误
    #[error("{0}")]
    Other(String),
}

/// 请求校验错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("url is required")]
    MissingUrl,
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported url scheme in '{url}', expected http or https")]
    UnsupportedScheme { url: String },
    #[error("maxDuration {value} is out of range (1..={max} seconds)")]
    MaxDurationOutOfRange { value: u64, max: u64 },
    #[error("batch must contain at least one url")]
    EmptyBatch,
    #[error("batch contains {count} urls, at most {max} are allowed")]
    TooManyUrls { count: usize, max: usize },
    #[error("batch url at index {index} is empty")]
    EmptyBatchUrl { index: usize },
    #[error("unknown status filter '{0}'")]
    UnknownStatus(String),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
}

/// 浏览器相关错误
#[derive(Debug, Error)]
pub enum BrowserError {
    /// 启动浏览器失败
    #[error("failed to launch browser: {source}")]
    LaunchFailed {
        #[source]
        source: BoxError,
    },
    /// 浏览器配置失败
    #[error("invalid browser configuration: {reason}")]
    ConfigurationFailed { reason: String },
    /// 导航失败
    #[error("navigation to {url} failed: {source}")]
    NavigationFailed {
        url: String,
        #[source]
        source: BoxError,
    },
    /// 截图失败
    #[error("screenshot '{phase_tag}' failed: {source}")]
    ScreenshotFailed {
        phase_tag: String,
        #[source]
        source: BoxError,
    },
    /// 执行脚本失败
    #[error("script execution failed: {source}")]
    ScriptExecutionFailed {
        #[source]
        source: BoxError,
    },
    /// 页面元素不存在
    #[error("element '{selector}' not found")]
    ElementNotFound { selector: String },
    /// 会话已关闭
    #[error("browser session already closed")]
    SessionClosed,
}

/// 评估服务错误
#[derive(Debug, Error)]
pub enum EvaluatorError {
    /// API 调用失败
    #[error("evaluation call failed (model: {model}): {source}")]
    ApiCallFailed {
        model: String,
        #[source]
        source: BoxError,
    },
    /// 返回内容为空
    #[error("evaluator returned no content (model: {model})")]
    EmptyResponse { model: String },
    /// 无法解析评分
    #[error("could not parse a score from evaluator response: {response}")]
    UnparseableScore { response: String },
    /// 没有可评估的截图
    #[error("no screenshots to evaluate")]
    NoImages,
}

/// 持久化错误
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("record encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("corrupt record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },
    #[error("storage task failed: {0}")]
    Task(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置值不合法
    #[error("{var_name}: {reason}")]
    InvalidValue { var_name: String, reason: String },
    /// 批量文件解析失败
    #[error("failed to parse batch file {path}: {source}")]
    BatchFileParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Browser(BrowserError::ScriptExecutionFailed {
            source: Box::new(err),
        })
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Persistence(PersistenceError::Sqlite(err))
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建浏览器启动错误
    pub fn browser_launch_failed(source: impl Into<BoxError>) -> Self {
        AppError::Browser(BrowserError::LaunchFailed {
            source: source.into(),
        })
    }

    /// 创建导航失败错误
    pub fn navigation_failed(url: impl Into<String>, source: impl Into<BoxError>) -> Self {
        AppError::Browser(BrowserError::NavigationFailed {
            url: url.into(),
            source: source.into(),
        })
    }

    /// 创建截图失败错误
    pub fn screenshot_failed(phase_tag: impl Into<String>, source: impl Into<BoxError>) -> Self {
        AppError::Browser(BrowserError::ScreenshotFailed {
            phase_tag: phase_tag.into(),
            source: source.into(),
        })
    }

    /// 创建评估调用错误
    pub fn evaluator_failed(model: impl Into<String>, source: impl Into<BoxError>) -> Self {
        AppError::Evaluator(EvaluatorError::ApiCallFailed {
            model: model.into(),
            source: source.into(),
        })
    }

    pub fn test_not_found(id: impl ToString) -> Self {
        AppError::NotFound {
            kind: "test",
            id: id.to_string(),
        }
    }

    pub fn batch_not_found(id: impl ToString) -> Self {
        AppError::NotFound {
            kind: "batch",
            id: id.to_string(),
        }
    }

    pub fn report_not_found(id: impl ToString) -> Self {
        AppError::NotFound {
            kind: "report",
            id: id.to_string(),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_navigation_error_message_names_url() {
        let err = AppError::navigation_failed("https://example.com/game", "net::ERR_NAME_NOT_RESOLVED");
        let msg = err.to_string();
        assert!(msg.contains("https://example.com/game"));
        assert!(msg.contains("ERR_NAME_NOT_RESOLVED"));
    }

    #[test]
    fn test_validation_converts_into_app_error() {
        let err: AppError = ValidationError::TooManyUrls { count: 11, max: 10 }.into();
        assert!(matches!(err, AppError::Validation(ValidationError::TooManyUrls { .. })));
        assert_eq!(
            err.to_string(),
            "validation failed: batch contains 11 urls, at most 10 are allowed"
        );
    }
}
