//! HTTP 网关
//!
//! 负责请求校验、状态码映射和 JSON 序列化，所有业务都委托给 `App`。

pub mod batch_tests;
pub mod health;
pub mod reports;
pub mod test_jobs;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult, ValidationError};
use crate::orchestrator::App;

pub type AppState = Arc<App>;

/// 组装全部路由
pub fn router(app: AppState) -> Router {
    Router::new()
        .route("/tests", post(test_jobs::submit_test).get(test_jobs::list_tests))
        .route("/tests/:id", get(test_jobs::get_test))
        .route("/tests/:id/cancel", post(test_jobs::cancel_test))
        .route("/batch-tests", post(batch_tests::submit_batch))
        .route("/batch-tests/:id", get(batch_tests::get_batch))
        .route("/reports/:id", get(reports::get_report))
        .route("/health", get(health::health))
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

/// 监听并服务，Ctrl-C 时优雅退出
pub async fn serve(app: AppState, bind_addr: &str) -> AppResult<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    info!("🌐 HTTP 服务已启动: http://{}", listener.local_addr()?);

    let shutdown_app = app.clone();
    axum::serve(listener, router(app))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("监听退出信号失败: {}", e);
            }
            shutdown_app.shutdown();
        })
        .await?;
    Ok(())
}

/// 错误响应体
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl AppError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            AppError::InvalidTransition { .. } | AppError::Conflict(_) => {
                (StatusCode::CONFLICT, "conflict")
            }
            AppError::Capacity { .. } => (StatusCode::SERVICE_UNAVAILABLE, "capacity_exhausted"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        if status.is_server_error() {
            warn!("请求处理失败: {}", self);
        }
        let body = ErrorBody {
            error: kind,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// 路径里的 ID；无法解析的 ID 视为不存在
pub(crate) fn parse_id(kind: &'static str, raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound {
        kind,
        id: raw.to_string(),
    })
}

pub(crate) fn malformed(rejection: impl std::fmt::Display) -> AppError {
    ValidationError::MalformedRequest(rejection.to_string()).into()
}

pub(crate) fn default_headless() -> bool {
    true
}
