//! 批量测试的接口

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{default_headless, malformed, parse_id, AppState};
use crate::error::AppResult;
use crate::models::{BatchRequest, BatchStatus, BatchView};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBatchBody {
    #[serde(default)]
    pub urls: Vec<String>,
    pub max_duration: Option<u64>,
    #[serde(default = "default_headless")]
    pub headless: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBatchResponse {
    pub batch_id: Uuid,
    pub test_ids: Vec<Uuid>,
    pub status: BatchStatus,
}

pub async fn submit_batch(
    State(app): State<AppState>,
    body: Result<Json<SubmitBatchBody>, JsonRejection>,
) -> AppResult<(StatusCode, Json<SubmitBatchResponse>)> {
    let Json(body) = body.map_err(malformed)?;
    let submission = app
        .submit_batch(BatchRequest {
            urls: body.urls,
            max_duration: body.max_duration,
            headless: body.headless,
        })
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitBatchResponse {
            batch_id: submission.batch_id,
            test_ids: submission.test_ids,
            status: BatchStatus::Running,
        }),
    ))
}

pub async fn get_batch(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<BatchView>> {
    let id = parse_id("batch", &id)?;
    Ok(Json(app.get_batch(id).await?))
}
