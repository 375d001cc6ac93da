//! 单个测试的接口

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{default_headless, malformed, parse_id, AppState};
use crate::error::AppResult;
use crate::models::{TestJobView, TestRequest, TestStatus};

/// 列表默认条数
pub const DEFAULT_LIST_LIMIT: usize = 50;
/// 列表最大条数
pub const MAX_LIST_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTestBody {
    pub url: Option<String>,
    pub max_duration: Option<u64>,
    #[serde(default = "default_headless")]
    pub headless: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTestResponse {
    pub test_id: Uuid,
    pub status: TestStatus,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn submit_test(
    State(app): State<AppState>,
    body: Result<Json<SubmitTestBody>, JsonRejection>,
) -> AppResult<(StatusCode, Json<SubmitTestResponse>)> {
    let Json(body) = body.map_err(malformed)?;
    let request = TestRequest::new(
        body.url.as_deref().unwrap_or_default(),
        body.max_duration,
        body.headless,
    )?;
    let test_id = app.submit_test(request).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitTestResponse {
            test_id,
            status: TestStatus::Pending,
        }),
    ))
}

pub async fn get_test(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<TestJobView>> {
    let id = parse_id("test", &id)?;
    Ok(Json(app.get_test(id).await?))
}

pub async fn list_tests(
    State(app): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> AppResult<Json<Vec<TestJobView>>> {
    let Query(query) = query.map_err(malformed)?;
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<TestStatus>)
        .transpose()?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
    let offset = query.offset.unwrap_or(0);
    Ok(Json(app.list_tests(status, limit, offset).await?))
}

pub async fn cancel_test(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<(StatusCode, Json<SubmitTestResponse>)> {
    let id = parse_id("test", &id)?;
    let view = app.cancel_test(id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitTestResponse {
            test_id: view.test_id,
            status: view.status,
        }),
    ))
}
