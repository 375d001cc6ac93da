use axum::extract::{Path, State};
use axum::Json;

use crate::api::{parse_id, AppState};
use crate::error::AppResult;
use crate::models::Report;

pub async fn get_report(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Report>> {
    let id = parse_id("report", &id)?;
    let report = app.get_report(id).await?;
    Ok(Json(report.as_ref().clone()))
}
