use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub time: DateTime<Utc>,
    pub running_tests: usize,
    pub pending_tests: usize,
    pub max_concurrent: usize,
}

pub async fn health(State(app): State<AppState>) -> Json<HealthResponse> {
    let snapshot = app.health().await;
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        time: Utc::now(),
        running_tests: snapshot.running_tests,
        pending_tests: snapshot.pending_tests,
        max_concurrent: snapshot.max_concurrent,
    })
}
