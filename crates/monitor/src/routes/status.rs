//! Status Routes

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::pipeline::MonitorStatus;
use crate::AppState;

/// Latest pipeline state
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<MonitorStatus> {
    let status = state.status.read().await;
    Json(status.clone())
}
