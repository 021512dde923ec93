//! Request tracker query handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::error::Result;
use crate::state::AppState;
use crate::tracker::RequestRecord;

use super::MessageResponse;

pub async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(req_id): Path<String>,
) -> Result<Json<RequestRecord>> {
    Ok(Json(state.tracker.get(&req_id).await?))
}

pub async fn list_requests(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RequestRecord>>> {
    Ok(Json(state.tracker.list().await))
}

pub async fn delete_request(
    State(state): State<Arc<AppState>>,
    Path(req_id): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.tracker.delete(&req_id).await?;
    Ok(Json(MessageResponse::new(format!(
        "the request ({}) has been deleted",
        req_id
    ))))
}

pub async fn clear_requests(
    State(state): State<Arc<AppState>>,
) -> Result<Json<MessageResponse>> {
    let removed = state.tracker.clear().await?;
    Ok(Json(MessageResponse::new(format!(
        "{} request record(s) deleted",
        removed
    ))))
}
