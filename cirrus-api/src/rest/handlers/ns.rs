//! Namespace handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::error::Result;
use crate::model::Namespace;
use crate::resource;
use crate::state::AppState;

use super::MessageResponse;

pub async fn create_ns(
    State(state): State<Arc<AppState>>,
    Json(req): Json<resource::CreateNsRequest>,
) -> Result<Json<Namespace>> {
    Ok(Json(resource::create_ns(&state, req).await?))
}

pub async fn get_ns(
    State(state): State<Arc<AppState>>,
    Path(ns): Path<String>,
) -> Result<Json<Namespace>> {
    Ok(Json(resource::get_ns(&state, &ns).await?))
}

pub async fn list_ns(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Namespace>>> {
    Ok(Json(resource::list_ns(&state).await?))
}

pub async fn delete_ns(
    State(state): State<Arc<AppState>>,
    Path(ns): Path<String>,
) -> Result<Json<MessageResponse>> {
    resource::delete_ns(&state, &ns).await?;
    Ok(Json(MessageResponse::new(format!(
        "the namespace ({}) has been deleted",
        ns
    ))))
}
