//! Connection config handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::error::Result;
use crate::model::ConnConfig;
use crate::registry::{self, ConnConfigList};
use crate::state::AppState;

pub async fn list_connections(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ConnConfigList>> {
    Ok(Json(registry::list_connections(&state).await?))
}

pub async fn get_connection(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ConnConfig>> {
    Ok(Json(registry::get_connection(&state, &name).await?))
}
