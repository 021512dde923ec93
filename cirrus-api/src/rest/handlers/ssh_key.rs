//! SSH key handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::error::Result;
use crate::model::SshKey;
use crate::resource::ssh_key::{self, CreateSshKeyRequest, RegisterSshKeyRequest};
use crate::state::AppState;

use super::MessageResponse;

pub async fn create_ssh_key(
    State(state): State<Arc<AppState>>,
    Path(ns): Path<String>,
    Json(req): Json<CreateSshKeyRequest>,
) -> Result<Json<SshKey>> {
    Ok(Json(ssh_key::create_ssh_key(&state, &ns, req).await?))
}

pub async fn register_ssh_key(
    State(state): State<Arc<AppState>>,
    Path(ns): Path<String>,
    Json(req): Json<RegisterSshKeyRequest>,
) -> Result<Json<SshKey>> {
    Ok(Json(ssh_key::register_ssh_key(&state, &ns, req).await?))
}

pub async fn get_ssh_key(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
) -> Result<Json<SshKey>> {
    Ok(Json(ssh_key::get_ssh_key(&state, &ns, &id).await?))
}

pub async fn delete_ssh_key(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
) -> Result<Json<MessageResponse>> {
    ssh_key::delete_ssh_key(&state, &ns, &id).await?;
    Ok(Json(MessageResponse::new(format!(
        "the sshKey ({}) has been deleted",
        id
    ))))
}
