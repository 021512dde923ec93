//! Security group handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::error::Result;
use crate::model::{FirewallRule, SecurityGroup};
use crate::resource::security_group::{self, CreateSecurityGroupRequest};
use crate::state::AppState;

use super::MessageResponse;

pub async fn create_security_group(
    State(state): State<Arc<AppState>>,
    Path(ns): Path<String>,
    Json(req): Json<CreateSecurityGroupRequest>,
) -> Result<Json<SecurityGroup>> {
    Ok(Json(
        security_group::create_security_group(&state, &ns, req).await?,
    ))
}

pub async fn get_security_group(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
) -> Result<Json<SecurityGroup>> {
    Ok(Json(
        security_group::get_security_group(&state, &ns, &id).await?,
    ))
}

pub async fn delete_security_group(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
) -> Result<Json<MessageResponse>> {
    security_group::delete_security_group(&state, &ns, &id).await?;
    Ok(Json(MessageResponse::new(format!(
        "the securityGroup ({}) has been deleted",
        id
    ))))
}

pub async fn add_firewall_rules(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
    Json(rules): Json<Vec<FirewallRule>>,
) -> Result<Json<SecurityGroup>> {
    Ok(Json(security_group::add_rules(&state, &ns, &id, rules).await?))
}

pub async fn remove_firewall_rules(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
    Json(rules): Json<Vec<FirewallRule>>,
) -> Result<Json<SecurityGroup>> {
    Ok(Json(
        security_group::remove_rules(&state, &ns, &id, rules).await?,
    ))
}
