//! vNet and subnet handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::error::Result;
use crate::model::VNet;
use crate::resource::vnet::{self, CreateVNetRequest, RegisterVNetRequest, SubnetReq};
use crate::state::AppState;

use super::MessageResponse;

pub async fn create_vnet(
    State(state): State<Arc<AppState>>,
    Path(ns): Path<String>,
    Json(req): Json<CreateVNetRequest>,
) -> Result<Json<VNet>> {
    Ok(Json(vnet::create_vnet(&state, &ns, req).await?))
}

pub async fn register_vnet(
    State(state): State<Arc<AppState>>,
    Path(ns): Path<String>,
    Json(req): Json<RegisterVNetRequest>,
) -> Result<Json<VNet>> {
    Ok(Json(vnet::register_vnet(&state, &ns, req).await?))
}

pub async fn get_vnet(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
) -> Result<Json<VNet>> {
    Ok(Json(vnet::get_vnet(&state, &ns, &id).await?))
}

pub async fn list_vnets(
    State(state): State<Arc<AppState>>,
    Path(ns): Path<String>,
) -> Result<Json<Vec<VNet>>> {
    Ok(Json(vnet::list_vnets(&state, &ns).await?))
}

#[derive(Debug, Deserialize)]
pub struct DeleteVNetQuery {
    #[serde(rename = "withSubnets", default)]
    pub with_subnets: Option<bool>,
}

pub async fn delete_vnet(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
    Query(query): Query<DeleteVNetQuery>,
) -> Result<Json<MessageResponse>> {
    let message =
        vnet::delete_vnet(&state, &ns, &id, query.with_subnets.unwrap_or(false)).await?;
    Ok(Json(MessageResponse::new(message)))
}

pub async fn add_subnet(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
    Json(req): Json<SubnetReq>,
) -> Result<Json<VNet>> {
    Ok(Json(vnet::add_subnet(&state, &ns, &id, req).await?))
}

pub async fn remove_subnet(
    State(state): State<Arc<AppState>>,
    Path((ns, id, subnet_id)): Path<(String, String, String)>,
) -> Result<Json<VNet>> {
    Ok(Json(vnet::remove_subnet(&state, &ns, &id, &subnet_id).await?))
}
