//! MCI, VM, subgroup, bastion, policy, and VPN handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::error::Result;
use crate::mci::create::{CreateMciRequest, ScaleOutRequest};
use crate::mci::ops::{self, McisCommandRequest};
use crate::mci::snapshot::SnapshotRequest;
use crate::mci::{self, bastion};
use crate::model::Vm;
use crate::state::AppState;

use super::MessageResponse;

#[derive(Debug, Deserialize)]
pub struct MciReadQuery {
    #[serde(default)]
    pub option: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForceQuery {
    #[serde(default)]
    pub option: Option<String>,
    #[serde(default)]
    pub force: Option<bool>,
}

impl ForceQuery {
    fn is_force(&self) -> bool {
        self.force.unwrap_or(false) || self.option.as_deref() == Some("force")
    }
}

pub async fn create_mci(
    State(state): State<Arc<AppState>>,
    Path(ns): Path<String>,
    Json(req): Json<CreateMciRequest>,
) -> Result<Json<mci::MciView>> {
    Ok(Json(mci::create::create_mci_dynamic(&state, &ns, req).await?))
}

/// Plain read, or live fan-out status with `?option=status`. The status
/// path is rate-limited and reports 504 with the partial state when the
/// 60 s budget runs out.
pub async fn get_mci(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
    Query(query): Query<MciReadQuery>,
) -> Result<Response> {
    state.limits.mci_read.acquire().await;

    if query.option.as_deref() == Some("status") {
        let fanout = ops::mci_status(&state, &ns, &id).await?;
        let status = if fanout.timed_out {
            StatusCode::GATEWAY_TIMEOUT
        } else {
            StatusCode::OK
        };
        return Ok((status, Json(fanout.view)).into_response());
    }

    Ok(Json(mci::get_mci(&state, &ns, &id).await?).into_response())
}

pub async fn list_mcis(
    State(state): State<Arc<AppState>>,
    Path(ns): Path<String>,
) -> Result<Json<Vec<mci::MciView>>> {
    state.limits.mci_read.acquire().await;
    Ok(Json(mci::list_mcis(&state, &ns).await?))
}

pub async fn delete_mci(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
    Query(query): Query<ForceQuery>,
) -> Result<Json<mci::DeleteMciResult>> {
    Ok(Json(mci::delete_mci(&state, &ns, &id, query.is_force()).await?))
}

#[derive(Debug, Deserialize)]
pub struct ControlQuery {
    pub action: String,
}

pub async fn control_mci(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
    Query(query): Query<ControlQuery>,
) -> Result<Json<ops::FanoutReport>> {
    Ok(Json(ops::control_mci(&state, &ns, &id, &query.action).await?))
}

pub async fn remote_command(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
    Json(req): Json<McisCommandRequest>,
) -> Result<Json<ops::FanoutReport>> {
    Ok(Json(ops::remote_command(&state, &ns, &id, req).await?))
}

pub async fn scale_out_subgroup(
    State(state): State<Arc<AppState>>,
    Path((ns, id, sg)): Path<(String, String, String)>,
    Json(req): Json<ScaleOutRequest>,
) -> Result<Json<mci::MciView>> {
    Ok(Json(
        mci::create::scale_out_subgroup(&state, &ns, &id, &sg, req).await?,
    ))
}

// -----------------------------------------------------------------------------
// VMs
// -----------------------------------------------------------------------------

pub async fn get_vm(
    State(state): State<Arc<AppState>>,
    Path((ns, id, vm)): Path<(String, String, String)>,
) -> Result<Json<Vm>> {
    Ok(Json(mci::get_vm(&state, &ns, &id, &vm).await?))
}

pub async fn delete_vm(
    State(state): State<Arc<AppState>>,
    Path((ns, id, vm)): Path<(String, String, String)>,
    Query(query): Query<ForceQuery>,
) -> Result<Json<MessageResponse>> {
    mci::delete_vm(&state, &ns, &id, &vm, query.is_force()).await?;
    Ok(Json(MessageResponse::new(format!(
        "the VM ({}) has been deleted",
        vm
    ))))
}

pub async fn snapshot_vm(
    State(state): State<Arc<AppState>>,
    Path((ns, id, vm)): Path<(String, String, String)>,
    Json(req): Json<SnapshotRequest>,
) -> Result<Json<crate::mci::snapshot::SnapshotResult>> {
    Ok(Json(
        crate::mci::snapshot::snapshot_vm(&state, &ns, &id, &vm, req).await?,
    ))
}

// -----------------------------------------------------------------------------
// Bastion
// -----------------------------------------------------------------------------

pub async fn set_bastion(
    State(state): State<Arc<AppState>>,
    Path((ns, id, vm, bastion_vm)): Path<(String, String, String, String)>,
) -> Result<Json<bastion::BastionView>> {
    Ok(Json(
        bastion::set_bastion(&state, &ns, &id, &vm, &bastion_vm).await?,
    ))
}

pub async fn get_bastion(
    State(state): State<Arc<AppState>>,
    Path((ns, id, vm)): Path<(String, String, String)>,
) -> Result<Json<bastion::BastionView>> {
    Ok(Json(bastion::get_bastion(&state, &ns, &id, &vm).await?))
}

pub async fn remove_bastion(
    State(state): State<Arc<AppState>>,
    Path((ns, id, bastion_vm)): Path<(String, String, String)>,
) -> Result<Json<MessageResponse>> {
    let cleared = bastion::clear_bastion_refs(&state, &ns, &id, &bastion_vm).await?;
    Ok(Json(MessageResponse::new(format!(
        "cleared {} bastion reference(s) to VM ({})",
        cleared, bastion_vm
    ))))
}

// -----------------------------------------------------------------------------
// Policy
// -----------------------------------------------------------------------------

pub async fn put_policy(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
    Json(policy): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>> {
    Ok(Json(ops::put_policy(&state, &ns, &id, policy).await?))
}

pub async fn get_policy(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>> {
    Ok(Json(ops::get_policy(&state, &ns, &id).await?))
}

pub async fn delete_policy(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
) -> Result<Json<MessageResponse>> {
    ops::delete_policy(&state, &ns, &id).await?;
    Ok(Json(MessageResponse::new(format!(
        "the policy for MCI ({}) has been deleted",
        id
    ))))
}

// -----------------------------------------------------------------------------
// Site-to-site VPN
// -----------------------------------------------------------------------------

pub async fn create_vpn(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
    Json(body): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<ops::VpnAccepted>)> {
    let accepted = ops::create_vpn(&state, &ns, &id, body).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

#[derive(Debug, Deserialize)]
pub struct DeleteVpnQuery {
    #[serde(rename = "connectionName")]
    pub connection_name: String,
    #[serde(rename = "vpnName")]
    pub vpn_name: String,
}

pub async fn delete_vpn(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
    Query(query): Query<DeleteVpnQuery>,
) -> Result<(StatusCode, Json<ops::VpnAccepted>)> {
    let accepted =
        ops::delete_vpn(&state, &ns, &id, &query.connection_name, &query.vpn_name).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// Poll one long-running VPN request.
pub async fn get_vpn_request(
    State(state): State<Arc<AppState>>,
    Path((_ns, _id, req_id)): Path<(String, String, String)>,
) -> Result<Json<crate::tracker::RequestRecord>> {
    Ok(Json(state.tracker.get(&req_id).await?))
}
