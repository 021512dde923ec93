//! MCI-wide fan-out operations: live status, control actions, remote
//! command, policy storage, and the long-running VPN flow.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::warn;

use crate::error::{CoreError, Result};
use crate::model::{Mci, ResourceStatus, Vm};
use crate::resource::{ensure_ns, save_entity};
use crate::state::AppState;
use crate::tracker::StreamPhase;

use super::{load_mci, load_vms};

/// Wall-clock budget for a whole status fan-out.
pub const STATUS_FANOUT_BUDGET: Duration = Duration::from_secs(60);

const CONTROL_ACTIONS: [&str; 4] = ["suspend", "resume", "reboot", "terminate"];

#[derive(Debug, Clone, Serialize)]
pub struct VmStatusView {
    #[serde(rename = "Id")]
    pub id: String,
    /// Broker-reported status string, or `Unknown` when the probe did not
    /// come back inside the budget.
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "PublicIP")]
    pub public_ip: String,
    #[serde(rename = "PrivateIP")]
    pub private_ip: String,
    #[serde(rename = "Error", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MciStatusView {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Vm")]
    pub vm: Vec<VmStatusView>,
}

pub struct StatusFanout {
    pub view: MciStatusView,
    /// True when the 60 s budget expired before every VM answered.
    pub timed_out: bool,
}

/// Live status read: one broker call per VM, bounded by
/// [`STATUS_FANOUT_BUDGET`]. VMs that do not answer in time surface as
/// `Unknown`; the collection itself never fails on a per-VM error.
pub async fn mci_status(state: &AppState, ns: &str, id: &str) -> Result<StatusFanout> {
    mci_status_with_budget(state, ns, id, STATUS_FANOUT_BUDGET).await
}

pub async fn mci_status_with_budget(
    state: &AppState,
    ns: &str,
    id: &str,
    budget: Duration,
) -> Result<StatusFanout> {
    let mci = load_mci(state, ns, id).await?;
    let vms = load_vms(state, ns, id).await?;

    let (tx, mut rx) = mpsc::unbounded_channel::<(usize, std::result::Result<String, String>)>();
    for (idx, vm) in vms.iter().enumerate() {
        let broker = state.broker.clone();
        let conn = vm.connection_name.clone();
        let uuid = vm.uuid.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = broker
                .get_vm_status(&conn, &uuid)
                .await
                .map_err(|e| e.to_string());
            let _ = tx.send((idx, result));
        });
    }
    drop(tx);

    let mut statuses: Vec<Option<std::result::Result<String, String>>> = vec![None; vms.len()];
    let deadline = Instant::now() + budget;
    let mut received = 0usize;
    let mut timed_out = false;

    while received < vms.len() {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Some((idx, result))) => {
                statuses[idx] = Some(result);
                received += 1;
            }
            Ok(None) => break,
            Err(_) => {
                timed_out = true;
                break;
            }
        }
    }

    let vm_views = vms
        .iter()
        .zip(statuses)
        .map(|(vm, status)| match status {
            Some(Ok(s)) => VmStatusView {
                id: vm.id.clone(),
                status: s,
                public_ip: vm.public_ip.clone(),
                private_ip: vm.private_ip.clone(),
                error: None,
            },
            Some(Err(e)) => VmStatusView {
                id: vm.id.clone(),
                status: "Unknown".to_string(),
                public_ip: vm.public_ip.clone(),
                private_ip: vm.private_ip.clone(),
                error: Some(e),
            },
            None => VmStatusView {
                id: vm.id.clone(),
                status: "Unknown".to_string(),
                public_ip: vm.public_ip.clone(),
                private_ip: vm.private_ip.clone(),
                error: None,
            },
        })
        .collect();

    Ok(StatusFanout {
        view: MciStatusView {
            id: mci.id,
            name: mci.name,
            status: mci.status.to_string(),
            vm: vm_views,
        },
        timed_out,
    })
}

#[derive(Debug, Serialize)]
pub struct FanoutItemResult {
    #[serde(rename = "VmId")]
    pub vm_id: String,
    #[serde(rename = "Output", skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(rename = "Error", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FanoutReport {
    #[serde(rename = "Results")]
    pub results: Vec<FanoutItemResult>,
    #[serde(rename = "Failures")]
    pub failures: Vec<String>,
}

async fn fan_out_vms<F, Fut>(vms: Vec<Vm>, f: F) -> FanoutReport
where
    F: Fn(Vm) -> Fut,
    Fut: std::future::Future<Output = (String, std::result::Result<String, CoreError>)>,
{
    let mut results = Vec::with_capacity(vms.len());
    let mut failures = Vec::new();

    let outcomes = futures::future::join_all(vms.into_iter().map(f)).await;
    for (vm_id, outcome) in outcomes {
        match outcome {
            Ok(output) => results.push(FanoutItemResult {
                vm_id,
                output: Some(output),
                error: None,
            }),
            Err(e) => {
                failures.push(format!("{}: {}", vm_id, e));
                results.push(FanoutItemResult {
                    vm_id,
                    output: None,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    FanoutReport { results, failures }
}

/// Fan a control action (`suspend|resume|reboot|terminate`) out to every VM.
pub async fn control_mci(
    state: &AppState,
    ns: &str,
    id: &str,
    action: &str,
) -> Result<FanoutReport> {
    if !CONTROL_ACTIONS.contains(&action) {
        return Err(CoreError::Validation(format!(
            "action must be one of {:?}, got '{}'",
            CONTROL_ACTIONS, action
        )));
    }
    load_mci(state, ns, id).await?;
    let vms = load_vms(state, ns, id).await?;

    let report = fan_out_vms(vms.clone(), |vm| {
        let broker = state.broker.clone();
        let action = action.to_string();
        async move {
            let outcome = broker
                .control_vm(&vm.connection_name, &vm.uuid, &action)
                .await
                .map(|()| action.clone());
            (vm.id, outcome)
        }
    })
    .await;

    // Terminated VMs reach their terminal state locally.
    if action == "terminate" {
        for vm in vms {
            let failed = report.failures.iter().any(|f| f.starts_with(&format!("{}:", vm.id)));
            if !failed {
                let mut vm = vm;
                vm.status = ResourceStatus::Deleted;
                save_entity(state, &Vm::key(ns, id, &vm.id), &vm).await?;
            }
        }
    }

    Ok(report)
}

#[derive(Debug, Deserialize)]
pub struct McisCommandRequest {
    #[serde(rename = "Command")]
    pub command: String,
}

/// Send a command to every VM of the MCI through the broker.
pub async fn remote_command(
    state: &AppState,
    ns: &str,
    id: &str,
    req: McisCommandRequest,
) -> Result<FanoutReport> {
    if req.command.trim().is_empty() {
        return Err(CoreError::Validation("command must not be empty".into()));
    }
    load_mci(state, ns, id).await?;
    let vms = load_vms(state, ns, id).await?;

    Ok(fan_out_vms(vms, |vm| {
        let broker = state.broker.clone();
        let command = req.command.clone();
        async move {
            let outcome = broker
                .exec_command(&vm.connection_name, &vm.uuid, &command)
                .await
                .map(|r| r.output);
            (vm.id, outcome)
        }
    })
    .await)
}

// =============================================================================
// Autoscaling policy (stored verbatim, never evaluated here)
// =============================================================================

pub async fn put_policy(
    state: &AppState,
    ns: &str,
    mci_id: &str,
    policy: serde_json::Value,
) -> Result<serde_json::Value> {
    let mut mci = load_mci(state, ns, mci_id).await?;
    state
        .store
        .put(&Mci::policy_key(ns, mci_id), &serde_json::to_string(&policy)?)
        .await?;

    if mci.associated_policy_id.is_none() {
        mci.associated_policy_id = Some(mci_id.to_string());
        save_entity(state, &Mci::key(ns, mci_id), &mci).await?;
    }
    Ok(policy)
}

pub async fn get_policy(state: &AppState, ns: &str, mci_id: &str) -> Result<serde_json::Value> {
    ensure_ns(state, ns).await?;
    match state.store.get(&Mci::policy_key(ns, mci_id)).await? {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Err(CoreError::NotFound(format!(
            "no policy stored for MCI '{}'",
            mci_id
        ))),
    }
}

pub async fn delete_policy(state: &AppState, ns: &str, mci_id: &str) -> Result<()> {
    ensure_ns(state, ns).await?;
    if !state.store.delete(&Mci::policy_key(ns, mci_id)).await? {
        return Err(CoreError::NotFound(format!(
            "no policy stored for MCI '{}'",
            mci_id
        )));
    }
    if let Ok(mut mci) = load_mci(state, ns, mci_id).await {
        mci.associated_policy_id = None;
        save_entity(state, &Mci::key(ns, mci_id), &mci).await?;
    }
    Ok(())
}

// =============================================================================
// Site-to-site VPN (streamed through the request registry)
// =============================================================================

/// Broker budget for one VPN operation.
const VPN_BROKER_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Serialize)]
pub struct VpnAccepted {
    #[serde(rename = "requestId")]
    pub request_id: String,
}

/// Kick off a VPN create. Returns a request id immediately; progress and
/// the terminal state are published under that id in the request registry.
pub async fn create_vpn(
    state: &AppState,
    ns: &str,
    mci_id: &str,
    body: serde_json::Value,
) -> Result<VpnAccepted> {
    load_mci(state, ns, mci_id).await?;

    let connection_name = body
        .get("ConnectionName")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    if connection_name.is_empty() {
        return Err(CoreError::Validation(
            "VPN request needs a ConnectionName".into(),
        ));
    }

    let request_id = state
        .tracker
        .open_stream(&format!("vpn-create {}/{}", ns, mci_id))
        .await;

    let broker = state.broker.clone();
    let tracker = state.tracker.clone();
    let rid = request_id.clone();
    tokio::spawn(async move {
        tracker.stream_progress(&rid, "dispatching VPN create to broker").await;
        match broker.create_vpn(&connection_name, body, VPN_BROKER_TIMEOUT).await {
            Ok(info) => {
                tracker
                    .close_stream(&rid, StreamPhase::Succeeded, &info.to_string())
                    .await;
            }
            Err(e) => {
                warn!(request = %rid, "VPN create failed: {}", e);
                tracker
                    .close_stream(&rid, StreamPhase::Failed, &e.to_string())
                    .await;
            }
        }
    });

    Ok(VpnAccepted { request_id })
}

/// Kick off a VPN delete, same streaming contract as create.
pub async fn delete_vpn(
    state: &AppState,
    ns: &str,
    mci_id: &str,
    connection_name: &str,
    vpn_name: &str,
) -> Result<VpnAccepted> {
    load_mci(state, ns, mci_id).await?;

    let request_id = state
        .tracker
        .open_stream(&format!("vpn-delete {}/{}", ns, mci_id))
        .await;

    let broker = state.broker.clone();
    let tracker = state.tracker.clone();
    let rid = request_id.clone();
    let conn = connection_name.to_string();
    let name = vpn_name.to_string();
    tokio::spawn(async move {
        tracker.stream_progress(&rid, "dispatching VPN delete to broker").await;
        match broker.delete_vpn(&conn, &name, VPN_BROKER_TIMEOUT).await {
            Ok(()) => {
                tracker
                    .close_stream(&rid, StreamPhase::Succeeded, "deleted")
                    .await;
            }
            Err(e) => {
                tracker
                    .close_stream(&rid, StreamPhase::Failed, &e.to_string())
                    .await;
            }
        }
    });

    Ok(VpnAccepted { request_id })
}
