//! MCI orchestrator: compound infrastructures of VMs and subgroups.

pub mod bastion;
pub mod create;
pub mod ops;
pub mod snapshot;

use cirrus_kv::filter_by_depth;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::warn;

use crate::error::{CoreError, Result};
use crate::model::{Mci, ResourceStatus, SubGroup, Vm};
use crate::resource::{ensure_ns, load_entity, save_entity};
use crate::state::AppState;

/// Label kind strings for orchestrator-owned entities.
pub const MCI_LABEL_KIND: &str = "mci";
pub const VM_LABEL_KIND: &str = "vm";

/// An MCI materialized with its VMs and subgroups.
#[derive(Debug, Serialize)]
pub struct MciView {
    #[serde(flatten)]
    pub mci: Mci,
    #[serde(rename = "VmList")]
    pub vm_list: Vec<Vm>,
    #[serde(rename = "SubGroupList")]
    pub sub_group_list: Vec<SubGroup>,
}

pub(crate) async fn load_mci(state: &AppState, ns: &str, id: &str) -> Result<Mci> {
    ensure_ns(state, ns).await?;
    load_entity(state, &Mci::key(ns, id), &format!("MCI '{}'", id)).await
}

pub(crate) async fn load_vms(state: &AppState, ns: &str, mci: &str) -> Result<Vec<Vm>> {
    let prefix = Mci::vm_prefix(ns, mci);
    let entries = state.store.list(&format!("{}/", prefix)).await?;
    filter_by_depth(entries, &prefix, 1)
        .into_iter()
        .map(|e| serde_json::from_str(&e.value).map_err(Into::into))
        .collect()
}

pub(crate) async fn load_subgroups(state: &AppState, ns: &str, mci: &str) -> Result<Vec<SubGroup>> {
    let prefix = Mci::subgroup_prefix(ns, mci);
    let entries = state.store.list(&format!("{}/", prefix)).await?;
    filter_by_depth(entries, &prefix, 1)
        .into_iter()
        .map(|e| serde_json::from_str(&e.value).map_err(Into::into))
        .collect()
}

pub async fn get_mci(state: &AppState, ns: &str, id: &str) -> Result<MciView> {
    let mci = load_mci(state, ns, id).await?;
    Ok(MciView {
        vm_list: load_vms(state, ns, id).await?,
        sub_group_list: load_subgroups(state, ns, id).await?,
        mci,
    })
}

pub async fn list_mcis(state: &AppState, ns: &str) -> Result<Vec<MciView>> {
    ensure_ns(state, ns).await?;
    let prefix = Mci::prefix(ns);
    let entries = state.store.list(&format!("{}/", prefix)).await?;
    let mut out = Vec::new();
    for entry in filter_by_depth(entries, &prefix, 1) {
        let mci: Mci = serde_json::from_str(&entry.value)?;
        out.push(MciView {
            vm_list: load_vms(state, ns, &mci.id).await?,
            sub_group_list: load_subgroups(state, ns, &mci.id).await?,
            mci,
        });
    }
    Ok(out)
}

pub async fn get_vm(state: &AppState, ns: &str, mci: &str, vm_id: &str) -> Result<Vm> {
    load_mci(state, ns, mci).await?;
    load_entity(state, &Vm::key(ns, mci, vm_id), &format!("VM '{}'", vm_id)).await
}

/// Delete one VM: terminate at the broker, drop its key, detach it from
/// its subgroup, and clear bastion edges pointing at it. A VM that still
/// serves as someone's bastion is protected unless `force` is set.
pub async fn delete_vm(
    state: &AppState,
    ns: &str,
    mci: &str,
    vm_id: &str,
    force: bool,
) -> Result<()> {
    let mut vm = get_vm(state, ns, mci, vm_id).await?;

    let dependents: Vec<String> = load_vms(state, ns, mci)
        .await?
        .into_iter()
        .filter(|v| v.bastion_vm_id.as_deref() == Some(vm_id))
        .map(|v| v.id)
        .collect();
    if !dependents.is_empty() && !force {
        return Err(CoreError::Conflict(format!(
            "VM '{}' is the bastion of {:?}; pass force=true to delete anyway",
            vm_id, dependents
        )));
    }

    vm.status = ResourceStatus::Deleting;
    save_entity(state, &Vm::key(ns, mci, vm_id), &vm).await?;

    if let Err(e) = state.broker.terminate_vm(&vm.connection_name, &vm.uuid).await {
        vm.status = ResourceStatus::ErrorOnDeleting;
        save_entity(state, &Vm::key(ns, mci, vm_id), &vm).await?;
        return Err(e);
    }

    // Deleting a bastion-target clears nothing; deleting a bastion clears
    // every edge that pointed at it.
    bastion::clear_bastion_refs(state, ns, mci, vm_id).await?;

    if let Some(sg_id) = &vm.sub_group_id {
        let sg_key = SubGroup::key(ns, mci, sg_id);
        if let Some(raw) = state.store.get(&sg_key).await? {
            let mut sg: SubGroup = serde_json::from_str(&raw)?;
            sg.vm_ids.retain(|v| v != vm_id);
            save_entity(state, &sg_key, &sg).await?;
        }
    }

    state.store.delete(&Vm::key(ns, mci, vm_id)).await?;
    state.labels.remove_entity(VM_LABEL_KIND, &vm.uuid).await?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct DeleteMciResult {
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "Failures", skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
}

/// Delete an MCI: fan out VM termination, then drop the whole subtree.
/// Without `force`, every VM must already be gone or in a terminal error
/// state.
pub async fn delete_mci(
    state: &AppState,
    ns: &str,
    id: &str,
    force: bool,
) -> Result<DeleteMciResult> {
    let mut mci = load_mci(state, ns, id).await?;
    let vms = load_vms(state, ns, id).await?;

    if !force {
        let alive: Vec<&str> = vms
            .iter()
            .filter(|v| !matches!(v.status, ResourceStatus::Deleted) && !v.status.is_error())
            .map(|v| v.id.as_str())
            .collect();
        if !alive.is_empty() {
            return Err(CoreError::Conflict(format!(
                "MCI '{}' still has running VMs {:?}; terminate them or pass option=force",
                id, alive
            )));
        }
    }

    mci.status = ResourceStatus::Deleting;
    save_entity(state, &Mci::key(ns, id), &mci).await?;

    // Per-VM failures do not abort the batch; they are reported back.
    let failures: Vec<String> = stream::iter(vms.clone())
        .map(|vm| {
            let broker = state.broker.clone();
            async move {
                match broker.terminate_vm(&vm.connection_name, &vm.uuid).await {
                    Ok(()) => None,
                    Err(e) => {
                        warn!(vm = %vm.id, "terminate failed during MCI delete: {}", e);
                        Some(format!("{}: {}", vm.id, e))
                    }
                }
            }
        })
        .buffer_unordered(32)
        .filter_map(|r| async { r })
        .collect()
        .await;

    for vm in &vms {
        state.labels.remove_entity(VM_LABEL_KIND, &vm.uuid).await?;
    }
    state.labels.remove_entity(MCI_LABEL_KIND, &mci.uuid).await?;
    state
        .store
        .delete_prefix(&format!("{}/", Mci::key(ns, id)))
        .await?;
    state.store.delete(&Mci::key(ns, id)).await?;
    state.store.delete(&Mci::policy_key(ns, id)).await?;

    Ok(DeleteMciResult {
        message: format!("the MCI ({}) has been deleted", id),
        failures,
    })
}
