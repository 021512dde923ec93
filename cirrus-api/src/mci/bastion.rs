//! Bastion wiring between VMs.
//!
//! `target → bastion` is a many-to-one edge stored on the target VM.
//! Cycles are rejected: a VM cannot be its own bastion, and two VMs cannot
//! be each other's bastion.

use serde::Serialize;

use crate::error::{CoreError, Result};
use crate::model::Vm;
use crate::resource::save_entity;
use crate::state::AppState;

use super::{get_vm, load_vms};

#[derive(Debug, Serialize)]
pub struct BastionView {
    #[serde(rename = "bastionVmId", skip_serializing_if = "Option::is_none")]
    pub bastion_vm_id: Option<String>,
}

/// Record `target → bastion`.
pub async fn set_bastion(
    state: &AppState,
    ns: &str,
    mci: &str,
    target_id: &str,
    bastion_id: &str,
) -> Result<BastionView> {
    if target_id == bastion_id {
        return Err(CoreError::Validation(
            "a VM cannot be its own bastion".into(),
        ));
    }

    let mut target = get_vm(state, ns, mci, target_id).await?;
    let bastion = get_vm(state, ns, mci, bastion_id).await?;

    if bastion.bastion_vm_id.as_deref() == Some(target_id) {
        return Err(CoreError::Conflict(format!(
            "VM '{}' already uses '{}' as its bastion; the reverse edge would form a cycle",
            bastion_id, target_id
        )));
    }

    target.bastion_vm_id = Some(bastion_id.to_string());
    save_entity(state, &Vm::key(ns, mci, target_id), &target).await?;

    Ok(BastionView {
        bastion_vm_id: target.bastion_vm_id,
    })
}

/// Walk from a target to its bastion. An unset edge is an empty body, not
/// an error.
pub async fn get_bastion(
    state: &AppState,
    ns: &str,
    mci: &str,
    target_id: &str,
) -> Result<BastionView> {
    let target = get_vm(state, ns, mci, target_id).await?;
    Ok(BastionView {
        bastion_vm_id: target.bastion_vm_id,
    })
}

/// Clear every edge pointing at `bastion_id`. Returns how many were
/// cleared.
pub async fn clear_bastion_refs(
    state: &AppState,
    ns: &str,
    mci: &str,
    bastion_id: &str,
) -> Result<usize> {
    let mut cleared = 0;
    for mut vm in load_vms(state, ns, mci).await? {
        if vm.bastion_vm_id.as_deref() == Some(bastion_id) {
            vm.bastion_vm_id = None;
            save_entity(state, &Vm::key(ns, mci, &vm.id), &vm).await?;
            cleared += 1;
        }
    }
    Ok(cleared)
}
