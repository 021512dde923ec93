//! Data disk lifecycle, including attach/detach against a live VM.

use serde::Deserialize;

use crate::broker::DiskReq;
use crate::error::{CoreError, Result};
use crate::model::{DataDisk, ResourceKind, ResourceStatus, Vm};
use crate::registry;
use crate::state::AppState;
use crate::util::{check_name, new_uuid};

use super::{ensure_new_id, ensure_ns, load_entity, save_entity, system_labels};

#[derive(Debug, Deserialize)]
pub struct CreateDataDiskRequest {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ConnectionName")]
    pub connection_name: String,
    #[serde(rename = "DiskType", default)]
    pub disk_type: String,
    #[serde(rename = "DiskSize", default)]
    pub disk_size: String,
}

fn key_of(ns: &str, id: &str) -> String {
    ResourceKind::DataDisk.key(ns, id)
}

pub async fn create_data_disk(
    state: &AppState,
    ns: &str,
    req: CreateDataDiskRequest,
) -> Result<DataDisk> {
    ensure_ns(state, ns).await?;
    check_name(&req.name)?;
    ensure_new_id(state, ResourceKind::DataDisk, ns, &req.name).await?;
    registry::get_connection(state, &req.connection_name).await?;

    let mut disk = DataDisk {
        id: req.name.clone(),
        uuid: new_uuid(),
        name: req.name.clone(),
        connection_name: req.connection_name.clone(),
        disk_type: req.disk_type,
        disk_size: req.disk_size,
        status: ResourceStatus::Configuring,
        csp_disk_id: String::new(),
        csp_disk_name: String::new(),
        attached_vm_id: None,
    };
    save_entity(state, &key_of(ns, &disk.id), &disk).await?;

    match state
        .broker
        .create_disk(
            &disk.connection_name,
            DiskReq {
                name: disk.uuid.clone(),
                disk_type: disk.disk_type.clone(),
                disk_size: disk.disk_size.clone(),
            },
        )
        .await
    {
        Ok(info) => {
            disk.csp_disk_id = info.iid.system_id;
            disk.csp_disk_name = info.iid.name_id;
            if !info.disk_type.is_empty() {
                disk.disk_type = info.disk_type;
            }
            if !info.disk_size.is_empty() {
                disk.disk_size = info.disk_size;
            }
            disk.status = ResourceStatus::Available;
            save_entity(state, &key_of(ns, &disk.id), &disk).await?;
        }
        Err(e) => {
            disk.status = ResourceStatus::ErrorOnConfiguring;
            save_entity(state, &key_of(ns, &disk.id), &disk).await?;
            return Err(e);
        }
    }

    state
        .labels
        .put_labels(
            ResourceKind::DataDisk.as_str(),
            &disk.uuid,
            &key_of(ns, &disk.id),
            system_labels(ns, &disk.id, &disk.uuid, &disk.connection_name, &[]),
        )
        .await?;

    Ok(disk)
}

pub async fn get_data_disk(state: &AppState, ns: &str, id: &str) -> Result<DataDisk> {
    ensure_ns(state, ns).await?;
    load_entity(state, &key_of(ns, id), &format!("dataDisk '{}'", id)).await
}

pub async fn delete_data_disk(state: &AppState, ns: &str, id: &str) -> Result<()> {
    let mut disk = get_data_disk(state, ns, id).await?;

    if let Some(vm_id) = &disk.attached_vm_id {
        return Err(CoreError::Conflict(format!(
            "dataDisk '{}' is attached to VM '{}'",
            id, vm_id
        )));
    }

    disk.status = ResourceStatus::Deleting;
    save_entity(state, &key_of(ns, id), &disk).await?;

    if let Err(e) = state
        .broker
        .delete_disk(&disk.connection_name, &disk.uuid)
        .await
    {
        disk.status = ResourceStatus::ErrorOnDeleting;
        save_entity(state, &key_of(ns, id), &disk).await?;
        return Err(e);
    }

    state.store.delete(&key_of(ns, id)).await?;
    state
        .labels
        .remove_entity(ResourceKind::DataDisk.as_str(), &disk.uuid)
        .await?;
    Ok(())
}

/// Attach a disk to a VM; both documents are updated after the broker
/// acknowledges.
pub async fn attach_data_disk(
    state: &AppState,
    ns: &str,
    disk_id: &str,
    mci_id: &str,
    vm_id: &str,
) -> Result<DataDisk> {
    let mut disk = get_data_disk(state, ns, disk_id).await?;
    if disk.attached_vm_id.is_some() {
        return Err(CoreError::Conflict(format!(
            "dataDisk '{}' is already attached",
            disk_id
        )));
    }

    let vm_key = Vm::key(ns, mci_id, vm_id);
    let mut vm: Vm = load_entity(state, &vm_key, &format!("VM '{}'", vm_id)).await?;

    disk.status = ResourceStatus::Updating;
    save_entity(state, &key_of(ns, disk_id), &disk).await?;

    match state
        .broker
        .attach_disk(&disk.connection_name, &disk.uuid, &vm.uuid)
        .await
    {
        Ok(_) => {
            disk.attached_vm_id = Some(vm_id.to_string());
            disk.status = ResourceStatus::InUse;
            save_entity(state, &key_of(ns, disk_id), &disk).await?;

            if !vm.data_disk_ids.iter().any(|d| d == disk_id) {
                vm.data_disk_ids.push(disk_id.to_string());
                save_entity(state, &vm_key, &vm).await?;
            }
            Ok(disk)
        }
        Err(e) => {
            disk.status = ResourceStatus::ErrorOnUpdating;
            save_entity(state, &key_of(ns, disk_id), &disk).await?;
            Err(e)
        }
    }
}

pub async fn detach_data_disk(
    state: &AppState,
    ns: &str,
    disk_id: &str,
    mci_id: &str,
    vm_id: &str,
) -> Result<DataDisk> {
    let mut disk = get_data_disk(state, ns, disk_id).await?;
    if disk.attached_vm_id.as_deref() != Some(vm_id) {
        return Err(CoreError::Conflict(format!(
            "dataDisk '{}' is not attached to VM '{}'",
            disk_id, vm_id
        )));
    }

    let vm_key = Vm::key(ns, mci_id, vm_id);
    let mut vm: Vm = load_entity(state, &vm_key, &format!("VM '{}'", vm_id)).await?;

    disk.status = ResourceStatus::Updating;
    save_entity(state, &key_of(ns, disk_id), &disk).await?;

    match state
        .broker
        .detach_disk(&disk.connection_name, &disk.uuid, &vm.uuid)
        .await
    {
        Ok(()) => {
            disk.attached_vm_id = None;
            disk.status = ResourceStatus::Available;
            save_entity(state, &key_of(ns, disk_id), &disk).await?;

            vm.data_disk_ids.retain(|d| d != disk_id);
            save_entity(state, &vm_key, &vm).await?;
            Ok(disk)
        }
        Err(e) => {
            disk.status = ResourceStatus::ErrorOnUpdating;
            save_entity(state, &key_of(ns, disk_id), &disk).await?;
            Err(e)
        }
    }
}
