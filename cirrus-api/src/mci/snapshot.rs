//! VM snapshot: one broker call producing a customImage plus a dataDisk
//! entity per returned disk, all linked back to the source VM.

use serde::{Deserialize, Serialize};

use crate::broker::SnapshotReq;
use crate::error::Result;
use crate::model::{CustomImage, DataDisk, ResourceKind, ResourceStatus};
use crate::resource::{ensure_new_id, save_entity, system_labels};
use crate::state::AppState;
use crate::util::{check_name, new_uuid};

use super::get_vm;

#[derive(Debug, Deserialize)]
pub struct SnapshotRequest {
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct SnapshotResult {
    #[serde(rename = "CustomImage")]
    pub custom_image: CustomImage,
    #[serde(rename = "DataDisks")]
    pub data_disks: Vec<DataDisk>,
}

pub async fn snapshot_vm(
    state: &AppState,
    ns: &str,
    mci: &str,
    vm_id: &str,
    req: SnapshotRequest,
) -> Result<SnapshotResult> {
    check_name(&req.name)?;
    ensure_new_id(state, ResourceKind::CustomImage, ns, &req.name).await?;
    let vm = get_vm(state, ns, mci, vm_id).await?;

    let mut image = CustomImage {
        id: req.name.clone(),
        uuid: new_uuid(),
        name: req.name.clone(),
        connection_name: vm.connection_name.clone(),
        source_vm_id: vm.id.clone(),
        source_vm_spec_id: vm.spec_id.clone(),
        csp_custom_image_id: String::new(),
        csp_custom_image_name: String::new(),
        status: ResourceStatus::Configuring,
        description: format!("snapshot of VM '{}'", vm.id),
    };
    let image_key = ResourceKind::CustomImage.key(ns, &image.id);
    save_entity(state, &image_key, &image).await?;

    let info = match state
        .broker
        .snapshot_vm(
            &vm.connection_name,
            SnapshotReq {
                name: image.uuid.clone(),
                source_vm: vm.uuid.clone(),
            },
        )
        .await
    {
        Ok(info) => info,
        Err(e) => {
            image.status = ResourceStatus::ErrorOnConfiguring;
            save_entity(state, &image_key, &image).await?;
            return Err(e);
        }
    };

    image.csp_custom_image_id = info.iid.system_id.clone();
    image.csp_custom_image_name = info.iid.name_id.clone();
    image.status = ResourceStatus::Available;
    save_entity(state, &image_key, &image).await?;

    state
        .labels
        .put_labels(
            ResourceKind::CustomImage.as_str(),
            &image.uuid,
            &image_key,
            system_labels(ns, &image.id, &image.uuid, &image.connection_name, &[]),
        )
        .await?;

    // Every data disk the snapshot reports becomes a local entity tied to
    // the source VM's connection.
    let mut data_disks = Vec::with_capacity(info.data_disk_iids.len());
    for (i, disk_iid) in info.data_disk_iids.iter().enumerate() {
        let disk_id = format!("{}-disk-{:02}", req.name, i);
        let disk = DataDisk {
            id: disk_id.clone(),
            uuid: new_uuid(),
            name: disk_id.clone(),
            connection_name: vm.connection_name.clone(),
            disk_type: String::new(),
            disk_size: String::new(),
            status: ResourceStatus::Available,
            csp_disk_id: disk_iid.system_id.clone(),
            csp_disk_name: disk_iid.name_id.clone(),
            attached_vm_id: None,
        };
        let disk_key = ResourceKind::DataDisk.key(ns, &disk.id);
        save_entity(state, &disk_key, &disk).await?;
        state
            .labels
            .put_labels(
                ResourceKind::DataDisk.as_str(),
                &disk.uuid,
                &disk_key,
                system_labels(ns, &disk.id, &disk.uuid, &disk.connection_name, &[]),
            )
            .await?;
        data_disks.push(disk);
    }

    Ok(SnapshotResult {
        custom_image: image,
        data_disks,
    })
}
