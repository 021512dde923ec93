//! SSH key lifecycle. The private half is returned once from create and
//! stored redacted.

use serde::Deserialize;

use crate::broker::KeyPairReq;
use crate::error::{CoreError, Result};
use crate::model::{ResourceKind, ResourceStatus, SshKey};
use crate::registry;
use crate::state::AppState;
use crate::util::{check_name, new_uuid};

use super::{ensure_new_id, ensure_ns, load_entity, save_entity, system_labels, vms_in_namespace};

#[derive(Debug, Deserialize)]
pub struct CreateSshKeyRequest {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ConnectionName")]
    pub connection_name: String,
    #[serde(rename = "Username", default)]
    pub username: String,
    #[serde(rename = "Description", default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterSshKeyRequest {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ConnectionName")]
    pub connection_name: String,
    #[serde(rename = "CspKeyPairId")]
    pub csp_key_pair_id: String,
}

fn key_of(ns: &str, id: &str) -> String {
    ResourceKind::SshKey.key(ns, id)
}

pub async fn create_ssh_key(
    state: &AppState,
    ns: &str,
    req: CreateSshKeyRequest,
) -> Result<SshKey> {
    ensure_ns(state, ns).await?;
    check_name(&req.name)?;
    ensure_new_id(state, ResourceKind::SshKey, ns, &req.name).await?;
    registry::get_connection(state, &req.connection_name).await?;

    let mut key = SshKey {
        id: req.name.clone(),
        uuid: new_uuid(),
        name: req.name.clone(),
        connection_name: req.connection_name.clone(),
        description: req.description,
        username: req.username,
        public_key: String::new(),
        private_key: String::new(),
        status: ResourceStatus::Configuring,
        csp_key_pair_id: String::new(),
        csp_key_pair_name: String::new(),
    };
    save_entity(state, &key_of(ns, &key.id), &key).await?;

    let private_key;
    match state
        .broker
        .create_keypair(
            &key.connection_name,
            KeyPairReq {
                name: key.uuid.clone(),
            },
        )
        .await
    {
        Ok(info) => {
            key.public_key = info.public_key;
            key.csp_key_pair_id = info.iid.system_id;
            key.csp_key_pair_name = info.iid.name_id;
            key.status = ResourceStatus::Available;
            private_key = info.private_key;
            // The stored copy never carries the private half.
            save_entity(state, &key_of(ns, &key.id), &key).await?;
        }
        Err(e) => {
            key.status = ResourceStatus::ErrorOnConfiguring;
            save_entity(state, &key_of(ns, &key.id), &key).await?;
            return Err(e);
        }
    }

    state
        .labels
        .put_labels(
            ResourceKind::SshKey.as_str(),
            &key.uuid,
            &key_of(ns, &key.id),
            system_labels(ns, &key.id, &key.uuid, &key.connection_name, &[]),
        )
        .await?;

    key.private_key = private_key;
    Ok(key)
}

/// Adopt an existing CSP keypair, located through the broker's listing.
pub async fn register_ssh_key(
    state: &AppState,
    ns: &str,
    req: RegisterSshKeyRequest,
) -> Result<SshKey> {
    ensure_ns(state, ns).await?;
    check_name(&req.name)?;
    ensure_new_id(state, ResourceKind::SshKey, ns, &req.name).await?;
    registry::get_connection(state, &req.connection_name).await?;

    let keypairs = state.broker.list_keypairs(&req.connection_name).await?;
    let found = keypairs
        .into_iter()
        .find(|k| k.iid.system_id == req.csp_key_pair_id)
        .ok_or_else(|| {
            CoreError::NotFound(format!(
                "keypair '{}' not found under connection '{}'",
                req.csp_key_pair_id, req.connection_name
            ))
        })?;

    let key = SshKey {
        id: req.name.clone(),
        uuid: new_uuid(),
        name: req.name.clone(),
        connection_name: req.connection_name.clone(),
        description: String::new(),
        username: String::new(),
        public_key: found.public_key,
        private_key: String::new(),
        status: ResourceStatus::Available,
        csp_key_pair_id: found.iid.system_id,
        csp_key_pair_name: found.iid.name_id,
    };
    save_entity(state, &key_of(ns, &key.id), &key).await?;

    state
        .labels
        .put_labels(
            ResourceKind::SshKey.as_str(),
            &key.uuid,
            &key_of(ns, &key.id),
            system_labels(ns, &key.id, &key.uuid, &key.connection_name, &[]),
        )
        .await?;

    Ok(key)
}

pub async fn get_ssh_key(state: &AppState, ns: &str, id: &str) -> Result<SshKey> {
    ensure_ns(state, ns).await?;
    load_entity(state, &key_of(ns, id), &format!("sshKey '{}'", id)).await
}

pub async fn delete_ssh_key(state: &AppState, ns: &str, id: &str) -> Result<()> {
    let mut key = get_ssh_key(state, ns, id).await?;

    for vm in vms_in_namespace(state, ns).await? {
        if vm.ssh_key_id == id {
            return Err(CoreError::Conflict(format!(
                "sshKey '{}' is in use by VM '{}'",
                id, vm.id
            )));
        }
    }

    key.status = ResourceStatus::Deleting;
    save_entity(state, &key_of(ns, id), &key).await?;

    if let Err(e) = state
        .broker
        .delete_keypair(&key.connection_name, &key.uuid)
        .await
    {
        key.status = ResourceStatus::ErrorOnDeleting;
        save_entity(state, &key_of(ns, id), &key).await?;
        return Err(e);
    }

    state.store.delete(&key_of(ns, id)).await?;
    state
        .labels
        .remove_entity(ResourceKind::SshKey.as_str(), &key.uuid)
        .await?;
    Ok(())
}
