//! Resource manager: CRUD over the namespaced resource kinds.
//!
//! Every kind follows the same contract: validate, allocate uuids, persist
//! the intent status, call the broker, reconcile CSP identifiers, persist
//! the terminal status. Deletes guard on dependents first.

pub mod data_disk;
pub mod image;
pub mod security_group;
pub mod spec;
pub mod ssh_key;
pub mod vnet;

use std::collections::HashMap;

use chrono::Utc;
use cirrus_kv::filter_by_depth;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::model::{KeyValue, Namespace, ResourceKind};
use crate::state::AppState;
use crate::util::{check_name, new_uuid};

// =============================================================================
// Namespace CRUD
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateNsRequest {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Description", default)]
    pub description: String,
}

pub async fn create_ns(state: &AppState, req: CreateNsRequest) -> Result<Namespace> {
    check_name(&req.name)?;
    let key = Namespace::key(&req.name);
    if state.store.exists(&key).await? {
        return Err(CoreError::Conflict(format!(
            "namespace '{}' already exists",
            req.name
        )));
    }

    let ns = Namespace {
        id: req.name.clone(),
        name: req.name,
        uuid: new_uuid(),
        description: req.description,
        created_time: Utc::now(),
    };
    state.store.put(&key, &serde_json::to_string(&ns)?).await?;
    Ok(ns)
}

pub async fn get_ns(state: &AppState, ns: &str) -> Result<Namespace> {
    match state.store.get(&Namespace::key(ns)).await? {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Err(CoreError::NotFound(format!("namespace '{}' not found", ns))),
    }
}

pub async fn list_ns(state: &AppState) -> Result<Vec<Namespace>> {
    let entries = state.store.list("/ns/").await?;
    let entries = filter_by_depth(entries, "/ns", 1);
    entries
        .into_iter()
        .map(|e| serde_json::from_str(&e.value).map_err(Into::into))
        .collect()
}

/// Delete a namespace. It must be empty of resources and MCIs.
pub async fn delete_ns(state: &AppState, ns: &str) -> Result<()> {
    get_ns(state, ns).await?;

    let children = state.store.list(&format!("/ns/{}/", ns)).await?;
    if !children.is_empty() {
        return Err(CoreError::Conflict(format!(
            "namespace '{}' is not empty ({} entries)",
            ns,
            children.len()
        )));
    }

    state.store.delete(&Namespace::key(ns)).await?;
    Ok(())
}

/// Namespace existence guard used by every scoped operation.
pub async fn ensure_ns(state: &AppState, ns: &str) -> Result<()> {
    if !state.store.exists(&Namespace::key(ns)).await? {
        return Err(CoreError::NotFound(format!("namespace '{}' not found", ns)));
    }
    Ok(())
}

// =============================================================================
// Shared entity helpers
// =============================================================================

pub(crate) async fn load_entity<T: DeserializeOwned>(
    state: &AppState,
    key: &str,
    what: &str,
) -> Result<T> {
    match state.store.get(key).await? {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Err(CoreError::NotFound(format!("{} not found", what))),
    }
}

pub(crate) async fn save_entity<T: Serialize>(state: &AppState, key: &str, entity: &T) -> Result<()> {
    state.store.put(key, &serde_json::to_string(entity)?).await?;
    Ok(())
}

/// Reject a duplicate id within the namespace.
pub(crate) async fn ensure_new_id(
    state: &AppState,
    kind: ResourceKind,
    ns: &str,
    id: &str,
) -> Result<()> {
    if state.store.exists(&kind.key(ns, id)).await? {
        return Err(CoreError::Conflict(format!(
            "{} '{}' already exists in namespace '{}'",
            kind, id, ns
        )));
    }
    Ok(())
}

/// System labels every managed entity carries, merged with user tags.
pub(crate) fn system_labels(
    ns: &str,
    id: &str,
    uuid: &str,
    connection_name: &str,
    tags: &[KeyValue],
) -> HashMap<String, String> {
    let mut labels = HashMap::new();
    labels.insert("sys.id".to_string(), id.to_string());
    labels.insert("sys.uuid".to_string(), uuid.to_string());
    labels.insert("sys.namespace".to_string(), ns.to_string());
    if !connection_name.is_empty() {
        labels.insert("sys.connectionName".to_string(), connection_name.to_string());
    }
    for tag in tags {
        labels.insert(tag.key.clone(), tag.value.clone());
    }
    labels
}

/// All VMs under a namespace, across every MCI. Used by in-use guards.
pub(crate) async fn vms_in_namespace(state: &AppState, ns: &str) -> Result<Vec<crate::model::Vm>> {
    let entries = state.store.list(&format!("/ns/{}/mci/", ns)).await?;
    let mut vms = Vec::new();
    for entry in entries {
        if entry.key.contains("/vm/") {
            vms.push(serde_json::from_str(&entry.value)?);
        }
    }
    Ok(vms)
}

// =============================================================================
// Generic reads (kind-dispatched endpoints)
// =============================================================================

/// Fetch one resource of any kind as its stored JSON document.
pub async fn get_resource_raw(
    state: &AppState,
    kind: ResourceKind,
    ns: &str,
    id: &str,
) -> Result<serde_json::Value> {
    ensure_ns(state, ns).await?;
    match state.store.get(&kind.key(ns, id)).await? {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Err(CoreError::NotFound(format!("{} '{}' not found", kind, id))),
    }
}

/// List all resources of a kind in a namespace (direct children only).
pub async fn list_resources_raw(
    state: &AppState,
    kind: ResourceKind,
    ns: &str,
) -> Result<Vec<serde_json::Value>> {
    ensure_ns(state, ns).await?;
    let prefix = kind.key_prefix(ns);
    let entries = state.store.list(&format!("{}/", prefix)).await?;
    filter_by_depth(entries, &prefix, 1)
        .into_iter()
        .map(|e| serde_json::from_str(&e.value).map_err(Into::into))
        .collect()
}

/// Kind-dispatched delete.
pub async fn delete_resource(
    state: &AppState,
    kind: ResourceKind,
    ns: &str,
    id: &str,
) -> Result<()> {
    match kind {
        ResourceKind::VNet => {
            vnet::delete_vnet(state, ns, id, false).await?;
            Ok(())
        }
        ResourceKind::SecurityGroup => security_group::delete_security_group(state, ns, id).await,
        ResourceKind::SshKey => ssh_key::delete_ssh_key(state, ns, id).await,
        ResourceKind::DataDisk => data_disk::delete_data_disk(state, ns, id).await,
        ResourceKind::Spec => spec::delete_spec(state, ns, id).await,
        ResourceKind::Image => image::delete_image(state, ns, id).await,
        ResourceKind::CustomImage => image::delete_custom_image(state, ns, id).await,
    }
}

/// Materialize the resources selected by a label selector. The kind space
/// here is wider than `ResourceKind`: MCIs and VMs are selectable too.
pub async fn select_resources(
    state: &AppState,
    kind: &str,
    selector: &str,
) -> Result<Vec<serde_json::Value>> {
    let keys = state.labels.select(kind, selector).await?;
    let mut out = Vec::with_capacity(keys.len());
    for key in keys {
        if let Some(raw) = state.store.get(&key).await? {
            out.push(serde_json::from_str(&raw)?);
        }
    }
    Ok(out)
}
