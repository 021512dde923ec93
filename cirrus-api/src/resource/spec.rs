//! VM spec catalog: bulk fetch from the broker into the local cache,
//! lookups served from the cache, and numeric range filtering.

use serde::Deserialize;

use crate::error::{CoreError, Result};
use crate::model::{ResourceKind, SpecInfo};
use crate::registry;
use crate::state::AppState;
use crate::util::{new_uuid, sanitize_id};

use super::{ensure_ns, load_entity, save_entity};

fn key_of(ns: &str, id: &str) -> String {
    ResourceKind::Spec.key(ns, id)
}

/// Local id for a fetched spec: `<connection>-<csp name>`, sanitized into
/// the id alphabet (`t2.micro` → `t2-micro`).
pub fn spec_id(connection_name: &str, csp_spec_name: &str) -> String {
    sanitize_id(&format!("{}-{}", connection_name, csp_spec_name))
}

/// Import the broker's spec list for one connection into the cache.
/// Returns the cached spec set.
pub async fn fetch_specs(
    state: &AppState,
    ns: &str,
    connection_name: &str,
) -> Result<Vec<SpecInfo>> {
    ensure_ns(state, ns).await?;
    let conn = registry::get_connection(state, connection_name).await?;

    let wire = state.broker.list_vmspecs(connection_name).await?;
    let mut out = Vec::with_capacity(wire.len());
    for w in wire {
        let id = spec_id(connection_name, &w.name);
        // Re-fetch keeps the uuid of an already-cached spec stable.
        let uuid = match state.store.get(&key_of(ns, &id)).await? {
            Some(raw) => serde_json::from_str::<SpecInfo>(&raw)?.uuid,
            None => new_uuid(),
        };
        let spec = SpecInfo {
            id: id.clone(),
            uuid,
            name: id.clone(),
            connection_name: connection_name.to_string(),
            provider_name: conn.provider_name.clone(),
            region_name: conn.region_zone_info.assigned_region.clone(),
            csp_spec_name: w.name,
            vcpu: w.vcpu.count,
            memory_gib: w.mem_size_mib as f64 / 1024.0,
            cost_per_hour: w.cost_per_hour,
            description: String::new(),
        };
        save_entity(state, &key_of(ns, &id), &spec).await?;
        out.push(spec);
    }
    Ok(out)
}

pub async fn get_spec(state: &AppState, ns: &str, id: &str) -> Result<SpecInfo> {
    ensure_ns(state, ns).await?;
    load_entity(state, &key_of(ns, id), &format!("spec '{}'", id)).await
}

pub async fn list_specs(state: &AppState, ns: &str) -> Result<Vec<SpecInfo>> {
    super::list_resources_raw(state, ResourceKind::Spec, ns)
        .await?
        .into_iter()
        .map(|v| serde_json::from_value(v).map_err(Into::into))
        .collect()
}

/// Cache eviction; the broker is not involved for catalog data.
pub async fn delete_spec(state: &AppState, ns: &str, id: &str) -> Result<()> {
    ensure_ns(state, ns).await?;
    if !state.store.delete(&key_of(ns, id)).await? {
        return Err(CoreError::NotFound(format!("spec '{}' not found", id)));
    }
    Ok(())
}

/// Numeric range predicates over the cached spec set. Bounds are
/// inclusive; absent bounds are open.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SpecRangeFilter {
    #[serde(rename = "MinVCPU", default)]
    pub min_vcpu: Option<u32>,
    #[serde(rename = "MaxVCPU", default)]
    pub max_vcpu: Option<u32>,
    #[serde(rename = "MinMemoryGiB", default)]
    pub min_memory_gib: Option<f64>,
    #[serde(rename = "MaxMemoryGiB", default)]
    pub max_memory_gib: Option<f64>,
    #[serde(rename = "MinCostPerHour", default)]
    pub min_cost_per_hour: Option<f64>,
    #[serde(rename = "MaxCostPerHour", default)]
    pub max_cost_per_hour: Option<f64>,
    #[serde(rename = "ConnectionName", default)]
    pub connection_name: Option<String>,
}

impl SpecRangeFilter {
    pub fn matches(&self, spec: &SpecInfo) -> bool {
        if let Some(min) = self.min_vcpu {
            if spec.vcpu < min {
                return false;
            }
        }
        if let Some(max) = self.max_vcpu {
            if spec.vcpu > max {
                return false;
            }
        }
        if let Some(min) = self.min_memory_gib {
            if spec.memory_gib < min {
                return false;
            }
        }
        if let Some(max) = self.max_memory_gib {
            if spec.memory_gib > max {
                return false;
            }
        }
        if let Some(min) = self.min_cost_per_hour {
            if spec.cost_per_hour < min {
                return false;
            }
        }
        if let Some(max) = self.max_cost_per_hour {
            if spec.cost_per_hour > max {
                return false;
            }
        }
        if let Some(conn) = &self.connection_name {
            if &spec.connection_name != conn {
                return false;
            }
        }
        true
    }
}

pub async fn filter_specs_by_range(
    state: &AppState,
    ns: &str,
    filter: SpecRangeFilter,
) -> Result<Vec<SpecInfo>> {
    Ok(list_specs(state, ns)
        .await?
        .into_iter()
        .filter(|s| filter.matches(s))
        .collect())
}
