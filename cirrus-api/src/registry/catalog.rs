//! Static provider/region catalog.
//!
//! Loaded once at startup and read-only afterwards. On first bring-up the
//! catalog is pushed to the broker: one driver per provider, then one region
//! entry per `<provider>-<region>` plus one per `<provider>-<region>-<zone>`.

use serde::Deserialize;
use tracing::{info, warn};

use crate::broker::{BrokerClient, DriverReq, RegionReq};
use crate::error::{CoreError, Result};
use crate::model::KeyValue;

#[derive(Debug, Clone, Deserialize)]
pub struct RegionCatalog {
    #[serde(rename = "regionId")]
    pub region_id: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(default)]
    pub zones: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderCatalog {
    #[serde(rename = "providerName")]
    pub provider_name: String,
    #[serde(rename = "driverName")]
    pub driver_name: String,
    #[serde(rename = "driverLibFileName")]
    pub driver_lib_file_name: String,
    pub regions: Vec<RegionCatalog>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloudCatalog {
    pub providers: Vec<ProviderCatalog>,
}

impl CloudCatalog {
    /// Parse a catalog from its JSON form.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| CoreError::Internal(format!("cloud catalog: {}", e)))
    }

    /// The catalog asset shipped with the binary.
    pub fn load_default() -> Result<Self> {
        Self::from_json(include_str!("../../assets/cloud_catalog.json"))
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderCatalog> {
        self.providers.iter().find(|p| p.provider_name == name)
    }

    pub fn region(&self, provider: &str, region_id: &str) -> Option<&RegionCatalog> {
        self.provider(provider)?
            .regions
            .iter()
            .find(|r| r.region_id == region_id)
    }

    /// Zones declared for a region, e.g. `["us-east-1a", "us-east-1b"]`.
    pub fn zones(&self, provider: &str, region_id: &str) -> Option<&[String]> {
        self.region(provider, region_id).map(|r| r.zones.as_slice())
    }
}

/// Short zone suffix used in canonical names: `us-east-1a` under region
/// `us-east-1` becomes `a`.
pub fn zone_suffix(region_id: &str, zone_id: &str) -> String {
    match zone_id.strip_prefix(region_id) {
        Some(rest) => rest.trim_start_matches('-').to_string(),
        None => zone_id.to_string(),
    }
}

/// Canonical region-or-zone name: `<provider>-<region>[-<zone suffix>]`.
pub fn region_zone_name(provider: &str, region_id: &str, zone_id: Option<&str>) -> String {
    match zone_id {
        Some(z) => format!("{}-{}-{}", provider, region_id, zone_suffix(region_id, z)),
        None => format!("{}-{}", provider, region_id),
    }
}

/// Push the catalog to the broker. A failure aborts the provider it
/// happened in but the remaining providers are still pushed.
pub async fn bootstrap(catalog: &CloudCatalog, broker: &BrokerClient) -> Result<()> {
    for provider in &catalog.providers {
        if let Err(e) = bootstrap_provider(provider, broker).await {
            warn!(
                provider = %provider.provider_name,
                "catalog bootstrap failed for provider: {}", e
            );
        }
    }
    Ok(())
}

async fn bootstrap_provider(provider: &ProviderCatalog, broker: &BrokerClient) -> Result<()> {
    broker
        .register_driver(DriverReq {
            driver_name: provider.driver_name.clone(),
            provider_name: provider.provider_name.clone(),
            driver_lib_file_name: provider.driver_lib_file_name.clone(),
        })
        .await?;

    for region in &provider.regions {
        // Representative (region-only) entry.
        broker
            .register_region(RegionReq {
                region_name: region_zone_name(&provider.provider_name, &region.region_id, None),
                provider_name: provider.provider_name.clone(),
                key_value_info_list: vec![KeyValue {
                    key: "Region".into(),
                    value: region.region_id.clone(),
                }],
            })
            .await?;

        // One entry per zone.
        for zone in &region.zones {
            broker
                .register_region(RegionReq {
                    region_name: region_zone_name(
                        &provider.provider_name,
                        &region.region_id,
                        Some(zone),
                    ),
                    provider_name: provider.provider_name.clone(),
                    key_value_info_list: vec![
                        KeyValue {
                            key: "Region".into(),
                            value: region.region_id.clone(),
                        },
                        KeyValue {
                            key: "Zone".into(),
                            value: zone.clone(),
                        },
                    ],
                })
                .await?;
        }
    }

    info!(
        provider = %provider.provider_name,
        regions = provider.regions.len(),
        "catalog bootstrap pushed"
    );
    Ok(())
}
