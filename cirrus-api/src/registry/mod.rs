//! Connection registry: credential registration, connection fan-out
//! verification, and region-representative election.

pub mod catalog;
pub mod envelope;
pub mod keystore;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

use crate::broker::{ConnectionConfigReq, CredentialReq};
use crate::error::{CoreError, Result};
use crate::model::{
    ConnConfig, CredentialHolder, KeyValue, RedactedCredential, RegionDetail, RegionZoneInfo,
};
use crate::state::AppState;
use crate::util::check_name;

use self::catalog::{region_zone_name, zone_suffix};
use self::envelope::CredentialEnvelope;

/// Credentials registered without an explicit holder belong to this one;
/// its connection names carry no holder prefix.
pub const DEFAULT_CREDENTIAL_HOLDER: &str = "admin";

/// Hard cap on concurrent broker pushes and probes.
pub const FANOUT_WORKER_CAP: usize = 32;

#[derive(Debug, Serialize)]
pub struct PublicKeyResponse {
    #[serde(rename = "publicKeyTokenId")]
    pub public_key_token_id: String,
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

#[derive(Debug, Serialize)]
pub struct ConnConfigList {
    #[serde(rename = "ConnConfig")]
    pub conn_config: Vec<ConnConfig>,
}

/// Issue an RSA public key for envelope sealing.
pub fn issue_public_key(state: &AppState) -> Result<PublicKeyResponse> {
    let (token, pem) = state.key_store.issue()?;
    Ok(PublicKeyResponse {
        public_key_token_id: token,
        public_key: pem,
    })
}

/// List every stored connection, ordered by name.
pub async fn list_connections(state: &AppState) -> Result<ConnConfigList> {
    let mut configs = Vec::new();
    for entry in state.store.list("/connection/").await? {
        configs.push(serde_json::from_str::<ConnConfig>(&entry.value)?);
    }
    Ok(ConnConfigList {
        conn_config: configs,
    })
}

/// Fetch one connection by name.
pub async fn get_connection(state: &AppState, name: &str) -> Result<ConnConfig> {
    match state.store.get(&ConnConfig::key(name)).await? {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None => Err(CoreError::NotFound(format!(
            "connection '{}' not found",
            name
        ))),
    }
}

/// Register an encrypted credential envelope: open it, forward the
/// credential to the broker, then verify every connection of the provider
/// and elect region representatives. Returns the full connection list.
pub async fn register_credential(
    state: &AppState,
    envelope: CredentialEnvelope,
) -> Result<ConnConfigList> {
    let holder = if envelope.credential_holder.is_empty() {
        DEFAULT_CREDENTIAL_HOLDER.to_string()
    } else {
        envelope.credential_holder.clone()
    };
    check_name(&holder)?;

    let provider = state
        .catalog
        .provider(&envelope.provider_name)
        .ok_or_else(|| {
            CoreError::Validation(format!(
                "unknown provider '{}'",
                envelope.provider_name
            ))
        })?
        .clone();

    // The private key is one-shot: it leaves the store here and never
    // returns, whether or not the rest of the registration succeeds.
    let private_key = state
        .key_store
        .take(&envelope.public_key_token_id)
        .ok_or_else(|| {
            CoreError::NotFound(format!(
                "public key token '{}' not found",
                envelope.public_key_token_id
            ))
        })?;

    let key_values = envelope::open_envelope(&private_key, &envelope)?;
    drop(private_key);

    let credential_name = if holder == DEFAULT_CREDENTIAL_HOLDER {
        provider.provider_name.clone()
    } else {
        format!("{}-{}", holder, provider.provider_name)
    };

    state
        .broker
        .register_credential(CredentialReq {
            credential_name: credential_name.clone(),
            provider_name: provider.provider_name.clone(),
            key_value_info_list: key_values.clone(),
        })
        .await?;

    persist_redacted_holder(state, &holder, &credential_name, &provider.provider_name, &key_values)
        .await?;

    verify_connections(state, &provider, &holder, &credential_name).await?;

    list_connections(state).await
}

async fn persist_redacted_holder(
    state: &AppState,
    holder: &str,
    credential_name: &str,
    provider_name: &str,
    key_values: &[KeyValue],
) -> Result<()> {
    let key = CredentialHolder::key(holder);
    let mut record: CredentialHolder = match state.store.get(&key).await? {
        Some(raw) => serde_json::from_str(&raw)?,
        None => CredentialHolder {
            credential_holder: holder.to_string(),
            credentials: vec![],
        },
    };

    record.credentials.retain(|c| c.credential_name != credential_name);
    record.credentials.push(RedactedCredential {
        credential_name: credential_name.to_string(),
        provider_name: provider_name.to_string(),
        credential_keys: key_values.iter().map(|kv| kv.key.clone()).collect(),
    });

    state.store.put(&key, &serde_json::to_string(&record)?).await?;
    Ok(())
}

fn candidate_configs(
    provider: &catalog::ProviderCatalog,
    holder: &str,
    credential_name: &str,
) -> Vec<ConnConfig> {
    let mut out = Vec::new();

    for region in &provider.regions {
        let detail = RegionDetail {
            region_id: region.region_id.clone(),
            display_name: region.display_name.clone(),
            zones: region.zones.clone(),
        };

        let mut names = vec![(
            region_zone_name(&provider.provider_name, &region.region_id, None),
            String::new(),
        )];
        for zone in &region.zones {
            names.push((
                region_zone_name(&provider.provider_name, &region.region_id, Some(zone)),
                zone.clone(),
            ));
        }

        for (rz_name, zone) in names {
            let config_name = if holder == DEFAULT_CREDENTIAL_HOLDER {
                rz_name.clone()
            } else {
                format!("{}-{}", holder, rz_name)
            };
            out.push(ConnConfig {
                config_name,
                provider_name: provider.provider_name.clone(),
                driver_name: provider.driver_name.clone(),
                credential_name: credential_name.to_string(),
                credential_holder: holder.to_string(),
                region_zone_info_name: rz_name,
                region_zone_info: RegionZoneInfo {
                    assigned_region: region.region_id.clone(),
                    assigned_zone: zone,
                },
                region_detail: detail.clone(),
                verified: false,
                region_representative: false,
            });
        }
    }
    out
}

/// Push connection configs to the broker and probe them in parallel.
/// Probe results arrive on an unbounded fan-in channel in completion
/// order; the first verified config of each region group becomes the
/// region representative.
async fn verify_connections(
    state: &AppState,
    provider: &catalog::ProviderCatalog,
    holder: &str,
    credential_name: &str,
) -> Result<()> {
    let candidates = candidate_configs(provider, holder, credential_name);

    // Push every config; a failed push drops the candidate but does not
    // abort the batch.
    let pushed: Vec<ConnConfig> = stream::iter(candidates)
        .map(|config| {
            let broker = state.broker.clone();
            async move {
                let req = ConnectionConfigReq {
                    config_name: config.config_name.clone(),
                    provider_name: config.provider_name.clone(),
                    driver_name: config.driver_name.clone(),
                    credential_name: config.credential_name.clone(),
                    region_name: config.region_zone_info_name.clone(),
                };
                match broker.create_connection_config(req).await {
                    Ok(()) => Some(config),
                    Err(e) => {
                        warn!(config = %config.config_name, "connection push failed: {}", e);
                        None
                    }
                }
            }
        })
        .buffer_unordered(FANOUT_WORKER_CAP)
        .filter_map(|c| async { c })
        .collect()
        .await;

    // Probe reachability, one worker per config with a hard cap, paced by
    // the probe token bucket.
    let (tx, mut rx) = mpsc::unbounded_channel::<(ConnConfig, bool)>();
    let semaphore = Arc::new(Semaphore::new(FANOUT_WORKER_CAP));

    for config in pushed {
        let broker = state.broker.clone();
        let pacer = state.limits.probe.clone();
        let semaphore = Arc::clone(&semaphore);
        let tx = tx.clone();
        tokio::spawn(async move {
            pacer.acquire().await;
            let _permit = semaphore.acquire_owned().await.expect("probe semaphore");
            let ok = match broker.list_keypairs(&config.config_name).await {
                Ok(_) => true,
                Err(e) => {
                    warn!(config = %config.config_name, "probe failed: {}", e);
                    false
                }
            };
            let _ = tx.send((config, ok));
        });
    }
    drop(tx);

    // Election state, grouped by (provider, region) within this holder.
    let mut representative_chosen: HashSet<String> = HashSet::new();
    let mut region_only: HashMap<String, ConnConfig> = HashMap::new();
    let mut zoned_by_region: HashMap<String, Vec<ConnConfig>> = HashMap::new();
    let mut verified_count = 0usize;

    while let Some((mut config, ok)) = rx.recv().await {
        let region = config.region_zone_info.assigned_region.clone();

        if config.region_zone_info.assigned_zone.is_empty() {
            region_only.insert(region.clone(), config.clone());
        } else {
            zoned_by_region.entry(region.clone()).or_default().push(config.clone());
        }

        if !ok {
            continue;
        }

        config.verified = true;
        verified_count += 1;
        if representative_chosen.insert(region) {
            config.region_representative = true;
        }
        state
            .store
            .put(
                &ConnConfig::key(&config.config_name),
                &serde_json::to_string(&config)?,
            )
            .await?;
    }

    // Regions where nothing verified still get a representative handle:
    // the region-only config, unverified, pointing at its lexicographically
    // first zoned sibling.
    for (region, mut config) in region_only {
        if representative_chosen.contains(&region) {
            continue;
        }

        if let Some(siblings) = zoned_by_region.get_mut(&region) {
            siblings.sort_by_key(|c| {
                zone_suffix(&region, &c.region_zone_info.assigned_zone)
            });
            if let Some(first) = siblings.first() {
                config.region_zone_info_name = first.region_zone_info_name.clone();
                config.region_zone_info.assigned_zone =
                    first.region_zone_info.assigned_zone.clone();
            }
        }

        config.verified = false;
        config.region_representative = true;
        state
            .store
            .put(
                &ConnConfig::key(&config.config_name),
                &serde_json::to_string(&config)?,
            )
            .await?;
    }

    info!(
        provider = %provider.provider_name,
        holder = %holder,
        verified = verified_count,
        "connection verification complete"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::catalog::{ProviderCatalog, RegionCatalog};

    fn provider() -> ProviderCatalog {
        ProviderCatalog {
            provider_name: "aws".into(),
            driver_name: "aws-driver".into(),
            driver_lib_file_name: "aws-driver-v1.0.so".into(),
            regions: vec![RegionCatalog {
                region_id: "us-east-1".into(),
                display_name: "N. Virginia".into(),
                zones: vec!["us-east-1a".into(), "us-east-1b".into()],
            }],
        }
    }

    #[test]
    fn test_candidates_default_holder_names() {
        let configs = candidate_configs(&provider(), DEFAULT_CREDENTIAL_HOLDER, "aws");
        let names: Vec<&str> = configs.iter().map(|c| c.config_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["aws-us-east-1", "aws-us-east-1-a", "aws-us-east-1-b"]
        );
        // The region-only entry has no zone assigned.
        assert_eq!(configs[0].region_zone_info.assigned_zone, "");
        assert_eq!(configs[1].region_zone_info.assigned_zone, "us-east-1a");
    }

    #[test]
    fn test_candidates_holder_prefix() {
        let configs = candidate_configs(&provider(), "teamx", "teamx-aws");
        assert_eq!(configs[0].config_name, "teamx-aws-us-east-1");
        assert_eq!(configs[0].credential_holder, "teamx");
        assert_eq!(configs[0].credential_name, "teamx-aws");
        // The broker-side region name carries no holder prefix.
        assert_eq!(configs[0].region_zone_info_name, "aws-us-east-1");
    }
}
