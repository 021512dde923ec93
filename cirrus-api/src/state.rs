//! Shared application state.

use std::sync::atomic::AtomicBool;

use cirrus_kv::{KvStore, LabelIndex};

use crate::broker::BrokerClient;
use crate::config::Config;
use crate::ratelimit::RateLimits;
use crate::registry::catalog::CloudCatalog;
use crate::registry::keystore::KeyStore;
use crate::tracker::RequestTracker;

/// Everything a request handler can reach. No ambient globals: the
/// private-key store and the cloud catalog live here.
pub struct AppState {
    pub config: Config,
    pub store: KvStore,
    pub labels: LabelIndex,
    pub broker: BrokerClient,
    pub catalog: CloudCatalog,
    pub key_store: KeyStore,
    pub tracker: RequestTracker,
    pub limits: RateLimits,
    /// True once every route is installed; reported by `/readyz`.
    pub system_ready: AtomicBool,
}

impl AppState {
    /// Assemble the state over an opened store.
    pub async fn build(
        config: Config,
        store: KvStore,
        catalog: CloudCatalog,
    ) -> crate::error::Result<std::sync::Arc<Self>> {
        let labels = LabelIndex::open(store.clone()).await?;
        let broker = BrokerClient::new(&config.spider_rest_url);
        let tracker = RequestTracker::new(store.clone());

        Ok(std::sync::Arc::new(Self {
            config,
            store,
            labels,
            broker,
            catalog,
            key_store: KeyStore::new(),
            tracker,
            limits: RateLimits::new(),
            system_ready: AtomicBool::new(false),
        }))
    }
}
