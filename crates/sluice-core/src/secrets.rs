//! Secret cache
//!
//! Interceptors read credentials from an in-memory snapshot. A background
//! task re-lists the backing source and swaps in a fresh map, so readers
//! never block on I/O and never see a half-built snapshot.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::SecretError;

/// Credential material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    /// Secret name
    pub name: String,
    /// Secret namespace
    pub namespace: String,
    /// Data fields
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Secret {
    /// Cache key, `namespace/name`
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Points at one field of one secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    /// Secret name
    pub secret_name: String,
    /// Data field
    pub secret_key: String,
    /// Namespace, defaults to the listener's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Where secrets come from
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// List every secret visible to the dispatcher
    async fn list(&self) -> Result<Vec<Secret>, SecretError>;
}

/// Fixed in-memory secrets
#[derive(Debug, Clone, Default)]
pub struct StaticSecretSource {
    secrets: Vec<Secret>,
}

impl StaticSecretSource {
    /// Create a source from a fixed list
    pub fn new(secrets: Vec<Secret>) -> Self {
        Self { secrets }
    }
}

#[async_trait]
impl SecretSource for StaticSecretSource {
    async fn list(&self) -> Result<Vec<Secret>, SecretError> {
        Ok(self.secrets.clone())
    }
}

type Snapshot = Arc<HashMap<String, Secret>>;

/// Copy-on-write cache of secrets keyed by `namespace/name`
#[derive(Clone)]
pub struct SecretCache {
    source: Arc<dyn SecretSource>,
    snapshot: Arc<RwLock<Snapshot>>,
}

impl SecretCache {
    /// Create an empty cache; call [`SecretCache::refresh`] to fill it
    pub fn new(source: Arc<dyn SecretSource>) -> Self {
        Self {
            source,
            snapshot: Arc::new(RwLock::new(Arc::new(HashMap::new()))),
        }
    }

    /// Re-list the source and swap in the new snapshot.
    /// On error the previous snapshot stays in place.
    pub async fn refresh(&self) -> Result<usize, SecretError> {
        let secrets = self.source.list().await?;
        let map: HashMap<String, Secret> = secrets.into_iter().map(|s| (s.key(), s)).collect();
        let count = map.len();
        *self.snapshot.write() = Arc::new(map);
        debug!(count, "secret cache refreshed");
        Ok(count)
    }

    /// Refresh every `interval` until the handle is aborted
    pub fn spawn_refresh(&self, interval: Duration) -> JoinHandle<()> {
        let cache = self.clone();
        info!(interval_ms = interval.as_millis() as u64, "starting secret cache refresh");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = cache.refresh().await {
                    warn!(error = %e, "secret cache refresh failed, keeping previous snapshot");
                }
            }
        })
    }

    /// Read one field. `default_namespace` applies when the ref has none.
    pub fn get(&self, secret_ref: &SecretRef, default_namespace: &str) -> Result<String, SecretError> {
        let namespace = secret_ref.namespace.as_deref().unwrap_or(default_namespace);
        let key = format!("{}/{}", namespace, secret_ref.secret_name);

        let snapshot = self.snapshot.read().clone();
        let secret = snapshot.get(&key).ok_or_else(|| SecretError::NotFound(key.clone()))?;
        secret
            .data
            .get(&secret_ref.secret_key)
            .cloned()
            .ok_or_else(|| SecretError::KeyNotFound {
                secret: key,
                key: secret_ref.secret_key.clone(),
            })
    }

    /// Number of cached secrets
    pub fn len(&self) -> usize {
        self.snapshot.read().len()
    }

    /// Whether the cache holds no secrets
    pub fn is_empty(&self) -> bool {
        self.snapshot.read().is_empty()
    }
}
