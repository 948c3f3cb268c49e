use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

/// Externally reachable addresses of event listeners, keyed by
/// `namespace/name`.
///
/// Written by whatever watches listener status and read by the sink when it
/// builds interceptor contexts.
#[derive(Debug, Clone, Default)]
pub struct ListenerAddressCache {
    addresses: Arc<DashMap<String, String>>,
}

impl ListenerAddressCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Record or replace a listener's address
    pub fn upsert(&self, namespace: &str, name: &str, address: impl Into<String>) {
        let address = address.into();
        debug!(namespace = %namespace, name = %name, address = %address, "listener address updated");
        self.addresses.insert(format!("{}/{}", namespace, name), address);
    }

    /// Forget a listener's address
    pub fn remove(&self, namespace: &str, name: &str) {
        self.addresses.remove(&format!("{}/{}", namespace, name));
    }

    /// A listener's address, if known
    pub fn get(&self, namespace: &str, name: &str) -> Option<String> {
        self.addresses
            .get(&format!("{}/{}", namespace, name))
            .map(|address| address.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_get_remove() {
        let cache = ListenerAddressCache::new();
        assert_eq!(cache.get("ci", "github"), None);

        cache.upsert("ci", "github", "http://el-github.ci.svc:8080");
        cache.upsert("ci", "github", "http://el-github.ci.svc:9090");
        assert_eq!(cache.get("ci", "github").as_deref(), Some("http://el-github.ci.svc:9090"));
        assert_eq!(cache.get("ops", "github"), None);

        let shared = cache.clone();
        shared.remove("ci", "github");
        assert_eq!(cache.get("ci", "github"), None);
    }
}
