//! Configuration store
//!
//! The sink reads listeners, triggers, bindings and templates through the
//! [`ConfigStore`] trait. [`StaticConfigStore`] serves them from a YAML
//! document loaded at startup:
//!
//! ```yaml
//! listeners:
//!   - name: github
//!     namespace: ci
//!     triggers:
//!       - triggerRef: on-push
//! triggers:
//!   - name: on-push
//!     namespace: ci
//!     bindings:
//!       - ref: push-binding
//!     template:
//!       ref: run-template
//! bindings: []
//! clusterBindings: []
//! templates: []
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sluice_core::{Binding, EventListener, Template, Trigger};
use tracing::info;

use crate::error::{ServerError, ServerResult};

/// Namespace assumed for objects that do not name one
pub const DEFAULT_NAMESPACE: &str = "default";

/// Read-only access to trigger configuration
pub trait ConfigStore: Send + Sync {
    /// Fetch an EventListener
    fn get_listener(&self, namespace: &str, name: &str) -> ServerResult<EventListener>;

    /// Fetch a standalone Trigger
    fn get_trigger(&self, namespace: &str, name: &str) -> ServerResult<Trigger>;

    /// Fetch a namespaced TriggerBinding
    fn get_binding(&self, namespace: &str, name: &str) -> ServerResult<Binding>;

    /// Fetch a ClusterTriggerBinding
    fn get_cluster_binding(&self, name: &str) -> ServerResult<Binding>;

    /// Fetch a TriggerTemplate
    fn get_template(&self, namespace: &str, name: &str) -> ServerResult<Template>;
}

/// The YAML layout read by [`StaticConfigStore`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
    /// EventListener objects
    #[serde(default)]
    pub listeners: Vec<EventListener>,
    /// Trigger objects
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    /// TriggerBinding objects
    #[serde(default)]
    pub bindings: Vec<Binding>,
    /// ClusterTriggerBinding objects
    #[serde(default)]
    pub cluster_bindings: Vec<Binding>,
    /// TriggerTemplate objects
    #[serde(default)]
    pub templates: Vec<Template>,
}

fn key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

fn namespaced<T>(items: Vec<T>, namespace: impl Fn(&T) -> Option<&str>, name: impl Fn(&T) -> &str) -> HashMap<String, T> {
    items
        .into_iter()
        .map(|item| (key(namespace(&item).unwrap_or(DEFAULT_NAMESPACE), name(&item)), item))
        .collect()
}

/// In-memory store built from a [`ConfigDocument`]
#[derive(Debug, Clone, Default)]
pub struct StaticConfigStore {
    listeners: HashMap<String, EventListener>,
    triggers: HashMap<String, Trigger>,
    bindings: HashMap<String, Binding>,
    cluster_bindings: HashMap<String, Binding>,
    templates: HashMap<String, Template>,
}

impl StaticConfigStore {
    /// Index every object of `document`
    pub fn new(document: ConfigDocument) -> Self {
        Self {
            listeners: document
                .listeners
                .into_iter()
                .map(|l| (key(&l.namespace, &l.name), l))
                .collect(),
            triggers: namespaced(document.triggers, |t| t.namespace.as_deref(), |t| &t.name),
            bindings: namespaced(document.bindings, |b| b.namespace.as_deref(), |b| &b.name),
            cluster_bindings: document
                .cluster_bindings
                .into_iter()
                .map(|b| (b.name.clone(), b))
                .collect(),
            templates: namespaced(document.templates, |t| t.namespace.as_deref(), |t| &t.name),
        }
    }

    /// Parse a YAML document
    pub fn from_yaml(yaml: &str) -> ServerResult<Self> {
        let document: ConfigDocument = serde_yaml::from_str(yaml)?;
        Ok(Self::new(document))
    }

    /// Read and parse a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| ServerError::ConfigError(format!("failed to read {}: {}", path.display(), e)))?;
        let store = Self::from_yaml(&yaml)?;
        info!(
            path = %path.display(),
            listeners = store.listeners.len(),
            triggers = store.triggers.len(),
            bindings = store.bindings.len() + store.cluster_bindings.len(),
            templates = store.templates.len(),
            "Loaded trigger configuration"
        );
        Ok(store)
    }
}

fn lookup<T: Clone>(map: &HashMap<String, T>, key: &str, kind: &str) -> ServerResult<T> {
    map.get(key)
        .cloned()
        .ok_or_else(|| ServerError::NotFound(format!("{} {}", kind, key)))
}

impl ConfigStore for StaticConfigStore {
    fn get_listener(&self, namespace: &str, name: &str) -> ServerResult<EventListener> {
        lookup(&self.listeners, &key(namespace, name), "EventListener")
    }

    fn get_trigger(&self, namespace: &str, name: &str) -> ServerResult<Trigger> {
        lookup(&self.triggers, &key(namespace, name), "Trigger")
    }

    fn get_binding(&self, namespace: &str, name: &str) -> ServerResult<Binding> {
        lookup(&self.bindings, &key(namespace, name), "TriggerBinding")
    }

    fn get_cluster_binding(&self, name: &str) -> ServerResult<Binding> {
        lookup(&self.cluster_bindings, name, "ClusterTriggerBinding")
    }

    fn get_template(&self, namespace: &str, name: &str) -> ServerResult<Template> {
        lookup(&self.templates, &key(namespace, name), "TriggerTemplate")
    }
}
