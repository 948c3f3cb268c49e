//! Resource creation
//!
//! Rendered documents leave the sink through a [`ResourceCreator`]. Every
//! document is labelled with the listener, trigger and event that produced
//! it before it is handed over.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::{info, instrument};

use crate::error::{ServerError, ServerResult};

/// Label naming the EventListener
pub const LABEL_EVENT_LISTENER: &str = "triggers.sluice.dev/eventlistener";
/// Label naming the Trigger
pub const LABEL_TRIGGER: &str = "triggers.sluice.dev/trigger";
/// Label carrying the event id
pub const LABEL_EVENT_ID: &str = "triggers.sluice.dev/triggers-eventid";

/// Creates rendered resource documents
#[async_trait]
pub trait ResourceCreator: Send + Sync {
    /// Create one document
    async fn create(
        &self,
        doc: &Value,
        trigger_name: &str,
        event_id: &str,
        listener_name: &str,
        listener_namespace: &str,
    ) -> ServerResult<()>;
}

/// Stamp the provenance labels onto `doc` and default its namespace to the
/// listener's.
pub fn label_resource(
    doc: &Value,
    trigger_name: &str,
    event_id: &str,
    listener_name: &str,
    listener_namespace: &str,
) -> ServerResult<Value> {
    let mut doc = doc.clone();
    let root = doc
        .as_object_mut()
        .ok_or_else(|| ServerError::ValidationError("resource is not a JSON object".to_string()))?;

    let metadata = root
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| ServerError::ValidationError("resource metadata is not an object".to_string()))?;

    if !metadata.get("namespace").is_some_and(|ns| ns.as_str().is_some_and(|s| !s.is_empty())) {
        metadata.insert("namespace".to_string(), Value::String(listener_namespace.to_string()));
    }

    let labels = metadata
        .entry("labels")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| ServerError::ValidationError("resource labels are not an object".to_string()))?;
    labels.insert(LABEL_EVENT_LISTENER.to_string(), Value::String(listener_name.to_string()));
    labels.insert(LABEL_TRIGGER.to_string(), Value::String(trigger_name.to_string()));
    labels.insert(LABEL_EVENT_ID.to_string(), Value::String(event_id.to_string()));

    Ok(doc)
}

fn describe(doc: &Value) -> (String, String) {
    let kind = doc.get("kind").and_then(Value::as_str).unwrap_or("<unknown>").to_string();
    let name = doc
        .pointer("/metadata/name")
        .or_else(|| doc.pointer("/metadata/generateName"))
        .and_then(Value::as_str)
        .unwrap_or("<unnamed>")
        .to_string();
    (kind, name)
}

/// Logs documents instead of creating them
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingCreator;

#[async_trait]
impl ResourceCreator for LoggingCreator {
    async fn create(
        &self,
        doc: &Value,
        trigger_name: &str,
        event_id: &str,
        listener_name: &str,
        listener_namespace: &str,
    ) -> ServerResult<()> {
        let labelled = label_resource(doc, trigger_name, event_id, listener_name, listener_namespace)?;
        let (kind, name) = describe(&labelled);
        info!(
            event_id = %event_id,
            trigger = %trigger_name,
            kind = %kind,
            name = %name,
            resource = %labelled,
            "Resource rendered"
        );
        Ok(())
    }
}

/// Posts documents to an HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpCreator {
    client: Client,
    url: String,
}

impl HttpCreator {
    /// Create a creator posting to `url`
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl ResourceCreator for HttpCreator {
    #[instrument(skip(self, doc), fields(url = %self.url))]
    async fn create(
        &self,
        doc: &Value,
        trigger_name: &str,
        event_id: &str,
        listener_name: &str,
        listener_namespace: &str,
    ) -> ServerResult<()> {
        let labelled = label_resource(doc, trigger_name, event_id, listener_name, listener_namespace)?;
        let (kind, name) = describe(&labelled);

        let response = self.client.post(&self.url).json(&labelled).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServerError::ResourceCreationError(format!(
                "{} {} rejected with HTTP {}: {}",
                kind, name, status, body
            )));
        }

        info!(event_id = %event_id, kind = %kind, name = %name, "Resource created");
        Ok(())
    }
}
