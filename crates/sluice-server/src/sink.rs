//! Event sink
//!
//! One inbound event fans out to every trigger of the listener. Each trigger
//! runs in its own task: interceptors, binding resolution, param evaluation,
//! concurrency admission, rendering and resource creation. The response code
//! is the lowest status any trigger reported, so one created resource makes
//! the whole event `201 Created`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::StatusCode;
use serde_json::{json, Value};
use sluice_core::{
    new_uid, resolve_concurrency_key, resolve_params, resolve_resources, resolve_trigger, EventListener, Headers,
    InFlightRegistry, ListenerTrigger, Trigger, TriggerContext,
};
use sluice_interceptors::{ChainInput, ChainRunner};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::address_cache::ListenerAddressCache;
use crate::config::ServerConfig;
use crate::resources::ResourceCreator;
use crate::store::ConfigStore;

/// Everything a trigger task needs to know about the event
#[derive(Debug)]
struct Event {
    id: String,
    url: String,
    body: Bytes,
    headers: Headers,
    listener: String,
    namespace: String,
}

/// Dispatches events for one EventListener
#[derive(Clone)]
pub struct Sink {
    listener_name: String,
    listener_namespace: String,
    store: Arc<dyn ConfigStore>,
    chain: ChainRunner,
    creator: Arc<dyn ResourceCreator>,
    addresses: ListenerAddressCache,
    in_flight: InFlightRegistry,
    payload_validation: bool,
    max_concurrent_triggers: usize,
    handler_timeout: Duration,
}

impl Sink {
    /// Create a sink for the listener named in `config`
    pub fn new(
        config: &ServerConfig,
        store: Arc<dyn ConfigStore>,
        chain: ChainRunner,
        creator: Arc<dyn ResourceCreator>,
        addresses: ListenerAddressCache,
    ) -> Self {
        Self {
            listener_name: config.listener_name.clone(),
            listener_namespace: config.listener_namespace.clone(),
            store,
            chain,
            creator,
            addresses,
            in_flight: InFlightRegistry::new(),
            payload_validation: config.payload_validation,
            max_concurrent_triggers: config.max_concurrent_triggers.max(1),
            handler_timeout: config.handler_timeout(),
        }
    }

    /// Registry of running concurrency keys
    pub fn in_flight(&self) -> &InFlightRegistry {
        &self.in_flight
    }

    /// Handle one inbound event and produce the response status and body
    pub async fn handle_event(&self, headers: Headers, uri: String, body: Bytes) -> (StatusCode, Value) {
        let event_id = Uuid::new_v4().to_string();
        let span = info_span!(
            "event",
            event_id = %event_id,
            listener = %self.listener_name,
            namespace = %self.listener_namespace
        );
        self.dispatch(event_id, headers, uri, body).instrument(span).await
    }

    async fn dispatch(&self, event_id: String, headers: Headers, uri: String, body: Bytes) -> (StatusCode, Value) {
        if self.payload_validation {
            if let Err(e) = serde_json::from_slice::<Value>(&body) {
                info!(error = %e, "Invalid event body");
                return (
                    StatusCode::BAD_REQUEST,
                    self.response_body(&event_id, Some(format!("Invalid event body format: {}", e))),
                );
            }
        }

        let listener = match self.store.get_listener(&self.listener_namespace, &self.listener_name) {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, "Failed to load EventListener");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    self.response_body(&event_id, Some(format!("Error getting EventListener: {}", e))),
                );
            }
        };

        let url = self
            .addresses
            .get(&self.listener_namespace, &self.listener_name)
            .unwrap_or(uri);
        let event = Arc::new(Event {
            id: event_id.clone(),
            url,
            body,
            headers,
            listener: self.listener_name.clone(),
            namespace: self.listener_namespace.clone(),
        });

        let triggers = self.triggers_of(&listener);
        info!(triggers = triggers.len(), "Dispatching event");

        let status = self.fan_out(event, triggers).await;
        info!(status = status.as_u16(), "Event handled");
        (status, self.response_body(&event_id, None))
    }

    fn triggers_of(&self, listener: &EventListener) -> Vec<Trigger> {
        listener
            .triggers
            .iter()
            .filter_map(|entry| match entry {
                ListenerTrigger::Inline(trigger) => Some(trigger.clone()),
                ListenerTrigger::Ref { trigger_ref } => {
                    match self.store.get_trigger(&listener.namespace, trigger_ref) {
                        Ok(trigger) => Some(trigger),
                        Err(e) => {
                            warn!(trigger = %trigger_ref, error = %e, "Failed to load referenced Trigger");
                            None
                        }
                    }
                }
            })
            .collect()
    }

    async fn fan_out(&self, event: Arc<Event>, triggers: Vec<Trigger>) -> StatusCode {
        let permits = Arc::new(Semaphore::new(self.max_concurrent_triggers));
        let mut tasks = JoinSet::new();

        for trigger in triggers {
            let sink = self.clone();
            let event = event.clone();
            let permits = permits.clone();
            tasks.spawn(
                async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return StatusCode::ACCEPTED;
                    };
                    sink.process_trigger(trigger, event).await
                }
                .in_current_span(),
            );
        }

        let mut status = StatusCode::ACCEPTED;
        let deadline = tokio::time::sleep(self.handler_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok(code)) => {
                        if code.as_u16() < status.as_u16() {
                            status = code;
                        }
                    }
                    Some(Err(e)) => error!(error = %e, "Trigger task failed"),
                    None => break,
                },
                _ = &mut deadline => {
                    warn!(
                        unfinished = tasks.len(),
                        timeout_ms = self.handler_timeout.as_millis() as u64,
                        "Handler timeout reached, cancelling remaining triggers"
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        status
    }

    /// Run one trigger to completion and report its status
    async fn process_trigger(&self, trigger: Trigger, event: Arc<Event>) -> StatusCode {
        let namespace = trigger.namespace.clone().unwrap_or_else(|| event.namespace.clone());
        let context = TriggerContext::new(event.url.clone(), event.id.clone(), &namespace, &trigger.name);
        let span = info_span!("trigger", event_id = %event.id, trigger_id = %context.trigger_id);

        self.run_trigger(&trigger, &event, &namespace, &context)
            .instrument(span)
            .await
    }

    async fn run_trigger(&self, trigger: &Trigger, event: &Event, namespace: &str, context: &TriggerContext) -> StatusCode {
        let input = ChainInput {
            body: event.body.to_vec(),
            headers: event.headers.clone(),
            namespace: namespace.to_string(),
        };
        let output = match self.chain.run(context, &trigger.interceptors, input).await {
            Ok(output) => output,
            Err(halt) => {
                debug!(reason = %halt, "Trigger stopped by interceptor");
                return StatusCode::ACCEPTED;
            }
        };

        let store = &self.store;
        let resolved = match resolve_trigger(
            trigger,
            |name| store.get_binding(namespace, name),
            |name| store.get_cluster_binding(name),
            |name| store.get_template(namespace, name),
        ) {
            Ok(resolved) => resolved,
            Err(e) => {
                error!(error = %e, "Failed to resolve Trigger");
                return StatusCode::ACCEPTED;
            }
        };

        let params = match resolve_params(&resolved, &output.body, &output.headers, &output.extensions) {
            Ok(params) => params,
            Err(e) => {
                error!(error = %e, "Failed to resolve params");
                return StatusCode::ACCEPTED;
            }
        };
        debug!(params = ?params, "Resolved params");

        let key = resolve_concurrency_key(trigger.concurrency.as_ref(), &params);
        let strategy = trigger.concurrency.as_ref().map(|c| c.strategy).unwrap_or_default();
        let Some(_guard) = self.in_flight.admit(&key, strategy).await else {
            info!(key = %key, "Concurrency key in flight, skipping trigger");
            return StatusCode::ACCEPTED;
        };

        let uid = new_uid();
        let resources = match resolve_resources(&resolved, &params, &uid) {
            Ok(resources) => resources,
            Err(e) => {
                error!(error = %e, "Failed to render resources");
                return StatusCode::ACCEPTED;
            }
        };

        for resource in &resources {
            if let Err(e) = self
                .creator
                .create(resource, &trigger.name, &event.id, &event.listener, &event.namespace)
                .await
            {
                error!(error = %e, "Failed to create resource");
                return StatusCode::ACCEPTED;
            }
        }

        info!(resources = resources.len(), uid = %uid, "Trigger created resources");
        StatusCode::CREATED
    }

    fn response_body(&self, event_id: &str, error_message: Option<String>) -> Value {
        let mut body = json!({
            "eventListener": self.listener_name,
            "namespace": self.listener_namespace,
            "eventID": event_id,
        });
        if let Some(message) = error_message {
            body["errorMessage"] = Value::String(message);
        }
        body
    }
}
