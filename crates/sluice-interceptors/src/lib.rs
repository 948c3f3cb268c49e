//!
//! Sluice Interceptors - event interceptors and the chain that runs them
//!
//! An interceptor inspects an incoming event before its trigger fires. It can
//! reject the event, attach extensions for later params to read, or rewrite
//! the body and headers. Four implementations are built in and selected by
//! ref name: `debug`, `policy`, `results` and `webhook`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::time::Duration;

use reqwest::Client;
use sluice_core::{InterceptorRequest, InterceptorResponse, SecretCache};

/// Chain runtime
pub mod chain;

/// Request logging interceptor
pub mod debug;

/// Error types
pub mod error;

/// Filter and overlay interceptor
pub mod policy;

/// Results store interceptor
pub mod results;

/// Remote webhook interceptor
pub mod webhook;

pub use chain::{ChainHalt, ChainInput, ChainOutput, ChainRunner};
pub use debug::DebugInterceptor;
pub use error::{InterceptorError, InterceptorResult};
pub use policy::{Overlay, PolicyInterceptor};
pub use results::ResultsInterceptor;
pub use webhook::{ServiceRef, WebhookInterceptor};

/// Default bound on a single webhook call
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_millis(3000);

/// Shared resources handed to interceptors
#[derive(Clone)]
pub struct InterceptorClients {
    /// HTTP client for remote calls
    pub http: Client,
    /// Credentials for webhook calls
    pub secrets: Option<SecretCache>,
    /// Results store used when a `results` interceptor has no `url` param
    pub results_url: Option<String>,
    /// Bound on a single webhook call
    pub webhook_timeout: Duration,
}

impl InterceptorClients {
    /// Clients with no secret cache and no results store
    pub fn new(http: Client) -> Self {
        Self {
            http,
            secrets: None,
            results_url: None,
            webhook_timeout: DEFAULT_WEBHOOK_TIMEOUT,
        }
    }

    /// Use `secrets` for webhook credentials
    pub fn with_secrets(mut self, secrets: SecretCache) -> Self {
        self.secrets = Some(secrets);
        self
    }

    /// Record events to `url` by default
    pub fn with_results_url(mut self, url: impl Into<String>) -> Self {
        self.results_url = Some(url.into());
        self
    }

    /// Bound webhook calls by `timeout`
    pub fn with_webhook_timeout(mut self, timeout: Duration) -> Self {
        self.webhook_timeout = timeout;
        self
    }
}

/// A built-in interceptor
#[derive(Clone)]
pub enum Interceptor {
    /// Logs the request
    Debug(DebugInterceptor),
    /// Filters and overlays
    Policy(PolicyInterceptor),
    /// Records to a results store
    Results(ResultsInterceptor),
    /// Calls a remote service
    Webhook(WebhookInterceptor),
}

impl Interceptor {
    /// Build the interceptor registered under `ref_name` for a listener in
    /// `namespace`
    pub fn lookup(ref_name: &str, clients: &InterceptorClients, namespace: &str) -> Option<Self> {
        match ref_name {
            "debug" => Some(Interceptor::Debug(DebugInterceptor)),
            "policy" => Some(Interceptor::Policy(PolicyInterceptor)),
            "results" => Some(Interceptor::Results(ResultsInterceptor::new(
                clients.http.clone(),
                clients.results_url.clone(),
            ))),
            "webhook" => Some(Interceptor::Webhook(WebhookInterceptor::new(
                clients.http.clone(),
                clients.secrets.clone(),
                clients.webhook_timeout,
                namespace,
            ))),
            _ => None,
        }
    }

    /// Ref name of this interceptor
    pub fn name(&self) -> &'static str {
        match self {
            Interceptor::Debug(_) => "debug",
            Interceptor::Policy(_) => "policy",
            Interceptor::Results(_) => "results",
            Interceptor::Webhook(_) => "webhook",
        }
    }

    /// Handle one request
    pub async fn process(&self, request: &InterceptorRequest) -> InterceptorResponse {
        match self {
            Interceptor::Debug(interceptor) => interceptor.process(request),
            Interceptor::Policy(interceptor) => interceptor.process(request),
            Interceptor::Results(interceptor) => interceptor.process(request).await,
            Interceptor::Webhook(interceptor) => interceptor.process(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_ref_name() {
        let clients = InterceptorClients::new(Client::new());
        for name in ["debug", "policy", "results", "webhook"] {
            let interceptor = Interceptor::lookup(name, &clients, "ci").unwrap();
            assert_eq!(interceptor.name(), name);
        }
        assert!(Interceptor::lookup("cel", &clients, "ci").is_none());
    }
}
