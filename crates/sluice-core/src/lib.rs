//!
//! Sluice Core - domain model and evaluation engine for the Sluice dispatcher
//!
//! This crate holds everything a trigger needs between "an event arrived" and
//! "a resource document is ready to be created": the configuration types,
//! the template engine, the trigger resolver, the concurrency-key resolver
//! with its in-flight registry, and the secret cache used by interceptors.
//! It has no HTTP server and no knowledge of how configuration is stored.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Configuration and wire types
pub mod types;

/// Error types
pub mod error;

/// Template engine: path extraction, param merging and resource rendering
pub mod template;

/// Trigger resolution
pub mod resolver;

/// Concurrency keys and in-flight admission
pub mod concurrency;

/// Secret cache
pub mod secrets;

// Re-export key types
pub use concurrency::{resolve_concurrency_key, InFlightGuard, InFlightRegistry};
pub use error::{ResolveError, SecretError, TemplateError};
pub use resolver::{resolve_params, resolve_resources, resolve_trigger, ResolvedTrigger};
pub use secrets::{Secret, SecretCache, SecretRef, SecretSource, StaticSecretSource};
pub use template::new_uid;
pub use types::{
    header_value, Binding, BindingKind, ConcurrencyPolicy, ConcurrencyStrategy, EventListener,
    Extensions, Headers, InterceptorCode, InterceptorParam, InterceptorRef, InterceptorRequest,
    InterceptorResponse, InterceptorStatus, ListenerTrigger, Param, ParamSpec, ResourceTemplate,
    Template, TemplateRef, TemplateSpec, Trigger, TriggerBinding, TriggerContext,
    TriggerInterceptor,
};
