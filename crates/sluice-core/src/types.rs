//! Configuration and wire types
//!
//! Configuration objects (listeners, triggers, bindings, templates) use
//! `camelCase` field names, matching the YAML documents the server loads.
//! Interceptor wire types use `snake_case`, matching the JSON protocol spoken
//! with remote interceptors.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ResolveError;

/// Event headers: lower-case name to every value received for it
pub type Headers = BTreeMap<String, Vec<String>>;

/// Key/value data produced by interceptors
pub type Extensions = Map<String, Value>;

/// Look up a header case-insensitively and join repeated values with `,`
pub fn header_value(headers: &Headers, name: &str) -> Option<String> {
    let wanted = name.to_ascii_lowercase();
    headers
        .iter()
        .find(|(key, _)| key.to_ascii_lowercase() == wanted)
        .map(|(_, values)| values.join(","))
}

/// A named parameter whose value may contain `$(...)` expressions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    /// Param name
    pub name: String,
    /// Literal value or expression
    pub value: String,
}

impl Param {
    /// Create a new param
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A param declared by a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamSpec {
    /// Param name
    pub name: String,
    /// Human readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Value used when no binding supplies the param
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// Which kind of binding object a trigger refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BindingKind {
    /// Binding in the listener's namespace
    #[default]
    #[serde(rename = "TriggerBinding")]
    Namespaced,
    /// Cluster scoped binding
    #[serde(rename = "ClusterTriggerBinding")]
    Cluster,
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingKind::Namespaced => write!(f, "TriggerBinding"),
            BindingKind::Cluster => write!(f, "ClusterTriggerBinding"),
        }
    }
}

/// A binding entry inside a trigger: either a reference or an inline pair
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerBinding {
    /// Inline param name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Inline param value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Name of the referenced binding object
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub binding_ref: Option<String>,
    /// Kind of the referenced binding object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<BindingKind>,
}

/// Where the params of one trigger binding entry come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingSource<'a> {
    /// A single inline param
    Inline(Param),
    /// A binding object to fetch
    Ref {
        /// Object kind
        kind: BindingKind,
        /// Object name
        name: &'a str,
    },
}

impl TriggerBinding {
    /// Inline binding shorthand
    pub fn inline(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            value: Some(value.into()),
            ..Default::default()
        }
    }

    /// Reference shorthand
    pub fn reference(name: impl Into<String>, kind: BindingKind) -> Self {
        Self {
            binding_ref: Some(name.into()),
            kind: Some(kind),
            ..Default::default()
        }
    }

    /// Classify this entry. An inline pair takes precedence over a reference.
    pub fn source(&self) -> Result<BindingSource<'_>, ResolveError> {
        match (&self.name, &self.value, &self.binding_ref) {
            (Some(name), Some(_), _) if !name.is_empty() && self.kind.is_some() => Err(ResolveError::InvalidBinding(
                format!("inline binding {} cannot set a kind", name),
            )),
            (Some(name), Some(value), _) if !name.is_empty() => {
                Ok(BindingSource::Inline(Param::new(name.clone(), value.clone())))
            }
            (_, _, Some(name)) if !name.is_empty() => Ok(BindingSource::Ref {
                kind: self.kind.unwrap_or_default(),
                name,
            }),
            _ => Err(ResolveError::InvalidBinding(format!("{:?}", self))),
        }
    }
}

/// A TriggerBinding or ClusterTriggerBinding object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    /// Object name
    pub name: String,
    /// Namespace, absent for cluster scoped bindings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Param expressions
    #[serde(default)]
    pub params: Vec<Param>,
}

/// One resource document inside a template.
///
/// A string is kept as raw JSON text so placeholders may sit outside string
/// literals; anything else is a structured document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceTemplate {
    /// Raw JSON text
    Raw(String),
    /// Structured document
    Document(Value),
}

impl ResourceTemplate {
    /// The template as JSON text, ready for textual substitution
    pub fn as_text(&self) -> String {
        match self {
            ResourceTemplate::Raw(text) => text.clone(),
            ResourceTemplate::Document(value) => value.to_string(),
        }
    }
}

/// Params and resource documents of a template
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSpec {
    /// Declared params
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    /// Documents rendered in declaration order
    #[serde(default, rename = "resourcetemplates")]
    pub resource_templates: Vec<ResourceTemplate>,
}

/// A TriggerTemplate object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    /// Object name
    pub name: String,
    /// Object namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Template body
    pub spec: TemplateSpec,
}

/// How a trigger names its template
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRef {
    /// Name of a template object
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub template_ref: Option<String>,
    /// Inline template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<TemplateSpec>,
}

/// Names the interceptor implementation to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptorRef {
    /// `debug`, `policy`, `results` or `webhook`
    pub name: String,
}

/// A named interceptor parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptorParam {
    /// Param name
    pub name: String,
    /// Arbitrary JSON value
    pub value: Value,
}

/// An interceptor entry in a trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerInterceptor {
    /// Display name, defaults to the ref name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Implementation selector
    #[serde(rename = "ref")]
    pub interceptor_ref: InterceptorRef,
    /// Implementation specific params
    #[serde(default)]
    pub params: Vec<InterceptorParam>,
}

impl TriggerInterceptor {
    /// Build an entry from a ref name and params
    pub fn new(ref_name: impl Into<String>, params: Vec<InterceptorParam>) -> Self {
        Self {
            name: None,
            interceptor_ref: InterceptorRef { name: ref_name.into() },
            params,
        }
    }

    /// Name used in logs and halt reports
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.interceptor_ref.name)
    }

    /// Params as the JSON map sent in `interceptor_params`
    pub fn params_map(&self) -> Map<String, Value> {
        self.params
            .iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect()
    }
}

/// What to do when a concurrency key is already in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConcurrencyStrategy {
    /// Drop the new invocation
    #[default]
    Skip,
    /// Wait for the in-flight invocation to finish
    Queue,
}

/// Per-trigger concurrency policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcurrencyPolicy {
    /// Key template, e.g. `$(params.repo)-$(params.branch)`
    pub key: String,
    /// Limiting strategy
    #[serde(default)]
    pub strategy: ConcurrencyStrategy,
}

/// A trigger definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    /// Trigger name
    pub name: String,
    /// Namespace of a standalone trigger object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Service account used for resource creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    /// Param sources, merged in order
    #[serde(default)]
    pub bindings: Vec<TriggerBinding>,
    /// Output generator
    pub template: TemplateRef,
    /// Interceptor chain, run in order
    #[serde(default)]
    pub interceptors: Vec<TriggerInterceptor>,
    /// Optional concurrency restriction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<ConcurrencyPolicy>,
}

/// A trigger entry in a listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ListenerTrigger {
    /// Reference to a trigger object in the listener's namespace
    Ref {
        /// Trigger object name
        #[serde(rename = "triggerRef")]
        trigger_ref: String,
    },
    /// Inline trigger
    Inline(Trigger),
}

/// An EventListener object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventListener {
    /// Listener name
    pub name: String,
    /// Listener namespace
    pub namespace: String,
    /// Default service account for its triggers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    /// Triggers evaluated for every event
    #[serde(default)]
    pub triggers: Vec<ListenerTrigger>,
}

/// Correlation data sent with every interceptor call
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TriggerContext {
    /// URL the event was received on
    pub event_url: String,
    /// Per-request event identifier
    pub event_id: String,
    /// `namespaces/<ns>/triggers/<name>`
    pub trigger_id: String,
}

impl TriggerContext {
    /// Build a context, deriving the trigger id
    pub fn new(event_url: impl Into<String>, event_id: impl Into<String>, namespace: &str, trigger: &str) -> Self {
        Self {
            event_url: event_url.into(),
            event_id: event_id.into(),
            trigger_id: format!("namespaces/{}/triggers/{}", namespace, trigger),
        }
    }
}

/// Status codes carried by interceptor responses (gRPC numbering)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum InterceptorCode {
    /// Success
    #[default]
    Ok,
    /// Unclassified failure
    Unknown,
    /// Bad params or payload
    InvalidArgument,
    /// Referenced interceptor does not exist
    NotFound,
    /// The event did not satisfy the interceptor's condition
    FailedPrecondition,
    /// The interceptor call was interrupted
    Aborted,
    /// Interceptor bug or undecodable response
    Internal,
    /// Interceptor unavailable
    Unavailable,
}

impl From<InterceptorCode> for u32 {
    fn from(code: InterceptorCode) -> u32 {
        match code {
            InterceptorCode::Ok => 0,
            InterceptorCode::Unknown => 2,
            InterceptorCode::InvalidArgument => 3,
            InterceptorCode::NotFound => 5,
            InterceptorCode::FailedPrecondition => 9,
            InterceptorCode::Aborted => 10,
            InterceptorCode::Internal => 13,
            InterceptorCode::Unavailable => 14,
        }
    }
}

impl TryFrom<u32> for InterceptorCode {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(InterceptorCode::Ok),
            2 => Ok(InterceptorCode::Unknown),
            3 => Ok(InterceptorCode::InvalidArgument),
            5 => Ok(InterceptorCode::NotFound),
            9 => Ok(InterceptorCode::FailedPrecondition),
            10 => Ok(InterceptorCode::Aborted),
            13 => Ok(InterceptorCode::Internal),
            14 => Ok(InterceptorCode::Unavailable),
            other => Err(format!("unsupported interceptor status code {}", other)),
        }
    }
}

impl fmt::Display for InterceptorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InterceptorCode::Ok => "OK",
            InterceptorCode::Unknown => "Unknown",
            InterceptorCode::InvalidArgument => "InvalidArgument",
            InterceptorCode::NotFound => "NotFound",
            InterceptorCode::FailedPrecondition => "FailedPrecondition",
            InterceptorCode::Aborted => "Aborted",
            InterceptorCode::Internal => "Internal",
            InterceptorCode::Unavailable => "Unavailable",
        };
        f.write_str(name)
    }
}

/// Structured status of an interceptor response
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InterceptorStatus {
    /// Failure class
    #[serde(default)]
    pub code: InterceptorCode,
    /// Human readable detail
    #[serde(default)]
    pub message: String,
}

impl InterceptorStatus {
    /// Build a status
    pub fn new(code: InterceptorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for InterceptorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Request sent to every interceptor
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InterceptorRequest {
    /// Raw event body
    pub body: String,
    /// Event headers
    #[serde(default)]
    pub header: Headers,
    /// Extensions accumulated by earlier interceptors
    #[serde(default)]
    pub extensions: Extensions,
    /// Params of this interceptor entry
    #[serde(default)]
    pub interceptor_params: Map<String, Value>,
    /// Correlation data
    #[serde(default)]
    pub context: TriggerContext,
}

/// Response returned by every interceptor
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InterceptorResponse {
    /// New or updated extensions
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Extensions,
    /// Whether the chain may proceed
    #[serde(rename = "continue")]
    pub continue_chain: bool,
    /// Outcome detail, meaningful when `continue` is false
    #[serde(default)]
    pub status: InterceptorStatus,
    /// Replacement event body, for payload rewriting proxies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Replacement or additional headers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<Headers>,
}

impl InterceptorResponse {
    /// Continue with the given extensions
    pub fn proceed(extensions: Extensions) -> Self {
        Self {
            extensions,
            continue_chain: true,
            ..Default::default()
        }
    }

    /// Halt the chain
    pub fn reject(code: InterceptorCode, message: impl Into<String>) -> Self {
        Self {
            continue_chain: false,
            status: InterceptorStatus::new(code, message),
            ..Default::default()
        }
    }
}
