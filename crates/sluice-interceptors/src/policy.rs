//! Built-in policy interceptor
//!
//! Params:
//!
//! - `filter`: a jexl expression that must evaluate to `true` for the chain
//!   to continue.
//! - `overlays`: JMESPath queries whose results are bound into extensions.
//!
//! Both are evaluated against `{ body, header, extensions, requestURL }`.

use serde::Deserialize;
use serde_json::{json, Map, Value};
use sluice_core::{Extensions, InterceptorRequest, InterceptorResponse};
use tracing::debug;

use crate::error::{InterceptorError, InterceptorResult};

/// Binds the rows returned by a JMESPath query into extensions
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Overlay {
    /// JMESPath query
    pub query: String,
    /// Row keys to bind; each becomes an extension of the same name
    #[serde(default)]
    pub bindings: Vec<String>,
    /// Bind only the first value instead of an array of all values
    #[serde(default)]
    pub single: bool,
}

#[derive(Debug, Default, Deserialize)]
struct PolicyParams {
    #[serde(default)]
    filter: Option<String>,
    #[serde(default)]
    overlays: Vec<Overlay>,
}

/// Filters events and extracts values without leaving the process
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyInterceptor;

impl PolicyInterceptor {
    /// Evaluate the filter, then the overlays
    pub fn process(&self, request: &InterceptorRequest) -> InterceptorResponse {
        match evaluate(request) {
            Ok(extensions) => InterceptorResponse::proceed(extensions),
            Err(e) => e.into(),
        }
    }
}

fn evaluate(request: &InterceptorRequest) -> InterceptorResult<Extensions> {
    let params: PolicyParams = serde_json::from_value(Value::Object(request.interceptor_params.clone()))
        .map_err(|e| InterceptorError::InvalidParams(e.to_string()))?;

    let body: Value = serde_json::from_str(&request.body).map_err(|e| InterceptorError::InvalidBody(e.to_string()))?;
    if !body.is_object() {
        return Err(InterceptorError::InvalidBody("body is not a JSON object".to_string()));
    }

    let header: Map<String, Value> = request
        .header
        .iter()
        .map(|(name, values)| (name.to_ascii_lowercase(), Value::String(values.join(","))))
        .collect();

    let context = json!({
        "body": body,
        "header": header,
        "extensions": request.extensions,
        "requestURL": request.context.event_url,
    });

    if let Some(filter) = params.filter.as_deref().filter(|f| !f.trim().is_empty()) {
        evaluate_filter(filter, &context)?;
    }

    let mut extensions = Extensions::new();
    for overlay in &params.overlays {
        apply_overlay(overlay, &context, &mut extensions)?;
    }
    Ok(extensions)
}

fn evaluate_filter(filter: &str, context: &Value) -> InterceptorResult<()> {
    let evaluator = jexl_eval::Evaluator::new();
    let result = evaluator
        .eval_in_context(filter, context)
        .map_err(|e| InterceptorError::Expression(format!("failed to evaluate filter {}: {}", filter, e)))?;

    match result {
        Value::Bool(true) => Ok(()),
        Value::Bool(false) => {
            debug!(filter = %filter, "filter rejected event");
            Err(InterceptorError::FilterRejected(filter.to_string()))
        }
        other => Err(InterceptorError::Expression(format!(
            "filter {} returned {} instead of a boolean",
            filter, other
        ))),
    }
}

fn apply_overlay(overlay: &Overlay, context: &Value, extensions: &mut Extensions) -> InterceptorResult<()> {
    let compiled = jmespath::compile(&overlay.query).map_err(|e| {
        InterceptorError::Expression(format!("failed to compile JMESPath expression {}: {}", overlay.query, e))
    })?;
    let found = compiled.search(context).map_err(|e| {
        InterceptorError::Expression(format!("failed to evaluate JMESPath expression {}: {}", overlay.query, e))
    })?;
    let found = serde_json::to_value(&*found).map_err(|e| InterceptorError::Expression(e.to_string()))?;

    let rows = match found {
        Value::Null => Vec::new(),
        Value::Array(rows) => rows,
        row => vec![row],
    };

    for var in &overlay.bindings {
        let mut values = rows
            .iter()
            .filter_map(|row| row.as_object().and_then(|fields| fields.get(var)))
            .cloned();

        if overlay.single {
            if let Some(first) = values.next() {
                extensions.insert(var.clone(), first);
            }
        } else {
            let all: Vec<Value> = values.collect();
            if !all.is_empty() {
                extensions.insert(var.clone(), Value::Array(all));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sluice_core::{Headers, InterceptorCode, TriggerContext};

    fn request(body: Value, params: Value) -> InterceptorRequest {
        let mut header = Headers::new();
        header.insert("X-Event".to_string(), vec!["push".to_string()]);
        InterceptorRequest {
            body: body.to_string(),
            header,
            extensions: Extensions::new(),
            interceptor_params: params.as_object().cloned().unwrap_or_default(),
            context: TriggerContext::new("http://el.ci.svc:8080", "ev-1", "ci", "push"),
        }
    }

    fn pull_request() -> Value {
        json!({
            "action": "opened",
            "commits": [
                {"id": "c1", "author": "ana"},
                {"id": "c2", "author": "bo"},
                {"id": "c3"}
            ],
            "repository": {"name": "sluice", "owner": "ana"}
        })
    }

    #[test]
    fn test_filter_passes() {
        let response = PolicyInterceptor.process(&request(pull_request(), json!({"filter": r#"body.action == "opened""#})));
        assert!(response.continue_chain);
        assert!(response.extensions.is_empty());
    }

    #[test]
    fn test_filter_rejects() {
        let filter = r#"body.action == "closed""#;
        let response = PolicyInterceptor.process(&request(pull_request(), json!({ "filter": filter })));
        assert!(!response.continue_chain);
        assert_eq!(response.status.code, InterceptorCode::FailedPrecondition);
        assert_eq!(response.status.message, format!("expression {} did not return true", filter));
    }

    #[test]
    fn test_non_boolean_filter_is_invalid() {
        let response = PolicyInterceptor.process(&request(pull_request(), json!({"filter": "body.action"})));
        assert!(!response.continue_chain);
        assert_eq!(response.status.code, InterceptorCode::InvalidArgument);
    }

    #[test]
    fn test_single_overlay_binds_first_value() {
        let params = json!({"overlays": [
            {"query": "body.commits", "bindings": ["id", "author"], "single": true},
            {"query": "body.repository", "bindings": ["name"], "single": true}
        ]});
        let response = PolicyInterceptor.process(&request(pull_request(), params));

        assert!(response.continue_chain);
        assert_eq!(response.extensions.get("id"), Some(&json!("c1")));
        assert_eq!(response.extensions.get("author"), Some(&json!("ana")));
        assert_eq!(response.extensions.get("name"), Some(&json!("sluice")));
    }

    #[test]
    fn test_array_overlay_collects_values() {
        let params = json!({"overlays": [
            {"query": "body.commits", "bindings": ["id", "author", "missing"]}
        ]});
        let response = PolicyInterceptor.process(&request(pull_request(), params));

        assert_eq!(response.extensions.get("id"), Some(&json!(["c1", "c2", "c3"])));
        assert_eq!(response.extensions.get("author"), Some(&json!(["ana", "bo"])));
        assert_eq!(response.extensions.get("missing"), None);
    }

    #[test]
    fn test_overlay_on_null_binds_nothing() {
        let params = json!({"overlays": [{"query": "body.nothing", "bindings": ["id"], "single": true}]});
        let response = PolicyInterceptor.process(&request(pull_request(), params));
        assert!(response.continue_chain);
        assert!(response.extensions.is_empty());
    }

    #[test]
    fn test_overlay_sees_headers_and_url() {
        let params = json!({"overlays": [
            {"query": "{event: header.\"x-event\", url: requestURL}", "bindings": ["event", "url"], "single": true}
        ]});
        let response = PolicyInterceptor.process(&request(pull_request(), params));
        assert_eq!(response.extensions.get("event"), Some(&json!("push")));
        assert_eq!(response.extensions.get("url"), Some(&json!("http://el.ci.svc:8080")));
    }

    #[test]
    fn test_bad_query_is_invalid_argument() {
        let params = json!({"overlays": [{"query": "body.[", "bindings": ["id"]}]});
        let response = PolicyInterceptor.process(&request(pull_request(), params));
        assert_eq!(response.status.code, InterceptorCode::InvalidArgument);
    }

    #[test]
    fn test_body_must_be_an_object() {
        let response = PolicyInterceptor.process(&request(json!([1, 2]), json!({})));
        assert_eq!(response.status.code, InterceptorCode::InvalidArgument);

        let mut not_json = request(json!({}), json!({}));
        not_json.body = "a=b".to_string();
        assert_eq!(PolicyInterceptor.process(&not_json).status.code, InterceptorCode::InvalidArgument);
    }

    #[test]
    fn test_malformed_params() {
        let response = PolicyInterceptor.process(&request(pull_request(), json!({"overlays": "nope"})));
        assert_eq!(response.status.code, InterceptorCode::InvalidArgument);
    }
}
