//! Remote webhook interceptor
//!
//! Forwards the interceptor request to an external HTTP service and adopts
//! its response. Params:
//!
//! - `url`: absolute URL of the service, or
//! - `service`: `{ name, namespace?, port?, path? }`, addressed as
//!   `http://<name>.<namespace>.svc:<port><path>`
//! - `headers`: extra request headers, each a string or a list of strings
//! - `secretRef`: `{ secretName, secretKey, namespace? }` sent as a bearer token

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use sluice_core::{InterceptorRequest, InterceptorResponse, SecretCache, SecretRef};
use tracing::{debug, instrument};

use crate::error::{InterceptorError, InterceptorResult};

/// Port used when a service reference does not name one
pub const DEFAULT_SERVICE_PORT: u16 = 80;

/// A cluster service reference
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceRef {
    /// Service name
    pub name: String,
    /// Service namespace, defaults to the listener's
    #[serde(default)]
    pub namespace: Option<String>,
    /// Service port
    #[serde(default)]
    pub port: Option<u16>,
    /// Request path
    #[serde(default)]
    pub path: Option<String>,
}

impl ServiceRef {
    /// The service URL, resolving the namespace against `default_namespace`
    pub fn url(&self, default_namespace: &str) -> String {
        let namespace = self.namespace.as_deref().unwrap_or(default_namespace);
        let port = self.port.unwrap_or(DEFAULT_SERVICE_PORT);
        let path = match self.path.as_deref() {
            Some(path) if !path.is_empty() && !path.starts_with('/') => format!("/{}", path),
            Some(path) => path.to_string(),
            None => String::new(),
        };
        format!("http://{}.{}.svc:{}{}", self.name, namespace, port, path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum HeaderValues {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookParams {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    service: Option<ServiceRef>,
    #[serde(default)]
    headers: BTreeMap<String, HeaderValues>,
    #[serde(default)]
    secret_ref: Option<SecretRef>,
}

/// Calls an external interceptor service
#[derive(Clone)]
pub struct WebhookInterceptor {
    client: Client,
    secrets: Option<SecretCache>,
    timeout: Duration,
    namespace: String,
}

impl WebhookInterceptor {
    /// Create an interceptor for a listener in `namespace`
    pub fn new(client: Client, secrets: Option<SecretCache>, timeout: Duration, namespace: impl Into<String>) -> Self {
        Self {
            client,
            secrets,
            timeout,
            namespace: namespace.into(),
        }
    }

    /// Forward the request and return the service's response
    #[instrument(skip(self, request), fields(event_id = %request.context.event_id))]
    pub async fn process(&self, request: &InterceptorRequest) -> InterceptorResponse {
        match self.call(request).await {
            Ok(response) => response,
            Err(e) => e.into(),
        }
    }

    async fn call(&self, request: &InterceptorRequest) -> InterceptorResult<InterceptorResponse> {
        let params: WebhookParams = serde_json::from_value(Value::Object(request.interceptor_params.clone()))
            .map_err(|e| InterceptorError::InvalidParams(e.to_string()))?;

        let url = match (&params.url, &params.service) {
            (Some(url), _) if !url.is_empty() => url.clone(),
            (_, Some(service)) => service.url(&self.namespace),
            _ => {
                return Err(InterceptorError::InvalidParams(
                    "webhook interceptor needs a url or a service".to_string(),
                ))
            }
        };

        let mut builder = self.client.post(&url).timeout(self.timeout).json(request);
        for (name, values) in &params.headers {
            match values {
                HeaderValues::One(value) => builder = builder.header(name.as_str(), value.as_str()),
                HeaderValues::Many(values) => {
                    for value in values {
                        builder = builder.header(name.as_str(), value.as_str());
                    }
                }
            }
        }
        if let Some(secret_ref) = &params.secret_ref {
            let secrets = self.secrets.as_ref().ok_or_else(|| {
                InterceptorError::InvalidParams("secretRef given but no secret cache is configured".to_string())
            })?;
            builder = builder.bearer_auth(secrets.get(secret_ref, &self.namespace)?);
        }

        debug!(url = %url, "calling webhook interceptor");
        let response = builder.send().await.map_err(|e| InterceptorError::Transport {
            url: url.clone(),
            reason: map_http_error(&e),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(InterceptorError::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }

        response
            .json::<InterceptorResponse>()
            .await
            .map_err(|e| InterceptorError::Decode(e.to_string()))
    }
}

fn map_http_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("request timeout: {}", error)
    } else if error.is_connect() {
        format!("connection error: {}", error)
    } else {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sluice_core::{InterceptorCode, Secret, StaticSecretSource, TriggerContext};
    use std::sync::Arc;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(params: Value) -> InterceptorRequest {
        InterceptorRequest {
            body: r#"{"ref":"main"}"#.to_string(),
            interceptor_params: params.as_object().cloned().unwrap_or_default(),
            context: TriggerContext::new("http://el", "ev-1", "ci", "push"),
            ..Default::default()
        }
    }

    fn interceptor(secrets: Option<SecretCache>, timeout: Duration) -> WebhookInterceptor {
        WebhookInterceptor::new(Client::new(), secrets, timeout, "ci")
    }

    #[test]
    fn test_service_url() {
        let service = ServiceRef {
            name: "hook".to_string(),
            namespace: None,
            port: None,
            path: Some("check".to_string()),
        };
        assert_eq!(service.url("ci"), "http://hook.ci.svc:80/check");

        let service = ServiceRef {
            name: "hook".to_string(),
            namespace: Some("ops".to_string()),
            port: Some(8443),
            path: None,
        };
        assert_eq!(service.url("ci"), "http://hook.ops.svc:8443");
    }

    #[tokio::test]
    async fn test_adopts_remote_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("x-team", "ci"))
            .and(body_partial_json(json!({"body": r#"{"ref":"main"}"#})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "continue": true,
                "extensions": {"approved": true}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = interceptor(None, Duration::from_secs(3))
            .process(&request(json!({
                "url": format!("{}/hook", server.uri()),
                "headers": {"X-Team": "ci"}
            })))
            .await;

        assert!(response.continue_chain);
        assert_eq!(response.extensions.get("approved"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_remote_rejection_is_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "continue": false,
                "status": {"code": 9, "message": "branch not allowed"}
            })))
            .mount(&server)
            .await;

        let response = interceptor(None, Duration::from_secs(3))
            .process(&request(json!({"url": server.uri()})))
            .await;

        assert!(!response.continue_chain);
        assert_eq!(response.status.code, InterceptorCode::FailedPrecondition);
        assert_eq!(response.status.message, "branch not allowed");
    }

    #[tokio::test]
    async fn test_bearer_token_from_secret() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer t0k3n"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"continue": true})))
            .expect(1)
            .mount(&server)
            .await;

        let cache = SecretCache::new(Arc::new(StaticSecretSource::new(vec![Secret {
            name: "hook-auth".to_string(),
            namespace: "ci".to_string(),
            data: BTreeMap::from([("token".to_string(), "t0k3n".to_string())]),
        }])));
        cache.refresh().await.unwrap();

        let response = interceptor(Some(cache.clone()), Duration::from_secs(3))
            .process(&request(json!({
                "url": server.uri(),
                "secretRef": {"secretName": "hook-auth", "secretKey": "token"}
            })))
            .await;
        assert!(response.continue_chain);

        let missing = interceptor(Some(cache), Duration::from_secs(3))
            .process(&request(json!({
                "url": server.uri(),
                "secretRef": {"secretName": "other", "secretKey": "token"}
            })))
            .await;
        assert!(!missing.continue_chain);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/garbage"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"continue": true}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let hook = interceptor(None, Duration::from_millis(100));
        let call = |p: &str| request(json!({"url": format!("{}{}", server.uri(), p)}));

        assert_eq!(hook.process(&call("/down")).await.status.code, InterceptorCode::FailedPrecondition);
        assert_eq!(hook.process(&call("/garbage")).await.status.code, InterceptorCode::Internal);
        assert_eq!(hook.process(&call("/slow")).await.status.code, InterceptorCode::Aborted);
        assert_eq!(
            hook.process(&request(json!({}))).await.status.code,
            InterceptorCode::InvalidArgument
        );
    }
}
