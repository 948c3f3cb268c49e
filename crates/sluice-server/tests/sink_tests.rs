use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::{body::Bytes, http::StatusCode};
use serde_json::Value;
use sluice_core::Headers;
use sluice_interceptors::{ChainRunner, InterceptorClients};
use sluice_server::{
    ConfigStore, ListenerAddressCache, ResourceCreator, ServerConfig, ServerResult, Sink, StaticConfigStore,
};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Counts creations, optionally taking its time about each one
#[derive(Default)]
struct CountingCreator {
    created: AtomicUsize,
    delay: Duration,
}

#[async_trait]
impl ResourceCreator for CountingCreator {
    async fn create(
        &self,
        _doc: &Value,
        _trigger_name: &str,
        _event_id: &str,
        _listener_name: &str,
        _listener_namespace: &str,
    ) -> ServerResult<()> {
        tokio::time::sleep(self.delay).await;
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

const TEMPLATE: &str = r#"
templates:
  - name: run
    namespace: ci
    spec:
      params:
        - name: sha
      resourcetemplates:
        - kind: Run
          spec:
            sha: $(params.sha)
"#;

fn sink(yaml: &str, handler_timeout_ms: u64, creator: Arc<CountingCreator>) -> Sink {
    let config = ServerConfig {
        listener_name: "github".to_string(),
        listener_namespace: "ci".to_string(),
        handler_timeout_ms,
        ..ServerConfig::default()
    };
    let store: Arc<dyn ConfigStore> = Arc::new(StaticConfigStore::from_yaml(&format!("{}{}", yaml, TEMPLATE)).unwrap());
    let chain = ChainRunner::new(InterceptorClients::new(reqwest::Client::new()));
    Sink::new(&config, store, chain, creator, ListenerAddressCache::new())
}

async fn send(sink: &Sink, body: &str) -> StatusCode {
    let (status, _) = sink
        .handle_event(Headers::new(), "/".to_string(), Bytes::from(body.to_string()))
        .await;
    status
}

#[tokio::test]
async fn test_handler_timeout_abandons_slow_triggers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"continue": true}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let yaml = format!(
        r#"
listeners:
  - name: github
    namespace: ci
    triggers:
      - name: slow
        interceptors:
          - ref:
              name: webhook
            params:
              - name: url
                value: {}
        bindings:
          - name: sha
            value: $(body.sha)
        template:
          ref: run
      - name: fast
        bindings:
          - name: sha
            value: $(body.sha)
        template:
          ref: run
"#,
        server.uri()
    );

    let creator = Arc::new(CountingCreator::default());
    let sink = sink(&yaml, 300, creator.clone());

    let started = Instant::now();
    let status = send(&sink, r#"{"sha": "abc123"}"#).await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(creator.created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_handler_timeout_with_only_slow_triggers_is_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"continue": true}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let yaml = format!(
        r#"
listeners:
  - name: github
    namespace: ci
    triggers:
      - name: slow
        interceptors:
          - ref:
              name: webhook
            params:
              - name: url
                value: {}
        bindings:
          - name: sha
            value: $(body.sha)
        template:
          ref: run
"#,
        server.uri()
    );

    let creator = Arc::new(CountingCreator::default());
    let sink = sink(&yaml, 200, creator.clone());

    assert_eq!(send(&sink, r#"{"sha": "abc123"}"#).await, StatusCode::ACCEPTED);
    assert_eq!(creator.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_skip_drops_trigger_while_key_in_flight() {
    let yaml = r#"
listeners:
  - name: github
    namespace: ci
    triggers:
      - name: first
        bindings:
          - name: sha
            value: $(body.sha)
        template:
          ref: run
        concurrency:
          key: build-$(params.sha)
          strategy: Skip
      - name: second
        bindings:
          - name: sha
            value: $(body.sha)
        template:
          ref: run
        concurrency:
          key: build-$(params.sha)
          strategy: Skip
"#;

    let creator = Arc::new(CountingCreator {
        delay: Duration::from_millis(200),
        ..Default::default()
    });
    let sink = sink(yaml, 5_000, creator.clone());

    let status = send(&sink, r#"{"sha": "abc123"}"#).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(creator.created.load(Ordering::SeqCst), 1);
    assert!(sink.in_flight().is_empty());
}

#[tokio::test]
async fn test_distinct_keys_both_run() {
    let yaml = r#"
listeners:
  - name: github
    namespace: ci
    triggers:
      - name: first
        bindings:
          - name: sha
            value: $(body.sha)
        template:
          ref: run
        concurrency:
          key: first-$(params.sha)
      - name: second
        bindings:
          - name: sha
            value: $(body.sha)
        template:
          ref: run
        concurrency:
          key: second-$(params.sha)
"#;

    let creator = Arc::new(CountingCreator {
        delay: Duration::from_millis(50),
        ..Default::default()
    });
    let sink = sink(yaml, 5_000, creator.clone());

    assert_eq!(send(&sink, r#"{"sha": "abc123"}"#).await, StatusCode::CREATED);
    assert_eq!(creator.created.load(Ordering::SeqCst), 2);
    assert!(sink.in_flight().is_empty());
}
