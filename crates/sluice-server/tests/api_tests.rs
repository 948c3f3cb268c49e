use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
};
use mockall::mock;
use serde_json::Value;
use sluice_interceptors::{ChainRunner, InterceptorClients};
use sluice_server::{
    api::build_router, ConfigStore, ListenerAddressCache, ResourceCreator, ServerConfig, ServerError, ServerResult,
    Sink, StaticConfigStore,
};
use tower::ServiceExt;

mock! {
    pub Creator {}

    #[async_trait]
    impl ResourceCreator for Creator {
        async fn create(
            &self,
            doc: &Value,
            trigger_name: &str,
            event_id: &str,
            listener_name: &str,
            listener_namespace: &str,
        ) -> ServerResult<()>;
    }
}

const CONFIG: &str = r#"
listeners:
  - name: github
    namespace: ci
    triggers:
      - triggerRef: build
      - triggerRef: broken
  - name: filtered
    namespace: ci
    triggers:
      - name: main-only
        interceptors:
          - ref:
              name: policy
            params:
              - name: filter
                value: body.branch == "main"
        bindings:
          - name: sha
            value: $(body.sha)
        template:
          ref: run
  - name: empty
    namespace: ci
  - name: partial
    namespace: ci
    triggers:
      - name: unresolvable
        bindings:
          - ref: missing
        template:
          ref: run
      - triggerRef: build
triggers:
  - name: build
    namespace: ci
    bindings:
      - name: sha
        value: $(body.sha)
    template:
      ref: run
  - name: broken
    namespace: ci
    bindings:
      - name: sha
        value: $(body.sha)
    template:
      ref: run
templates:
  - name: run
    namespace: ci
    spec:
      params:
        - name: sha
      resourcetemplates:
        - kind: Run
          metadata:
            generateName: run-
          spec:
            sha: $(params.sha)
"#;

fn app(listener: &str, creator: MockCreator) -> axum::Router {
    let config = ServerConfig {
        listener_name: listener.to_string(),
        listener_namespace: "ci".to_string(),
        ..ServerConfig::default()
    };
    let store: Arc<dyn ConfigStore> = Arc::new(StaticConfigStore::from_yaml(CONFIG).unwrap());
    let chain = ChainRunner::new(InterceptorClients::new(reqwest::Client::new()));
    let sink = Sink::new(&config, store, chain, Arc::new(creator), ListenerAddressCache::new());
    build_router(Arc::new(sink))
}

fn event(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_created_when_any_trigger_succeeds() {
    let mut creator = MockCreator::new();
    creator
        .expect_create()
        .withf(|doc, trigger, _, listener, namespace| {
            trigger == "build" && listener == "github" && namespace == "ci" && doc["spec"]["sha"] == "abc123"
        })
        .times(1)
        .returning(|_, _, _, _, _| Ok(()));
    creator
        .expect_create()
        .withf(|_, trigger, _, _, _| trigger == "broken")
        .times(1)
        .returning(|_, _, _, _, _| Err(ServerError::ResourceCreationError("quota exceeded".to_string())));

    let response = app("github", creator)
        .oneshot(event(r#"{"sha": "abc123"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["eventListener"], "github");
    assert_eq!(body["namespace"], "ci");
    assert!(body["eventID"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(body.get("errorMessage").is_none());
}

#[tokio::test]
async fn test_accepted_when_every_trigger_fails() {
    let mut creator = MockCreator::new();
    creator
        .expect_create()
        .times(2)
        .returning(|_, _, _, _, _| Err(ServerError::ResourceCreationError("denied".to_string())));

    let response = app("github", creator)
        .oneshot(event(r#"{"sha": "abc123"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_created_when_sibling_fails_resolution() {
    let mut creator = MockCreator::new();
    creator
        .expect_create()
        .withf(|_, trigger, _, _, _| trigger == "build")
        .times(1)
        .returning(|_, _, _, _, _| Ok(()));

    let response = app("partial", creator)
        .oneshot(event(r#"{"sha": "abc123"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_accepted_without_triggers() {
    let mut creator = MockCreator::new();
    creator.expect_create().times(0);

    let response = app("empty", creator).oneshot(event("{}")).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_event_id_is_passed_to_creator() {
    let mut creator = MockCreator::new();
    creator
        .expect_create()
        .withf(|_, trigger, event_id, _, _| trigger == "main-only" && !event_id.is_empty())
        .times(1)
        .returning(|_, _, _, _, _| Ok(()));

    let response = app("filtered", creator)
        .oneshot(event(r#"{"branch": "main", "sha": "abc123"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_filter_rejection_creates_nothing() {
    let mut creator = MockCreator::new();
    creator.expect_create().times(0);

    let response = app("filtered", creator)
        .oneshot(event(r#"{"branch": "feature", "sha": "abc123"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_invalid_body_rejected() {
    let mut creator = MockCreator::new();
    creator.expect_create().times(0);

    let response = app("github", creator).oneshot(event("{not json")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["errorMessage"]
        .as_str()
        .is_some_and(|m| m.starts_with("Invalid event body format")));
}

#[tokio::test]
async fn test_unknown_listener() {
    let mut creator = MockCreator::new();
    creator.expect_create().times(0);

    let response = app("gitlab", creator).oneshot(event("{}")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["eventListener"], "gitlab");
    assert!(body["errorMessage"]
        .as_str()
        .is_some_and(|m| m.starts_with("Error getting EventListener")));
}

#[tokio::test]
async fn test_live() {
    let response = app("github", MockCreator::new())
        .oneshot(Request::builder().uri("/live").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}
