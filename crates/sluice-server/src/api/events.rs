//! Event ingestion endpoint

use axum::{
    body::Bytes,
    extract::State,
    http::{header::HOST, HeaderMap, Uri},
    response::IntoResponse,
    Json,
};
use sluice_core::Headers;
use std::sync::Arc;

use crate::sink::Sink;

/// Collect request headers by lower-case name, keeping every value
pub fn collect_headers(headers: &HeaderMap) -> Headers {
    let mut collected = Headers::new();
    for (name, value) in headers {
        collected
            .entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    collected
}

/// The URL the event was sent to, as far as the request shows it
pub fn request_url(uri: &Uri, headers: &HeaderMap) -> String {
    if uri.scheme().is_some() {
        return uri.to_string();
    }
    match headers.get(HOST).and_then(|host| host.to_str().ok()) {
        Some(host) => format!("http://{}{}", host, uri),
        None => uri.to_string(),
    }
}

/// Accept one event and dispatch it to the listener's triggers
pub async fn handle_event(
    State(sink): State<Arc<Sink>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let (status, response) = sink.handle_event(collect_headers(&headers), request_url(&uri, &headers), body).await;
    (status, Json(response))
}
