//! API module for the Sluice server
//!
//! This module contains the routes and handlers of the event sink.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod events;
pub mod health;

use crate::sink::Sink;

/// Build the router for the event sink
pub fn build_router(sink: Arc<Sink>) -> Router {
    Router::new()
        // Event ingestion
        .route("/", post(events::handle_event))
        // Liveness probe
        .route("/live", get(health::live))
        .layer(TraceLayer::new_for_http())
        // Shared state
        .with_state(sink)
}
