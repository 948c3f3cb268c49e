//!
//! Sluice Server - HTTP event sink for the Sluice dispatcher
//!
//! This crate wires the core engine and the interceptors into an axum
//! service that accepts events for one EventListener.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use sluice_core::SecretCache;
use sluice_interceptors::{ChainRunner, InterceptorClients};
use tokio::net::TcpListener;
use tracing::{info, warn};

/// API module
pub mod api;

/// Configuration module
pub mod config;

/// Error module
pub mod error;

/// Event sink module
pub mod sink;

/// Configuration store module
pub mod store;

/// Listener address cache module
pub mod address_cache;

/// Resource creation module
pub mod resources;

/// Secret source module
pub mod secrets;

// Re-export key types
pub use address_cache::ListenerAddressCache;
pub use config::{LogFormat, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use resources::{HttpCreator, LoggingCreator, ResourceCreator};
pub use secrets::FileSecretSource;
pub use sink::Sink;
pub use store::{ConfigDocument, ConfigStore, StaticConfigStore};

/// Run function
pub async fn run(config: ServerConfig) -> ServerResult<()> {
    // Initialize logging
    init_logging(&config);

    // Create dependencies
    let store: Arc<dyn ConfigStore> = Arc::new(StaticConfigStore::from_file(&config.config_path)?);
    let http = reqwest::Client::builder().build()?;

    let mut clients = InterceptorClients::new(http.clone()).with_webhook_timeout(config.webhook_timeout());
    if let Some(url) = &config.results_url {
        clients = clients.with_results_url(url.clone());
    }

    let refresh = match &config.secrets_path {
        Some(path) => {
            let cache = SecretCache::new(Arc::new(FileSecretSource::new(path)));
            if let Err(e) = cache.refresh().await {
                warn!(error = %e, "Initial secret load failed");
            }
            let handle = cache.spawn_refresh(config.secret_refresh_interval());
            clients = clients.with_secrets(cache);
            Some(handle)
        }
        None => None,
    };

    let creator: Arc<dyn ResourceCreator> = match &config.resource_sink_url {
        Some(url) => Arc::new(HttpCreator::new(http, url.clone())),
        None => Arc::new(LoggingCreator),
    };

    let addresses = ListenerAddressCache::new();
    if let Some(address) = &config.listener_address {
        addresses.upsert(&config.listener_namespace, &config.listener_name, address.clone());
    }

    let sink = Arc::new(Sink::new(&config, store, ChainRunner::new(clients), creator, addresses));
    let app = api::build_router(sink);

    // Create and bind the TCP listener
    let listener = TcpListener::bind((config.bind_address.as_str(), config.port)).await?;
    info!(
        address = %listener.local_addr()?,
        listener = %config.listener_name,
        namespace = %config.listener_namespace,
        "Listening for events"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = refresh {
        handle.abort();
    }
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Initialize logging
fn init_logging(config: &ServerConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    // Create filter based on config
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    // Initialize subscriber
    let builder = fmt().with_env_filter(filter).with_target(true);
    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}
