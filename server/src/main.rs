//! Composition root. Wires config, storage, auth, the event bus, the
//! ingestion buffer and MQTT consumer, the Socket.IO hub, and the REST
//! router, then serves. Exit codes: 0 normal, non-zero on config or
//! key-load failure.

mod api;
mod audit;
mod auth;
mod codec;
mod config;
mod error;
mod events;
mod hub;
mod ingestion;
mod models;
mod permissions;
mod store;
mod validation;

use audit::AuditLogger;
use auth::{KeyPair, TokenService};
use config::Settings;
use events::EventBus;
use ingestion::IngestionBuffer;
use socketioxide::SocketIo;
use std::sync::Arc;
use store::Stores;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flight_server=info,socketioxide=warn".into()),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let settings = Settings::from_env();

    let keys = KeyPair::load(&settings.auth_private_key_path, &settings.auth_public_key_path)?;
    let tokens = Arc::new(TokenService::new(keys));

    let stores = Stores::connect(&settings).await?;
    let events = EventBus::new();
    let buffer = IngestionBuffer::new(settings.flush_interval);
    let audit = AuditLogger::new();
    audit
        .log_session_event("server_start", Some(serde_json::json!({ "version": env!("CARGO_PKG_VERSION") })))
        .await;

    let mqtt_handle = ingestion::start_mqtt_consumer(settings.clone(), tokens.clone(), buffer.clone(), stores.clone(), events.clone());
    // The consumer thread is long-lived for the process lifetime; dropping
    // the handle here detaches it rather than stopping it on scope exit.
    std::mem::forget(mqtt_handle);

    let (socket_layer, io) = SocketIo::builder().build_layer();
    hub::register(&io, stores.clone(), tokens.clone(), events.clone());

    let cors = if settings.cors_origins.trim() == "*" {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        let origins: Vec<axum::http::HeaderValue> = settings
            .cors_origins
            .split(',')
            .filter_map(|o| o.trim().parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any)
    };

    let state = api::AppState {
        stores,
        tokens,
        events,
        buffer,
        audit,
        settings: Arc::new(settings.clone()),
    };

    let app = api::router(state)
        .layer(socket_layer)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", settings.port);
    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
