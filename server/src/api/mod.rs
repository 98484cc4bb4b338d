pub mod auth_routes;
pub mod command_routes;
pub mod flight_routes;
pub mod vessel_routes;

use crate::audit::AuditLogger;
use crate::auth::TokenService;
use crate::config::Settings;
use crate::events::EventBus;
use crate::ingestion::IngestionBuffer;
use crate::store::Stores;
use axum::Router;
use std::sync::Arc;

/// Composition root's shared handler state — every REST handler authenticates
/// via `tokens`, authorizes via `crate::permissions`, and calls into
/// `stores` (C4-C7), publishing through `events` (C10) on success.
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub tokens: Arc<TokenService>,
    pub events: EventBus,
    pub buffer: IngestionBuffer,
    pub audit: AuditLogger,
    pub settings: Arc<Settings>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(auth_routes::router())
        .merge(vessel_routes::router())
        .merge(flight_routes::router())
        .merge(command_routes::router())
        .with_state(state)
}
