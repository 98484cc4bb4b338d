//! Subscription hub (C11). Rooms keyed by entity, authorized at join time
//! (not per message) per §4.10. Built on `socketioxide`, the same
//! room-based primitive the teacher's `handlers.rs`/`main.rs` already use
//! for `SocketIo::to(room).emit(...)` fan-out.

use crate::auth::TokenService;
use crate::events::EventBus;
use crate::permissions::{effective_flight_permission, Permission};
use crate::store::Stores;
use serde::Deserialize;
use socketioxide::extract::{Data, SocketRef};
use socketioxide::SocketIo;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub fn flights_room() -> String {
    "flights".to_string()
}

pub fn flight_data_room(flight_id: Uuid) -> String {
    format!("flight_data.{flight_id}")
}

pub fn command_client_room(flight_id: Uuid) -> String {
    format!("command.client.{flight_id}")
}

pub fn command_vessel_room(flight_id: Uuid) -> String {
    format!("command.vessel.{flight_id}")
}

#[derive(Debug, Deserialize)]
struct JoinFlightRequest {
    flight_id: Uuid,
    token: Option<String>,
    as_vessel: Option<bool>,
}

/// Registers the default namespace handler: join-room authorization plus
/// the fan-out tasks that forward `EventBus` events into rooms.
pub fn register(io: &SocketIo, stores: Stores, tokens: Arc<TokenService>, bus: EventBus) {
    spawn_fanout(io.clone(), bus.clone());

    let stores_for_ns = stores.clone();
    let tokens_for_ns = tokens.clone();
    io.ns("/", move |socket: SocketRef| {
        let stores = stores_for_ns.clone();
        let tokens = tokens_for_ns.clone();
        socket.join(flights_room());

        let stores_join = stores.clone();
        let tokens_join = tokens.clone();
        socket.on(
            "join_flight",
            move |socket: SocketRef, Data::<JoinFlightRequest>(req)| {
                let stores = stores_join.clone();
                let tokens = tokens_join.clone();
                async move {
                    if let Err(e) = handle_join_flight(&socket, &stores, &tokens, req).await {
                        warn!("join_flight rejected: {e}");
                    }
                }
            },
        );
    });
}

async fn handle_join_flight(
    socket: &SocketRef,
    stores: &Stores,
    tokens: &TokenService,
    req: JoinFlightRequest,
) -> anyhow::Result<()> {
    let claims = req
        .token
        .as_deref()
        .and_then(|t| tokens.validate_access_token(t).ok());
    let user_id = claims.as_ref().and_then(|c| Uuid::parse_str(&c.uid).ok());
    let is_vessel = claims
        .as_ref()
        .map(|c| c.roles.iter().any(|r| r == "vessel"))
        .unwrap_or(false);

    let Some(flight) = stores.flights.get(req.flight_id).await? else {
        anyhow::bail!("flight {} not found", req.flight_id);
    };
    let Some(vessel) = stores.vessels.get(flight.vessel_id).await? else {
        anyhow::bail!("vessel {} not found", flight.vessel_id);
    };

    let effective = effective_flight_permission(
        &flight.permissions,
        flight.no_auth_permission,
        &vessel.permissions,
        vessel.no_auth_permission,
        user_id.as_ref().map(|u| u.to_string()).as_deref(),
    );
    if effective < Permission::Read {
        anyhow::bail!("caller lacks read permission on flight {}", req.flight_id);
    }

    socket.join(flight_data_room(req.flight_id));
    if req.as_vessel.unwrap_or(false) {
        if !is_vessel {
            anyhow::bail!("vessel-side room requires the vessel role");
        }
        socket.join(command_vessel_room(req.flight_id));
    } else {
        socket.join(command_client_room(req.flight_id));
    }

    debug!("socket {} joined rooms for flight {}", socket.id, req.flight_id);
    Ok(())
}

fn spawn_fanout(io: SocketIo, bus: EventBus) {
    let mut flight_new_rx = bus.subscribe_flight_new();
    let io_flight_new = io.clone();
    tokio::spawn(async move {
        while let Ok(flight) = flight_new_rx.recv().await {
            let _ = io_flight_new.to(flights_room()).emit("flight.new", &flight).await;
        }
    });

    let mut flight_update_rx = bus.subscribe_flight_update();
    let io_flight_update = io.clone();
    tokio::spawn(async move {
        while let Ok(flight) = flight_update_rx.recv().await {
            let _ = io_flight_update.to(flights_room()).emit("flight.update", &flight).await;
        }
    });

    let mut command_new_rx = bus.subscribe_command_new();
    let io_command_new = io.clone();
    tokio::spawn(async move {
        while let Ok(event) = command_new_rx.recv().await {
            let _ = io_command_new
                .to(command_client_room(event.flight_id))
                .emit("command.new", &event)
                .await;
            if event.from_client {
                let _ = io_command_new
                    .to(command_vessel_room(event.flight_id))
                    .emit("command.new", &event)
                    .await;
            }
        }
    });

    let mut command_update_rx = bus.subscribe_command_update();
    let io_command_update = io.clone();
    tokio::spawn(async move {
        while let Ok(event) = command_update_rx.recv().await {
            if event.from_client {
                let _ = io_command_update
                    .to(command_vessel_room(event.flight_id))
                    .emit("command.update", &event)
                    .await;
            } else {
                let _ = io_command_update
                    .to(command_client_room(event.flight_id))
                    .emit("command.update", &event)
                    .await;
            }
        }
    });

    let mut measurement_rx = bus.subscribe_new_measurement_compact();
    tokio::spawn(async move {
        while let Ok(event) = measurement_rx.recv().await {
            let _ = io
                .to(flight_data_room(event.flight_id))
                .emit("flight_data.new_compact", &event)
                .await;
        }
    });
}
