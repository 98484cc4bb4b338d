//! `/v1/flights/{id}/commands*` — grounded on
//! `app/controller/command_controller.py` and the command lifecycle state
//! machine in §4.7.

use super::auth_routes::optional_user;
use super::AppState;
use crate::auth::resolve_required;
use crate::error::{AppError, AppResult};
use crate::events::CommandEvent;
use crate::models::{Command, CommandInfo, CommandState, Flight};
use crate::permissions::{self, Permission};
use crate::validation;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/flights/:id/commands", post(dispatch_commands))
        .route("/v1/flights/:id/commands/confirm", post(confirm_commands))
}

async fn load_flight_and_vessel(state: &AppState, flight_id: Uuid) -> AppResult<(Flight, crate::models::Vessel)> {
    let flight = state
        .stores
        .flights
        .get(flight_id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound(format!("flight {flight_id}")))?;
    let vessel = state
        .stores
        .vessels
        .get(flight.vessel_id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound(format!("vessel {}", flight.vessel_id)))?;
    Ok((flight, vessel))
}

/// §4.7: a `partId`-less command must be supported at the vehicle level; a
/// command targeting a part must have that part among its `supportingParts`.
fn validate_part_assignment(info: &CommandInfo, command: &Command) -> AppResult<()> {
    match command.part_id {
        None => {
            if !info.supported_on_vehicle_level {
                return Err(AppError::InvalidInput(format!(
                    "command '{}' has no partId but is not supported at the vehicle level",
                    command.command_type
                )));
            }
        }
        Some(part_id) => {
            if !info.supporting_parts.contains(&part_id) {
                return Err(AppError::InvalidInput(format!(
                    "command '{}' targets part {part_id}, which is not among its supportingParts",
                    command.command_type
                )));
            }
        }
    }
    Ok(())
}

fn validate_payload(flight: &Flight, command: &Command) -> AppResult<()> {
    let Some(info) = flight.available_commands.get(&command.command_type) else {
        return Err(AppError::InvalidInput(format!("flight does not support command '{}'", command.command_type)));
    };
    validate_part_assignment(info, command)?;
    if let (Some(schema), Some(payload)) = (&info.payload_schema, &command.command_payload) {
        validation::validate_against_schema(schema, payload).map_err(AppError::InvalidPayload)?;
    }
    Ok(())
}

/// Operator-originated dispatch: plain inserts, `state=='new'` only.
async fn dispatch_commands(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(flight_id): Path<Uuid>,
    Json(commands): Json<Vec<Command>>,
) -> AppResult<impl IntoResponse> {
    let (flight, vessel) = load_flight_and_vessel(&state, flight_id).await?;

    let user_id = optional_user(&state, &headers).map(|u| u.to_string());
    let eff = permissions::effective_flight_permission(
        &flight.permissions,
        flight.no_auth_permission,
        &vessel.permissions,
        vessel.no_auth_permission,
        user_id.as_deref(),
    );
    super::auth_routes::required_permission(eff, Permission::Write)?;

    for command in &commands {
        if command.state != CommandState::New {
            return Err(AppError::InvalidInput("dispatched commands must start in state 'new'".to_string()));
        }
        if !command.satisfies_new_state_invariant() {
            return Err(AppError::InvalidInput(
                "a command in state 'new' must have no lifecycle timestamps or response".to_string(),
            ));
        }
        validate_payload(&flight, command)?;
    }

    state.stores.commands.insert_many(&commands).await.map_err(AppError::Internal)?;

    for command in &commands {
        state.audit.log_command_dispatched(flight_id, command.id).await;
    }
    if !commands.is_empty() {
        state.events.publish_command_new(CommandEvent {
            flight_id,
            commands: commands.clone(),
            from_client: true,
        });
    }

    Ok(Json(commands))
}

/// Vessel-originated confirmation/self-origination: replace-by-id upsert,
/// never regressing a command back to `new`.
async fn confirm_commands(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(flight_id): Path<Uuid>,
    Json(commands): Json<Vec<Command>>,
) -> AppResult<impl IntoResponse> {
    let ctx = resolve_required(&state.tokens, &headers)?;
    ctx.require_role("vessel")?;

    let (mut flight, _vessel) = load_flight_and_vessel(&state, flight_id).await?;

    for command in &commands {
        if command.state == CommandState::New {
            return Err(AppError::InvalidInput("a vessel confirmation must never set state back to 'new'".to_string()));
        }
        if let Some(info) = flight.available_commands.get(&command.command_type) {
            validate_part_assignment(info, command)?;
        }
        if command.state == CommandState::Completed {
            validate_payload_response(&flight, command)?;
        }
    }

    let now = Utc::now();
    if flight.touch(now) {
        state.stores.flights.upsert(&flight).await.map_err(AppError::Internal)?;
    }

    state.stores.commands.insert_or_update_many(&commands).await.map_err(AppError::Internal)?;

    for command in &commands {
        state.audit.log_command_confirmed(flight_id, command.id, &command.state.to_string()).await;
    }
    if !commands.is_empty() {
        state.events.publish_command_update(CommandEvent {
            flight_id,
            commands: commands.clone(),
            from_client: false,
        });
    }

    Ok(Json(commands))
}

fn validate_payload_response(flight: &Flight, command: &Command) -> AppResult<()> {
    let Some(info) = flight.available_commands.get(&command.command_type) else {
        return Ok(());
    };
    if let (Some(schema), Some(response)) = (&info.response_schema, &command.response) {
        validation::validate_against_schema(schema, response).map_err(AppError::InvalidPayload)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(supported_on_vehicle_level: bool, supporting_parts: Vec<Uuid>) -> CommandInfo {
        CommandInfo {
            name: "abort".to_string(),
            payload_schema: None,
            response_schema: None,
            supported_on_vehicle_level,
            supporting_parts,
        }
    }

    fn command_with_part(part_id: Option<Uuid>) -> Command {
        Command {
            id: Uuid::new_v4(),
            flight_id: Uuid::new_v4(),
            command_type: "abort".to_string(),
            create_time: Utc::now(),
            part_id,
            dispatch_time: None,
            receive_time: None,
            complete_time: None,
            state: CommandState::New,
            command_payload: None,
            response: None,
            response_message: None,
        }
    }

    #[test]
    fn vehicle_level_command_without_part_is_allowed_when_flagged() {
        let info = info(true, vec![]);
        assert!(validate_part_assignment(&info, &command_with_part(None)).is_ok());
    }

    #[test]
    fn part_less_command_rejected_when_not_vehicle_level() {
        let info = info(false, vec![]);
        assert!(validate_part_assignment(&info, &command_with_part(None)).is_err());
    }

    #[test]
    fn part_targeted_command_allowed_when_part_is_supporting() {
        let part_id = Uuid::new_v4();
        let info = info(false, vec![part_id]);
        assert!(validate_part_assignment(&info, &command_with_part(Some(part_id))).is_ok());
    }

    #[test]
    fn part_targeted_command_rejected_when_part_is_not_supporting() {
        let info = info(false, vec![Uuid::new_v4()]);
        assert!(validate_part_assignment(&info, &command_with_part(Some(Uuid::new_v4()))).is_err());
    }
}
