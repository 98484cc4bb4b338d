//! `/v1/vessels/*` — grounded on `app/services/data_access/vessel.py` and
//! `app/routes/vessel_routes.py`.

use super::auth_routes::{optional_user, required_permission, valid_until_within_one_year};
use super::AppState;
use crate::auth::resolve_required;
use crate::error::{AppError, AppResult};
use crate::models::{Vessel, VesselPart};
use crate::permissions::{self, Permission};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/vessels/", post(upsert_vessel).get(list_vessels))
        .route("/v1/vessels/:id", get(get_vessel).put(rename_vessel).delete(delete_vessel))
        .route("/v1/vessels/:id/versions", get(list_versions))
        .route("/v1/vessels/:id/versions/:version", get(get_historic_vessel).delete(delete_version))
        .route("/v1/vessels/:id/auth_codes", post(mint_auth_code))
}

async fn vessel_permission(state: &AppState, headers: &HeaderMap, vessel: &Vessel) -> Permission {
    let user_id = optional_user(state, headers).map(|u| u.to_string());
    permissions::effective_permission(&vessel.permissions, vessel.no_auth_permission, user_id.as_deref())
}

async fn load_vessel(state: &AppState, id: Uuid) -> AppResult<Vessel> {
    state
        .stores
        .vessels
        .get(id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound(format!("vessel {id}")))
}

#[derive(Debug, Deserialize)]
struct VesselRequest {
    #[serde(default)]
    id: Option<Uuid>,
    name: String,
    #[serde(default)]
    parts: Vec<VesselPart>,
    #[serde(default)]
    no_auth_permission: Option<Permission>,
}

async fn upsert_vessel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<VesselRequest>,
) -> AppResult<impl IntoResponse> {
    let ctx = resolve_required(&state.tokens, &headers)?;
    ctx.require_role("vessel")?;
    let user_id = ctx.user_id.ok_or(AppError::AuthInvalid("token carries no subject".to_string()))?;

    let id = body.id.unwrap_or_else(Uuid::new_v4);
    let existing = state.stores.vessels.get(id).await.map_err(AppError::Internal)?;
    let prior_version = existing.as_ref().map(|v| v.version).unwrap_or(0);

    let mut incoming = match &existing {
        Some(prior) => Vessel {
            id,
            version: prior.version,
            name: prior.name.clone(),
            parts: body.parts,
            permissions: prior.permissions.clone(),
            no_auth_permission: prior.no_auth_permission,
        },
        None => {
            let mut permissions = crate::permissions::PermissionMap::new();
            permissions.insert(user_id.to_string(), Permission::Owner);
            Vessel {
                id,
                version: 0,
                name: body.name,
                parts: body.parts,
                permissions,
                no_auth_permission: body.no_auth_permission.unwrap_or_default(),
            }
        }
    };

    permissions::ensure_owner_exists(&incoming.permissions, &mut incoming.no_auth_permission);

    let saved = state.stores.vessels.upsert(incoming).await.map_err(AppError::Internal)?;
    if saved.version != prior_version {
        state.audit.log_vessel_version_bump(saved.id, saved.version).await;
    }
    Ok(Json(saved))
}

async fn list_vessels(State(state): State<AppState>, headers: HeaderMap) -> AppResult<impl IntoResponse> {
    let user_id = optional_user(&state, &headers).map(|u| u.to_string());
    let all = state.stores.vessels.list_all().await.map_err(AppError::Internal)?;
    let visible: Vec<Vessel> = all
        .into_iter()
        .filter(|v| {
            permissions::effective_permission(&v.permissions, v.no_auth_permission, user_id.as_deref()) >= Permission::View
        })
        .collect();
    Ok(Json(visible))
}

async fn get_vessel(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<Uuid>) -> AppResult<impl IntoResponse> {
    let vessel = load_vessel(&state, id).await?;
    let eff = vessel_permission(&state, &headers, &vessel).await;
    required_permission(eff, Permission::View)?;
    Ok(Json(vessel))
}

async fn get_historic_vessel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, version)): Path<(Uuid, u64)>,
) -> AppResult<impl IntoResponse> {
    let current = load_vessel(&state, id).await?;
    let eff = vessel_permission(&state, &headers, &current).await;
    required_permission(eff, Permission::View)?;

    let historic = state
        .stores
        .vessels
        .get_historic(id, version)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound(format!("vessel {id} version {version}")))?;
    Ok(Json(historic))
}

async fn rename_vessel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<RenameRequest>,
) -> AppResult<impl IntoResponse> {
    let vessel = load_vessel(&state, id).await?;
    let eff = vessel_permission(&state, &headers, &vessel).await;
    required_permission(eff, Permission::Owner)?;

    let renamed = state
        .stores
        .vessels
        .rename(id, body.name)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound(format!("vessel {id}")))?;
    Ok(Json(renamed))
}

#[derive(Debug, Deserialize)]
struct RenameRequest {
    name: String,
}

async fn delete_vessel(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<Uuid>) -> AppResult<impl IntoResponse> {
    let vessel = load_vessel(&state, id).await?;
    let eff = vessel_permission(&state, &headers, &vessel).await;
    required_permission(eff, Permission::Owner)?;

    let deleted = state
        .stores
        .vessels
        .delete_cascade(id, &state.stores.flights, &state.stores.measurements, &state.stores.commands)
        .await
        .map_err(AppError::Internal)?;
    if !deleted {
        return Err(AppError::NotFound(format!("vessel {id}")));
    }
    state.audit.log_vessel_deleted(id).await;
    Ok(axum::http::StatusCode::OK)
}

async fn list_versions(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<Uuid>) -> AppResult<impl IntoResponse> {
    let vessel = load_vessel(&state, id).await?;
    let eff = vessel_permission(&state, &headers, &vessel).await;
    required_permission(eff, Permission::View)?;

    let versions = state.stores.vessels.list_versions(id).await.map_err(AppError::Internal)?;
    Ok(Json(versions))
}

async fn delete_version(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, version)): Path<(Uuid, u64)>,
) -> AppResult<impl IntoResponse> {
    let vessel = load_vessel(&state, id).await?;
    let eff = vessel_permission(&state, &headers, &vessel).await;
    required_permission(eff, Permission::Owner)?;

    let removed = state.stores.vessels.delete_version(id, version).await.map_err(AppError::Internal)?;
    if removed {
        Ok(axum::http::StatusCode::OK)
    } else {
        Err(AppError::NotFound(format!("vessel {id} version {version}")))
    }
}

#[derive(Debug, Deserialize)]
struct MintAuthCodeRequest {
    valid_until: DateTime<Utc>,
    #[serde(default = "default_single_use")]
    single_use: bool,
}

fn default_single_use() -> bool {
    true
}

async fn mint_auth_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<MintAuthCodeRequest>,
) -> AppResult<impl IntoResponse> {
    let vessel = load_vessel(&state, id).await?;
    let eff = vessel_permission(&state, &headers, &vessel).await;
    required_permission(eff, Permission::Owner)?;
    valid_until_within_one_year(body.valid_until)?;

    let code = state
        .stores
        .auth_codes
        .create(id, vec!["vessel".to_string()], body.single_use, body.valid_until)
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(code))
}
