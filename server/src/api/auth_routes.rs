//! `/auth/*` — grounded on `app/services/auth/jwt_auth_service.py` and
//! `app/middleware/auth/requireAuth.py`.

use super::AppState;
use crate::auth::{bearer_token, resolve_required};
use crate::error::{AppError, AppResult};
use crate::models::User;
use crate::permissions::Permission;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/authorization_code_flow", post(authorization_code_flow))
        .route("/auth/auth_code/rewoke", post(revoke_auth_code))
        .route("/auth/public_key", get(public_key))
        .route("/auth/verify_authenticated", get(verify_authenticated))
}

#[derive(Debug, Serialize)]
struct TokenPair {
    token: String,
    refresh_token: String,
}

async fn issue_token_pair(state: &AppState, user: &User) -> AppResult<TokenPair> {
    let token = state
        .tokens
        .generate_access_token(user.id, &user.unique_name, &user.name, user.roles.clone(), None)
        .map_err(AppError::Internal)?;
    let refresh = state
        .stores
        .auth_codes
        .create(user.id, user.roles.clone(), true, Utc::now() + crate::auth::tokens::REFRESH_TOKEN_LIFETIME)
        .await
        .map_err(AppError::Internal)?;
    Ok(TokenPair {
        token,
        refresh_token: refresh.id,
    })
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    name: String,
    unique_name: String,
    pw: String,
}

async fn register(State(state): State<AppState>, Json(body): Json<RegisterRequest>) -> AppResult<impl IntoResponse> {
    if state
        .stores
        .users
        .find_by_unique_name(&body.unique_name)
        .await
        .map_err(AppError::Internal)?
        .is_some()
    {
        return Err(AppError::Conflict(format!("handle '{}' already taken", body.unique_name)));
    }

    let id = Uuid::new_v4();
    let user = User {
        id,
        pw: Some(crate::models::user::hash_password(id, &body.pw)),
        unique_name: body.unique_name,
        name: body.name,
        roles: Vec::new(),
    };
    state.stores.users.create(&user).await.map_err(AppError::Internal)?;

    let pair = issue_token_pair(&state, &user).await?;
    Ok(Json(pair))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    unique_name: String,
    pw: String,
}

async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> AppResult<impl IntoResponse> {
    let user = state
        .stores
        .users
        .find_by_unique_name(&body.unique_name)
        .await
        .map_err(AppError::Internal)?
        .ok_or(AppError::AuthInvalid("no such user".to_string()))?;

    if !user.verify_password(&body.pw) {
        return Err(AppError::AuthInvalid("incorrect password".to_string()));
    }

    let pair = issue_token_pair(&state, &user).await?;
    Ok(Json(pair))
}

#[derive(Debug, Deserialize)]
struct AuthorizationCodeFlowRequest {
    token: String,
    #[serde(default)]
    resources: Option<Vec<(String, String)>>,
}

async fn authorization_code_flow(
    State(state): State<AppState>,
    Json(body): Json<AuthorizationCodeFlowRequest>,
) -> AppResult<impl IntoResponse> {
    let code = state
        .stores
        .auth_codes
        .redeem(&body.token)
        .await
        .map_err(AppError::Internal)?
        .ok_or(AppError::TokenExpired)?;

    // A vessel-minted code carries its own role set and authenticates the
    // vessel itself rather than a row in `users`.
    let (access_token, refresh) = if code.roles.iter().any(|r| r == "vessel") {
        let token = state
            .tokens
            .generate_access_token(
                code.corresponding_user,
                &code.corresponding_user.to_string(),
                &code.corresponding_user.to_string(),
                code.roles.clone(),
                body.resources,
            )
            .map_err(AppError::Internal)?;
        let refresh = state
            .stores
            .auth_codes
            .create(
                code.corresponding_user,
                code.roles.clone(),
                true,
                Utc::now() + crate::auth::tokens::REFRESH_TOKEN_LIFETIME,
            )
            .await
            .map_err(AppError::Internal)?;
        (token, refresh)
    } else {
        let user = state
            .stores
            .users
            .get(code.corresponding_user)
            .await
            .map_err(AppError::Internal)?
            .ok_or_else(|| AppError::NotFound("user for authorization code".to_string()))?;

        let token = state
            .tokens
            .generate_access_token(user.id, &user.unique_name, &user.name, user.roles.clone(), body.resources)
            .map_err(AppError::Internal)?;
        let refresh = state
            .stores
            .auth_codes
            .create(user.id, user.roles.clone(), true, Utc::now() + crate::auth::tokens::REFRESH_TOKEN_LIFETIME)
            .await
            .map_err(AppError::Internal)?;
        (token, refresh)
    };

    Ok(Json(TokenPair {
        token: access_token,
        refresh_token: refresh.id,
    }))
}

#[derive(Debug, Deserialize)]
struct RevokeRequest {
    code: String,
}

async fn revoke_auth_code(
    State(state): State<AppState>,
    Json(body): Json<RevokeRequest>,
) -> AppResult<impl IntoResponse> {
    // code-as-auth: possession of the code is the authorization to revoke it.
    let removed = state.stores.auth_codes.revoke(&body.code).await.map_err(AppError::Internal)?;
    if removed {
        Ok(axum::http::StatusCode::OK)
    } else {
        Err(AppError::NotFound("authorization code".to_string()))
    }
}

async fn public_key(State(state): State<AppState>) -> impl IntoResponse {
    state.tokens.public_key_pem().to_string()
}

async fn verify_authenticated(State(state): State<AppState>, headers: HeaderMap) -> AppResult<impl IntoResponse> {
    let _ctx = resolve_required(&state.tokens, &headers)?;
    Ok(axum::http::StatusCode::OK)
}

/// Shared by `vessel_routes`/`flight_routes`/`command_routes`: resolve the
/// bearer (if any) without requiring it, for endpoints whose authorization
/// depends on `noAuthPermission`.
pub fn optional_user(state: &AppState, headers: &HeaderMap) -> Option<Uuid> {
    bearer_token(headers)
        .and_then(|t| state.tokens.validate_access_token(t).ok())
        .and_then(|c| Uuid::parse_str(&c.uid).ok())
}

pub fn required_permission(effective: Permission, required: Permission) -> AppResult<()> {
    if effective >= required {
        Ok(())
    } else {
        Err(AppError::PermissionDenied)
    }
}

pub fn valid_until_within_one_year(valid_until: DateTime<Utc>) -> AppResult<()> {
    if crate::auth::tokens::exceeds_max_auth_code_lifetime(valid_until) {
        Err(AppError::InvalidInput("validUntil exceeds the one-year maximum".to_string()))
    } else {
        Ok(())
    }
}
