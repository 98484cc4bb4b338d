pub mod keys;
pub mod tokens;

pub use keys::KeyPair;
pub use tokens::{Claims, TokenService};

use crate::error::AppError;
use axum::http::HeaderMap;

/// `try_get_bearer` — strips the `Bearer ` prefix, grounded on
/// `app/middleware/auth/requireAuth.py::try_get_bearer`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// An authenticated (or explicitly anonymous) request principal, passed
/// explicitly through the call stack rather than pulled from a global
/// (Design Notes: "pass an auth context value explicitly").
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Option<uuid::Uuid>,
    pub roles: Vec<String>,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self {
            user_id: None,
            roles: Vec::new(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn require_role(&self, role: &str) -> Result<(), AppError> {
        if self.has_role(role) {
            Ok(())
        } else {
            Err(AppError::PermissionDenied)
        }
    }
}

/// Resolve a request's headers into an `AuthContext`. Optional variant:
/// never errors, missing/invalid bearer just yields an anonymous context.
pub fn resolve_optional(tokens: &TokenService, headers: &HeaderMap) -> AuthContext {
    match bearer_token(headers).and_then(|t| tokens.validate_access_token(t).ok()) {
        Some(claims) => AuthContext {
            user_id: uuid::Uuid::parse_str(&claims.uid).ok(),
            roles: claims.roles,
        },
        None => AuthContext::anonymous(),
    }
}

/// Required variant: missing bearer is `AuthMissing`, invalid is
/// `AuthInvalid`/`TokenExpired`.
pub fn resolve_required(tokens: &TokenService, headers: &HeaderMap) -> Result<AuthContext, AppError> {
    let token = bearer_token(headers).ok_or(AppError::AuthMissing)?;
    let claims = tokens.validate_access_token(token)?;
    let user_id = uuid::Uuid::parse_str(&claims.uid).ok();
    Ok(AuthContext {
        user_id,
        roles: claims.roles,
    })
}
