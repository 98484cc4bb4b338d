//! Token service (C3). Grounded on `app/services/auth/jwt_auth_service.py`.

use super::keys::KeyPair;
use crate::error::AppError;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ISSUER: &str = "flight-platform";
pub const ACCESS_TOKEN_LIFETIME: Duration = Duration::hours(24);
pub const REFRESH_TOKEN_LIFETIME: Duration = Duration::days(30);
pub const MAX_AUTH_CODE_LIFETIME: Duration = Duration::days(365);

/// Fixed synthetic uid the server uses to authenticate itself to its own
/// MQTT broker (matches the original's literal so fixtures can recognize
/// it as the non-human, server-originated principal).
pub const SELF_SERVER_UID: &str = "ddfc1907-953a-4278-a28f-e55a2ad9bd86";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub exp: i64,
    pub uid: String,
    pub unique_name: String,
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub resources: Option<Vec<(String, String)>>,
}

pub struct TokenService {
    keys: KeyPair,
}

impl TokenService {
    pub fn new(keys: KeyPair) -> Self {
        Self { keys }
    }

    pub fn public_key_pem(&self) -> &str {
        &self.keys.public_pem
    }

    pub fn generate_access_token(
        &self,
        uid: Uuid,
        unique_name: &str,
        name: &str,
        roles: Vec<String>,
        resources: Option<Vec<(String, String)>>,
    ) -> anyhow::Result<String> {
        let claims = Claims {
            iss: ISSUER.to_string(),
            exp: (Utc::now() + ACCESS_TOKEN_LIFETIME).timestamp(),
            uid: uid.to_string(),
            unique_name: unique_name.to_string(),
            name: name.to_string(),
            roles,
            resources,
        };
        self.sign(&claims)
    }

    /// The server's own self-signed token, presented to the MQTT broker.
    pub fn self_access_token(&self) -> anyhow::Result<String> {
        let claims = Claims {
            iss: ISSUER.to_string(),
            exp: (Utc::now() + ACCESS_TOKEN_LIFETIME).timestamp(),
            uid: SELF_SERVER_UID.to_string(),
            unique_name: "server".to_string(),
            name: "server".to_string(),
            roles: vec!["server".to_string()],
            resources: None,
        };
        self.sign(&claims)
    }

    fn sign(&self, claims: &Claims) -> anyhow::Result<String> {
        let header = Header::new(Algorithm::RS256);
        Ok(encode(&header, claims, &self.encoding_key())?)
    }

    fn encoding_key(&self) -> &EncodingKey {
        &self.keys.encoding
    }

    fn decoding_key(&self) -> &DecodingKey {
        &self.keys.decoding
    }

    /// Strict validation: signature, issuer, not-expired, `exp`/`iss`
    /// claims present. Any failure is `AuthInvalid`.
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        decode::<Claims>(token, self.decoding_key(), &validation)
            .map(|data| data.claims)
            .map_err(|e| AppError::AuthInvalid(e.to_string()))
    }
}

/// Maximum `validUntil` the service will mint is ≤1 year in the future.
pub fn exceeds_max_auth_code_lifetime(valid_until: chrono::DateTime<Utc>) -> bool {
    valid_until > Utc::now() + MAX_AUTH_CODE_LIFETIME
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_auth_code_minted_beyond_one_year() {
        let too_far = Utc::now() + Duration::days(366);
        assert!(exceeds_max_auth_code_lifetime(too_far));
        let within = Utc::now() + Duration::days(300);
        assert!(!exceeds_max_auth_code_lifetime(within));
    }
}
