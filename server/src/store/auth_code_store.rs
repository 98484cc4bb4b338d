//! Grounded on `app/models/authorization_code.py`.

use chrono::{DateTime, Utc};
use mongodb::bson::doc;
use mongodb::{Collection, Database};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    #[serde(rename = "_id")]
    pub id: String,
    pub corresponding_user: Uuid,
    /// Roles the minted access token should carry once redeemed. A vessel
    /// auth code carries `["vessel"]` and `corresponding_user` is then the
    /// vessel's own id rather than a row in `users`.
    #[serde(default)]
    pub roles: Vec<String>,
    pub single_use: bool,
    pub valid_until: DateTime<Utc>,
}

/// ≥256 bytes of entropy, base64-encoded.
pub fn generate_auth_code(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}

#[derive(Clone)]
pub struct AuthCodeStore {
    collection: Collection<AuthorizationCode>,
}

impl AuthCodeStore {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("authorization_codes"),
        }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        roles: Vec<String>,
        single_use: bool,
        valid_until: DateTime<Utc>,
    ) -> anyhow::Result<AuthorizationCode> {
        let code = AuthorizationCode {
            id: generate_auth_code(32),
            corresponding_user: user_id,
            roles,
            single_use,
            valid_until,
        };
        self.collection.insert_one(&code).await?;
        Ok(code)
    }

    /// Fetches the code; if found but expired, deletes it and returns
    /// `None` — "any code older than validUntil must be rejected and
    /// deleted on first encounter".
    pub async fn redeem(&self, code: &str) -> anyhow::Result<Option<AuthorizationCode>> {
        let Some(found) = self.collection.find_one(doc! { "_id": code }).await? else {
            return Ok(None);
        };
        if found.valid_until < Utc::now() {
            self.collection.delete_one(doc! { "_id": code }).await?;
            return Ok(None);
        }
        if found.single_use {
            self.collection.delete_one(doc! { "_id": code }).await?;
        }
        Ok(Some(found))
    }

    pub async fn revoke(&self, code: &str) -> anyhow::Result<bool> {
        let result = self.collection.delete_one(doc! { "_id": code }).await?;
        Ok(result.deleted_count > 0)
    }
}
