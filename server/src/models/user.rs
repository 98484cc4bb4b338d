//! Grounded on `app/models/user.py`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub pw: Option<String>,
    pub unique_name: String,
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// `base64(sha256(password || user_id))` — the user's own id is the salt,
/// so the same password hashes differently per account.
pub fn hash_password(user_id: Uuid, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(user_id.as_bytes());
    let digest = hasher.finalize();
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, digest)
}

impl User {
    pub fn verify_password(&self, password: &str) -> bool {
        match &self.pw {
            Some(hash) => *hash == hash_password(self.id, password),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_is_salted_with_user_id() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_ne!(hash_password(a, "hunter2"), hash_password(b, "hunter2"));
    }
}
