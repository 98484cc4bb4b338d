//! Keys are loaded once from PEM files and cached for process lifetime.
//! Grounded on `app/services/auth/jwt_auth_service.py`'s
//! `@lru_cache get_private_key/get_public_key`, adapted to the teacher's
//! `auth.rs` pattern of holding decoding material behind a struct instead
//! of a bare module-level cache.

use anyhow::Context;
use jsonwebtoken::{DecodingKey, EncodingKey};

pub struct KeyPair {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub public_pem: String,
}

impl KeyPair {
    pub fn load(private_key_path: &str, public_key_path: &str) -> anyhow::Result<Self> {
        let private_pem = std::fs::read_to_string(private_key_path)
            .with_context(|| format!("reading private key at {private_key_path}"))?;
        let public_pem = std::fs::read_to_string(public_key_path)
            .with_context(|| format!("reading public key at {public_key_path}"))?;

        let encoding = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .context("parsing RSA private key")?;
        let decoding = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .context("parsing RSA public key")?;

        Ok(Self {
            encoding,
            decoding,
            public_pem,
        })
    }
}
