//! # audit
//!
//! SHA-256 chained immutable audit log. Every block hashes the previous
//! block's hash, so tampering with any entry breaks the chain.
//!
//! This is ambient logging infrastructure (not one of the core components),
//! carried over from the teacher's own `audit.rs` and repointed at this
//! domain's critical events: vessel version bumps, command dispatch and
//! confirmation, and cascading deletes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as FmtWrite;
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    VesselVersionBump,
    VesselDeleted,
    FlightCreated,
    CommandDispatched,
    CommandConfirmed,
    SessionEvent,
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_string(self).unwrap_or_default();
        write!(f, "{}", s.trim_matches('"'))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditBlock {
    pub block_seq: u64,
    pub session_id: String,
    pub timestamp_ms: u64,
    pub prev_hash: String,
    pub event_type: AuditEventType,
    pub payload_json: String,
    pub block_hash: String,
}

impl AuditBlock {
    fn compute_hash(prev_hash: &str, timestamp_ms: u64, event_type: &AuditEventType, payload_json: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(prev_hash.as_bytes());
        hasher.update(timestamp_ms.to_le_bytes());
        hasher.update(event_type.to_string().as_bytes());
        hasher.update(payload_json.as_bytes());
        let result = hasher.finalize();
        let mut hex = String::with_capacity(64);
        for byte in result {
            let _ = write!(hex, "{byte:02x}");
        }
        hex
    }

    pub fn new(
        block_seq: u64,
        session_id: String,
        timestamp_ms: u64,
        prev_hash: String,
        event_type: AuditEventType,
        payload_json: String,
    ) -> Self {
        let block_hash = Self::compute_hash(&prev_hash, timestamp_ms, &event_type, &payload_json);
        Self {
            block_seq,
            session_id,
            timestamp_ms,
            prev_hash,
            event_type,
            payload_json,
            block_hash,
        }
    }

    pub fn verify(&self) -> bool {
        let expected = Self::compute_hash(&self.prev_hash, self.timestamp_ms, &self.event_type, &self.payload_json);
        expected == self.block_hash
    }
}

const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";
const AUDIT_LOG_PATH: &str = "/data/audit.jsonl";

#[derive(Default)]
struct AuditState {
    block_seq: u64,
    last_hash: String,
}

#[derive(Clone)]
pub struct AuditLogger {
    state: Arc<RwLock<AuditState>>,
    session_id: Arc<RwLock<String>>,
}

impl AuditLogger {
    pub fn new() -> Self {
        let initial_state = AuditState {
            block_seq: 0,
            last_hash: GENESIS_HASH.to_string(),
        };
        Self {
            state: Arc::new(RwLock::new(initial_state)),
            session_id: Arc::new(RwLock::new("default".to_string())),
        }
    }

    pub async fn set_session(&self, id: String) {
        *self.session_id.write().await = id;
    }

    pub async fn append(&self, event_type: AuditEventType, payload: serde_json::Value) {
        let timestamp_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let payload_json = payload.to_string();
        let session_id = self.session_id.read().await.clone();

        let block = {
            let mut state = self.state.write().await;
            let block = AuditBlock::new(
                state.block_seq,
                session_id,
                timestamp_ms,
                state.last_hash.clone(),
                event_type,
                payload_json,
            );
            state.last_hash = block.block_hash.clone();
            state.block_seq += 1;
            block
        };

        debug_assert!(block.verify(), "AuditBlock hash mismatch immediately after creation");

        let line = match serde_json::to_string(&block) {
            Ok(l) => format!("{l}\n"),
            Err(e) => {
                warn!("Audit: failed to serialize block: {e}");
                return;
            }
        };

        match OpenOptions::new().create(true).append(true).open(AUDIT_LOG_PATH).await {
            Ok(mut f) => {
                if let Err(e) = f.write_all(line.as_bytes()).await {
                    warn!("Audit: write failed: {e}");
                }
            }
            Err(e) => {
                info!("Audit[{}]: {} — {}", block.block_seq, block.event_type, block.block_hash);
                if !e.kind().eq(&std::io::ErrorKind::NotFound) {
                    warn!("Audit: could not open {AUDIT_LOG_PATH}: {e}");
                }
            }
        }
    }

    pub async fn log_vessel_version_bump(&self, vessel_id: uuid::Uuid, new_version: u64) {
        self.append(
            AuditEventType::VesselVersionBump,
            serde_json::json!({ "vessel_id": vessel_id, "version": new_version }),
        )
        .await;
    }

    pub async fn log_vessel_deleted(&self, vessel_id: uuid::Uuid) {
        self.append(AuditEventType::VesselDeleted, serde_json::json!({ "vessel_id": vessel_id })).await;
    }

    pub async fn log_command_dispatched(&self, flight_id: uuid::Uuid, command_id: uuid::Uuid) {
        self.append(
            AuditEventType::CommandDispatched,
            serde_json::json!({ "flight_id": flight_id, "command_id": command_id }),
        )
        .await;
    }

    pub async fn log_command_confirmed(&self, flight_id: uuid::Uuid, command_id: uuid::Uuid, state: &str) {
        self.append(
            AuditEventType::CommandConfirmed,
            serde_json::json!({ "flight_id": flight_id, "command_id": command_id, "state": state }),
        )
        .await;
    }

    pub async fn log_session_event(&self, event: &str, detail: Option<serde_json::Value>) {
        self.append(AuditEventType::SessionEvent, serde_json::json!({ "event": event, "detail": detail })).await;
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_block_verifies() {
        let block = AuditBlock::new(0, "s1".to_string(), 1, GENESIS_HASH.to_string(), AuditEventType::SessionEvent, "{}".to_string());
        assert!(block.verify());
    }

    #[test]
    fn tampering_with_payload_breaks_verification() {
        let mut block = AuditBlock::new(0, "s1".to_string(), 1, GENESIS_HASH.to_string(), AuditEventType::VesselDeleted, "{}".to_string());
        block.payload_json = "{\"vessel_id\":\"tampered\"}".to_string();
        assert!(!block.verify());
    }

    #[tokio::test]
    async fn successive_blocks_chain_by_hash() {
        let logger = AuditLogger::new();
        logger.log_session_event("server_start", None).await;
        logger.log_vessel_deleted(uuid::Uuid::new_v4()).await;

        let state = logger.state.read().await;
        assert_eq!(state.block_seq, 2);
        assert_ne!(state.last_hash, GENESIS_HASH);
    }
}
