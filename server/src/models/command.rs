//! Grounded on `app/models/command.py`; state machine per spec §4.7.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandState {
    New,
    Dispatched,
    Received,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandInfo {
    pub name: String,
    #[serde(default)]
    pub payload_schema: Option<Json>,
    #[serde(default)]
    pub response_schema: Option<Json>,
    #[serde(default)]
    pub supported_on_vehicle_level: bool,
    #[serde(default)]
    pub supporting_parts: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub flight_id: Uuid,
    pub command_type: String,
    pub create_time: DateTime<Utc>,
    pub part_id: Option<Uuid>,
    #[serde(default)]
    pub dispatch_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub receive_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub complete_time: Option<DateTime<Utc>>,
    pub state: CommandState,
    #[serde(default)]
    pub command_payload: Option<Json>,
    #[serde(default)]
    pub response: Option<Json>,
    #[serde(default)]
    pub response_message: Option<String>,
}

impl std::fmt::Display for CommandState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_string(self).unwrap_or_default();
        write!(f, "{}", s.trim_matches('"'))
    }
}

impl Command {
    /// §4.7 / §8: `state=='new'` implies every lifecycle timestamp and the
    /// response are null.
    pub fn satisfies_new_state_invariant(&self) -> bool {
        if self.state != CommandState::New {
            return true;
        }
        self.dispatch_time.is_none()
            && self.receive_time.is_none()
            && self.complete_time.is_none()
            && self.response.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_command(state: CommandState) -> Command {
        Command {
            id: Uuid::new_v4(),
            flight_id: Uuid::new_v4(),
            command_type: "abort".to_string(),
            create_time: Utc::now(),
            part_id: None,
            dispatch_time: None,
            receive_time: None,
            complete_time: None,
            state,
            command_payload: None,
            response: None,
            response_message: None,
        }
    }

    #[test]
    fn fresh_new_command_satisfies_invariant() {
        assert!(bare_command(CommandState::New).satisfies_new_state_invariant());
    }

    #[test]
    fn new_command_with_a_timestamp_violates_invariant() {
        let mut command = bare_command(CommandState::New);
        command.dispatch_time = Some(Utc::now());
        assert!(!command.satisfies_new_state_invariant());
    }

    #[test]
    fn non_new_states_are_exempt_from_the_invariant() {
        let mut command = bare_command(CommandState::Completed);
        command.dispatch_time = Some(Utc::now());
        command.response = Some(serde_json::json!({"ok": true}));
        assert!(command.satisfies_new_state_invariant());
    }

    #[test]
    fn display_matches_lowercase_serde_form() {
        assert_eq!(CommandState::Dispatched.to_string(), "dispatched");
    }
}
