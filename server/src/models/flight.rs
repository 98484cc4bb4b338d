//! Grounded on `app/models/flight.py`.

use super::command::CommandInfo;
use super::measurement::MeasurementDescriptor;
use crate::permissions::{Permission, PermissionMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub use super::vessel::VesselPart;

pub const DEFAULT_HEAD_TIME: chrono::Duration = chrono::Duration::minutes(2);
pub const MINIMUM_HEAD_TIME: chrono::Duration = chrono::Duration::minutes(1);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flight {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub vessel_id: Uuid,
    pub vessel_version: u64,
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub measured_part_ids: Vec<Uuid>,
    pub measured_parts: HashMap<Uuid, Vec<MeasurementDescriptor>>,
    #[serde(default)]
    pub available_commands: HashMap<String, CommandInfo>,
    #[serde(default)]
    pub permissions: PermissionMap,
    #[serde(default)]
    pub no_auth_permission: Permission,
}

impl Flight {
    /// `(partIndex, seriesIndex)` must index into `measuredPartIds` and the
    /// descriptor sequence selected by that part.
    pub fn descriptor_for(&self, part_index: usize, series_index: usize) -> Option<&MeasurementDescriptor> {
        let part_id = self.measured_part_ids.get(part_index)?;
        self.measured_parts.get(part_id)?.get(series_index)
    }

    /// Extends `end` to `now + DEFAULT_HEAD_TIME` if less than
    /// `MIN_HEAD_TIME` remains. Shared by the ingestion flush task and
    /// command confirmation (Design Notes: "consolidate into a single
    /// touch-flight helper").
    pub fn touch(&mut self, now: DateTime<Utc>) -> bool {
        let needs_extension = match self.end {
            Some(end) => end - now < MINIMUM_HEAD_TIME,
            None => true,
        };
        if needs_extension {
            self.end = Some(now + DEFAULT_HEAD_TIME);
        }
        needs_extension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_flight(end: Option<DateTime<Utc>>) -> Flight {
        Flight {
            id: Uuid::new_v4(),
            vessel_id: Uuid::new_v4(),
            vessel_version: 1,
            name: "test".to_string(),
            start: Utc::now(),
            end,
            measured_part_ids: Vec::new(),
            measured_parts: HashMap::new(),
            available_commands: HashMap::new(),
            permissions: PermissionMap::new(),
            no_auth_permission: Permission::None,
        }
    }

    #[test]
    fn touch_extends_when_end_is_unset() {
        let mut flight = bare_flight(None);
        let now = Utc::now();
        assert!(flight.touch(now));
        assert_eq!(flight.end, Some(now + DEFAULT_HEAD_TIME));
    }

    #[test]
    fn touch_extends_when_remaining_head_time_is_below_minimum() {
        let now = Utc::now();
        let mut flight = bare_flight(Some(now + chrono::Duration::seconds(30)));
        assert!(flight.touch(now));
        assert_eq!(flight.end, Some(now + DEFAULT_HEAD_TIME));
    }

    #[test]
    fn touch_is_a_no_op_when_enough_head_time_remains() {
        let now = Utc::now();
        let far_end = now + chrono::Duration::minutes(5);
        let mut flight = bare_flight(Some(far_end));
        assert!(!flight.touch(now));
        assert_eq!(flight.end, Some(far_end));
    }

    #[test]
    fn descriptor_for_resolves_through_part_index_then_series_index() {
        let mut flight = bare_flight(None);
        let part_id = Uuid::new_v4();
        flight.measured_part_ids.push(part_id);
        flight.measured_parts.insert(
            part_id,
            vec![MeasurementDescriptor { name: "speed".to_string(), shape: serde_json::json!("f") }],
        );
        assert_eq!(flight.descriptor_for(0, 0).map(|d| d.name.as_str()), Some("speed"));
        assert!(flight.descriptor_for(0, 1).is_none());
        assert!(flight.descriptor_for(1, 0).is_none());
    }
}
