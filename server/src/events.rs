//! Event bus (C10). Grounded on `app/services/data_access/command.py` and
//! `app/services/data_access/flight_data_compact.py`'s `blinker` named
//! signals, reshaped per Design Notes §9 into an explicit, typed,
//! in-process bus: one `tokio::sync::broadcast` channel per event kind.
//! Emitters never await handlers; handlers that perform I/O spawn their
//! own tasks.

use crate::models::measurement::MeasurementMetadata;
use crate::models::{Command, Flight, MeasurementRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Serialize)]
pub struct CommandEvent {
    pub flight_id: Uuid,
    pub commands: Vec<Command>,
    pub from_client: bool,
}

/// §4.8 step 5: the fan-out payload carries aggregates only, with the raw
/// per-sample arrays stripped — mirrors the original's split between the
/// stored record and its `flight_measurement_compact` wire form.
#[derive(Debug, Clone, Serialize)]
pub struct CompactMeasurement {
    pub metadata: MeasurementMetadata,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub min: Option<f64>,
    pub avg: Option<f64>,
    pub max: Option<f64>,
}

impl From<&MeasurementRecord> for CompactMeasurement {
    fn from(record: &MeasurementRecord) -> Self {
        Self {
            metadata: record.metadata.clone(),
            start_time: record.start_time,
            end_time: record.end_time,
            min: record.min,
            avg: record.avg,
            max: record.max,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MeasurementEvent {
    pub flight_id: Uuid,
    pub measurements: Vec<CompactMeasurement>,
}

impl MeasurementEvent {
    pub fn from_records(flight_id: Uuid, records: &[MeasurementRecord]) -> Self {
        Self {
            flight_id,
            measurements: records.iter().map(CompactMeasurement::from).collect(),
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    flight_new: broadcast::Sender<Flight>,
    flight_update: broadcast::Sender<Flight>,
    command_new: broadcast::Sender<CommandEvent>,
    command_update: broadcast::Sender<CommandEvent>,
    new_measurement_compact: broadcast::Sender<MeasurementEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            flight_new: broadcast::channel(CHANNEL_CAPACITY).0,
            flight_update: broadcast::channel(CHANNEL_CAPACITY).0,
            command_new: broadcast::channel(CHANNEL_CAPACITY).0,
            command_update: broadcast::channel(CHANNEL_CAPACITY).0,
            new_measurement_compact: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn publish_flight_new(&self, flight: Flight) {
        let _ = self.flight_new.send(flight);
    }

    pub fn publish_flight_update(&self, flight: Flight) {
        let _ = self.flight_update.send(flight);
    }

    pub fn publish_command_new(&self, event: CommandEvent) {
        let _ = self.command_new.send(event);
    }

    pub fn publish_command_update(&self, event: CommandEvent) {
        let _ = self.command_update.send(event);
    }

    pub fn publish_new_measurement_compact(&self, event: MeasurementEvent) {
        let _ = self.new_measurement_compact.send(event);
    }

    pub fn subscribe_flight_new(&self) -> broadcast::Receiver<Flight> {
        self.flight_new.subscribe()
    }

    pub fn subscribe_flight_update(&self) -> broadcast::Receiver<Flight> {
        self.flight_update.subscribe()
    }

    pub fn subscribe_command_new(&self) -> broadcast::Receiver<CommandEvent> {
        self.command_new.subscribe()
    }

    pub fn subscribe_command_update(&self) -> broadcast::Receiver<CommandEvent> {
        self.command_update.subscribe()
    }

    pub fn subscribe_new_measurement_compact(&self) -> broadcast::Receiver<MeasurementEvent> {
        self.new_measurement_compact.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::measurement::MeasurementMetadata;

    #[test]
    fn compact_conversion_strips_the_raw_sample_array() {
        let record = MeasurementRecord {
            start_time: Utc::now(),
            end_time: Utc::now(),
            metadata: MeasurementMetadata {
                flight_id: Uuid::new_v4(),
                part_index: 0,
                series_index: 0,
            },
            measurements: vec![(0.0, serde_json::json!(1.0)), (1.0, serde_json::json!(2.0))],
            min: Some(1.0),
            avg: Some(1.5),
            max: Some(2.0),
        };

        let event = MeasurementEvent::from_records(record.metadata.flight_id, &[record]);
        let serialized = serde_json::to_value(&event).unwrap();
        let first = &serialized["measurements"][0];
        assert!(first.get("measurements").is_none(), "compact payload must not carry raw samples");
        assert_eq!(first["min"], 1.0);
        assert_eq!(first["max"], 2.0);
    }
}
