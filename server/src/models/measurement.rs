//! Grounded on `app/models/flight_measurement.py`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementDescriptor {
    pub name: String,
    /// Either a single-character struct shape, a compound shape string
    /// (`"[f]"`, `"[str]"`), or a record (`[(name, type), …]`) — see C1.
    #[serde(rename = "type")]
    pub shape: Json,
}

/// One row per flush bucket, per (flight, partIndex, seriesIndex).
///
/// `start_time`/`end_time` are stored as native BSON dates (required by the
/// `timeField`/rollup aggregation in C6), not serde's default RFC3339
/// string — hence the explicit `bson::serde_helpers` conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementRecord {
    #[serde(rename = "_start_time", with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub end_time: DateTime<Utc>,
    pub metadata: MeasurementMetadata,
    /// `(timestamp, value)` pairs in receive order.
    pub measurements: Vec<(f64, Json)>,
    pub min: Option<f64>,
    pub avg: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementMetadata {
    #[serde(rename = "_flight_id")]
    pub flight_id: Uuid,
    pub part_index: u32,
    pub series_index: u32,
}

/// An aggregated rollup row, as returned by the aggregation pipeline (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementAggregated {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub min: Option<f64>,
    pub avg: Option<f64>,
    pub max: Option<f64>,
    pub first: Option<Json>,
    pub last: Option<Json>,
}
