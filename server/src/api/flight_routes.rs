//! `/v1/flights/*` — grounded on `app/controller/flight_controller.py` and
//! `app/controller/flight_data_controller.py`. The bulk binary report parser
//! follows `app/helper/measurement_binary_helper.py::parse_binary_measurements`
//! byte for byte: `uint8 partIndex | uint16 count | repeat: double time |
//! fields…`, where `fields` is every series of that part packed into one
//! flat record per sample (not one record per series, unlike MQTT ingestion).

use super::auth_routes::optional_user;
use super::AppState;
use crate::auth::resolve_required;
use crate::codec::{self, Shape};
use crate::error::{AppError, AppResult};
use crate::models::measurement::{MeasurementAggregated, MeasurementMetadata};
use crate::models::{CommandInfo, Flight, MeasurementDescriptor, MeasurementRecord};
use crate::permissions::{self, Permission};
use crate::store::measurement_store::Resolution;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/flights/", post(create_flight))
        .route("/v1/flights/:id/data/binary", post(report_binary))
        .route("/v1/flights/:id/data", get(get_flight_data))
}

async fn load_flight(state: &AppState, id: Uuid) -> AppResult<Flight> {
    state
        .stores
        .flights
        .get(id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound(format!("flight {id}")))
}

#[derive(Debug, Deserialize)]
struct FlightRequest {
    #[serde(default)]
    id: Option<Uuid>,
    vessel_id: Uuid,
    name: String,
    measured_part_ids: Vec<Uuid>,
    measured_parts: HashMap<Uuid, Vec<MeasurementDescriptor>>,
    #[serde(default)]
    available_commands: HashMap<String, CommandInfo>,
    #[serde(default)]
    no_auth_permission: Option<Permission>,
}

async fn create_flight(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<FlightRequest>,
) -> AppResult<impl IntoResponse> {
    let ctx = resolve_required(&state.tokens, &headers)?;
    ctx.require_role("vessel")?;

    let vessel = state
        .stores
        .vessels
        .get(body.vessel_id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound(format!("vessel {}", body.vessel_id)))?;

    let now = Utc::now();
    let flight = Flight {
        id: body.id.unwrap_or_else(Uuid::new_v4),
        vessel_id: vessel.id,
        vessel_version: vessel.version,
        name: body.name,
        start: now,
        end: Some(now + crate::models::flight::DEFAULT_HEAD_TIME),
        measured_part_ids: body.measured_part_ids,
        measured_parts: body.measured_parts,
        available_commands: body.available_commands,
        permissions: crate::permissions::PermissionMap::new(),
        no_auth_permission: body.no_auth_permission.unwrap_or_default(),
    };

    state.stores.flights.upsert(&flight).await.map_err(AppError::Internal)?;
    state.audit.log_session_event("flight_created", Some(serde_json::json!({ "flight_id": flight.id }))).await;
    state.events.publish_flight_new(flight.clone());
    Ok(Json(flight))
}

/// Concatenated struct-shape codes for every descriptor of a part, in
/// series order — mirrors `get_struct_format_for_part`.
fn part_descriptor_shapes(descriptors: &[MeasurementDescriptor]) -> AppResult<Vec<Vec<u8>>> {
    descriptors
        .iter()
        .map(|d| match codec::shape_from_json(&d.shape) {
            Ok(Shape::Struct(codes)) => Ok(codes),
            Ok(_) => Err(AppError::InvalidInput(
                "bulk binary report only supports scalar measurement descriptors".to_string(),
            )),
            Err(e) => Err(AppError::InvalidInput(e.to_string())),
        })
        .collect()
}

async fn report_binary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(flight_id): Path<Uuid>,
    body: Bytes,
) -> AppResult<impl IntoResponse> {
    let ctx = resolve_required(&state.tokens, &headers)?;
    ctx.require_role("vessel")?;

    let mut flight = load_flight(&state, flight_id).await?;

    let now = Utc::now();
    if flight.touch(now) {
        state.stores.flights.upsert(&flight).await.map_err(AppError::Internal)?;
    }

    let mut per_series: HashMap<(u32, u32), Vec<(f64, codec::Value)>> = HashMap::new();
    let mut cursor = 0usize;

    while cursor < body.len() {
        if cursor + 3 > body.len() {
            return Err(AppError::InvalidInput("truncated block header".to_string()));
        }
        let part_index = body[cursor] as u32;
        let count = u16::from_be_bytes([body[cursor + 1], body[cursor + 2]]) as usize;
        cursor += 3;

        let part_id = flight
            .measured_part_ids
            .get(part_index as usize)
            .copied()
            .ok_or_else(|| AppError::InvalidInput(format!("unknown part index {part_index}")))?;
        let descriptors = flight
            .measured_parts
            .get(&part_id)
            .ok_or_else(|| AppError::InvalidInput(format!("part {part_id} is not a measured part of this flight")))?;
        let groups = part_descriptor_shapes(descriptors)?;
        let sample_size = 8 + codec::concatenated_size(&groups);

        for _ in 0..count {
            if cursor + sample_size > body.len() {
                return Err(AppError::InvalidInput("truncated measurement sample".to_string()));
            }
            let time = f64::from_be_bytes(body[cursor..cursor + 8].try_into().unwrap());
            let (values, consumed) = codec::decode_concatenated(&groups, &body[cursor + 8..])
                .map_err(|e| AppError::InvalidInput(e.to_string()))?;
            cursor += 8 + consumed;

            for (series_index, value) in values.into_iter().enumerate() {
                per_series
                    .entry((part_index, series_index as u32))
                    .or_default()
                    .push((time, value));
            }
        }
    }

    let mut records = Vec::with_capacity(per_series.len());
    for ((part_index, series_index), samples) in per_series {
        if samples.is_empty() {
            continue;
        }
        records.push(build_record(flight_id, part_index, series_index, samples));
    }

    state.stores.measurements.insert_many(&records).await.map_err(AppError::Internal)?;
    if !records.is_empty() {
        state
            .events
            .publish_new_measurement_compact(crate::events::MeasurementEvent::from_records(flight_id, &records));
    }

    Ok(axum::http::StatusCode::OK)
}

fn build_record(
    flight_id: Uuid,
    part_index: u32,
    series_index: u32,
    samples: Vec<(f64, codec::Value)>,
) -> MeasurementRecord {
    let min_time = samples.iter().map(|(t, _)| *t).fold(f64::INFINITY, f64::min);
    let max_time = samples.iter().map(|(t, _)| *t).fold(f64::NEG_INFINITY, f64::max);

    let numeric: Vec<f64> = samples.iter().filter_map(|(_, v)| codec::numeric_scalar(v)).collect();
    let (min, avg, max) = if numeric.len() == samples.len() && !numeric.is_empty() {
        let min = numeric.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = numeric.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let avg = numeric.iter().sum::<f64>() / numeric.len() as f64;
        (Some(min), Some(avg), Some(max))
    } else {
        (None, None, None)
    };

    let measurements = samples.into_iter().map(|(t, v)| (t, value_to_json(&v))).collect();

    MeasurementRecord {
        start_time: seconds_to_datetime(min_time),
        end_time: seconds_to_datetime(max_time),
        metadata: MeasurementMetadata {
            flight_id,
            part_index,
            series_index,
        },
        measurements,
        min,
        avg,
        max,
    }
}

fn seconds_to_datetime(seconds: f64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos((seconds * 1_000_000_000.0) as i64)
}

fn value_to_json(v: &codec::Value) -> serde_json::Value {
    use codec::Value;
    match v {
        Value::Int(n) => serde_json::json!(n),
        Value::UInt(n) => serde_json::json!(n),
        Value::Float(f) => serde_json::json!(f),
        Value::Bool(b) => serde_json::json!(b),
        Value::Str(s) => serde_json::json!(s),
        Value::Tuple(items) | Value::Array(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Record(fields) => {
            let map: serde_json::Map<String, serde_json::Value> =
                fields.iter().map(|(k, v)| (k.clone(), value_to_json(v))).collect();
            serde_json::Value::Object(map)
        }
    }
}

#[derive(Debug, Deserialize)]
struct DataQuery {
    vessel_part: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    #[serde(default)]
    resolution: Option<String>,
}

#[derive(serde::Serialize)]
#[serde(untagged)]
enum FlightDataResponse {
    Range(Vec<MeasurementRecord>),
    Aggregated(Vec<MeasurementAggregated>),
}

async fn get_flight_data(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(flight_id): Path<Uuid>,
    Query(query): Query<DataQuery>,
) -> AppResult<impl IntoResponse> {
    let flight = load_flight(&state, flight_id).await?;
    let vessel = state
        .stores
        .vessels
        .get(flight.vessel_id)
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound(format!("vessel {}", flight.vessel_id)))?;

    let user_id = optional_user(&state, &headers).map(|u| u.to_string());
    let eff = permissions::effective_flight_permission(
        &flight.permissions,
        flight.no_auth_permission,
        &vessel.permissions,
        vessel.no_auth_permission,
        user_id.as_deref(),
    );
    super::auth_routes::required_permission(eff, Permission::Read)?;

    if !flight.measured_parts.contains_key(&query.vessel_part) {
        return Ok(Json(FlightDataResponse::Range(Vec::new())));
    }

    // Find the part's index among `measuredPartIds` so part/series indices
    // line up with what ingestion (C8/C9) actually persisted.
    let Some(part_index) = flight.measured_part_ids.iter().position(|p| *p == query.vessel_part) else {
        return Ok(Json(FlightDataResponse::Range(Vec::new())));
    };
    let series_count = flight.measured_parts[&query.vessel_part].len();

    if let Some(resolution_str) = query.resolution {
        let resolution: Resolution = resolution_str
            .parse()
            .map_err(|_| AppError::InvalidInput(format!("unsupported resolution '{resolution_str}'")))?;
        let mut all = Vec::new();
        for series_index in 0..series_count {
            let rows = state
                .stores
                .measurements
                .get_aggregated(flight_id, part_index as u32, series_index as u32, query.start, query.end, resolution)
                .await
                .map_err(AppError::Internal)?;
            all.extend(rows);
        }
        Ok(Json(FlightDataResponse::Aggregated(all)))
    } else {
        let mut all = Vec::new();
        for series_index in 0..series_count {
            let rows = state
                .stores
                .measurements
                .get_range(flight_id, part_index as u32, series_index as u32, query.start, query.end)
                .await
                .map_err(AppError::Internal)?;
            all.extend(rows);
        }
        Ok(Json(FlightDataResponse::Range(all)))
    }
}
