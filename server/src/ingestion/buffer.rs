//! Ingestion buffer (C8). Grounded on `app/mqtt/measurments.py`:
//! `flightId → partIndex → seriesIndex → queue<bytes>`, plus per-flight
//! `lastFlushTime`, swapped out atomically under a short-held lock every
//! `FLUSH_INTERVAL`.

use crate::codec::{self, Shape};
use crate::events::{EventBus, MeasurementEvent};
use crate::models::measurement::MeasurementMetadata;
use crate::models::{Flight, MeasurementRecord};
use crate::store::Stores;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;
use uuid::Uuid;

type SeriesQueues = HashMap<u32, Vec<Bytes>>;
type PartMap = HashMap<u32, SeriesQueues>;

struct FlightBuffer {
    parts: PartMap,
    last_flush: Instant,
}

#[derive(Clone)]
pub struct IngestionBuffer {
    flights: Arc<Mutex<HashMap<Uuid, FlightBuffer>>>,
    flush_interval: Duration,
}

impl IngestionBuffer {
    pub fn new(flush_interval: Duration) -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
            flush_interval,
        }
    }

    /// Appends to the queue and returns immediately. Returns the swapped-out
    /// submap when `FLUSH_INTERVAL` has elapsed since the last flush for
    /// this flight; `None` on every other call, including the very first
    /// offer (which only establishes `lastFlushTime`).
    pub fn offer(&self, flight_id: Uuid, part_index: u32, series_index: u32, payload: Bytes) -> Option<PartMap> {
        let mut flights = self.flights.lock().expect("ingestion buffer lock poisoned");

        if let std::collections::hash_map::Entry::Vacant(entry) = flights.entry(flight_id) {
            let mut parts = PartMap::new();
            parts.entry(part_index).or_default().entry(series_index).or_default().push(payload);
            entry.insert(FlightBuffer {
                parts,
                last_flush: Instant::now(),
            });
            return None;
        }

        let buffer = flights.get_mut(&flight_id).unwrap();
        buffer
            .parts
            .entry(part_index)
            .or_default()
            .entry(series_index)
            .or_default()
            .push(payload);

        if buffer.last_flush.elapsed() >= self.flush_interval {
            let swapped = std::mem::take(&mut buffer.parts);
            buffer.last_flush = Instant::now();
            Some(swapped)
        } else {
            None
        }
    }
}

/// The flush task: decode buffered bytes, compute aggregates, persist, and
/// publish `NEW_MEASUREMENT_COMPACT`.
pub async fn flush(
    stores: &Stores,
    events: &EventBus,
    flight_id: Uuid,
    parts: PartMap,
    min_head_time: chrono::Duration,
    default_head_time: chrono::Duration,
) {
    let Ok(Some(mut flight)) = stores.flights.get(flight_id).await else {
        warn!("ingestion flush: flight {flight_id} not found, dropping buffered measurements");
        return;
    };

    let now = Utc::now();
    if flight_needs_extension(&flight, now, min_head_time) {
        flight.end = Some(now + default_head_time);
        if let Err(e) = stores.flights.upsert(&flight).await {
            warn!("ingestion flush: failed to extend flight {flight_id}: {e:#}");
        }
    }

    let mut records = Vec::new();
    for (part_index, series_map) in parts {
        for (series_index, queue) in series_map {
            let Some(descriptor) = flight.descriptor_for(part_index as usize, series_index as usize) else {
                warn!("ingestion flush: no descriptor for part {part_index} series {series_index} on flight {flight_id}");
                continue;
            };
            let shape = match codec::shape_from_json(&descriptor.shape) {
                Ok(shape) => shape,
                Err(e) => {
                    warn!("ingestion flush: bad shape for part {part_index} series {series_index}: {e}");
                    continue;
                }
            };
            if let Some(record) = decode_bucket(flight_id, part_index, series_index, &shape, &queue) {
                records.push(record);
            }
        }
    }

    if records.is_empty() {
        return;
    }

    if let Err(e) = stores.measurements.insert_many(&records).await {
        warn!("ingestion flush: insert failed for flight {flight_id}: {e:#}");
        return;
    }

    events.publish_new_measurement_compact(MeasurementEvent::from_records(flight_id, &records));
}

fn flight_needs_extension(flight: &Flight, now: DateTime<Utc>, min_head_time: chrono::Duration) -> bool {
    match flight.end {
        Some(end) => end - now < min_head_time,
        None => true,
    }
}

fn decode_bucket(
    flight_id: Uuid,
    part_index: u32,
    series_index: u32,
    shape: &Shape,
    queue: &[Bytes],
) -> Option<MeasurementRecord> {
    let mut samples = Vec::with_capacity(queue.len());
    for bytes in queue {
        match codec::decode(shape, bytes) {
            Ok((time, value)) => samples.push((time, value)),
            Err(e) => warn!("ingestion flush: decode failed for part {part_index} series {series_index}: {e}"),
        }
    }
    if samples.is_empty() {
        return None;
    }

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

    Some(MeasurementRecord {
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
    })
}

fn seconds_to_datetime(seconds: f64) -> DateTime<Utc> {
    let nanos = (seconds * 1_000_000_000.0) as i64;
    DateTime::from_timestamp_nanos(nanos)
}

fn value_to_json(v: &codec::Value) -> serde_json::Value {
    use codec::Value;
    match v {
        Value::Int(n) => serde_json::json!(n),
        Value::UInt(n) => serde_json::json!(n),
        Value::Float(f) => serde_json::json!(f),
        Value::Bool(b) => serde_json::json!(b),
        Value::Str(s) => serde_json::json!(s),
        Value::Tuple(items) | Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(value_to_json).collect())
        }
        Value::Record(fields) => {
            let map: serde_json::Map<String, serde_json::Value> =
                fields.iter().map(|(k, v)| (k.clone(), value_to_json(v))).collect();
            serde_json::Value::Object(map)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_offer_never_flushes() {
        let buffer = IngestionBuffer::new(Duration::from_millis(500));
        let flight_id = Uuid::new_v4();
        let result = buffer.offer(flight_id, 0, 0, Bytes::from_static(b"abc"));
        assert!(result.is_none());
    }

    #[test]
    fn offer_flushes_only_after_interval_elapses() {
        let buffer = IngestionBuffer::new(Duration::from_millis(10));
        let flight_id = Uuid::new_v4();
        buffer.offer(flight_id, 0, 0, Bytes::from_static(b"a"));
        assert!(buffer.offer(flight_id, 0, 0, Bytes::from_static(b"b")).is_none());
        std::thread::sleep(Duration::from_millis(15));
        let swapped = buffer.offer(flight_id, 0, 0, Bytes::from_static(b"c"));
        assert!(swapped.is_some());
        let parts = swapped.unwrap();
        assert_eq!(parts[&0][&0].len(), 3, "swapped submap should hold every payload queued since the last flush");
    }
}
