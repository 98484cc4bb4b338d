//! Measurement store (C6). Grounded on
//! `app/services/data_access/flight_data.py` — a native time-series
//! collection (`timeField=_start_time`, `metaField=metadata`) with a
//! compound index on `(flightId DESC, partIndex ASC, seriesIndex ASC)`.

use crate::models::measurement::{MeasurementAggregated, MeasurementMetadata};
use crate::models::MeasurementRecord;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, DateTime as BsonDateTime, Document};
use mongodb::options::{IndexOptions, TimeseriesGranularity, TimeseriesOptions};
use mongodb::{Collection, Database, IndexModel};
use uuid::Uuid;

const MAX_RESULT_ROWS: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Decisecond,
    Second,
    Minute,
    Hour,
    Day,
    Month,
}

impl std::str::FromStr for Resolution {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "decisecond" => Ok(Resolution::Decisecond),
            "second" => Ok(Resolution::Second),
            "minute" => Ok(Resolution::Minute),
            "hour" => Ok(Resolution::Hour),
            "day" => Ok(Resolution::Day),
            "month" => Ok(Resolution::Month),
            _ => Err(()),
        }
    }
}

#[derive(Clone)]
pub struct MeasurementStore {
    collection: Collection<MeasurementRecord>,
}

impl MeasurementStore {
    pub async fn new(db: &Database) -> anyhow::Result<Self> {
        let names = db.list_collection_names().await.unwrap_or_default();
        if !names.iter().any(|n| n == "flight_data") {
            let ts_opts = TimeseriesOptions::builder()
                .time_field("_start_time".to_string())
                .meta_field(Some("metadata".to_string()))
                .granularity(Some(TimeseriesGranularity::Seconds))
                .build();
            db.create_collection("flight_data")
                .timeseries(ts_opts)
                .await?;
        }
        let collection: Collection<MeasurementRecord> = db.collection("flight_data");
        collection
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "metadata._flight_id": -1, "metadata.part_index": 1, "metadata.series_index": 1 })
                    .options(IndexOptions::builder().build())
                    .build(),
            )
            .await?;
        Ok(Self { collection })
    }

    pub async fn insert_many(&self, records: &[MeasurementRecord]) -> anyhow::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.collection.insert_many(records).await?;
        Ok(())
    }

    pub async fn get_range(
        &self,
        flight_id: Uuid,
        part_index: u32,
        series_index: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<MeasurementRecord>> {
        use futures::stream::TryStreamExt;
        let filter = doc! {
            "metadata._flight_id": flight_id.to_string(),
            "metadata.part_index": part_index as i64,
            "metadata.series_index": series_index as i64,
            "_start_time": { "$gte": BsonDateTime::from_chrono(start), "$lt": BsonDateTime::from_chrono(end) },
        };
        let cursor = self
            .collection
            .find(filter)
            .sort(doc! { "_start_time": 1 })
            .limit(MAX_RESULT_ROWS)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    /// Aggregated-rollup query (§4.6): `$match` the range, `$project` a
    /// date-part grouping key, `$group` with monoid aggregates.
    pub async fn get_aggregated(
        &self,
        flight_id: Uuid,
        part_index: u32,
        series_index: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        resolution: Resolution,
    ) -> anyhow::Result<Vec<MeasurementAggregated>> {
        use futures::stream::TryStreamExt;

        let match_stage = doc! {
            "$match": {
                "metadata._flight_id": flight_id.to_string(),
                "metadata.part_index": part_index as i64,
                "metadata.series_index": series_index as i64,
                "_start_time": { "$gte": BsonDateTime::from_chrono(start), "$lt": BsonDateTime::from_chrono(end) },
            }
        };
        let project_stage = project_stage(resolution);
        let group_stage = doc! {
            "$group": {
                "_id": "$group_key",
                "start_time": { "$min": "$_start_time" },
                "end_time": { "$max": "$_start_time" },
                "min": { "$min": "$min" },
                "avg": { "$avg": "$avg" },
                "max": { "$max": "$max" },
                "first": { "$first": { "$arrayElemAt": ["$measurements", 0] } },
                "last": { "$last": { "$arrayElemAt": ["$measurements", -1] } },
            }
        };
        let sort_stage = doc! { "$sort": { "start_time": 1 } };
        let limit_stage = doc! { "$limit": MAX_RESULT_ROWS };

        let pipeline = vec![match_stage, project_stage, group_stage, sort_stage, limit_stage];
        let cursor = self
            .collection
            .clone_with_type::<Document>()
            .aggregate(pipeline)
            .await?;
        let docs: Vec<Document> = cursor.try_collect().await?;
        docs.into_iter().map(document_to_aggregated).collect()
    }

    pub async fn bulk_delete_by_flight_ids(&self, flight_ids: &[Uuid]) -> anyhow::Result<()> {
        if flight_ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = flight_ids.iter().map(|id| id.to_string()).collect();
        self.collection
            .delete_many(doc! { "metadata._flight_id": { "$in": ids } })
            .await?;
        Ok(())
    }
}

fn project_stage(resolution: Resolution) -> Document {
    match resolution {
        // decisecond (=100ms) has no calendar-part analog: floor(ms/100).
        Resolution::Decisecond => doc! {
            "$project": {
                "_start_time": 1, "min": 1, "avg": 1, "max": 1, "measurements": 1,
                "group_key": { "$floor": { "$divide": [{ "$toLong": "$_start_time" }, 100] } },
            }
        },
        _ => {
            let parts = date_parts_at_or_coarser_than(resolution);
            // `$dateToParts` yields a single sub-document; retain only the
            // date parts at or coarser than the requested bucket.
            let date_parts_expr = doc! { "$dateToParts": { "date": "$_start_time" } };
            doc! {
                "$project": {
                    "_start_time": 1, "min": 1, "avg": 1, "max": 1, "measurements": 1,
                    "group_key": { "$arrayToObject": {
                        "$filter": {
                            "input": { "$objectToArray": date_parts_expr },
                            "as": "p",
                            "cond": { "$in": ["$$p.k", parts] },
                        }
                    }},
                }
            }
        }
    }
}

fn date_parts_at_or_coarser_than(resolution: Resolution) -> &'static [&'static str] {
    match resolution {
        Resolution::Decisecond => &["year", "month", "day", "hour", "minute", "second", "millisecond"],
        Resolution::Second => &["year", "month", "day", "hour", "minute", "second"],
        Resolution::Minute => &["year", "month", "day", "hour", "minute"],
        Resolution::Hour => &["year", "month", "day", "hour"],
        Resolution::Day => &["year", "month", "day"],
        Resolution::Month => &["year", "month"],
    }
}

fn document_to_aggregated(doc: Document) -> anyhow::Result<MeasurementAggregated> {
    let start_time = doc
        .get_datetime("start_time")
        .map(|d| d.to_chrono())
        .unwrap_or_else(|_| Utc::now());
    let end_time = doc.get_datetime("end_time").map(|d| d.to_chrono()).unwrap_or(start_time);
    Ok(MeasurementAggregated {
        start_time,
        end_time,
        min: doc.get_f64("min").ok(),
        avg: doc.get_f64("avg").ok(),
        max: doc.get_f64("max").ok(),
        first: doc.get("first").map(|b| bson_to_json(b)),
        last: doc.get("last").map(|b| bson_to_json(b)),
    })
}

fn bson_to_json(b: &mongodb::bson::Bson) -> serde_json::Value {
    serde_json::to_value(b).unwrap_or(serde_json::Value::Null)
}

pub fn metadata_key(flight_id: Uuid, part_index: u32, series_index: u32) -> MeasurementMetadata {
    MeasurementMetadata {
        flight_id,
        part_index,
        series_index,
    }
}
