//! Flight store (C5). Replace-by-id upsert; cascade delete helpers used by
//! `vessel_store::delete_cascade`.

use crate::models::Flight;
use chrono::{DateTime, Utc};
use mongodb::bson::doc;
use mongodb::{Collection, Database};
use uuid::Uuid;

#[derive(Clone)]
pub struct FlightStore {
    flights: Collection<Flight>,
}

impl FlightStore {
    pub fn new(db: &Database) -> Self {
        Self {
            flights: db.collection("flights"),
        }
    }

    pub async fn get(&self, id: Uuid) -> anyhow::Result<Option<Flight>> {
        Ok(self.flights.find_one(doc! { "_id": id.to_string() }).await?)
    }

    pub async fn upsert(&self, flight: &Flight) -> anyhow::Result<()> {
        self.flights
            .replace_one(doc! { "_id": flight.id.to_string() }, flight)
            .upsert(true)
            .await?;
        Ok(())
    }

    /// Extend `flight.end` per the single "touch flight" helper
    /// (`Flight::touch`) and persist if it changed.
    pub async fn touch_end(&self, id: Uuid, now: DateTime<Utc>) -> anyhow::Result<Option<Flight>> {
        let Some(mut flight) = self.get(id).await? else {
            return Ok(None);
        };
        if flight.touch(now) {
            self.flights
                .update_one(
                    doc! { "_id": id.to_string() },
                    doc! { "$set": { "end": flight.end.map(|e| e.to_rfc3339()) } },
                )
                .await?;
        }
        Ok(Some(flight))
    }

    pub async fn list_ids_for_vessel(&self, vessel_id: Uuid) -> anyhow::Result<Vec<Uuid>> {
        use futures::stream::TryStreamExt;
        let cursor = self
            .flights
            .clone_with_type::<mongodb::bson::Document>()
            .find(doc! { "vessel_id": vessel_id.to_string() })
            .projection(doc! { "_id": 1 })
            .await?;
        let docs: Vec<mongodb::bson::Document> = cursor.try_collect().await?;
        Ok(docs
            .into_iter()
            .filter_map(|d| d.get_str("_id").ok().and_then(|s| Uuid::parse_str(s).ok()))
            .collect())
    }

    pub async fn delete_by_vessel(&self, vessel_id: Uuid) -> anyhow::Result<()> {
        self.flights
            .delete_many(doc! { "vessel_id": vessel_id.to_string() })
            .await?;
        Ok(())
    }
}
