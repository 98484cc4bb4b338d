//! Command store (C7). Grounded on `app/services/data_access/command.py` —
//! a plain (non-timeseries) collection indexed on create_time/command_type/
//! part_id/flight_id. Inserts never overwrite; updates upsert by id.

use crate::models::Command;
use chrono::{DateTime, Utc};
use mongodb::bson::doc;
use mongodb::{Collection, Database, IndexModel};
use uuid::Uuid;

const MAX_RESULT_ROWS: i64 = 1000;

#[derive(Clone)]
pub struct CommandStore {
    collection: Collection<Command>,
}

impl CommandStore {
    pub async fn new(db: &Database) -> anyhow::Result<Self> {
        let collection: Collection<Command> = db.collection("commands");
        collection
            .create_index(IndexModel::builder().keys(doc! { "create_time": 1 }).build())
            .await?;
        collection
            .create_index(IndexModel::builder().keys(doc! { "command_type": 1 }).build())
            .await?;
        collection
            .create_index(IndexModel::builder().keys(doc! { "part_id": 1 }).build())
            .await?;
        collection
            .create_index(IndexModel::builder().keys(doc! { "flight_id": 1 }).build())
            .await?;
        Ok(Self { collection })
    }

    pub async fn get(&self, id: Uuid) -> anyhow::Result<Option<Command>> {
        Ok(self.collection.find_one(doc! { "_id": id.to_string() }).await?)
    }

    /// Operator-originated dispatch: plain insert, never overwrites.
    pub async fn insert_many(&self, commands: &[Command]) -> anyhow::Result<()> {
        if commands.is_empty() {
            return Ok(());
        }
        self.collection.insert_many(commands).await?;
        Ok(())
    }

    /// Vessel-originated / confirmation: id-keyed replace-with-upsert.
    pub async fn insert_or_update_many(&self, commands: &[Command]) -> anyhow::Result<()> {
        for command in commands {
            self.collection
                .replace_one(doc! { "_id": command.id.to_string() }, command)
                .upsert(true)
                .await?;
        }
        Ok(())
    }

    pub async fn get_in_range(
        &self,
        flight_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        part_id: Option<Uuid>,
        command_type: Option<&str>,
    ) -> anyhow::Result<Vec<Command>> {
        use futures::stream::TryStreamExt;
        let mut filter = doc! {
            "flight_id": flight_id.to_string(),
            "create_time": { "$gte": start.to_rfc3339(), "$lt": end.to_rfc3339() },
        };
        if let Some(part_id) = part_id {
            filter.insert("part_id", part_id.to_string());
        }
        if let Some(command_type) = command_type {
            filter.insert("command_type", command_type);
        }
        let cursor = self
            .collection
            .find(filter)
            .sort(doc! { "create_time": 1 })
            .limit(MAX_RESULT_ROWS)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn bulk_delete_by_flight_ids(&self, flight_ids: &[Uuid]) -> anyhow::Result<()> {
        if flight_ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = flight_ids.iter().map(|id| id.to_string()).collect();
        self.collection
            .delete_many(doc! { "flight_id": { "$in": ids } })
            .await?;
        Ok(())
    }
}
