//! Vessel store (C4). Grounded on `app/services/data_access/vessel.py`.

use crate::models::{Vessel, VesselHistoric, VesselHistoricKey};
use mongodb::bson::doc;
use mongodb::{Collection, Database};
use uuid::Uuid;

#[derive(Clone)]
pub struct VesselStore {
    vessels: Collection<Vessel>,
    historic: Collection<VesselHistoric>,
}

impl VesselStore {
    pub fn new(db: &Database) -> Self {
        Self {
            vessels: db.collection("vessels"),
            historic: db.collection("vessel_historic"),
        }
    }

    pub async fn get(&self, id: Uuid) -> anyhow::Result<Option<Vessel>> {
        Ok(self.vessels.find_one(doc! { "_id": id.to_string() }).await?)
    }

    pub async fn list_all(&self) -> anyhow::Result<Vec<Vessel>> {
        use futures::stream::TryStreamExt;
        let cursor = self.vessels.find(doc! {}).await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn get_historic(&self, id: Uuid, version: u64) -> anyhow::Result<Option<Vessel>> {
        let found = self
            .historic
            .find_one(doc! { "vessel_id": id.to_string(), "version": version as i64 })
            .await?;
        Ok(found.map(|h| h.snapshot))
    }

    pub async fn list_versions(&self, id: Uuid) -> anyhow::Result<Vec<u64>> {
        use futures::stream::TryStreamExt;
        let cursor = self.historic.find(doc! { "vessel_id": id.to_string() }).await?;
        let docs: Vec<VesselHistoric> = cursor.try_collect().await?;
        Ok(docs.into_iter().map(|h| h.key.version).collect())
    }

    pub async fn delete_version(&self, id: Uuid, version: u64) -> anyhow::Result<bool> {
        let result = self
            .historic
            .delete_one(doc! { "vessel_id": id.to_string(), "version": version as i64 })
            .await?;
        Ok(result.deleted_count > 0)
    }

    /// Optimistic-versioning upsert (§4.4): reads the prior record, carries
    /// over server-managed fields, appends a historic snapshot and bumps
    /// `version` only if content differs.
    pub async fn upsert(&self, mut incoming: Vessel) -> anyhow::Result<Vessel> {
        let prior = self.get(incoming.id).await?;

        match prior {
            None => {
                incoming.version = 1;
                self.vessels
                    .replace_one(doc! { "_id": incoming.id.to_string() }, &incoming)
                    .upsert(true)
                    .await?;
                Ok(incoming)
            }
            Some(prior) => {
                // Server-managed fields are carried over before comparison
                // so a client cannot tamper with them through re-submission.
                incoming.version = prior.version;
                incoming.name = prior.name.clone();
                incoming.permissions = prior.permissions.clone();

                if incoming.content_eq(&prior) {
                    return Ok(prior);
                }

                let snapshot = VesselHistoric {
                    key: VesselHistoricKey {
                        vessel_id: prior.id,
                        version: prior.version,
                    },
                    snapshot: prior,
                };
                self.historic.insert_one(&snapshot).await?;

                incoming.version = snapshot.key.version + 1;
                self.vessels
                    .replace_one(doc! { "_id": incoming.id.to_string() }, &incoming)
                    .upsert(true)
                    .await?;
                Ok(incoming)
            }
        }
    }

    /// Rename does not bump `version` (§6 REST table).
    pub async fn rename(&self, id: Uuid, name: String) -> anyhow::Result<Option<Vessel>> {
        self.vessels
            .update_one(doc! { "_id": id.to_string() }, doc! { "$set": { "name": &name } })
            .await?;
        self.get(id).await
    }

    pub async fn update_permissions(&self, vessel: &Vessel) -> anyhow::Result<()> {
        self.vessels
            .replace_one(doc! { "_id": vessel.id.to_string() }, vessel)
            .await?;
        Ok(())
    }

    /// Cascading delete: historic snapshots, flights, flight measurements,
    /// and flight commands all delete concurrently; the caller observes
    /// success only when the vessel row itself is removed.
    pub async fn delete_cascade(
        &self,
        id: Uuid,
        flight_store: &super::flight_store::FlightStore,
        measurement_store: &super::measurement_store::MeasurementStore,
        command_store: &super::command_store::CommandStore,
    ) -> anyhow::Result<bool> {
        let flight_ids = flight_store.list_ids_for_vessel(id).await?;

        let delete_historic = self.historic.delete_many(doc! { "vessel_id": id.to_string() });
        let delete_flights = flight_store.delete_by_vessel(id);

        if flight_ids.is_empty() {
            let (historic_res, flights_res) = tokio::join!(delete_historic, delete_flights);
            historic_res?;
            flights_res?;
        } else {
            let delete_measurements = measurement_store.bulk_delete_by_flight_ids(&flight_ids);
            let delete_commands = command_store.bulk_delete_by_flight_ids(&flight_ids);
            let (historic_res, flights_res, measurements_res, commands_res) =
                tokio::join!(delete_historic, delete_flights, delete_measurements, delete_commands);
            historic_res?;
            flights_res?;
            measurements_res?;
            commands_res?;
        }

        let result = self.vessels.delete_one(doc! { "_id": id.to_string() }).await?;
        Ok(result.deleted_count > 0)
    }
}
