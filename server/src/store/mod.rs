pub mod auth_code_store;
pub mod command_store;
pub mod flight_store;
pub mod measurement_store;
pub mod user_store;
pub mod vessel_store;

use crate::config::Settings;
use mongodb::{Client, Database};

/// Composition root for every storage component (C4-C7). One `mongodb`
/// connection is shared; each store owns its collection handles.
#[derive(Clone)]
pub struct Stores {
    pub vessels: vessel_store::VesselStore,
    pub flights: flight_store::FlightStore,
    pub measurements: measurement_store::MeasurementStore,
    pub commands: command_store::CommandStore,
    pub auth_codes: auth_code_store::AuthCodeStore,
    pub users: user_store::UserStore,
}

impl Stores {
    pub async fn connect(settings: &Settings) -> anyhow::Result<Self> {
        let client = Client::with_uri_str(&settings.mongo_connection_string).await?;
        let db: Database = client.database(&settings.mongo_database);

        let vessels = vessel_store::VesselStore::new(&db);
        let flights = flight_store::FlightStore::new(&db);
        let measurements = measurement_store::MeasurementStore::new(&db).await?;
        let commands = command_store::CommandStore::new(&db).await?;
        let auth_codes = auth_code_store::AuthCodeStore::new(&db);
        let users = user_store::UserStore::new(&db);

        Ok(Self {
            vessels,
            flights,
            measurements,
            commands,
            auth_codes,
            users,
        })
    }
}
