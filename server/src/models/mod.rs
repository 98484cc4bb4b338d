pub mod command;
pub mod flight;
pub mod measurement;
pub mod user;
pub mod vessel;

pub use command::{Command, CommandInfo, CommandState};
pub use flight::{Flight, VesselPart, DEFAULT_HEAD_TIME, MINIMUM_HEAD_TIME};
pub use measurement::{MeasurementDescriptor, MeasurementRecord};
pub use user::User;
pub use vessel::{Vessel, VesselHistoric, VesselHistoricKey};
