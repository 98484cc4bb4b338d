//! Grounded on `app/models/vessel.py` and `app/models/vessel_part.py`.

use crate::permissions::{Permission, PermissionMap};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VesselPart {
    pub id: Uuid,
    pub name: String,
    pub part_type: String,
    #[serde(default)]
    pub virtual_part: bool,
    #[serde(default)]
    pub parent: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vessel {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub version: u64,
    pub name: String,
    #[serde(default)]
    pub parts: Vec<VesselPart>,
    #[serde(default)]
    pub permissions: PermissionMap,
    pub no_auth_permission: Permission,
}

impl Vessel {
    /// Field-by-field content comparison ignoring server-managed
    /// `version`, `name`, `permissions` (those are carried over from the
    /// prior record before comparison so a client cannot tamper with them).
    pub fn content_eq(&self, other: &Vessel) -> bool {
        self.id == other.id && self.parts == other.parts
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct VesselHistoricKey {
    pub vessel_id: Uuid,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VesselHistoric {
    #[serde(flatten)]
    pub key: VesselHistoricKey,
    pub snapshot: Vessel,
}
