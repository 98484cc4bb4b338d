//! Permission resolver (C2). Grounded 1:1 on
//! `app/services/auth/permission_service.py`: a total order over
//! `none < view < read < write < owner`, vessel permission taken as
//! `max(noAuthPermission, map[user])`, flight permission OR-ed with the
//! vessel's own.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    #[default]
    None,
    View,
    Read,
    Write,
    Owner,
}

impl Permission {
    pub fn index(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Permission::None => "none",
            Permission::View => "view",
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Owner => "owner",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Permission {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Permission::None),
            "view" => Ok(Permission::View),
            "read" => Ok(Permission::Read),
            "write" => Ok(Permission::Write),
            "owner" => Ok(Permission::Owner),
            _ => Err(()),
        }
    }
}

pub type PermissionMap = HashMap<String, Permission>;

/// Effective permission of `user_id` (`None` = unauthenticated) on an entity
/// with the given permission map and `no_auth_permission` fallback.
pub fn effective_permission(
    map: &PermissionMap,
    no_auth_permission: Permission,
    user_id: Option<&str>,
) -> Permission {
    let user_perm = user_id
        .and_then(|id| map.get(id))
        .copied()
        .unwrap_or(Permission::None);
    no_auth_permission.max(user_perm)
}

/// A vessel grants `read`/`write`/etc on a flight either directly (the
/// flight's own map) or transitively via the vessel (OR semantics).
pub fn effective_flight_permission(
    flight_map: &PermissionMap,
    flight_no_auth: Permission,
    vessel_map: &PermissionMap,
    vessel_no_auth: Permission,
    user_id: Option<&str>,
) -> Permission {
    let on_flight = effective_permission(flight_map, flight_no_auth, user_id);
    let on_vessel = effective_permission(vessel_map, vessel_no_auth, user_id);
    on_flight.max(on_vessel)
}

pub fn has_permission(effective: Permission, required: Permission) -> bool {
    effective >= required
}

/// Ensure the map always has at least one `owner`. If the owner set over
/// `map ∪ {no_auth_permission=='owner'}` is empty, promote
/// `no_auth_permission` to `owner` (escape hatch against lock-out).
pub fn ensure_owner_exists(map: &PermissionMap, no_auth_permission: &mut Permission) {
    let has_owner = *no_auth_permission == Permission::Owner
        || map.values().any(|p| *p == Permission::Owner);
    if !has_owner {
        *no_auth_permission = Permission::Owner;
    }
}

/// Apply a permission modification: setting `none` removes the map entry
/// entirely, otherwise the entry is inserted/overwritten. The owner
/// invariant is re-checked afterward.
pub fn modify_permission(
    map: &mut PermissionMap,
    no_auth_permission: &mut Permission,
    user_id: &str,
    new_permission: Permission,
) {
    if new_permission == Permission::None {
        map.remove(user_id);
    } else {
        map.insert(user_id.to_string(), new_permission);
    }
    ensure_owner_exists(map, no_auth_permission);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_order_is_monotonic() {
        assert!(Permission::Owner > Permission::Write);
        assert!(Permission::Write > Permission::Read);
        assert!(Permission::Read > Permission::View);
        assert!(Permission::View > Permission::None);
    }

    #[test]
    fn absent_entry_defaults_to_none() {
        let map = PermissionMap::new();
        let eff = effective_permission(&map, Permission::None, Some("ada"));
        assert_eq!(eff, Permission::None);
    }

    #[test]
    fn no_auth_permission_is_a_floor_not_a_ceiling() {
        let mut map = PermissionMap::new();
        map.insert("ada".into(), Permission::View);
        let eff = effective_permission(&map, Permission::Read, Some("ada"));
        assert_eq!(eff, Permission::Read, "no_auth floor wins when higher than the user's own grant");
    }

    #[test]
    fn flight_permission_ors_with_vessel() {
        let flight_map = PermissionMap::new();
        let mut vessel_map = PermissionMap::new();
        vessel_map.insert("ada".into(), Permission::Write);
        let eff = effective_flight_permission(
            &flight_map,
            Permission::None,
            &vessel_map,
            Permission::None,
            Some("ada"),
        );
        assert_eq!(eff, Permission::Write);
    }

    #[test]
    fn setting_none_removes_entry_and_promotes_no_auth_if_last_owner() {
        let mut map = PermissionMap::new();
        map.insert("ada".into(), Permission::Owner);
        let mut no_auth = Permission::None;
        modify_permission(&mut map, &mut no_auth, "ada", Permission::None);
        assert!(!map.contains_key("ada"));
        assert_eq!(no_auth, Permission::Owner, "lock-out escape hatch must trigger");
    }

    #[test]
    fn monotonicity_denial_at_level_implies_denial_above() {
        let eff = Permission::Read;
        assert!(has_permission(eff, Permission::View));
        assert!(has_permission(eff, Permission::Read));
        assert!(!has_permission(eff, Permission::Write));
        assert!(!has_permission(eff, Permission::Owner));
    }
}
