//! Capacity admission rule for placing parts into locations.
//!
//! The rule itself is pure; the storage layer is responsible for evaluating it
//! atomically with the placement (a bare count-then-write is a race, not an
//! implementation choice).

use serde::{Deserialize, Serialize};

use partflow_core::{DomainResult, DomainError, LocationId};

use crate::location::Location;

/// Decide whether `required_slots` more parts may occupy `location`.
///
/// `occupied` is the count of non-deleted parts currently at the location.
/// Occupancy above capacity can exist after an administrator lowers the
/// capacity; that overflow is tolerated, but any further admission fails.
pub fn admit(location: &Location, occupied: u32, required_slots: u32) -> DomainResult<()> {
    if occupied.saturating_add(required_slots) > location.capacity {
        return Err(DomainError::conflict(format!(
            "Location {} is full ({}/{})",
            location.full_code, occupied, location.capacity
        )));
    }
    Ok(())
}

/// Occupancy snapshot for a location, for capacity dashboards and pickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityReport {
    pub location_id: LocationId,
    pub full_code: String,
    pub capacity: u32,
    pub occupied: u32,
    pub free_slots: u32,
    pub has_space: bool,
}

impl CapacityReport {
    pub fn for_location(location: &Location, occupied: u32) -> Self {
        let free_slots = location.capacity.saturating_sub(occupied);
        Self {
            location_id: location.id,
            full_code: location.full_code.to_string(),
            capacity: location.capacity,
            occupied,
            free_slots,
            has_space: occupied < location.capacity,
        }
    }
}
