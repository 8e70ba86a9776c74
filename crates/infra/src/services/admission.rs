//! Location-capacity admission gate.
//!
//! This is the advisory check callers use to validate a target location and
//! produce early errors. The authoritative check runs again inside the store
//! transaction that actually places the part: two concurrent admissions can
//! both pass the gate here, but only one survives the store's locked
//! count-and-place.

use partflow_core::{DomainError, LocationId};
use partflow_inventory::{admission, CapacityReport, Location};

use crate::store::{Store, StoreResult};

/// Check that the location exists and has room for `required_slots` more
/// parts. Returns the location on success.
pub async fn admit<S: Store>(
    store: &S,
    location_id: LocationId,
    required_slots: u32,
) -> StoreResult<Location> {
    let location = store
        .fetch_location(location_id)
        .await?
        .ok_or_else(|| DomainError::not_found("Location not found"))?;
    let occupied = store.location_occupancy(location_id).await?;
    admission::admit(&location, occupied, required_slots)?;
    Ok(location)
}

/// Occupancy snapshot for dashboards and return-location pickers.
pub async fn capacity_report<S: Store>(
    store: &S,
    location_id: LocationId,
) -> StoreResult<CapacityReport> {
    let location = store
        .fetch_location(location_id)
        .await?
        .ok_or_else(|| DomainError::not_found("Location not found"))?;
    let occupied = store.location_occupancy(location_id).await?;
    Ok(CapacityReport::for_location(&location, occupied))
}
