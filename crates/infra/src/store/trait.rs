use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use partflow_core::{DomainError, LocationId, PartId, ReservationId, UserId};
use partflow_inventory::{Location, Part, PartRef, StockMovement};
use partflow_reservations::{Reservation, ReservationStatus};

/// Storage operation error.
///
/// Domain failures (the four-way taxonomy) pass through unchanged; everything
/// the backend itself breaks on (pool closed, lock poisoned, SQL errors)
/// becomes `Backend`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// The domain error, if this is one.
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            Self::Domain(err) => Some(err),
            Self::Backend(_) => None,
        }
    }
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Filter for listing reservations. Unset fields match everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReservationFilter {
    pub status: Option<ReservationStatus>,
    pub user_id: Option<UserId>,
    pub assigned_to_id: Option<UserId>,
}

impl ReservationFilter {
    pub fn matches(&self, reservation: &Reservation) -> bool {
        if let Some(status) = self.status {
            if reservation.status != status {
                return false;
            }
        }
        if let Some(user_id) = self.user_id {
            if reservation.user_id != user_id {
                return false;
            }
        }
        if let Some(assigned_to_id) = self.assigned_to_id {
            if reservation.assigned_to_id != Some(assigned_to_id) {
                return false;
            }
        }
        true
    }
}

/// Change to a part's current-location projection, applied in the same
/// transaction as the ledger append it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Put the part at a location. Capacity is checked by the store inside
    /// the transaction (count + write under a location lock), never by a
    /// separate read.
    Place(LocationId),
    /// Clear the current location (part leaves the warehouse).
    Vacate,
    /// Damaged return: condition Damaged, hidden, no location. Skips
    /// admission entirely.
    Quarantine,
}

/// Relational store backing the warehouse core.
///
/// Every method is one atomic unit: it either fully commits or fully fails.
/// The check-and-write primitives (`create_reservation`, `claim_reservation`,
/// the commit methods) are where cross-entity invariants are enforced: the
/// single active reservation per part and the location capacity bound. An
/// implementation must serialize those checks with their writes (row locks or
/// a compare-and-set), because a plain read followed by a later write is a
/// race.
#[async_trait]
pub trait Store: Send + Sync {
    // -- lookups -----------------------------------------------------------

    async fn fetch_part(&self, id: PartId) -> StoreResult<Option<Part>>;

    /// Lookup by the unique business reference printed on the label.
    async fn fetch_part_by_reference(&self, reference: &PartRef) -> StoreResult<Option<Part>>;

    async fn fetch_location(&self, id: LocationId) -> StoreResult<Option<Location>>;

    /// Count of non-deleted parts currently at the location.
    async fn location_occupancy(&self, id: LocationId) -> StoreResult<u32>;

    async fn fetch_reservation(&self, id: ReservationId) -> StoreResult<Option<Reservation>>;

    /// Reservations matching `filter`, newest first.
    async fn list_reservations(&self, filter: &ReservationFilter) -> StoreResult<Vec<Reservation>>;

    /// Full movement history of a part, newest first.
    async fn part_movements(&self, part_id: PartId) -> StoreResult<Vec<StockMovement>>;

    /// Most recent movements across all parts (dashboard feed).
    async fn recent_movements(&self, limit: u32) -> StoreResult<Vec<StockMovement>>;

    // -- seeding / administrative writes -----------------------------------

    /// Insert a part. The business reference is unique (Conflict on reuse).
    /// The part is stored as given; placing it into a location goes through
    /// the ledger.
    async fn insert_part(&self, part: &Part) -> StoreResult<()>;

    /// Insert a location. The full code is unique (Conflict on reuse).
    async fn insert_location(&self, location: &Location) -> StoreResult<()>;

    /// Change a location's capacity. Lowering below the current occupancy is
    /// allowed: the overflow is tolerated and only future admissions are
    /// blocked.
    async fn update_location_capacity(
        &self,
        id: LocationId,
        capacity: u32,
    ) -> StoreResult<Location>;

    // -- transactional check-and-write primitives --------------------------

    /// Insert a PENDING reservation, verifying in the same transaction that
    /// the part exists (and is not soft-deleted) and carries no active
    /// reservation.
    async fn create_reservation(&self, reservation: &Reservation) -> StoreResult<Reservation>;

    /// Atomic first-writer-wins claim: PENDING + unassigned moves to
    /// IN_PREPARATION with the assignee set. Concurrent claims see exactly
    /// one winner.
    async fn claim_reservation(
        &self,
        id: ReservationId,
        assignee: UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<Reservation>;

    /// Persist an updated reservation. Fails Conflict when the stored row is
    /// no longer at `expected_status` (someone else moved it first).
    async fn update_reservation(
        &self,
        reservation: &Reservation,
        expected_status: ReservationStatus,
    ) -> StoreResult<()>;

    /// `update_reservation` plus `commit_movement` in ONE transaction, for
    /// transitions whose ledger write must not be separable from the status
    /// change (completion, post-delivery returns).
    async fn update_reservation_with_movement(
        &self,
        reservation: &Reservation,
        expected_status: ReservationStatus,
        movement: &StockMovement,
        placement: Placement,
    ) -> StoreResult<StockMovement>;

    /// Append one immutable ledger row and apply the projection change to the
    /// part atomically, enforcing admission when placing.
    async fn commit_movement(
        &self,
        movement: &StockMovement,
        placement: Placement,
    ) -> StoreResult<StockMovement>;
}

#[async_trait]
impl<S> Store for Arc<S>
where
    S: Store + ?Sized,
{
    async fn fetch_part(&self, id: PartId) -> StoreResult<Option<Part>> {
        (**self).fetch_part(id).await
    }

    async fn fetch_part_by_reference(&self, reference: &PartRef) -> StoreResult<Option<Part>> {
        (**self).fetch_part_by_reference(reference).await
    }

    async fn fetch_location(&self, id: LocationId) -> StoreResult<Option<Location>> {
        (**self).fetch_location(id).await
    }

    async fn location_occupancy(&self, id: LocationId) -> StoreResult<u32> {
        (**self).location_occupancy(id).await
    }

    async fn fetch_reservation(&self, id: ReservationId) -> StoreResult<Option<Reservation>> {
        (**self).fetch_reservation(id).await
    }

    async fn list_reservations(&self, filter: &ReservationFilter) -> StoreResult<Vec<Reservation>> {
        (**self).list_reservations(filter).await
    }

    async fn part_movements(&self, part_id: PartId) -> StoreResult<Vec<StockMovement>> {
        (**self).part_movements(part_id).await
    }

    async fn recent_movements(&self, limit: u32) -> StoreResult<Vec<StockMovement>> {
        (**self).recent_movements(limit).await
    }

    async fn insert_part(&self, part: &Part) -> StoreResult<()> {
        (**self).insert_part(part).await
    }

    async fn insert_location(&self, location: &Location) -> StoreResult<()> {
        (**self).insert_location(location).await
    }

    async fn update_location_capacity(
        &self,
        id: LocationId,
        capacity: u32,
    ) -> StoreResult<Location> {
        (**self).update_location_capacity(id, capacity).await
    }

    async fn create_reservation(&self, reservation: &Reservation) -> StoreResult<Reservation> {
        (**self).create_reservation(reservation).await
    }

    async fn claim_reservation(
        &self,
        id: ReservationId,
        assignee: UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<Reservation> {
        (**self).claim_reservation(id, assignee, now).await
    }

    async fn update_reservation(
        &self,
        reservation: &Reservation,
        expected_status: ReservationStatus,
    ) -> StoreResult<()> {
        (**self).update_reservation(reservation, expected_status).await
    }

    async fn update_reservation_with_movement(
        &self,
        reservation: &Reservation,
        expected_status: ReservationStatus,
        movement: &StockMovement,
        placement: Placement,
    ) -> StoreResult<StockMovement> {
        (**self)
            .update_reservation_with_movement(reservation, expected_status, movement, placement)
            .await
    }

    async fn commit_movement(
        &self,
        movement: &StockMovement,
        placement: Placement,
    ) -> StoreResult<StockMovement> {
        (**self).commit_movement(movement, placement).await
    }
}
