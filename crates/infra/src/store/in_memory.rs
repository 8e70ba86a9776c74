use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use partflow_audit::{
    AuditEntry, AuditError, AuditFilter, AuditPage, AuditQuery, AuditSink, Pagination,
};
use partflow_core::{AuditEntryId, DomainError, LocationId, PartId, ReservationId, UserId};
use partflow_inventory::{admission, Location, Part, PartRef, StockMovement};
use partflow_reservations::{Reservation, ReservationStatus};

use super::r#trait::{Placement, ReservationFilter, Store, StoreError, StoreResult};

#[derive(Debug, Default)]
struct State {
    parts: HashMap<PartId, Part>,
    locations: HashMap<LocationId, Location>,
    reservations: HashMap<ReservationId, Reservation>,
    movements: Vec<StockMovement>,
    audit: Vec<AuditEntry>,
}

/// In-memory store for tests/dev.
///
/// Every primitive runs under one writer lock, so each check-and-write
/// section is serialized by construction. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::backend("lock poisoned"))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::backend("lock poisoned"))
    }
}

fn occupancy_of(state: &State, location_id: LocationId) -> u32 {
    state
        .parts
        .values()
        .filter(|p| p.location_id == Some(location_id) && !p.is_deleted())
        .count() as u32
}

fn require_live_part(state: &State, id: PartId) -> StoreResult<()> {
    match state.parts.get(&id) {
        Some(part) if !part.is_deleted() => Ok(()),
        _ => Err(DomainError::not_found("Part not found").into()),
    }
}

fn require_reservation_at(
    state: &State,
    id: ReservationId,
    expected_status: ReservationStatus,
) -> StoreResult<()> {
    let stored = state
        .reservations
        .get(&id)
        .ok_or_else(|| DomainError::not_found("Reservation not found"))?;
    if stored.status != expected_status {
        return Err(DomainError::conflict(format!(
            "Reservation status changed concurrently (expected {expected_status}, found {})",
            stored.status
        ))
        .into());
    }
    Ok(())
}

/// Apply a projection change, admission-checking placements first.
fn apply_placement(
    state: &mut State,
    part_id: PartId,
    placement: Placement,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    if let Placement::Place(location_id) = placement {
        let location = state
            .locations
            .get(&location_id)
            .ok_or_else(|| DomainError::not_found("Location not found"))?;
        let occupied = occupancy_of(state, location_id);
        admission::admit(location, occupied, 1)?;
    }

    let part = state
        .parts
        .get_mut(&part_id)
        .ok_or_else(|| DomainError::not_found("Part not found"))?;
    match placement {
        Placement::Place(location_id) => part.place_at(location_id, now),
        Placement::Vacate => part.vacate(now),
        Placement::Quarantine => part.quarantine(now),
    }
    Ok(())
}

#[async_trait]
impl Store for InMemoryStore {
    async fn fetch_part(&self, id: PartId) -> StoreResult<Option<Part>> {
        Ok(self.read()?.parts.get(&id).cloned())
    }

    async fn fetch_part_by_reference(&self, reference: &PartRef) -> StoreResult<Option<Part>> {
        let state = self.read()?;
        Ok(state
            .parts
            .values()
            .find(|p| &p.reference == reference)
            .cloned())
    }

    async fn fetch_location(&self, id: LocationId) -> StoreResult<Option<Location>> {
        Ok(self.read()?.locations.get(&id).cloned())
    }

    async fn location_occupancy(&self, id: LocationId) -> StoreResult<u32> {
        let state = self.read()?;
        Ok(occupancy_of(&state, id))
    }

    async fn fetch_reservation(&self, id: ReservationId) -> StoreResult<Option<Reservation>> {
        Ok(self.read()?.reservations.get(&id).cloned())
    }

    async fn list_reservations(&self, filter: &ReservationFilter) -> StoreResult<Vec<Reservation>> {
        let state = self.read()?;
        let mut matching: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }

    async fn part_movements(&self, part_id: PartId) -> StoreResult<Vec<StockMovement>> {
        let state = self.read()?;
        let mut movements: Vec<StockMovement> = state
            .movements
            .iter()
            .filter(|m| m.part_id == part_id)
            .cloned()
            .collect();
        movements.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(movements)
    }

    async fn recent_movements(&self, limit: u32) -> StoreResult<Vec<StockMovement>> {
        let state = self.read()?;
        let mut movements: Vec<StockMovement> = state.movements.iter().cloned().collect();
        movements.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        movements.truncate(limit as usize);
        Ok(movements)
    }

    async fn insert_part(&self, part: &Part) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.parts.values().any(|p| p.reference == part.reference) {
            return Err(DomainError::conflict("Part reference already exists").into());
        }
        state.parts.insert(part.id, part.clone());
        Ok(())
    }

    async fn insert_location(&self, location: &Location) -> StoreResult<()> {
        let mut state = self.write()?;
        if state
            .locations
            .values()
            .any(|l| l.full_code == location.full_code)
        {
            return Err(DomainError::conflict("Location fullCode already exists").into());
        }
        state.locations.insert(location.id, location.clone());
        Ok(())
    }

    async fn update_location_capacity(
        &self,
        id: LocationId,
        capacity: u32,
    ) -> StoreResult<Location> {
        let mut state = self.write()?;
        let location = state
            .locations
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Location not found"))?;
        location.set_capacity(capacity)?;
        Ok(location.clone())
    }

    async fn create_reservation(&self, reservation: &Reservation) -> StoreResult<Reservation> {
        let mut state = self.write()?;
        require_live_part(&state, reservation.part_id)?;
        let has_active = state
            .reservations
            .values()
            .any(|r| r.part_id == reservation.part_id && r.status.is_active());
        if has_active {
            return Err(DomainError::conflict("Part already has an active reservation").into());
        }
        if state.reservations.contains_key(&reservation.id) {
            return Err(DomainError::conflict("Reservation id already exists").into());
        }
        state.reservations.insert(reservation.id, reservation.clone());
        Ok(reservation.clone())
    }

    async fn claim_reservation(
        &self,
        id: ReservationId,
        assignee: UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<Reservation> {
        let mut state = self.write()?;
        let reservation = state
            .reservations
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Reservation not found"))?;
        reservation.assign(assignee, now)?;
        Ok(reservation.clone())
    }

    async fn update_reservation(
        &self,
        reservation: &Reservation,
        expected_status: ReservationStatus,
    ) -> StoreResult<()> {
        let mut state = self.write()?;
        require_reservation_at(&state, reservation.id, expected_status)?;
        state.reservations.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn update_reservation_with_movement(
        &self,
        reservation: &Reservation,
        expected_status: ReservationStatus,
        movement: &StockMovement,
        placement: Placement,
    ) -> StoreResult<StockMovement> {
        let mut state = self.write()?;
        require_reservation_at(&state, reservation.id, expected_status)?;
        require_live_part(&state, movement.part_id)?;
        apply_placement(&mut state, movement.part_id, placement, movement.recorded_at)?;
        state.movements.push(movement.clone());
        state.reservations.insert(reservation.id, reservation.clone());
        Ok(movement.clone())
    }

    async fn commit_movement(
        &self,
        movement: &StockMovement,
        placement: Placement,
    ) -> StoreResult<StockMovement> {
        let mut state = self.write()?;
        require_live_part(&state, movement.part_id)?;
        apply_placement(&mut state, movement.part_id, placement, movement.recorded_at)?;
        state.movements.push(movement.clone());
        Ok(movement.clone())
    }
}

#[async_trait]
impl AuditSink for InMemoryStore {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let mut state = self
            .state
            .write()
            .map_err(|_| AuditError::Sink("lock poisoned".to_string()))?;
        state.audit.push(entry);
        Ok(())
    }
}

#[async_trait]
impl AuditQuery for InMemoryStore {
    async fn query(&self, filter: &AuditFilter, page: Pagination) -> Result<AuditPage, AuditError> {
        let state = self
            .state
            .read()
            .map_err(|_| AuditError::Sink("lock poisoned".to_string()))?;

        let mut matching: Vec<AuditEntry> = state
            .audit
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));

        let total = matching.len() as u64;
        let entries: Vec<AuditEntry> = matching
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect();
        let has_more = total > u64::from(page.offset) + u64::from(page.limit);

        Ok(AuditPage {
            entries,
            total,
            pagination: page,
            has_more,
        })
    }

    async fn entry(&self, id: AuditEntryId) -> Result<Option<AuditEntry>, AuditError> {
        let state = self
            .state
            .read()
            .map_err(|_| AuditError::Sink("lock poisoned".to_string()))?;
        Ok(state.audit.iter().find(|e| e.id == id).cloned())
    }
}
