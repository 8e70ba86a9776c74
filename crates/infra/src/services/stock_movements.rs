//! Stock-movement ledger orchestration.
//!
//! Every operation appends one immutable ledger row and updates the part's
//! current-location projection in one store transaction. The ledger is the
//! source of truth; the projection is derived from it. Placements run through
//! the admission gate first for early errors, and the store re-checks
//! capacity under its row lock when committing.

use chrono::Utc;
use serde_json::json;
use tracing::instrument;

use partflow_audit::{AuditAction, AuditEntityKind, AuditEntry, AuditSink};
use partflow_core::{DomainError, LocationId, PartId, UserId};
use partflow_inventory::{Part, StockMovement};

use crate::services::admission;
use crate::store::{Placement, Store, StoreResult};

/// Arguments for [`StockMovementService::record_return`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnParams {
    pub part_id: PartId,
    pub actor: UserId,
    /// Required when the part is not damaged.
    pub to_location_id: Option<LocationId>,
    pub is_damaged: bool,
}

/// Stock-movement ledger service.
#[derive(Debug)]
pub struct StockMovementService<S, A> {
    store: S,
    audit: A,
}

impl<S, A> StockMovementService<S, A> {
    pub fn new(store: S, audit: A) -> Self {
        Self { store, audit }
    }
}

impl<S, A> StockMovementService<S, A>
where
    S: Store,
    A: AuditSink,
{
    /// Part enters the warehouse at `location_id`.
    #[instrument(skip(self), fields(part_id = %part_id, location_id = %location_id), err)]
    pub async fn record_entry(
        &self,
        part_id: PartId,
        actor: UserId,
        location_id: LocationId,
    ) -> StoreResult<StockMovement> {
        self.live_part(part_id).await?;
        admission::admit(&self.store, location_id, 1).await?;

        let movement = StockMovement::entry(part_id, actor, location_id, Utc::now());
        let stored = self
            .store
            .commit_movement(&movement, Placement::Place(location_id))
            .await?;

        self.record_audit(actor, AuditAction::StockEntry, &stored).await;
        Ok(stored)
    }

    /// Part leaves the warehouse. Vacating needs no admission check.
    #[instrument(skip(self), fields(part_id = %part_id), err)]
    pub async fn record_exit(&self, part_id: PartId, actor: UserId) -> StoreResult<StockMovement> {
        let part = self.live_part(part_id).await?;

        let movement = StockMovement::exit(part_id, actor, part.location_id, Utc::now());
        let stored = self
            .store
            .commit_movement(&movement, Placement::Vacate)
            .await?;

        self.record_audit(actor, AuditAction::StockExit, &stored).await;
        Ok(stored)
    }

    /// Move a part between two locations.
    #[instrument(skip(self), fields(part_id = %part_id, from = %from, to = %to), err)]
    pub async fn record_transfer(
        &self,
        part_id: PartId,
        actor: UserId,
        from: LocationId,
        to: LocationId,
    ) -> StoreResult<StockMovement> {
        let part = self.live_part(part_id).await?;
        if part.location_id != Some(from) {
            return Err(
                DomainError::bad_request("Part is not at the specified source location").into(),
            );
        }
        admission::admit(&self.store, to, 1).await?;

        let movement = StockMovement::transfer(part_id, actor, from, to, Utc::now());
        let stored = self
            .store
            .commit_movement(&movement, Placement::Place(to))
            .await?;

        self.record_audit(actor, AuditAction::StockTransfer, &stored).await;
        Ok(stored)
    }

    /// Part comes back after a cancelled delivery.
    ///
    /// Damaged parts are quarantined (no location, hidden) and skip
    /// admission; undamaged returns need a target location with room.
    #[instrument(skip(self, params), fields(part_id = %params.part_id, damaged = params.is_damaged), err)]
    pub async fn record_return(&self, params: ReturnParams) -> StoreResult<StockMovement> {
        let ReturnParams {
            part_id,
            actor,
            to_location_id,
            is_damaged,
        } = params;

        self.live_part(part_id).await?;

        let (movement, placement) = if is_damaged {
            (
                StockMovement::part_return(part_id, actor, None, Utc::now()),
                Placement::Quarantine,
            )
        } else {
            let Some(to) = to_location_id else {
                return Err(
                    DomainError::bad_request("returnLocationId is required for RETURN").into(),
                );
            };
            admission::admit(&self.store, to, 1).await?;
            (
                StockMovement::part_return(part_id, actor, Some(to), Utc::now()),
                Placement::Place(to),
            )
        };

        let stored = self.store.commit_movement(&movement, placement).await?;

        self.record_audit(actor, AuditAction::StockReturn, &stored).await;
        Ok(stored)
    }

    /// Administrative correction of a part's current location.
    #[instrument(skip(self), fields(part_id = %part_id), err)]
    pub async fn record_adjustment(
        &self,
        part_id: PartId,
        actor: UserId,
        new_location_id: Option<LocationId>,
    ) -> StoreResult<StockMovement> {
        let part = self.live_part(part_id).await?;

        let placement = match new_location_id {
            Some(to) => {
                admission::admit(&self.store, to, 1).await?;
                Placement::Place(to)
            }
            None => Placement::Vacate,
        };
        let movement = StockMovement::adjustment(
            part_id,
            actor,
            part.location_id,
            new_location_id,
            Utc::now(),
        );
        let stored = self.store.commit_movement(&movement, placement).await?;

        self.record_audit(actor, AuditAction::StockAdjustment, &stored).await;
        Ok(stored)
    }

    /// Full movement history of a part, newest first.
    pub async fn part_history(&self, part_id: PartId) -> StoreResult<Vec<StockMovement>> {
        self.store.part_movements(part_id).await
    }

    /// Most recent movements across all parts (dashboard feed).
    pub async fn recent(&self, limit: u32) -> StoreResult<Vec<StockMovement>> {
        self.store.recent_movements(limit).await
    }

    async fn live_part(&self, part_id: PartId) -> StoreResult<Part> {
        self.store
            .fetch_part(part_id)
            .await?
            .filter(|p| !p.is_deleted())
            .ok_or_else(|| DomainError::not_found("Part not found").into())
    }

    /// Best-effort trail write, issued after the primary mutation committed.
    async fn record_audit(&self, actor: UserId, action: AuditAction, movement: &StockMovement) {
        let entry = AuditEntry::new(
            actor,
            action,
            AuditEntityKind::Part,
            movement.part_id.to_string(),
            json!({
                "movementId": movement.id,
                "type": movement.movement_type,
                "sourceLocationId": movement.source,
                "destinationLocationId": movement.destination,
            }),
            Utc::now(),
        );
        if let Err(err) = self.audit.record(entry).await {
            tracing::warn!(%action, part_id = %movement.part_id, error = %err, "audit write failed, trail entry dropped");
        }
    }
}
