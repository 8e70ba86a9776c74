//! Reservation lifecycle orchestration.
//!
//! The service runs the pipeline: load the reservation, let the domain decide
//! (transition table, reason legality, assignee authorization), commit the
//! change through one store primitive, then record an audit entry. When a
//! decision carries a ledger effect, the reservation update and the movement
//! are committed in the SAME transaction, so a reservation can never say
//! COMPLETED without its EXIT row.

use chrono::Utc;
use serde_json::json;
use tracing::instrument;

use partflow_audit::{AuditAction, AuditEntityKind, AuditEntry, AuditSink};
use partflow_core::{DomainError, LocationId, PartId, ReservationId, UserId};
use partflow_inventory::{Part, StockMovement};
use partflow_reservations::{CancelReason, LedgerEffect, Reservation, ReservationStatus};

use crate::store::{Placement, ReservationFilter, Store, StoreResult};

/// Reservation lifecycle service.
///
/// Generic over the store and the audit sink so tests can run fully in
/// memory and production can point both at Postgres.
#[derive(Debug)]
pub struct ReservationService<S, A> {
    store: S,
    audit: A,
}

impl<S, A> ReservationService<S, A> {
    pub fn new(store: S, audit: A) -> Self {
        Self { store, audit }
    }
}

impl<S, A> ReservationService<S, A>
where
    S: Store,
    A: AuditSink,
{
    /// Create a reservation in PENDING for `part_id`.
    #[instrument(skip(self, notes), fields(user_id = %user_id, part_id = %part_id), err)]
    pub async fn create(
        &self,
        user_id: UserId,
        part_id: PartId,
        notes: Option<String>,
    ) -> StoreResult<Reservation> {
        let reservation = Reservation::create(
            ReservationId::new(),
            user_id,
            part_id,
            notes,
            Utc::now(),
        );
        let stored = self.store.create_reservation(&reservation).await?;

        self.record_audit(
            user_id,
            AuditAction::ReservationCreate,
            stored.id,
            json!({
                "partId": stored.part_id,
                "status": stored.status,
                "notes": stored.notes,
            }),
        )
        .await;

        Ok(stored)
    }

    pub async fn get(&self, id: ReservationId) -> StoreResult<Reservation> {
        self.store
            .fetch_reservation(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Reservation not found").into())
    }

    /// Reservations matching `filter`, newest first.
    pub async fn list(&self, filter: &ReservationFilter) -> StoreResult<Vec<Reservation>> {
        self.store.list_reservations(filter).await
    }

    /// Unclaimed work for the warehouse floor.
    pub async fn pending(&self) -> StoreResult<Vec<Reservation>> {
        self.list(&ReservationFilter {
            status: Some(ReservationStatus::Pending),
            ..Default::default()
        })
        .await
    }

    /// Open reservations claimed by `user_id` (in preparation or ready).
    pub async fn assigned_to(&self, user_id: UserId) -> StoreResult<Vec<Reservation>> {
        let mut reservations = self
            .list(&ReservationFilter {
                assigned_to_id: Some(user_id),
                ..Default::default()
            })
            .await?;
        reservations.retain(|r| {
            matches!(
                r.status,
                ReservationStatus::InPreparation | ReservationStatus::ReadyToShip
            )
        });
        Ok(reservations)
    }

    /// Claim a PENDING reservation; first writer wins.
    #[instrument(skip(self), fields(reservation_id = %id, assignee = %assignee), err)]
    pub async fn assign(&self, id: ReservationId, assignee: UserId) -> StoreResult<Reservation> {
        let updated = self.store.claim_reservation(id, assignee, Utc::now()).await?;

        self.record_audit(
            assignee,
            AuditAction::ReservationAssign,
            updated.id,
            json!({
                "previousStatus": ReservationStatus::Pending,
                "newStatus": updated.status,
                "assignedToId": assignee,
            }),
        )
        .await;

        Ok(updated)
    }

    /// Advance the reservation along the transition table.
    ///
    /// A transition into COMPLETED records the EXIT movement in the same
    /// store transaction as the status change.
    #[instrument(
        skip(self),
        fields(reservation_id = %id, new_status = %new_status, actor = %actor),
        err
    )]
    pub async fn update_status(
        &self,
        id: ReservationId,
        new_status: ReservationStatus,
        actor: UserId,
    ) -> StoreResult<Reservation> {
        let mut updated = self.get(id).await?;
        let previous = updated.status;
        let effect = updated.transition(new_status, actor, Utc::now())?;

        self.commit(&updated, previous, actor, effect).await?;

        self.record_audit(
            actor,
            AuditAction::ReservationStatus,
            updated.id,
            json!({
                "previousStatus": previous,
                "newStatus": updated.status,
                "partId": updated.part_id,
            }),
        )
        .await;

        Ok(updated)
    }

    /// Cancel with a reason; post-delivery cancellations bring the part back
    /// (or quarantine it) through the ledger, in the same transaction.
    #[instrument(
        skip(self),
        fields(reservation_id = %id, actor = %actor, reason = %reason),
        err
    )]
    pub async fn cancel(
        &self,
        id: ReservationId,
        actor: UserId,
        reason: CancelReason,
        return_location_id: Option<LocationId>,
    ) -> StoreResult<Reservation> {
        let mut updated = self.get(id).await?;
        let previous = updated.status;
        let was_completed = previous == ReservationStatus::Completed;
        let effect = updated.cancel(reason, return_location_id, Utc::now())?;

        self.commit(&updated, previous, actor, effect).await?;

        self.record_audit(
            actor,
            AuditAction::ReservationCancel,
            updated.id,
            json!({
                "cancelReason": reason,
                "wasCompleted": was_completed,
                "partId": updated.part_id,
                "returnLocationId": updated.return_location_id,
            }),
        )
        .await;

        Ok(updated)
    }

    /// Persist a decided state change, coupling the ledger write when the
    /// decision carries one.
    async fn commit(
        &self,
        updated: &Reservation,
        previous: ReservationStatus,
        actor: UserId,
        effect: LedgerEffect,
    ) -> StoreResult<()> {
        let ledger = match effect {
            LedgerEffect::None => None,
            LedgerEffect::Exit => {
                let part = self.live_part(updated.part_id).await?;
                Some((
                    StockMovement::exit(part.id, actor, part.location_id, updated.updated_at),
                    Placement::Vacate,
                ))
            }
            LedgerEffect::Restock(to) => Some((
                StockMovement::part_return(updated.part_id, actor, Some(to), updated.updated_at),
                Placement::Place(to),
            )),
            LedgerEffect::Quarantine => Some((
                StockMovement::part_return(updated.part_id, actor, None, updated.updated_at),
                Placement::Quarantine,
            )),
        };

        match ledger {
            None => self.store.update_reservation(updated, previous).await,
            Some((movement, placement)) => {
                self.store
                    .update_reservation_with_movement(updated, previous, &movement, placement)
                    .await?;
                Ok(())
            }
        }
    }

    async fn live_part(&self, part_id: PartId) -> StoreResult<Part> {
        self.store
            .fetch_part(part_id)
            .await?
            .filter(|p| !p.is_deleted())
            .ok_or_else(|| DomainError::not_found("Part not found").into())
    }

    /// Best-effort trail write, issued after the primary mutation committed.
    async fn record_audit(
        &self,
        actor: UserId,
        action: AuditAction,
        reservation_id: ReservationId,
        details: serde_json::Value,
    ) {
        let entry = AuditEntry::new(
            actor,
            action,
            AuditEntityKind::Reservation,
            reservation_id.to_string(),
            details,
            Utc::now(),
        );
        if let Err(err) = self.audit.record(entry).await {
            tracing::warn!(%action, %reservation_id, error = %err, "audit write failed, trail entry dropped");
        }
    }
}
