//! Postgres-backed store implementation.
//!
//! Cross-entity invariants (single active reservation per part, location
//! occupancy within capacity) are enforced at the database level: every
//! check-and-write primitive runs in one transaction, locking the rows the
//! check reads (`SELECT ... FOR UPDATE`) before writing, and first-assignment
//! uses a conditional `UPDATE` compare-and-set. Lock order is parts before
//! locations everywhere, so concurrent placements cannot deadlock.
//!
//! ## Expected schema
//!
//! ```sql
//! CREATE TABLE locations (
//!     id            UUID PRIMARY KEY,
//!     warehouse_id  UUID NOT NULL,
//!     rack          TEXT NOT NULL,
//!     shelf         TEXT NOT NULL,
//!     pallet        TEXT,
//!     full_code     TEXT NOT NULL UNIQUE,
//!     capacity      INTEGER NOT NULL CHECK (capacity > 0)
//! );
//!
//! CREATE TABLE parts (
//!     id            UUID PRIMARY KEY,
//!     reference     TEXT NOT NULL UNIQUE,
//!     name          TEXT NOT NULL,
//!     category_id   UUID NOT NULL,
//!     price_cents   BIGINT NOT NULL,
//!     condition     TEXT NOT NULL,
//!     is_visible    BOOLEAN NOT NULL,
//!     location_id   UUID REFERENCES locations(id),
//!     deleted_at    TIMESTAMPTZ,
//!     created_at    TIMESTAMPTZ NOT NULL,
//!     updated_at    TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE reservations (
//!     id                  UUID PRIMARY KEY,
//!     user_id             UUID NOT NULL,
//!     part_id             UUID NOT NULL REFERENCES parts(id),
//!     assigned_to_id      UUID,
//!     status              TEXT NOT NULL,
//!     notes               TEXT,
//!     cancel_reason       TEXT,
//!     return_location_id  UUID,
//!     cancelled_at        TIMESTAMPTZ,
//!     created_at          TIMESTAMPTZ NOT NULL,
//!     updated_at          TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE stock_movements (
//!     id                       UUID PRIMARY KEY,
//!     part_id                  UUID NOT NULL REFERENCES parts(id),
//!     user_id                  UUID NOT NULL,
//!     movement_type            TEXT NOT NULL,
//!     source_location_id       UUID,
//!     destination_location_id  UUID,
//!     recorded_at              TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE audit_log (
//!     id           UUID PRIMARY KEY,
//!     user_id      UUID NOT NULL,
//!     action       TEXT NOT NULL,
//!     entity       TEXT NOT NULL,
//!     entity_id    TEXT NOT NULL,
//!     details      JSONB NOT NULL,
//!     recorded_at  TIMESTAMPTZ NOT NULL
//! );
//! ```
//!
//! ## Error mapping
//!
//! | SQLx error | PostgreSQL code | StoreError | Scenario |
//! |------------|-----------------|------------|----------|
//! | Database (unique violation) | `23505` | `Domain(Conflict)` | Duplicate reference/full code |
//! | Database (foreign key violation) | `23503` | `Domain(BadRequest)` | Dangling part/location id |
//! | Database (other) | any other | `Backend` | Other database errors |
//! | PoolClosed / network / ... | n/a | `Backend` | Infrastructure failures |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use partflow_audit::{
    AuditEntry, AuditError, AuditFilter, AuditPage, AuditQuery, AuditSink, Pagination,
};
use partflow_core::{
    AuditEntryId, CategoryId, DomainError, LocationId, MovementId, PartId, ReservationId, UserId,
    WarehouseId,
};
use partflow_inventory::{admission, FullCode, Location, Part, PartRef, StockMovement};
use partflow_reservations::{Reservation, ReservationStatus};

use super::r#trait::{Placement, ReservationFilter, Store, StoreError, StoreResult};

/// How many times a stale-read claim is retried before giving up.
const MAX_CLAIM_ATTEMPTS: u32 = 3;

/// Postgres-backed store.
///
/// Uses the SQLx connection pool (thread-safe, `Send + Sync`); every
/// check-and-write primitive is one transaction.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Lock the part row and apply `placement`, appending the ledger row.
    ///
    /// Admission for `Place` counts occupancy only after taking the location
    /// row lock, so two concurrent placements at the same location serialize.
    async fn place_and_record(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        movement: &StockMovement,
        placement: Placement,
    ) -> StoreResult<()> {
        // Lock order: parts before locations.
        let part_row = sqlx::query("SELECT id FROM parts WHERE id = $1 AND deleted_at IS NULL FOR UPDATE")
            .bind(movement.part_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("lock_part", e))?;
        if part_row.is_none() {
            return Err(DomainError::not_found("Part not found").into());
        }

        match placement {
            Placement::Place(location_id) => {
                let row = sqlx::query(
                    r#"
                    SELECT id, warehouse_id, rack, shelf, pallet, full_code, capacity
                    FROM locations
                    WHERE id = $1
                    FOR UPDATE
                    "#,
                )
                .bind(location_id.as_uuid())
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("lock_location", e))?;
                let location = match row {
                    Some(row) => location_from_row(&row)?,
                    None => return Err(DomainError::not_found("Location not found").into()),
                };

                let occupied: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM parts WHERE location_id = $1 AND deleted_at IS NULL",
                )
                .bind(location_id.as_uuid())
                .fetch_one(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("count_occupancy", e))?;

                admission::admit(&location, occupied as u32, 1)?;

                sqlx::query("UPDATE parts SET location_id = $2, updated_at = $3 WHERE id = $1")
                    .bind(movement.part_id.as_uuid())
                    .bind(location_id.as_uuid())
                    .bind(movement.recorded_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| map_sqlx_error("place_part", e))?;
            }
            Placement::Vacate => {
                sqlx::query("UPDATE parts SET location_id = NULL, updated_at = $2 WHERE id = $1")
                    .bind(movement.part_id.as_uuid())
                    .bind(movement.recorded_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| map_sqlx_error("vacate_part", e))?;
            }
            Placement::Quarantine => {
                sqlx::query(
                    r#"
                    UPDATE parts
                    SET location_id = NULL,
                        is_visible = FALSE,
                        condition = 'DAMAGED',
                        updated_at = $2
                    WHERE id = $1
                    "#,
                )
                .bind(movement.part_id.as_uuid())
                .bind(movement.recorded_at)
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("quarantine_part", e))?;
            }
        }

        sqlx::query(
            r#"
            INSERT INTO stock_movements (
                id, part_id, user_id, movement_type,
                source_location_id, destination_location_id, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(movement.id.as_uuid())
        .bind(movement.part_id.as_uuid())
        .bind(movement.actor.as_uuid())
        .bind(movement.movement_type.as_str())
        .bind(movement.source.map(|l| *l.as_uuid()))
        .bind(movement.destination.map(|l| *l.as_uuid()))
        .bind(movement.recorded_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_movement", e))?;

        Ok(())
    }

    /// Conditional reservation update; classifies the failure when the row
    /// was not at `expected_status`.
    async fn update_reservation_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        reservation: &Reservation,
        expected_status: ReservationStatus,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE reservations
            SET assigned_to_id = $3,
                status = $4,
                notes = $5,
                cancel_reason = $6,
                return_location_id = $7,
                cancelled_at = $8,
                updated_at = $9
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(reservation.id.as_uuid())
        .bind(expected_status.as_str())
        .bind(reservation.assigned_to_id.map(|u| *u.as_uuid()))
        .bind(reservation.status.as_str())
        .bind(reservation.notes.as_deref())
        .bind(reservation.cancel_reason.map(|r| r.as_str()))
        .bind(reservation.return_location_id.map(|l| *l.as_uuid()))
        .bind(reservation.cancelled_at)
        .bind(reservation.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("update_reservation", e))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        // Returning an error drops the transaction, which rolls it back.
        let found: Option<String> =
            sqlx::query_scalar("SELECT status FROM reservations WHERE id = $1")
                .bind(reservation.id.as_uuid())
                .fetch_optional(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("reread_reservation", e))?;
        match found {
            None => Err(DomainError::not_found("Reservation not found").into()),
            Some(status) => Err(DomainError::conflict(format!(
                "Reservation status changed concurrently (expected {expected_status}, found {status})"
            ))
            .into()),
        }
    }
}

#[async_trait]
impl Store for PostgresStore {
    #[instrument(skip(self), fields(part_id = %id), err)]
    async fn fetch_part(&self, id: PartId) -> StoreResult<Option<Part>> {
        let row = sqlx::query(PART_SELECT)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_part", e))?;
        row.map(|r| part_from_row(&r)).transpose()
    }

    #[instrument(skip(self, reference), err)]
    async fn fetch_part_by_reference(&self, reference: &PartRef) -> StoreResult<Option<Part>> {
        let row = sqlx::query(
            "SELECT id, reference, name, category_id, price_cents, condition, is_visible, \
             location_id, deleted_at, created_at, updated_at FROM parts WHERE reference = $1",
        )
        .bind(reference.as_str())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_part_by_reference", e))?;
        row.map(|r| part_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(location_id = %id), err)]
    async fn fetch_location(&self, id: LocationId) -> StoreResult<Option<Location>> {
        let row = sqlx::query(
            "SELECT id, warehouse_id, rack, shelf, pallet, full_code, capacity \
             FROM locations WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_location", e))?;
        row.map(|r| location_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(location_id = %id), err)]
    async fn location_occupancy(&self, id: LocationId) -> StoreResult<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM parts WHERE location_id = $1 AND deleted_at IS NULL",
        )
        .bind(id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("location_occupancy", e))?;
        Ok(count as u32)
    }

    #[instrument(skip(self), fields(reservation_id = %id), err)]
    async fn fetch_reservation(&self, id: ReservationId) -> StoreResult<Option<Reservation>> {
        let row = sqlx::query(RESERVATION_SELECT)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_reservation", e))?;
        row.map(|r| reservation_from_row(&r)).transpose()
    }

    #[instrument(skip(self, filter), err)]
    async fn list_reservations(&self, filter: &ReservationFilter) -> StoreResult<Vec<Reservation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, part_id, assigned_to_id, status, notes,
                   cancel_reason, return_location_id, cancelled_at, created_at, updated_at
            FROM reservations
            WHERE ($1::text IS NULL OR status = $1)
                AND ($2::uuid IS NULL OR user_id = $2)
                AND ($3::uuid IS NULL OR assigned_to_id = $3)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.user_id.map(|u| *u.as_uuid()))
        .bind(filter.assigned_to_id.map(|u| *u.as_uuid()))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_reservations", e))?;

        rows.iter().map(reservation_from_row).collect()
    }

    #[instrument(skip(self), fields(part_id = %part_id), err)]
    async fn part_movements(&self, part_id: PartId) -> StoreResult<Vec<StockMovement>> {
        let rows = sqlx::query(
            "SELECT id, part_id, user_id, movement_type, source_location_id, \
             destination_location_id, recorded_at \
             FROM stock_movements WHERE part_id = $1 ORDER BY recorded_at DESC",
        )
        .bind(part_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("part_movements", e))?;

        rows.iter().map(movement_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn recent_movements(&self, limit: u32) -> StoreResult<Vec<StockMovement>> {
        let rows = sqlx::query(
            "SELECT id, part_id, user_id, movement_type, source_location_id, \
             destination_location_id, recorded_at \
             FROM stock_movements ORDER BY recorded_at DESC LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("recent_movements", e))?;

        rows.iter().map(movement_from_row).collect()
    }

    #[instrument(skip(self, part), fields(part_id = %part.id), err)]
    async fn insert_part(&self, part: &Part) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO parts (
                id, reference, name, category_id, price_cents, condition,
                is_visible, location_id, deleted_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(part.id.as_uuid())
        .bind(part.reference.as_str())
        .bind(&part.name)
        .bind(part.category_id.as_uuid())
        .bind(part.price_cents as i64)
        .bind(part.condition.as_str())
        .bind(part.is_visible)
        .bind(part.location_id.map(|l| *l.as_uuid()))
        .bind(part.deleted_at)
        .bind(part.created_at)
        .bind(part.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DomainError::conflict("Part reference already exists").into()
            } else {
                map_sqlx_error("insert_part", e)
            }
        })?;
        Ok(())
    }

    #[instrument(skip(self, location), fields(location_id = %location.id), err)]
    async fn insert_location(&self, location: &Location) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO locations (id, warehouse_id, rack, shelf, pallet, full_code, capacity)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(location.id.as_uuid())
        .bind(location.warehouse_id.as_uuid())
        .bind(&location.rack)
        .bind(&location.shelf)
        .bind(location.pallet.as_deref())
        .bind(location.full_code.as_str())
        .bind(location.capacity as i32)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DomainError::conflict("Location fullCode already exists").into()
            } else {
                map_sqlx_error("insert_location", e)
            }
        })?;
        Ok(())
    }

    #[instrument(skip(self), fields(location_id = %id), err)]
    async fn update_location_capacity(
        &self,
        id: LocationId,
        capacity: u32,
    ) -> StoreResult<Location> {
        if capacity == 0 {
            return Err(DomainError::bad_request("capacity must be positive").into());
        }

        // Lowering below occupancy is deliberate: overflow is tolerated and
        // only future admissions are blocked.
        let row = sqlx::query(
            r#"
            UPDATE locations
            SET capacity = $2
            WHERE id = $1
            RETURNING id, warehouse_id, rack, shelf, pallet, full_code, capacity
            "#,
        )
        .bind(id.as_uuid())
        .bind(capacity as i32)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_location_capacity", e))?;

        match row {
            Some(row) => location_from_row(&row),
            None => Err(DomainError::not_found("Location not found").into()),
        }
    }

    #[instrument(skip(self, reservation), fields(reservation_id = %reservation.id), err)]
    async fn create_reservation(&self, reservation: &Reservation) -> StoreResult<Reservation> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Lock the part row so concurrent creations for the same part
        // serialize; the active-reservation check below then cannot race.
        let part_row =
            sqlx::query("SELECT id FROM parts WHERE id = $1 AND deleted_at IS NULL FOR UPDATE")
                .bind(reservation.part_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("lock_part", e))?;
        if part_row.is_none() {
            return Err(DomainError::not_found("Part not found").into());
        }

        let has_active: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM reservations WHERE part_id = $1 AND status = ANY($2))",
        )
        .bind(reservation.part_id.as_uuid())
        .bind(active_status_tags())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("check_active_reservation", e))?;
        if has_active {
            return Err(DomainError::conflict("Part already has an active reservation").into());
        }

        sqlx::query(
            r#"
            INSERT INTO reservations (
                id, user_id, part_id, assigned_to_id, status, notes,
                cancel_reason, return_location_id, cancelled_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.user_id.as_uuid())
        .bind(reservation.part_id.as_uuid())
        .bind(reservation.assigned_to_id.map(|u| *u.as_uuid()))
        .bind(reservation.status.as_str())
        .bind(reservation.notes.as_deref())
        .bind(reservation.cancel_reason.map(|r| r.as_str()))
        .bind(reservation.return_location_id.map(|l| *l.as_uuid()))
        .bind(reservation.cancelled_at)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_reservation", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(reservation.clone())
    }

    #[instrument(skip(self), fields(reservation_id = %id, assignee = %assignee), err)]
    async fn claim_reservation(
        &self,
        id: ReservationId,
        assignee: UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<Reservation> {
        for _ in 0..MAX_CLAIM_ATTEMPTS {
            // First writer wins: the compare-and-set only touches a row that
            // is still PENDING and unassigned.
            let result = sqlx::query(
                r#"
                UPDATE reservations
                SET assigned_to_id = $2, status = 'IN_PREPARATION', updated_at = $3
                WHERE id = $1 AND status = 'PENDING' AND assigned_to_id IS NULL
                "#,
            )
            .bind(id.as_uuid())
            .bind(assignee.as_uuid())
            .bind(now)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("claim_reservation", e))?;

            if result.rows_affected() == 1 {
                return self
                    .fetch_reservation(id)
                    .await?
                    .ok_or_else(|| StoreError::backend("claimed reservation row vanished"));
            }

            // Lost the race (or the row never qualified): classify from the
            // current row by replaying the claim against a copy.
            let Some(current) = self.fetch_reservation(id).await? else {
                return Err(DomainError::not_found("Reservation not found").into());
            };
            let mut probe = current;
            match probe.assign(assignee, now) {
                Err(err) => return Err(err.into()),
                // The row looked claimable again between the two reads; retry.
                Ok(()) => continue,
            }
        }

        Err(StoreError::backend("claim retry budget exhausted"))
    }

    #[instrument(skip(self, reservation), fields(reservation_id = %reservation.id), err)]
    async fn update_reservation(
        &self,
        reservation: &Reservation,
        expected_status: ReservationStatus,
    ) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        self.update_reservation_in_tx(&mut tx, reservation, expected_status)
            .await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(
        skip(self, reservation, movement),
        fields(reservation_id = %reservation.id, movement_id = %movement.id),
        err
    )]
    async fn update_reservation_with_movement(
        &self,
        reservation: &Reservation,
        expected_status: ReservationStatus,
        movement: &StockMovement,
        placement: Placement,
    ) -> StoreResult<StockMovement> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        self.update_reservation_in_tx(&mut tx, reservation, expected_status)
            .await?;
        self.place_and_record(&mut tx, movement, placement).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(movement.clone())
    }

    #[instrument(skip(self, movement), fields(movement_id = %movement.id), err)]
    async fn commit_movement(
        &self,
        movement: &StockMovement,
        placement: Placement,
    ) -> StoreResult<StockMovement> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        self.place_and_record(&mut tx, movement, placement).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(movement.clone())
    }
}

#[async_trait]
impl AuditSink for PostgresStore {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (id, user_id, action, entity, entity_id, details, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.actor.as_uuid())
        .bind(entry.action.as_str())
        .bind(entry.entity.as_str())
        .bind(&entry.entity_id)
        .bind(&entry.details)
        .bind(entry.recorded_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| AuditError::Sink(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl AuditQuery for PostgresStore {
    async fn query(&self, filter: &AuditFilter, page: Pagination) -> Result<AuditPage, AuditError> {
        let actor = filter.actor.map(|u| *u.as_uuid());
        let action = filter.action.map(|a| a.as_str());
        let entity = filter.entity.map(|e| e.as_str());

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM audit_log
            WHERE ($1::uuid IS NULL OR user_id = $1)
                AND ($2::text IS NULL OR action = $2)
                AND ($3::text IS NULL OR entity = $3)
                AND ($4::text IS NULL OR entity_id = $4)
                AND ($5::timestamptz IS NULL OR recorded_at >= $5)
                AND ($6::timestamptz IS NULL OR recorded_at <= $6)
            "#,
        )
        .bind(actor)
        .bind(action)
        .bind(entity)
        .bind(filter.entity_id.as_deref())
        .bind(filter.recorded_after)
        .bind(filter.recorded_before)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| AuditError::Sink(e.to_string()))?;

        let rows = sqlx::query(
            r#"
            SELECT id, user_id, action, entity, entity_id, details, recorded_at
            FROM audit_log
            WHERE ($1::uuid IS NULL OR user_id = $1)
                AND ($2::text IS NULL OR action = $2)
                AND ($3::text IS NULL OR entity = $3)
                AND ($4::text IS NULL OR entity_id = $4)
                AND ($5::timestamptz IS NULL OR recorded_at >= $5)
                AND ($6::timestamptz IS NULL OR recorded_at <= $6)
            ORDER BY recorded_at DESC
            LIMIT $7 OFFSET $8
            "#,
        )
        .bind(actor)
        .bind(action)
        .bind(entity)
        .bind(filter.entity_id.as_deref())
        .bind(filter.recorded_after)
        .bind(filter.recorded_before)
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| AuditError::Sink(e.to_string()))?;

        let entries = rows
            .iter()
            .map(audit_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AuditError::Sink(e.to_string()))?;
        let has_more = total as u64 > u64::from(page.offset) + u64::from(page.limit);

        Ok(AuditPage {
            entries,
            total: total as u64,
            pagination: page,
            has_more,
        })
    }

    async fn entry(&self, id: AuditEntryId) -> Result<Option<AuditEntry>, AuditError> {
        let row = sqlx::query(
            "SELECT id, user_id, action, entity, entity_id, details, recorded_at \
             FROM audit_log WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| AuditError::Sink(e.to_string()))?;

        row.map(|r| audit_from_row(&r))
            .transpose()
            .map_err(|e| AuditError::Sink(e.to_string()))
    }
}

const PART_SELECT: &str = "SELECT id, reference, name, category_id, price_cents, condition, \
     is_visible, location_id, deleted_at, created_at, updated_at FROM parts WHERE id = $1";

const RESERVATION_SELECT: &str = "SELECT id, user_id, part_id, assigned_to_id, status, notes, \
     cancel_reason, return_location_id, cancelled_at, created_at, updated_at \
     FROM reservations WHERE id = $1";

/// Status tags that block a new reservation on the same part.
fn active_status_tags() -> Vec<String> {
    ReservationStatus::ALL
        .iter()
        .filter(|s| s.is_active())
        .map(|s| s.as_str().to_string())
        .collect()
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // Unique violation: a concurrent writer got there first.
                Some("23505") => DomainError::conflict(msg).into(),
                // Foreign key violation: caller referenced a missing row.
                Some("23503") => DomainError::bad_request(msg).into(),
                _ => StoreError::backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::backend(format!("connection pool closed in {operation}"))
        }
        other => StoreError::backend(format!("sqlx error in {operation}: {other}")),
    }
}

/// Check if an error is a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

fn corrupt_row(what: &str, err: impl core::fmt::Display) -> StoreError {
    StoreError::backend(format!("corrupt {what} row: {err}"))
}

fn part_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<Part> {
    let id: uuid::Uuid = row.try_get("id").map_err(|e| corrupt_row("part", e))?;
    let reference: String = row.try_get("reference").map_err(|e| corrupt_row("part", e))?;
    let condition: String = row.try_get("condition").map_err(|e| corrupt_row("part", e))?;
    let price_cents: i64 = row
        .try_get("price_cents")
        .map_err(|e| corrupt_row("part", e))?;
    let location_id: Option<uuid::Uuid> = row
        .try_get("location_id")
        .map_err(|e| corrupt_row("part", e))?;
    let category_id: uuid::Uuid = row
        .try_get("category_id")
        .map_err(|e| corrupt_row("part", e))?;

    Ok(Part {
        id: PartId::from_uuid(id),
        reference: PartRef::new(reference).map_err(|e| corrupt_row("part", e))?,
        name: row.try_get("name").map_err(|e| corrupt_row("part", e))?,
        category_id: CategoryId::from_uuid(category_id),
        price_cents: price_cents as u64,
        condition: condition.parse().map_err(|e| corrupt_row("part", e))?,
        is_visible: row
            .try_get("is_visible")
            .map_err(|e| corrupt_row("part", e))?,
        location_id: location_id.map(LocationId::from_uuid),
        deleted_at: row
            .try_get("deleted_at")
            .map_err(|e| corrupt_row("part", e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| corrupt_row("part", e))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| corrupt_row("part", e))?,
    })
}

fn location_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<Location> {
    let id: uuid::Uuid = row.try_get("id").map_err(|e| corrupt_row("location", e))?;
    let warehouse_id: uuid::Uuid = row
        .try_get("warehouse_id")
        .map_err(|e| corrupt_row("location", e))?;
    let full_code: String = row
        .try_get("full_code")
        .map_err(|e| corrupt_row("location", e))?;
    let capacity: i32 = row
        .try_get("capacity")
        .map_err(|e| corrupt_row("location", e))?;

    Ok(Location {
        id: LocationId::from_uuid(id),
        warehouse_id: WarehouseId::from_uuid(warehouse_id),
        rack: row.try_get("rack").map_err(|e| corrupt_row("location", e))?,
        shelf: row
            .try_get("shelf")
            .map_err(|e| corrupt_row("location", e))?,
        pallet: row
            .try_get("pallet")
            .map_err(|e| corrupt_row("location", e))?,
        full_code: FullCode::new(full_code),
        capacity: capacity as u32,
    })
}

fn reservation_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<Reservation> {
    let id: uuid::Uuid = row.try_get("id").map_err(|e| corrupt_row("reservation", e))?;
    let user_id: uuid::Uuid = row
        .try_get("user_id")
        .map_err(|e| corrupt_row("reservation", e))?;
    let part_id: uuid::Uuid = row
        .try_get("part_id")
        .map_err(|e| corrupt_row("reservation", e))?;
    let assigned_to_id: Option<uuid::Uuid> = row
        .try_get("assigned_to_id")
        .map_err(|e| corrupt_row("reservation", e))?;
    let status: String = row
        .try_get("status")
        .map_err(|e| corrupt_row("reservation", e))?;
    let cancel_reason: Option<String> = row
        .try_get("cancel_reason")
        .map_err(|e| corrupt_row("reservation", e))?;
    let return_location_id: Option<uuid::Uuid> = row
        .try_get("return_location_id")
        .map_err(|e| corrupt_row("reservation", e))?;

    Ok(Reservation {
        id: ReservationId::from_uuid(id),
        user_id: UserId::from_uuid(user_id),
        part_id: PartId::from_uuid(part_id),
        assigned_to_id: assigned_to_id.map(UserId::from_uuid),
        status: status.parse().map_err(|e| corrupt_row("reservation", e))?,
        notes: row
            .try_get("notes")
            .map_err(|e| corrupt_row("reservation", e))?,
        cancel_reason: cancel_reason
            .map(|r| r.parse())
            .transpose()
            .map_err(|e| corrupt_row("reservation", e))?,
        return_location_id: return_location_id.map(LocationId::from_uuid),
        cancelled_at: row
            .try_get("cancelled_at")
            .map_err(|e| corrupt_row("reservation", e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| corrupt_row("reservation", e))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| corrupt_row("reservation", e))?,
    })
}

fn movement_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<StockMovement> {
    let id: uuid::Uuid = row.try_get("id").map_err(|e| corrupt_row("movement", e))?;
    let part_id: uuid::Uuid = row
        .try_get("part_id")
        .map_err(|e| corrupt_row("movement", e))?;
    let actor: uuid::Uuid = row
        .try_get("user_id")
        .map_err(|e| corrupt_row("movement", e))?;
    let movement_type: String = row
        .try_get("movement_type")
        .map_err(|e| corrupt_row("movement", e))?;
    let source: Option<uuid::Uuid> = row
        .try_get("source_location_id")
        .map_err(|e| corrupt_row("movement", e))?;
    let destination: Option<uuid::Uuid> = row
        .try_get("destination_location_id")
        .map_err(|e| corrupt_row("movement", e))?;

    Ok(StockMovement {
        id: MovementId::from_uuid(id),
        part_id: PartId::from_uuid(part_id),
        actor: UserId::from_uuid(actor),
        movement_type: movement_type
            .parse()
            .map_err(|e| corrupt_row("movement", e))?,
        source: source.map(LocationId::from_uuid),
        destination: destination.map(LocationId::from_uuid),
        recorded_at: row
            .try_get("recorded_at")
            .map_err(|e| corrupt_row("movement", e))?,
    })
}

fn audit_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<AuditEntry> {
    let id: uuid::Uuid = row.try_get("id").map_err(|e| corrupt_row("audit", e))?;
    let actor: uuid::Uuid = row.try_get("user_id").map_err(|e| corrupt_row("audit", e))?;
    let action: String = row.try_get("action").map_err(|e| corrupt_row("audit", e))?;
    let entity: String = row.try_get("entity").map_err(|e| corrupt_row("audit", e))?;

    Ok(AuditEntry {
        id: AuditEntryId::from_uuid(id),
        actor: UserId::from_uuid(actor),
        action: action.parse().map_err(|e| corrupt_row("audit", e))?,
        entity: entity.parse().map_err(|e| corrupt_row("audit", e))?,
        entity_id: row
            .try_get("entity_id")
            .map_err(|e| corrupt_row("audit", e))?,
        details: row.try_get("details").map_err(|e| corrupt_row("audit", e))?,
        recorded_at: row
            .try_get("recorded_at")
            .map_err(|e| corrupt_row("audit", e))?,
    })
}
