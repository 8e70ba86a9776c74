//! Integration tests for the full warehouse pipeline.
//!
//! Tests: Service → Store primitive → ledger/projection → audit trail.
//!
//! Verifies:
//! - Reservation lifecycle rules end to end against the in-memory store
//! - Capacity admission under concurrent placements
//! - First-writer-wins claiming under concurrent assignment
//! - The ledger/projection coupling and the audit trail

use std::sync::Arc;

use chrono::Utc;

use partflow_audit::{AuditAction, AuditEntityKind, AuditFilter, AuditQuery, Pagination};
use partflow_core::{
    CategoryId, DomainError, LocationId, PartId, ReservationId, UserId, WarehouseId,
};
use partflow_inventory::{Location, MovementType, Part, PartCondition, PartRef};
use partflow_reservations::{CancelReason, Reservation, ReservationStatus};

use crate::services::{admission, ReservationService, ReturnParams, StockMovementService};
use crate::store::{InMemoryStore, Placement, ReservationFilter, Store, StoreError};

type Shared = Arc<InMemoryStore>;

struct Harness {
    store: Shared,
    reservations: ReservationService<Shared, Shared>,
    movements: StockMovementService<Shared, Shared>,
}

fn setup() -> Harness {
    partflow_observability::init();
    let store = Arc::new(InMemoryStore::new());
    Harness {
        reservations: ReservationService::new(store.clone(), store.clone()),
        movements: StockMovementService::new(store.clone(), store.clone()),
        store,
    }
}

async fn seed_location(store: &InMemoryStore, rack: &str, shelf: &str, capacity: u32) -> Location {
    let location = Location::new(
        LocationId::new(),
        WarehouseId::new(),
        "WH1",
        rack,
        shelf,
        None,
        capacity,
    )
    .unwrap();
    store.insert_location(&location).await.unwrap();
    location
}

async fn seed_part(store: &InMemoryStore, reference: &str) -> Part {
    let part = Part::new(
        PartId::new(),
        PartRef::new(reference).unwrap(),
        "Brake caliper",
        CategoryId::new(),
        4_900,
        PartCondition::Used,
        Utc::now(),
    )
    .unwrap();
    store.insert_part(&part).await.unwrap();
    part
}

fn domain_err(err: StoreError) -> DomainError {
    match err {
        StoreError::Domain(err) => err,
        StoreError::Backend(msg) => panic!("expected domain error, got backend error: {msg}"),
    }
}

/// Drive a fresh reservation to COMPLETED: claim, ready, complete.
async fn drive_to_completed(harness: &Harness, id: ReservationId, worker: UserId) {
    harness.reservations.assign(id, worker).await.unwrap();
    harness
        .reservations
        .update_status(id, ReservationStatus::ReadyToShip, worker)
        .await
        .unwrap();
    harness
        .reservations
        .update_status(id, ReservationStatus::Completed, worker)
        .await
        .unwrap();
}

// -- reservation lifecycle -------------------------------------------------

#[tokio::test]
async fn creating_a_reservation_starts_pending() {
    let harness = setup();
    let part = seed_part(&harness.store, "REF-100").await;

    let reservation = harness
        .reservations
        .create(UserId::new(), part.id, Some("urgent".to_string()))
        .await
        .unwrap();

    assert_eq!(reservation.status, ReservationStatus::Pending);
    assert_eq!(reservation.part_id, part.id);
    assert!(reservation.assigned_to_id.is_none());
}

#[tokio::test]
async fn second_reservation_for_the_same_part_is_rejected() {
    let harness = setup();
    let part = seed_part(&harness.store, "REF-101").await;

    harness
        .reservations
        .create(UserId::new(), part.id, None)
        .await
        .unwrap();
    let err = harness
        .reservations
        .create(UserId::new(), part.id, None)
        .await
        .unwrap_err();

    assert_eq!(
        domain_err(err),
        DomainError::conflict("Part already has an active reservation")
    );
}

#[tokio::test]
async fn reserving_a_missing_or_deleted_part_fails() {
    let harness = setup();

    let err = harness
        .reservations
        .create(UserId::new(), PartId::new(), None)
        .await
        .unwrap_err();
    assert_eq!(domain_err(err), DomainError::not_found("Part not found"));

    let mut retired = Part::new(
        PartId::new(),
        PartRef::new("REF-102").unwrap(),
        "Retired part",
        CategoryId::new(),
        1_000,
        PartCondition::Used,
        Utc::now(),
    )
    .unwrap();
    retired.soft_delete(Utc::now());
    harness.store.insert_part(&retired).await.unwrap();

    let err = harness
        .reservations
        .create(UserId::new(), retired.id, None)
        .await
        .unwrap_err();
    assert_eq!(domain_err(err), DomainError::not_found("Part not found"));
}

#[tokio::test]
async fn a_completed_reservation_does_not_block_a_new_one() {
    let harness = setup();
    let location = seed_location(&harness.store, "A", "1", 5).await;
    let part = seed_part(&harness.store, "REF-103").await;
    let worker = UserId::new();

    harness
        .movements
        .record_entry(part.id, worker, location.id)
        .await
        .unwrap();
    let first = harness
        .reservations
        .create(UserId::new(), part.id, None)
        .await
        .unwrap();
    drive_to_completed(&harness, first.id, worker).await;

    // Delivered but not yet client-confirmed: the part is reservable again.
    let second = harness
        .reservations
        .create(UserId::new(), part.id, None)
        .await
        .unwrap();
    assert_eq!(second.status, ReservationStatus::Pending);
}

#[tokio::test]
async fn assignment_claims_exactly_once() {
    let harness = setup();
    let part = seed_part(&harness.store, "REF-104").await;
    let reservation = harness
        .reservations
        .create(UserId::new(), part.id, None)
        .await
        .unwrap();

    let w1 = UserId::new();
    let claimed = harness.reservations.assign(reservation.id, w1).await.unwrap();
    assert_eq!(claimed.status, ReservationStatus::InPreparation);
    assert_eq!(claimed.assigned_to_id, Some(w1));

    let err = harness
        .reservations
        .assign(reservation.id, UserId::new())
        .await
        .unwrap_err();
    assert_eq!(
        domain_err(err),
        DomainError::conflict("Reservation already assigned")
    );
}

#[tokio::test]
async fn skipping_transition_states_is_rejected() {
    let harness = setup();
    let part = seed_part(&harness.store, "REF-105").await;
    let reservation = harness
        .reservations
        .create(UserId::new(), part.id, None)
        .await
        .unwrap();

    let err = harness
        .reservations
        .update_status(reservation.id, ReservationStatus::Completed, UserId::new())
        .await
        .unwrap_err();
    assert_eq!(
        domain_err(err),
        DomainError::bad_request("Cannot transition from PENDING to COMPLETED")
    );
}

#[tokio::test]
async fn completing_records_exactly_one_exit_movement() {
    let harness = setup();
    let location = seed_location(&harness.store, "A", "1", 5).await;
    let part = seed_part(&harness.store, "REF-106").await;
    let worker = UserId::new();

    harness
        .movements
        .record_entry(part.id, worker, location.id)
        .await
        .unwrap();
    let reservation = harness
        .reservations
        .create(UserId::new(), part.id, None)
        .await
        .unwrap();
    drive_to_completed(&harness, reservation.id, worker).await;

    let history = harness.movements.part_history(part.id).await.unwrap();
    let exits: Vec<_> = history
        .iter()
        .filter(|m| m.movement_type == MovementType::Exit)
        .collect();
    assert_eq!(exits.len(), 1);
    assert_eq!(exits[0].source, Some(location.id));
    assert_eq!(exits[0].actor, worker);

    // The projection cleared together with the status change.
    let part = harness.store.fetch_part(part.id).await.unwrap().unwrap();
    assert_eq!(part.location_id, None);
}

#[tokio::test]
async fn only_the_assignee_advances_but_anyone_cancels() {
    let harness = setup();
    let part = seed_part(&harness.store, "REF-107").await;
    let worker = UserId::new();
    let stranger = UserId::new();

    let reservation = harness
        .reservations
        .create(UserId::new(), part.id, None)
        .await
        .unwrap();
    harness.reservations.assign(reservation.id, worker).await.unwrap();

    let err = harness
        .reservations
        .update_status(reservation.id, ReservationStatus::ReadyToShip, stranger)
        .await
        .unwrap_err();
    assert_eq!(
        domain_err(err),
        DomainError::forbidden("Only the assigned user can update this reservation")
    );

    let cancelled = harness
        .reservations
        .cancel(reservation.id, stranger, CancelReason::Desist, None)
        .await
        .unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
}

// -- cancellation and returns ----------------------------------------------

#[tokio::test]
async fn desist_before_delivery_leaves_no_ledger_trace() {
    let harness = setup();
    let part = seed_part(&harness.store, "REF-108").await;
    let reservation = harness
        .reservations
        .create(UserId::new(), part.id, None)
        .await
        .unwrap();

    let cancelled = harness
        .reservations
        .cancel(reservation.id, UserId::new(), CancelReason::Desist, None)
        .await
        .unwrap();

    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert_eq!(cancelled.cancel_reason, Some(CancelReason::Desist));
    assert!(cancelled.cancelled_at.is_some());
    assert!(harness.movements.part_history(part.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn desist_after_delivery_is_rejected() {
    let harness = setup();
    let location = seed_location(&harness.store, "A", "1", 5).await;
    let part = seed_part(&harness.store, "REF-109").await;
    let worker = UserId::new();

    harness
        .movements
        .record_entry(part.id, worker, location.id)
        .await
        .unwrap();
    let reservation = harness
        .reservations
        .create(UserId::new(), part.id, None)
        .await
        .unwrap();
    drive_to_completed(&harness, reservation.id, worker).await;

    let err = harness
        .reservations
        .cancel(reservation.id, worker, CancelReason::Desist, None)
        .await
        .unwrap_err();
    assert_eq!(
        domain_err(err),
        DomainError::bad_request("Cannot use DESIST reason after part was delivered")
    );
}

#[tokio::test]
async fn return_after_delivery_appends_one_return_and_restocks() {
    let harness = setup();
    let origin = seed_location(&harness.store, "A", "1", 5).await;
    let return_loc = seed_location(&harness.store, "B", "2", 5).await;
    let part = seed_part(&harness.store, "REF-110").await;
    let worker = UserId::new();

    harness
        .movements
        .record_entry(part.id, worker, origin.id)
        .await
        .unwrap();
    let reservation = harness
        .reservations
        .create(UserId::new(), part.id, None)
        .await
        .unwrap();
    drive_to_completed(&harness, reservation.id, worker).await;

    let cancelled = harness
        .reservations
        .cancel(reservation.id, worker, CancelReason::Return, Some(return_loc.id))
        .await
        .unwrap();
    assert_eq!(cancelled.return_location_id, Some(return_loc.id));

    let history = harness.movements.part_history(part.id).await.unwrap();
    let returns: Vec<_> = history
        .iter()
        .filter(|m| m.movement_type == MovementType::Return)
        .collect();
    assert_eq!(returns.len(), 1);
    assert_eq!(returns[0].destination, Some(return_loc.id));

    let part = harness.store.fetch_part(part.id).await.unwrap().unwrap();
    assert_eq!(part.location_id, Some(return_loc.id));
}

#[tokio::test]
async fn return_without_location_is_rejected() {
    let harness = setup();
    let location = seed_location(&harness.store, "A", "1", 5).await;
    let part = seed_part(&harness.store, "REF-111").await;
    let worker = UserId::new();

    harness
        .movements
        .record_entry(part.id, worker, location.id)
        .await
        .unwrap();
    let reservation = harness
        .reservations
        .create(UserId::new(), part.id, None)
        .await
        .unwrap();
    drive_to_completed(&harness, reservation.id, worker).await;

    let err = harness
        .reservations
        .cancel(reservation.id, worker, CancelReason::Return, None)
        .await
        .unwrap_err();
    assert_eq!(
        domain_err(err),
        DomainError::bad_request("returnLocationId is required for RETURN")
    );
}

#[tokio::test]
async fn damaged_return_quarantines_the_part() {
    let harness = setup();
    let location = seed_location(&harness.store, "A", "1", 5).await;
    let part = seed_part(&harness.store, "REF-112").await;
    let worker = UserId::new();

    harness
        .movements
        .record_entry(part.id, worker, location.id)
        .await
        .unwrap();
    let reservation = harness
        .reservations
        .create(UserId::new(), part.id, None)
        .await
        .unwrap();
    drive_to_completed(&harness, reservation.id, worker).await;

    harness
        .reservations
        .cancel(reservation.id, worker, CancelReason::DamagedReturn, None)
        .await
        .unwrap();

    let part = harness.store.fetch_part(part.id).await.unwrap().unwrap();
    assert!(!part.is_visible);
    assert_eq!(part.location_id, None);
    assert_eq!(part.condition, PartCondition::Damaged);

    let history = harness.movements.part_history(part.id).await.unwrap();
    assert_eq!(history[0].movement_type, MovementType::Return);
    assert_eq!(history[0].destination, None);
}

// -- capacity admission ----------------------------------------------------

#[tokio::test]
async fn a_full_location_rejects_placement_naming_its_occupancy() {
    let harness = setup();
    let location = seed_location(&harness.store, "A", "1", 1).await;
    let occupant = seed_part(&harness.store, "REF-113").await;
    let newcomer = seed_part(&harness.store, "REF-114").await;
    let worker = UserId::new();

    harness
        .movements
        .record_entry(occupant.id, worker, location.id)
        .await
        .unwrap();
    let err = harness
        .movements
        .record_entry(newcomer.id, worker, location.id)
        .await
        .unwrap_err();

    assert_eq!(
        domain_err(err),
        DomainError::conflict(format!("Location {} is full (1/1)", location.full_code))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_placements_admit_exactly_one_part() {
    let harness = setup();
    let location = seed_location(&harness.store, "A", "1", 1).await;
    let first = seed_part(&harness.store, "REF-115").await;
    let second = seed_part(&harness.store, "REF-116").await;

    let store_a = harness.store.clone();
    let store_b = harness.store.clone();
    let loc = location.id;
    let a = tokio::spawn(async move {
        StockMovementService::new(store_a.clone(), store_a)
            .record_entry(first.id, UserId::new(), loc)
            .await
    });
    let b = tokio::spawn(async move {
        StockMovementService::new(store_b.clone(), store_b)
            .record_entry(second.id, UserId::new(), loc)
            .await
    });

    let outcomes = [a.await.unwrap(), b.await.unwrap()];
    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one concurrent placement must win");
    assert_eq!(harness.store.location_occupancy(location.id).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_have_exactly_one_winner() {
    let harness = setup();
    let part = seed_part(&harness.store, "REF-117").await;
    let reservation = harness
        .reservations
        .create(UserId::new(), part.id, None)
        .await
        .unwrap();

    let store_a = harness.store.clone();
    let store_b = harness.store.clone();
    let id = reservation.id;
    let a = tokio::spawn(async move {
        ReservationService::new(store_a.clone(), store_a)
            .assign(id, UserId::new())
            .await
    });
    let b = tokio::spawn(async move {
        ReservationService::new(store_b.clone(), store_b)
            .assign(id, UserId::new())
            .await
    });

    let outcomes = [a.await.unwrap(), b.await.unwrap()];
    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "first writer wins, second claim must fail");

    let stored = harness
        .store
        .fetch_reservation(reservation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ReservationStatus::InPreparation);
    assert!(stored.assigned_to_id.is_some());
}

#[tokio::test]
async fn lowering_capacity_below_occupancy_blocks_only_future_admissions() {
    let harness = setup();
    let location = seed_location(&harness.store, "A", "1", 5).await;
    let worker = UserId::new();
    for reference in ["REF-118", "REF-119"] {
        let part = seed_part(&harness.store, reference).await;
        harness
            .movements
            .record_entry(part.id, worker, location.id)
            .await
            .unwrap();
    }

    // Overflow is tolerated, not corrected.
    let updated = harness
        .store
        .update_location_capacity(location.id, 1)
        .await
        .unwrap();
    assert_eq!(updated.capacity, 1);
    assert_eq!(harness.store.location_occupancy(location.id).await.unwrap(), 2);

    let newcomer = seed_part(&harness.store, "REF-120").await;
    let err = harness
        .movements
        .record_entry(newcomer.id, worker, location.id)
        .await
        .unwrap_err();
    assert_eq!(
        domain_err(err),
        DomainError::conflict(format!("Location {} is full (2/1)", location.full_code))
    );
}

#[tokio::test]
async fn admission_gate_reports_missing_locations_and_free_slots() {
    let harness = setup();

    let err = admission::admit(&harness.store, LocationId::new(), 1)
        .await
        .unwrap_err();
    assert_eq!(domain_err(err), DomainError::not_found("Location not found"));

    let location = seed_location(&harness.store, "C", "7", 3).await;
    let part = seed_part(&harness.store, "REF-121").await;
    harness
        .movements
        .record_entry(part.id, UserId::new(), location.id)
        .await
        .unwrap();

    let report = admission::capacity_report(&harness.store, location.id)
        .await
        .unwrap();
    assert_eq!(report.occupied, 1);
    assert_eq!(report.free_slots, 2);
    assert!(report.has_space);
}

// -- ledger operations -----------------------------------------------------

#[tokio::test]
async fn transfer_validates_the_source_and_moves_the_part() {
    let harness = setup();
    let from = seed_location(&harness.store, "A", "1", 5).await;
    let to = seed_location(&harness.store, "B", "1", 5).await;
    let elsewhere = seed_location(&harness.store, "C", "1", 5).await;
    let part = seed_part(&harness.store, "REF-122").await;
    let worker = UserId::new();

    harness
        .movements
        .record_entry(part.id, worker, from.id)
        .await
        .unwrap();

    let err = harness
        .movements
        .record_transfer(part.id, worker, elsewhere.id, to.id)
        .await
        .unwrap_err();
    assert_eq!(
        domain_err(err),
        DomainError::bad_request("Part is not at the specified source location")
    );

    let movement = harness
        .movements
        .record_transfer(part.id, worker, from.id, to.id)
        .await
        .unwrap();
    assert_eq!(movement.movement_type, MovementType::Transfer);
    assert_eq!(movement.source, Some(from.id));
    assert_eq!(movement.destination, Some(to.id));

    let part = harness.store.fetch_part(part.id).await.unwrap().unwrap();
    assert_eq!(part.location_id, Some(to.id));
    assert_eq!(harness.store.location_occupancy(from.id).await.unwrap(), 0);
    assert_eq!(harness.store.location_occupancy(to.id).await.unwrap(), 1);
}

#[tokio::test]
async fn adjustment_records_both_endpoints() {
    let harness = setup();
    let location = seed_location(&harness.store, "A", "1", 5).await;
    let part = seed_part(&harness.store, "REF-123").await;
    let admin = UserId::new();

    harness
        .movements
        .record_entry(part.id, admin, location.id)
        .await
        .unwrap();
    let movement = harness
        .movements
        .record_adjustment(part.id, admin, None)
        .await
        .unwrap();

    assert_eq!(movement.movement_type, MovementType::Adjustment);
    assert_eq!(movement.source, Some(location.id));
    assert_eq!(movement.destination, None);

    let part = harness.store.fetch_part(part.id).await.unwrap().unwrap();
    assert_eq!(part.location_id, None);
}

#[tokio::test]
async fn undamaged_return_requires_a_location_at_the_ledger_too() {
    let harness = setup();
    let part = seed_part(&harness.store, "REF-124").await;

    let err = harness
        .movements
        .record_return(ReturnParams {
            part_id: part.id,
            actor: UserId::new(),
            to_location_id: None,
            is_damaged: false,
        })
        .await
        .unwrap_err();
    assert_eq!(
        domain_err(err),
        DomainError::bad_request("returnLocationId is required for RETURN")
    );
}

#[tokio::test]
async fn part_history_is_newest_first_and_recent_is_bounded() {
    let harness = setup();
    let a = seed_location(&harness.store, "A", "1", 5).await;
    let b = seed_location(&harness.store, "B", "1", 5).await;
    let part = seed_part(&harness.store, "REF-125").await;
    let worker = UserId::new();

    harness
        .movements
        .record_entry(part.id, worker, a.id)
        .await
        .unwrap();
    harness
        .movements
        .record_transfer(part.id, worker, a.id, b.id)
        .await
        .unwrap();
    harness.movements.record_exit(part.id, worker).await.unwrap();

    let history = harness.movements.part_history(part.id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history.windows(2).all(|w| w[0].recorded_at >= w[1].recorded_at));

    let recent = harness.movements.recent(2).await.unwrap();
    assert_eq!(recent.len(), 2);
}

// -- consistency and audit -------------------------------------------------

#[tokio::test]
async fn stale_status_updates_are_rejected_by_the_store() {
    let harness = setup();
    let part = seed_part(&harness.store, "REF-126").await;
    let reservation = harness
        .reservations
        .create(UserId::new(), part.id, None)
        .await
        .unwrap();

    // Another worker moves the row first.
    harness
        .reservations
        .cancel(reservation.id, UserId::new(), CancelReason::Desist, None)
        .await
        .unwrap();

    // A writer still holding the PENDING snapshot must not win.
    let mut stale = reservation.clone();
    stale.status = ReservationStatus::Cancelled;
    let err = harness
        .store
        .update_reservation(&stale, ReservationStatus::Pending)
        .await
        .unwrap_err();
    assert!(matches!(domain_err(err), DomainError::Conflict(_)));
}

#[tokio::test]
async fn completed_rows_and_exit_rows_commit_together() {
    let harness = setup();
    let part = seed_part(&harness.store, "REF-127").await;
    let worker = UserId::new();
    let reservation = harness
        .reservations
        .create(UserId::new(), part.id, None)
        .await
        .unwrap();
    harness.reservations.assign(reservation.id, worker).await.unwrap();
    harness
        .reservations
        .update_status(reservation.id, ReservationStatus::ReadyToShip, worker)
        .await
        .unwrap();

    // Make the coupled commit fail: complete against a part that vanished.
    // (Direct store surgery; the service would normally prevent this.)
    let mut completed = harness
        .store
        .fetch_reservation(reservation.id)
        .await
        .unwrap()
        .unwrap();
    completed.status = ReservationStatus::Completed;
    let missing_part = Reservation {
        part_id: PartId::new(),
        ..completed.clone()
    };
    let movement = partflow_inventory::StockMovement::exit(
        missing_part.part_id,
        worker,
        None,
        Utc::now(),
    );
    let err = harness
        .store
        .update_reservation_with_movement(
            &missing_part,
            ReservationStatus::ReadyToShip,
            &movement,
            Placement::Vacate,
        )
        .await
        .unwrap_err();
    assert_eq!(domain_err(err), DomainError::not_found("Part not found"));

    // Neither write went through: still READY_TO_SHIP, no EXIT row.
    let stored = harness
        .store
        .fetch_reservation(reservation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ReservationStatus::ReadyToShip);
    assert!(harness.movements.part_history(part.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn every_mutation_leaves_an_audit_entry() {
    let harness = setup();
    let location = seed_location(&harness.store, "A", "1", 5).await;
    let part = seed_part(&harness.store, "REF-128").await;
    let requester = UserId::new();
    let worker = UserId::new();

    harness
        .movements
        .record_entry(part.id, worker, location.id)
        .await
        .unwrap();
    let reservation = harness
        .reservations
        .create(requester, part.id, None)
        .await
        .unwrap();
    drive_to_completed(&harness, reservation.id, worker).await;
    harness
        .reservations
        .cancel(reservation.id, worker, CancelReason::DamagedReturn, None)
        .await
        .unwrap();

    // entry + create + assign + ready + completed + cancel
    let page = harness
        .store
        .query(&AuditFilter::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 6);
    assert!(page.entries.windows(2).all(|w| w[0].recorded_at >= w[1].recorded_at));

    let reservation_trail = harness
        .store
        .query(
            &AuditFilter {
                entity: Some(AuditEntityKind::Reservation),
                entity_id: Some(reservation.id.to_string()),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(reservation_trail.total, 5);
    assert!(reservation_trail
        .entries
        .iter()
        .any(|e| e.action == AuditAction::ReservationCancel));

    let stock_trail = harness
        .store
        .query(
            &AuditFilter {
                action: Some(AuditAction::StockEntry),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(stock_trail.total, 1);
    assert_eq!(stock_trail.entries[0].actor, worker);
}

#[tokio::test]
async fn reservation_listing_filters_by_status_user_and_assignee() {
    let harness = setup();
    let part_a = seed_part(&harness.store, "REF-129").await;
    let part_b = seed_part(&harness.store, "REF-130").await;
    let requester = UserId::new();
    let worker = UserId::new();

    let first = harness
        .reservations
        .create(requester, part_a.id, None)
        .await
        .unwrap();
    harness
        .reservations
        .create(UserId::new(), part_b.id, None)
        .await
        .unwrap();
    harness.reservations.assign(first.id, worker).await.unwrap();

    let pending = harness.reservations.pending().await.unwrap();
    assert_eq!(pending.len(), 1);

    let mine = harness
        .reservations
        .list(&ReservationFilter {
            user_id: Some(requester),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, first.id);

    let workload = harness.reservations.assigned_to(worker).await.unwrap();
    assert_eq!(workload.len(), 1);
    assert_eq!(workload[0].status, ReservationStatus::InPreparation);
}

#[tokio::test]
async fn unique_references_and_full_codes_are_enforced() {
    let harness = setup();
    seed_part(&harness.store, "REF-131").await;

    let duplicate = Part::new(
        PartId::new(),
        PartRef::new("REF-131").unwrap(),
        "Clone",
        CategoryId::new(),
        100,
        PartCondition::New,
        Utc::now(),
    )
    .unwrap();
    let err = harness.store.insert_part(&duplicate).await.unwrap_err();
    assert_eq!(
        domain_err(err),
        DomainError::conflict("Part reference already exists")
    );

    seed_location(&harness.store, "D", "1", 2).await;
    let twin = Location::new(
        LocationId::new(),
        WarehouseId::new(),
        "WH1",
        "D",
        "1",
        None,
        2,
    )
    .unwrap();
    let err = harness.store.insert_location(&twin).await.unwrap_err();
    assert_eq!(
        domain_err(err),
        DomainError::conflict("Location fullCode already exists")
    );
}
