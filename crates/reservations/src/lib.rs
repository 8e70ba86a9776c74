//! Reservation lifecycle domain module.
//!
//! Pure decision logic for the reservation state machine: validation and
//! transition rules live here, while storage and ledger side effects are
//! executed by the orchestrating service layer.

pub mod reservation;

pub use reservation::{
    CancelReason, LedgerEffect, Reservation, ReservationStatus,
};
