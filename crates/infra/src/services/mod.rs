//! Orchestrating services over the store and audit seams.
//!
//! Services keep the pipeline consistent for every operation: load state,
//! run the pure domain decision, commit through one transactional store
//! primitive, then record a best-effort audit entry.

pub mod admission;
pub mod reservations;
pub mod stock_movements;

pub use reservations::ReservationService;
pub use stock_movements::{ReturnParams, StockMovementService};
