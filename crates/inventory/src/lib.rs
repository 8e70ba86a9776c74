//! Inventory domain module: parts, locations, and the stock-movement ledger
//! row types, plus the pure capacity-admission rule.
//!
//! This crate contains business rules only (no IO, no HTTP, no storage).

pub mod admission;
pub mod location;
pub mod movement;
pub mod part;

pub use admission::{admit, CapacityReport};
pub use location::{FullCode, Location};
pub use movement::{MovementType, StockMovement};
pub use part::{Part, PartCondition, PartRef};
