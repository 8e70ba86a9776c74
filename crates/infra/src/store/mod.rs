//! Storage seam for the warehouse core.

mod in_memory;
mod postgres;
mod r#trait;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use r#trait::{Placement, ReservationFilter, Store, StoreError, StoreResult};
