//! Audit trail: immutable entries describing every mutating action.
//!
//! The sink is a **best-effort, at-least-once** surface: entries are written
//! after the primary mutation commits, not atomically with it. Consumers of
//! the trail must treat it as advisory rather than as the source of truth.

pub mod entry;
pub mod sink;

pub use entry::{AuditAction, AuditEntityKind, AuditEntry, AuditFilter, AuditPage, Pagination};
pub use sink::{AuditError, AuditQuery, AuditSink, InMemoryAuditSink};
