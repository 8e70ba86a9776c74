//! Audit sink and query seams.
//!
//! Writes to the sink happen **after** the primary mutation commits and are
//! not atomic with it. Delivery is at-least-once: a retried operation may
//! record a duplicate entry, and a crash between commit and record loses one.
//! Callers that need a stronger guarantee must place both writes in one
//! transaction themselves.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

use partflow_core::AuditEntryId;

use crate::entry::{AuditEntry, AuditFilter, AuditPage, Pagination};

/// Audit sink operation error.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink failure: {0}")]
    Sink(String),
}

/// Append-only sink for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError>;
}

#[async_trait]
impl<S> AuditSink for Arc<S>
where
    S: AuditSink + ?Sized,
{
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        (**self).record(entry).await
    }
}

/// Read surface over the recorded trail.
#[async_trait]
pub trait AuditQuery: Send + Sync {
    /// Query entries matching `filter`, newest first.
    async fn query(&self, filter: &AuditFilter, page: Pagination) -> Result<AuditPage, AuditError>;

    async fn entry(&self, id: AuditEntryId) -> Result<Option<AuditEntry>, AuditError>;
}

#[async_trait]
impl<Q> AuditQuery for Arc<Q>
where
    Q: AuditQuery + ?Sized,
{
    async fn query(&self, filter: &AuditFilter, page: Pagination) -> Result<AuditPage, AuditError> {
        (**self).query(filter, page).await
    }

    async fn entry(&self, id: AuditEntryId) -> Result<Option<AuditEntry>, AuditError> {
        (**self).entry(id).await
    }
}

/// In-memory sink for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<(), AuditError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| AuditError::Sink("lock poisoned".to_string()))?;
        entries.push(entry);
        Ok(())
    }
}

#[async_trait]
impl AuditQuery for InMemoryAuditSink {
    async fn query(&self, filter: &AuditFilter, page: Pagination) -> Result<AuditPage, AuditError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| AuditError::Sink("lock poisoned".to_string()))?;

        let mut matching: Vec<AuditEntry> =
            entries.iter().filter(|e| filter.matches(e)).cloned().collect();
        matching.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));

        let total = matching.len() as u64;
        let selected: Vec<AuditEntry> = matching
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect();
        let has_more = total > u64::from(page.offset) + u64::from(page.limit);

        Ok(AuditPage {
            entries: selected,
            total,
            pagination: page,
            has_more,
        })
    }

    async fn entry(&self, id: AuditEntryId) -> Result<Option<AuditEntry>, AuditError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| AuditError::Sink("lock poisoned".to_string()))?;
        Ok(entries.iter().find(|e| e.id == id).cloned())
    }
}
