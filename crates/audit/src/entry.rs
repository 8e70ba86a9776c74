use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use partflow_core::{AuditEntryId, Entity, UserId};

/// What kind of mutation an audit entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    ReservationCreate,
    ReservationAssign,
    ReservationStatus,
    ReservationCancel,
    StockEntry,
    StockExit,
    StockTransfer,
    StockReturn,
    StockAdjustment,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReservationCreate => "RESERVATION_CREATE",
            Self::ReservationAssign => "RESERVATION_ASSIGN",
            Self::ReservationStatus => "RESERVATION_STATUS",
            Self::ReservationCancel => "RESERVATION_CANCEL",
            Self::StockEntry => "STOCK_ENTRY",
            Self::StockExit => "STOCK_EXIT",
            Self::StockTransfer => "STOCK_TRANSFER",
            Self::StockReturn => "STOCK_RETURN",
            Self::StockAdjustment => "STOCK_ADJUSTMENT",
        }
    }
}

impl core::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for AuditAction {
    type Err = partflow_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RESERVATION_CREATE" => Ok(Self::ReservationCreate),
            "RESERVATION_ASSIGN" => Ok(Self::ReservationAssign),
            "RESERVATION_STATUS" => Ok(Self::ReservationStatus),
            "RESERVATION_CANCEL" => Ok(Self::ReservationCancel),
            "STOCK_ENTRY" => Ok(Self::StockEntry),
            "STOCK_EXIT" => Ok(Self::StockExit),
            "STOCK_TRANSFER" => Ok(Self::StockTransfer),
            "STOCK_RETURN" => Ok(Self::StockReturn),
            "STOCK_ADJUSTMENT" => Ok(Self::StockAdjustment),
            other => Err(partflow_core::DomainError::bad_request(format!(
                "unknown audit action: {other}"
            ))),
        }
    }
}

/// Which entity kind an audit entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEntityKind {
    Reservation,
    Part,
    Location,
}

impl AuditEntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reservation => "RESERVATION",
            Self::Part => "PART",
            Self::Location => "LOCATION",
        }
    }
}

impl core::fmt::Display for AuditEntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for AuditEntityKind {
    type Err = partflow_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RESERVATION" => Ok(Self::Reservation),
            "PART" => Ok(Self::Part),
            "LOCATION" => Ok(Self::Location),
            other => Err(partflow_core::DomainError::bad_request(format!(
                "unknown audit entity: {other}"
            ))),
        }
    }
}

/// One immutable audit-trail row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub actor: UserId,
    pub action: AuditAction,
    pub entity: AuditEntityKind,
    /// Rendered id of the entity the entry refers to.
    pub entity_id: String,
    /// Opaque detail payload (previous/new status, reason, locations, ...).
    pub details: JsonValue,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        actor: UserId,
        action: AuditAction,
        entity: AuditEntityKind,
        entity_id: impl Into<String>,
        details: JsonValue,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AuditEntryId::new(),
            actor,
            action,
            entity,
            entity_id: entity_id.into(),
            details,
            recorded_at,
        }
    }
}

impl Entity for AuditEntry {
    type Id = AuditEntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Filter for querying the trail. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    pub actor: Option<UserId>,
    pub action: Option<AuditAction>,
    pub entity: Option<AuditEntityKind>,
    pub entity_id: Option<String>,
    pub recorded_after: Option<DateTime<Utc>>,
    pub recorded_before: Option<DateTime<Utc>>,
}

impl AuditFilter {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(actor) = self.actor {
            if entry.actor != actor {
                return false;
            }
        }
        if let Some(action) = self.action {
            if entry.action != action {
                return false;
            }
        }
        if let Some(entity) = self.entity {
            if entry.entity != entity {
                return false;
            }
        }
        if let Some(ref entity_id) = self.entity_id {
            if &entry.entity_id != entity_id {
                return false;
            }
        }
        if let Some(after) = self.recorded_after {
            if entry.recorded_at < after {
                return false;
            }
        }
        if let Some(before) = self.recorded_before {
            if entry.recorded_at > before {
                return false;
            }
        }
        true
    }
}

/// Offset pagination for trail queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

/// One page of audit entries, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}
