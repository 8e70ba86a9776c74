use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use partflow_core::{CategoryId, DomainError, DomainResult, Entity, LocationId, PartId, ValueObject};

/// Unique business reference of a part (e.g. "REF-00042").
///
/// Distinct from the surrogate [`PartId`]: the reference is what warehouse
/// staff read off the label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartRef(String);

impl PartRef {
    pub fn new(reference: impl Into<String>) -> DomainResult<Self> {
        let reference = reference.into();
        if reference.trim().is_empty() {
            return Err(DomainError::bad_request("part reference cannot be empty"));
        }
        Ok(Self(reference))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for PartRef {}

impl core::fmt::Display for PartRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Physical condition of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartCondition {
    New,
    Used,
    Refurbished,
    Damaged,
}

impl PartCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Used => "USED",
            Self::Refurbished => "REFURBISHED",
            Self::Damaged => "DAMAGED",
        }
    }
}

impl core::fmt::Display for PartCondition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for PartCondition {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(Self::New),
            "USED" => Ok(Self::Used),
            "REFURBISHED" => Ok(Self::Refurbished),
            "DAMAGED" => Ok(Self::Damaged),
            other => Err(DomainError::bad_request(format!(
                "unknown part condition: {other}"
            ))),
        }
    }
}

/// A physical part tracked through the warehouse.
///
/// `location_id` is the materialized current-location projection; the
/// stock-movement ledger is the source of truth it is derived from. Lifecycle
/// changes (placing, vacating, quarantining) go through the methods below so
/// the projection fields stay coherent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub id: PartId,
    pub reference: PartRef,
    pub name: String,
    pub category_id: CategoryId,
    /// Price in smallest currency unit (e.g., cents).
    pub price_cents: u64,
    pub condition: PartCondition,
    pub is_visible: bool,
    pub location_id: Option<LocationId>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Part {
    pub fn new(
        id: PartId,
        reference: PartRef,
        name: impl Into<String>,
        category_id: CategoryId,
        price_cents: u64,
        condition: PartCondition,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::bad_request("part name cannot be empty"));
        }
        Ok(Self {
            id,
            reference,
            name,
            category_id,
            price_cents,
            condition,
            is_visible: true,
            location_id: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_in_stock(&self) -> bool {
        self.location_id.is_some()
    }

    /// Place the part at a location (admission is the storage layer's job).
    pub fn place_at(&mut self, location_id: LocationId, now: DateTime<Utc>) {
        self.location_id = Some(location_id);
        self.updated_at = now;
    }

    /// Remove the part from its current location (shipping out, adjustment).
    pub fn vacate(&mut self, now: DateTime<Utc>) {
        self.location_id = None;
        self.updated_at = now;
    }

    /// Quarantine a damaged return: no location, hidden from catalog views.
    pub fn quarantine(&mut self, now: DateTime<Utc>) {
        self.condition = PartCondition::Damaged;
        self.is_visible = false;
        self.location_id = None;
        self.updated_at = now;
    }

    pub fn soft_delete(&mut self, now: DateTime<Utc>) {
        self.deleted_at = Some(now);
        self.updated_at = now;
    }
}

impl Entity for Part {
    type Id = PartId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
