use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use partflow_core::{Entity, LocationId, MovementId, PartId, UserId};

/// Kind of physical relocation recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    /// Part enters the warehouse (creation or restocking).
    Entry,
    /// Part leaves the warehouse (reservation completed).
    Exit,
    /// Part moves between two locations.
    Transfer,
    /// Part comes back after a cancelled delivery.
    Return,
    /// Administrative correction of the current location.
    Adjustment,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "ENTRY",
            Self::Exit => "EXIT",
            Self::Transfer => "TRANSFER",
            Self::Return => "RETURN",
            Self::Adjustment => "ADJUSTMENT",
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MovementType {
    type Err = partflow_core::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENTRY" => Ok(Self::Entry),
            "EXIT" => Ok(Self::Exit),
            "TRANSFER" => Ok(Self::Transfer),
            "RETURN" => Ok(Self::Return),
            "ADJUSTMENT" => Ok(Self::Adjustment),
            other => Err(partflow_core::DomainError::bad_request(format!(
                "unknown movement type: {other}"
            ))),
        }
    }
}

/// One row of the append-only stock-movement ledger.
///
/// Immutable once written. The source/destination shape is fixed per type and
/// encoded by the constructors: ENTRY has only a destination, EXIT only a
/// source, TRANSFER both, RETURN an optional destination (none when the part
/// is quarantined), ADJUSTMENT whatever the correction says.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub part_id: PartId,
    pub actor: UserId,
    pub movement_type: MovementType,
    pub source: Option<LocationId>,
    pub destination: Option<LocationId>,
    pub recorded_at: DateTime<Utc>,
}

impl StockMovement {
    pub fn entry(
        part_id: PartId,
        actor: UserId,
        destination: LocationId,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MovementId::new(),
            part_id,
            actor,
            movement_type: MovementType::Entry,
            source: None,
            destination: Some(destination),
            recorded_at,
        }
    }

    pub fn exit(
        part_id: PartId,
        actor: UserId,
        source: Option<LocationId>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MovementId::new(),
            part_id,
            actor,
            movement_type: MovementType::Exit,
            source,
            destination: None,
            recorded_at,
        }
    }

    pub fn transfer(
        part_id: PartId,
        actor: UserId,
        source: LocationId,
        destination: LocationId,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MovementId::new(),
            part_id,
            actor,
            movement_type: MovementType::Transfer,
            source: Some(source),
            destination: Some(destination),
            recorded_at,
        }
    }

    pub fn part_return(
        part_id: PartId,
        actor: UserId,
        destination: Option<LocationId>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MovementId::new(),
            part_id,
            actor,
            movement_type: MovementType::Return,
            source: None,
            destination,
            recorded_at,
        }
    }

    pub fn adjustment(
        part_id: PartId,
        actor: UserId,
        source: Option<LocationId>,
        destination: Option<LocationId>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MovementId::new(),
            part_id,
            actor,
            movement_type: MovementType::Adjustment,
            source,
            destination,
            recorded_at,
        }
    }
}

impl Entity for StockMovement {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
