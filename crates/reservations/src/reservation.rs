use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use partflow_core::{DomainError, DomainResult, Entity, LocationId, PartId, ReservationId, UserId};

/// Reservation status lifecycle.
///
/// ```text
/// PENDING        -> IN_PREPARATION | CANCELLED
/// IN_PREPARATION -> READY_TO_SHIP  | CANCELLED
/// READY_TO_SHIP  -> COMPLETED      | CANCELLED
/// COMPLETED      -> CONFIRMED      | CANCELLED
/// CONFIRMED      -> (terminal)
/// CANCELLED      -> (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    InPreparation,
    ReadyToShip,
    Completed,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    /// Whether the transition table allows moving from `self` to `next`.
    ///
    /// Requesting the current status again is never legal: a status is not
    /// its own successor.
    pub fn can_transition_to(self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (Pending, InPreparation)
                | (Pending, Cancelled)
                | (InPreparation, ReadyToShip)
                | (InPreparation, Cancelled)
                | (ReadyToShip, Completed)
                | (ReadyToShip, Cancelled)
                | (Completed, Confirmed)
                | (Completed, Cancelled)
        )
    }

    /// Legal successors of this status.
    pub fn successors(self) -> &'static [ReservationStatus] {
        use ReservationStatus::*;
        match self {
            Pending => &[InPreparation, Cancelled],
            InPreparation => &[ReadyToShip, Cancelled],
            ReadyToShip => &[Completed, Cancelled],
            Completed => &[Confirmed, Cancelled],
            Confirmed | Cancelled => &[],
        }
    }

    /// Whether a reservation in this status blocks new reservations on the
    /// same part.
    ///
    /// COMPLETED is deliberately absent: a delivered-but-unconfirmed part can
    /// receive a new reservation (observed behavior, preserved pending
    /// product clarification).
    pub fn is_active(self) -> bool {
        use ReservationStatus::*;
        matches!(self, Pending | Confirmed | InPreparation | ReadyToShip)
    }

    /// CONFIRMED and CANCELLED admit no further transitions.
    pub fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InPreparation => "IN_PREPARATION",
            Self::ReadyToShip => "READY_TO_SHIP",
            Self::Completed => "COMPLETED",
            Self::Confirmed => "CONFIRMED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub const ALL: [ReservationStatus; 6] = [
        Self::Pending,
        Self::InPreparation,
        Self::ReadyToShip,
        Self::Completed,
        Self::Confirmed,
        Self::Cancelled,
    ];
}

impl core::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ReservationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "IN_PREPARATION" => Ok(Self::InPreparation),
            "READY_TO_SHIP" => Ok(Self::ReadyToShip),
            "COMPLETED" => Ok(Self::Completed),
            "CONFIRMED" => Ok(Self::Confirmed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(DomainError::bad_request(format!(
                "unknown reservation status: {other}"
            ))),
        }
    }
}

/// Why a reservation was cancelled.
///
/// Legality depends on whether the part was already delivered: DESIST is the
/// only reason before COMPLETED, RETURN/DAMAGED_RETURN the only reasons after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelReason {
    /// Requester gave up before the part left the warehouse.
    Desist,
    /// Delivered part comes back to a chosen location.
    Return,
    /// Delivered part comes back damaged and is quarantined.
    DamagedReturn,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Desist => "DESIST",
            Self::Return => "RETURN",
            Self::DamagedReturn => "DAMAGED_RETURN",
        }
    }
}

impl core::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for CancelReason {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DESIST" => Ok(Self::Desist),
            "RETURN" => Ok(Self::Return),
            "DAMAGED_RETURN" => Ok(Self::DamagedReturn),
            other => Err(DomainError::bad_request(format!(
                "unknown cancel reason: {other}"
            ))),
        }
    }
}

/// Ledger side effect a lifecycle decision asks the orchestrator to execute.
///
/// The decision methods stay pure: they validate, mutate the reservation, and
/// describe what the stock-movement ledger must record alongside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEffect {
    /// No movement to record.
    None,
    /// Part leaves the warehouse (transition into COMPLETED).
    Exit,
    /// Undamaged return: the part re-enters stock at the chosen location.
    Restock(LocationId),
    /// Damaged return: the part is quarantined instead of re-admitted.
    Quarantine,
}

/// A reservation of one part by one requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    /// Requester.
    pub user_id: UserId,
    pub part_id: PartId,
    /// Warehouse worker who claimed the preparation, set exactly once.
    pub assigned_to_id: Option<UserId>,
    pub status: ReservationStatus,
    pub notes: Option<String>,
    pub cancel_reason: Option<CancelReason>,
    pub return_location_id: Option<LocationId>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Create a new reservation in PENDING.
    ///
    /// The single-active-reservation-per-part precondition is checked by the
    /// storage layer atomically with the insert.
    pub fn create(
        id: ReservationId,
        user_id: UserId,
        part_id: PartId,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            part_id,
            assigned_to_id: None,
            status: ReservationStatus::Pending,
            notes,
            cancel_reason: None,
            return_location_id: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Claim the preparation of a PENDING reservation.
    ///
    /// First writer wins; the storage layer runs this as a compare-and-set so
    /// concurrent claims cannot both succeed.
    pub fn assign(&mut self, assignee: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        if self.assigned_to_id.is_some() {
            return Err(DomainError::conflict("Reservation already assigned"));
        }
        if self.status != ReservationStatus::Pending {
            return Err(DomainError::bad_request(
                "Only PENDING reservations can be assigned",
            ));
        }
        self.assigned_to_id = Some(assignee);
        self.status = ReservationStatus::InPreparation;
        self.updated_at = now;
        Ok(())
    }

    /// Move to `next` according to the transition table.
    ///
    /// Once assigned, only the assignee may advance the reservation; anyone
    /// may still cancel it (intentional asymmetry, preserved).
    pub fn transition(
        &mut self,
        next: ReservationStatus,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<LedgerEffect> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::bad_request(format!(
                "Cannot transition from {} to {}",
                self.status, next
            )));
        }

        if let Some(assignee) = self.assigned_to_id {
            if assignee != actor && next != ReservationStatus::Cancelled {
                return Err(DomainError::forbidden(
                    "Only the assigned user can update this reservation",
                ));
            }
        }

        self.status = next;
        self.updated_at = now;

        let effect = if next == ReservationStatus::Completed {
            LedgerEffect::Exit
        } else {
            LedgerEffect::None
        };
        Ok(effect)
    }

    /// Cancel with a reason, validating reason legality against delivery.
    ///
    /// Only cancellations after COMPLETED touch the ledger: the part already
    /// left the warehouse and has to be brought back (or quarantined).
    pub fn cancel(
        &mut self,
        reason: CancelReason,
        return_location_id: Option<LocationId>,
        now: DateTime<Utc>,
    ) -> DomainResult<LedgerEffect> {
        match self.status {
            ReservationStatus::Confirmed => {
                return Err(DomainError::forbidden("Cannot cancel a confirmed reservation"));
            }
            ReservationStatus::Cancelled => {
                return Err(DomainError::conflict("Reservation already cancelled"));
            }
            _ => {}
        }

        let was_completed = self.status == ReservationStatus::Completed;

        let effect = if was_completed {
            match reason {
                CancelReason::Desist => {
                    return Err(DomainError::bad_request(
                        "Cannot use DESIST reason after part was delivered",
                    ));
                }
                CancelReason::Return => {
                    let Some(to) = return_location_id else {
                        return Err(DomainError::bad_request(
                            "returnLocationId is required for RETURN",
                        ));
                    };
                    LedgerEffect::Restock(to)
                }
                CancelReason::DamagedReturn => LedgerEffect::Quarantine,
            }
        } else {
            if reason != CancelReason::Desist {
                return Err(DomainError::bad_request(
                    "Use DESIST reason before part is delivered",
                ));
            }
            LedgerEffect::None
        };

        self.status = ReservationStatus::Cancelled;
        self.cancel_reason = Some(reason);
        self.cancelled_at = Some(now);
        self.return_location_id = if reason == CancelReason::Return {
            return_location_id
        } else {
            None
        };
        self.updated_at = now;

        Ok(effect)
    }
}

impl Entity for Reservation {
    type Id = ReservationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
