use serde::{Deserialize, Serialize};

use partflow_core::{DomainError, DomainResult, Entity, LocationId, ValueObject, WarehouseId};

/// Human-readable location code, unique across all warehouses.
///
/// Composed as `WH-RACK-SHELF` or `WH-RACK-SHELF-PALLET`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FullCode(String);

impl FullCode {
    /// Wrap an already-composed code (storage rehydration).
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn compose(
        warehouse_code: &str,
        rack: &str,
        shelf: &str,
        pallet: Option<&str>,
    ) -> Self {
        match pallet {
            Some(pallet) => Self(format!("{warehouse_code}-{rack}-{shelf}-{pallet}")),
            None => Self(format!("{warehouse_code}-{rack}-{shelf}")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for FullCode {}

impl core::fmt::Display for FullCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A storage slot inside a warehouse with a bounded capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub warehouse_id: WarehouseId,
    pub rack: String,
    pub shelf: String,
    pub pallet: Option<String>,
    pub full_code: FullCode,
    pub capacity: u32,
}

impl Location {
    pub fn new(
        id: LocationId,
        warehouse_id: WarehouseId,
        warehouse_code: &str,
        rack: impl Into<String>,
        shelf: impl Into<String>,
        pallet: Option<String>,
        capacity: u32,
    ) -> DomainResult<Self> {
        if capacity == 0 {
            return Err(DomainError::bad_request("capacity must be positive"));
        }
        let rack = rack.into();
        let shelf = shelf.into();
        let full_code = FullCode::compose(warehouse_code, &rack, &shelf, pallet.as_deref());
        Ok(Self {
            id,
            warehouse_id,
            rack,
            shelf,
            pallet,
            full_code,
            capacity,
        })
    }

    /// Change the capacity.
    ///
    /// Lowering below the current occupancy is allowed: existing overflow is
    /// tolerated and only future admissions are blocked.
    pub fn set_capacity(&mut self, capacity: u32) -> DomainResult<()> {
        if capacity == 0 {
            return Err(DomainError::bad_request("capacity must be positive"));
        }
        self.capacity = capacity;
        Ok(())
    }
}

impl Entity for Location {
    type Id = LocationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_code_with_pallet() {
        let code = FullCode::compose("WH1", "A", "3", Some("P2"));
        assert_eq!(code.as_str(), "WH1-A-3-P2");
    }

    #[test]
    fn full_code_without_pallet() {
        let code = FullCode::compose("WH1", "A", "3", None);
        assert_eq!(code.as_str(), "WH1-A-3");
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = Location::new(
            LocationId::new(),
            WarehouseId::new(),
            "WH1",
            "A",
            "1",
            None,
            0,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::BadRequest(_)));
    }

    #[test]
    fn capacity_can_drop_below_previous_value() {
        let mut loc = Location::new(
            LocationId::new(),
            WarehouseId::new(),
            "WH1",
            "A",
            "1",
            None,
            10,
        )
        .unwrap();
        loc.set_capacity(2).unwrap();
        assert_eq!(loc.capacity, 2);
    }
}
