//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**: two with the
/// same attributes are the same value. Entities, by contrast, are the same
/// only when their identifiers match.
///
/// The bounds keep value objects cheap to copy, comparable, and debuggable:
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct FullCode(String);
///
/// impl ValueObject for FullCode {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
