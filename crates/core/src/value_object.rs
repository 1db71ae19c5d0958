//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values;
/// identity does not matter. `Money` is the canonical example in this
/// workspace: two amounts of €12.50 are the same value regardless of where
/// they came from, whereas two members with the same name are still two
/// different members (entities).
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
