//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values; two value
/// objects with the same values are the same value (`LeadNumber`, a stage
/// snapshot, a money amount). Entities, by contrast, are the same only when
/// their identifiers match.
///
/// To "modify" a value object, construct a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
