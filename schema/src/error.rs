//! Schema validation errors.

use crate::{ClassId, FieldId};

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors that can occur when building or validating a schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// Duplicate class ID in a schema.
    #[error("duplicate {id}")]
    DuplicateClassId { id: ClassId },

    /// Duplicate field ID within a class.
    #[error("duplicate field {} in {class}", field.get())]
    DuplicateFieldId { class: ClassId, field: FieldId },

    /// Invalid bit width for fixed-width integers.
    #[error("invalid bit width {bits} for field {} in {class}", field.get())]
    InvalidBitWidth {
        class: ClassId,
        field: FieldId,
        bits: u8,
    },

    /// Fixed-point scale must be non-zero.
    #[error("fixed-point scale must be non-zero (field {} in {class})", field.get())]
    InvalidFixedPointScale { class: ClassId, field: FieldId },

    /// Fixed-point min/max range is invalid.
    #[error("fixed-point range {min_q}..={max_q} is empty")]
    InvalidFixedPointRange { min_q: i64, max_q: i64 },
}
