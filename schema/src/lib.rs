//! Networked class and property field definitions for entsync.
//!
//! A [`Schema`] lists every class the server may instantiate on the client.
//! Each class carries an ordered list of typed fields; the field's position
//! in that list is its property index on the wire.
//!
//! - Field codecs (bool, fixed-width integers, varints, fixed-point)
//! - Validated schema construction
//! - Deterministic schema hashing
//!
//! # Design Principles
//!
//! - **Runtime-first** - Schemas are built at runtime or loaded from JSON.
//! - **Explicit schemas** - No reflection on arbitrary Rust types.
//! - **Deterministic hashing** - Schema hash is stable given the same definition.

mod error;
mod field;
mod hash;
mod schema;

pub use error::{SchemaError, SchemaResult};
pub use field::{FieldCodec, FieldDef, FixedPoint};
pub use hash::schema_hash;
pub use schema::{ClassDef, Schema, SchemaBuilder};

/// Identifies a networked class; sent as the class field of an enter-visibility payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ClassId(u16);

impl ClassId {
    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for ClassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// Stable identifier of a field within its class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct FieldId(u16);

impl FieldId {
    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn public_api_exports() {
        let _ = FieldCodec::bool();
        let _ = FieldDef::new(FieldId::new(1), FieldCodec::uint(4));
        let _ = Schema::builder();
        let _: SchemaResult<()> = Ok(());
    }

    #[test]
    fn class_id_display() {
        assert_eq!(ClassId::new(7).to_string(), "class#7");
        assert_eq!(ClassId::new(7).get(), 7);
    }

    #[test]
    fn id_sizes() {
        assert_eq!(size_of::<ClassId>(), 2);
        assert_eq!(size_of::<FieldId>(), 2);
    }
}
