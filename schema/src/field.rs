//! Field codec definitions.

use crate::FieldId;

/// Fixed-point quantization parameters (all integer-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FixedPoint {
    /// Minimum quantized value.
    pub min_q: i64,
    /// Maximum quantized value.
    pub max_q: i64,
    /// Units per 1.0 (e.g., 100 => 0.01 resolution).
    pub scale: u32,
}

impl FixedPoint {
    /// Creates a fixed-point configuration from quantized bounds and scale.
    #[must_use]
    pub const fn new(min_q: i64, max_q: i64, scale: u32) -> Self {
        Self {
            min_q,
            max_q,
            scale,
        }
    }

    /// Number of bits needed to carry an offset from `min_q`.
    #[must_use]
    pub const fn offset_bits(&self) -> u8 {
        let range = self.max_q.abs_diff(self.min_q);
        if range == 0 {
            0
        } else {
            (64 - range.leading_zeros()) as u8
        }
    }

    /// The in-range value closest to zero.
    #[must_use]
    pub const fn zero_q(&self) -> i64 {
        if self.min_q > 0 {
            self.min_q
        } else if self.max_q < 0 {
            self.max_q
        } else {
            0
        }
    }
}

/// The encoding for a field (representation only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "kind", rename_all = "snake_case")
)]
pub enum FieldCodec {
    /// Boolean (1 bit).
    Bool,

    /// Unsigned integer with fixed bit width.
    #[cfg_attr(feature = "serde", serde(rename = "uint"))]
    UInt { bits: u8 },

    /// Signed integer with fixed bit width (two's complement).
    #[cfg_attr(feature = "serde", serde(rename = "sint"))]
    SInt { bits: u8 },

    /// Variable-length unsigned integer.
    #[cfg_attr(feature = "serde", serde(rename = "var_uint"))]
    VarUInt,

    /// Variable-length signed integer (zigzag encoded).
    #[cfg_attr(feature = "serde", serde(rename = "var_sint"))]
    VarSInt,

    /// Fixed-point number with quantization.
    FixedPoint(FixedPoint),
}

impl FieldCodec {
    #[must_use]
    pub const fn bool() -> Self {
        Self::Bool
    }

    #[must_use]
    pub const fn uint(bits: u8) -> Self {
        Self::UInt { bits }
    }

    #[must_use]
    pub const fn sint(bits: u8) -> Self {
        Self::SInt { bits }
    }

    #[must_use]
    pub const fn var_uint() -> Self {
        Self::VarUInt
    }

    #[must_use]
    pub const fn var_sint() -> Self {
        Self::VarSInt
    }

    #[must_use]
    pub const fn fixed_point(min_q: i64, max_q: i64, scale: u32) -> Self {
        Self::FixedPoint(FixedPoint::new(min_q, max_q, scale))
    }

    /// Short name used in diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::UInt { .. } => "uint",
            Self::SInt { .. } => "sint",
            Self::VarUInt => "varuint",
            Self::VarSInt => "varsint",
            Self::FixedPoint(_) => "fixed-point",
        }
    }
}

/// Field definition within a class.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldDef {
    pub id: FieldId,
    pub codec: FieldCodec,
    /// Optional human-readable name for tooling output.
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: Option<String>,
}

impl FieldDef {
    #[must_use]
    pub const fn new(id: FieldId, codec: FieldCodec) -> Self {
        Self {
            id,
            codec,
            name: None,
        }
    }

    /// Attaches a display name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}
