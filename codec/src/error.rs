//! Error types for packet-entity decoding.

use schema::{ClassId, FieldId};

use crate::types::{EntityIndex, SnapshotTick};

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, ProtocolError>;

/// Why a packet-entities message was rejected.
///
/// Any error aborts the whole message; no frame is published for it. For
/// [`ProtocolError::Malformed`] and [`ProtocolError::Sequence`] the decoder
/// state is untouched and the caller should request a full update.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed stream: {0}")]
    Malformed(#[from] MalformedStream),

    #[error("sequence violation: {0}")]
    Sequence(#[from] SequenceViolation),

    /// The object system failed; effects applied before the failure remain.
    #[error("object system failed to {operation} object {index}")]
    Collaborator {
        operation: LifecycleOp,
        index: EntityIndex,
        #[source]
        source: ObjectError,
    },
}

impl From<bitstream::BitError> for ProtocolError {
    fn from(err: bitstream::BitError) -> Self {
        Self::Malformed(MalformedStream::Bitstream(err))
    }
}

impl From<wire::DecodeError> for ProtocolError {
    fn from(err: wire::DecodeError) -> Self {
        Self::Malformed(MalformedStream::Wire(err))
    }
}

/// The bits cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedStream {
    #[error(transparent)]
    Wire(wire::DecodeError),

    #[error(transparent)]
    Bitstream(bitstream::BitError),

    #[error("object index {index} outside {limit} slots")]
    IndexOutOfRange { index: u64, limit: usize },

    #[error("unknown {class}")]
    UnknownClass { class: ClassId },

    #[error("no default baseline registered for {class}")]
    MissingDefaultBaseline { class: ClassId },

    #[error("delta for object {index} which has no live object")]
    DeltaWithoutObject { index: EntityIndex },

    #[error("preserve for object {index} which has no cached object")]
    PreserveWithoutObject { index: EntityIndex },

    #[error("property index {index} out of range for {class} ({field_count} fields)")]
    InvalidFieldIndex {
        class: ClassId,
        index: usize,
        field_count: usize,
    },

    #[error("property state for {class} has {actual} fields, expected {expected}")]
    StateShapeMismatch {
        class: ClassId,
        expected: usize,
        actual: usize,
    },

    #[error("invalid value for field {} of {class}: {reason}", field.get())]
    InvalidValue {
        class: ClassId,
        field: FieldId,
        reason: ValueReason,
    },

    #[error("body declared {declared} bits but {unread} bits were left unread")]
    BodyLengthMismatch { declared: usize, unread: usize },
}

/// The message does not fit the frame sequence seen so far.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SequenceViolation {
    #[error("referenced tick {tick} is not in the frame history")]
    UnknownReferencedTick { tick: SnapshotTick },

    #[error("tick {tick} is not newer than the last committed tick {last}")]
    StaleTick {
        tick: SnapshotTick,
        last: SnapshotTick,
    },

    #[error("object {index} transmitted after {highest}")]
    NonMonotonicIndex {
        index: EntityIndex,
        highest: EntityIndex,
    },

    #[error("preserve of object {index} in a full update")]
    PreserveOnFullUpdate { index: EntityIndex },

    #[error("leave of object {index} in a full update")]
    LeaveOnFullUpdate { index: EntityIndex },
}

/// Details for invalid value errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValueReason {
    #[error("{value} does not fit in {bits} unsigned bits")]
    UnsignedOutOfRange { bits: u8, value: u64 },

    #[error("{value} does not fit in {bits} signed bits")]
    SignedOutOfRange { bits: u8, value: i64 },

    #[error("varuint {value} exceeds u32")]
    VarUIntOutOfRange { value: u64 },

    #[error("varsint {value} exceeds i32")]
    VarSIntOutOfRange { value: i64 },

    #[error("{value} outside fixed-point range {min_q}..={max_q}")]
    FixedPointOutOfRange { min_q: i64, max_q: i64, value: i64 },

    #[error("expected {expected} value, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

/// Object-system call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOp {
    Create,
    Destroy,
}

impl std::fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Destroy => "destroy",
        })
    }
}

/// Failure reported by an [`ObjectSystem`](crate::ObjectSystem).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ObjectError {
    message: String,
}

impl ObjectError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
