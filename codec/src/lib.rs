//! Client-side packet-entity decoding for entsync.
//!
//! This crate ties together bitstream, wire, and schema to turn a stream of
//! packet-entities messages into object lifecycle calls on the host.
//!
//! # Features
//!
//! - Enter/leave/delta/preserve classification merged against the referenced frame
//! - Two-sided baseline store with promotion and reliable acknowledgement
//! - Bounded frame history for delta references
//! - Implicit removal of objects that silently drop out of a frame
//! - Schema-driven property deltas
//!
//! # Design Principles
//!
//! - **Reject whole messages** - A malformed or out-of-sequence message leaves
//!   the decoder untouched.
//! - **Host owns objects** - The decoder only drives an [`ObjectSystem`].
//! - **Deterministic** - Same message sequence produces the same calls.

mod alive;
mod baseline;
mod bitset;
mod builder;
mod cache;
mod config;
mod decoder;
mod error;
mod history;
mod merge;
mod property;
mod types;

pub use alive::AliveTracker;
pub use baseline::{Baseline, BaselineStore};
pub use bitset::EntityBitSet;
pub use builder::{BuildError, MessageBuilder};
pub use cache::{CacheEntry, ObjectCache};
pub use config::DecoderConfig;
pub use decoder::{AckSink, EntityDecoder, ObjectSystem};
pub use error::{
    CodecResult, LifecycleOp, MalformedStream, ObjectError, ProtocolError, SequenceViolation,
    ValueReason,
};
pub use history::{Frame, FrameEntity, FrameHistory, HistoryError};
pub use merge::{read_packet_entities, DecoderStrategy, ObservingStrategy, UpdateKind};
pub use property::{
    ChangedFields, FieldValue, PropertyCodec, PropertyDelta, PropertySource, PropertyState,
    SchemaPropertyCodec,
};
pub use types::{EntityIndex, SerialNumber, SnapshotTick};
pub use wire::{BaselineAck, BaselineSide, Limits as WireLimits};
