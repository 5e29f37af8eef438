//! Packet-entities message layout for the entsync decoder.
//!
//! This crate handles the bit-exact framing of the world-state update message
//! and of the reliable baseline acknowledgement the client sends back. It does
//! not know about entity lifecycles or property values, only about where the
//! fields sit in the bit stream.
//!
//! # Design Principles
//!
//! - **Stable wire format** - Field order and widths match the legacy engine stream.
//! - **Bounded decoding** - Counts and lengths are validated against [`Limits`]
//!   before the body is touched.
//! - **No domain knowledge** - Framing only; classification lives in `codec`.

mod ack;
mod error;
mod header;
mod limits;

pub use ack::{decode_baseline_ack, encode_baseline_ack, BaselineAck, BASELINE_ACK_BITS};
pub use error::{DecodeError, EncodeError, WireResult};
pub use header::{
    decode_packet_entities_header, encode_packet_entities_header, BaselineSide,
    PacketEntitiesHeader, TICK_BITS,
};
pub use limits::Limits;
