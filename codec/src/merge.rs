//! Per-object header parsing and the old/new merge loop.
//!
//! The body of a packet-entities message is a sequence of per-object headers
//! with strictly increasing indices, each followed by its payload, then the
//! explicit deletion run. The merge loop walks those headers alongside the
//! transmitted set of the referenced frame and classifies every index it
//! meets as one of the four [`UpdateKind`]s.

use bitstream::BitReader;
use wire::{Limits, PacketEntitiesHeader};

use crate::error::{CodecResult, MalformedStream, SequenceViolation};
use crate::history::Frame;
use crate::types::EntityIndex;

/// Classification of one object within a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UpdateKind {
    /// Object becomes visible; created or reactivated from a baseline.
    EnterPvs,
    /// Object leaves visibility, optionally deleted outright.
    LeavePvs,
    /// Visible object updated against its live values.
    DeltaEnt,
    /// Object carried over unchanged from the referenced frame.
    PreserveEnt,
}

impl std::fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::EnterPvs => "enter",
            Self::LeavePvs => "leave",
            Self::DeltaEnt => "delta",
            Self::PreserveEnt => "preserve",
        })
    }
}

/// Flags carried by a per-object header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderFlags {
    /// `0, 0`: update in place.
    Delta,
    /// `0, 1`: enter visibility.
    Enter,
    /// `1, force_delete`: leave visibility.
    Leave { force_delete: bool },
}

/// One decoded per-object header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityHeader {
    pub index: EntityIndex,
    pub flags: HeaderFlags,
}

/// Reads per-object headers, tracking the running index base.
#[derive(Debug)]
pub(crate) struct HeaderParser {
    base: Option<u32>,
    remaining: u32,
    max_objects: usize,
}

impl HeaderParser {
    pub(crate) const fn new(count: u32, max_objects: usize) -> Self {
        Self {
            base: None,
            remaining: count,
            max_objects,
        }
    }

    /// Reads the next header, or `None` once the announced count is exhausted.
    pub(crate) fn next(&mut self, body: &mut BitReader<'_>) -> CodecResult<Option<EntityHeader>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;

        let start = self.base.map_or(0, |base| u64::from(base) + 1);
        let index = start + u64::from(body.read_ubitvar()?);
        if index >= self.max_objects as u64 {
            return Err(MalformedStream::IndexOutOfRange {
                index,
                limit: self.max_objects,
            }
            .into());
        }
        let index = index as u32;
        self.base = Some(index);

        let flags = if body.read_bit()? {
            HeaderFlags::Leave {
                force_delete: body.read_bit()?,
            }
        } else if body.read_bit()? {
            HeaderFlags::Enter
        } else {
            HeaderFlags::Delta
        };

        Ok(Some(EntityHeader {
            index: EntityIndex::new(index),
            flags,
        }))
    }
}

/// Receives each classified object from [`read_packet_entities`].
///
/// `enter_pvs` and `delta_ent` must consume the object's property payload
/// from `body`.
pub trait DecoderStrategy {
    /// An object entering visibility, with class, serial and properties.
    fn enter_pvs(&mut self, index: EntityIndex, body: &mut BitReader<'_>) -> CodecResult<()>;

    /// An object leaving visibility; `force_delete` asks for destruction.
    fn leave_pvs(&mut self, index: EntityIndex, force_delete: bool) -> CodecResult<()>;

    /// A property update for an object that stays visible.
    fn delta_ent(&mut self, index: EntityIndex, body: &mut BitReader<'_>) -> CodecResult<()>;

    /// A prior-frame object not mentioned by this message.
    fn preserve_ent(&mut self, index: EntityIndex) -> CodecResult<()>;

    /// An entry of the trailing deletion run.
    fn explicit_delete(&mut self, index: EntityIndex) -> CodecResult<()>;
}

/// Walks a message body, dispatching each object to `strategy`.
///
/// `prior` is the referenced frame of a delta and `None` for a full update.
pub fn read_packet_entities<S>(
    body: &mut BitReader<'_>,
    header: &PacketEntitiesHeader,
    prior: Option<&Frame>,
    limits: &Limits,
    strategy: &mut S,
) -> CodecResult<()>
where
    S: DecoderStrategy + ?Sized,
{
    let max_objects = limits.max_objects();
    let mut headers = HeaderParser::new(header.updated_entries, max_objects);
    let next_old = |from: usize| {
        prior
            .and_then(|frame| frame.transmitted().next_set_bit(from))
            .map(|slot| EntityIndex::new(slot as u32))
    };

    let mut old = next_old(0);
    let mut current = headers.next(body)?;
    loop {
        match current {
            Some(entity) if old.map_or(true, |old| entity.index <= old) => {
                let advance = match entity.flags {
                    HeaderFlags::Enter => {
                        strategy.enter_pvs(entity.index, body)?;
                        old == Some(entity.index)
                    }
                    HeaderFlags::Delta => {
                        strategy.delta_ent(entity.index, body)?;
                        old == Some(entity.index)
                    }
                    HeaderFlags::Leave { force_delete } => {
                        if !header.is_delta() {
                            return Err(SequenceViolation::LeaveOnFullUpdate {
                                index: entity.index,
                            }
                            .into());
                        }
                        strategy.leave_pvs(entity.index, force_delete)?;
                        true
                    }
                };
                if advance {
                    old = old.and_then(|old| next_old(old.slot() + 1));
                }
                current = headers.next(body)?;
            }
            _ => match old {
                Some(index) => {
                    strategy.preserve_ent(index)?;
                    old = next_old(index.slot() + 1);
                }
                None => break,
            },
        }
    }

    while body.read_bit()? {
        let raw = body.read_bits(limits.index_bits)?;
        if raw >= max_objects as u64 {
            return Err(MalformedStream::IndexOutOfRange {
                index: raw,
                limit: max_objects,
            }
            .into());
        }
        strategy.explicit_delete(EntityIndex::new(raw as u32))?;
    }
    Ok(())
}

/// Wraps a strategy and reports each classification to a callback.
///
/// Classifications are reported as they are parsed, so a message rejected
/// later may already have reported some.
#[derive(Debug)]
pub struct ObservingStrategy<S, F> {
    inner: S,
    observe: F,
}

impl<S, F> ObservingStrategy<S, F>
where
    S: DecoderStrategy,
    F: FnMut(UpdateKind, EntityIndex),
{
    pub const fn new(inner: S, observe: F) -> Self {
        Self { inner, observe }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, F> DecoderStrategy for ObservingStrategy<S, F>
where
    S: DecoderStrategy,
    F: FnMut(UpdateKind, EntityIndex),
{
    fn enter_pvs(&mut self, index: EntityIndex, body: &mut BitReader<'_>) -> CodecResult<()> {
        (self.observe)(UpdateKind::EnterPvs, index);
        self.inner.enter_pvs(index, body)
    }

    fn leave_pvs(&mut self, index: EntityIndex, force_delete: bool) -> CodecResult<()> {
        (self.observe)(UpdateKind::LeavePvs, index);
        self.inner.leave_pvs(index, force_delete)
    }

    fn delta_ent(&mut self, index: EntityIndex, body: &mut BitReader<'_>) -> CodecResult<()> {
        (self.observe)(UpdateKind::DeltaEnt, index);
        self.inner.delta_ent(index, body)
    }

    fn preserve_ent(&mut self, index: EntityIndex) -> CodecResult<()> {
        (self.observe)(UpdateKind::PreserveEnt, index);
        self.inner.preserve_ent(index)
    }

    fn explicit_delete(&mut self, index: EntityIndex) -> CodecResult<()> {
        self.inner.explicit_delete(index)
    }
}
