//! The packet-entities decoder and its collaborators.
//!
//! Processing runs in two phases. Staging parses the message and decodes
//! every property delta without touching decoder or object state. Applying
//! then drives the object system, promotes baselines and commits the frame.
//! A message that fails to stage leaves everything as it was.

use bitstream::BitReader;
use schema::ClassId;
use tracing::{debug, info, trace, warn};
use wire::{decode_packet_entities_header, BaselineAck, BaselineSide, Limits, PacketEntitiesHeader};

use crate::alive::AliveTracker;
use crate::baseline::{Baseline, BaselineStore};
use crate::cache::{CacheEntry, ObjectCache};
use crate::config::DecoderConfig;
use crate::error::{
    CodecResult, LifecycleOp, MalformedStream, ObjectError, ProtocolError, SequenceViolation,
};
use crate::history::{Frame, FrameBuilder, FrameEntity, FrameHistory};
use crate::merge::{read_packet_entities, DecoderStrategy, ObservingStrategy, UpdateKind};
use crate::property::{ChangedFields, PropertyCodec, PropertySource, PropertyState, SchemaPropertyCodec};
use crate::types::{EntityIndex, SerialNumber, SnapshotTick};

/// The host's object lifecycle.
///
/// Handles are owned by the object system; the decoder keeps them only to
/// address later calls and hands each one back exactly once via `destroy`.
pub trait ObjectSystem {
    type Handle;

    fn create(
        &mut self,
        index: EntityIndex,
        serial: SerialNumber,
        class: ClassId,
    ) -> Result<Self::Handle, ObjectError>;

    fn destroy(&mut self, handle: Self::Handle) -> Result<(), ObjectError>;

    /// Called with `true` after creation or reactivation, `false` when the
    /// object leaves visibility without being deleted.
    fn notify_visibility(&mut self, handle: &Self::Handle, entered: bool);

    /// Current property values of a live object.
    fn properties(&self, handle: &Self::Handle) -> Option<&PropertyState>;

    /// Replaces the object's properties; `changed` lists the indices the
    /// message carried.
    fn apply_properties(&mut self, handle: &Self::Handle, state: PropertyState, changed: &[usize]);
}

/// Reliable channel back to the server.
pub trait AckSink {
    /// Queues an acknowledgement; delivery is the transport's concern.
    fn send_reliable(&mut self, ack: BaselineAck);
}

impl AckSink for Vec<BaselineAck> {
    fn send_reliable(&mut self, ack: BaselineAck) {
        self.push(ack);
    }
}

#[derive(Debug)]
enum StagedOp {
    Enter {
        index: EntityIndex,
        class: ClassId,
        serial: SerialNumber,
        state: PropertyState,
        changed: ChangedFields,
    },
    Delta {
        index: EntityIndex,
        state: PropertyState,
        changed: ChangedFields,
    },
    Preserve {
        index: EntityIndex,
    },
    Leave {
        index: EntityIndex,
    },
    Delete {
        index: EntityIndex,
    },
}

#[derive(Debug)]
struct StagedMessage {
    header: PacketEntitiesHeader,
    frame: Frame,
    ops: Vec<StagedOp>,
    promoted: Vec<(EntityIndex, Baseline)>,
}

/// Read-only strategy that decodes payloads into staged operations.
struct StagingStrategy<'a, C, O: ObjectSystem> {
    codec: &'a C,
    limits: &'a Limits,
    baselines: &'a BaselineStore,
    cache: &'a ObjectCache<O::Handle>,
    objects: &'a O,
    prior: Option<&'a Frame>,
    side: BaselineSide,
    promote: bool,
    frame: FrameBuilder,
    ops: Vec<StagedOp>,
    promoted: Vec<(EntityIndex, Baseline)>,
}

impl<C, O: ObjectSystem> StagingStrategy<'_, C, O> {
    fn finish(self, header: PacketEntitiesHeader) -> StagedMessage {
        StagedMessage {
            header,
            frame: self.frame.finish(),
            ops: self.ops,
            promoted: self.promoted,
        }
    }
}

impl<C: PropertyCodec, O: ObjectSystem> DecoderStrategy for StagingStrategy<'_, C, O> {
    fn enter_pvs(&mut self, index: EntityIndex, body: &mut BitReader<'_>) -> CodecResult<()> {
        let class = ClassId::new(body.read_bits(self.limits.class_bits)? as u16);
        let serial = SerialNumber::new(body.read_bits(self.limits.serial_bits)? as u32);
        if !self.codec.knows_class(class) {
            return Err(MalformedStream::UnknownClass { class }.into());
        }

        let from = self.baselines.resolve(self.side, index, class)?;
        let mut state = PropertyState::default();
        let changed =
            self.codec
                .decode_delta(class, PropertySource::Baseline(from), body, &mut state)?;
        if self.promote {
            let bytes = self.codec.encode(class, &state)?;
            self.promoted.push((index, Baseline { class, bytes }));
        }

        self.frame.push(FrameEntity {
            index,
            class,
            serial,
        })?;
        trace!(%index, %class, serial = serial.raw(), changed = changed.len(), "enter");
        self.ops.push(StagedOp::Enter {
            index,
            class,
            serial,
            state,
            changed,
        });
        Ok(())
    }

    fn leave_pvs(&mut self, index: EntityIndex, force_delete: bool) -> CodecResult<()> {
        trace!(%index, force_delete, "leave");
        self.ops.push(if force_delete {
            StagedOp::Delete { index }
        } else {
            StagedOp::Leave { index }
        });
        Ok(())
    }

    fn delta_ent(&mut self, index: EntityIndex, body: &mut BitReader<'_>) -> CodecResult<()> {
        let entry = self
            .cache
            .get(index)
            .ok_or(MalformedStream::DeltaWithoutObject { index })?;
        let live = self
            .objects
            .properties(&entry.handle)
            .ok_or(MalformedStream::DeltaWithoutObject { index })?;

        let mut state = PropertyState::default();
        let changed =
            self.codec
                .decode_delta(entry.class, PropertySource::Live(live), body, &mut state)?;
        self.frame.push(FrameEntity {
            index,
            class: entry.class,
            serial: entry.serial,
        })?;
        trace!(%index, changed = changed.len(), "delta");
        self.ops.push(StagedOp::Delta {
            index,
            state,
            changed,
        });
        Ok(())
    }

    fn preserve_ent(&mut self, index: EntityIndex) -> CodecResult<()> {
        let prior = self
            .prior
            .ok_or(SequenceViolation::PreserveOnFullUpdate { index })?;
        if self.cache.get(index).is_none() {
            return Err(MalformedStream::PreserveWithoutObject { index }.into());
        }
        if let Some(entity) = prior.entity(index) {
            self.frame.push(*entity)?;
        }
        trace!(%index, "preserve");
        self.ops.push(StagedOp::Preserve { index });
        Ok(())
    }

    fn explicit_delete(&mut self, index: EntityIndex) -> CodecResult<()> {
        self.frame.remove(index);
        trace!(%index, "delete");
        self.ops.push(StagedOp::Delete { index });
        Ok(())
    }
}

/// Client-side decoder for packet-entities messages on one connection.
///
/// `H` is the object system's handle type and `C` the property codec.
#[derive(Debug)]
pub struct EntityDecoder<H, C> {
    config: DecoderConfig,
    codec: C,
    baselines: BaselineStore,
    history: FrameHistory,
    tracker: AliveTracker,
    cache: ObjectCache<H>,
}

impl<H, C: PropertyCodec> EntityDecoder<H, C> {
    /// Creates a decoder with empty baselines and history.
    pub fn new(config: DecoderConfig, codec: C) -> CodecResult<Self> {
        config.wire.validate()?;
        let capacity = config.max_objects();
        debug!(
            max_objects = capacity,
            history = config.history_capacity.get(),
            "entity decoder created"
        );
        Ok(Self {
            baselines: BaselineStore::new(capacity),
            history: FrameHistory::new(config.history_capacity),
            tracker: AliveTracker::new(capacity),
            cache: ObjectCache::new(capacity),
            config,
            codec,
        })
    }

    /// Returns the configuration the decoder was built with.
    #[must_use]
    pub const fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Returns the property codec.
    #[must_use]
    pub const fn codec(&self) -> &C {
        &self.codec
    }

    /// Returns both baseline sides and the class defaults.
    #[must_use]
    pub const fn baselines(&self) -> &BaselineStore {
        &self.baselines
    }

    /// Mutable access to the baseline store, for preloading baselines.
    pub fn baselines_mut(&mut self) -> &mut BaselineStore {
        &mut self.baselines
    }

    /// Registers the fallback baseline for `class`.
    pub fn register_default_baseline(&mut self, class: ClassId, bytes: Vec<u8>) {
        self.baselines.set_default(class, bytes);
    }

    /// Returns the committed frames still available as delta references.
    #[must_use]
    pub const fn history(&self) -> &FrameHistory {
        &self.history
    }

    /// The most recently committed frame.
    #[must_use]
    pub fn latest_frame(&self) -> Option<&Frame> {
        self.history.latest()
    }

    /// Returns the alive set as of the last applied message.
    #[must_use]
    pub const fn alive(&self) -> &AliveTracker {
        &self.tracker
    }

    /// Returns the cached object at `index`, visible or dormant.
    #[must_use]
    pub fn object(&self, index: EntityIndex) -> Option<&CacheEntry<H>> {
        self.cache.get(index)
    }

    /// Cached objects, visible and dormant, in index order.
    pub fn objects(&self) -> impl Iterator<Item = (EntityIndex, &CacheEntry<H>)> {
        self.cache.iter()
    }

    /// Decodes and applies one packet-entities message.
    pub fn process<O, A>(&mut self, bytes: &[u8], objects: &mut O, acks: &mut A) -> CodecResult<()>
    where
        O: ObjectSystem<Handle = H>,
        A: AckSink + ?Sized,
    {
        self.process_observed(bytes, objects, acks, |_, _| {})
    }

    /// Like [`process`](Self::process), reporting each classification to `observe`.
    pub fn process_observed<O, A, F>(
        &mut self,
        bytes: &[u8],
        objects: &mut O,
        acks: &mut A,
        observe: F,
    ) -> CodecResult<()>
    where
        O: ObjectSystem<Handle = H>,
        A: AckSink + ?Sized,
        F: FnMut(UpdateKind, EntityIndex),
    {
        let result = self
            .stage(bytes, &*objects, observe)
            .and_then(|staged| self.apply(staged, objects, acks));
        if let Err(err) = &result {
            warn!(error = %err, "rejected packet entities message");
        }
        result
    }

    /// Destroys every cached object and forgets baselines, history and the
    /// alive set. Class defaults stay registered.
    ///
    /// Every object is destroyed even if some fail; the first failure is returned.
    pub fn reset<O>(&mut self, objects: &mut O) -> CodecResult<()>
    where
        O: ObjectSystem<Handle = H>,
    {
        let live = self.cache.drain();
        info!(objects = live.len(), "resetting entity decoder");
        self.baselines.clear();
        self.history.clear();
        self.tracker.clear();

        let mut first_error = None;
        for (index, entry) in live {
            if let Err(source) = objects.destroy(entry.handle) {
                first_error.get_or_insert(ProtocolError::Collaborator {
                    operation: LifecycleOp::Destroy,
                    index,
                    source,
                });
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn stage<O, F>(&self, bytes: &[u8], objects: &O, observe: F) -> CodecResult<StagedMessage>
    where
        O: ObjectSystem<Handle = H>,
        F: FnMut(UpdateKind, EntityIndex),
    {
        let limits = &self.config.wire;
        let mut reader = BitReader::new(bytes);
        let header = decode_packet_entities_header(&mut reader, limits)?;

        let tick = SnapshotTick::new(header.tick);
        if let Some(last) = self.history.last_tick() {
            if tick <= last {
                return Err(SequenceViolation::StaleTick { tick, last }.into());
            }
        }
        let prior = match header.delta_from {
            Some(from) => {
                let from = SnapshotTick::new(from);
                let frame = self
                    .history
                    .get(from)
                    .ok_or(SequenceViolation::UnknownReferencedTick { tick: from })?;
                Some(frame)
            }
            None => None,
        };

        debug!(
            tick = header.tick,
            delta_from = ?header.delta_from,
            updated = header.updated_entries,
            body_bits = header.body_bits,
            side = ?header.baseline_side,
            promote = header.update_baseline,
            "decoding packet entities"
        );

        let declared = header.body_bits as usize;
        let mut body = reader.take_bits(declared)?;
        let staging = StagingStrategy {
            codec: &self.codec,
            limits,
            baselines: &self.baselines,
            cache: &self.cache,
            objects,
            prior,
            side: header.baseline_side,
            promote: header.update_baseline,
            frame: FrameBuilder::new(tick, self.config.max_objects()),
            ops: Vec::new(),
            promoted: Vec::new(),
        };
        let mut strategy = ObservingStrategy::new(staging, observe);
        read_packet_entities(&mut body, &header, prior, limits, &mut strategy)?;
        if !body.is_empty() {
            return Err(MalformedStream::BodyLengthMismatch {
                declared,
                unread: body.bits_remaining(),
            }
            .into());
        }
        Ok(strategy.into_inner().finish(header))
    }

    fn apply<O, A>(&mut self, staged: StagedMessage, objects: &mut O, acks: &mut A) -> CodecResult<()>
    where
        O: ObjectSystem<Handle = H>,
        A: AckSink + ?Sized,
    {
        let StagedMessage {
            header,
            frame,
            ops,
            promoted,
        } = staged;

        for op in ops {
            match op {
                StagedOp::Enter {
                    index,
                    class,
                    serial,
                    state,
                    changed,
                } => self.apply_enter(objects, index, class, serial, state, &changed)?,
                StagedOp::Delta {
                    index,
                    state,
                    changed,
                } => self.apply_delta(objects, index, state, &changed)?,
                StagedOp::Preserve { index } => self.tracker.mark_alive(index),
                StagedOp::Leave { index } => {
                    if let Some(entry) = self.cache.get_mut(index) {
                        entry.dormant = true;
                    }
                }
                StagedOp::Delete { index } => {
                    self.tracker.forget(index);
                    self.destroy_slot(objects, index)?;
                }
            }
        }

        self.reconcile(objects)?;
        if !header.is_delta() {
            self.drop_dormant(objects)?;
        }
        if header.update_baseline {
            self.promote(&header, promoted, acks);
        }
        self.commit(&header, frame)
    }

    fn apply_enter<O>(
        &mut self,
        objects: &mut O,
        index: EntityIndex,
        class: ClassId,
        serial: SerialNumber,
        state: PropertyState,
        changed: &[usize],
    ) -> CodecResult<()>
    where
        O: ObjectSystem<Handle = H>,
    {
        match self.cache.get(index).map(|entry| entry.matches(serial, class)) {
            Some(true) => {
                if let Some(entry) = self.cache.get_mut(index) {
                    if entry.dormant {
                        entry.dormant = false;
                        objects.notify_visibility(&entry.handle, true);
                    }
                    objects.apply_properties(&entry.handle, state, changed);
                }
            }
            identity => {
                if identity.is_some() {
                    debug!(%index, %class, serial = serial.raw(), "identity changed, recreating");
                    self.destroy_slot(objects, index)?;
                }
                let handle = objects.create(index, serial, class).map_err(|source| {
                    ProtocolError::Collaborator {
                        operation: LifecycleOp::Create,
                        index,
                        source,
                    }
                })?;
                objects.apply_properties(&handle, state, changed);
                objects.notify_visibility(&handle, true);
                self.cache.insert(
                    index,
                    CacheEntry {
                        handle,
                        serial,
                        class,
                        dormant: false,
                    },
                );
            }
        }
        self.tracker.mark_alive(index);
        Ok(())
    }

    fn apply_delta<O>(
        &mut self,
        objects: &mut O,
        index: EntityIndex,
        state: PropertyState,
        changed: &[usize],
    ) -> CodecResult<()>
    where
        O: ObjectSystem<Handle = H>,
    {
        let entry = self
            .cache
            .get_mut(index)
            .ok_or(MalformedStream::DeltaWithoutObject { index })?;
        if entry.dormant {
            entry.dormant = false;
            objects.notify_visibility(&entry.handle, true);
        }
        objects.apply_properties(&entry.handle, state, changed);
        self.tracker.mark_alive(index);
        Ok(())
    }

    fn destroy_slot<O>(&mut self, objects: &mut O, index: EntityIndex) -> CodecResult<()>
    where
        O: ObjectSystem<Handle = H>,
    {
        if let Some(entry) = self.cache.remove(index) {
            objects
                .destroy(entry.handle)
                .map_err(|source| ProtocolError::Collaborator {
                    operation: LifecycleOp::Destroy,
                    index,
                    source,
                })?;
        }
        Ok(())
    }

    /// Dormant objects get a visibility notification; anything else that
    /// silently disappeared is destroyed.
    fn reconcile<O>(&mut self, objects: &mut O) -> CodecResult<()>
    where
        O: ObjectSystem<Handle = H>,
    {
        for index in self.tracker.reconcile() {
            match self.cache.get(index) {
                Some(entry) if entry.dormant => objects.notify_visibility(&entry.handle, false),
                Some(_) => {
                    trace!(%index, "implicit removal");
                    self.destroy_slot(objects, index)?;
                }
                None => {}
            }
        }
        Ok(())
    }

    /// After a full update, dormant objects outside the new frame are gone.
    fn drop_dormant<O>(&mut self, objects: &mut O) -> CodecResult<()>
    where
        O: ObjectSystem<Handle = H>,
    {
        let stale: Vec<EntityIndex> = self
            .cache
            .iter()
            .filter(|(index, entry)| entry.dormant && !self.tracker.was_alive(*index))
            .map(|(index, _)| index)
            .collect();
        for index in stale {
            self.destroy_slot(objects, index)?;
        }
        Ok(())
    }

    fn promote<A>(
        &mut self,
        header: &PacketEntitiesHeader,
        promoted: Vec<(EntityIndex, Baseline)>,
        acks: &mut A,
    ) where
        A: AckSink + ?Sized,
    {
        let from = header.baseline_side;
        let to = from.other();
        self.baselines.copy_side(from, to);
        let count = promoted.len();
        for (index, baseline) in promoted {
            self.baselines.set(to, index, baseline);
        }
        acks.send_reliable(BaselineAck {
            tick: header.tick,
            side: to,
        });
        self.baselines.set_active(to);
        debug!(tick = header.tick, side = ?to, promoted = count, "baseline promoted");
    }

    fn commit(&mut self, header: &PacketEntitiesHeader, frame: Frame) -> CodecResult<()> {
        match header.delta_from {
            Some(from) => self.history.prune_before(SnapshotTick::new(from)),
            None => {
                info!(
                    tick = header.tick,
                    objects = frame.entities().len(),
                    "full update"
                );
                self.history.clear();
            }
        }
        self.history
            .insert(frame)
            .map_err(|err| ProtocolError::Sequence(err.into()))
    }
}

impl<H> EntityDecoder<H, SchemaPropertyCodec> {
    /// Registers every class's zero state as its default baseline.
    pub fn register_zero_baselines(&mut self) -> CodecResult<()> {
        for (class, bytes) in self.codec.zero_baselines()? {
            self.baselines.set_default(class, bytes);
        }
        Ok(())
    }
}
