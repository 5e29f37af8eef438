#![allow(dead_code)]

use std::collections::BTreeMap;

use codec::{
    DecoderConfig, EntityDecoder, EntityIndex, FieldValue, MessageBuilder, ObjectError,
    ObjectSystem, PropertyDelta, PropertyState, SchemaPropertyCodec, SerialNumber, SnapshotTick,
};
use schema::{ClassDef, ClassId, FieldCodec, FieldDef, FieldId, Schema};

pub const CRATE: ClassId = ClassId::new(1);
pub const DOOR: ClassId = ClassId::new(2);

/// Lifecycle calls observed by [`World`], keyed by object index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Create(u32),
    Destroy(u32),
    Visible(u32, bool),
    Apply(u32, Vec<usize>),
}

#[derive(Debug, Clone)]
pub struct Object {
    pub index: EntityIndex,
    pub serial: SerialNumber,
    pub class: ClassId,
    pub state: PropertyState,
    pub visible: bool,
}

/// In-memory object system that records every call.
#[derive(Debug, Default)]
pub struct World {
    next_handle: u32,
    pub objects: BTreeMap<u32, Object>,
    pub events: Vec<Event>,
    pub fail_create: Option<u32>,
    pub fail_destroy: Option<u32>,
}

impl World {
    /// World whose `create` fails for `index`.
    pub fn failing_create(index: u32) -> Self {
        Self {
            fail_create: Some(index),
            ..Self::default()
        }
    }

    /// World whose `destroy` fails for `index`.
    pub fn failing_destroy(index: u32) -> Self {
        Self {
            fail_destroy: Some(index),
            ..Self::default()
        }
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn by_index(&self, index: u32) -> Option<&Object> {
        self.objects
            .values()
            .find(|object| object.index.raw() == index)
    }

    pub fn creates(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, Event::Create(_)))
            .count()
    }

    pub fn destroys(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, Event::Destroy(_)))
            .count()
    }
}

impl ObjectSystem for World {
    type Handle = u32;

    fn create(
        &mut self,
        index: EntityIndex,
        serial: SerialNumber,
        class: ClassId,
    ) -> Result<u32, ObjectError> {
        if self.fail_create == Some(index.raw()) {
            return Err(ObjectError::new("create refused"));
        }
        self.next_handle += 1;
        self.objects.insert(
            self.next_handle,
            Object {
                index,
                serial,
                class,
                state: PropertyState::default(),
                visible: false,
            },
        );
        self.events.push(Event::Create(index.raw()));
        Ok(self.next_handle)
    }

    fn destroy(&mut self, handle: u32) -> Result<(), ObjectError> {
        let index = self
            .objects
            .get(&handle)
            .map(|object| object.index.raw())
            .ok_or_else(|| ObjectError::new("unknown handle"))?;
        if self.fail_destroy == Some(index) {
            return Err(ObjectError::new("destroy refused"));
        }
        self.objects.remove(&handle);
        self.events.push(Event::Destroy(index));
        Ok(())
    }

    fn notify_visibility(&mut self, handle: &u32, entered: bool) {
        if let Some(object) = self.objects.get_mut(handle) {
            object.visible = entered;
            self.events.push(Event::Visible(object.index.raw(), entered));
        }
    }

    fn properties(&self, handle: &u32) -> Option<&PropertyState> {
        self.objects.get(handle).map(|object| &object.state)
    }

    fn apply_properties(&mut self, handle: &u32, state: PropertyState, changed: &[usize]) {
        if let Some(object) = self.objects.get_mut(handle) {
            object.state = state;
            self.events
                .push(Event::Apply(object.index.raw(), changed.to_vec()));
        }
    }
}

/// Crate: health (uint 8), open (bool). Door: angle (sint 8).
pub fn schema() -> Schema {
    let crate_class = ClassDef::new(CRATE, "Crate")
        .field(FieldDef::new(FieldId::new(1), FieldCodec::uint(8)).named("health"))
        .field(FieldDef::new(FieldId::new(2), FieldCodec::bool()).named("open"));
    let door = ClassDef::new(DOOR, "Door")
        .field(FieldDef::new(FieldId::new(1), FieldCodec::sint(8)).named("angle"));
    Schema::new(vec![crate_class, door]).unwrap()
}

pub fn codec() -> SchemaPropertyCodec {
    SchemaPropertyCodec::new(schema())
}

pub fn decoder() -> EntityDecoder<u32, SchemaPropertyCodec> {
    let mut decoder = EntityDecoder::new(DecoderConfig::for_testing(), codec()).unwrap();
    decoder.register_zero_baselines().unwrap();
    decoder
}

pub fn idx(raw: u32) -> EntityIndex {
    EntityIndex::new(raw)
}

pub fn serial(raw: u32) -> SerialNumber {
    SerialNumber::new(raw)
}

pub fn tick(raw: u32) -> SnapshotTick {
    SnapshotTick::new(raw)
}

pub fn crate_delta(changes: &[(usize, FieldValue)]) -> PropertyDelta {
    codec().encode_delta(CRATE, changes).unwrap()
}

pub fn health(value: u64) -> PropertyDelta {
    crate_delta(&[(0, FieldValue::UInt(value))])
}

pub fn full(at: u32) -> MessageBuilder {
    MessageBuilder::new(DecoderConfig::for_testing().wire, tick(at))
}

pub fn delta(at: u32, from: u32) -> MessageBuilder {
    full(at).delta_from(tick(from))
}

pub fn transmitted(decoder: &EntityDecoder<u32, SchemaPropertyCodec>) -> Vec<u32> {
    decoder
        .latest_frame()
        .map(|frame| {
            frame
                .transmitted()
                .iter()
                .map(|slot| slot as u32)
                .collect()
        })
        .unwrap_or_default()
}
