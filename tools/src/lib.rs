//! Inspection and replay tools for entsync packet-entities streams.
//!
//! This crate provides utilities for understanding what a message stream does
//! to a client:
//!
//! - Parse and print message headers
//! - Replay a directory of captured messages through a real decoder
//! - Report classifications, lifecycle calls and baseline acknowledgements
//!
//! # Design Principles
//!
//! - **First-class tooling** - These tools are part of the product, not afterthoughts.
//! - **Human-readable output** - Make it easy to understand what the decoder is doing.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use anyhow::{Context, Result};
use bitstream::BitReader;
use codec::{
    BaselineAck, DecoderConfig, EntityDecoder, EntityIndex, ObjectError, ObjectSystem,
    PropertyState, SchemaPropertyCodec, SerialNumber,
};
use schema::{schema_hash, ClassId, Schema};
use serde::Serialize;
use tracing::info;
use wire::{decode_packet_entities_header, Limits, PacketEntitiesHeader};

/// Header summary of a single message.
#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub header: PacketEntitiesHeader,
    pub header_bits: usize,
    pub total_bits: usize,
    /// Padding after the body.
    pub trailing_bits: usize,
}

pub fn inspect_message(bytes: &[u8], limits: &Limits) -> Result<InspectReport> {
    let mut reader = BitReader::new(bytes);
    let header = decode_packet_entities_header(&mut reader, limits).context("decode header")?;
    let header_bits = reader.bit_position();
    let total_bits = reader.bit_len();
    Ok(InspectReport {
        header,
        header_bits,
        total_bits,
        trailing_bits: total_bits - header_bits - header.body_bits as usize,
    })
}

pub fn format_inspect_pretty(report: &InspectReport) -> String {
    let header = &report.header;
    let mut out = String::new();
    let _ = writeln!(out, "tick: {}", header.tick);
    match header.delta_from {
        Some(from) => {
            let _ = writeln!(out, "kind: delta from {from}");
        }
        None => {
            let _ = writeln!(out, "kind: full update");
        }
    }
    let _ = writeln!(
        out,
        "entries: {} updated / {} max",
        header.updated_entries, header.max_entries
    );
    let _ = writeln!(
        out,
        "baseline: side {} promote={}",
        header.baseline_side.index(),
        header.update_baseline
    );
    let _ = write!(
        out,
        "bits: header {} body {} trailing {} ({} bytes)",
        report.header_bits,
        header.body_bits,
        report.trailing_bits,
        report.total_bits / 8
    );
    out
}

/// Lifecycle call made by the decoder during replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Create {
        index: u32,
        serial: u32,
        class: u16,
    },
    Destroy {
        index: u32,
    },
    Visibility {
        index: u32,
        entered: bool,
    },
    Properties {
        index: u32,
        changed: Vec<usize>,
    },
}

#[derive(Debug, Clone)]
struct ReplayObject {
    index: EntityIndex,
    state: PropertyState,
}

/// Object system that keeps objects in memory and records every call.
#[derive(Debug, Default)]
pub struct RecordingWorld {
    next_handle: u64,
    objects: BTreeMap<u64, ReplayObject>,
    events: Vec<LifecycleEvent>,
}

impl RecordingWorld {
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn take_events(&mut self) -> Vec<LifecycleEvent> {
        std::mem::take(&mut self.events)
    }
}

impl ObjectSystem for RecordingWorld {
    type Handle = u64;

    fn create(
        &mut self,
        index: EntityIndex,
        serial: SerialNumber,
        class: ClassId,
    ) -> Result<u64, ObjectError> {
        self.next_handle += 1;
        self.objects.insert(
            self.next_handle,
            ReplayObject {
                index,
                state: PropertyState::default(),
            },
        );
        self.events.push(LifecycleEvent::Create {
            index: index.raw(),
            serial: serial.raw(),
            class: class.get(),
        });
        Ok(self.next_handle)
    }

    fn destroy(&mut self, handle: u64) -> Result<(), ObjectError> {
        let object = self
            .objects
            .remove(&handle)
            .ok_or_else(|| ObjectError::new(format!("unknown handle {handle}")))?;
        self.events.push(LifecycleEvent::Destroy {
            index: object.index.raw(),
        });
        Ok(())
    }

    fn notify_visibility(&mut self, handle: &u64, entered: bool) {
        if let Some(object) = self.objects.get(handle) {
            self.events.push(LifecycleEvent::Visibility {
                index: object.index.raw(),
                entered,
            });
        }
    }

    fn properties(&self, handle: &u64) -> Option<&PropertyState> {
        self.objects.get(handle).map(|object| &object.state)
    }

    fn apply_properties(&mut self, handle: &u64, state: PropertyState, changed: &[usize]) {
        if let Some(object) = self.objects.get_mut(handle) {
            object.state = state;
            self.events.push(LifecycleEvent::Properties {
                index: object.index.raw(),
                changed: changed.to_vec(),
            });
        }
    }
}

/// Classification of one object in a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub kind: String,
    pub index: u32,
}

/// What replaying one message did.
#[derive(Debug, Clone, Serialize)]
pub struct MessageReport {
    pub name: String,
    pub header: Option<PacketEntitiesHeader>,
    pub classifications: Vec<Classification>,
    pub events: Vec<LifecycleEvent>,
    pub acks: Vec<BaselineAck>,
    pub live_objects: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub schema_hash: u64,
    pub messages: Vec<MessageReport>,
}

/// Feeds messages through a decoder backed by a [`RecordingWorld`].
#[derive(Debug)]
pub struct Replayer {
    decoder: EntityDecoder<u64, SchemaPropertyCodec>,
    world: RecordingWorld,
    schema_hash: u64,
    messages: Vec<MessageReport>,
}

impl Replayer {
    pub fn new(schema: Schema, config: DecoderConfig) -> Result<Self> {
        let schema_hash = schema_hash(&schema);
        let mut decoder = EntityDecoder::new(config, SchemaPropertyCodec::new(schema))
            .context("create decoder")?;
        decoder
            .register_zero_baselines()
            .context("register default baselines")?;
        Ok(Self {
            decoder,
            world: RecordingWorld::default(),
            schema_hash,
            messages: Vec::new(),
        })
    }

    /// Processes one message. A rejected message is recorded, not returned.
    pub fn replay(&mut self, name: impl Into<String>, bytes: &[u8]) -> &MessageReport {
        let header = {
            let mut reader = BitReader::new(bytes);
            decode_packet_entities_header(&mut reader, &self.decoder.config().wire).ok()
        };
        let mut classifications = Vec::new();
        let mut acks = Vec::new();
        let result = self.decoder.process_observed(
            bytes,
            &mut self.world,
            &mut acks,
            |kind, index| {
                classifications.push(Classification {
                    kind: kind.to_string(),
                    index: index.raw(),
                });
            },
        );
        let report = MessageReport {
            name: name.into(),
            header,
            classifications: if result.is_ok() {
                classifications
            } else {
                Vec::new()
            },
            events: self.world.take_events(),
            acks,
            live_objects: self.world.len(),
            error: result.err().map(|err| err.to_string()),
        };
        info!(
            message = %report.name,
            classified = report.classifications.len(),
            events = report.events.len(),
            live = report.live_objects,
            rejected = report.error.is_some(),
            "replayed message"
        );
        self.messages.push(report);
        &self.messages[self.messages.len() - 1]
    }

    #[must_use]
    pub fn finish(self) -> ReplayReport {
        ReplayReport {
            schema_hash: self.schema_hash,
            messages: self.messages,
        }
    }
}

pub fn format_replay_pretty(report: &ReplayReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "schema_hash: 0x{:016x}", report.schema_hash);
    for message in &report.messages {
        let _ = write!(out, "== {}", message.name);
        if let Some(header) = &message.header {
            let _ = write!(out, " (tick {}", header.tick);
            if let Some(from) = header.delta_from {
                let _ = write!(out, ", delta from {from}");
            }
            let _ = write!(out, ")");
        }
        let _ = writeln!(out, " ==");
        if let Some(error) = &message.error {
            let _ = writeln!(out, "  rejected: {error}");
        }
        for entry in &message.classifications {
            let _ = writeln!(out, "  {} #{}", entry.kind, entry.index);
        }
        for event in &message.events {
            let line = match event {
                LifecycleEvent::Create {
                    index,
                    serial,
                    class,
                } => format!("create #{index} serial {serial} class#{class}"),
                LifecycleEvent::Destroy { index } => format!("destroy #{index}"),
                LifecycleEvent::Visibility { index, entered } => {
                    let verb = if *entered { "entered" } else { "left" };
                    format!("#{index} {verb} visibility")
                }
                LifecycleEvent::Properties { index, changed } => {
                    format!("#{index} properties {changed:?}")
                }
            };
            let _ = writeln!(out, "  -> {line}");
        }
        for ack in &message.acks {
            let _ = writeln!(
                out,
                "  ack tick {} side {}",
                ack.tick,
                ack.side.index()
            );
        }
        let _ = writeln!(out, "  live objects: {}", message.live_objects);
    }
    out
}
