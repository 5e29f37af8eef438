//! Low-level bit packing primitives for the entsync entity decoder.
//!
//! This crate provides [`BitWriter`] and [`BitReader`] for bit-level encoding and decoding.
//! Bits are packed least-significant first within each byte, which is the bit order
//! used by the legacy engine stream that the entity protocol interoperates with.
//!
//! # Design Principles
//!
//! - **No unsafe code** - Safety is paramount.
//! - **Bounded operations** - All reads are bounds-checked; overflow is an error.
//! - **No domain knowledge** - This crate knows nothing about entities, classes, or frames.
//! - **Explicit errors** - All failures return structured errors, never panic.
//!
//! # Example
//!
//! ```
//! use bitstream::{BitReader, BitWriter};
//!
//! let mut writer = BitWriter::new();
//! writer.write_bit(true);
//! writer.write_bits(42, 7).unwrap();
//! writer.write_ubitvar(300);
//!
//! let bytes = writer.finish();
//!
//! let mut reader = BitReader::new(&bytes);
//! assert!(reader.read_bit().unwrap());
//! assert_eq!(reader.read_bits(7).unwrap(), 42);
//! assert_eq!(reader.read_ubitvar().unwrap(), 300);
//! ```

mod error;
mod reader;
mod writer;

pub use error::{BitError, BitResult};
pub use reader::BitReader;
pub use writer::BitWriter;
