//! # Lodestore Codec
//!
//! Binary record format primitives for Lodestore.
//!
//! This crate owns the byte-level wire format shared by the object
//! codec, the key/index table blobs, and the backup stream:
//!
//! - All integers are little-endian
//! - Strings and blobs are u32-length-prefixed
//! - Null markers are u16 (`NULL` = 0, `NOT_NULL` = 1)
//! - Member lists terminate with the `END_OF_INSTANCE` sentinel string
//! - Property names are written with a trailing `:` separator
//!
//! ## Usage
//!
//! ```
//! use lodestore_codec::{Primitive, PrimitiveKind, RecordReader, RecordWriter};
//!
//! let mut w = RecordWriter::new();
//! Primitive::I64(42).encode(&mut w);
//! let bytes = w.into_bytes();
//!
//! let mut r = RecordReader::new(&bytes);
//! let decoded = Primitive::decode(PrimitiveKind::I64, &mut r).unwrap();
//! assert_eq!(decoded, Primitive::I64(42));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod primitive;
mod reader;
mod writer;

pub use error::{CodecError, CodecResult};
pub use primitive::{Primitive, PrimitiveKind};
pub use reader::{MemberToken, RecordReader};
pub use writer::RecordWriter;

/// Null marker value: the encoded value is absent.
pub const NULL: u16 = 0;

/// Not-null marker value: payload bytes follow.
pub const NOT_NULL: u16 = 1;

/// Sentinel string terminating a record's member list.
pub const END_OF_INSTANCE: &str = "END_OF_INSTANCE";

/// Separator appended to every property name on the wire.
pub const PROPERTY_SEPARATOR: char = ':';
