//! Key scalars and storage identifiers.

use crate::error::{StoreError, StoreResult};
use chrono::{TimeZone, Utc};
use lodestore_codec::{CodecError, Primitive, RecordReader, RecordWriter};
use std::fmt;
use uuid::Uuid;

/// An orderable scalar usable as a table key or an index value.
///
/// Scalars carry a total order so key tables and index queries can be
/// sorted deterministically. Cross-variant comparisons follow variant
/// declaration order; keys of one table are expected to share a
/// variant in practice.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scalar {
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// UTF-8 string.
    Text(String),
    /// 128-bit GUID.
    Guid(Uuid),
    /// UTC timestamp, millisecond precision.
    Time(i64),
}

/// A table key. Keys are scalars with a total order.
pub type Key = Scalar;

const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_TEXT: u8 = 3;
const TAG_GUID: u8 = 4;
const TAG_TIME: u8 = 5;

impl Scalar {
    /// Encodes this scalar self-describingly: a one-byte variant tag
    /// followed by the payload.
    ///
    /// Unlike primitives inside a record (whose kind is selected by
    /// the member's type id), key payloads carry their own tag because
    /// a foreign reference's type id identifies the target table, not
    /// the key type.
    pub fn encode(&self, w: &mut RecordWriter) {
        match self {
            Scalar::Bool(v) => {
                w.put_u8(TAG_BOOL);
                w.put_u8(u8::from(*v));
            }
            Scalar::Int(v) => {
                w.put_u8(TAG_INT);
                w.put_i64(*v);
            }
            Scalar::Text(v) => {
                w.put_u8(TAG_TEXT);
                w.put_string(v);
            }
            Scalar::Guid(v) => {
                w.put_u8(TAG_GUID);
                w.put_blob(v.as_bytes());
            }
            Scalar::Time(v) => {
                w.put_u8(TAG_TIME);
                w.put_i64(*v);
            }
        }
    }

    /// Decodes a self-describing scalar.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input or an unknown tag.
    pub fn decode(r: &mut RecordReader<'_>) -> StoreResult<Self> {
        match r.get_u8()? {
            TAG_BOOL => Ok(Scalar::Bool(r.get_u8()? != 0)),
            TAG_INT => Ok(Scalar::Int(r.get_i64()?)),
            TAG_TEXT => Ok(Scalar::Text(r.get_string()?)),
            TAG_GUID => {
                let bytes = r.get_blob()?;
                let arr: [u8; 16] = bytes.as_slice().try_into().map_err(|_| {
                    StoreError::Codec(CodecError::invalid_format("guid key is not 16 bytes"))
                })?;
                Ok(Scalar::Guid(Uuid::from_bytes(arr)))
            }
            TAG_TIME => Ok(Scalar::Time(r.get_i64()?)),
            other => Err(StoreError::invalid_format(format!(
                "unknown scalar tag: {other}"
            ))),
        }
    }

    /// Converts this scalar into its primitive representation.
    #[must_use]
    pub fn to_primitive(&self) -> Primitive {
        match self {
            Scalar::Bool(v) => Primitive::Bool(*v),
            Scalar::Int(v) => Primitive::I64(*v),
            Scalar::Text(v) => Primitive::Text(v.clone()),
            Scalar::Guid(v) => Primitive::Guid(*v),
            Scalar::Time(v) => match Utc.timestamp_millis_opt(*v).single() {
                Some(dt) => Primitive::DateTime(dt),
                None => Primitive::I64(*v),
            },
        }
    }

    /// Converts a primitive into a scalar, if the primitive kind is
    /// usable as a key.
    #[must_use]
    pub fn from_primitive(p: &Primitive) -> Option<Self> {
        match p {
            Primitive::Bool(v) => Some(Scalar::Bool(*v)),
            Primitive::I32(v) => Some(Scalar::Int(i64::from(*v))),
            Primitive::I64(v) => Some(Scalar::Int(*v)),
            Primitive::Text(v) => Some(Scalar::Text(v.clone())),
            Primitive::Guid(v) => Some(Scalar::Guid(*v)),
            Primitive::DateTime(v) => Some(Scalar::Time(v.timestamp_millis())),
            Primitive::F64(_) | Primitive::Bytes(_) => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Text(v) => write!(f, "{v}"),
            Scalar::Guid(v) => write!(f, "{v}"),
            Scalar::Time(v) => write!(f, "t{v}"),
        }
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_owned())
    }
}

impl From<Uuid> for Scalar {
    fn from(v: Uuid) -> Self {
        Scalar::Guid(v)
    }
}

/// A stable per-table storage slot.
///
/// Slots are assigned monotonically when a key first enters a key
/// table and are never reused, even after the key is deleted or the
/// table is truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotIndex(u64);

impl SlotIndex {
    /// Wraps a raw slot number.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        SlotIndex(raw)
    }

    /// The raw slot number.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot:{}", self.0)
    }
}

/// A compact numeric id assigned to a type name by the type index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(i32);

impl TypeId {
    /// Wraps a raw type id.
    #[must_use]
    pub const fn new(raw: i32) -> Self {
        TypeId(raw)
    }

    /// The raw id written to the wire.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type:{}", self.0)
    }
}
