//! Record writer producing the Lodestore wire format.

use crate::{END_OF_INSTANCE, NOT_NULL, NULL, PROPERTY_SEPARATOR};
use bytes::{BufMut, BytesMut};

/// A writer for the binary record format.
///
/// All integers are little-endian. Strings are u32-length-prefixed
/// UTF-8. Null markers are u16 values (`NULL` = 0, `NOT_NULL` = 1).
///
/// Member lists have no length header; the decoder reads members until
/// it encounters the [`END_OF_INSTANCE`] sentinel string, which is what
/// lets a record carry an a-priori-unknown number of members.
pub struct RecordWriter {
    buffer: BytesMut,
}

impl RecordWriter {
    /// Creates a new empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Creates a writer with the specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Consumes this writer and returns the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer.to_vec()
    }

    /// Returns the number of bytes written so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Writes a single byte.
    pub fn put_u8(&mut self, v: u8) {
        self.buffer.put_u8(v);
    }

    /// Writes a u16.
    pub fn put_u16(&mut self, v: u16) {
        self.buffer.put_u16_le(v);
    }

    /// Writes an i32.
    pub fn put_i32(&mut self, v: i32) {
        self.buffer.put_i32_le(v);
    }

    /// Writes a u32.
    pub fn put_u32(&mut self, v: u32) {
        self.buffer.put_u32_le(v);
    }

    /// Writes an i64.
    pub fn put_i64(&mut self, v: i64) {
        self.buffer.put_i64_le(v);
    }

    /// Writes a u64.
    pub fn put_u64(&mut self, v: u64) {
        self.buffer.put_u64_le(v);
    }

    /// Writes an f64.
    pub fn put_f64(&mut self, v: f64) {
        self.buffer.put_f64_le(v);
    }

    /// Writes a length-prefixed string.
    pub fn put_string(&mut self, v: &str) {
        self.buffer.put_u32_le(v.len() as u32);
        self.buffer.put_slice(v.as_bytes());
    }

    /// Writes a length-prefixed byte blob.
    pub fn put_blob(&mut self, v: &[u8]) {
        self.buffer.put_u32_le(v.len() as u32);
        self.buffer.put_slice(v);
    }

    /// Writes a null marker: `NULL` when `is_null`, `NOT_NULL` otherwise.
    pub fn put_null_marker(&mut self, is_null: bool) {
        self.put_u16(if is_null { NULL } else { NOT_NULL });
    }

    /// Writes a member's property name together with its separator.
    ///
    /// A property literally named `END_OF_INSTANCE`, or one containing
    /// the separator character, collides with the stream's control
    /// tokens and will not round-trip. Callers own that constraint.
    pub fn put_property_name(&mut self, name: &str) {
        let tagged = format!("{name}{PROPERTY_SEPARATOR}");
        self.put_string(&tagged);
    }

    /// Writes the end-of-instance sentinel terminating a member list.
    pub fn put_end_of_instance(&mut self) {
        self.put_string(END_OF_INSTANCE);
    }
}

impl Default for RecordWriter {
    fn default() -> Self {
        Self::new()
    }
}
