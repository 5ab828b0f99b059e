//! Record reader for the Lodestore wire format.

use crate::error::{CodecError, CodecResult};
use crate::{END_OF_INSTANCE, NOT_NULL, NULL, PROPERTY_SEPARATOR};
use bytes::Buf;

/// The outcome of reading a member-position string from a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberToken {
    /// A property name (separator already stripped).
    Property(String),
    /// The end-of-instance sentinel; the member list is finished.
    EndOfInstance,
}

/// A reader for the binary record format.
///
/// Mirrors [`crate::RecordWriter`]: little-endian integers,
/// u32-length-prefixed UTF-8 strings, u16 null markers. Every read is
/// bounds-checked and fails with `UnexpectedEof` rather than panicking.
pub struct RecordReader<'a> {
    buf: &'a [u8],
}

impl<'a> RecordReader<'a> {
    /// Creates a reader over the given bytes.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { buf: bytes }
    }

    /// Returns the number of unread bytes.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if every byte has been consumed.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.buf.is_empty()
    }

    fn need(&self, n: usize) -> CodecResult<()> {
        if self.buf.remaining() < n {
            return Err(CodecError::UnexpectedEof {
                needed: n,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    /// Reads a single byte.
    pub fn get_u8(&mut self) -> CodecResult<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    /// Reads a u16.
    pub fn get_u16(&mut self) -> CodecResult<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    /// Reads an i32.
    pub fn get_i32(&mut self) -> CodecResult<i32> {
        self.need(4)?;
        Ok(self.buf.get_i32_le())
    }

    /// Reads a u32.
    pub fn get_u32(&mut self) -> CodecResult<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    /// Reads an i64.
    pub fn get_i64(&mut self) -> CodecResult<i64> {
        self.need(8)?;
        Ok(self.buf.get_i64_le())
    }

    /// Reads a u64.
    pub fn get_u64(&mut self) -> CodecResult<u64> {
        self.need(8)?;
        Ok(self.buf.get_u64_le())
    }

    /// Reads an f64.
    pub fn get_f64(&mut self) -> CodecResult<f64> {
        self.need(8)?;
        Ok(self.buf.get_f64_le())
    }

    /// Reads a length-prefixed byte blob.
    pub fn get_blob(&mut self) -> CodecResult<Vec<u8>> {
        let len = self.get_u32()? as usize;
        self.need(len)?;
        let mut out = vec![0u8; len];
        self.buf.copy_to_slice(&mut out);
        Ok(out)
    }

    /// Reads a length-prefixed string.
    pub fn get_string(&mut self) -> CodecResult<String> {
        let bytes = self.get_blob()?;
        String::from_utf8(bytes).map_err(|_| CodecError::InvalidString)
    }

    /// Reads a null marker. Returns true when the value is null.
    pub fn get_null_marker(&mut self) -> CodecResult<bool> {
        match self.get_u16()? {
            NULL => Ok(true),
            NOT_NULL => Ok(false),
            other => Err(CodecError::InvalidMarker(other)),
        }
    }

    /// Reads the next member-position string: either a property name
    /// (separator stripped) or the end-of-instance sentinel.
    pub fn get_member_token(&mut self) -> CodecResult<MemberToken> {
        let raw = self.get_string()?;
        if raw == END_OF_INSTANCE {
            return Ok(MemberToken::EndOfInstance);
        }
        match raw.strip_suffix(PROPERTY_SEPARATOR) {
            Some(name) => Ok(MemberToken::Property(name.to_string())),
            None => Err(CodecError::invalid_format(format!(
                "property name missing separator: {raw}"
            ))),
        }
    }
}
