//! Type-name interning table.
//!
//! Every type name the codec writes is replaced on the wire by a
//! compact i32 id. Ids are assigned in interning order and the table
//! is append-only: a name, once interned, keeps its id for the life of
//! the store. The table persists as a single driver blob so stored
//! bytes remain decodable across sessions.

use crate::error::{StoreError, StoreResult};
use crate::types::TypeId;
use lodestore_codec::{PrimitiveKind, RecordReader, RecordWriter};
use std::collections::HashMap;

const MAGIC: &[u8; 4] = b"LSTI";
const VERSION: u16 = 1;

/// Names interned before any user type, in fixed order.
fn seed_names() -> Vec<String> {
    let mut names: Vec<String> = PrimitiveKind::ALL
        .iter()
        .map(|k| k.type_name().to_owned())
        .collect();
    names.extend(["list".to_owned(), "array".to_owned(), "map".to_owned()]);
    names
}

/// Append-only bidirectional name/id table.
#[derive(Debug)]
pub struct TypeIndex {
    names: Vec<String>,
    ids: HashMap<String, TypeId>,
    dirty: bool,
}

impl Default for TypeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeIndex {
    /// Creates a table pre-seeded with the primitive and container
    /// type names.
    #[must_use]
    pub fn new() -> Self {
        let mut index = TypeIndex {
            names: Vec::new(),
            ids: HashMap::new(),
            dirty: false,
        };
        for name in seed_names() {
            index.intern(&name);
        }
        index.dirty = false;
        index
    }

    /// Returns the id for a name, interning it if unseen.
    pub fn intern(&mut self, name: &str) -> TypeId {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let id = TypeId::new(self.names.len() as i32);
        self.names.push(name.to_owned());
        self.ids.insert(name.to_owned(), id);
        self.dirty = true;
        id
    }

    /// Looks up an already-interned name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<TypeId> {
        self.ids.get(name).copied()
    }

    /// Resolves an id back to its name.
    #[must_use]
    pub fn resolve(&self, id: TypeId) -> Option<&str> {
        usize::try_from(id.as_i32())
            .ok()
            .and_then(|i| self.names.get(i))
            .map(String::as_str)
    }

    /// Number of interned names, including seeds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True if only the seed names are present. Never true in
    /// practice since seeds are always interned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// True if an intern happened since the last encode.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Serializes the table. Does not touch the dirty flag; callers
    /// that persist the result follow up with
    /// [`mark_clean`](TypeIndex::mark_clean).
    pub fn encode(&self) -> Vec<u8> {
        let mut w = RecordWriter::new();
        w.put_blob(MAGIC);
        w.put_u16(VERSION);
        #[allow(clippy::cast_possible_truncation)]
        w.put_u32(self.names.len() as u32);
        for name in &self.names {
            w.put_string(name);
        }
        w.into_bytes()
    }

    /// Clears the dirty flag after a successful persist.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Deserializes a table previously produced by
    /// [`encode`](TypeIndex::encode).
    ///
    /// # Errors
    ///
    /// Returns an error on a bad magic, unknown version, or truncation.
    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        let mut r = RecordReader::new(bytes);
        if r.get_blob()? != MAGIC {
            return Err(StoreError::invalid_format("bad type index magic"));
        }
        let version = r.get_u16()?;
        if version != VERSION {
            return Err(StoreError::invalid_format(format!(
                "unsupported type index version: {version}"
            )));
        }
        let count = r.get_u32()? as usize;
        let mut index = TypeIndex {
            names: Vec::with_capacity(count),
            ids: HashMap::with_capacity(count),
            dirty: false,
        };
        for _ in 0..count {
            let name = r.get_string()?;
            index.intern(&name);
        }
        index.dirty = false;
        // A blob written before new seeds were introduced would miss
        // them; re-interning is append-only so existing ids are stable.
        for name in seed_names() {
            index.intern(&name);
        }
        Ok(index)
    }
}
