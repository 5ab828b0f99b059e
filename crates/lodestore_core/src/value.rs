//! Dynamic record and value model.
//!
//! Instances are dynamic records: a type name plus an ordered list of
//! named fields. Records are shared behind `Arc<RwLock<_>>` so the
//! same instance can appear at several points of an object graph, and
//! so the cycle cache can detect revisits by pointer identity.

use lodestore_codec::Primitive;
use parking_lot::RwLock;
use std::sync::Arc;

/// A field value.
///
/// This is the closed set of shapes the codec can walk. There is no
/// open-ended variant; anything the engine persists is expressible in
/// these six.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent value.
    Null,
    /// A primitive scalar.
    Prim(Primitive),
    /// An ordered, growable sequence.
    List(Vec<Value>),
    /// A fixed-size sequence. Encoded identically to a list; the
    /// distinction only affects the declared field kind.
    Array(Vec<Value>),
    /// Ordered key/value entries.
    Map(Vec<(Value, Value)>),
    /// A nested or foreign record.
    Object(SharedRecord),
}

impl Value {
    /// Shorthand for an integer primitive.
    #[must_use]
    pub fn int(v: i64) -> Self {
        Value::Prim(Primitive::I64(v))
    }

    /// Shorthand for a string primitive.
    #[must_use]
    pub fn text(v: impl Into<String>) -> Self {
        Value::Prim(Primitive::Text(v.into()))
    }

    /// Shorthand for a boolean primitive.
    #[must_use]
    pub fn bool(v: bool) -> Self {
        Value::Prim(Primitive::Bool(v))
    }

    /// True if this value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the primitive inside, if any.
    #[must_use]
    pub fn as_prim(&self) -> Option<&Primitive> {
        match self {
            Value::Prim(p) => Some(p),
            _ => None,
        }
    }

    /// Returns the integer inside, if this is an integer primitive.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Prim(Primitive::I64(v)) => Some(*v),
            Value::Prim(Primitive::I32(v)) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Returns the string inside, if this is a text primitive.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Prim(Primitive::Text(v)) => Some(v),
            _ => None,
        }
    }

    /// Returns the shared record inside, if any.
    #[must_use]
    pub fn as_object(&self) -> Option<&SharedRecord> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }
}

/// A dynamic instance: a type name plus ordered named fields.
#[derive(Debug, Clone, Default)]
pub struct Record {
    type_name: String,
    fields: Vec<(String, Value)>,
}

/// A record shared across an object graph.
pub type SharedRecord = Arc<RwLock<Record>>;

impl Record {
    /// Creates an empty record of the given type.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Record {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    /// Wraps a record for sharing.
    #[must_use]
    pub fn shared(record: Record) -> SharedRecord {
        Arc::new(RwLock::new(record))
    }

    /// This record's type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Sets a field, replacing an existing field of the same name or
    /// appending a new one. Field order is insertion order.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Builder-style [`set`](Record::set).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set(name, value);
        self
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find_map(|(n, v)| (n == name).then_some(v))
    }

    /// Iterates fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
