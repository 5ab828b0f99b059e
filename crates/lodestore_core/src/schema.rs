//! Explicit table schemas.
//!
//! A table declares its fields up front. The codec walks the schema
//! (not the instance) when encoding a table-typed record, so encoded
//! member order is stable regardless of field insertion order, and
//! fields absent from an instance encode as null.

use lodestore_codec::PrimitiveKind;

/// The declared shape of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// A primitive scalar of the given kind.
    Primitive(PrimitiveKind),
    /// A growable sequence of elements.
    List(Box<FieldKind>),
    /// A fixed-size sequence of elements.
    Array(Box<FieldKind>),
    /// Ordered key/value entries.
    Map(Box<FieldKind>, Box<FieldKind>),
    /// A reference to an instance of another registered table,
    /// persisted in that table and encoded here as its key.
    Foreign(String),
    /// An owned record of an unregistered type, encoded inline.
    Nested(String),
}

impl FieldKind {
    /// The wire-level type name written for members of this kind when
    /// the runtime value is null and carries no type of its own.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            FieldKind::Primitive(kind) => kind.type_name().to_owned(),
            FieldKind::List(_) => "list".to_owned(),
            FieldKind::Array(_) => "array".to_owned(),
            FieldKind::Map(_, _) => "map".to_owned(),
            FieldKind::Foreign(name) | FieldKind::Nested(name) => name.clone(),
        }
    }

    /// Type names this kind mentions, including element kinds.
    /// Used to pre-intern ids when the catalog publishes.
    pub(crate) fn referenced_names(&self, out: &mut Vec<String>) {
        out.push(self.type_name());
        match self {
            FieldKind::List(el) | FieldKind::Array(el) => el.referenced_names(out),
            FieldKind::Map(k, v) => {
                k.referenced_names(out);
                v.referenced_names(out);
            }
            FieldKind::Primitive(_) | FieldKind::Foreign(_) | FieldKind::Nested(_) => {}
        }
    }
}

/// One declared field.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    /// Field name as written to the wire.
    pub name: String,
    /// Declared shape.
    pub kind: FieldKind,
}

/// The declared shape of one table.
#[derive(Debug, Clone)]
pub struct TableSchema {
    type_name: String,
    fields: Vec<FieldSchema>,
}

impl TableSchema {
    /// Starts a schema for the given type name.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        TableSchema {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    /// Adds a field. Declaration order is encoded order.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldSchema {
            name: name.into(),
            kind,
        });
        self
    }

    /// The type name this schema describes.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Declared fields in encoding order.
    #[must_use]
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    /// Looks up a field's declared kind.
    #[must_use]
    pub fn field_kind(&self, name: &str) -> Option<&FieldKind> {
        self.fields
            .iter()
            .find_map(|f| (f.name == name).then_some(&f.kind))
    }
}
