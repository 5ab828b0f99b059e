//! Recursive object-graph codec.
//!
//! The encoder walks an instance's schema, serializing primitives and
//! containers inline, nested records as inline member lists, and
//! table-typed members as foreign references: the member's instance is
//! saved in its own table (recursively, through the catalog) and only
//! its key lands in the parent's payload. The decoder mirrors the
//! walk, resolving foreign keys back into shared records.
//!
//! Both directions thread one [`CycleCache`] through the whole walk so
//! an instance appearing at several points of the graph, including on
//! a cycle, is serialized or materialized exactly once.
//!
//! Wire shape of a stored instance:
//!
//! ```text
//! [null:u16] [type_id:i32] member* [END_OF_INSTANCE]
//! member  := [name ':'] [type_id:i32] [null:u16] payload
//! element := [type_id:i32] [null:u16] payload
//! ```
//!
//! Container payloads are a count followed by elements; map payloads
//! interleave key and value elements. A foreign reference's payload is
//! the target's key.

use crate::catalog::TableCatalog;
use crate::cycle::CycleCache;
use crate::error::{StoreError, StoreResult};
use crate::schema::FieldKind;
use crate::types::{Key, TypeId};
use crate::value::{Record, SharedRecord, Value};
use lodestore_codec::{MemberToken, Primitive, RecordReader, RecordWriter};

/// The type name written for a null member with no declared kind to
/// fall back on. Any name works: the null marker short-circuits the
/// payload on decode.
const NULL_FALLBACK_TYPE: &str = "string";

pub(crate) struct GraphEncoder<'a> {
    pub catalog: &'a TableCatalog,
}

impl GraphEncoder<'_> {
    /// Encodes one table instance to its stored byte form.
    pub fn encode_instance(
        &self,
        instance: &SharedRecord,
        cache: &mut CycleCache,
    ) -> StoreResult<Vec<u8>> {
        let mut w = RecordWriter::new();
        w.put_null_marker(false);
        let rec = instance.read_recursive();
        let type_id = self.catalog.type_id_for(rec.type_name());
        w.put_i32(type_id.as_i32());
        self.write_members(&rec, &mut w, cache)?;
        Ok(w.into_bytes())
    }

    /// Writes members followed by the end-of-instance sentinel.
    ///
    /// Table types encode in schema order; a declared field missing
    /// from the instance encodes as null, and instance fields absent
    /// from the schema are not encoded at all. Unregistered (nested)
    /// types have no schema and encode in field insertion order.
    fn write_members(
        &self,
        rec: &Record,
        w: &mut RecordWriter,
        cache: &mut CycleCache,
    ) -> StoreResult<()> {
        match self.catalog.schema_of(rec.type_name()) {
            Some(schema) => {
                for field in schema.fields() {
                    let value = rec.get(&field.name).unwrap_or(&Value::Null);
                    self.write_member(&field.name, Some(&field.kind), value, w, cache)?;
                }
            }
            None => {
                for (name, value) in rec.fields() {
                    self.write_member(name, None, value, w, cache)?;
                }
            }
        }
        w.put_end_of_instance();
        Ok(())
    }

    fn write_member(
        &self,
        name: &str,
        declared: Option<&FieldKind>,
        value: &Value,
        w: &mut RecordWriter,
        cache: &mut CycleCache,
    ) -> StoreResult<()> {
        w.put_property_name(name);
        let type_name = wire_type_name(value, declared);
        let type_id = self.catalog.type_id_for(&type_name);
        w.put_i32(type_id.as_i32());
        self.write_payload(value, w, cache)
    }

    fn write_element(
        &self,
        value: &Value,
        w: &mut RecordWriter,
        cache: &mut CycleCache,
    ) -> StoreResult<()> {
        let type_name = wire_type_name(value, None);
        let type_id = self.catalog.type_id_for(&type_name);
        w.put_i32(type_id.as_i32());
        self.write_payload(value, w, cache)
    }

    fn write_payload(
        &self,
        value: &Value,
        w: &mut RecordWriter,
        cache: &mut CycleCache,
    ) -> StoreResult<()> {
        match value {
            Value::Null => {
                w.put_null_marker(true);
                Ok(())
            }
            Value::Prim(p) => {
                w.put_null_marker(false);
                p.encode(w);
                Ok(())
            }
            Value::List(items) | Value::Array(items) => {
                w.put_null_marker(false);
                w.put_i32(count_i32(items.len())?);
                for item in items {
                    self.write_element(item, w, cache)?;
                }
                Ok(())
            }
            Value::Map(entries) => {
                w.put_null_marker(false);
                w.put_i32(count_i32(entries.len())?);
                for (k, v) in entries {
                    self.write_element(k, w, cache)?;
                    self.write_element(v, w, cache)?;
                }
                Ok(())
            }
            Value::Object(obj) => {
                let type_name = obj.read_recursive().type_name().to_owned();
                if self.catalog.is_table_type(&type_name) {
                    // Foreign reference: the member persists in its own
                    // table and only the key lands here. The recursive
                    // save shares this operation's cycle cache.
                    w.put_null_marker(false);
                    let key = self.catalog.save_in_flight(obj, cache)?;
                    key.encode(w);
                    Ok(())
                } else if cache.check_by_reference(obj) {
                    // A keyless nested record revisited on a cycle has
                    // no key to reference it by; it encodes as null.
                    w.put_null_marker(true);
                    Ok(())
                } else {
                    cache.add(&type_name, obj, None);
                    w.put_null_marker(false);
                    let rec = obj.read_recursive();
                    self.write_members(&rec, w, cache)
                }
            }
        }
    }
}

/// The type name written to the wire for a member holding `value`.
///
/// Runtime type wins over declared kind, so a field can hold a
/// subtype-aliased record and decode back to its concrete type. The
/// declared kind only matters for nulls, which carry no type of their
/// own.
fn wire_type_name(value: &Value, declared: Option<&FieldKind>) -> String {
    match value {
        Value::Null => declared
            .map(FieldKind::type_name)
            .unwrap_or_else(|| NULL_FALLBACK_TYPE.to_owned()),
        Value::Prim(p) => p.type_name().to_owned(),
        Value::List(_) => "list".to_owned(),
        Value::Array(_) => "array".to_owned(),
        Value::Map(_) => "map".to_owned(),
        Value::Object(obj) => obj.read_recursive().type_name().to_owned(),
    }
}

fn count_i32(len: usize) -> StoreResult<i32> {
    i32::try_from(len)
        .map_err(|_| StoreError::invalid_format(format!("container too large: {len} elements")))
}

pub(crate) struct GraphDecoder<'a> {
    pub catalog: &'a TableCatalog,
}

impl GraphDecoder<'_> {
    /// Decodes stored bytes back into a shared record.
    ///
    /// The embedded type id, not the table's declared type, names the
    /// produced record, so an instance saved through an alias comes
    /// back as its concrete type.
    pub fn decode_instance(
        &self,
        key: &Key,
        bytes: &[u8],
        cache: &mut CycleCache,
    ) -> StoreResult<Option<SharedRecord>> {
        let mut r = RecordReader::new(bytes);
        if r.get_null_marker()? {
            return Ok(None);
        }
        let type_id = TypeId::new(r.get_i32()?);
        let type_name = self.catalog.resolve_type_name(type_id)?;
        let instance = Record::shared(Record::new(&type_name));
        // Registered before members decode, so a cycle back to this
        // instance resolves from the cache instead of recursing.
        cache.add(&type_name, &instance, Some(key));
        self.read_members(&instance, &type_name, &mut r, cache)?;
        Ok(Some(instance))
    }

    fn read_members(
        &self,
        instance: &SharedRecord,
        type_name: &str,
        r: &mut RecordReader<'_>,
        cache: &mut CycleCache,
    ) -> StoreResult<()> {
        let schema = self.catalog.schema_of(type_name);
        loop {
            match r.get_member_token()? {
                MemberToken::EndOfInstance => break,
                MemberToken::Property(prop) => {
                    let type_id = TypeId::new(r.get_i32()?);
                    let wire_type = self.catalog.resolve_type_name(type_id)?;
                    // Decoded before the schema check so unknown
                    // members still advance the reader.
                    let value = self.read_payload(&wire_type, r, cache)?;
                    self.apply_member(instance, type_name, schema.as_ref(), prop, value);
                }
            }
        }
        Ok(())
    }

    /// Applies one decoded member, tolerating schema drift: a member
    /// the current schema does not declare is offered to the table's
    /// property converter, and dropped if no converter claims it.
    fn apply_member(
        &self,
        instance: &SharedRecord,
        type_name: &str,
        schema: Option<&crate::schema::TableSchema>,
        prop: String,
        value: Value,
    ) {
        if let Some(schema) = schema {
            if schema.field_kind(&prop).is_none() {
                if let Some(convert) = self.catalog.converter_for(type_name) {
                    if let Some((new_name, new_value)) = convert(&prop, value) {
                        instance.write().set(new_name, new_value);
                        return;
                    }
                }
                tracing::debug!(
                    type_name,
                    property = %prop,
                    "dropping stored member absent from current schema"
                );
                return;
            }
        }
        instance.write().set(prop, value);
    }

    fn read_payload(
        &self,
        wire_type: &str,
        r: &mut RecordReader<'_>,
        cache: &mut CycleCache,
    ) -> StoreResult<Value> {
        if r.get_null_marker()? {
            return Ok(Value::Null);
        }
        if Primitive::can_encode(wire_type) {
            return Ok(Value::Prim(Primitive::decode_named(wire_type, r)?));
        }
        match wire_type {
            "list" => Ok(Value::List(self.read_elements(r, cache)?)),
            "array" => Ok(Value::Array(self.read_elements(r, cache)?)),
            "map" => {
                let count = read_count(r)?;
                let mut entries = Vec::new();
                for _ in 0..count {
                    let k = self.read_element(r, cache)?;
                    let v = self.read_element(r, cache)?;
                    entries.push((k, v));
                }
                Ok(Value::Map(entries))
            }
            name if self.catalog.is_table_type(name) => {
                let key = Key::decode(r)?;
                if let Some(hit) = cache.check_by_key(name, &key) {
                    return Ok(Value::Object(hit));
                }
                match self.catalog.load_in_flight(name, &key, cache)? {
                    Some(obj) => Ok(Value::Object(obj)),
                    // The referenced instance was deleted after this
                    // one was saved; the dangling reference reads as
                    // null.
                    None => Ok(Value::Null),
                }
            }
            nested => {
                let instance = Record::shared(Record::new(nested));
                cache.add(nested, &instance, None);
                self.read_members(&instance, nested, r, cache)?;
                Ok(Value::Object(instance))
            }
        }
    }

    fn read_elements(
        &self,
        r: &mut RecordReader<'_>,
        cache: &mut CycleCache,
    ) -> StoreResult<Vec<Value>> {
        let count = read_count(r)?;
        let mut items = Vec::new();
        for _ in 0..count {
            items.push(self.read_element(r, cache)?);
        }
        Ok(items)
    }

    fn read_element(
        &self,
        r: &mut RecordReader<'_>,
        cache: &mut CycleCache,
    ) -> StoreResult<Value> {
        let type_id = TypeId::new(r.get_i32()?);
        let wire_type = self.catalog.resolve_type_name(type_id)?;
        self.read_payload(&wire_type, r, cache)
    }
}

fn read_count(r: &mut RecordReader<'_>) -> StoreResult<i32> {
    let count = r.get_i32()?;
    if count < 0 {
        return Err(StoreError::invalid_format(format!(
            "negative container count: {count}"
        )));
    }
    Ok(count)
}
