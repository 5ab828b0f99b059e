//! Ready-made stores and record builders.
//!
//! The standard fixture registers four tables:
//!
//! - `test::User` — flat record with a `by_name` index and a dual
//!   `by_name_age` index
//! - `test::Customer` — flat record, target of foreign references
//! - `test::Order` — two foreign references into `test::Customer`
//!   plus an inline nested `test::Line` list
//! - `test::Node` — self-referential `peer` field for cycle tests

use lodestore_codec::PrimitiveKind;
use lodestore_core::{
    FieldKind, Key, Record, Scalar, SharedRecord, TableCatalog, TableRegistration, TableSchema,
    Value,
};
use lodestore_driver::{FileDriver, MemoryDriver};
use std::sync::Arc;
use tempfile::TempDir;

/// Type name of the user fixture table.
pub const USER: &str = "test::User";
/// Type name of the customer fixture table.
pub const CUSTOMER: &str = "test::Customer";
/// Type name of the order fixture table.
pub const ORDER: &str = "test::Order";
/// Type name of the self-referential node fixture table.
pub const NODE: &str = "test::Node";

/// Schema for the user table.
#[must_use]
pub fn user_schema() -> TableSchema {
    TableSchema::new(USER)
        .field("id", FieldKind::Primitive(PrimitiveKind::I64))
        .field("name", FieldKind::Primitive(PrimitiveKind::Text))
        .field("age", FieldKind::Primitive(PrimitiveKind::I64))
        .field(
            "tags",
            FieldKind::List(Box::new(FieldKind::Primitive(PrimitiveKind::Text))),
        )
}

/// Schema for the customer table.
#[must_use]
pub fn customer_schema() -> TableSchema {
    TableSchema::new(CUSTOMER)
        .field("id", FieldKind::Primitive(PrimitiveKind::I64))
        .field("name", FieldKind::Primitive(PrimitiveKind::Text))
}

/// Schema for the order table.
#[must_use]
pub fn order_schema() -> TableSchema {
    TableSchema::new(ORDER)
        .field("id", FieldKind::Primitive(PrimitiveKind::I64))
        .field("customer", FieldKind::Foreign(CUSTOMER.into()))
        .field("contact", FieldKind::Foreign(CUSTOMER.into()))
        .field(
            "lines",
            FieldKind::List(Box::new(FieldKind::Nested("test::Line".into()))),
        )
}

/// Schema for the node table.
#[must_use]
pub fn node_schema() -> TableSchema {
    TableSchema::new(NODE)
        .field("id", FieldKind::Primitive(PrimitiveKind::I64))
        .field("label", FieldKind::Primitive(PrimitiveKind::Text))
        .field("peer", FieldKind::Foreign(NODE.into()))
}

fn id_key(rec: &Record) -> Key {
    Key::Int(rec.get("id").and_then(Value::as_int).unwrap_or(0))
}

/// Registers the standard fixture tables and indexes on a catalog.
///
/// # Panics
///
/// Panics on registration failure; fixtures are for tests.
pub fn register_standard_tables(catalog: &TableCatalog) {
    catalog
        .register(TableRegistration::new(user_schema(), id_key))
        .unwrap();
    catalog
        .register(TableRegistration::new(customer_schema(), id_key))
        .unwrap();
    catalog
        .register(TableRegistration::new(order_schema(), id_key))
        .unwrap();
    catalog
        .register(TableRegistration::new(node_schema(), id_key))
        .unwrap();
    catalog
        .register_index(USER, "by_name", |rec| {
            Scalar::Text(rec.get("name").and_then(Value::as_text).unwrap_or("").into())
        })
        .unwrap();
    catalog
        .register_dual_index(USER, "by_name_age", |rec| {
            (
                Scalar::Text(rec.get("name").and_then(Value::as_text).unwrap_or("").into()),
                Scalar::Int(rec.get("age").and_then(Value::as_int).unwrap_or(0)),
            )
        })
        .unwrap();
}

/// A published in-memory store with the standard tables.
pub struct MemoryStore {
    /// The shared driver, kept for write-count assertions.
    pub driver: Arc<MemoryDriver>,
    /// The published catalog.
    pub catalog: TableCatalog,
}

impl MemoryStore {
    /// Builds and publishes the store.
    ///
    /// # Panics
    ///
    /// Panics on registration or publish failure.
    #[must_use]
    pub fn open() -> Self {
        let driver = Arc::new(MemoryDriver::new());
        let catalog = TableCatalog::new(Arc::clone(&driver) as Arc<dyn lodestore_driver::StorageDriver>);
        register_standard_tables(&catalog);
        catalog.publish().unwrap();
        MemoryStore { driver, catalog }
    }
}

/// A published file-backed store with the standard tables, rooted in a
/// temporary directory that lives as long as the fixture.
pub struct FileStore {
    /// Owns the on-disk root.
    pub dir: TempDir,
    /// The published catalog.
    pub catalog: TableCatalog,
}

impl FileStore {
    /// Builds and publishes the store in a fresh temp directory.
    ///
    /// # Panics
    ///
    /// Panics on driver, registration, or publish failure.
    #[must_use]
    pub fn open() -> Self {
        Self::reopen_at(TempDir::new().unwrap())
    }

    /// Opens a store over an existing directory, as a process restart
    /// would.
    ///
    /// # Panics
    ///
    /// Panics on driver, registration, or publish failure.
    #[must_use]
    pub fn reopen_at(dir: TempDir) -> Self {
        let driver = FileDriver::open(dir.path()).unwrap();
        let catalog = TableCatalog::new(Arc::new(driver));
        register_standard_tables(&catalog);
        catalog.publish().unwrap();
        FileStore { dir, catalog }
    }

    /// Closes the catalog (flushing it) and hands back the directory.
    #[must_use]
    pub fn close(self) -> TempDir {
        drop(self.catalog);
        self.dir
    }
}

/// Builds a user record.
#[must_use]
pub fn user(id: i64, name: &str, age: i64) -> SharedRecord {
    Record::shared(
        Record::new(USER)
            .with("id", Value::int(id))
            .with("name", Value::text(name))
            .with("age", Value::int(age))
            .with("tags", Value::List(Vec::new())),
    )
}

/// Builds a customer record.
#[must_use]
pub fn customer(id: i64, name: &str) -> SharedRecord {
    Record::shared(
        Record::new(CUSTOMER)
            .with("id", Value::int(id))
            .with("name", Value::text(name)),
    )
}

/// Builds an order referencing a customer for both foreign fields.
#[must_use]
pub fn order(id: i64, customer: &SharedRecord) -> SharedRecord {
    Record::shared(
        Record::new(ORDER)
            .with("id", Value::int(id))
            .with("customer", Value::Object(Arc::clone(customer)))
            .with("contact", Value::Object(Arc::clone(customer)))
            .with("lines", Value::List(Vec::new())),
    )
}

/// Builds an order line, a nested (unregistered) record.
#[must_use]
pub fn order_line(sku: &str, quantity: i64) -> Value {
    Value::Object(Record::shared(
        Record::new("test::Line")
            .with("sku", Value::text(sku))
            .with("quantity", Value::int(quantity)),
    ))
}

/// Builds a node with no peer.
#[must_use]
pub fn node(id: i64, label: &str) -> SharedRecord {
    Record::shared(
        Record::new(NODE)
            .with("id", Value::int(id))
            .with("label", Value::text(label))
            .with("peer", Value::Null),
    )
}

/// Links two nodes into a two-node cycle.
pub fn link_peers(a: &SharedRecord, b: &SharedRecord) {
    a.write().set("peer", Value::Object(Arc::clone(b)));
    b.write().set("peer", Value::Object(Arc::clone(a)));
}
