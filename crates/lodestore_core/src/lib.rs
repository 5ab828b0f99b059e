//! # Lodestore Core
//!
//! Embedded object-graph persistence: typed tables with key
//! extractors, secondary indexes, a recursive binary codec with
//! foreign-table references, cycle-safe graph traversal, and pluggable
//! storage drivers.
//!
//! The front door is [`TableCatalog`]: register tables (explicit
//! schemas plus key extractors), optionally add indexes, triggers,
//! interceptors, and aliases, then [`publish`](TableCatalog::publish)
//! and operate.
//!
//! ```
//! use lodestore_core::{
//!     FieldKind, Key, Record, TableCatalog, TableRegistration, TableSchema, Value,
//! };
//! use lodestore_codec::PrimitiveKind;
//! use lodestore_driver::MemoryDriver;
//! use std::sync::Arc;
//!
//! # fn main() -> lodestore_core::StoreResult<()> {
//! let catalog = TableCatalog::new(Arc::new(MemoryDriver::new()));
//! let schema = TableSchema::new("app::User")
//!     .field("id", FieldKind::Primitive(PrimitiveKind::I64))
//!     .field("name", FieldKind::Primitive(PrimitiveKind::Text));
//! catalog.register(TableRegistration::new(schema, |rec| {
//!     Key::Int(rec.get("id").and_then(Value::as_int).unwrap_or(0))
//! }))?;
//! catalog.publish()?;
//!
//! let user = Record::shared(
//!     Record::new("app::User")
//!         .with("id", Value::int(1))
//!         .with("name", Value::text("ada")),
//! );
//! let key = catalog.save(&user)?;
//! let loaded = catalog.load("app::User", &key)?.unwrap();
//! assert_eq!(loaded.read().get("name").and_then(Value::as_text), Some("ada"));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backup;
mod cancel;
mod catalog;
mod codec;
mod config;
mod cycle;
mod error;
mod events;
mod index;
mod interceptor;
mod keytable;
mod schema;
mod trigger;
mod typeindex;
mod types;
mod value;

pub use backup::{BackupMetadata, RestoreStats};
pub use cancel::CancelToken;
pub use catalog::{
    DirtyPredicate, KeyExtractor, PropertyConverter, TableCatalog, TableRegistration,
};
pub use config::Config;
pub use cycle::CycleCache;
pub use error::{StoreError, StoreResult};
pub use events::{CancelNotice, EventBus, EventKind, StoreEvent};
pub use index::{DualExtractor, IndexEntry, IndexTable, IndexValue, Indexer, SingleExtractor};
pub use interceptor::{ByteInterceptor, XorInterceptor};
pub use keytable::KeyTable;
pub use schema::{FieldKind, FieldSchema, TableSchema};
pub use trigger::{TableTrigger, TriggerKind};
pub use typeindex::TypeIndex;
pub use types::{Key, Scalar, SlotIndex, TypeId};
pub use value::{Record, SharedRecord, Value};
