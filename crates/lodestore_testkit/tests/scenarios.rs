//! End-to-end scenarios over published stores.

use lodestore_core::{
    Key, Record, Scalar, SharedRecord, StoreError, TableCatalog, TableRegistration, TableSchema,
    TableTrigger, Value,
};
use lodestore_codec::PrimitiveKind;
use lodestore_core::FieldKind;
use lodestore_driver::MemoryDriver;
use lodestore_testkit::prelude::*;
use proptest::prelude::*;
use std::sync::{Arc, Mutex};

#[test]
fn two_node_cycle_saves_each_instance_once() {
    let store = MemoryStore::open();
    let a = node(1, "a");
    let b = node(2, "b");
    link_peers(&a, &b);

    let key = store.catalog.save(&a).unwrap();
    assert_eq!(key, Key::Int(1));
    assert_eq!(store.driver.instance_count(), 2);
    assert_eq!(store.catalog.count(NODE).unwrap(), 2);
}

#[test]
fn two_node_cycle_loads_back_as_one_cycle() {
    let store = MemoryStore::open();
    let a = node(1, "a");
    let b = node(2, "b");
    link_peers(&a, &b);
    store.catalog.save(&a).unwrap();

    let loaded_a = store.catalog.load(NODE, &Key::Int(1)).unwrap().unwrap();
    let loaded_b = loaded_a
        .read()
        .get("peer")
        .and_then(Value::as_object)
        .cloned()
        .unwrap();
    assert_eq!(loaded_b.read().get("id").and_then(Value::as_int), Some(2));

    // b's peer is the very record we started from, not a copy.
    let back = loaded_b
        .read()
        .get("peer")
        .and_then(Value::as_object)
        .cloned()
        .unwrap();
    assert!(Arc::ptr_eq(&back, &loaded_a));
}

#[test]
fn shared_customer_written_once_per_save() {
    let store = MemoryStore::open();
    let acme = customer(10, "acme");
    let ord = order(1, &acme);

    store.catalog.save(&ord).unwrap();
    // One order record plus one customer record, even though the
    // customer appears behind two foreign fields.
    assert_eq!(store.driver.instance_count(), 2);

    let loaded = store.catalog.load(ORDER, &Key::Int(1)).unwrap().unwrap();
    let rec = loaded.read();
    let cust = rec.get("customer").and_then(Value::as_object).unwrap();
    let contact = rec.get("contact").and_then(Value::as_object).unwrap();
    assert!(Arc::ptr_eq(cust, contact));
    assert_eq!(cust.read().get("name").and_then(Value::as_text), Some("acme"));
}

#[test]
fn deleted_foreign_target_reads_as_null() {
    let store = MemoryStore::open();
    let acme = customer(10, "acme");
    let ord = order(1, &acme);
    store.catalog.save(&ord).unwrap();

    store.catalog.delete(CUSTOMER, &Key::Int(10)).unwrap();
    let loaded = store.catalog.load(ORDER, &Key::Int(1)).unwrap().unwrap();
    assert!(loaded.read().get("customer").unwrap().is_null());
}

#[test]
fn nested_lines_and_maps_roundtrip() {
    let store = MemoryStore::open();
    let acme = customer(10, "acme");
    let ord = order(1, &acme);
    let mut line = Record::new("test::Line")
        .with("sku", Value::text("bolt-m4"))
        .with("quantity", Value::int(12));
    line.set(
        "attrs",
        Value::Map(vec![(Value::text("finish"), Value::text("zinc"))]),
    );
    ord.write().set(
        "lines",
        Value::List(vec![Value::Object(Record::shared(line)), order_line("nut-m4", 24)]),
    );
    store.catalog.save(&ord).unwrap();

    let loaded = store.catalog.load(ORDER, &Key::Int(1)).unwrap().unwrap();
    let rec = loaded.read();
    let Some(Value::List(lines)) = rec.get("lines") else {
        panic!("lines missing");
    };
    assert_eq!(lines.len(), 2);
    let first = lines[0].as_object().unwrap().read();
    assert_eq!(first.type_name(), "test::Line");
    assert_eq!(first.get("sku").and_then(Value::as_text), Some("bolt-m4"));
    let Some(Value::Map(attrs)) = first.get("attrs") else {
        panic!("attrs missing");
    };
    assert_eq!(attrs[0].1.as_text(), Some("zinc"));
}

#[test]
fn dual_index_orders_by_both_columns() {
    let store = MemoryStore::open();
    store.catalog.save(&user(1, "ada", 40)).unwrap();
    store.catalog.save(&user(2, "ada", 30)).unwrap();
    store.catalog.save(&user(3, "zoe", 20)).unwrap();

    let hits = store.catalog.query(USER, "by_name_age").unwrap();
    let keys: Vec<_> = hits.iter().map(|h| h.key().clone()).collect();
    assert_eq!(keys, [Key::Int(2), Key::Int(1), Key::Int(3)]);
    assert_eq!(hits[0].value().second(), Some(&Scalar::Int(30)));
}

#[test]
fn index_queries_answer_without_loading_instances() {
    let store = MemoryStore::open();
    store.catalog.save(&user(1, "ada", 40)).unwrap();
    store.catalog.save(&user(2, "zoe", 20)).unwrap();
    let writes_before_query = store.driver.instance_count();

    let hits = store.catalog.query(USER, "by_name").unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(
        hits[0].value().first(),
        &Scalar::Text("ada".into())
    );
    // Projected values came from the index alone.
    assert_eq!(store.driver.instance_count(), writes_before_query);
    assert!(hits.iter().all(|h| h.cached().is_none()));
}

#[test]
fn delete_clears_index_entries() {
    let store = MemoryStore::open();
    store.catalog.save(&user(1, "ada", 40)).unwrap();

    let hits = store.catalog.query(USER, "by_name").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].key(), &Key::Int(1));

    store.catalog.delete(USER, &Key::Int(1)).unwrap();
    assert!(store.catalog.query(USER, "by_name").unwrap().is_empty());
    assert!(store.catalog.query(USER, "by_name_age").unwrap().is_empty());
}

#[test]
fn file_store_persists_across_reopen() {
    let store = FileStore::open();
    store.catalog.save(&user(7, "ada", 33)).unwrap();
    store.catalog.flush().unwrap();
    let dir = store.close();

    let reopened = FileStore::reopen_at(dir);
    let loaded = reopened.catalog.load(USER, &Key::Int(7)).unwrap().unwrap();
    assert_eq!(loaded.read().get("name").and_then(Value::as_text), Some("ada"));

    // Indexes were persisted too: queries work before any load.
    let hits = reopened.catalog.query(USER, "by_name").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].key(), &Key::Int(7));
}

#[test]
fn clean_instance_prunes_the_whole_subgraph() {
    let driver = Arc::new(MemoryDriver::new());
    let catalog = TableCatalog::new(Arc::clone(&driver) as Arc<dyn lodestore_driver::StorageDriver>);
    catalog
        .register(TableRegistration::new(customer_schema(), |rec| {
            Key::Int(rec.get("id").and_then(Value::as_int).unwrap_or(0))
        }))
        .unwrap();
    catalog
        .register(
            TableRegistration::new(order_schema(), |rec| {
                Key::Int(rec.get("id").and_then(Value::as_int).unwrap_or(0))
            })
            .dirty_predicate(|_| false),
        )
        .unwrap();
    catalog.publish().unwrap();

    let ord = order(1, &customer(10, "acme"));
    let key = catalog.save(&ord).unwrap();
    assert_eq!(key, Key::Int(1));
    // A clean root writes nothing and never descends into members.
    assert_eq!(driver.instance_count(), 0);
}

#[test]
fn schema_drift_drops_members_the_schema_lost() {
    let driver = Arc::new(MemoryDriver::new());
    let v1 = TableSchema::new(USER)
        .field("id", FieldKind::Primitive(PrimitiveKind::I64))
        .field("name", FieldKind::Primitive(PrimitiveKind::Text))
        .field("nickname", FieldKind::Primitive(PrimitiveKind::Text));
    {
        let catalog =
            TableCatalog::new(Arc::clone(&driver) as Arc<dyn lodestore_driver::StorageDriver>);
        catalog
            .register(TableRegistration::new(v1, |rec| {
                Key::Int(rec.get("id").and_then(Value::as_int).unwrap_or(0))
            }))
            .unwrap();
        catalog.publish().unwrap();
        let u = Record::shared(
            Record::new(USER)
                .with("id", Value::int(1))
                .with("name", Value::text("ada"))
                .with("nickname", Value::text("countess")),
        );
        catalog.save(&u).unwrap();
        catalog.flush().unwrap();
    }

    let v2 = TableSchema::new(USER)
        .field("id", FieldKind::Primitive(PrimitiveKind::I64))
        .field("name", FieldKind::Primitive(PrimitiveKind::Text));
    let catalog =
        TableCatalog::new(Arc::clone(&driver) as Arc<dyn lodestore_driver::StorageDriver>);
    catalog
        .register(TableRegistration::new(v2, |rec| {
            Key::Int(rec.get("id").and_then(Value::as_int).unwrap_or(0))
        }))
        .unwrap();
    catalog.publish().unwrap();

    let loaded = catalog.load(USER, &Key::Int(1)).unwrap().unwrap();
    let rec = loaded.read();
    assert_eq!(rec.get("name").and_then(Value::as_text), Some("ada"));
    assert!(rec.get("nickname").is_none());
}

#[test]
fn property_converter_rescues_renamed_members() {
    let driver = Arc::new(MemoryDriver::new());
    let v1 = TableSchema::new(USER)
        .field("id", FieldKind::Primitive(PrimitiveKind::I64))
        .field("nickname", FieldKind::Primitive(PrimitiveKind::Text));
    {
        let catalog =
            TableCatalog::new(Arc::clone(&driver) as Arc<dyn lodestore_driver::StorageDriver>);
        catalog
            .register(TableRegistration::new(v1, |rec| {
                Key::Int(rec.get("id").and_then(Value::as_int).unwrap_or(0))
            }))
            .unwrap();
        catalog.publish().unwrap();
        let u = Record::shared(
            Record::new(USER)
                .with("id", Value::int(1))
                .with("nickname", Value::text("countess")),
        );
        catalog.save(&u).unwrap();
        catalog.flush().unwrap();
    }

    let v2 = TableSchema::new(USER)
        .field("id", FieldKind::Primitive(PrimitiveKind::I64))
        .field("alias", FieldKind::Primitive(PrimitiveKind::Text));
    let catalog =
        TableCatalog::new(Arc::clone(&driver) as Arc<dyn lodestore_driver::StorageDriver>);
    catalog
        .register(TableRegistration::new(v2, |rec| {
            Key::Int(rec.get("id").and_then(Value::as_int).unwrap_or(0))
        }))
        .unwrap();
    catalog
        .register_converter(
            USER,
            Arc::new(|prop, value| {
                if prop == "nickname" {
                    Some(("alias".to_owned(), value))
                } else {
                    None
                }
            }),
        )
        .unwrap();
    catalog.publish().unwrap();

    let loaded = catalog.load(USER, &Key::Int(1)).unwrap().unwrap();
    assert_eq!(
        loaded.read().get("alias").and_then(Value::as_text),
        Some("countess")
    );
}

#[test]
fn truncate_while_an_operation_is_in_flight_is_busy() {
    struct TruncateDuring {
        catalog: Arc<TableCatalog>,
        outcome: Mutex<Option<StoreError>>,
    }
    impl TableTrigger for TruncateDuring {
        fn after_save(&self, _: &SharedRecord, _: &Key) {
            *self.outcome.lock().unwrap() = self.catalog.truncate(USER).err();
        }
    }

    let catalog = Arc::new(TableCatalog::new(
        Arc::new(MemoryDriver::new()) as Arc<dyn lodestore_driver::StorageDriver>
    ));
    register_standard_tables(&catalog);
    catalog.publish().unwrap();
    let trigger = Arc::new(TruncateDuring {
        catalog: Arc::clone(&catalog),
        outcome: Mutex::new(None),
    });
    catalog
        .register_trigger(USER, Arc::clone(&trigger) as Arc<dyn TableTrigger>)
        .unwrap();

    catalog.save(&user(1, "ada", 30)).unwrap();
    let outcome = trigger.outcome.lock().unwrap().take();
    assert!(matches!(outcome, Some(StoreError::Busy { .. })));
    // The save itself still landed.
    assert_eq!(catalog.count(USER).unwrap(), 1);
}

#[test]
fn truncate_leaves_other_tables_alone() {
    let store = MemoryStore::open();
    store.catalog.save(&user(1, "ada", 30)).unwrap();
    let ord = order(1, &customer(10, "acme"));
    store.catalog.save(&ord).unwrap();

    store.catalog.truncate(CUSTOMER).unwrap();
    assert_eq!(store.catalog.count(CUSTOMER).unwrap(), 0);
    assert_eq!(store.catalog.count(ORDER).unwrap(), 1);
    assert_eq!(store.catalog.count(USER).unwrap(), 1);
}

#[test]
fn purge_empties_every_table() {
    let store = MemoryStore::open();
    store.catalog.save(&user(1, "ada", 30)).unwrap();
    store.catalog.save(&order(1, &customer(10, "acme"))).unwrap();

    store.catalog.purge().unwrap();
    assert_eq!(store.catalog.count(USER).unwrap(), 0);
    assert_eq!(store.catalog.count(ORDER).unwrap(), 0);
    assert_eq!(store.catalog.count(CUSTOMER).unwrap(), 0);
    assert_eq!(store.driver.instance_count(), 0);

    // The store works normally afterwards.
    store.catalog.save(&user(2, "zoe", 20)).unwrap();
    assert_eq!(store.catalog.count(USER).unwrap(), 1);
}

#[test]
fn backup_restores_foreign_graphs_and_indexes() {
    let source = MemoryStore::open();
    source.catalog.save(&order(1, &customer(10, "acme"))).unwrap();
    source.catalog.save(&user(1, "ada", 30)).unwrap();
    let stream = source.catalog.backup().unwrap();

    let target = MemoryStore::open();
    let stats = target.catalog.restore(&stream).unwrap();
    assert_eq!(stats.tables_restored, 4);
    assert_eq!(stats.instances_restored, 3);

    let ord = target.catalog.load(ORDER, &Key::Int(1)).unwrap().unwrap();
    let rec = ord.read();
    let cust = rec.get("customer").and_then(Value::as_object).unwrap();
    assert_eq!(cust.read().get("name").and_then(Value::as_text), Some("acme"));

    let hits = target.catalog.query(USER, "by_name").unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].value().first(), &Scalar::Text("ada".into()));
}

#[test]
fn refresh_discards_unflushed_sibling_state() {
    // Two catalogs over one driver act like two sessions; refresh
    // picks up what the other session flushed.
    let driver = Arc::new(MemoryDriver::new());
    let a = TableCatalog::new(Arc::clone(&driver) as Arc<dyn lodestore_driver::StorageDriver>);
    register_standard_tables(&a);
    a.publish().unwrap();
    let b = TableCatalog::new(Arc::clone(&driver) as Arc<dyn lodestore_driver::StorageDriver>);
    register_standard_tables(&b);
    b.publish().unwrap();

    a.save(&user(1, "ada", 30)).unwrap();
    a.flush().unwrap();

    assert_eq!(b.count(USER).unwrap(), 0);
    b.refresh().unwrap();
    assert_eq!(b.count(USER).unwrap(), 1);
    let loaded = b.load(USER, &Key::Int(1)).unwrap().unwrap();
    assert_eq!(loaded.read().get("name").and_then(Value::as_text), Some("ada"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn user_batches_roundtrip(users in arb_user_batch(16)) {
        let store = MemoryStore::open();
        let token = lodestore_core::CancelToken::new();
        let keys = store.catalog.save_all(&users, &token).unwrap();
        prop_assert_eq!(keys.len(), users.len());

        let loaded = store.catalog.load_all(USER, &token).unwrap();
        prop_assert_eq!(loaded.len(), users.len());
        for original in &users {
            let orig = original.read();
            let key = Key::Int(orig.get("id").and_then(Value::as_int).unwrap());
            let found = store.catalog.load(USER, &key).unwrap().unwrap();
            let found = found.read();
            prop_assert_eq!(
                found.get("name").and_then(Value::as_text),
                orig.get("name").and_then(Value::as_text)
            );
            prop_assert_eq!(
                found.get("age").and_then(Value::as_int),
                orig.get("age").and_then(Value::as_int)
            );
        }
    }

    #[test]
    fn single_user_roundtrips(u in arb_user()) {
        let store = MemoryStore::open();
        let key = store.catalog.save(&u).unwrap();
        let loaded = store.catalog.load(USER, &key).unwrap().unwrap();
        let (orig, got) = (u.read(), loaded.read());
        prop_assert_eq!(
            got.get("name").and_then(Value::as_text),
            orig.get("name").and_then(Value::as_text)
        );
        let Some(Value::List(orig_tags)) = orig.get("tags") else { panic!() };
        let Some(Value::List(got_tags)) = got.get("tags") else { panic!() };
        prop_assert_eq!(got_tags.len(), orig_tags.len());
    }
}
