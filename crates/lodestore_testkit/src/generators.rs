//! Proptest strategies over the fixture tables.

use crate::fixtures::USER;
use lodestore_core::{Record, SharedRecord, Value};
use proptest::prelude::*;

/// A user record with a bounded id, printable name, and tag list.
pub fn arb_user() -> impl Strategy<Value = SharedRecord> {
    (
        1i64..10_000,
        "[a-z]{1,12}",
        0i64..120,
        proptest::collection::vec("[a-z]{1,8}", 0..4),
    )
        .prop_map(|(id, name, age, tags)| {
            let tags = tags.into_iter().map(Value::text).collect();
            Record::shared(
                Record::new(USER)
                    .with("id", Value::int(id))
                    .with("name", Value::text(name))
                    .with("age", Value::int(age))
                    .with("tags", Value::List(tags)),
            )
        })
}

/// A batch of users with distinct ids.
pub fn arb_user_batch(max: usize) -> impl Strategy<Value = Vec<SharedRecord>> {
    proptest::collection::btree_map(1i64..10_000, ("[a-z]{1,12}", 0i64..120), 1..max).prop_map(
        |entries| {
            entries
                .into_iter()
                .map(|(id, (name, age))| {
                    Record::shared(
                        Record::new(USER)
                            .with("id", Value::int(id))
                            .with("name", Value::text(name))
                            .with("age", Value::int(age))
                            .with("tags", Value::List(Vec::new())),
                    )
                })
                .collect()
        },
    )
}
