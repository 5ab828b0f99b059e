//! # Lodestore Testkit
//!
//! Shared fixtures, record builders, and proptest generators used by
//! the integration suites. Not published.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Everything a scenario test usually needs.
pub mod prelude {
    pub use crate::fixtures::{
        customer, customer_schema, link_peers, node, node_schema, order, order_line, order_schema,
        register_standard_tables, user, user_schema, FileStore, MemoryStore, CUSTOMER, NODE, ORDER,
        USER,
    };
    pub use crate::generators::{arb_user, arb_user_batch};
}
