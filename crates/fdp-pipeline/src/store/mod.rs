//! Relational store boundary
//!
//! Ingest writes a [`Table`] through [`RelationalStore::replace_table`] and
//! Extract reads it back with [`RelationalStore::select_all`].

use async_trait::async_trait;
use fdp_common::{Result, Table};

pub mod postgres;

pub use postgres::PostgresStore;

/// A store that holds whole tables by name
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Drop `name` if it exists, recreate it from the table's schema, and
    /// insert every row. Returns the number of rows inserted.
    ///
    /// Implementations must leave the previous table intact on failure.
    ///
    /// Any typed table is accepted, including `Date` columns. Ingest only
    /// produces the types inferred from raw text; callers holding a cleaned
    /// table can store it unchanged.
    async fn replace_table(&self, name: &str, table: &Table) -> Result<u64>;

    /// Read every row and column of `name` in store-native order
    async fn select_all(&self, name: &str) -> Result<Table>;
}

/// Quote an identifier verbatim, doubling embedded quotes
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
