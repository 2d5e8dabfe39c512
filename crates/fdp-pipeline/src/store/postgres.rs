// PostgreSQL implementation of the relational store
//
// Table replacement runs in a single transaction: DROP, CREATE, then
// multi-row INSERTs built with QueryBuilder. Batches are clamped so a single
// statement never exceeds PostgreSQL's 65,535 bind parameters.

use async_trait::async_trait;
use chrono::NaiveDate;
use fdp_common::{ColumnType, PipelineError, Result, Table, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, info};

use super::{quote_ident, RelationalStore};
use crate::config::DatabaseConfig;

/// Maximum bind parameters in one PostgreSQL statement
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Relational store backed by a PostgreSQL pool
pub struct PostgresStore {
    pool: PgPool,
    insert_batch_size: usize,
}

impl PostgresStore {
    /// Open a pool using the database configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect(&config.url)
            .await
            .map_err(|e| PipelineError::connection(format!("Failed to connect to database: {}", e)))?;

        debug!(max_connections = config.max_connections, "Database pool opened");

        Ok(Self::new(pool, config.insert_batch_size))
    }

    /// Wrap an existing pool
    pub fn new(pool: PgPool, insert_batch_size: usize) -> Self {
        Self {
            pool,
            insert_batch_size: insert_batch_size.max(1),
        }
    }

    /// Close every connection in the pool
    pub async fn close(&self) {
        self.pool.close().await;
        debug!("Database pool closed");
    }

    fn create_table_sql(name: &str, table: &Table) -> String {
        let columns: Vec<String> = table
            .columns
            .iter()
            .zip(&table.column_types)
            .map(|(column, ty)| format!("{} {}", quote_ident(column), ty.sql_type()))
            .collect();

        format!("CREATE TABLE {} ({})", quote_ident(name), columns.join(", "))
    }
}

/// Rows per INSERT, clamped so `rows * columns` stays within the bind limit
pub fn rows_per_insert(batch_size: usize, columns: usize) -> usize {
    let limit = (MAX_BIND_PARAMS / columns.max(1)).max(1);
    batch_size.max(1).min(limit)
}

/// A cell converted to the Rust type bound for its column
///
/// `Date` cells bind as SQL `DATE` for tables that were typed before they
/// reached the store.
enum SqlCell {
    Integer(Option<i64>),
    Float(Option<f64>),
    Text(Option<String>),
    Date(Option<NaiveDate>),
}

impl SqlCell {
    fn from_value(ty: ColumnType, value: &Value) -> Option<Self> {
        let cell = match (ty, value) {
            (ColumnType::Integer, Value::Null) => SqlCell::Integer(None),
            (ColumnType::Integer, Value::Integer(i)) => SqlCell::Integer(Some(*i)),
            (ColumnType::Float, Value::Null) => SqlCell::Float(None),
            (ColumnType::Float, v) => SqlCell::Float(Some(v.as_f64()?)),
            (ColumnType::Date, Value::Null) => SqlCell::Date(None),
            (ColumnType::Date, Value::Date(d)) => SqlCell::Date(Some(*d)),
            (ColumnType::Text, Value::Null) => SqlCell::Text(None),
            (ColumnType::Text, v) => SqlCell::Text(Some(v.to_string())),
            _ => return None,
        };
        Some(cell)
    }
}

fn convert_rows(table: &Table, rows: &[Vec<Value>], offset: usize) -> Result<Vec<Vec<SqlCell>>> {
    rows.iter()
        .enumerate()
        .map(|(idx, row)| {
            table
                .columns
                .iter()
                .zip(&table.column_types)
                .zip(row)
                .map(|((column, ty), value)| {
                    SqlCell::from_value(*ty, value).ok_or_else(|| {
                        PipelineError::schema(format!(
                            "row {} column '{}': value '{}' does not fit {}",
                            offset + idx + 1,
                            column,
                            value,
                            ty.sql_type()
                        ))
                    })
                })
                .collect()
        })
        .collect()
}

#[async_trait]
impl RelationalStore for PostgresStore {
    async fn replace_table(&self, name: &str, table: &Table) -> Result<u64> {
        if table.columns.is_empty() {
            return Err(PipelineError::schema(format!(
                "cannot create table {} with no columns",
                name
            )));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PipelineError::schema(format!("Failed to begin transaction: {}", e)))?;

        let drop_sql = format!("DROP TABLE IF EXISTS {}", quote_ident(name));
        sqlx::query(&drop_sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| PipelineError::schema(format!("Failed to drop table {}: {}", name, e)))?;

        let create_sql = Self::create_table_sql(name, table);
        debug!(sql = %create_sql, "Creating table");
        sqlx::query(&create_sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| PipelineError::schema(format!("Failed to create table {}: {}", name, e)))?;

        let column_list: Vec<String> = table.columns.iter().map(|c| quote_ident(c)).collect();
        let insert_prefix = format!(
            "INSERT INTO {} ({}) ",
            quote_ident(name),
            column_list.join(", ")
        );

        let chunk_size = rows_per_insert(self.insert_batch_size, table.columns.len());
        let mut inserted = 0u64;

        for (chunk_idx, chunk) in table.rows.chunks(chunk_size).enumerate() {
            let cells = convert_rows(table, chunk, chunk_idx * chunk_size)?;

            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(&insert_prefix);
            query_builder.push_values(cells, |mut b, row| {
                for cell in row {
                    match cell {
                        SqlCell::Integer(v) => b.push_bind(v),
                        SqlCell::Float(v) => b.push_bind(v),
                        SqlCell::Text(v) => b.push_bind(v),
                        SqlCell::Date(v) => b.push_bind(v),
                    };
                }
            });

            let result = query_builder.build().execute(&mut *tx).await.map_err(|e| {
                PipelineError::schema(format!("Failed to insert into {}: {}", name, e))
            })?;
            inserted += result.rows_affected();

            debug!(chunk = chunk_idx + 1, rows = chunk.len(), "Inserted batch");
        }

        tx.commit()
            .await
            .map_err(|e| PipelineError::schema(format!("Failed to commit table {}: {}", name, e)))?;

        info!(table = name, rows = inserted, "Table replaced");
        Ok(inserted)
    }

    async fn select_all(&self, name: &str) -> Result<Table> {
        let catalog: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT column_name::text, data_type::text
            FROM information_schema.columns
            WHERE table_schema = current_schema() AND table_name = $1
            ORDER BY ordinal_position
            "#,
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::query(format!("Failed to read catalog for {}: {}", name, e)))?;

        if catalog.is_empty() {
            return Err(PipelineError::query(format!("table {} does not exist", name)));
        }

        let (columns, column_types): (Vec<String>, Vec<ColumnType>) = catalog
            .into_iter()
            .map(|(column, data_type)| (column, ColumnType::from_sql_type(&data_type)))
            .unzip();

        let select_list: Vec<String> = columns
            .iter()
            .map(|c| format!("{}::text", quote_ident(c)))
            .collect();
        let select_sql = format!("SELECT {} FROM {}", select_list.join(", "), quote_ident(name));

        let records = sqlx::query(&select_sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PipelineError::query(format!("Failed to select from {}: {}", name, e)))?;

        let mut table = Table::new(columns, column_types);
        for record in &records {
            let mut row = Vec::with_capacity(table.columns.len());
            for (idx, ty) in table.column_types.iter().enumerate() {
                let raw: Option<String> = record
                    .try_get(idx)
                    .map_err(|e| PipelineError::query(format!("Failed to decode column {}: {}", idx, e)))?;
                row.push(ty.parse_cell(raw.as_deref()));
            }
            table.rows.push(row);
        }

        info!(table = name, rows = table.len(), "Table read");
        Ok(table)
    }
}
