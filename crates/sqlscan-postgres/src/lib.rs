//! # sqlscan-postgres
//!
//! A [`CatalogService`] backed by a live PostgreSQL server through sqlx.
//!
//! The scanner is synchronous, so the service owns a current-thread tokio
//! runtime and blocks on each round trip. The pool holds a single
//! connection: `current_schema()` and `pg_client_encoding()` are session
//! state and must be read from the session the statements run on.
//!
//! ```no_run
//! use sqlscan_core::{Connection, ConnectionOptions, Statement};
//! use sqlscan_postgres::PgCatalog;
//!
//! let catalog = PgCatalog::connect("postgres://localhost/app")?;
//! let conn = Connection::new(catalog, ConnectionOptions::default());
//! let mut stmt = Statement::new();
//! stmt.parse(&conn, "select * from users", true);
//! # Ok::<(), sqlscan_postgres::PgCatalogError>(())
//! ```

pub mod error;

use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

use sqlscan_core::{
    CatalogColumn, CatalogError, CatalogService, Ident, Oid, TableColumns, TabularResult,
};

pub use error::{PgCatalogError, Result};

/// Columns of one table, one attribute per row, in `attnum` order.
const COLUMNS_SQL: &str = "\
select n.nspname::text, c.relname::text, c.oid::int8, a.attname::text, a.attnum, \
       a.atttypid::int8, a.atttypmod, a.attnotnull, \
       (a.attidentity <> '' \
        or coalesce(pg_catalog.pg_get_expr(d.adbin, d.adrelid) like 'nextval(%', false)) \
from pg_catalog.pg_class c \
join pg_catalog.pg_namespace n on n.oid = c.relnamespace \
join pg_catalog.pg_attribute a on a.attrelid = c.oid and a.attnum > 0 and not a.attisdropped \
left join pg_catalog.pg_attrdef d on d.adrelid = c.oid and d.adnum = a.attnum \
where c.relkind in ('r', 'v', 'm', 'f', 'p')";

/// One `COLUMNS_SQL` row.
type ColumnRow = (String, String, i64, String, i16, i64, i32, bool, bool);

/// Builds the column list of one table from `COLUMNS_SQL` rows.
///
/// Returns `Ok(None)` for an empty row set.
///
/// # Errors
///
/// Returns an error if an OID does not fit in 32 bits.
pub fn table_columns_from_rows(rows: Vec<ColumnRow>) -> Result<Option<TableColumns>> {
    let mut rows = rows.into_iter().peekable();
    let Some((schema, table, oid, ..)) = rows.peek() else {
        return Ok(None);
    };
    let (schema, table) = (Ident::from(schema.as_str()), Ident::from(table.as_str()));
    let oid = to_oid(*oid)?;

    let mut columns = Vec::new();
    for (_, _, _, name, attnum, type_oid, type_modifier, not_null, auto_increment) in rows {
        let mut column = CatalogColumn::new(name, attnum, to_oid(type_oid)?)
            .with_type_modifier(type_modifier);
        if not_null {
            column = column.not_null();
        }
        if auto_increment {
            column = column.auto_increment();
        }
        columns.push(column);
    }
    Ok(Some(TableColumns {
        schema,
        table,
        oid,
        columns,
    }))
}

fn to_oid(value: i64) -> Result<Oid> {
    Oid::try_from(value).map_err(|_| PgCatalogError::UnexpectedRow(format!("oid {value} out of range")))
}

/// Catalog access over one PostgreSQL session.
#[derive(Debug)]
pub struct PgCatalog {
    runtime: Runtime,
    pool: PgPool,
}

impl PgCatalog {
    /// Connects to the server at `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot start or the connection fails.
    pub fn connect(url: &str) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let pool = runtime.block_on(PgPoolOptions::new().max_connections(1).connect(url))?;
        info!("Connected to catalog server");
        Ok(Self { runtime, pool })
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn fetch_text(&self, sql: &str) -> Result<TabularResult> {
        let rows: Vec<PgRow> = self
            .runtime
            .block_on(sqlx::query(sql).fetch_all(&self.pool))?;
        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_owned()).collect())
            .unwrap_or_default();

        let mut values = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut record = Vec::with_capacity(row.len());
            for index in 0..row.len() {
                record.push(row.try_get::<Option<String>, _>(index)?);
            }
            values.push(record);
        }
        Ok(TabularResult::new(columns, values))
    }

    fn fetch_columns(
        &self,
        schema: Option<&Ident>,
        table: Option<&Ident>,
        oid: Option<Oid>,
    ) -> Result<Option<TableColumns>> {
        let rows: Vec<ColumnRow> = match (schema, table, oid) {
            (_, _, Some(oid)) => {
                let sql = format!("{COLUMNS_SQL} and c.oid = $1::int8::oid order by a.attnum");
                self.runtime.block_on(
                    sqlx::query_as(&sql)
                        .bind(i64::from(oid))
                        .fetch_all(&self.pool),
                )?
            }
            (Some(schema), Some(table), None) => {
                let sql =
                    format!("{COLUMNS_SQL} and n.nspname = $1 and c.relname = $2 order by a.attnum");
                self.runtime.block_on(
                    sqlx::query_as(&sql)
                        .bind(schema.to_str_lossy().into_owned())
                        .bind(table.to_str_lossy().into_owned())
                        .fetch_all(&self.pool),
                )?
            }
            (None, Some(table), None) => {
                let sql = format!(
                    "{COLUMNS_SQL} and c.relname = $1 \
                     and pg_catalog.pg_table_is_visible(c.oid) order by a.attnum"
                );
                self.runtime.block_on(
                    sqlx::query_as(&sql)
                        .bind(table.to_str_lossy().into_owned())
                        .fetch_all(&self.pool),
                )?
            }
            (_, None, None) => return Ok(None),
        };
        debug!(rows = rows.len(), "Fetched catalog columns");
        table_columns_from_rows(rows)
    }
}

impl CatalogService for PgCatalog {
    /// Runs `sql` and reads every column as text. Queries must cast
    /// non-text columns to `text` themselves.
    fn execute_query(&self, sql: &str) -> std::result::Result<TabularResult, CatalogError> {
        Ok(self.fetch_text(sql)?)
    }

    fn lookup_columns(
        &self,
        schema: Option<&Ident>,
        table: Option<&Ident>,
        oid: Option<Oid>,
    ) -> std::result::Result<Option<TableColumns>, CatalogError> {
        Ok(self.fetch_columns(schema, table, oid)?)
    }
}
