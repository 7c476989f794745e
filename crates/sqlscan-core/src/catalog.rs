//! The catalog service seam.
//!
//! The scanner never talks to a server directly. Everything it needs to know
//! about tables comes through [`CatalogService`]: a query runner plus a
//! column lookup. The relation-level probes have default implementations
//! that issue plain catalog SQL through [`CatalogService::execute_query`];
//! every value is cast to `text` so any driver can hand rows back as
//! strings.

use crate::error::CatalogError;
use crate::ident::Ident;

/// Object identifier of a catalog relation or type.
pub type Oid = u32;

/// `int8` type OID.
pub const INT8_OID: Oid = 20;
/// `int4` type OID.
pub const INT4_OID: Oid = 23;
/// `oid` type OID.
pub const OID_OID: Oid = 26;

/// Rows returned by [`CatalogService::execute_query`], every value as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabularResult {
    /// Column names in result order.
    pub columns: Vec<String>,
    /// Row values; `None` is SQL `NULL`.
    pub rows: Vec<Vec<Option<String>>>,
}

impl TabularResult {
    /// Creates a result from column names and rows.
    #[must_use]
    pub const fn new(columns: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    /// Returns true if no rows came back.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the value at `row`, `col`, if present and not `NULL`.
    #[must_use]
    pub fn value(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.get(col)?.as_deref()
    }

    /// Returns the first column of the first row.
    #[must_use]
    pub fn single_value(&self) -> Option<&str> {
        self.value(0, 0)
    }
}

/// One catalog column of a table, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    /// Column name exactly as stored in the catalog.
    pub name: Ident,
    /// Attribute number (1-based for user columns).
    pub attnum: i16,
    /// Type OID.
    pub type_oid: Oid,
    /// Type modifier, `-1` when absent.
    pub type_modifier: i32,
    /// Declared `NOT NULL`.
    pub not_null: bool,
    /// Identity column or `nextval(...)` default.
    pub auto_increment: bool,
}

impl CatalogColumn {
    /// Creates a nullable, non-serial column with no type modifier.
    #[must_use]
    pub fn new(name: impl Into<Ident>, attnum: i16, type_oid: Oid) -> Self {
        Self {
            name: name.into(),
            attnum,
            type_oid,
            type_modifier: -1,
            not_null: false,
            auto_increment: false,
        }
    }

    /// Sets the type modifier.
    #[must_use]
    pub const fn with_type_modifier(mut self, type_modifier: i32) -> Self {
        self.type_modifier = type_modifier;
        self
    }

    /// Marks the column `NOT NULL`.
    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Marks the column auto-incrementing.
    #[must_use]
    pub const fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }
}

/// The column list of one table as the catalog reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumns {
    /// Schema the table lives in.
    pub schema: Ident,
    /// Table name.
    pub table: Ident,
    /// Table OID.
    pub oid: Oid,
    /// Columns in catalog order.
    pub columns: Vec<CatalogColumn>,
}

/// Relation-level flags from `pg_class`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelationFlags {
    /// The table carries a system `oid` column.
    pub has_oids: bool,
    /// Other tables inherit from this one.
    pub has_subclass: bool,
}

/// A single-column, not-null unique key over an integer or oid column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueKey {
    /// Key column name.
    pub column: Ident,
    /// Key column type OID (`int4`, `int8` or `oid`).
    pub type_oid: Oid,
}

/// Backend access the resolver depends on.
///
/// Implementors provide [`execute_query`](Self::execute_query) and
/// [`lookup_columns`](Self::lookup_columns). The other probes default to
/// catalog SQL run through `execute_query` and may be overridden by
/// services that know the answers another way.
pub trait CatalogService {
    /// Runs `sql` and returns every value as text.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot run the query.
    fn execute_query(&self, sql: &str) -> Result<TabularResult, CatalogError>;

    /// Looks up a table's columns by schema and name, or by OID.
    ///
    /// A `None` schema means "whatever the search path finds". Returns
    /// `Ok(None)` when no such table exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup itself fails.
    fn lookup_columns(
        &self,
        schema: Option<&Ident>,
        table: Option<&Ident>,
        oid: Option<Oid>,
    ) -> Result<Option<TableColumns>, CatalogError>;

    /// Returns the `relhasoids`/`relhassubclass` flags of a relation.
    ///
    /// `relhasoids` is read from the presence of an `oid` system attribute,
    /// which works on servers that dropped the `pg_class` column.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the relation is gone.
    fn lookup_relation_flags(&self, oid: Oid) -> Result<RelationFlags, CatalogError> {
        let result = self.execute_query(&format!(
            "select exists (select 1 from pg_catalog.pg_attribute a \
             where a.attrelid = c.oid and a.attname = 'oid' and a.attnum < 0)::text, \
             c.relhassubclass::text \
             from pg_catalog.pg_class c where c.oid = {oid}"
        ))?;
        if result.is_empty() {
            return Err(CatalogError::UnexpectedResult(format!(
                "relation {oid} not found in pg_class"
            )));
        }
        Ok(RelationFlags {
            has_oids: parse_bool(result.value(0, 0))?,
            has_subclass: parse_bool(result.value(0, 1))?,
        })
    }

    /// Finds a single-column, not-null, non-partial, non-expression unique
    /// index over an `int4`, `int8` or `oid` column.
    ///
    /// When several qualify the primary key wins, then the lowest index OID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn lookup_unique_key(&self, oid: Oid) -> Result<Option<UniqueKey>, CatalogError> {
        let result = self.execute_query(&format!(
            "select a.attname::text, a.atttypid::text \
             from pg_catalog.pg_index i \
             join pg_catalog.pg_attribute a on a.attrelid = i.indrelid and a.attnum = i.indkey[0] \
             where i.indrelid = {oid} and i.indnatts = 1 and i.indisunique \
             and i.indexprs is null and i.indpred is null and a.attnotnull \
             and a.atttypid in ({INT8_OID}, {INT4_OID}, {OID_OID}) \
             order by i.indisprimary desc, i.indexrelid limit 1"
        ))?;
        let Some(column) = result.value(0, 0) else {
            return Ok(None);
        };
        Ok(Some(UniqueKey {
            column: Ident::from(column),
            type_oid: parse_oid(result.value(0, 1))?,
        }))
    }

    /// Returns the primary key column names of a relation in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn lookup_primary_key(&self, oid: Oid) -> Result<Vec<Ident>, CatalogError> {
        let result = self.execute_query(&format!(
            "select a.attname::text \
             from pg_catalog.pg_index i \
             join pg_catalog.pg_attribute a on a.attrelid = i.indrelid and a.attnum = any(i.indkey) \
             where i.indrelid = {oid} and i.indisprimary \
             order by pg_catalog.array_position(i.indkey::int2[], a.attnum)"
        ))?;
        Ok((0..result.rows.len())
            .filter_map(|row| result.value(row, 0))
            .map(Ident::from)
            .collect())
    }

    /// Returns the connection's current schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or no schema is selected.
    fn current_schema(&self) -> Result<Ident, CatalogError> {
        let result = self.execute_query("select pg_catalog.current_schema()::text")?;
        result
            .single_value()
            .map(Ident::from)
            .ok_or_else(|| CatalogError::UnexpectedResult("no current schema".into()))
    }

    /// Returns the encoding name the server reports for this connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn client_encoding(&self) -> Result<Option<String>, CatalogError> {
        let result = self.execute_query("select pg_catalog.pg_client_encoding()::text")?;
        Ok(result.single_value().map(str::to_owned))
    }
}

fn parse_bool(value: Option<&str>) -> Result<bool, CatalogError> {
    match value {
        Some("true" | "t") => Ok(true),
        Some("false" | "f") => Ok(false),
        other => Err(CatalogError::UnexpectedResult(format!(
            "expected a boolean, got {other:?}"
        ))),
    }
}

fn parse_oid(value: Option<&str>) -> Result<Oid, CatalogError> {
    value
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| CatalogError::UnexpectedResult(format!("expected an oid, got {value:?}")))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    /// Answers every query with the same canned result and records the SQL.
    struct Canned {
        result: TabularResult,
        seen: RefCell<Vec<String>>,
    }

    impl Canned {
        fn new(columns: &[&str], rows: Vec<Vec<Option<&str>>>) -> Self {
            Self {
                result: TabularResult::new(
                    columns.iter().map(|c| (*c).to_string()).collect(),
                    rows.into_iter()
                        .map(|row| row.into_iter().map(|v| v.map(str::to_owned)).collect())
                        .collect(),
                ),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl CatalogService for Canned {
        fn execute_query(&self, sql: &str) -> Result<TabularResult, CatalogError> {
            self.seen.borrow_mut().push(sql.to_string());
            Ok(self.result.clone())
        }

        fn lookup_columns(
            &self,
            _schema: Option<&Ident>,
            _table: Option<&Ident>,
            _oid: Option<Oid>,
        ) -> Result<Option<TableColumns>, CatalogError> {
            Ok(None)
        }
    }

    #[test]
    fn test_relation_flags() {
        let catalog = Canned::new(&["oids", "sub"], vec![vec![Some("false"), Some("true")]]);
        let flags = catalog.lookup_relation_flags(16384).unwrap();
        assert!(!flags.has_oids);
        assert!(flags.has_subclass);
        assert!(catalog.seen.borrow()[0].contains("c.oid = 16384"));
    }

    #[test]
    fn test_relation_flags_missing_relation() {
        let catalog = Canned::new(&["oids", "sub"], vec![]);
        assert!(matches!(
            catalog.lookup_relation_flags(1),
            Err(CatalogError::UnexpectedResult(_))
        ));
    }

    #[test]
    fn test_unique_key() {
        let catalog = Canned::new(&["attname", "atttypid"], vec![vec![Some("id"), Some("23")]]);
        let key = catalog.lookup_unique_key(42).unwrap().unwrap();
        assert_eq!(key.column, "id");
        assert_eq!(key.type_oid, INT4_OID);
        let sql = catalog.seen.borrow()[0].clone();
        assert!(sql.contains("indnatts = 1"));
        assert!(sql.contains("in (20, 23, 26)"));
    }

    #[test]
    fn test_no_unique_key() {
        let catalog = Canned::new(&["attname", "atttypid"], vec![]);
        assert_eq!(catalog.lookup_unique_key(42).unwrap(), None);
    }

    #[test]
    fn test_primary_key_columns() {
        let catalog = Canned::new(&["attname"], vec![vec![Some("a")], vec![Some("b")]]);
        let key = catalog.lookup_primary_key(7).unwrap();
        assert_eq!(key, vec![Ident::from("a"), Ident::from("b")]);
    }

    #[test]
    fn test_current_schema() {
        let catalog = Canned::new(&["current_schema"], vec![vec![Some("public")]]);
        assert_eq!(catalog.current_schema().unwrap(), "public");

        let catalog = Canned::new(&["current_schema"], vec![vec![None]]);
        assert!(catalog.current_schema().is_err());
    }

    #[test]
    fn test_bad_boolean() {
        assert!(parse_bool(Some("yes")).is_err());
        assert!(parse_bool(None).is_err());
        assert_eq!(parse_oid(Some("26")).unwrap(), OID_OID);
    }
}
