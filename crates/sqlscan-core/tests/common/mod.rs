#![allow(dead_code)]

use std::cell::{Cell, RefCell};

use sqlscan_core::catalog::{INT4_OID, INT8_OID};
use sqlscan_core::pgtype::{NUMERIC, TEXT, VARCHAR};
use sqlscan_core::{
    CatalogColumn, CatalogError, CatalogService, Connection, ConnectionOptions, Ident, Oid,
    ParseStatus, Statement, TableColumns, TabularResult,
};

pub const USERS_OID: Oid = 16_384;
pub const ORDERS_OID: Oid = 16_390;
pub const LEGACY_OID: Oid = 16_400;
pub const PARENT_OID: Oid = 16_410;
pub const MIXED_OID: Oid = 16_420;
pub const SALES_USERS_OID: Oid = 16_500;

/// One table the mock catalog knows.
#[derive(Debug, Clone)]
pub struct MockTable {
    pub schema: String,
    pub name: Vec<u8>,
    pub oid: Oid,
    pub columns: Vec<CatalogColumn>,
    pub has_oids: bool,
    pub has_subclass: bool,
    pub unique_key: Option<(String, Oid)>,
    pub primary_key: Vec<String>,
}

impl MockTable {
    pub fn new(schema: &str, name: impl Into<Vec<u8>>, oid: Oid) -> Self {
        Self {
            schema: schema.to_owned(),
            name: name.into(),
            oid,
            columns: Vec::new(),
            has_oids: false,
            has_subclass: false,
            unique_key: None,
            primary_key: Vec::new(),
        }
    }

    pub fn column(mut self, column: CatalogColumn) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_oids(mut self) -> Self {
        self.has_oids = true;
        self
    }

    pub fn with_subclass(mut self) -> Self {
        self.has_subclass = true;
        self
    }

    pub fn unique_key(mut self, column: &str, type_oid: Oid) -> Self {
        self.unique_key = Some((column.to_owned(), type_oid));
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| (*c).to_owned()).collect();
        self
    }

    fn table_columns(&self) -> TableColumns {
        TableColumns {
            schema: Ident::from(self.schema.as_str()),
            table: Ident::new(self.name.clone()),
            oid: self.oid,
            columns: self.columns.clone(),
        }
    }
}

/// In-memory catalog that answers the probe queries by their shape and
/// counts round trips.
#[derive(Debug)]
pub struct MockCatalog {
    pub tables: RefCell<Vec<MockTable>>,
    pub current_schema: String,
    pub encoding: Option<String>,
    pub fail_lookups: Cell<bool>,
    pub fail_queries: Cell<bool>,
    pub lookups: Cell<usize>,
    pub queries: RefCell<Vec<String>>,
}

impl Default for MockCatalog {
    fn default() -> Self {
        Self {
            tables: RefCell::new(Vec::new()),
            current_schema: "public".to_owned(),
            encoding: Some("UTF8".to_owned()),
            fail_lookups: Cell::new(false),
            fail_queries: Cell::new(false),
            lookups: Cell::new(0),
            queries: RefCell::new(Vec::new()),
        }
    }
}

fn text(columns: &[&str], rows: Vec<Vec<Option<String>>>) -> TabularResult {
    TabularResult::new(columns.iter().map(|c| (*c).to_owned()).collect(), rows)
}

fn bool_text(value: bool) -> Option<String> {
    Some(if value { "t" } else { "f" }.to_owned())
}

/// Pulls the relation OID out of a probe query.
fn oid_in(sql: &str, marker: &str) -> Option<Oid> {
    let rest = &sql[sql.find(marker)? + marker.len()..];
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, table: MockTable) -> Self {
        self.tables.borrow_mut().push(table);
        self
    }

    pub fn with_encoding(mut self, encoding: Option<&str>) -> Self {
        self.encoding = encoding.map(str::to_owned);
        self
    }

    pub fn with_current_schema(mut self, schema: &str) -> Self {
        self.current_schema = schema.to_owned();
        self
    }

    pub fn queries_matching(&self, needle: &str) -> usize {
        self.queries
            .borrow()
            .iter()
            .filter(|q| q.contains(needle))
            .count()
    }

    fn table_by_oid(&self, oid: Option<Oid>) -> Option<MockTable> {
        let oid = oid?;
        self.tables.borrow().iter().find(|t| t.oid == oid).cloned()
    }
}

impl CatalogService for MockCatalog {
    fn execute_query(&self, sql: &str) -> Result<TabularResult, CatalogError> {
        self.queries.borrow_mut().push(sql.to_owned());
        if self.fail_queries.get() {
            return Err(CatalogError::QueryFailed("server closed the connection".into()));
        }

        if sql.contains("current_schema") {
            return Ok(text(&["current_schema"], vec![vec![Some(self.current_schema.clone())]]));
        }
        if sql.contains("pg_client_encoding") {
            let rows = self
                .encoding
                .iter()
                .map(|e| vec![Some(e.clone())])
                .collect();
            return Ok(text(&["pg_client_encoding"], rows));
        }
        if sql.contains("relhassubclass") {
            let rows = self
                .table_by_oid(oid_in(sql, "c.oid = "))
                .map(|t| vec![vec![bool_text(t.has_oids), bool_text(t.has_subclass)]])
                .unwrap_or_default();
            return Ok(text(&["has_oids", "relhassubclass"], rows));
        }
        if sql.contains("indnatts") {
            let rows = self
                .table_by_oid(oid_in(sql, "i.indrelid = "))
                .and_then(|t| t.unique_key)
                .map(|(column, type_oid)| vec![vec![Some(column), Some(type_oid.to_string())]])
                .unwrap_or_default();
            return Ok(text(&["attname", "atttypid"], rows));
        }
        if sql.contains("array_position") {
            let rows = self
                .table_by_oid(oid_in(sql, "i.indrelid = "))
                .map(|t| t.primary_key.into_iter().map(|c| vec![Some(c)]).collect())
                .unwrap_or_default();
            return Ok(text(&["attname"], rows));
        }
        Err(CatalogError::QueryFailed(format!("unexpected query: {sql}")))
    }

    fn lookup_columns(
        &self,
        schema: Option<&Ident>,
        table: Option<&Ident>,
        oid: Option<Oid>,
    ) -> Result<Option<TableColumns>, CatalogError> {
        self.lookups.set(self.lookups.get() + 1);
        if self.fail_lookups.get() {
            return Err(CatalogError::Unavailable("catalog offline".into()));
        }
        let tables = self.tables.borrow();
        let found = match (schema, table, oid) {
            (_, _, Some(oid)) => tables.iter().find(|t| t.oid == oid),
            (Some(schema), Some(table), None) => tables
                .iter()
                .find(|t| *schema == t.schema.as_str() && table.as_bytes() == t.name.as_slice()),
            (None, Some(table), None) => tables
                .iter()
                .filter(|t| table.as_bytes() == t.name.as_slice())
                .min_by_key(|t| t.schema != self.current_schema),
            (_, None, None) => None,
        };
        Ok(found.map(MockTable::table_columns))
    }
}

pub fn users() -> MockTable {
    MockTable::new("public", "users", USERS_OID)
        .column(CatalogColumn::new("id", 1, INT4_OID).not_null().auto_increment())
        .column(CatalogColumn::new("name", 2, TEXT))
        .column(CatalogColumn::new("email", 3, VARCHAR).with_type_modifier(259))
        .unique_key("id", INT4_OID)
        .primary_key(&["id"])
}

pub fn orders() -> MockTable {
    MockTable::new("public", "orders", ORDERS_OID)
        .column(CatalogColumn::new("id", 1, INT8_OID).not_null())
        .column(CatalogColumn::new("user_id", 2, INT4_OID))
        .column(CatalogColumn::new("total", 3, NUMERIC).with_type_modifier((10 << 16) + 2 + 4))
        .unique_key("id", INT8_OID)
        .primary_key(&["id"])
}

pub fn legacy() -> MockTable {
    MockTable::new("public", "legacy", LEGACY_OID)
        .column(CatalogColumn::new("a", 1, INT4_OID))
        .column(CatalogColumn::new("b", 2, TEXT))
        .with_oids()
}

pub fn parent() -> MockTable {
    MockTable::new("public", "parent", PARENT_OID)
        .column(CatalogColumn::new("code", 1, TEXT))
        .column(CatalogColumn::new("v", 2, TEXT))
        .with_subclass()
}

pub fn mixed() -> MockTable {
    MockTable::new("public", "Mixed", MIXED_OID)
        .column(CatalogColumn::new("Id", 1, INT4_OID))
        .column(CatalogColumn::new("a,b", 2, TEXT))
        .column(CatalogColumn::new("ünï", 3, TEXT))
}

pub fn sales_users() -> MockTable {
    MockTable::new("sales", "users", SALES_USERS_OID)
        .column(CatalogColumn::new("id", 1, INT4_OID))
        .column(CatalogColumn::new("region", 2, TEXT))
}

/// The catalog most tests run against.
pub fn catalog() -> MockCatalog {
    MockCatalog::new()
        .with_table(users())
        .with_table(orders())
        .with_table(legacy())
        .with_table(parent())
        .with_table(mixed())
        .with_table(sales_users())
}

pub fn connect() -> Connection<MockCatalog> {
    Connection::new(catalog(), ConnectionOptions::default())
}

pub fn connect_with(catalog: MockCatalog, options: ConnectionOptions) -> Connection<MockCatalog> {
    Connection::new(catalog, options)
}

pub fn parse(conn: &Connection<MockCatalog>, sql: &str) -> Statement {
    let mut stmt = Statement::new();
    let status = stmt.parse(conn, sql, false);
    assert_ne!(
        status,
        ParseStatus::Fatal,
        "Failed to parse: {sql}\nError: {:?}",
        stmt.failure()
    );
    stmt
}

pub fn parse_checked(conn: &Connection<MockCatalog>, sql: &str) -> Statement {
    let mut stmt = Statement::new();
    let status = stmt.parse(conn, sql, true);
    assert_ne!(
        status,
        ParseStatus::Fatal,
        "Failed to parse: {sql}\nError: {:?}",
        stmt.failure()
    );
    stmt
}

pub fn column_names(stmt: &Statement) -> Vec<String> {
    stmt.columns().iter().map(|c| c.name.to_string()).collect()
}

pub fn updatable_flags(stmt: &Statement) -> Vec<bool> {
    stmt.columns().iter().map(|c| c.updatable).collect()
}
