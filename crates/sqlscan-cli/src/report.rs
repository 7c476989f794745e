//! JSON report of one analyzed statement.

use serde::Serialize;

use sqlscan_core::{
    CacheStats, ColumnDescriptor, ColumnKind, KeyKind, Oid, ParseFailure, ParseStatus, Shape,
    Statement, TableDescriptor, TableKind,
};

#[derive(Debug, Serialize)]
pub struct ColumnReport {
    pub label: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
    pub kind: ColumnKind,
    pub table: Option<usize>,
    pub updatable: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ambiguous: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub expanded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_oid: Option<Oid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decimal_digits: Option<u16>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub primary_key: bool,
}

impl From<&ColumnDescriptor> for ColumnReport {
    fn from(column: &ColumnDescriptor) -> Self {
        let binding = column.binding.as_ref();
        Self {
            label: column.label().to_string(),
            name: column.name.to_string(),
            qualifier: column.qualifier.as_ref().map(ToString::to_string),
            kind: column.kind,
            table: column.table,
            updatable: column.updatable,
            ambiguous: column.ambiguous,
            expanded: column.expanded,
            type_oid: binding.map(|b| b.type_oid),
            nullable: binding.map(|b| b.nullable),
            column_size: binding.and_then(|b| b.type_info.column_size),
            decimal_digits: binding.and_then(|b| b.type_info.decimal_digits),
            primary_key: binding.is_some_and(|b| b.primary_key),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct KeyReport {
    pub column: String,
    pub kind: KeyKind,
    pub predicate: String,
}

#[derive(Debug, Serialize)]
pub struct TableReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub kind: TableKind,
    pub oid: Oid,
    pub updatable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_oids: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_subclass: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<KeyReport>,
}

impl From<&TableDescriptor> for TableReport {
    fn from(table: &TableDescriptor) -> Self {
        let schema = table
            .schema
            .clone()
            .or_else(|| table.metadata().map(|m| m.schema().clone()));
        Self {
            schema: schema.as_ref().map(ToString::to_string),
            name: table.name.as_ref().map(ToString::to_string),
            alias: table.alias.as_ref().map(ToString::to_string),
            kind: table.kind,
            oid: table.oid(),
            updatable: table.is_updatable(),
            has_oids: table.has_oids(),
            has_subclass: table.has_subclass(),
            key: table.best_key().map(|key| KeyReport {
                column: key.name.to_string(),
                kind: key.kind,
                predicate: key.predicate_template(),
            }),
        }
    }
}

/// Everything the analysis learned about one statement.
#[derive(Debug, Serialize)]
pub struct Report {
    pub status: ParseStatus,
    pub updatable: bool,
    pub key_fields: u8,
    pub from_pos: Option<usize>,
    pub clause_pos: Option<usize>,
    pub shape: Shape,
    pub columns: Vec<ColumnReport>,
    pub tables: Vec<TableReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewritten_sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ParseFailure>,
    pub cache: CacheStats,
}

impl Report {
    pub fn new(stmt: &Statement, cache: CacheStats) -> Self {
        Self {
            status: stmt.status(),
            updatable: stmt.is_updatable(),
            key_fields: stmt.key_fields(),
            from_pos: stmt.from_pos(),
            clause_pos: stmt.clause_pos(),
            shape: *stmt.shape(),
            columns: stmt.columns().iter().map(ColumnReport::from).collect(),
            tables: stmt.tables().iter().map(TableReport::from).collect(),
            rewritten_sql: stmt
                .rewritten_sql()
                .map(|sql| String::from_utf8_lossy(sql).into_owned()),
            failure: stmt.failure().cloned(),
            cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use sqlscan_core::{Connection, ConnectionOptions};

    use super::*;
    use crate::fixture::FixtureCatalog;

    fn catalog() -> FixtureCatalog {
        serde_json::from_str(
            r#"{
                "client_encoding": "UTF8",
                "tables": [{
                    "name": "users",
                    "oid": 16384,
                    "unique_key": "id",
                    "primary_key": ["id"],
                    "columns": [
                        { "name": "id", "type_oid": 23, "not_null": true },
                        { "name": "name", "type_oid": 25 }
                    ]
                }]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_report_of_updatable_statement() {
        let conn = Connection::new(catalog(), ConnectionOptions::default());
        let mut stmt = Statement::new();
        stmt.parse(&conn, "select id, upper(name) from users u", true);
        let report = Report::new(&stmt, conn.cache_stats());
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["status"], "incomplete");
        assert_eq!(json["updatable"], true);
        assert_eq!(json["columns"][0]["kind"], "plain");
        assert_eq!(json["columns"][0]["primary_key"], true);
        assert_eq!(json["columns"][1]["kind"], "function");
        assert_eq!(json["tables"][0]["alias"], "u");
        assert_eq!(json["tables"][0]["schema"], "public");
        assert_eq!(json["tables"][0]["key"]["predicate"], "\"id\" = $1");
        assert!(json.get("failure").is_none());
    }

    #[test]
    fn test_report_of_failed_statement() {
        let conn = Connection::new(catalog(), ConnectionOptions::default());
        let mut stmt = Statement::new();
        stmt.parse(&conn, "select * from missing", false);
        let json = serde_json::to_value(Report::new(&stmt, conn.cache_stats())).unwrap();

        assert_eq!(json["status"], "fatal");
        assert_eq!(json["failure"]["code"], "table_not_found");
        assert_eq!(json["columns"].as_array().unwrap().len(), 0);
    }
}
