//! JSON catalog fixtures for running without a server.
//!
//! ```json
//! {
//!   "current_schema": "public",
//!   "tables": [
//!     {
//!       "name": "users",
//!       "oid": 16384,
//!       "unique_key": "id",
//!       "primary_key": ["id"],
//!       "columns": [
//!         { "name": "id", "type_oid": 23, "not_null": true },
//!         { "name": "name", "type_oid": 25 }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use sqlscan_core::{
    CatalogColumn, CatalogError, CatalogService, Ident, Oid, RelationFlags, TableColumns,
    TabularResult, UniqueKey,
};

/// Errors that can occur while loading a fixture.
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    /// IO error reading the fixture file.
    #[error("Cannot read fixture '{path}': {source}")]
    Io {
        /// Path to the fixture file.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The fixture is not valid JSON for a catalog.
    #[error("Cannot parse fixture '{path}': {source}")]
    Json {
        /// Path to the fixture file.
        path: PathBuf,
        /// The underlying error.
        source: serde_json::Error,
    },

    /// The fixture parsed but describes an impossible catalog.
    #[error("Invalid fixture: {0}")]
    Invalid(String),
}

fn default_schema() -> String {
    "public".to_owned()
}

const fn default_type_modifier() -> i32 {
    -1
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureColumn {
    pub name: String,
    pub type_oid: Oid,
    #[serde(default = "default_type_modifier")]
    pub type_modifier: i32,
    #[serde(default)]
    pub not_null: bool,
    #[serde(default)]
    pub auto_increment: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureTable {
    #[serde(default = "default_schema")]
    pub schema: String,
    pub name: String,
    pub oid: Oid,
    #[serde(default)]
    pub has_oids: bool,
    #[serde(default)]
    pub has_subclass: bool,
    /// Column of a single-column unique key, if the table has one.
    #[serde(default)]
    pub unique_key: Option<String>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    pub columns: Vec<FixtureColumn>,
}

impl FixtureTable {
    fn column(&self, name: &str) -> Option<&FixtureColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn table_columns(&self) -> TableColumns {
        let columns = self
            .columns
            .iter()
            .zip(1_i16..)
            .map(|(c, attnum)| {
                let mut column = CatalogColumn::new(c.name.as_str(), attnum, c.type_oid)
                    .with_type_modifier(c.type_modifier);
                if c.not_null {
                    column = column.not_null();
                }
                if c.auto_increment {
                    column = column.auto_increment();
                }
                column
            })
            .collect();
        TableColumns {
            schema: Ident::from(self.schema.as_str()),
            table: Ident::from(self.name.as_str()),
            oid: self.oid,
            columns,
        }
    }
}

/// A catalog read from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureCatalog {
    #[serde(default = "default_schema")]
    pub current_schema: String,
    #[serde(default)]
    pub client_encoding: Option<String>,
    pub tables: Vec<FixtureTable>,
}

impl FixtureCatalog {
    /// Loads and checks a fixture file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or names a key
    /// column the table does not have.
    pub fn load(path: &Path) -> Result<Self, FixtureError> {
        let text = fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog: Self = serde_json::from_str(&text).map_err(|source| FixtureError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        catalog.validate()?;
        debug!(tables = catalog.tables.len(), path = %path.display(), "Loaded catalog fixture");
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), FixtureError> {
        for table in &self.tables {
            let keys = table.unique_key.iter().chain(&table.primary_key);
            for key in keys {
                if table.column(key).is_none() {
                    return Err(FixtureError::Invalid(format!(
                        "key column '{key}' is not a column of {}.{}",
                        table.schema, table.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn by_oid(&self, oid: Oid) -> Result<&FixtureTable, CatalogError> {
        self.tables
            .iter()
            .find(|t| t.oid == oid)
            .ok_or_else(|| CatalogError::UnexpectedResult(format!("relation {oid} not found")))
    }
}

impl CatalogService for FixtureCatalog {
    fn execute_query(&self, _sql: &str) -> Result<TabularResult, CatalogError> {
        Err(CatalogError::Unavailable(
            "a catalog fixture cannot run SQL".into(),
        ))
    }

    fn lookup_columns(
        &self,
        schema: Option<&Ident>,
        table: Option<&Ident>,
        oid: Option<Oid>,
    ) -> Result<Option<TableColumns>, CatalogError> {
        let found = match (schema, table, oid) {
            (_, _, Some(oid)) => self.tables.iter().find(|t| t.oid == oid),
            (Some(schema), Some(table), None) => self
                .tables
                .iter()
                .find(|t| *schema == t.schema.as_str() && *table == t.name.as_str()),
            (None, Some(table), None) => self
                .tables
                .iter()
                .filter(|t| *table == t.name.as_str())
                .min_by_key(|t| t.schema != self.current_schema),
            (_, None, None) => None,
        };
        Ok(found.map(FixtureTable::table_columns))
    }

    fn lookup_relation_flags(&self, oid: Oid) -> Result<RelationFlags, CatalogError> {
        let table = self.by_oid(oid)?;
        Ok(RelationFlags {
            has_oids: table.has_oids,
            has_subclass: table.has_subclass,
        })
    }

    fn lookup_unique_key(&self, oid: Oid) -> Result<Option<UniqueKey>, CatalogError> {
        let table = self.by_oid(oid)?;
        Ok(table
            .unique_key
            .as_deref()
            .and_then(|name| table.column(name))
            .map(|column| UniqueKey {
                column: Ident::from(column.name.as_str()),
                type_oid: column.type_oid,
            }))
    }

    fn lookup_primary_key(&self, oid: Oid) -> Result<Vec<Ident>, CatalogError> {
        let table = self.by_oid(oid)?;
        Ok(table
            .primary_key
            .iter()
            .map(|c| Ident::from(c.as_str()))
            .collect())
    }

    fn current_schema(&self) -> Result<Ident, CatalogError> {
        Ok(Ident::from(self.current_schema.as_str()))
    }

    fn client_encoding(&self) -> Result<Option<String>, CatalogError> {
        Ok(self.client_encoding.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use sqlscan_core::{Connection, ConnectionOptions, KeyKind, ParseStatus, Statement};
    use tempfile::NamedTempFile;

    use super::*;

    const FIXTURE: &str = r#"{
        "client_encoding": "UTF8",
        "tables": [
            {
                "name": "users",
                "oid": 16384,
                "unique_key": "id",
                "primary_key": ["id"],
                "columns": [
                    { "name": "id", "type_oid": 23, "not_null": true },
                    { "name": "email", "type_oid": 1043, "type_modifier": 259 }
                ]
            },
            {
                "schema": "audit",
                "name": "users",
                "oid": 16500,
                "columns": [{ "name": "changed", "type_oid": 1184 }]
            }
        ]
    }"#;

    fn write_fixture(text: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_and_resolve() {
        let file = write_fixture(FIXTURE);
        let catalog = FixtureCatalog::load(file.path()).unwrap();
        assert_eq!(catalog.tables.len(), 2);
        assert_eq!(catalog.tables[0].schema, "public");

        let conn = Connection::new(catalog, ConnectionOptions::default());
        let mut stmt = Statement::new();
        assert_eq!(stmt.parse(&conn, "select * from users", true), ParseStatus::Complete);
        assert!(stmt.is_updatable());
        assert_eq!(stmt.tables()[0].best_key().unwrap().kind, KeyKind::Int4);
        let email = stmt.columns()[1].binding.as_ref().unwrap();
        assert_eq!(email.type_info.column_size, Some(255));
    }

    #[test]
    fn test_search_path_prefers_current_schema() {
        let file = write_fixture(FIXTURE);
        let catalog = FixtureCatalog::load(file.path()).unwrap();
        let found = catalog
            .lookup_columns(None, Some(&Ident::from("users")), None)
            .unwrap()
            .unwrap();
        assert_eq!(found.oid, 16_384);
    }

    #[test]
    fn test_unknown_key_column_is_rejected() {
        let file = write_fixture(
            r#"{ "tables": [{ "name": "t", "oid": 1, "unique_key": "nope", "columns": [] }] }"#,
        );
        assert!(matches!(
            FixtureCatalog::load(file.path()),
            Err(FixtureError::Invalid(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = FixtureCatalog::load(Path::new("/nonexistent/catalog.json")).unwrap_err();
        assert!(matches!(err, FixtureError::Io { .. }));
    }

    #[test]
    fn test_sql_is_refused() {
        let catalog: FixtureCatalog = serde_json::from_str(r#"{ "tables": [] }"#).unwrap();
        assert!(matches!(
            catalog.execute_query("select 1"),
            Err(CatalogError::Unavailable(_))
        ));
    }
}
