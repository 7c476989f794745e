//! # sqlscan-core
//!
//! Decides which columns of a PostgreSQL `SELECT` result can be written
//! back through a positioned update, without a full SQL grammar.
//!
//! This crate provides:
//! - An encoding-aware tokenizer that never splits a multibyte character
//! - A single-pass scanner for the select list and FROM list
//! - Resolution of tables and columns against the system catalog
//! - A per-connection metadata cache shared by all statements
//!
//! ## Parsing a statement
//!
//! The catalog is reached through [`CatalogService`]; anything that can run
//! a query and report a table's columns will do:
//!
//! ```rust
//! use sqlscan_core::{
//!     CatalogColumn, CatalogError, CatalogService, Connection, ConnectionOptions, Ident,
//!     ParseStatus, Statement, TableColumns, TabularResult,
//! };
//!
//! struct Users;
//!
//! impl CatalogService for Users {
//!     fn execute_query(&self, _sql: &str) -> Result<TabularResult, CatalogError> {
//!         Ok(TabularResult::new(vec!["v".into()], vec![vec![Some("public".into())]]))
//!     }
//!
//!     fn lookup_columns(
//!         &self,
//!         _schema: Option<&Ident>,
//!         table: Option<&Ident>,
//!         _oid: Option<u32>,
//!     ) -> Result<Option<TableColumns>, CatalogError> {
//!         Ok((table == Some(&Ident::from("users"))).then(|| TableColumns {
//!             schema: Ident::from("public"),
//!             table: Ident::from("users"),
//!             oid: 16_384,
//!             columns: vec![
//!                 CatalogColumn::new("id", 1, 23),
//!                 CatalogColumn::new("name", 2, 25),
//!             ],
//!         }))
//!     }
//! }
//!
//! let conn = Connection::new(Users, ConnectionOptions::default().client_encoding("UTF8"));
//! let mut stmt = Statement::new();
//! assert_eq!(stmt.parse(&conn, "select *, upper(name) from users", false), ParseStatus::Incomplete);
//! assert_eq!(stmt.columns().len(), 3);
//! assert!(stmt.is_updatable());
//! assert!(stmt.columns()[0].updatable);
//! assert!(!stmt.columns()[2].updatable);
//! ```

pub mod cache;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod connection;
pub mod descriptor;
pub mod encoding;
pub mod error;
pub mod ident;
pub mod lexer;
pub mod pgtype;
pub mod resolver;
pub mod scanner;
pub mod statement;

pub use cache::{CacheStats, CachedColumnMetadata, ColumnInfoHandle, MetadataCache, RelationInfo};
pub use catalog::{
    CatalogColumn, CatalogService, Oid, RelationFlags, TableColumns, TabularResult, UniqueKey,
};
pub use config::ConnectionOptions;
pub use connection::Connection;
pub use descriptor::{
    ColumnBinding, ColumnDescriptor, ColumnKind, IdentifyingColumn, KeyKind, TableDescriptor,
    TableKind,
};
pub use encoding::{EncodedCursor, Encoding};
pub use error::{CatalogError, ParseError, ParseErrorCode, ParseFailure};
pub use ident::Ident;
pub use lexer::{Lexer, Token};
pub use pgtype::TypeMetadata;
pub use resolver::FieldDescription;
pub use scanner::{ScanOutput, Shape};
pub use statement::{ParseStatus, Statement};
