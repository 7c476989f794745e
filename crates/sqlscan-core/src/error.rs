//! Error types for statement analysis and catalog access.

use std::collections::TryReserveError;

use serde::Serialize;

use crate::ident::Ident;

/// Errors reported by a [`CatalogService`](crate::catalog::CatalogService).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// The backend rejected or failed to run a query.
    #[error("Catalog query failed: {0}")]
    QueryFailed(String),

    /// A query returned a result the caller could not interpret.
    #[error("Unexpected catalog result: {0}")]
    UnexpectedResult(String),

    /// The backend could not be reached at all.
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

/// Distinguishing code recorded with a fatal parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorCode {
    /// The statement does not start with `SELECT`.
    NotASelect,
    /// `SELECT ... INTO` creates a table instead of returning rows.
    SelectInto,
    /// The scan found no source table.
    NoTables,
    /// Two unqualified, unaliased references to the same table name.
    DuplicateTable,
    /// A depth-zero construct the scanner cannot classify.
    Unclassifiable,
    /// A catalog round trip failed.
    Catalog,
    /// A referenced table is unknown to the catalog.
    TableNotFound,
    /// Growing a descriptor list failed.
    OutOfMemory,
}

/// Reasons a scan or resolution is aborted.
///
/// These never escape [`Statement::parse`](crate::statement::Statement::parse):
/// they turn into [`ParseStatus::Fatal`](crate::statement::ParseStatus::Fatal)
/// plus a recorded [`ParseFailure`].
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The statement does not start with `SELECT`.
    #[error("Statement is not a SELECT")]
    NotASelect,

    /// `SELECT ... INTO` at the top level.
    #[error("SELECT INTO does not return a result set")]
    SelectInto,

    /// The FROM list is empty or missing.
    #[error("No table found in the FROM clause")]
    NoTables,

    /// The same table is referenced twice with nothing to tell them apart.
    #[error("Table '{0}' is referenced more than once without an alias")]
    DuplicateTable(Ident),

    /// A token the scanner cannot place.
    #[error("Cannot classify '{token}' at byte {offset}")]
    Unclassifiable {
        /// The offending token text.
        token: String,
        /// Byte offset of the token in the statement.
        offset: usize,
    },

    /// A referenced table is unknown to the catalog.
    #[error("Table '{0}' not found in the catalog")]
    TableNotFound(Ident),

    /// A catalog round trip failed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Growing a descriptor list failed.
    #[error("Out of memory while growing descriptor lists: {0}")]
    OutOfMemory(#[from] TryReserveError),
}

impl ParseError {
    /// Returns the code recorded on the statement for this error.
    #[must_use]
    pub const fn code(&self) -> ParseErrorCode {
        match self {
            Self::NotASelect => ParseErrorCode::NotASelect,
            Self::SelectInto => ParseErrorCode::SelectInto,
            Self::NoTables => ParseErrorCode::NoTables,
            Self::DuplicateTable(_) => ParseErrorCode::DuplicateTable,
            Self::Unclassifiable { .. } => ParseErrorCode::Unclassifiable,
            Self::TableNotFound(_) => ParseErrorCode::TableNotFound,
            Self::Catalog(_) => ParseErrorCode::Catalog,
            Self::OutOfMemory(_) => ParseErrorCode::OutOfMemory,
        }
    }
}

/// The code and message kept on a statement whose parse went fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseFailure {
    /// What went wrong.
    pub code: ParseErrorCode,
    /// Human-readable description.
    pub message: String,
}

impl From<&ParseError> for ParseFailure {
    fn from(err: &ParseError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Result type for scanning and resolution.
pub type Result<T> = std::result::Result<T, ParseError>;
