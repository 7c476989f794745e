//! Per-statement parse state.

use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::CatalogService;
use crate::classify::classify;
use crate::connection::Connection;
use crate::descriptor::{ColumnDescriptor, TableDescriptor};
use crate::error::{ParseFailure, Result};
use crate::resolver::{FieldDescription, resolve};
use crate::scanner::{Shape, apply_edits, scan};

/// How far analysis of a statement got.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    /// Not parsed yet, or reset.
    #[default]
    None,
    /// Parsed, but some select-list items are not bound to a table column.
    Incomplete,
    /// Parsed and every select-list item is bound.
    Complete,
    /// Analysis failed; the descriptor lists are empty.
    Fatal,
}

/// A statement handle's view of its `SELECT`.
///
/// `parse` fills the descriptor lists and flags; each call starts over.
/// Dropping the statement or calling [`Statement::reset_parse_state`]
/// releases its references into the connection's metadata cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statement {
    status: ParseStatus,
    sql: Vec<u8>,
    columns: Vec<ColumnDescriptor>,
    tables: Vec<TableDescriptor>,
    from_pos: Option<usize>,
    clause_pos: Option<usize>,
    shape: Shape,
    updatable: bool,
    key_fields: u8,
    failure: Option<ParseFailure>,
    rewritten_sql: Option<Vec<u8>>,
}

struct Analysis {
    columns: Vec<ColumnDescriptor>,
    tables: Vec<TableDescriptor>,
    from_pos: Option<usize>,
    clause_pos: Option<usize>,
    shape: Shape,
    updatable: bool,
    complete: bool,
    key_fields: u8,
    rewritten_sql: Option<Vec<u8>>,
}

impl Statement {
    /// Creates a statement with nothing parsed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyzes `sql` against the connection's catalog.
    ///
    /// With `want_oid_check`, a single-table statement also gets its
    /// identifying column and inheritance facts. Failures never escape:
    /// they leave the statement [`ParseStatus::Fatal`] with empty lists and
    /// a [`ParseFailure`] describing what went wrong.
    pub fn parse<C: CatalogService>(
        &mut self,
        conn: &Connection<C>,
        sql: impl AsRef<[u8]>,
        want_oid_check: bool,
    ) -> ParseStatus {
        self.run(conn, sql.as_ref(), want_oid_check, None)
    }

    /// Like [`Statement::parse`], but also binds columns through the result
    /// description the server sent after executing the statement.
    pub fn parse_described<C: CatalogService>(
        &mut self,
        conn: &Connection<C>,
        sql: impl AsRef<[u8]>,
        want_oid_check: bool,
        fields: &[FieldDescription],
    ) -> ParseStatus {
        self.run(conn, sql.as_ref(), want_oid_check, Some(fields))
    }

    fn run<C: CatalogService>(
        &mut self,
        conn: &Connection<C>,
        sql: &[u8],
        want_oid_check: bool,
        fields: Option<&[FieldDescription]>,
    ) -> ParseStatus {
        self.reset_parse_state();
        self.sql = sql.to_vec();

        match analyze(conn, sql, want_oid_check, fields) {
            Ok(analysis) => {
                self.status = if analysis.complete {
                    ParseStatus::Complete
                } else {
                    ParseStatus::Incomplete
                };
                self.columns = analysis.columns;
                self.tables = analysis.tables;
                self.from_pos = analysis.from_pos;
                self.clause_pos = analysis.clause_pos;
                self.shape = analysis.shape;
                self.updatable = analysis.updatable;
                self.key_fields = analysis.key_fields;
                self.rewritten_sql = analysis.rewritten_sql;
                debug!(
                    status = ?self.status,
                    columns = self.columns.len(),
                    tables = self.tables.len(),
                    updatable = self.updatable,
                    "Parsed statement"
                );
            }
            Err(err) => {
                warn!(code = ?err.code(), error = %err, "Statement analysis failed");
                self.failure = Some(ParseFailure::from(&err));
                self.status = ParseStatus::Fatal;
            }
        }
        self.status
    }

    /// Forgets everything learned by the last parse and releases its cache
    /// references. The statement text is kept.
    pub fn reset_parse_state(&mut self) {
        let sql = std::mem::take(&mut self.sql);
        *self = Self {
            sql,
            ..Self::default()
        };
    }

    #[must_use]
    pub const fn status(&self) -> ParseStatus {
        self.status
    }

    /// The text of the last parsed statement.
    #[must_use]
    pub fn sql(&self) -> &[u8] {
        &self.sql
    }

    /// Select-list items in order, with `*` expanded where possible.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// FROM-list items in order.
    #[must_use]
    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    /// Byte offset of the depth-zero `FROM`.
    #[must_use]
    pub const fn from_pos(&self) -> Option<usize> {
        self.from_pos
    }

    /// Byte offset of the first clause after the FROM list.
    #[must_use]
    pub const fn clause_pos(&self) -> Option<usize> {
        self.clause_pos
    }

    #[must_use]
    pub const fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The statement supports positioned updates.
    #[must_use]
    pub const fn is_updatable(&self) -> bool {
        self.updatable
    }

    /// Fields a positioned update needs to find a row: `ctid` plus the
    /// identifying column, or `ctid` alone when there is none.
    #[must_use]
    pub const fn key_fields(&self) -> u8 {
        self.key_fields
    }

    /// Why the last parse was fatal.
    #[must_use]
    pub const fn failure(&self) -> Option<&ParseFailure> {
        self.failure.as_ref()
    }

    /// The statement with `AS` spliced before bare aliases. Only produced
    /// when bare-alias compatibility is on and an alias needed it.
    #[must_use]
    pub fn rewritten_sql(&self) -> Option<&[u8]> {
        self.rewritten_sql.as_deref()
    }
}

fn analyze<C: CatalogService>(
    conn: &Connection<C>,
    sql: &[u8],
    want_oid_check: bool,
    fields: Option<&[FieldDescription]>,
) -> Result<Analysis> {
    let encoding = conn.encoding();
    let mut out = scan(sql, encoding, conn.options())?;
    let key_fields = resolve(conn, &mut out, encoding, fields, want_oid_check)?;
    let classification = classify(&mut out);
    let rewritten_sql = (!out.edits.is_empty()).then(|| apply_edits(sql, &out.edits));
    Ok(Analysis {
        columns: out.columns,
        tables: out.tables,
        from_pos: out.from_pos,
        clause_pos: out.clause_pos,
        shape: out.shape,
        updatable: classification.updatable,
        complete: classification.complete,
        key_fields,
        rewritten_sql,
    })
}
