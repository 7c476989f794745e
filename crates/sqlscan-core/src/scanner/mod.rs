//! Single-pass statement scanner.
//!
//! The scanner walks the tokens of a `SELECT` once and records the
//! select-list items, the FROM-list items, and the byte offsets of `FROM`
//! and of the first clause after the FROM list. It does not validate SQL:
//! anything it does not recognize inside an item makes that item an
//! expression, and only depth-zero constructs it cannot place at all abort
//! the scan.
//!
//! Parenthesis depth is tracked for the whole statement. Tokens inside
//! parentheses are opaque except for a nested `SELECT`, which marks the
//! depth where a subquery began, and aggregate calls outside subqueries.

mod keywords;

use serde::Serialize;
use tracing::debug;

use crate::config::ConnectionOptions;
use crate::descriptor::{ColumnDescriptor, ColumnKind, TableDescriptor, TableKind};
use crate::encoding::Encoding;
use crate::error::{ParseError, Result};
use crate::ident::Ident;
use crate::lexer::{Lexer, Token};

use keywords::{
    AGGREGATES, ALIAS_EXCLUDED, EXPRESSION_STARTERS, GROUPING_CLAUSES, INNER_JOIN_WORDS,
    JOIN_CONDITIONS, OUTER_JOIN_WORDS, SET_OPERATIONS, TABLE_PREFIXES, TRAILING_CLAUSES,
};

/// Name of a parenthesized select item with no name inside it.
const UNNAMED_COLUMN: &str = "?column?";

/// Statement-level facts that decide updatability.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Shape {
    /// `SELECT DISTINCT`.
    pub distinct: bool,
    /// An aggregate call outside any subquery.
    pub aggregated: bool,
    /// Depth-zero `GROUP BY` or `HAVING`.
    pub grouped: bool,
    /// Depth-zero `UNION`, `INTERSECT` or `EXCEPT`.
    pub set_operation: bool,
    /// A `LEFT`, `RIGHT` or `FULL` join.
    pub outer_join: bool,
    /// An inner, cross or natural join.
    pub inner_join: bool,
    /// Comma-separated FROM items.
    pub comma_join: bool,
}

impl Shape {
    /// Returns true if rows come from more than one FROM item.
    #[must_use]
    pub const fn has_join(&self) -> bool {
        self.outer_join || self.inner_join || self.comma_join
    }
}

/// Text to insert into the statement at a byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextEdit {
    /// Byte offset in the original statement.
    pub offset: usize,
    /// Text inserted before that byte.
    pub insert: &'static str,
}

/// Applies edits, sorted by offset, to `sql`.
#[must_use]
pub fn apply_edits(sql: &[u8], edits: &[TextEdit]) -> Vec<u8> {
    let extra: usize = edits.iter().map(|e| e.insert.len()).sum();
    let mut out = Vec::with_capacity(sql.len() + extra);
    let mut copied = 0;
    for edit in edits {
        let offset = edit.offset.min(sql.len());
        out.extend_from_slice(&sql[copied..offset]);
        out.extend_from_slice(edit.insert.as_bytes());
        copied = offset;
    }
    out.extend_from_slice(&sql[copied..]);
    out
}

/// Everything a scan records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutput {
    /// Select-list items in order.
    pub columns: Vec<ColumnDescriptor>,
    /// FROM-list items in order.
    pub tables: Vec<TableDescriptor>,
    /// Byte offset of the depth-zero `FROM`.
    pub from_pos: Option<usize>,
    /// Byte offset of the first clause after the FROM list.
    pub clause_pos: Option<usize>,
    /// Statement-level facts.
    pub shape: Shape,
    /// `AS` insertions for aliases written without it.
    pub edits: Vec<TextEdit>,
}

/// Scans one statement.
///
/// # Errors
///
/// Returns an error for statements whose table list cannot be
/// established: not a `SELECT`, `SELECT INTO`, no tables, the same table
/// twice without an alias, or a depth-zero FROM construct that cannot be
/// classified.
pub fn scan(sql: &[u8], encoding: Encoding, options: &ConnectionOptions) -> Result<ScanOutput> {
    Scanner::new(sql, encoding, options).run()
}

/// Where a select-list item stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Item {
    /// Expecting a new item.
    Start,
    /// Just after a leading `DISTINCT`.
    Distinct,
    /// Skipping the `DISTINCT ON (...)` list.
    DistinctOn,
    /// A complete name or literal.
    Operand,
    /// A name followed by `.`.
    Dot,
    /// Just after `AS`.
    As,
    /// The alias is recorded.
    AliasDone,
    /// Opaque expression text.
    Expr,
}

/// Where a FROM-list item stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    /// Expecting a new item.
    Start,
    /// A complete table name, or the closing parenthesis of a subquery
    /// or function.
    Name,
    /// A name followed by `.`.
    Dot,
    /// Just after `AS`.
    As,
    /// The alias is recorded.
    AliasDone,
    /// Join words seen, `JOIN` itself pending.
    Join { outer: bool },
    /// Inside an `ON` or `USING` condition.
    Condition,
    /// Inside the parentheses of an item.
    Parens { resume: Resume },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resume {
    Name,
    AliasDone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Before the leading `SELECT`.
    Start,
    Select(Item),
    From(Source),
    /// After the FROM list.
    Trailing,
}

struct Scanner<'a> {
    lexer: Lexer<'a>,
    encoding: Encoding,
    bare_alias: bool,
    mode: Mode,
    /// Parenthesis depth.
    blevel: u32,
    /// Depth at which a nested `SELECT` began.
    subquery: Option<u32>,
    prev_aggregate: bool,
    prev_operand: bool,
    /// A select item opened with `(` still waits for its name.
    unnamed_paren_item: bool,
    out: ScanOutput,
}

fn unclassifiable(token: &Token) -> ParseError {
    ParseError::Unclassifiable {
        token: token.text_lossy(),
        offset: token.span.start,
    }
}

impl<'a> Scanner<'a> {
    fn new(sql: &'a [u8], encoding: Encoding, options: &ConnectionOptions) -> Self {
        Self {
            lexer: Lexer::new(sql, encoding)
                .with_backslash_escapes(options.backslash_escapes)
                .with_max_token_len(options.max_token_len),
            encoding,
            bare_alias: options.bare_alias_compat,
            mode: Mode::Start,
            blevel: 0,
            subquery: None,
            prev_aggregate: false,
            prev_operand: false,
            unnamed_paren_item: false,
            out: ScanOutput::default(),
        }
    }

    fn run(mut self) -> Result<ScanOutput> {
        while let Some(token) = self.lexer.next_token() {
            if self.blevel == 0 && token.is_punct(b';') {
                debug!(offset = token.span.start, "Statement ends at ';'");
                break;
            }

            let aggregate_call = self.prev_aggregate && token.is_punct(b'(');
            self.prev_aggregate = token.is_any_keyword(AGGREGATES);

            if token.is_punct(b'(') {
                self.open_paren(&token, aggregate_call)?;
            } else if token.is_punct(b')') {
                self.close_paren();
            } else if self.blevel > 0 {
                if self.subquery.is_none() && token.is_keyword("select") {
                    self.subquery = Some(self.blevel);
                } else if self.unnamed_paren_item {
                    self.name_paren_item(&token);
                }
            } else {
                self.top_level_token(&token)?;
            }

            if self.blevel == 0 && token.followed_by_comma() {
                self.end_item();
            }
        }
        self.finish()
    }

    /// Folds an unquoted name.
    fn name_of(&self, token: &Token) -> Ident {
        let ident = Ident::new(token.text.clone());
        if token.is_double_quoted() {
            ident
        } else {
            ident.folded(self.encoding)
        }
    }

    fn push_column(&mut self, column: ColumnDescriptor) -> Result<()> {
        self.out.columns.try_reserve(1)?;
        self.out.columns.push(column);
        Ok(())
    }

    fn push_table(&mut self, table: TableDescriptor) -> Result<()> {
        self.out.tables.try_reserve(1)?;
        self.out.tables.push(table);
        Ok(())
    }

    fn current_column(&mut self) -> Option<&mut ColumnDescriptor> {
        self.out.columns.last_mut()
    }

    fn current_table(&mut self) -> Option<&mut TableDescriptor> {
        self.out.tables.last_mut()
    }

    fn open_paren(&mut self, token: &Token, aggregate_call: bool) -> Result<()> {
        if aggregate_call && self.subquery.is_none() && matches!(self.mode, Mode::Select(_)) {
            self.out.shape.aggregated = true;
        }
        if self.blevel == 0 {
            match self.mode {
                Mode::Select(item) => {
                    let next = self.select_open_paren(item, token)?;
                    self.mode = Mode::Select(next);
                    self.prev_operand = false;
                }
                Mode::From(source) => {
                    let next = self.from_open_paren(source, token)?;
                    self.mode = Mode::From(next);
                }
                Mode::Start | Mode::Trailing => {}
            }
        }
        self.blevel += 1;
        Ok(())
    }

    fn close_paren(&mut self) {
        self.blevel = self.blevel.saturating_sub(1);
        if let Some(level) = self.subquery
            && self.blevel < level
        {
            self.subquery = None;
        }
        if self.blevel > 0 {
            return;
        }
        self.unnamed_paren_item = false;
        match self.mode {
            Mode::Select(Item::DistinctOn) => self.mode = Mode::Select(Item::Start),
            Mode::Select(_) => self.prev_operand = true,
            Mode::From(Source::Parens { resume }) => {
                self.mode = Mode::From(match resume {
                    Resume::Name => Source::Name,
                    Resume::AliasDone => Source::AliasDone,
                });
            }
            Mode::Start | Mode::From(_) | Mode::Trailing => {}
        }
    }

    fn top_level_token(&mut self, token: &Token) -> Result<()> {
        match self.mode {
            Mode::Start => {
                if !token.is_keyword("select") {
                    return Err(ParseError::NotASelect);
                }
                self.mode = Mode::Select(Item::Start);
            }
            Mode::Select(item) => self.select_token(item, token)?,
            Mode::From(source) => self.from_token(source, token)?,
            Mode::Trailing => self.note_clause(token),
        }
        Ok(())
    }

    /// A depth-zero comma ends the current item.
    fn end_item(&mut self) {
        match self.mode {
            Mode::Select(item) => {
                self.finish_column(item);
                self.mode = Mode::Select(Item::Start);
            }
            Mode::From(_) => {
                self.out.shape.comma_join = true;
                self.mode = Mode::From(Source::Start);
            }
            Mode::Start | Mode::Trailing => {}
        }
    }

    fn enter_trailing(&mut self, token: &Token) {
        if self.out.clause_pos.is_none() {
            self.out.clause_pos = Some(token.span.start);
        }
        self.note_clause(token);
        self.mode = Mode::Trailing;
    }

    fn note_clause(&mut self, token: &Token) {
        if token.is_any_keyword(GROUPING_CLAUSES) {
            self.out.shape.grouped = true;
        } else if token.is_any_keyword(SET_OPERATIONS) {
            self.out.shape.set_operation = true;
        }
    }

    // Select list

    fn select_token(&mut self, item: Item, token: &Token) -> Result<()> {
        if token.is_keyword("into") {
            return Err(ParseError::SelectInto);
        }
        if token.is_keyword("from") {
            self.finish_column(item);
            self.out.from_pos = Some(token.span.start);
            self.mode = Mode::From(Source::Start);
            return Ok(());
        }
        if token.is_any_keyword(TRAILING_CLAUSES) {
            self.finish_column(item);
            self.enter_trailing(token);
            return Ok(());
        }

        let leading = self.out.columns.is_empty();
        let next = match item {
            Item::Start if leading && token.is_keyword("distinct") => {
                self.out.shape.distinct = true;
                Item::Distinct
            }
            Item::Start if leading && token.is_keyword("all") => Item::Start,
            Item::Distinct if token.is_keyword("on") => Item::DistinctOn,
            Item::Start | Item::Distinct => self.start_column(token)?,
            Item::DistinctOn => Item::DistinctOn,
            Item::Operand => self.after_operand(token),
            Item::Dot => self.after_dot(token),
            Item::As => {
                if let Some(column) = self.current_column() {
                    column.alias = Some(Ident::new(token.text.clone()));
                }
                Item::AliasDone
            }
            Item::AliasDone => Item::AliasDone,
            Item::Expr => self.in_expression(token),
        };
        self.mode = Mode::Select(next);
        self.prev_operand = token.is_single_quoted()
            || token.is_double_quoted()
            || token.is_numeric()
            || (token.is_word() && !token.is_any_keyword(ALIAS_EXCLUDED));
        Ok(())
    }

    fn start_column(&mut self, token: &Token) -> Result<Item> {
        let text = token.text.clone();
        let (column, next) = if token.is_single_quoted() {
            let mut column = ColumnDescriptor::new(text, ColumnKind::QuotedLiteral, token.span);
            column.literal_len = token.text.len();
            (column, Item::Operand)
        } else if token.is_numeric() {
            (
                ColumnDescriptor::new(text, ColumnKind::NumericLiteral, token.span),
                Item::Operand,
            )
        } else if token.is_double_quoted() {
            let mut column = ColumnDescriptor::new(text, ColumnKind::Plain, token.span);
            column.double_quoted = true;
            (column, Item::Operand)
        } else if token.is_punct(b'*')
            || (token.is_word() && !token.is_any_keyword(EXPRESSION_STARTERS))
        {
            (
                ColumnDescriptor::new(text, ColumnKind::Plain, token.span),
                Item::Operand,
            )
        } else {
            (
                ColumnDescriptor::new(text, ColumnKind::Expression, token.span),
                Item::Expr,
            )
        };
        self.push_column(column)?;
        Ok(next)
    }

    fn after_operand(&mut self, token: &Token) -> Item {
        if token.is_keyword("as") {
            return Item::As;
        }
        if token.is_punct(b'.') {
            return self.shift_qualifier();
        }
        if self.bare_alias && is_alias_candidate(token) {
            self.set_inferred_alias(token);
            return Item::AliasDone;
        }
        self.become_expression();
        Item::Expr
    }

    /// `a.` moves `a` to the qualifier; `a.b.` moves `a` to the schema.
    fn shift_qualifier(&mut self) -> Item {
        let encoding = self.encoding;
        let Some(column) = self.current_column() else {
            return Item::Expr;
        };
        if column.kind != ColumnKind::Plain || column.is_wildcard() || column.schema.is_some() {
            column.kind = ColumnKind::Expression;
            return Item::Expr;
        }
        let name = std::mem::take(&mut column.name);
        let name = if column.double_quoted {
            name
        } else {
            name.folded(encoding)
        };
        column.schema = column.qualifier.take();
        column.qualifier = Some(name);
        column.double_quoted = false;
        Item::Dot
    }

    fn after_dot(&mut self, token: &Token) -> Item {
        let takes_name = token.is_word() || token.is_double_quoted() || token.is_punct(b'*');
        let Some(column) = self.current_column() else {
            return Item::Expr;
        };
        if takes_name {
            column.name = Ident::new(token.text.clone());
            column.double_quoted = token.is_double_quoted();
            Item::Operand
        } else {
            column.kind = ColumnKind::Expression;
            Item::Expr
        }
    }

    fn in_expression(&mut self, token: &Token) -> Item {
        if token.is_keyword("as") {
            return Item::As;
        }
        if self.bare_alias && self.prev_operand && is_alias_candidate(token) {
            self.set_inferred_alias(token);
            return Item::AliasDone;
        }
        // Anything after a call's closing parenthesis makes it an expression.
        if let Some(column) = self.current_column()
            && column.kind == ColumnKind::Function
        {
            column.kind = ColumnKind::Expression;
        }
        Item::Expr
    }

    fn select_open_paren(&mut self, item: Item, token: &Token) -> Result<Item> {
        Ok(match item {
            Item::Start | Item::Distinct => {
                self.push_column(ColumnDescriptor::new(
                    UNNAMED_COLUMN,
                    ColumnKind::Expression,
                    token.span,
                ))?;
                self.unnamed_paren_item = true;
                Item::Expr
            }
            Item::DistinctOn => Item::DistinctOn,
            Item::Operand => {
                if let Some(column) = self.current_column() {
                    column.kind = if column.kind == ColumnKind::Plain
                        && !column.double_quoted
                        && !column.is_wildcard()
                    {
                        ColumnKind::Function
                    } else {
                        ColumnKind::Expression
                    };
                }
                Item::Expr
            }
            Item::Dot | Item::Expr => {
                self.become_expression();
                Item::Expr
            }
            Item::As | Item::AliasDone => item,
        })
    }

    /// `(a + b)` and `distinct(a)` take the first name inside the
    /// parentheses; `(select x ...)` takes the first name after `select`.
    fn name_paren_item(&mut self, token: &Token) {
        let names = token.is_double_quoted()
            || (token.is_word() && !token.is_any_keyword(&["distinct", "all"]));
        if !names {
            return;
        }
        let name = self.name_of(token);
        if let Some(column) = self.current_column() {
            column.name = name;
            column.double_quoted = token.is_double_quoted();
        }
        self.unnamed_paren_item = false;
    }

    fn set_inferred_alias(&mut self, token: &Token) {
        if let Some(column) = self.current_column() {
            column.alias = Some(Ident::new(token.text.clone()));
        }
        self.out.edits.push(TextEdit {
            offset: token.span.start,
            insert: "as ",
        });
    }

    fn become_expression(&mut self) {
        if let Some(column) = self.current_column()
            && column.kind != ColumnKind::Function
        {
            column.kind = ColumnKind::Expression;
        }
    }

    fn finish_column(&mut self, item: Item) {
        if item == Item::Dot
            && let Some(column) = self.current_column()
        {
            column.kind = ColumnKind::Expression;
        }
    }

    // FROM list

    fn from_token(&mut self, source: Source, token: &Token) -> Result<()> {
        if token.is_any_keyword(TRAILING_CLAUSES) {
            self.enter_trailing(token);
            return Ok(());
        }
        let names_item = token.is_word() || token.is_double_quoted();
        let next = match source {
            Source::Start if token.is_any_keyword(TABLE_PREFIXES) => Source::Start,
            Source::Start if names_item && !token.is_keyword("select") && !is_join_word(token) => {
                let mut table = TableDescriptor::new(TableKind::Table, token.span);
                table.name = Some(self.name_of(token));
                self.push_table(table)?;
                Source::Name
            }
            Source::Name | Source::AliasDone => {
                if source == Source::Name && token.is_punct(b'.') {
                    self.shift_schema(token)?
                } else if source == Source::Name && token.is_keyword("as") {
                    Source::As
                } else if let Some(next) = self.join_word(token, None) {
                    next
                } else if token.is_any_keyword(JOIN_CONDITIONS) {
                    Source::Condition
                } else if source == Source::Name && names_item {
                    self.set_table_alias(token);
                    Source::AliasDone
                } else {
                    return Err(unclassifiable(token));
                }
            }
            Source::Dot if names_item => {
                let name = self.name_of(token);
                if let Some(table) = self.current_table() {
                    table.name = Some(name);
                }
                Source::Name
            }
            Source::As if names_item => {
                self.set_table_alias(token);
                Source::AliasDone
            }
            Source::Join { outer } => self
                .join_word(token, Some(outer))
                .ok_or_else(|| unclassifiable(token))?,
            Source::Condition => self.join_word(token, None).unwrap_or(Source::Condition),
            Source::Parens { .. } => source,
            Source::Start | Source::Dot | Source::As => return Err(unclassifiable(token)),
        };
        self.mode = Mode::From(next);
        Ok(())
    }

    /// `s.` moves `s` from the table name to the schema.
    fn shift_schema(&mut self, token: &Token) -> Result<Source> {
        let Some(table) = self.current_table() else {
            return Err(unclassifiable(token));
        };
        if table.kind != TableKind::Table || table.schema.is_some() || table.alias.is_some() {
            return Err(unclassifiable(token));
        }
        table.schema = table.name.take();
        Ok(Source::Dot)
    }

    fn set_table_alias(&mut self, token: &Token) {
        let alias = self.name_of(token);
        if let Some(table) = self.current_table() {
            table.alias = Some(alias);
        }
    }

    /// Handles join words. `pending` carries the outer flag of join words
    /// already seen before `JOIN`.
    fn join_word(&mut self, token: &Token, pending: Option<bool>) -> Option<Source> {
        if token.is_keyword("join") {
            if pending.unwrap_or(false) {
                self.out.shape.outer_join = true;
            } else {
                self.out.shape.inner_join = true;
            }
            Some(Source::Start)
        } else if token.is_any_keyword(OUTER_JOIN_WORDS) {
            Some(Source::Join { outer: true })
        } else if token.is_any_keyword(INNER_JOIN_WORDS) {
            Some(Source::Join {
                outer: pending.unwrap_or(false),
            })
        } else {
            None
        }
    }

    fn from_open_paren(&mut self, source: Source, token: &Token) -> Result<Source> {
        match source {
            Source::Start => {
                self.push_table(TableDescriptor::new(TableKind::Subquery, token.span))?;
                Ok(Source::Parens {
                    resume: Resume::Name,
                })
            }
            Source::Name => {
                if let Some(table) = self.current_table() {
                    table.kind = TableKind::Function;
                    table.set_updatable(false);
                }
                Ok(Source::Parens {
                    resume: Resume::Name,
                })
            }
            Source::AliasDone => Ok(Source::Parens {
                resume: Resume::AliasDone,
            }),
            Source::Condition => Ok(Source::Condition),
            Source::Dot | Source::As | Source::Join { .. } | Source::Parens { .. } => {
                Err(unclassifiable(token))
            }
        }
    }

    fn finish(mut self) -> Result<ScanOutput> {
        match self.mode {
            Mode::Start => return Err(ParseError::NotASelect),
            Mode::Select(item) => self.finish_column(item),
            Mode::From(_) | Mode::Trailing => {}
        }
        if self.out.tables.is_empty() {
            return Err(ParseError::NoTables);
        }
        check_duplicates(&self.out.tables)?;
        debug!(
            columns = self.out.columns.len(),
            tables = self.out.tables.len(),
            from_pos = ?self.out.from_pos,
            clause_pos = ?self.out.clause_pos,
            "Scanned statement"
        );
        Ok(self.out)
    }
}

/// A word that may stand for an alias written without `AS`.
fn is_alias_candidate(token: &Token) -> bool {
    (token.is_word() && !token.is_any_keyword(ALIAS_EXCLUDED)) || token.is_double_quoted()
}

fn is_join_word(token: &Token) -> bool {
    token.is_keyword("join")
        || token.is_any_keyword(OUTER_JOIN_WORDS)
        || token.is_any_keyword(INNER_JOIN_WORDS)
        || token.is_any_keyword(JOIN_CONDITIONS)
}

/// Two tables with the same name, no schema and no alias cannot be told
/// apart by any column reference.
fn check_duplicates(tables: &[TableDescriptor]) -> Result<()> {
    let bare = |t: &&TableDescriptor| {
        t.kind == TableKind::Table && t.schema.is_none() && t.alias.is_none()
    };
    for (i, table) in tables.iter().enumerate().filter(|(_, t)| bare(t)) {
        let clash = tables[i + 1..]
            .iter()
            .filter(bare)
            .any(|other| other.name == table.name);
        if clash && let Some(name) = &table.name {
            return Err(ParseError::DuplicateTable(name.clone()));
        }
    }
    Ok(())
}
