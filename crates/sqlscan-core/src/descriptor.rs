//! Column and table descriptors produced by a scan.

use serde::Serialize;

use crate::cache::ColumnInfoHandle;
use crate::catalog::{CatalogColumn, INT4_OID, INT8_OID, Oid};
use crate::ident::Ident;
use crate::lexer::Span;
use crate::pgtype::{TypeMetadata, type_metadata};

/// What a select-list item is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// A (possibly qualified) column reference or `*`.
    Plain,
    /// Anything computed: operators, casts, `CASE`, subqueries.
    Expression,
    /// A function call, e.g. `lower(name)`.
    Function,
    /// A `'...'` or dollar-quoted literal.
    QuotedLiteral,
    /// A numeric literal.
    NumericLiteral,
}

/// Catalog facts attached to a column once it is bound to a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    /// Column name as the catalog spells it.
    pub column_name: Ident,
    /// Attribute number.
    pub attnum: i16,
    /// Base type OID.
    pub type_oid: Oid,
    /// Type modifier.
    pub type_modifier: i32,
    /// Size, precision and display width of the type.
    pub type_info: TypeMetadata,
    /// The column accepts `NULL`.
    pub nullable: bool,
    /// Identity or serial column.
    pub auto_increment: bool,
    /// Part of the table's primary key (set by the oid check).
    pub primary_key: bool,
}

impl ColumnBinding {
    pub(crate) fn from_catalog(column: &CatalogColumn) -> Self {
        Self {
            column_name: column.name.clone(),
            attnum: column.attnum,
            type_oid: column.type_oid,
            type_modifier: column.type_modifier,
            type_info: type_metadata(column.type_oid, column.type_modifier),
            nullable: !column.not_null,
            auto_increment: column.auto_increment,
            primary_key: false,
        }
    }
}

/// One select-list item.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    /// The item's name: the column name, function name or literal body.
    pub name: Ident,
    /// Table (or alias) before the dot, folded unless quoted.
    pub qualifier: Option<Ident>,
    /// Schema in a `schema.table.column` reference, folded unless quoted.
    pub schema: Option<Ident>,
    /// `AS` alias, verbatim.
    pub alias: Option<Ident>,
    /// What the item is.
    pub kind: ColumnKind,
    /// The column name was written in double quotes.
    pub double_quoted: bool,
    /// Body length of a quoted literal, which is also its column size.
    pub literal_len: usize,
    /// Where the item starts in the statement.
    pub span: Span,
    /// Index of the owning table in the table list once bound.
    pub table: Option<usize>,
    /// Catalog facts once bound.
    pub binding: Option<ColumnBinding>,
    /// Produced by expanding a `*`.
    pub expanded: bool,
    /// More than one table has a column by this name.
    pub ambiguous: bool,
    /// A positioned update may write this column.
    pub updatable: bool,
}

impl ColumnDescriptor {
    /// Creates an unbound item.
    #[must_use]
    pub fn new(name: impl Into<Ident>, kind: ColumnKind, span: Span) -> Self {
        Self {
            name: name.into(),
            qualifier: None,
            schema: None,
            alias: None,
            kind,
            double_quoted: false,
            literal_len: 0,
            span,
            table: None,
            binding: None,
            expanded: false,
            ambiguous: false,
            updatable: false,
        }
    }

    /// A column produced by expanding `*` over table `table`.
    pub(crate) fn expanded(table: usize, column: &CatalogColumn, span: Span) -> Self {
        let mut descriptor = Self::new(column.name.clone(), ColumnKind::Plain, span);
        descriptor.double_quoted = true;
        descriptor.expanded = true;
        descriptor.table = Some(table);
        descriptor.binding = Some(ColumnBinding::from_catalog(column));
        descriptor
    }

    /// Returns true for `*` or `qualifier.*`.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.kind == ColumnKind::Plain && !self.double_quoted && self.name == "*"
    }

    /// Returns true once the item is bound to a table column.
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// The name a result set shows: the alias if any, else the name.
    #[must_use]
    pub fn label(&self) -> &Ident {
        self.alias.as_ref().unwrap_or(&self.name)
    }

    pub(crate) fn bind(&mut self, table: usize, column: &CatalogColumn) {
        self.table = Some(table);
        self.binding = Some(ColumnBinding::from_catalog(column));
    }
}

/// What a FROM-list item is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    /// A named table or view.
    Table,
    /// A parenthesized subquery or join.
    Subquery,
    /// A set-returning function call.
    Function,
}

/// Type of the column that identifies one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// The system `oid` column.
    Oid,
    /// A unique `int4` column.
    Int4,
    /// A unique `int8` column.
    Int8,
}

/// The column a positioned update uses to find its row again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifyingColumn {
    /// Column name.
    pub name: Ident,
    /// Column type.
    pub kind: KeyKind,
}

impl IdentifyingColumn {
    /// The system `oid` column.
    #[must_use]
    pub fn oid() -> Self {
        Self {
            name: Ident::from("oid"),
            kind: KeyKind::Oid,
        }
    }

    pub(crate) fn from_unique_key(name: Ident, type_oid: Oid) -> Self {
        let kind = match type_oid {
            INT4_OID => KeyKind::Int4,
            INT8_OID => KeyKind::Int8,
            _ => KeyKind::Oid,
        };
        Self { name, kind }
    }

    /// The predicate with a `$1` placeholder for the key value.
    #[must_use]
    pub fn predicate_template(&self) -> String {
        format!("{} = $1", self.name.quoted())
    }

    /// The predicate for a concrete key value.
    #[must_use]
    pub fn predicate(&self, value: i64) -> String {
        match self.kind {
            KeyKind::Oid => format!("{} = {value}::oid", self.name.quoted()),
            KeyKind::Int4 | KeyKind::Int8 => format!("{} = {value}", self.name.quoted()),
        }
    }
}

/// One FROM-list item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    /// Schema, folded unless quoted. `None` means the current schema.
    pub schema: Option<Ident>,
    /// Table name, folded unless quoted. `None` for subqueries.
    pub name: Option<Ident>,
    /// Alias, folded unless quoted.
    pub alias: Option<Ident>,
    /// What the item is.
    pub kind: TableKind,
    /// Where the item starts in the statement.
    pub span: Span,
    oid: Oid,
    has_oids: Option<bool>,
    has_subclass: Option<bool>,
    checked: bool,
    best_key: Option<IdentifyingColumn>,
    updatable: bool,
    metadata: Option<ColumnInfoHandle>,
}

impl TableDescriptor {
    /// Creates an unresolved item.
    #[must_use]
    pub const fn new(kind: TableKind, span: Span) -> Self {
        Self {
            schema: None,
            name: None,
            alias: None,
            kind,
            span,
            oid: 0,
            has_oids: None,
            has_subclass: None,
            checked: false,
            best_key: None,
            updatable: matches!(kind, TableKind::Table),
            metadata: None,
        }
    }

    /// Table OID, 0 until resolved.
    #[must_use]
    pub const fn oid(&self) -> Oid {
        self.oid
    }

    /// Sets the OID. An OID, once assigned, is never replaced; returns
    /// false if a different one was already set.
    pub fn assign_oid(&mut self, oid: Oid) -> bool {
        if self.oid == 0 || self.oid == oid {
            self.oid = oid;
            true
        } else {
            false
        }
    }

    /// Whether the table has system oids, once checked.
    #[must_use]
    pub const fn has_oids(&self) -> Option<bool> {
        self.has_oids
    }

    /// Whether other tables inherit from this one, once checked.
    #[must_use]
    pub const fn has_subclass(&self) -> Option<bool> {
        self.has_subclass
    }

    /// Returns true once the oid check ran for this table.
    #[must_use]
    pub const fn is_checked(&self) -> bool {
        self.checked
    }

    pub(crate) fn set_relation_flags(&mut self, has_oids: bool, has_subclass: bool) {
        // The first answer for an OID is final.
        if self.has_oids.is_none() {
            self.has_oids = Some(has_oids);
        }
        if self.has_subclass.is_none() {
            self.has_subclass = Some(has_subclass);
        }
        self.checked = true;
    }

    /// The column that identifies a row, if one was found.
    #[must_use]
    pub const fn best_key(&self) -> Option<&IdentifyingColumn> {
        self.best_key.as_ref()
    }

    pub(crate) fn set_best_key(&mut self, key: IdentifyingColumn) {
        self.best_key = Some(key);
    }

    /// Row predicate for a positioned update: the key predicate, plus a
    /// `tableoid` qualification when child tables share the key space.
    #[must_use]
    pub fn row_predicate(&self, key_value: i64) -> Option<String> {
        let key = self.best_key.as_ref()?;
        let predicate = key.predicate(key_value);
        if self.has_subclass == Some(true) && self.oid != 0 {
            Some(format!("{predicate} and \"tableoid\" = {}", self.oid))
        } else {
            Some(predicate)
        }
    }

    /// The table itself is eligible for positioned updates.
    #[must_use]
    pub const fn is_updatable(&self) -> bool {
        self.updatable
    }

    pub(crate) const fn set_updatable(&mut self, updatable: bool) {
        self.updatable = updatable;
    }

    /// Cached catalog columns once resolved.
    #[must_use]
    pub const fn metadata(&self) -> Option<&ColumnInfoHandle> {
        self.metadata.as_ref()
    }

    pub(crate) fn set_metadata(&mut self, handle: ColumnInfoHandle) {
        self.metadata = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oid_is_never_reassigned() {
        let mut table = TableDescriptor::new(TableKind::Table, Span::new(0, 1));
        assert!(table.assign_oid(10));
        assert!(table.assign_oid(10));
        assert!(!table.assign_oid(11));
        assert_eq!(table.oid(), 10);
    }

    #[test]
    fn test_relation_flags_are_final() {
        let mut table = TableDescriptor::new(TableKind::Table, Span::new(0, 1));
        assert!(!table.is_checked());
        table.set_relation_flags(true, false);
        table.set_relation_flags(false, true);
        assert_eq!(table.has_oids(), Some(true));
        assert_eq!(table.has_subclass(), Some(false));
        assert!(table.is_checked());
    }

    #[test]
    fn test_subquery_is_not_updatable() {
        let table = TableDescriptor::new(TableKind::Subquery, Span::new(0, 1));
        assert!(!table.is_updatable());
        assert!(TableDescriptor::new(TableKind::Table, Span::new(0, 1)).is_updatable());
    }

    #[test]
    fn test_predicates() {
        let key = IdentifyingColumn::from_unique_key(Ident::from("id"), INT4_OID);
        assert_eq!(key.kind, KeyKind::Int4);
        assert_eq!(key.predicate_template(), "\"id\" = $1");
        assert_eq!(key.predicate(7), "\"id\" = 7");
        assert_eq!(IdentifyingColumn::oid().predicate(9), "\"oid\" = 9::oid");
    }

    #[test]
    fn test_row_predicate_qualifies_tableoid_under_inheritance() {
        let mut table = TableDescriptor::new(TableKind::Table, Span::new(0, 1));
        assert_eq!(table.row_predicate(1), None);
        table.assign_oid(500);
        table.set_relation_flags(false, true);
        table.set_best_key(IdentifyingColumn::from_unique_key(Ident::from("id"), INT8_OID));
        assert_eq!(
            table.row_predicate(3).unwrap(),
            "\"id\" = 3 and \"tableoid\" = 500"
        );
    }

    #[test]
    fn test_wildcard_and_label() {
        let mut star = ColumnDescriptor::new("*", ColumnKind::Plain, Span::new(7, 8));
        assert!(star.is_wildcard());
        star.double_quoted = true;
        assert!(!star.is_wildcard());

        let mut col = ColumnDescriptor::new("a", ColumnKind::Plain, Span::new(0, 1));
        assert_eq!(col.label(), "a");
        col.alias = Some(Ident::from("b"));
        assert_eq!(col.label(), "b");
    }

    #[test]
    fn test_expanded_column_is_bound() {
        let column = CatalogColumn::new("id", 1, INT4_OID).not_null();
        let col = ColumnDescriptor::expanded(0, &column, Span::new(7, 8));
        assert!(col.expanded);
        assert!(col.is_bound());
        let binding = col.binding.unwrap();
        assert!(!binding.nullable);
        assert_eq!(binding.type_info.column_size, Some(10));
    }
}
