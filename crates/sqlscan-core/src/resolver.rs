//! Binds scanned columns to tables and catalog columns.
//!
//! Resolution runs after the scan, in order:
//!
//! 1. every named table is looked up in the metadata cache (and through it
//!    the catalog); an unknown table aborts the whole statement,
//! 2. `*` and `t.*` are expanded in place,
//! 3. result field descriptions, when the caller has them, bind columns by
//!    relation OID and attribute number,
//! 4. the remaining plain columns are bound by name,
//! 5. for single-table statements, the oid check picks the identifying
//!    column and marks primary key columns.

use tracing::debug;

use crate::catalog::{CatalogService, Oid};
use crate::connection::Connection;
use crate::descriptor::{ColumnDescriptor, ColumnKind, IdentifyingColumn, TableDescriptor, TableKind};
use crate::encoding::Encoding;
use crate::error::{ParseError, Result};
use crate::ident::Ident;
use crate::scanner::ScanOutput;

/// Positioned-update key fields: `ctid` plus one identifying column.
pub const DEFAULT_KEY_FIELDS: u8 = 2;

/// A result column as the server described it after execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    /// Column label.
    pub name: Ident,
    /// OID of the source table, 0 for computed columns.
    pub relation_oid: Oid,
    /// Attribute number within the source table, 0 for computed columns.
    pub attribute_number: i16,
    /// Type OID.
    pub type_oid: Oid,
    /// Type modifier.
    pub type_modifier: i32,
}

/// Resolves a scan in place and returns the number of key fields a
/// positioned update needs.
///
/// # Errors
///
/// Returns an error if a table is unknown, a catalog round trip fails, or
/// the column list cannot grow.
pub fn resolve<C: CatalogService>(
    conn: &Connection<C>,
    out: &mut ScanOutput,
    encoding: Encoding,
    fields: Option<&[FieldDescription]>,
    want_oid_check: bool,
) -> Result<u8> {
    resolve_tables(conn, &mut out.tables)?;
    expand_wildcards(&mut out.columns, &out.tables)?;
    if let Some(fields) = fields {
        bind_described(&mut out.columns, &out.tables, fields);
    }
    bind_names(&mut out.columns, &out.tables, encoding);
    if want_oid_check && out.tables.len() == 1 {
        check_oids(conn, &mut out.tables[0], &mut out.columns)
    } else {
        Ok(DEFAULT_KEY_FIELDS)
    }
}

fn resolve_tables<C: CatalogService>(conn: &Connection<C>, tables: &mut [TableDescriptor]) -> Result<()> {
    for table in tables.iter_mut().filter(|t| t.kind == TableKind::Table) {
        let Some(name) = table.name.clone() else {
            continue;
        };
        let Some(handle) = conn.table_columns(table.schema.as_ref(), &name)? else {
            return Err(ParseError::TableNotFound(name));
        };
        table.assign_oid(handle.oid());
        table.set_metadata(handle);
    }
    Ok(())
}

/// The schema a table lives in: as written, else as the catalog found it.
fn table_schema(table: &TableDescriptor) -> Option<&Ident> {
    table
        .schema
        .as_ref()
        .or_else(|| table.metadata().map(|m| m.schema()))
}

/// Finds the table a qualifier refers to. With a schema, both must match
/// the table name; without one, aliases win over table names.
fn find_table(tables: &[TableDescriptor], schema: Option<&Ident>, qualifier: &Ident) -> Option<usize> {
    if let Some(schema) = schema {
        return tables
            .iter()
            .position(|t| t.name.as_ref() == Some(qualifier) && table_schema(t) == Some(schema));
    }
    tables
        .iter()
        .position(|t| t.alias.as_ref() == Some(qualifier))
        .or_else(|| tables.iter().position(|t| t.name.as_ref() == Some(qualifier)))
}

/// Replaces each `*` with the catalog columns of the tables it covers.
/// A `*` over a table without metadata (a subquery or function) stays.
fn expand_wildcards(columns: &mut Vec<ColumnDescriptor>, tables: &[TableDescriptor]) -> Result<()> {
    let mut i = 0;
    while i < columns.len() {
        if !columns[i].is_wildcard() {
            i += 1;
            continue;
        }
        let targets: Vec<usize> = match &columns[i].qualifier {
            Some(qualifier) => find_table(tables, columns[i].schema.as_ref(), qualifier)
                .into_iter()
                .collect(),
            None => (0..tables.len()).collect(),
        };
        let sources: Option<Vec<_>> = targets
            .iter()
            .map(|&t| tables[t].metadata().map(|meta| (t, meta)))
            .collect();
        let Some(sources) = sources.filter(|s| !s.is_empty()) else {
            debug!(offset = columns[i].span.start, "Leaving wildcard unexpanded");
            i += 1;
            continue;
        };

        let count: usize = sources.iter().map(|(_, meta)| meta.columns().len()).sum();
        let span = columns[i].span;
        let mut expanded = Vec::new();
        expanded.try_reserve_exact(count)?;
        for (table, meta) in sources {
            expanded.extend(
                meta.columns()
                    .iter()
                    .map(|column| ColumnDescriptor::expanded(table, column, span)),
            );
        }
        columns.try_reserve(count.saturating_sub(1))?;
        columns.splice(i..=i, expanded);
        i += count;
    }
    Ok(())
}

/// Binds columns by (relation OID, attribute number). Only applies when the
/// description lines up one to one with the select list.
fn bind_described(columns: &mut [ColumnDescriptor], tables: &[TableDescriptor], fields: &[FieldDescription]) {
    if fields.len() != columns.len() || columns.iter().any(ColumnDescriptor::is_wildcard) {
        debug!(
            fields = fields.len(),
            columns = columns.len(),
            "Result description does not line up with the select list"
        );
        return;
    }
    for (column, field) in columns.iter_mut().zip(fields) {
        if column.is_bound() || column.kind != ColumnKind::Plain || field.relation_oid == 0 {
            continue;
        }
        let mut owners = tables
            .iter()
            .enumerate()
            .filter(|(_, t)| t.oid() == field.relation_oid);
        let Some((index, table)) = owners.next() else {
            continue;
        };
        // A self-join needs the qualifier to tell the sides apart.
        if owners.next().is_some() {
            continue;
        }
        if let Some(catalog_column) = table
            .metadata()
            .and_then(|meta| meta.column_by_attnum(field.attribute_number))
        {
            column.bind(index, catalog_column);
        }
    }
}

fn bind_names(columns: &mut [ColumnDescriptor], tables: &[TableDescriptor], encoding: Encoding) {
    for column in columns.iter_mut() {
        if column.is_bound() || column.kind != ColumnKind::Plain || column.is_wildcard() {
            continue;
        }
        let name = if column.double_quoted {
            column.name.clone()
        } else {
            column.name.folded(encoding)
        };

        let owner = match &column.qualifier {
            Some(qualifier) => find_table(tables, column.schema.as_ref(), qualifier),
            None if tables.len() == 1 => Some(0),
            None => None,
        };
        if let Some(index) = owner {
            if let Some(found) = tables[index].metadata().and_then(|meta| meta.column(&name)) {
                column.bind(index, found);
            }
            continue;
        }
        if column.qualifier.is_some() {
            continue;
        }

        let mut hits = tables.iter().enumerate().filter_map(|(index, table)| {
            table
                .metadata()
                .and_then(|meta| meta.column(&name))
                .map(|found| (index, found))
        });
        if let Some((index, found)) = hits.next() {
            column.bind(index, found);
            if hits.next().is_some() {
                column.ambiguous = true;
                debug!(column = %column.name, "Column name matches several tables");
            }
        }
    }
}

/// Runs the oid check on the only table and returns the key field count.
fn check_oids<C: CatalogService>(
    conn: &Connection<C>,
    table: &mut TableDescriptor,
    columns: &mut [ColumnDescriptor],
) -> Result<u8> {
    let Some(handle) = table.metadata().cloned() else {
        return Ok(DEFAULT_KEY_FIELDS);
    };
    conn.ensure_relation_info(&handle)?;
    let Some(info) = handle.relation_info() else {
        return Ok(DEFAULT_KEY_FIELDS);
    };
    table.set_relation_flags(info.flags.has_oids, info.flags.has_subclass);

    let key = if info.flags.has_oids {
        Some(IdentifyingColumn::oid())
    } else {
        info.unique_key
            .as_ref()
            .map(|key| IdentifyingColumn::from_unique_key(key.column.clone(), key.type_oid))
    };
    let mut key_fields = DEFAULT_KEY_FIELDS;
    if let Some(key) = key {
        table.set_best_key(key);
    } else {
        key_fields -= 1;
        // ctid alone does not identify a row across an inheritance tree.
        if info.flags.has_subclass {
            table.set_updatable(false);
        }
    }

    for column in columns.iter_mut().filter(|c| c.table == Some(0)) {
        if let Some(binding) = column.binding.as_mut() {
            binding.primary_key = info.primary_key.contains(&binding.column_name);
        }
    }
    debug!(
        oid = handle.oid(),
        key = ?table.best_key().map(|k| &k.name),
        key_fields,
        "Checked oids"
    );
    Ok(key_fields)
}
