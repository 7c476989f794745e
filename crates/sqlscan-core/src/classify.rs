//! Decides which parts of a resolved statement a positioned update may write.

use crate::descriptor::{ColumnDescriptor, ColumnKind, TableKind};
use crate::scanner::ScanOutput;

/// Outcome of classifying a resolved scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// The statement as a whole supports positioned updates.
    pub updatable: bool,
    /// Every select-list item is bound to a table column.
    pub complete: bool,
}

/// Returns true if the statement reads one plain table in a way that keeps
/// each result row tied to one table row.
#[must_use]
pub fn is_statement_updatable(out: &ScanOutput) -> bool {
    let [table] = out.tables.as_slice() else {
        return false;
    };
    let shape = &out.shape;
    table.kind == TableKind::Table
        && table.is_updatable()
        && out.from_pos.is_some()
        && !shape.has_join()
        && !shape.distinct
        && !shape.aggregated
        && !shape.grouped
        && !shape.set_operation
}

/// Returns true if a column of an updatable statement may be written.
#[must_use]
pub fn is_column_updatable(column: &ColumnDescriptor) -> bool {
    column.kind == ColumnKind::Plain && column.is_bound() && !column.ambiguous
}

/// Sets the per-column updatable flags and reports the overall outcome.
pub fn classify(out: &mut ScanOutput) -> Classification {
    let updatable = is_statement_updatable(out);
    for column in &mut out.columns {
        column.updatable = updatable && is_column_updatable(column);
    }
    Classification {
        updatable,
        complete: out.columns.iter().all(ColumnDescriptor::is_bound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogColumn, INT4_OID};
    use crate::descriptor::TableDescriptor;
    use crate::ident::Ident;
    use crate::lexer::Span;

    fn single_table() -> ScanOutput {
        let mut table = TableDescriptor::new(TableKind::Table, Span::new(14, 15));
        table.name = Some(Ident::from("t"));
        let mut column = ColumnDescriptor::new("a", ColumnKind::Plain, Span::new(7, 8));
        column.bind(0, &CatalogColumn::new("a", 1, INT4_OID));
        ScanOutput {
            columns: vec![column],
            tables: vec![table],
            from_pos: Some(9),
            ..ScanOutput::default()
        }
    }

    #[test]
    fn test_single_table_is_updatable() {
        let mut out = single_table();
        let result = classify(&mut out);
        assert!(result.updatable);
        assert!(result.complete);
        assert!(out.columns[0].updatable);
    }

    #[test]
    fn test_distinct_and_grouping_disqualify() {
        let mut out = single_table();
        out.shape.distinct = true;
        assert!(!classify(&mut out).updatable);
        assert!(!out.columns[0].updatable);

        let mut out = single_table();
        out.shape.grouped = true;
        assert!(!is_statement_updatable(&out));

        let mut out = single_table();
        out.shape.set_operation = true;
        assert!(!is_statement_updatable(&out));
    }

    #[test]
    fn test_missing_from_disqualifies() {
        let mut out = single_table();
        out.from_pos = None;
        assert!(!is_statement_updatable(&out));
    }

    #[test]
    fn test_expression_column_is_read_only() {
        let mut out = single_table();
        out.columns
            .push(ColumnDescriptor::new("+", ColumnKind::Expression, Span::new(10, 11)));
        let result = classify(&mut out);
        assert!(result.updatable);
        assert!(!result.complete);
        assert!(out.columns[0].updatable);
        assert!(!out.columns[1].updatable);
    }

    #[test]
    fn test_ambiguous_column_is_read_only() {
        let mut column = ColumnDescriptor::new("a", ColumnKind::Plain, Span::new(7, 8));
        column.bind(0, &CatalogColumn::new("a", 1, INT4_OID));
        column.ambiguous = true;
        assert!(!is_column_updatable(&column));
    }
}
