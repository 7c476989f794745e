//! Keyword sets the scanner reacts to. All comparisons are ASCII
//! case-insensitive and only apply to unquoted tokens.

/// Calls that make the whole statement an aggregate.
pub const AGGREGATES: &[&str] = &["count", "sum", "avg", "max", "min", "variance", "stddev"];

/// Words that open an expression when they start a select-list item.
pub const EXPRESSION_STARTERS: &[&str] = &[
    "case", "not", "exists", "array", "row", "null", "true", "false",
];

/// Depth-zero keywords that end the FROM list.
pub const TRAILING_CLAUSES: &[&str] = &[
    "where",
    "union",
    "intersect",
    "except",
    "order",
    "group",
    "having",
    "limit",
    "offset",
    "for",
    "fetch",
    "window",
];

/// Clauses that collapse rows into groups.
pub const GROUPING_CLAUSES: &[&str] = &["group", "having"];

/// Clauses that combine the results of several selects.
pub const SET_OPERATIONS: &[&str] = &["union", "intersect", "except"];

/// Words that can never be an alias written without `AS`: boolean
/// connectives plus the operator keywords that follow an operand.
pub const ALIAS_EXCLUDED: &[&str] = &[
    "and", "or", "not", "as", "is", "in", "like", "ilike", "between", "similar", "escape",
    "collate", "at", "time", "zone", "isnull", "notnull", "overlaps", "case", "when", "then",
    "else", "end", "over", "filter", "within",
];

/// Words that qualify a following `JOIN` as an outer join.
pub const OUTER_JOIN_WORDS: &[&str] = &["left", "right", "full", "outer"];

/// Words that may precede `JOIN` without making it outer.
pub const INNER_JOIN_WORDS: &[&str] = &["inner", "cross", "natural"];

/// FROM-item prefixes that do not change what the item is.
pub const TABLE_PREFIXES: &[&str] = &["only", "lateral"];

/// Keywords that open a join condition.
pub const JOIN_CONDITIONS: &[&str] = &["on", "using"];
