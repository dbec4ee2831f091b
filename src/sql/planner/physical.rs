//! # Physical Operators
//!
//! The operator tree the executor runs. Every operator produces tuples of a
//! fixed width; positions in `PhysExpr::Column` refer to the tuple of the
//! operator's input (for joins, the left tuple followed by the right one).
//!
//! ## Operator Categories
//!
//! - **Leaves**: Values, SeqScan, IndexScan, VectorSearch, CteScan
//! - **Row-wise**: Filter, Project
//! - **Joins**: NestedLoopJoin, HashJoin, IndexNestedLoopJoin
//! - **Blocking**: Aggregate, Window, Sort, Distinct
//! - **Other**: Limit, Union
//!
//! Base table leaves emit the table's columns followed by the row id.

use std::fmt::Write;
use std::sync::Arc;

use super::expr::PhysExpr;
use crate::schema::TableDef;
use crate::sql::ast::{FrameBound, JoinKind, WindowFrame};
use crate::types::DataType;

#[derive(Debug, Clone)]
pub struct SortKey {
    pub expr: PhysExpr,
    pub desc: bool,
    pub nulls_first: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    CountStar,
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    pub fn parse(name: &str, star: bool) -> Option<Self> {
        Some(match (name.to_ascii_uppercase().as_str(), star) {
            ("COUNT", true) => AggregateFunc::CountStar,
            ("COUNT", false) => AggregateFunc::Count,
            ("SUM", false) => AggregateFunc::Sum,
            ("AVG", false) => AggregateFunc::Avg,
            ("MIN", false) => AggregateFunc::Min,
            ("MAX", false) => AggregateFunc::Max,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFunc::CountStar => "COUNT(*)",
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Avg => "AVG",
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregateExpr {
    pub func: AggregateFunc,
    pub arg: Option<PhysExpr>,
    pub distinct: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFunc {
    RowNumber,
    Rank,
    DenseRank,
    Lag,
    Lead,
    Aggregate(AggregateFunc),
}

#[derive(Debug, Clone)]
pub struct WindowExpr {
    pub func: WindowFunc,
    pub args: Vec<PhysExpr>,
    pub partition_by: Vec<PhysExpr>,
    pub order_by: Vec<SortKey>,
    pub frame: Option<WindowFrame>,
}

/// Key bounds for an ordered index lookup. `eq` covers a prefix of the
/// index columns; the optional range applies to the column after it.
#[derive(Debug, Clone)]
pub struct IndexAccess {
    pub eq: Vec<PhysExpr>,
    pub lower: Option<(PhysExpr, bool)>,
    pub upper: Option<(PhysExpr, bool)>,
    /// Declared types of the constrained columns, in key order.
    pub key_types: Vec<DataType>,
}

#[derive(Debug, Clone)]
pub enum PhysicalPlan {
    Values {
        rows: Vec<Vec<PhysExpr>>,
    },
    SeqScan {
        table: Arc<TableDef>,
        alias: String,
        filter: Option<PhysExpr>,
    },
    IndexScan {
        table: Arc<TableDef>,
        alias: String,
        index: String,
        access: IndexAccess,
        filter: Option<PhysExpr>,
    },
    VectorSearch {
        table: Arc<TableDef>,
        alias: String,
        index: String,
        query: PhysExpr,
        limit: PhysExpr,
        offset: Option<PhysExpr>,
        ef_search: usize,
    },
    CteScan {
        id: usize,
        name: String,
        plan: Arc<PhysicalPlan>,
        correlated: bool,
    },
    Filter {
        input: Box<PhysicalPlan>,
        predicate: PhysExpr,
    },
    Project {
        input: Box<PhysicalPlan>,
        exprs: Vec<PhysExpr>,
    },
    NestedLoopJoin {
        left: Box<PhysicalPlan>,
        right: Box<PhysicalPlan>,
        kind: JoinKind,
        condition: Option<PhysExpr>,
        right_width: usize,
    },
    HashJoin {
        left: Box<PhysicalPlan>,
        right: Box<PhysicalPlan>,
        kind: JoinKind,
        left_keys: Vec<PhysExpr>,
        /// Evaluated against the right tuple alone.
        right_keys: Vec<PhysExpr>,
        residual: Option<PhysExpr>,
        right_width: usize,
    },
    IndexNestedLoopJoin {
        left: Box<PhysicalPlan>,
        table: Arc<TableDef>,
        alias: String,
        index: String,
        /// Evaluated against the left tuple, one per leading index column.
        keys: Vec<PhysExpr>,
        key_types: Vec<DataType>,
        kind: JoinKind,
        condition: Option<PhysExpr>,
    },
    Aggregate {
        input: Box<PhysicalPlan>,
        group_by: Vec<PhysExpr>,
        aggregates: Vec<AggregateExpr>,
    },
    Window {
        input: Box<PhysicalPlan>,
        functions: Vec<WindowExpr>,
    },
    Sort {
        input: Box<PhysicalPlan>,
        keys: Vec<SortKey>,
    },
    Distinct {
        input: Box<PhysicalPlan>,
    },
    Limit {
        input: Box<PhysicalPlan>,
        limit: Option<PhysExpr>,
        offset: Option<PhysExpr>,
    },
    Union {
        left: Box<PhysicalPlan>,
        right: Box<PhysicalPlan>,
        all: bool,
    },
}

impl PhysicalPlan {
    pub fn explain(&self) -> String {
        let mut output = String::new();
        self.format_operator(0, &mut output);
        output
    }

    fn format_operator(&self, indent: usize, output: &mut String) {
        let prefix = "  ".repeat(indent);

        match self {
            PhysicalPlan::Values { rows } => {
                let _ = writeln!(output, "{}-> Values (rows={})", prefix, rows.len());
            }
            PhysicalPlan::SeqScan { table, alias, filter } => {
                let _ = writeln!(
                    output,
                    "{}-> SeqScan on {}{}{}",
                    prefix,
                    table.name(),
                    alias_suffix(table, alias),
                    if filter.is_some() { " (filtered)" } else { "" }
                );
            }
            PhysicalPlan::IndexScan {
                table,
                alias,
                index,
                access,
                ..
            } => {
                let _ = writeln!(
                    output,
                    "{}-> IndexScan on {}{} using {} (eq={}, range={})",
                    prefix,
                    table.name(),
                    alias_suffix(table, alias),
                    index,
                    access.eq.len(),
                    access.lower.is_some() || access.upper.is_some()
                );
            }
            PhysicalPlan::VectorSearch {
                table,
                alias,
                index,
                ef_search,
                ..
            } => {
                let _ = writeln!(
                    output,
                    "{}-> VectorSearch on {}{} using {} (ef_search={})",
                    prefix,
                    table.name(),
                    alias_suffix(table, alias),
                    index,
                    ef_search
                );
            }
            PhysicalPlan::CteScan { name, plan, .. } => {
                let _ = writeln!(output, "{}-> CteScan on {}", prefix, name);
                plan.format_operator(indent + 1, output);
            }
            PhysicalPlan::Filter { input, .. } => {
                let _ = writeln!(output, "{}-> Filter", prefix);
                input.format_operator(indent + 1, output);
            }
            PhysicalPlan::Project { input, exprs } => {
                let _ = writeln!(output, "{}-> Project (columns={})", prefix, exprs.len());
                input.format_operator(indent + 1, output);
            }
            PhysicalPlan::NestedLoopJoin { left, right, kind, .. } => {
                let _ = writeln!(output, "{}-> NestedLoopJoin ({})", prefix, join_name(*kind));
                left.format_operator(indent + 1, output);
                right.format_operator(indent + 1, output);
            }
            PhysicalPlan::HashJoin {
                left,
                right,
                kind,
                left_keys,
                ..
            } => {
                let _ = writeln!(
                    output,
                    "{}-> HashJoin ({}, keys={})",
                    prefix,
                    join_name(*kind),
                    left_keys.len()
                );
                left.format_operator(indent + 1, output);
                right.format_operator(indent + 1, output);
            }
            PhysicalPlan::IndexNestedLoopJoin {
                left,
                table,
                alias,
                index,
                kind,
                ..
            } => {
                let _ = writeln!(
                    output,
                    "{}-> IndexNestedLoopJoin ({})",
                    prefix,
                    join_name(*kind)
                );
                left.format_operator(indent + 1, output);
                let _ = writeln!(
                    output,
                    "{}  -> IndexLookup on {}{} using {}",
                    prefix,
                    table.name(),
                    alias_suffix(table, alias),
                    index
                );
            }
            PhysicalPlan::Aggregate {
                input,
                group_by,
                aggregates,
            } => {
                let names: Vec<&str> = aggregates.iter().map(|a| a.func.as_str()).collect();
                let _ = writeln!(
                    output,
                    "{}-> HashAggregate (groups={}, aggregates=[{}])",
                    prefix,
                    group_by.len(),
                    names.join(", ")
                );
                input.format_operator(indent + 1, output);
            }
            PhysicalPlan::Window { input, functions } => {
                let _ = writeln!(output, "{}-> Window (functions={})", prefix, functions.len());
                input.format_operator(indent + 1, output);
            }
            PhysicalPlan::Sort { input, keys } => {
                let _ = writeln!(output, "{}-> Sort (keys={})", prefix, keys.len());
                input.format_operator(indent + 1, output);
            }
            PhysicalPlan::Distinct { input } => {
                let _ = writeln!(output, "{}-> Distinct", prefix);
                input.format_operator(indent + 1, output);
            }
            PhysicalPlan::Limit { input, limit, offset } => {
                let _ = writeln!(
                    output,
                    "{}-> Limit (limit={}, offset={})",
                    prefix,
                    limit.is_some(),
                    offset.is_some()
                );
                input.format_operator(indent + 1, output);
            }
            PhysicalPlan::Union { left, right, all } => {
                let _ = writeln!(
                    output,
                    "{}-> Union{}",
                    prefix,
                    if *all { " All" } else { "" }
                );
                left.format_operator(indent + 1, output);
                right.format_operator(indent + 1, output);
            }
        }
    }
}

fn alias_suffix(table: &TableDef, alias: &str) -> String {
    if alias.eq_ignore_ascii_case(table.name()) {
        String::new()
    } else {
        format!(" as {}", alias)
    }
}

fn join_name(kind: JoinKind) -> &'static str {
    match kind {
        JoinKind::Inner => "Inner",
        JoinKind::Left => "Left",
        JoinKind::Cross => "Cross",
    }
}

/// Resolves a frame bound to an inclusive row offset range inside a
/// partition of `len` rows, for the row at `pos`.
pub fn frame_range(frame: &WindowFrame, pos: usize, len: usize) -> Option<(usize, usize)> {
    let start = match frame.start {
        FrameBound::UnboundedPreceding => 0,
        FrameBound::Preceding(n) => pos.saturating_sub(n as usize),
        FrameBound::CurrentRow => pos,
        FrameBound::Following(n) => pos.saturating_add(n as usize),
        FrameBound::UnboundedFollowing => len,
    };
    let end = match frame.end {
        FrameBound::UnboundedPreceding => return None,
        FrameBound::Preceding(n) => pos.checked_sub(n as usize)?,
        FrameBound::CurrentRow => pos,
        FrameBound::Following(n) => pos.saturating_add(n as usize).min(len.saturating_sub(1)),
        FrameBound::UnboundedFollowing => len.saturating_sub(1),
    };
    if start > end || start >= len {
        return None;
    }
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(start: FrameBound, end: FrameBound) -> WindowFrame {
        WindowFrame { start, end }
    }

    #[test]
    fn frame_range_clamps_to_partition() {
        let f = frame(FrameBound::Preceding(2), FrameBound::Following(1));
        assert_eq!(frame_range(&f, 0, 5), Some((0, 1)));
        assert_eq!(frame_range(&f, 3, 5), Some((1, 4)));
        assert_eq!(frame_range(&f, 4, 5), Some((2, 4)));
    }

    #[test]
    fn empty_frames() {
        let f = frame(FrameBound::Following(1), FrameBound::Following(2));
        assert_eq!(frame_range(&f, 4, 5), None);
        let f = frame(FrameBound::UnboundedPreceding, FrameBound::Preceding(1));
        assert_eq!(frame_range(&f, 0, 3), None);
        assert_eq!(frame_range(&f, 2, 3), Some((0, 1)));
    }

    #[test]
    fn explain_nests_operators() {
        let plan = PhysicalPlan::Limit {
            input: Box::new(PhysicalPlan::Values { rows: vec![vec![]] }),
            limit: None,
            offset: None,
        };
        let text = plan.explain();
        assert!(text.starts_with("-> Limit"));
        assert!(text.contains("\n  -> Values (rows=1)"));
    }
}
