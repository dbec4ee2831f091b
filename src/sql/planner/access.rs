//! # Access Path Selection
//!
//! Chooses how a single base table is read.
//!
//! ## B-tree Indexes
//!
//! WHERE conjuncts of the form `column op operand`, where the operand does
//! not depend on the row, are matched against each B-tree index of the
//! table. An index is usable when its leading columns have equality
//! predicates; the column after that prefix may additionally carry a range
//! (`<`, `<=`, `>`, `>=`, `BETWEEN`).
//!
//! | Match | Score |
//! |-------|-------|
//! | each equality column | +2 |
//! | equality on every column of a unique index | +1 |
//! | range on the next column | +1 |
//!
//! The highest score wins; ties go to the index declared first. The full
//! WHERE clause is always re-applied to the rows an index yields.
//!
//! ## Vector Search
//!
//! `ORDER BY VEC_DISTANCE_xx(col, q) LIMIT k` over a single table with an
//! HNSW index on `col` using the same metric becomes a `VectorSearch`,
//! provided the query has no WHERE, grouping, window or DISTINCT clause.
//! `PRAGMA vector_index_scan = OFF` disables the rewrite so the exact
//! brute-force ordering is used instead.

use eyre::Result;
use std::sync::Arc;
use tracing::trace;

use super::expr::{ExprEnv, PhysExpr};
use super::physical::{IndexAccess, PhysicalPlan};
use super::scope::Scope;
use super::select::Projection;
use super::{Planner, QueryPlan};
use crate::hnsw::DistanceMetric;
use crate::schema::{IndexKind, TableDef};
use crate::sql::ast::{BinaryOp, Expr, OrderByItem, Select, SelectItem, TableRef};
use crate::sql::functions;

/// `column op value` with the column on the left.
#[derive(Debug, Clone)]
struct ColumnPredicate {
    column: usize,
    op: BinaryOp,
    value: PhysExpr,
}

impl Planner<'_> {
    /// Plans a scan of one table filtered by `selection`.
    pub(crate) fn plan_table_access(
        &mut self,
        table: Arc<TableDef>,
        alias: String,
        scope: &Scope,
        selection: Option<&Expr>,
    ) -> Result<PhysicalPlan> {
        let Some(selection) = selection else {
            return Ok(PhysicalPlan::SeqScan {
                table,
                alias,
                filter: None,
            });
        };

        let filter = self.compile_expr(selection, &ExprEnv::new(scope))?;
        let predicates = self.index_predicates(&table, scope, selection)?;

        match choose_index(&table, &predicates) {
            Some((index, access)) => {
                trace!(
                    table = table.name(),
                    index = %index,
                    eq = access.eq.len(),
                    range = access.lower.is_some() || access.upper.is_some(),
                    "chose index scan"
                );
                Ok(PhysicalPlan::IndexScan {
                    table,
                    alias,
                    index,
                    access,
                    filter: Some(filter),
                })
            }
            None => {
                trace!(table = table.name(), "chose sequential scan");
                Ok(PhysicalPlan::SeqScan {
                    table,
                    alias,
                    filter: Some(filter),
                })
            }
        }
    }

    fn index_predicates(
        &mut self,
        table: &TableDef,
        scope: &Scope,
        selection: &Expr,
    ) -> Result<Vec<ColumnPredicate>> {
        let mut out = Vec::new();
        for conjunct in selection.conjuncts() {
            match conjunct {
                Expr::Binary { left, op, right } if op.is_comparison() && *op != BinaryOp::NotEq => {
                    if let Some(column) = table_column(table, scope, left)? {
                        if let Some(value) = self.key_operand(scope, right)? {
                            out.push(ColumnPredicate {
                                column,
                                op: *op,
                                value,
                            });
                        }
                    } else if let Some(column) = table_column(table, scope, right)? {
                        if let Some(value) = self.key_operand(scope, left)? {
                            out.push(ColumnPredicate {
                                column,
                                op: op.flip(),
                                value,
                            });
                        }
                    }
                }
                Expr::Between {
                    expr,
                    low,
                    high,
                    negated: false,
                } => {
                    let Some(column) = table_column(table, scope, expr)? else {
                        continue;
                    };
                    if let (Some(low), Some(high)) =
                        (self.key_operand(scope, low)?, self.key_operand(scope, high)?)
                    {
                        out.push(ColumnPredicate {
                            column,
                            op: BinaryOp::GtEq,
                            value: low,
                        });
                        out.push(ColumnPredicate {
                            column,
                            op: BinaryOp::LtEq,
                            value: high,
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(out)
    }

    /// Compiles `expr` if it can be evaluated once before the scan starts.
    fn key_operand(&mut self, scope: &Scope, expr: &Expr) -> Result<Option<PhysExpr>> {
        let mut has_subquery = false;
        expr.walk(&mut |e| {
            if matches!(e, Expr::Subquery(_) | Expr::Exists { .. } | Expr::InSubquery { .. }) {
                has_subquery = true;
            }
            true
        });
        if has_subquery {
            return Ok(None);
        }
        let compiled = self.compile_expr(expr, &ExprEnv::new(scope))?;
        Ok(compiled.is_row_independent().then_some(compiled))
    }

    /// Rewrites a nearest-neighbour query into an HNSW index search when
    /// the query shape allows it.
    pub(super) fn try_vector_search(
        &mut self,
        select: &Select,
        order_by: &[OrderByItem],
        limit: Option<&Expr>,
        offset: Option<&Expr>,
    ) -> Result<Option<QueryPlan>> {
        if !self.settings.vector_index_scan
            || select.selection.is_some()
            || !select.group_by.is_empty()
            || select.having.is_some()
            || select.distinct
            || order_by.len() != 1
            || order_by[0].desc
        {
            return Ok(None);
        }
        let Some(limit) = limit else {
            return Ok(None);
        };
        let Some(TableRef::Table { name, alias }) = &select.from else {
            return Ok(None);
        };
        if self.lookup_cte(name).is_some() || !is_plain_projection(&select.projection) {
            return Ok(None);
        }

        let key = resolve_alias(&order_by[0].expr, &select.projection);
        let Expr::Function(call) = key else {
            return Ok(None);
        };
        if call.over.is_some() || call.args.len() != 2 {
            return Ok(None);
        }
        let metric = match call.name.as_str() {
            "VEC_DISTANCE_L2" => DistanceMetric::L2,
            "VEC_DISTANCE_COSINE" => DistanceMetric::Cosine,
            "VEC_DISTANCE_IP" => DistanceMetric::InnerProduct,
            _ => return Ok(None),
        };

        let table = self.catalog.resolve_table(name)?;
        let alias = alias.clone().unwrap_or_else(|| table.name().to_string());
        let scope = Scope::for_table(&table, &alias);

        for (column_arg, query_arg) in [(&call.args[0], &call.args[1]), (&call.args[1], &call.args[0])] {
            let Some(position) = table_column(&table, &scope, column_arg)? else {
                continue;
            };
            let index = table.indexes().iter().find(|index| {
                matches!(index.kind(), IndexKind::Hnsw { metric: m, .. } if m == metric)
                    && table.column_index(&index.columns()[0]) == Some(position)
            });
            let Some(index) = index else {
                continue;
            };
            let Some(query) = self.key_operand(&scope, query_arg)? else {
                continue;
            };

            let limit = self.compile_constant(limit)?;
            let offset = offset.map(|e| self.compile_constant(e)).transpose()?;
            let env = ExprEnv::new(&scope);
            let Projection { exprs, columns, .. } =
                self.compile_projection(&select.projection, &env, None, true)?;

            trace!(
                table = table.name(),
                index = index.name(),
                metric = %metric,
                "chose vector index search"
            );
            let root = PhysicalPlan::VectorSearch {
                index: index.name().to_string(),
                table: Arc::clone(&table),
                alias,
                query,
                limit,
                offset,
                ef_search: self.settings.ef_search,
            };
            return Ok(Some(QueryPlan {
                root: PhysicalPlan::Project {
                    input: Box::new(root),
                    exprs,
                },
                columns,
            }));
        }
        Ok(None)
    }
}

fn table_column(table: &TableDef, scope: &Scope, expr: &Expr) -> Result<Option<usize>> {
    let Expr::Column { table: qualifier, name } = expr else {
        return Ok(None);
    };
    Ok(scope
        .resolve(qualifier.as_deref(), name)?
        .filter(|&p| p < table.column_count()))
}

/// True when the select list has no aggregate or window calls.
fn is_plain_projection(projection: &[SelectItem]) -> bool {
    projection.iter().all(|item| match item {
        SelectItem::Expr { expr, .. } => {
            let mut plain = true;
            expr.walk(&mut |e| {
                if let Expr::Function(call) = e {
                    if call.over.is_some() || functions::is_aggregate(&call.name) {
                        plain = false;
                    }
                }
                plain
            });
            plain
        }
        _ => true,
    })
}

fn resolve_alias<'q>(expr: &'q Expr, projection: &'q [SelectItem]) -> &'q Expr {
    if let Expr::Column { table: None, name } = expr {
        for item in projection {
            if let SelectItem::Expr {
                expr: aliased,
                alias: Some(alias),
                ..
            } = item
            {
                if alias.eq_ignore_ascii_case(name) {
                    return aliased;
                }
            }
        }
    }
    expr
}

fn choose_index(table: &TableDef, predicates: &[ColumnPredicate]) -> Option<(String, IndexAccess)> {
    let mut best: Option<(usize, String, IndexAccess)> = None;

    for index in table.indexes().iter().filter(|i| !i.is_hnsw()) {
        let positions = table.index_column_positions(index);
        let mut eq = Vec::new();
        let mut key_types = Vec::new();
        for &position in &positions {
            let Some(predicate) = predicates
                .iter()
                .find(|p| p.column == position && p.op == BinaryOp::Eq)
            else {
                break;
            };
            eq.push(predicate.value.clone());
            key_types.push(table.columns()[position].data_type());
        }

        let mut lower = None;
        let mut upper = None;
        if let Some(&next) = positions.get(eq.len()) {
            for predicate in predicates.iter().filter(|p| p.column == next) {
                match predicate.op {
                    BinaryOp::Gt | BinaryOp::GtEq if lower.is_none() => {
                        lower = Some((predicate.value.clone(), predicate.op == BinaryOp::GtEq));
                    }
                    BinaryOp::Lt | BinaryOp::LtEq if upper.is_none() => {
                        upper = Some((predicate.value.clone(), predicate.op == BinaryOp::LtEq));
                    }
                    _ => {}
                }
            }
            if lower.is_some() || upper.is_some() {
                key_types.push(table.columns()[next].data_type());
            }
        }

        let ranged = lower.is_some() || upper.is_some();
        let full_unique = index.is_unique() && eq.len() == positions.len();
        let score = eq.len() * 2 + usize::from(full_unique) + usize::from(ranged);
        if score == 0 {
            continue;
        }
        if best.as_ref().map_or(true, |(s, ..)| score > *s) {
            best = Some((
                score,
                index.name().to_string(),
                IndexAccess {
                    eq,
                    lower,
                    upper,
                    key_types,
                },
            ));
        }
    }

    best.map(|(_, name, access)| (name, access))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hnsw::HnswParams;
    use crate::schema::{Catalog, ColumnDef, Constraint, IndexDef};
    use crate::sql::parser::parse_statement;
    use crate::sql::planner::{plan_statement, Plan, PlanSettings};
    use crate::types::DataType;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog
            .create_table(
                TableDef::new(
                    0,
                    "events",
                    vec![
                        ColumnDef::new("id", DataType::Integer).with_constraint(Constraint::PrimaryKey),
                        ColumnDef::new("kind", DataType::Text),
                        ColumnDef::new("at", DataType::Integer),
                        ColumnDef::new("embedding", DataType::Vector(3)),
                    ],
                )
                .unwrap(),
            )
            .unwrap();
        catalog
            .create_index("events", IndexDef::btree("events_at", vec!["at".into()], false))
            .unwrap();
        catalog
            .create_index(
                "events",
                IndexDef::btree("events_kind_at", vec!["kind".into(), "at".into()], false),
            )
            .unwrap();
        catalog
            .create_index(
                "events",
                IndexDef::new(
                    "events_embedding",
                    vec!["embedding".into()],
                    false,
                    IndexKind::Hnsw {
                        metric: DistanceMetric::Cosine,
                        params: HnswParams::default(),
                    },
                ),
            )
            .unwrap();
        catalog
    }

    fn explain_with(sql: &str, settings: PlanSettings) -> String {
        let catalog = catalog();
        match plan_statement(&catalog, settings, &parse_statement(sql).unwrap())
            .unwrap()
            .plan
        {
            Plan::Query(query) => query.root.explain(),
            other => panic!("unexpected plan {:?}", other),
        }
    }

    fn explain(sql: &str) -> String {
        explain_with(sql, PlanSettings::default())
    }

    #[test]
    fn equality_prefix_beats_range() {
        let text = explain("SELECT * FROM events WHERE at > 5 AND kind = 'click'");
        assert!(text.contains("using events_kind_at (eq=1, range=true)"), "{}", text);
    }

    #[test]
    fn range_only_uses_single_column_index() {
        let text = explain("SELECT * FROM events WHERE at BETWEEN 1 AND 9");
        assert!(text.contains("using events_at (eq=0, range=true)"), "{}", text);
    }

    #[test]
    fn flipped_operands_are_recognized() {
        let text = explain("SELECT * FROM events WHERE 10 = id");
        assert!(text.contains("using events_pkey (eq=1, range=false)"), "{}", text);
    }

    #[test]
    fn column_comparisons_do_not_use_indexes() {
        let text = explain("SELECT * FROM events WHERE id = at");
        assert!(text.contains("SeqScan on events (filtered)"), "{}", text);
    }

    #[test]
    fn knn_query_uses_hnsw_index() {
        let text = explain(
            "SELECT id, VEC_DISTANCE_COSINE(embedding, [1, 0, 0]) AS d FROM events ORDER BY d LIMIT 3",
        );
        assert!(text.contains("VectorSearch on events using events_embedding"), "{}", text);
    }

    #[test]
    fn metric_mismatch_falls_back_to_sort() {
        let text = explain("SELECT id FROM events ORDER BY VEC_DISTANCE_L2(embedding, [1, 0, 0]) LIMIT 3");
        assert!(!text.contains("VectorSearch"), "{}", text);
        assert!(text.contains("Sort"), "{}", text);
    }

    #[test]
    fn pragma_setting_disables_vector_search() {
        let settings = PlanSettings {
            vector_index_scan: false,
            ..PlanSettings::default()
        };
        let text = explain_with(
            "SELECT id FROM events ORDER BY VEC_DISTANCE_COSINE(embedding, [1, 0, 0]) LIMIT 3",
            settings,
        );
        assert!(!text.contains("VectorSearch"), "{}", text);
    }
}
