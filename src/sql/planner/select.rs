//! SELECT planning.
//!
//! A SELECT block is planned bottom-up in a fixed order:
//!
//! ```text
//! FROM/WHERE → Aggregate → HAVING → Window → Project → Distinct → Sort → Limit
//! ```
//!
//! Aggregate and window calls are computed by their own operators and then
//! substituted: later clauses that contain the same call (structurally equal
//! AST) read the operator's output column instead of re-evaluating it.
//! ORDER BY keys that are not part of the select list become hidden columns
//! of the projection, trimmed off again after sorting.

use eyre::Result;
use hashbrown::HashMap;
use std::sync::Arc;
use tracing::trace;

use super::expr::{ExprEnv, PhysExpr};
use super::physical::{
    AggregateExpr, AggregateFunc, PhysicalPlan, SortKey, WindowExpr, WindowFunc,
};
use super::scope::Scope;
use super::{CteBinding, Planner, QueryPlan};
use crate::schema::TableDef;
use crate::sql::ast::{
    BinaryOp, Cte, Expr, FunctionCall, JoinKind, Literal, OrderByItem, Query, Select, SelectItem,
    SetExpr, TableRef,
};
use crate::sql::functions;
use crate::types::DataType;

/// A compiled select list.
pub(super) struct Projection<'q> {
    pub exprs: Vec<PhysExpr>,
    pub columns: Vec<String>,
    /// The AST each output came from; `None` for wildcard expansions.
    pub sources: Vec<Option<&'q Expr>>,
    pub aliases: Vec<Option<&'q str>>,
}

impl Planner<'_> {
    pub(crate) fn plan_query(&mut self, query: &Query) -> Result<QueryPlan> {
        self.ctes.push(HashMap::new());
        let planned = self.plan_query_body(query);
        self.ctes.pop();
        planned
    }

    fn plan_query_body(&mut self, query: &Query) -> Result<QueryPlan> {
        for cte in &query.ctes {
            self.plan_cte(cte)?;
        }
        match &query.body {
            SetExpr::Select(select) => self.plan_select(
                select,
                &query.order_by,
                query.limit.as_ref(),
                query.offset.as_ref(),
            ),
            body => {
                let planned = self.plan_set_expr(body)?;
                self.finish_set_query(planned, query)
            }
        }
    }

    fn plan_cte(&mut self, cte: &Cte) -> Result<()> {
        let key = cte.name.to_ascii_lowercase();
        if self.ctes.last().is_some_and(|frame| frame.contains_key(&key)) {
            schema_bail!("WITH query name '{}' specified more than once", cte.name);
        }

        let refs_before = self.outer_refs;
        let planned = self.plan_query(&cte.query)?;
        let columns = if cte.columns.is_empty() {
            planned.columns
        } else {
            if cte.columns.len() != planned.columns.len() {
                schema_bail!(
                    "WITH query '{}' has {} columns available but {} columns specified",
                    cte.name,
                    planned.columns.len(),
                    cte.columns.len()
                );
            }
            cte.columns.clone()
        };

        let binding = CteBinding {
            id: self.next_id(),
            plan: Arc::new(planned.root),
            columns,
            correlated: self.outer_refs != refs_before,
        };
        if let Some(frame) = self.ctes.last_mut() {
            frame.insert(key, binding);
        }
        Ok(())
    }

    fn plan_set_expr(&mut self, body: &SetExpr) -> Result<QueryPlan> {
        match body {
            SetExpr::Select(select) => self.plan_select(select, &[], None, None),
            SetExpr::Query(query) => self.plan_query(query),
            SetExpr::Union { left, right, all } => {
                let left = self.plan_set_expr(left)?;
                let right = self.plan_set_expr(right)?;
                if left.columns.len() != right.columns.len() {
                    schema_bail!(
                        "each UNION query must have the same number of columns ({} vs {})",
                        left.columns.len(),
                        right.columns.len()
                    );
                }
                Ok(QueryPlan {
                    root: PhysicalPlan::Union {
                        left: Box::new(left.root),
                        right: Box::new(right.root),
                        all: *all,
                    },
                    columns: left.columns,
                })
            }
        }
    }

    /// ORDER BY and LIMIT around a set operation or parenthesized query.
    /// Keys can only name output columns.
    fn finish_set_query(&mut self, planned: QueryPlan, query: &Query) -> Result<QueryPlan> {
        let QueryPlan { mut root, columns } = planned;

        if !query.order_by.is_empty() {
            let scope = Scope::named(None, &columns);
            let env = ExprEnv::new(&scope);
            let mut keys = Vec::with_capacity(query.order_by.len());
            for item in &query.order_by {
                let expr = match ordinal(&item.expr, columns.len())? {
                    Some(index) => PhysExpr::Column(index),
                    None => self.compile_expr(&item.expr, &env)?,
                };
                keys.push(SortKey {
                    expr,
                    desc: item.desc,
                    nulls_first: item.nulls_first,
                });
            }
            root = PhysicalPlan::Sort {
                input: Box::new(root),
                keys,
            };
        }

        let root = self.apply_limit(root, query.limit.as_ref(), query.offset.as_ref())?;
        Ok(QueryPlan { root, columns })
    }

    pub(super) fn apply_limit(
        &mut self,
        root: PhysicalPlan,
        limit: Option<&Expr>,
        offset: Option<&Expr>,
    ) -> Result<PhysicalPlan> {
        if limit.is_none() && offset.is_none() {
            return Ok(root);
        }
        let limit = limit.map(|e| self.compile_constant(e)).transpose()?;
        let offset = offset.map(|e| self.compile_constant(e)).transpose()?;
        Ok(PhysicalPlan::Limit {
            input: Box::new(root),
            limit,
            offset,
        })
    }

    fn plan_select(
        &mut self,
        select: &Select,
        order_by: &[OrderByItem],
        limit: Option<&Expr>,
        offset: Option<&Expr>,
    ) -> Result<QueryPlan> {
        if let Some(planned) = self.try_vector_search(select, order_by, limit, offset)? {
            return Ok(planned);
        }

        let (mut plan, from_scope) =
            self.plan_from_where(select.from.as_ref(), select.selection.as_ref())?;

        let mut agg_calls = Vec::new();
        for item in &select.projection {
            if let SelectItem::Expr { expr, .. } = item {
                collect_aggregates(expr, &mut agg_calls);
            }
        }
        if let Some(having) = &select.having {
            collect_aggregates(having, &mut agg_calls);
        }
        for item in order_by {
            collect_aggregates(&item.expr, &mut agg_calls);
        }
        let grouped = !agg_calls.is_empty() || !select.group_by.is_empty() || select.having.is_some();

        let mut scope = from_scope.clone();
        let mut substitutions: Vec<(Expr, usize)> = Vec::new();

        if grouped {
            let env = ExprEnv::new(&from_scope);
            let mut group_by = Vec::with_capacity(select.group_by.len());
            let mut agg_scope = Scope::default();

            for expr in &select.group_by {
                let expr = group_key(expr, select, &from_scope)?;
                group_by.push(self.compile_expr(&expr, &env)?);
                let column = match &expr {
                    Expr::Column { table, name } => from_scope.resolve(table.as_deref(), name)?,
                    _ => None,
                };
                match column {
                    Some(position) => agg_scope.push(from_scope.column(position).clone()),
                    None => agg_scope.push_anonymous(),
                }
                substitutions.push((expr, group_by.len() - 1));
            }

            let mut aggregates = Vec::with_capacity(agg_calls.len());
            for call_expr in &agg_calls {
                let Expr::Function(call) = call_expr else {
                    continue;
                };
                aggregates.push(self.compile_aggregate(call, &env)?);
                agg_scope.push_anonymous();
                substitutions.push((call_expr.clone(), group_by.len() + aggregates.len() - 1));
            }

            plan = PhysicalPlan::Aggregate {
                input: Box::new(plan),
                group_by,
                aggregates,
            };
            scope = agg_scope;
        }
        let grouped_from = grouped.then_some(&from_scope);

        if let Some(having) = &select.having {
            let env = ExprEnv {
                scope: &scope,
                substitutions: &substitutions,
                grouped_from,
            };
            let predicate = self.compile_expr(having, &env)?;
            plan = PhysicalPlan::Filter {
                input: Box::new(plan),
                predicate,
            };
        }

        let mut window_calls = Vec::new();
        for item in &select.projection {
            if let SelectItem::Expr { expr, .. } = item {
                collect_windows(expr, &mut window_calls);
            }
        }
        for item in order_by {
            collect_windows(&item.expr, &mut window_calls);
        }
        if !window_calls.is_empty() {
            let base = scope.len();
            let mut window_functions = Vec::with_capacity(window_calls.len());
            {
                let env = ExprEnv {
                    scope: &scope,
                    substitutions: &substitutions,
                    grouped_from,
                };
                for call_expr in &window_calls {
                    if let Expr::Function(call) = call_expr {
                        window_functions.push(self.compile_window(call, &env)?);
                    }
                }
            }
            for (k, call_expr) in window_calls.iter().enumerate() {
                scope.push_anonymous();
                substitutions.push((call_expr.clone(), base + k));
            }
            plan = PhysicalPlan::Window {
                input: Box::new(plan),
                functions: window_functions,
            };
        }

        let env = ExprEnv {
            scope: &scope,
            substitutions: &substitutions,
            grouped_from,
        };
        let Projection {
            mut exprs,
            columns,
            sources,
            aliases,
        } = self.compile_projection(&select.projection, &env, grouped.then_some(&from_scope), select.from.is_some())?;

        let visible = exprs.len();
        let mut keys = Vec::with_capacity(order_by.len());
        for item in order_by {
            let position = if let Some(index) = ordinal(&item.expr, visible)? {
                index
            } else if let Some(index) = alias_position(&item.expr, &aliases) {
                index
            } else if let Some(index) = sources.iter().position(|s| *s == Some(&item.expr)) {
                index
            } else {
                let compiled = self.compile_expr(&item.expr, &env)?;
                let existing = match &compiled {
                    PhysExpr::Column(p) => exprs[..visible]
                        .iter()
                        .position(|e| matches!(e, PhysExpr::Column(q) if q == p)),
                    _ => None,
                };
                match existing {
                    Some(index) => index,
                    None if select.distinct => schema_bail!(
                        "for SELECT DISTINCT, ORDER BY expressions must appear in select list"
                    ),
                    None => {
                        exprs.push(compiled);
                        exprs.len() - 1
                    }
                }
            };
            keys.push(SortKey {
                expr: PhysExpr::Column(position),
                desc: item.desc,
                nulls_first: item.nulls_first,
            });
        }

        let hidden = exprs.len() > visible;
        plan = PhysicalPlan::Project {
            input: Box::new(plan),
            exprs,
        };
        if select.distinct {
            plan = PhysicalPlan::Distinct {
                input: Box::new(plan),
            };
        }
        if !keys.is_empty() {
            plan = PhysicalPlan::Sort {
                input: Box::new(plan),
                keys,
            };
        }
        if hidden {
            plan = PhysicalPlan::Project {
                input: Box::new(plan),
                exprs: (0..visible).map(PhysExpr::Column).collect(),
            };
        }
        let root = self.apply_limit(plan, limit, offset)?;
        Ok(QueryPlan { root, columns })
    }

    /// Compiles a select list. `grouped_from` is the pre-aggregation scope
    /// when the query is grouped: `*` then expands over the source columns
    /// and each must be a grouping key.
    pub(super) fn compile_projection<'q>(
        &mut self,
        projection: &'q [SelectItem],
        env: &ExprEnv<'_>,
        grouped_from: Option<&Scope>,
        has_from: bool,
    ) -> Result<Projection<'q>> {
        let mut out = Projection {
            exprs: Vec::new(),
            columns: Vec::new(),
            sources: Vec::new(),
            aliases: Vec::new(),
        };

        for item in projection {
            match item {
                SelectItem::Wildcard | SelectItem::QualifiedWildcard(_) => {
                    let qualifier = match item {
                        SelectItem::QualifiedWildcard(q) => Some(q.as_str()),
                        _ => None,
                    };
                    if !has_from {
                        schema_bail!("SELECT * with no tables specified is not valid");
                    }
                    let source = grouped_from.unwrap_or(env.scope);
                    if let Some(q) = qualifier {
                        if !source.has_qualifier(q) {
                            schema_bail!("unknown table or alias '{}'", q);
                        }
                    }
                    for position in source.wildcard(qualifier) {
                        let column = source.column(position);
                        let expr = match grouped_from {
                            Some(_) => {
                                let synthetic = Expr::Column {
                                    table: column.table.clone(),
                                    name: column.name.clone(),
                                };
                                self.compile_expr(&synthetic, env)?
                            }
                            None => PhysExpr::Column(position),
                        };
                        out.exprs.push(expr);
                        out.columns.push(column.name.clone());
                        out.sources.push(None);
                        out.aliases.push(None);
                    }
                }
                SelectItem::Expr { expr, alias, text } => {
                    out.exprs.push(self.compile_expr(expr, env)?);
                    let label = match (alias, expr) {
                        (Some(alias), _) => alias.clone(),
                        (None, Expr::Column { name, .. }) => name.clone(),
                        (None, _) => text.clone(),
                    };
                    out.columns.push(label);
                    out.sources.push(Some(expr));
                    out.aliases.push(alias.as_deref());
                }
            }
        }
        Ok(out)
    }

    /// Plans FROM and WHERE together so a single-table query can use an
    /// index for its predicate.
    pub(super) fn plan_from_where(
        &mut self,
        from: Option<&TableRef>,
        selection: Option<&Expr>,
    ) -> Result<(PhysicalPlan, Scope)> {
        if let Some(TableRef::Table { name, alias }) = from {
            if self.lookup_cte(name).is_none() {
                let table = self.catalog.resolve_table(name)?;
                let alias = alias.clone().unwrap_or_else(|| table.name().to_string());
                let scope = Scope::for_table(&table, &alias);
                let plan = self.plan_table_access(table, alias, &scope, selection)?;
                return Ok((plan, scope));
            }
        }

        let (plan, scope) = match from {
            Some(table_ref) => self.plan_table_ref(table_ref)?,
            None => (PhysicalPlan::Values { rows: vec![vec![]] }, Scope::default()),
        };
        let plan = match selection {
            Some(selection) => {
                let predicate = self.compile_expr(selection, &ExprEnv::new(&scope))?;
                PhysicalPlan::Filter {
                    input: Box::new(plan),
                    predicate,
                }
            }
            None => plan,
        };
        Ok((plan, scope))
    }

    fn plan_table_ref(&mut self, table_ref: &TableRef) -> Result<(PhysicalPlan, Scope)> {
        match table_ref {
            TableRef::Table { name, alias } => {
                if let Some(cte) = self.lookup_cte(name).cloned() {
                    let alias = alias.as_deref().unwrap_or(name);
                    return Ok((
                        PhysicalPlan::CteScan {
                            id: cte.id,
                            name: name.clone(),
                            plan: cte.plan,
                            correlated: cte.correlated,
                        },
                        Scope::named(Some(alias), &cte.columns),
                    ));
                }
                let table = self.catalog.resolve_table(name)?;
                let alias = alias.clone().unwrap_or_else(|| table.name().to_string());
                let scope = Scope::for_table(&table, &alias);
                Ok((
                    PhysicalPlan::SeqScan {
                        table,
                        alias,
                        filter: None,
                    },
                    scope,
                ))
            }
            TableRef::Derived { query, alias } => {
                let planned = self.plan_query(query)?;
                Ok((planned.root, Scope::named(Some(alias), &planned.columns)))
            }
            TableRef::Join {
                left,
                right,
                kind,
                on,
            } => {
                let (left_plan, left_scope) = self.plan_table_ref(left)?;
                let (right_plan, right_scope) = self.plan_table_ref(right)?;
                let scope = Scope::join(&left_scope, &right_scope);
                let plan = self.plan_join(
                    left_plan,
                    left_scope.len(),
                    right_plan,
                    right_scope.len(),
                    *kind,
                    on.as_ref(),
                    &scope,
                )?;
                Ok((plan, scope))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_join(
        &mut self,
        left: PhysicalPlan,
        left_width: usize,
        right: PhysicalPlan,
        right_width: usize,
        kind: JoinKind,
        on: Option<&Expr>,
        scope: &Scope,
    ) -> Result<PhysicalPlan> {
        let condition = match on {
            Some(on) => Some(self.compile_expr(on, &ExprEnv::new(scope))?),
            None => None,
        };

        let Some(condition) = condition.filter(|_| kind != JoinKind::Cross) else {
            return Ok(PhysicalPlan::NestedLoopJoin {
                left: Box::new(left),
                right: Box::new(right),
                kind,
                condition: None,
                right_width,
            });
        };

        let (pairs, residual) = split_equi_keys(&condition, left_width);
        if pairs.is_empty() {
            return Ok(PhysicalPlan::NestedLoopJoin {
                left: Box::new(left),
                right: Box::new(right),
                kind,
                condition: Some(condition),
                right_width,
            });
        }

        if let PhysicalPlan::SeqScan {
            table,
            alias,
            filter: None,
        } = &right
        {
            if let Some((index, keys, key_types)) = index_for_join(table, &pairs, left_width) {
                trace!(table = table.name(), index = %index, keys = keys.len(), "index nested loop join");
                return Ok(PhysicalPlan::IndexNestedLoopJoin {
                    left: Box::new(left),
                    table: Arc::clone(table),
                    alias: alias.clone(),
                    index,
                    keys,
                    key_types,
                    kind,
                    condition: Some(condition),
                });
            }
        }

        let (left_keys, right_keys) = pairs
            .into_iter()
            .map(|(l, mut r)| {
                r.shift_columns(left_width);
                (l, r)
            })
            .unzip();
        trace!(kind = ?kind, "hash join");
        Ok(PhysicalPlan::HashJoin {
            left: Box::new(left),
            right: Box::new(right),
            kind,
            left_keys,
            right_keys,
            residual,
            right_width,
        })
    }

    fn compile_aggregate(&mut self, call: &FunctionCall, env: &ExprEnv<'_>) -> Result<AggregateExpr> {
        let Some(func) = AggregateFunc::parse(&call.name, call.star) else {
            schema_bail!("{}(*) is not supported", call.name);
        };
        if call.star && call.distinct {
            schema_bail!("COUNT(DISTINCT *) is not supported");
        }
        let arg = match func {
            AggregateFunc::CountStar => None,
            _ => {
                if call.args.len() != 1 {
                    schema_bail!("{} takes exactly one argument", call.name);
                }
                Some(self.compile_expr(&call.args[0], env)?)
            }
        };
        Ok(AggregateExpr {
            func,
            arg,
            distinct: call.distinct,
        })
    }

    fn compile_window(&mut self, call: &FunctionCall, env: &ExprEnv<'_>) -> Result<WindowExpr> {
        let Some(over) = &call.over else {
            schema_bail!("{} requires an OVER clause", call.name);
        };
        let func = match call.name.as_str() {
            "ROW_NUMBER" => WindowFunc::RowNumber,
            "RANK" => WindowFunc::Rank,
            "DENSE_RANK" => WindowFunc::DenseRank,
            "LAG" => WindowFunc::Lag,
            "LEAD" => WindowFunc::Lead,
            name => match AggregateFunc::parse(name, call.star) {
                Some(func) => WindowFunc::Aggregate(func),
                None => schema_bail!("{} cannot be used as a window function", name),
            },
        };
        if call.distinct {
            schema_bail!("DISTINCT is not supported in window functions");
        }

        let (min_args, max_args) = match func {
            WindowFunc::RowNumber | WindowFunc::Rank | WindowFunc::DenseRank => (0, 0),
            WindowFunc::Lag | WindowFunc::Lead => (1, 3),
            WindowFunc::Aggregate(AggregateFunc::CountStar) => (0, 0),
            WindowFunc::Aggregate(_) => (1, 1),
        };
        if call.args.len() < min_args || call.args.len() > max_args {
            schema_bail!(
                "{} takes {} to {} arguments, found {}",
                call.name,
                min_args,
                max_args,
                call.args.len()
            );
        }

        let args = call
            .args
            .iter()
            .map(|e| self.compile_expr(e, env))
            .collect::<Result<_>>()?;
        let partition_by = over
            .partition_by
            .iter()
            .map(|e| self.compile_expr(e, env))
            .collect::<Result<_>>()?;
        let mut order_by = Vec::with_capacity(over.order_by.len());
        for item in &over.order_by {
            order_by.push(SortKey {
                expr: self.compile_expr(&item.expr, env)?,
                desc: item.desc,
                nulls_first: item.nulls_first,
            });
        }

        Ok(WindowExpr {
            func,
            args,
            partition_by,
            order_by,
            frame: over.frame,
        })
    }
}

fn collect_aggregates(expr: &Expr, out: &mut Vec<Expr>) {
    expr.walk(&mut |e| match e {
        Expr::Function(call) if call.over.is_none() && functions::is_aggregate(&call.name) => {
            if !out.contains(e) {
                out.push(e.clone());
            }
            false
        }
        _ => true,
    });
}

fn collect_windows(expr: &Expr, out: &mut Vec<Expr>) {
    expr.walk(&mut |e| match e {
        Expr::Function(call) if call.over.is_some() => {
            if !out.contains(e) {
                out.push(e.clone());
            }
            false
        }
        _ => true,
    });
}

/// `ORDER BY 2` style references, 1-based.
fn ordinal(expr: &Expr, width: usize) -> Result<Option<usize>> {
    match expr {
        Expr::Literal(Literal::Integer(n)) => {
            if *n < 1 || *n as usize > width {
                schema_bail!("ORDER BY position {} is not in select list", n);
            }
            Ok(Some(*n as usize - 1))
        }
        _ => Ok(None),
    }
}

fn alias_position(expr: &Expr, aliases: &[Option<&str>]) -> Option<usize> {
    let Expr::Column { table: None, name } = expr else {
        return None;
    };
    aliases
        .iter()
        .position(|a| a.is_some_and(|a| a.eq_ignore_ascii_case(name)))
}

/// Resolves a GROUP BY item, which may name a select-list ordinal or an
/// output alias that is not also a source column.
fn group_key(expr: &Expr, select: &Select, from_scope: &Scope) -> Result<Expr> {
    let item_expr = |index: usize| match select.projection.get(index) {
        Some(SelectItem::Expr { expr, .. }) => Ok(expr.clone()),
        _ => Err(crate::error::DbError::schema(format!(
            "GROUP BY position {} is not an expression in the select list",
            index + 1
        ))),
    };

    match expr {
        Expr::Literal(Literal::Integer(n)) => {
            if *n < 1 || *n as usize > select.projection.len() {
                schema_bail!("GROUP BY position {} is not in select list", n);
            }
            item_expr(*n as usize - 1)
        }
        Expr::Column { table: None, name } if from_scope.resolve(None, name)?.is_none() => {
            let aliased = select.projection.iter().position(|item| {
                matches!(item, SelectItem::Expr { alias: Some(a), .. } if a.eq_ignore_ascii_case(name))
            });
            match aliased {
                Some(index) => item_expr(index),
                None => Ok(expr.clone()),
            }
        }
        _ => Ok(expr.clone()),
    }
}

fn conjuncts(expr: &PhysExpr, out: &mut Vec<PhysExpr>) {
    match expr {
        PhysExpr::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => {
            conjuncts(left, out);
            conjuncts(right, out);
        }
        other => out.push(other.clone()),
    }
}

/// Splits a join condition into `left = right` key pairs (left side reads
/// only left columns, right side only right columns) and the rest.
fn split_equi_keys(condition: &PhysExpr, left_width: usize) -> (Vec<(PhysExpr, PhysExpr)>, Option<PhysExpr>) {
    let mut terms = Vec::new();
    conjuncts(condition, &mut terms);

    let side = |e: &PhysExpr| -> Option<bool> {
        if e.has_subquery() {
            return None;
        }
        let columns = e.columns();
        if columns.is_empty() {
            None
        } else if columns.iter().all(|&c| c < left_width) {
            Some(true)
        } else if columns.iter().all(|&c| c >= left_width) {
            Some(false)
        } else {
            None
        }
    };

    let mut pairs = Vec::new();
    let mut rest: Vec<PhysExpr> = Vec::new();
    for term in terms {
        if let PhysExpr::Binary {
            op: BinaryOp::Eq,
            left,
            right,
        } = &term
        {
            match (side(left), side(right)) {
                (Some(true), Some(false)) => {
                    pairs.push(((**left).clone(), (**right).clone()));
                    continue;
                }
                (Some(false), Some(true)) => {
                    pairs.push(((**right).clone(), (**left).clone()));
                    continue;
                }
                _ => {}
            }
        }
        rest.push(term);
    }

    let residual = rest.into_iter().reduce(|acc, term| PhysExpr::Binary {
        op: BinaryOp::And,
        left: Box::new(acc),
        right: Box::new(term),
    });
    (pairs, residual)
}

/// Finds the B-tree index of `table` whose leading columns are covered by
/// the most join keys. Returns the left-side key expressions in index
/// column order.
fn index_for_join(
    table: &TableDef,
    pairs: &[(PhysExpr, PhysExpr)],
    left_width: usize,
) -> Option<(String, Vec<PhysExpr>, Vec<DataType>)> {
    let key_column = |right: &PhysExpr| match right {
        PhysExpr::Column(p) if *p >= left_width && *p - left_width < table.column_count() => {
            Some(*p - left_width)
        }
        _ => None,
    };

    let mut best: Option<(usize, String, Vec<PhysExpr>, Vec<DataType>)> = None;
    for index in table.indexes().iter().filter(|i| !i.is_hnsw()) {
        let mut keys = Vec::new();
        let mut types = Vec::new();
        for position in table.index_column_positions(index) {
            let Some((left, _)) = pairs.iter().find(|(_, r)| key_column(r) == Some(position)) else {
                break;
            };
            keys.push(left.clone());
            types.push(table.columns()[position].data_type());
        }
        if keys.is_empty() {
            continue;
        }
        if best.as_ref().map_or(true, |(n, ..)| keys.len() > *n) {
            best = Some((keys.len(), index.name().to_string(), keys, types));
        }
    }
    best.map(|(_, name, keys, types)| (name, keys, types))
}
