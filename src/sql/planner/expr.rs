//! Physical expressions and their compilation from the AST.
//!
//! Column references are resolved to tuple positions once, at plan time.
//! A reference into an enclosing query becomes `Outer { level, index }`:
//! level 1 is the row of the immediately enclosing query, which the
//! executor pushes onto its outer-row stack before running the subquery.

use eyre::Result;
use std::sync::Arc;

use super::scope::Scope;
use super::{PhysicalPlan, Planner};
use crate::error::DbError;
use crate::sql::ast::{BinaryOp, Expr, Literal, ParamRef, UnaryOp};
use crate::sql::functions::{self, ScalarFunction};
use crate::types::{DataType, Value};

#[derive(Debug, Clone)]
pub enum PhysExpr {
    Literal(Value),
    Column(usize),
    Outer {
        level: usize,
        index: usize,
    },
    Param(usize),
    NamedParam(usize),
    Unary {
        op: UnaryOp,
        expr: Box<PhysExpr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<PhysExpr>,
        right: Box<PhysExpr>,
    },
    IsNull {
        expr: Box<PhysExpr>,
        negated: bool,
    },
    Between {
        expr: Box<PhysExpr>,
        low: Box<PhysExpr>,
        high: Box<PhysExpr>,
        negated: bool,
    },
    Like {
        expr: Box<PhysExpr>,
        pattern: Box<PhysExpr>,
        negated: bool,
    },
    InList {
        expr: Box<PhysExpr>,
        list: Vec<PhysExpr>,
        negated: bool,
    },
    InSubquery {
        expr: Box<PhysExpr>,
        subquery: Arc<SubqueryPlan>,
        negated: bool,
    },
    Exists {
        subquery: Arc<SubqueryPlan>,
        negated: bool,
    },
    ScalarSubquery(Arc<SubqueryPlan>),
    Case {
        operand: Option<Box<PhysExpr>>,
        branches: Vec<(PhysExpr, PhysExpr)>,
        else_result: Option<Box<PhysExpr>>,
    },
    Cast {
        expr: Box<PhysExpr>,
        data_type: DataType,
    },
    Vector(Vec<PhysExpr>),
    Function {
        function: &'static ScalarFunction,
        args: Vec<PhysExpr>,
    },
}

/// A subquery planned inside an expression. Uncorrelated subqueries are
/// evaluated once per statement and cached under `id`.
#[derive(Debug)]
pub struct SubqueryPlan {
    pub id: usize,
    pub plan: PhysicalPlan,
    pub correlated: bool,
}

impl PhysExpr {
    /// Visits every node, not descending into subquery plans.
    pub fn visit(&self, f: &mut dyn FnMut(&PhysExpr)) {
        f(self);
        match self {
            PhysExpr::Literal(_)
            | PhysExpr::Column(_)
            | PhysExpr::Outer { .. }
            | PhysExpr::Param(_)
            | PhysExpr::NamedParam(_)
            | PhysExpr::Exists { .. }
            | PhysExpr::ScalarSubquery(_) => {}
            PhysExpr::Unary { expr, .. }
            | PhysExpr::IsNull { expr, .. }
            | PhysExpr::Cast { expr, .. }
            | PhysExpr::InSubquery { expr, .. } => expr.visit(f),
            PhysExpr::Binary { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            PhysExpr::Between { expr, low, high, .. } => {
                expr.visit(f);
                low.visit(f);
                high.visit(f);
            }
            PhysExpr::Like { expr, pattern, .. } => {
                expr.visit(f);
                pattern.visit(f);
            }
            PhysExpr::InList { expr, list, .. } => {
                expr.visit(f);
                list.iter().for_each(|e| e.visit(f));
            }
            PhysExpr::Case {
                operand,
                branches,
                else_result,
            } => {
                if let Some(operand) = operand {
                    operand.visit(f);
                }
                for (when, then) in branches {
                    when.visit(f);
                    then.visit(f);
                }
                if let Some(else_result) = else_result {
                    else_result.visit(f);
                }
            }
            PhysExpr::Vector(items) | PhysExpr::Function { args: items, .. } => {
                items.iter().for_each(|e| e.visit(f));
            }
        }
    }

    /// Positions of the input tuple this expression reads.
    pub fn columns(&self) -> Vec<usize> {
        let mut out = Vec::new();
        self.visit(&mut |e| {
            if let PhysExpr::Column(i) = e {
                out.push(*i);
            }
        });
        out
    }

    pub fn has_subquery(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            if matches!(
                e,
                PhysExpr::InSubquery { .. } | PhysExpr::Exists { .. } | PhysExpr::ScalarSubquery(_)
            ) {
                found = true;
            }
        });
        found
    }

    /// True when the expression can be evaluated without an input row.
    pub fn is_row_independent(&self) -> bool {
        self.columns().is_empty() && !self.has_subquery()
    }

    /// Rewrites `Column(i)` to `Column(i - offset)`. Callers guarantee every
    /// referenced position is at least `offset`.
    pub fn shift_columns(&mut self, offset: usize) {
        self.visit_mut(&mut |e| {
            if let PhysExpr::Column(i) = e {
                *i -= offset;
            }
        });
    }

    fn visit_mut(&mut self, f: &mut dyn FnMut(&mut PhysExpr)) {
        f(self);
        match self {
            PhysExpr::Literal(_)
            | PhysExpr::Column(_)
            | PhysExpr::Outer { .. }
            | PhysExpr::Param(_)
            | PhysExpr::NamedParam(_)
            | PhysExpr::Exists { .. }
            | PhysExpr::ScalarSubquery(_) => {}
            PhysExpr::Unary { expr, .. }
            | PhysExpr::IsNull { expr, .. }
            | PhysExpr::Cast { expr, .. }
            | PhysExpr::InSubquery { expr, .. } => expr.visit_mut(f),
            PhysExpr::Binary { left, right, .. } => {
                left.visit_mut(f);
                right.visit_mut(f);
            }
            PhysExpr::Between { expr, low, high, .. } => {
                expr.visit_mut(f);
                low.visit_mut(f);
                high.visit_mut(f);
            }
            PhysExpr::Like { expr, pattern, .. } => {
                expr.visit_mut(f);
                pattern.visit_mut(f);
            }
            PhysExpr::InList { expr, list, .. } => {
                expr.visit_mut(f);
                list.iter_mut().for_each(|e| e.visit_mut(f));
            }
            PhysExpr::Case {
                operand,
                branches,
                else_result,
            } => {
                if let Some(operand) = operand {
                    operand.visit_mut(f);
                }
                for (when, then) in branches {
                    when.visit_mut(f);
                    then.visit_mut(f);
                }
                if let Some(else_result) = else_result {
                    else_result.visit_mut(f);
                }
            }
            PhysExpr::Vector(items) | PhysExpr::Function { args: items, .. } => {
                items.iter_mut().for_each(|e| e.visit_mut(f));
            }
        }
    }
}

/// Name resolution environment for one expression.
///
/// `substitutions` maps AST subtrees already computed by a lower operator
/// (GROUP BY keys, aggregate calls, window calls) to their input position.
/// `grouped_from` is the pre-aggregation scope, used only to report a bare
/// column that is neither grouped nor aggregated.
pub struct ExprEnv<'e> {
    pub scope: &'e Scope,
    pub substitutions: &'e [(Expr, usize)],
    pub grouped_from: Option<&'e Scope>,
}

impl<'e> ExprEnv<'e> {
    pub fn new(scope: &'e Scope) -> Self {
        Self {
            scope,
            substitutions: &[],
            grouped_from: None,
        }
    }
}

pub fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::Null,
        Literal::Boolean(b) => Value::Boolean(*b),
        Literal::Integer(i) => Value::Integer(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::String(s) => Value::Text(s.clone()),
    }
}

fn boxed(expr: PhysExpr) -> Box<PhysExpr> {
    Box::new(expr)
}

impl Planner<'_> {
    pub fn compile_expr(&mut self, expr: &Expr, env: &ExprEnv<'_>) -> Result<PhysExpr> {
        if let Some((_, position)) = env.substitutions.iter().find(|(e, _)| e == expr) {
            return Ok(PhysExpr::Column(*position));
        }

        Ok(match expr {
            Expr::Literal(literal) => PhysExpr::Literal(literal_value(literal)),
            Expr::Column { table, name } => self.compile_column(table.as_deref(), name, env)?,
            Expr::Param(param) => self.compile_param(param),
            Expr::Unary { op, expr } => PhysExpr::Unary {
                op: *op,
                expr: boxed(self.compile_expr(expr, env)?),
            },
            Expr::Binary { left, op, right } => PhysExpr::Binary {
                op: *op,
                left: boxed(self.compile_expr(left, env)?),
                right: boxed(self.compile_expr(right, env)?),
            },
            Expr::IsNull { expr, negated } => PhysExpr::IsNull {
                expr: boxed(self.compile_expr(expr, env)?),
                negated: *negated,
            },
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => PhysExpr::Between {
                expr: boxed(self.compile_expr(expr, env)?),
                low: boxed(self.compile_expr(low, env)?),
                high: boxed(self.compile_expr(high, env)?),
                negated: *negated,
            },
            Expr::Like {
                expr,
                pattern,
                negated,
            } => PhysExpr::Like {
                expr: boxed(self.compile_expr(expr, env)?),
                pattern: boxed(self.compile_expr(pattern, env)?),
                negated: *negated,
            },
            Expr::InList {
                expr,
                list,
                negated,
            } => PhysExpr::InList {
                expr: boxed(self.compile_expr(expr, env)?),
                list: list
                    .iter()
                    .map(|e| self.compile_expr(e, env))
                    .collect::<Result<_>>()?,
                negated: *negated,
            },
            Expr::InSubquery {
                expr,
                query,
                negated,
            } => {
                let lhs = self.compile_expr(expr, env)?;
                let subquery = self.plan_subquery(query, env, true)?;
                PhysExpr::InSubquery {
                    expr: boxed(lhs),
                    subquery,
                    negated: *negated,
                }
            }
            Expr::Exists { query, negated } => PhysExpr::Exists {
                subquery: self.plan_subquery(query, env, false)?,
                negated: *negated,
            },
            Expr::Subquery(query) => PhysExpr::ScalarSubquery(self.plan_subquery(query, env, true)?),
            Expr::Case {
                operand,
                branches,
                else_result,
            } => PhysExpr::Case {
                operand: match operand {
                    Some(e) => Some(boxed(self.compile_expr(e, env)?)),
                    None => None,
                },
                branches: branches
                    .iter()
                    .map(|(when, then)| {
                        Ok((self.compile_expr(when, env)?, self.compile_expr(then, env)?))
                    })
                    .collect::<Result<_>>()?,
                else_result: match else_result {
                    Some(e) => Some(boxed(self.compile_expr(e, env)?)),
                    None => None,
                },
            },
            Expr::Cast { expr, data_type } => PhysExpr::Cast {
                expr: boxed(self.compile_expr(expr, env)?),
                data_type: *data_type,
            },
            Expr::Vector(items) => PhysExpr::Vector(
                items
                    .iter()
                    .map(|e| self.compile_expr(e, env))
                    .collect::<Result<_>>()?,
            ),
            Expr::Function(call) => {
                if call.over.is_some() {
                    schema_bail!("window function {} is not allowed here", call.name);
                }
                if functions::is_aggregate(&call.name) {
                    schema_bail!("aggregate function {} is not allowed here", call.name);
                }
                if call.star || call.distinct {
                    schema_bail!("{} does not accept * or DISTINCT", call.name);
                }
                let function = functions::resolve(&call.name, call.args.len())?;
                PhysExpr::Function {
                    function,
                    args: call
                        .args
                        .iter()
                        .map(|e| self.compile_expr(e, env))
                        .collect::<Result<_>>()?,
                }
            }
        })
    }

    fn compile_column(&mut self, table: Option<&str>, name: &str, env: &ExprEnv<'_>) -> Result<PhysExpr> {
        if let Some(index) = env.scope.resolve(table, name)? {
            return Ok(PhysExpr::Column(index));
        }
        if let Some(source) = env.grouped_from {
            if source.resolve(table, name)?.is_some() {
                schema_bail!(
                    "column '{}' must appear in the GROUP BY clause or be used in an aggregate function",
                    display_column(table, name)
                );
            }
        }

        let depth = self.outer.len();
        for i in (0..depth).rev() {
            if let Some(index) = self.outer[i].resolve(table, name)? {
                for flag in &mut self.correlated[i..] {
                    *flag = true;
                }
                self.outer_refs += 1;
                return Ok(PhysExpr::Outer {
                    level: depth - i,
                    index,
                });
            }
        }

        if let Some(table) = table {
            let known = env.scope.has_qualifier(table) || self.outer.iter().any(|s| s.has_qualifier(table));
            if !known {
                schema_bail!("unknown table or alias '{}'", table);
            }
        }
        Err(DbError::schema(format!(
            "column '{}' not found",
            display_column(table, name)
        )))
    }

    fn compile_param(&mut self, param: &ParamRef) -> PhysExpr {
        match param {
            ParamRef::Positional(n) => {
                self.params.note_positional(*n);
                PhysExpr::Param(n.saturating_sub(1) as usize)
            }
            ParamRef::Named { sigil, name } => PhysExpr::NamedParam(self.params.named_slot(*sigil, name)),
        }
    }

    /// Compiles an expression that must not read any row, such as a LIMIT.
    pub fn compile_constant(&mut self, expr: &Expr) -> Result<PhysExpr> {
        let empty = Scope::default();
        self.compile_expr(expr, &ExprEnv::new(&empty))
    }
}

pub fn display_column(table: Option<&str>, name: &str) -> String {
    match table {
        Some(t) => format!("{}.{}", t, name),
        None => name.to_string(),
    }
}

/// Folds a DEFAULT clause or other literal-only expression to a value.
pub fn fold_constant(expr: &Expr) -> Result<Value> {
    match expr {
        Expr::Literal(literal) => Ok(literal_value(literal)),
        Expr::Unary {
            op: UnaryOp::Neg,
            expr,
        } => fold_constant(expr)?.negate(),
        Expr::Cast { expr, data_type } => data_type.cast(fold_constant(expr)?),
        Expr::Vector(items) => {
            let mut components = Vec::with_capacity(items.len());
            for item in items {
                match fold_constant(item)?.as_f64() {
                    Some(f) => components.push(f as f32),
                    None => type_bail!("vector components must be numbers"),
                }
            }
            Ok(Value::Vector(components))
        }
        Expr::Binary { left, op, right } => {
            let (l, r) = (fold_constant(left)?, fold_constant(right)?);
            match op {
                BinaryOp::Add => l.add(&r),
                BinaryOp::Sub => l.sub(&r),
                BinaryOp::Mul => l.mul(&r),
                BinaryOp::Div => l.div(&r),
                BinaryOp::Mod => l.rem(&r),
                BinaryOp::Concat => Ok(match (l.is_null(), r.is_null()) {
                    (false, false) => Value::Text(format!("{}{}", l, r)),
                    _ => Value::Null,
                }),
                _ => schema_bail!("DEFAULT must be a constant expression"),
            }
        }
        _ => schema_bail!("DEFAULT must be a constant expression"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parser::parse_statement;
    use crate::sql::ast::{SelectItem, SetExpr, Statement};

    fn first_item(sql: &str) -> Expr {
        match parse_statement(sql).unwrap() {
            Statement::Select(query) => match query.body {
                SetExpr::Select(select) => match &select.projection[0] {
                    SelectItem::Expr { expr, .. } => expr.clone(),
                    other => panic!("unexpected {:?}", other),
                },
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn fold_negative_and_cast() {
        assert_eq!(fold_constant(&first_item("SELECT -5")).unwrap(), Value::Integer(-5));
        assert_eq!(
            fold_constant(&first_item("SELECT CAST('3' AS INTEGER)")).unwrap(),
            Value::Integer(3)
        );
        assert_eq!(
            fold_constant(&first_item("SELECT [1, 2.5]")).unwrap(),
            Value::Vector(vec![1.0, 2.5])
        );
    }

    #[test]
    fn fold_rejects_columns() {
        assert!(fold_constant(&first_item("SELECT a + 1")).is_err());
    }

    #[test]
    fn shift_columns_rebases_positions() {
        let mut expr = PhysExpr::Binary {
            op: BinaryOp::Eq,
            left: boxed(PhysExpr::Column(3)),
            right: boxed(PhysExpr::Literal(Value::Integer(1))),
        };
        expr.shift_columns(2);
        assert_eq!(expr.columns(), vec![1]);
        assert!(!expr.is_row_independent());
    }
}
