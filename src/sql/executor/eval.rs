//! # Expression Evaluation
//!
//! Evaluates a `PhysExpr` against one input tuple.
//!
//! ## Three-Valued Logic
//!
//! NULL stands for UNKNOWN inside boolean expressions:
//!
//! | a | b | a AND b | a OR b |
//! |---|---|---------|--------|
//! | T | U | U | T |
//! | F | U | F | U |
//! | U | U | U | U |
//!
//! `NOT U` is `U`. A predicate keeps a row only when it evaluates to TRUE.
//! Comparisons with a NULL operand are UNKNOWN; `IS [NOT] NULL` is the only
//! test that sees NULL as a value.
//!
//! ## Subqueries
//!
//! Uncorrelated subqueries run once per statement and their rows are cached
//! in the `ExecContext` under the subquery's id. Correlated subqueries run
//! once per outer row with that row pushed onto the outer-row stack.

use eyre::Result;
use std::rc::Rc;

use super::{collect, ExecContext, Tuple};
use crate::error::DbError;
use crate::sql::ast::{BinaryOp, UnaryOp};
use crate::sql::planner::{PhysExpr, SubqueryPlan};
use crate::types::Value;

pub fn eval(expr: &PhysExpr, row: &[Value], ctx: &ExecContext<'_>) -> Result<Value> {
    match expr {
        PhysExpr::Literal(value) => Ok(value.clone()),
        PhysExpr::Column(index) => Ok(row.get(*index).cloned().unwrap_or(Value::Null)),
        PhysExpr::Outer { level, index } => ctx.outer_value(*level, *index),
        PhysExpr::Param(slot) => ctx.params.positional(*slot),
        PhysExpr::NamedParam(slot) => ctx.params.named(*slot),
        PhysExpr::Unary { op, expr } => {
            let value = eval(expr, row, ctx)?;
            match op {
                UnaryOp::Not => Ok(bool_value(truth(&value)?.map(|b| !b))),
                UnaryOp::Neg => value.negate(),
            }
        }
        PhysExpr::Binary { op, left, right } => eval_binary(*op, left, right, row, ctx),
        PhysExpr::IsNull { expr, negated } => {
            let is_null = eval(expr, row, ctx)?.is_null();
            Ok(Value::Boolean(is_null != *negated))
        }
        PhysExpr::Between {
            expr,
            low,
            high,
            negated,
        } => {
            let value = eval(expr, row, ctx)?;
            let low = eval(low, row, ctx)?;
            let high = eval(high, row, ctx)?;
            let above = value.compare(&low)?.map(|o| o.is_ge());
            let below = value.compare(&high)?.map(|o| o.is_le());
            let inside = and3(above, below);
            Ok(bool_value(if *negated { inside.map(|b| !b) } else { inside }))
        }
        PhysExpr::Like {
            expr,
            pattern,
            negated,
        } => {
            let value = eval(expr, row, ctx)?;
            let pattern = eval(pattern, row, ctx)?;
            if value.is_null() || pattern.is_null() {
                return Ok(Value::Null);
            }
            let matched = like(&text_of(&value), &text_of(&pattern));
            Ok(Value::Boolean(matched != *negated))
        }
        PhysExpr::InList {
            expr,
            list,
            negated,
        } => {
            let value = eval(expr, row, ctx)?;
            let mut candidates = Vec::with_capacity(list.len());
            for item in list {
                candidates.push(eval(item, row, ctx)?);
            }
            let found = in_values(&value, candidates.iter())?;
            Ok(bool_value(if *negated { found.map(|b| !b) } else { found }))
        }
        PhysExpr::InSubquery {
            expr,
            subquery,
            negated,
        } => {
            let value = eval(expr, row, ctx)?;
            let rows = subquery_rows(subquery, row, ctx)?;
            let found = in_values(&value, rows.iter().filter_map(|r| r.first()))?;
            Ok(bool_value(if *negated { found.map(|b| !b) } else { found }))
        }
        PhysExpr::Exists { subquery, negated } => {
            let exists = exists(subquery, row, ctx)?;
            Ok(Value::Boolean(exists != *negated))
        }
        PhysExpr::ScalarSubquery(subquery) => {
            let rows = subquery_rows(subquery, row, ctx)?;
            match rows.as_slice() {
                [] => Ok(Value::Null),
                [single] => Ok(single.first().cloned().unwrap_or(Value::Null)),
                _ => Err(DbError::type_mismatch(
                    "scalar subquery returned more than one row",
                )),
            }
        }
        PhysExpr::Case {
            operand,
            branches,
            else_result,
        } => {
            let operand = operand
                .as_ref()
                .map(|e| eval(e, row, ctx))
                .transpose()?;
            for (when, then) in branches {
                let when = eval(when, row, ctx)?;
                let hit = match &operand {
                    Some(operand) => operand.compare(&when)?.is_some_and(|o| o.is_eq()),
                    None => truth(&when)? == Some(true),
                };
                if hit {
                    return eval(then, row, ctx);
                }
            }
            match else_result {
                Some(e) => eval(e, row, ctx),
                None => Ok(Value::Null),
            }
        }
        PhysExpr::Cast { expr, data_type } => data_type.cast(eval(expr, row, ctx)?),
        PhysExpr::Vector(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match eval(item, row, ctx)? {
                    Value::Integer(i) => out.push(i as f32),
                    Value::Float(f) => out.push(f as f32),
                    other => type_bail!(
                        "vector components must be numbers, found {}",
                        other.type_name()
                    ),
                }
            }
            Ok(Value::Vector(out))
        }
        PhysExpr::Function { function, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg, row, ctx)?);
            }
            (function.eval)(&values)
        }
    }
}

/// True only when `expr` evaluates to TRUE.
pub fn eval_predicate(expr: &PhysExpr, row: &[Value], ctx: &ExecContext<'_>) -> Result<bool> {
    Ok(truth(&eval(expr, row, ctx)?)? == Some(true))
}

/// Boolean reading of a value; `None` is UNKNOWN.
pub fn truth(value: &Value) -> Result<Option<bool>> {
    match value {
        Value::Null => Ok(None),
        Value::Boolean(b) => Ok(Some(*b)),
        Value::Integer(i) => Ok(Some(*i != 0)),
        other => Err(DbError::type_mismatch(format!(
            "expected BOOLEAN, found {}",
            other.type_name()
        ))),
    }
}

fn bool_value(b: Option<bool>) -> Value {
    b.map_or(Value::Null, Value::Boolean)
}

fn and3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

fn or3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

fn eval_binary(
    op: BinaryOp,
    left: &PhysExpr,
    right: &PhysExpr,
    row: &[Value],
    ctx: &ExecContext<'_>,
) -> Result<Value> {
    match op {
        BinaryOp::And => {
            let l = truth(&eval(left, row, ctx)?)?;
            if l == Some(false) {
                return Ok(Value::Boolean(false));
            }
            let r = truth(&eval(right, row, ctx)?)?;
            return Ok(bool_value(and3(l, r)));
        }
        BinaryOp::Or => {
            let l = truth(&eval(left, row, ctx)?)?;
            if l == Some(true) {
                return Ok(Value::Boolean(true));
            }
            let r = truth(&eval(right, row, ctx)?)?;
            return Ok(bool_value(or3(l, r)));
        }
        _ => {}
    }

    let l = eval(left, row, ctx)?;
    let r = eval(right, row, ctx)?;
    match op {
        BinaryOp::Eq => compare_with(&l, &r, |o| o.is_eq()),
        BinaryOp::NotEq => compare_with(&l, &r, |o| o.is_ne()),
        BinaryOp::Lt => compare_with(&l, &r, |o| o.is_lt()),
        BinaryOp::LtEq => compare_with(&l, &r, |o| o.is_le()),
        BinaryOp::Gt => compare_with(&l, &r, |o| o.is_gt()),
        BinaryOp::GtEq => compare_with(&l, &r, |o| o.is_ge()),
        BinaryOp::Concat => {
            if l.is_null() || r.is_null() {
                return Ok(Value::Null);
            }
            Ok(Value::Text(format!("{}{}", l, r)))
        }
        BinaryOp::Add => l.add(&r),
        BinaryOp::Sub => l.sub(&r),
        BinaryOp::Mul => l.mul(&r),
        BinaryOp::Div => l.div(&r),
        BinaryOp::Mod => l.rem(&r),
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    }
}

fn compare_with(l: &Value, r: &Value, f: impl FnOnce(std::cmp::Ordering) -> bool) -> Result<Value> {
    Ok(bool_value(l.compare(r)?.map(f)))
}

/// `value IN (candidates)`: TRUE on a match, UNKNOWN if no match but a NULL
/// was involved, FALSE otherwise.
fn in_values<'v>(value: &Value, candidates: impl Iterator<Item = &'v Value>) -> Result<Option<bool>> {
    if value.is_null() {
        return Ok(None);
    }
    let mut saw_null = false;
    for candidate in candidates {
        match value.compare(candidate)? {
            Some(o) if o.is_eq() => return Ok(Some(true)),
            Some(_) => {}
            None => saw_null = true,
        }
    }
    Ok(if saw_null { None } else { Some(false) })
}

fn text_of(value: &Value) -> String {
    match value {
        Value::Text(s) => s.clone(),
        other => other.to_string(),
    }
}

/// SQL LIKE: `%` matches any run of characters, `_` exactly one.
pub fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star, matched)) = backtrack {
            p = star + 1;
            t = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == '%')
}

fn subquery_rows(
    subquery: &SubqueryPlan,
    row: &[Value],
    ctx: &ExecContext<'_>,
) -> Result<Rc<Vec<Tuple>>> {
    if subquery.correlated {
        return ctx
            .with_outer(row, || collect(&subquery.plan, ctx))
            .map(Rc::new);
    }
    if let Some(rows) = ctx.cached_subquery(subquery.id) {
        return Ok(rows);
    }
    let rows = Rc::new(collect(&subquery.plan, ctx)?);
    ctx.cache_subquery(subquery.id, Rc::clone(&rows));
    Ok(rows)
}

fn exists(subquery: &SubqueryPlan, row: &[Value], ctx: &ExecContext<'_>) -> Result<bool> {
    if !subquery.correlated {
        return Ok(!subquery_rows(subquery, row, ctx)?.is_empty());
    }
    ctx.with_outer(row, || {
        let mut executor = super::build(&subquery.plan);
        executor.open(ctx)?;
        Ok(executor.next(ctx)?.is_some())
    })
}
