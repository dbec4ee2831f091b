//! # Query Planner
//!
//! Turns a parsed statement into an executable plan in one pass: names are
//! resolved against the catalog and bound to tuple positions, access paths
//! and join strategies are chosen, and expressions are compiled into
//! `PhysExpr` trees whose function calls are already resolved.
//!
//! ## Module Structure
//!
//! - `scope`: column name resolution over an operator's output tuple
//! - `expr`: `PhysExpr` and AST → physical expression compilation
//! - `physical`: physical operators and EXPLAIN rendering
//! - `select`: SELECT, set operations, CTEs, FROM clauses and joins
//! - `access`: index selection for single-table scans and vector search
//! - `dml`: INSERT/UPDATE/DELETE and DDL planning
//!
//! ## Plan Validity
//!
//! A plan captures `Arc<TableDef>`s, so it stays valid only while the
//! catalog version it was built against is current. Prepared statements
//! compare `catalog.version()` and the `PlanSettings` they were planned
//! with before reusing a plan.
//!
//! ## Parameters
//!
//! While compiling, the planner records which markers a statement uses in a
//! `ParamLayout`: the highest positional index and the distinct named
//! markers in order of first appearance. Binding checks supplied values
//! against this layout before execution starts.

pub mod access;
pub mod dml;
pub mod expr;
pub mod physical;
pub mod scope;
pub mod select;

pub use expr::{ExprEnv, PhysExpr, SubqueryPlan};
pub use physical::{
    frame_range, AggregateExpr, AggregateFunc, IndexAccess, PhysicalPlan, SortKey, WindowExpr,
    WindowFunc,
};
pub use scope::{Scope, ScopeColumn};

use eyre::Result;
use hashbrown::HashMap;
use std::sync::Arc;

use crate::schema::{Catalog, IndexDef, TableDef};
use crate::sql::ast::{Query, Statement};

/// Session settings that change the plans produced for the same SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlanSettings {
    pub ef_search: usize,
    pub vector_index_scan: bool,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            ef_search: crate::config::constants::HNSW_DEFAULT_EF_SEARCH,
            vector_index_scan: true,
        }
    }
}

/// Parameter markers a statement uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamLayout {
    positional: usize,
    named: Vec<(char, String)>,
}

impl ParamLayout {
    pub fn note_positional(&mut self, position: u32) {
        self.positional = self.positional.max(position as usize);
    }

    /// Slot of a named marker; repeated markers share a slot.
    pub fn named_slot(&mut self, sigil: char, name: &str) -> usize {
        if let Some(slot) = self.named.iter().position(|(s, n)| *s == sigil && n == name) {
            return slot;
        }
        self.named.push((sigil, name.to_string()));
        self.named.len() - 1
    }

    pub fn positional_count(&self) -> usize {
        self.positional
    }

    pub fn named(&self) -> &[(char, String)] {
        &self.named
    }

    pub fn is_empty(&self) -> bool {
        self.positional == 0 && self.named.is_empty()
    }
}

#[derive(Debug)]
pub struct QueryPlan {
    pub root: PhysicalPlan,
    pub columns: Vec<String>,
}

#[derive(Debug)]
pub struct InsertPlan {
    pub table: Arc<TableDef>,
    /// Table column position for each source column.
    pub targets: Vec<usize>,
    pub source: PhysicalPlan,
}

#[derive(Debug)]
pub struct UpdatePlan {
    pub table: Arc<TableDef>,
    pub scan: PhysicalPlan,
    /// Evaluated against the scanned tuple (columns followed by rowid).
    pub assignments: Vec<(usize, PhysExpr)>,
}

#[derive(Debug)]
pub struct DeletePlan {
    pub table: Arc<TableDef>,
    pub scan: PhysicalPlan,
}

#[derive(Debug)]
pub enum Plan {
    Query(QueryPlan),
    Insert(InsertPlan),
    Update(UpdatePlan),
    Delete(DeletePlan),
    CreateTable {
        def: TableDef,
        if_not_exists: bool,
    },
    CreateIndex {
        table: String,
        index: IndexDef,
        if_not_exists: bool,
    },
    DropTable {
        name: String,
        if_exists: bool,
    },
    DropIndex {
        name: String,
        if_exists: bool,
    },
    ShowTables,
    Explain(String),
    Pragma {
        name: String,
        value: Option<String>,
    },
    Begin,
    Commit,
    Rollback,
}

impl Plan {
    /// Column names of the result set, for statements that return rows.
    pub fn result_columns(&self) -> Option<Vec<String>> {
        match self {
            Plan::Query(query) => Some(query.columns.clone()),
            Plan::ShowTables => Some(vec!["table_name".to_string()]),
            Plan::Explain(_) => Some(vec!["plan".to_string()]),
            _ => None,
        }
    }

    pub fn is_ddl(&self) -> bool {
        matches!(
            self,
            Plan::CreateTable { .. } | Plan::CreateIndex { .. } | Plan::DropTable { .. } | Plan::DropIndex { .. }
        )
    }
}

#[derive(Debug)]
pub struct PlannedStatement {
    pub plan: Plan,
    pub params: ParamLayout,
}

/// A CTE visible to the query being planned.
#[derive(Debug, Clone)]
struct CteBinding {
    id: usize,
    plan: Arc<PhysicalPlan>,
    columns: Vec<String>,
    correlated: bool,
}

pub struct Planner<'a> {
    catalog: &'a Catalog,
    settings: PlanSettings,
    params: ParamLayout,
    /// Scopes of the enclosing queries, innermost last.
    outer: Vec<Scope>,
    /// One flag per entry of `outer`: whether the subquery planned inside
    /// that scope reads it or any scope further out.
    correlated: Vec<bool>,
    /// Count of outer references compiled so far.
    outer_refs: usize,
    next_id: usize,
    ctes: Vec<HashMap<String, CteBinding>>,
}

impl<'a> Planner<'a> {
    pub fn new(catalog: &'a Catalog, settings: PlanSettings) -> Self {
        Self {
            catalog,
            settings,
            params: ParamLayout::default(),
            outer: Vec::new(),
            correlated: Vec::new(),
            outer_refs: 0,
            next_id: 0,
            ctes: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &'a Catalog {
        self.catalog
    }

    pub fn settings(&self) -> PlanSettings {
        self.settings
    }

    pub fn plan(mut self, stmt: &Statement) -> Result<PlannedStatement> {
        let plan = self.plan_statement(stmt)?;
        if self.params.positional > 0 && !self.params.named.is_empty() {
            schema_bail!("a statement cannot mix positional and named parameters");
        }
        Ok(PlannedStatement {
            plan,
            params: self.params,
        })
    }

    fn plan_statement(&mut self, stmt: &Statement) -> Result<Plan> {
        Ok(match stmt {
            Statement::Select(query) => Plan::Query(self.plan_query(query)?),
            Statement::Insert(insert) => Plan::Insert(self.plan_insert(insert)?),
            Statement::Update(update) => Plan::Update(self.plan_update(update)?),
            Statement::Delete(delete) => Plan::Delete(self.plan_delete(delete)?),
            Statement::CreateTable(create) => Plan::CreateTable {
                def: self.plan_create_table(create)?,
                if_not_exists: create.if_not_exists,
            },
            Statement::CreateIndex(create) => Plan::CreateIndex {
                table: create.table.clone(),
                index: self.plan_create_index(create)?,
                if_not_exists: create.if_not_exists,
            },
            Statement::DropTable { name, if_exists } => Plan::DropTable {
                name: name.clone(),
                if_exists: *if_exists,
            },
            Statement::DropIndex { name, if_exists } => Plan::DropIndex {
                name: name.clone(),
                if_exists: *if_exists,
            },
            Statement::ShowTables => Plan::ShowTables,
            Statement::Explain(inner) => Plan::Explain(self.explain(inner)?),
            Statement::Pragma { name, value } => Plan::Pragma {
                name: name.clone(),
                value: value.clone(),
            },
            Statement::Begin => Plan::Begin,
            Statement::Commit => Plan::Commit,
            Statement::Rollback => Plan::Rollback,
        })
    }

    fn explain(&mut self, stmt: &Statement) -> Result<String> {
        Ok(match self.plan_statement(stmt)? {
            Plan::Query(query) => query.root.explain(),
            Plan::Insert(insert) => {
                let mut text = format!("-> Insert into {}\n", insert.table.name());
                for line in insert.source.explain().lines() {
                    text.push_str("  ");
                    text.push_str(line);
                    text.push('\n');
                }
                text
            }
            Plan::Update(update) => {
                let mut text = format!("-> Update {}\n", update.table.name());
                for line in update.scan.explain().lines() {
                    text.push_str("  ");
                    text.push_str(line);
                    text.push('\n');
                }
                text
            }
            Plan::Delete(delete) => {
                let mut text = format!("-> Delete from {}\n", delete.table.name());
                for line in delete.scan.explain().lines() {
                    text.push_str("  ");
                    text.push_str(line);
                    text.push('\n');
                }
                text
            }
            _ => schema_bail!("EXPLAIN supports SELECT, INSERT, UPDATE and DELETE"),
        })
    }

    fn next_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Plans a subquery appearing in an expression evaluated over
    /// `env.scope`. References it makes into that scope (or further out)
    /// mark it correlated.
    pub(crate) fn plan_subquery(
        &mut self,
        query: &Query,
        env: &ExprEnv<'_>,
        single_column: bool,
    ) -> Result<Arc<SubqueryPlan>> {
        self.outer.push(env.scope.clone());
        self.correlated.push(false);
        let planned = self.plan_query(query);
        self.outer.pop();
        let correlated = self.correlated.pop().unwrap_or(false);
        let planned = planned?;

        if single_column && planned.columns.len() != 1 {
            schema_bail!(
                "subquery must return exactly one column, found {}",
                planned.columns.len()
            );
        }
        Ok(Arc::new(SubqueryPlan {
            id: self.next_id(),
            plan: planned.root,
            correlated,
        }))
    }

    fn lookup_cte(&self, name: &str) -> Option<&CteBinding> {
        let key = name.to_ascii_lowercase();
        self.ctes.iter().rev().find_map(|frame| frame.get(&key))
    }
}

/// Plans one statement against `catalog`.
pub fn plan_statement(
    catalog: &Catalog,
    settings: PlanSettings,
    stmt: &Statement,
) -> Result<PlannedStatement> {
    Planner::new(catalog, settings).plan(stmt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, Constraint};
    use crate::sql::parser::parse_statement;
    use crate::types::DataType;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog
            .create_table(
                TableDef::new(
                    0,
                    "users",
                    vec![
                        ColumnDef::new("id", DataType::Integer).with_constraint(Constraint::PrimaryKey),
                        ColumnDef::new("name", DataType::Text),
                        ColumnDef::new("age", DataType::Integer),
                    ],
                )
                .unwrap(),
            )
            .unwrap();
        catalog
            .create_table(
                TableDef::new(
                    0,
                    "orders",
                    vec![
                        ColumnDef::new("id", DataType::Integer).with_constraint(Constraint::PrimaryKey),
                        ColumnDef::new("user_id", DataType::Integer),
                        ColumnDef::new("total", DataType::Float),
                    ],
                )
                .unwrap(),
            )
            .unwrap();
        catalog
    }

    fn plan(sql: &str) -> Result<PlannedStatement> {
        let catalog = catalog();
        plan_statement(&catalog, PlanSettings::default(), &parse_statement(sql)?)
    }

    fn explain(sql: &str) -> String {
        match plan(sql).unwrap().plan {
            Plan::Query(query) => query.root.explain(),
            other => panic!("expected query plan, got {:?}", other),
        }
    }

    #[test]
    fn param_layout_tracks_markers() {
        let planned = plan("SELECT * FROM users WHERE id = $2 AND age > $1").unwrap();
        assert_eq!(planned.params.positional_count(), 2);

        let planned = plan("SELECT * FROM users WHERE name = :name OR id = :id OR name = :name").unwrap();
        assert_eq!(planned.params.named().len(), 2);
    }

    #[test]
    fn mixing_param_styles_is_rejected() {
        assert!(plan("SELECT * FROM users WHERE id = $1 AND name = :name").is_err());
    }

    #[test]
    fn primary_key_equality_uses_index() {
        let text = explain("SELECT name FROM users WHERE id = 5");
        assert!(text.contains("IndexScan on users using users_pkey"), "{}", text);
    }

    #[test]
    fn non_indexed_predicate_scans() {
        let text = explain("SELECT name FROM users WHERE age > 5");
        assert!(text.contains("SeqScan on users (filtered)"), "{}", text);
    }

    #[test]
    fn join_on_primary_key_uses_index_lookup() {
        let text = explain("SELECT u.name, o.total FROM orders o JOIN users u ON u.id = o.user_id");
        assert!(text.contains("IndexNestedLoopJoin"), "{}", text);
        assert!(text.contains("IndexLookup on users as u using users_pkey"), "{}", text);
    }

    #[test]
    fn join_without_index_hashes() {
        let text = explain("SELECT * FROM users u JOIN orders o ON o.user_id = u.id");
        assert!(text.contains("HashJoin (Inner, keys=1)"), "{}", text);
    }

    #[test]
    fn unknown_names_are_schema_errors() {
        for sql in [
            "SELECT * FROM missing",
            "SELECT missing FROM users",
            "SELECT x.id FROM users u",
            "SELECT id FROM users u JOIN orders o ON u.id = o.user_id",
        ] {
            let err = plan(sql).unwrap_err();
            assert_eq!(
                crate::error::DbError::kind_of(&err),
                Some(crate::error::ErrorKind::Schema),
                "{}",
                sql
            );
        }
    }

    #[test]
    fn ungrouped_column_is_rejected() {
        assert!(plan("SELECT name, COUNT(*) FROM users").is_err());
        assert!(plan("SELECT name, COUNT(*) FROM users GROUP BY name").is_ok());
    }

    #[test]
    fn correlated_subquery_is_flagged() {
        let planned = plan(
            "SELECT name FROM users u WHERE EXISTS (SELECT 1 FROM orders o WHERE o.user_id = u.id)",
        )
        .unwrap();
        let Plan::Query(query) = planned.plan else {
            panic!("expected query");
        };
        let mut found = None;
        fn find(plan: &PhysicalPlan, found: &mut Option<bool>) {
            match plan {
                PhysicalPlan::SeqScan { filter: Some(filter), .. }
                | PhysicalPlan::Filter { predicate: filter, .. } => filter.visit(&mut |e| {
                    if let PhysExpr::Exists { subquery, .. } = e {
                        *found = Some(subquery.correlated);
                    }
                }),
                PhysicalPlan::Project { input, .. } => find(input, found),
                _ => {}
            }
        }
        find(&query.root, &mut found);
        assert_eq!(found, Some(true));
    }

    #[test]
    fn explain_statement_renders_plan() {
        let planned = plan("EXPLAIN SELECT * FROM users ORDER BY age LIMIT 3").unwrap();
        let Plan::Explain(text) = planned.plan else {
            panic!("expected explain");
        };
        assert!(text.starts_with("-> Limit"), "{}", text);
        assert!(text.contains("-> Sort (keys=1)"), "{}", text);
    }
}
