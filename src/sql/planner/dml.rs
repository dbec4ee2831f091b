//! INSERT/UPDATE/DELETE and DDL planning.
//!
//! DML plans carry a scan producing `(columns..., rowid)` tuples of the
//! target table. The executor materializes the scan before it stages any
//! write, so a statement never observes its own changes.

use eyre::Result;

use super::expr::{fold_constant, ExprEnv, PhysExpr};
use super::physical::PhysicalPlan;
use super::scope::Scope;
use super::{DeletePlan, InsertPlan, Planner, UpdatePlan};
use crate::hnsw::{DistanceMetric, HnswParams};
use crate::schema::{ColumnDef, Constraint, DefaultValue, IndexDef, IndexKind, TableDef};
use crate::sql::ast::{
    ColumnSpec, CreateIndex, CreateTable, Delete, Expr, Insert, InsertSource, Update,
};

impl Planner<'_> {
    pub(super) fn plan_insert(&mut self, insert: &Insert) -> Result<InsertPlan> {
        let table = self.catalog.resolve_table(&insert.table)?;

        let targets: Vec<usize> = if insert.columns.is_empty() {
            (0..table.column_count()).collect()
        } else {
            let mut targets = Vec::with_capacity(insert.columns.len());
            for name in &insert.columns {
                let Some(position) = table.column_index(name) else {
                    schema_bail!("column '{}' of table '{}' not found", name, table.name());
                };
                if targets.contains(&position) {
                    schema_bail!("column '{}' specified more than once", name);
                }
                targets.push(position);
            }
            targets
        };

        let source = match &insert.source {
            InsertSource::Values(rows) => {
                let mut compiled = Vec::with_capacity(rows.len());
                for row in rows {
                    if row.len() != targets.len() {
                        schema_bail!(
                            "INSERT has {} target columns but {} values",
                            targets.len(),
                            row.len()
                        );
                    }
                    compiled.push(
                        row.iter()
                            .map(|e| self.compile_constant(e))
                            .collect::<Result<Vec<_>>>()?,
                    );
                }
                PhysicalPlan::Values { rows: compiled }
            }
            InsertSource::Query(query) => {
                let planned = self.plan_query(query)?;
                if planned.columns.len() != targets.len() {
                    schema_bail!(
                        "INSERT has {} target columns but the query returns {}",
                        targets.len(),
                        planned.columns.len()
                    );
                }
                planned.root
            }
        };

        Ok(InsertPlan {
            table,
            targets,
            source,
        })
    }

    pub(super) fn plan_update(&mut self, update: &Update) -> Result<UpdatePlan> {
        let table = self.catalog.resolve_table(&update.table)?;
        let alias = update.alias.clone().unwrap_or_else(|| table.name().to_string());
        let scope = Scope::for_table(&table, &alias);

        let mut assignments: Vec<(usize, PhysExpr)> = Vec::with_capacity(update.assignments.len());
        for (name, expr) in &update.assignments {
            let Some(position) = table.column_index(name) else {
                schema_bail!("column '{}' of table '{}' not found", name, table.name());
            };
            if assignments.iter().any(|(p, _)| *p == position) {
                schema_bail!("column '{}' assigned more than once", name);
            }
            let value = self.compile_expr(expr, &ExprEnv::new(&scope))?;
            assignments.push((position, value));
        }

        let scan = self.plan_table_access(table.clone(), alias, &scope, update.selection.as_ref())?;
        Ok(UpdatePlan {
            table,
            scan,
            assignments,
        })
    }

    pub(super) fn plan_delete(&mut self, delete: &Delete) -> Result<DeletePlan> {
        let table = self.catalog.resolve_table(&delete.table)?;
        let alias = delete.alias.clone().unwrap_or_else(|| table.name().to_string());
        let scope = Scope::for_table(&table, &alias);
        let scan = self.plan_table_access(table.clone(), alias, &scope, delete.selection.as_ref())?;
        Ok(DeletePlan { table, scan })
    }

    /// Builds the table definition; the id is assigned when the table is
    /// registered.
    pub(super) fn plan_create_table(&mut self, create: &CreateTable) -> Result<TableDef> {
        let column_keys = create.columns.iter().filter(|c| c.primary_key).count();
        if column_keys > 1 || (column_keys == 1 && !create.primary_key.is_empty()) {
            schema_bail!("multiple primary keys for table '{}' are not allowed", create.name);
        }

        let columns = create
            .columns
            .iter()
            .map(column_def)
            .collect::<Result<Vec<_>>>()?;

        let mut def = if create.primary_key.is_empty() {
            TableDef::new(0, &create.name, columns)?
        } else {
            TableDef::with_primary_key(0, &create.name, columns, create.primary_key.clone())?
        };
        for unique in &create.unique {
            let name = format!("{}_{}_key", create.name, unique.join("_"));
            def.add_index(IndexDef::btree(name, unique.clone(), true))?;
        }
        Ok(def)
    }

    pub(super) fn plan_create_index(&mut self, create: &CreateIndex) -> Result<IndexDef> {
        let kind = match create.method.as_deref() {
            None | Some("btree") => {
                if let Some((key, _)) = create.options.first() {
                    schema_bail!("B-tree index '{}' does not accept option '{}'", create.name, key);
                }
                IndexKind::BTree
            }
            Some("hnsw") => {
                let mut metric = DistanceMetric::default();
                let mut params = HnswParams::default();
                for (key, value) in &create.options {
                    match key.as_str() {
                        "metric" | "distance" => metric = DistanceMetric::parse(value)?,
                        "m" => {
                            params = HnswParams {
                                ef_construction: params.ef_construction,
                                ..HnswParams::with_m(positive_option(key, value)?)
                            }
                        }
                        "ef_construction" => params.ef_construction = positive_option(key, value)?,
                        other => schema_bail!("unknown HNSW index option '{}'", other),
                    }
                }
                IndexKind::Hnsw { metric, params }
            }
            Some(other) => schema_bail!("unknown index method '{}'", other),
        };
        Ok(IndexDef::new(
            &create.name,
            create.columns.clone(),
            create.unique,
            kind,
        ))
    }
}

fn column_def(decl: &ColumnSpec) -> Result<ColumnDef> {
    let mut column = ColumnDef::new(&decl.name, decl.data_type);
    if decl.primary_key {
        column = column.with_constraint(Constraint::PrimaryKey);
    }
    if decl.not_null {
        column = column.with_constraint(Constraint::NotNull);
    }
    if decl.unique {
        column = column.with_constraint(Constraint::Unique);
    }
    if let Some(default) = &decl.default {
        column = column.with_default(default_value(decl, default)?);
    }
    Ok(column)
}

fn default_value(decl: &ColumnSpec, expr: &Expr) -> Result<DefaultValue> {
    if let Expr::Function(call) = expr {
        if call.name == "NOW" && call.args.is_empty() {
            return Ok(DefaultValue::CurrentTimestamp);
        }
    }
    let value = fold_constant(expr)?;
    let value = decl.data_type.coerce(value).map_err(|e| {
        e.wrap_err(format!("invalid DEFAULT for column '{}'", decl.name))
    })?;
    Ok(DefaultValue::Literal(value))
}

fn positive_option(key: &str, value: &str) -> Result<usize> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => schema_bail!("option '{}' must be a positive integer, found '{}'", key, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Catalog;
    use crate::sql::parser::parse_statement;
    use crate::sql::planner::{plan_statement, Plan, PlanSettings};
    use crate::types::{DataType, Value};

    fn plan(catalog: &Catalog, sql: &str) -> Result<Plan> {
        Ok(plan_statement(catalog, PlanSettings::default(), &parse_statement(sql)?)?.plan)
    }

    fn create(catalog: &mut Catalog, sql: &str) {
        match plan(catalog, sql).unwrap() {
            Plan::CreateTable { def, .. } => {
                catalog.create_table(def).unwrap();
            }
            other => panic!("unexpected plan {:?}", other),
        }
    }

    #[test]
    fn create_table_collects_constraints_and_defaults() {
        let catalog = Catalog::new();
        let Plan::CreateTable { def, .. } = plan(
            &catalog,
            "CREATE TABLE t (id INTEGER PRIMARY KEY, email TEXT NOT NULL UNIQUE, \
             score FLOAT DEFAULT 1, created TIMESTAMP DEFAULT CURRENT_TIMESTAMP)",
        )
        .unwrap() else {
            panic!("expected create table");
        };

        assert_eq!(def.primary_key(), ["id".to_string()]);
        assert!(!def.get_column("email").unwrap().is_nullable());
        assert!(def.get_index("t_email_key").unwrap().is_unique());
        assert_eq!(
            def.get_column("score").unwrap().default_value(),
            Some(&DefaultValue::Literal(Value::Float(1.0)))
        );
        assert_eq!(
            def.get_column("created").unwrap().default_value(),
            Some(&DefaultValue::CurrentTimestamp)
        );
    }

    #[test]
    fn table_level_keys() {
        let catalog = Catalog::new();
        let Plan::CreateTable { def, .. } =
            plan(&catalog, "CREATE TABLE t (a INT, b INT, PRIMARY KEY (a, b), UNIQUE (b, a))").unwrap()
        else {
            panic!("expected create table");
        };
        assert_eq!(def.indexes().len(), 2);
        assert_eq!(def.indexes()[1].name(), "t_b_a_key");

        assert!(plan(&catalog, "CREATE TABLE t (a INT PRIMARY KEY, b INT, PRIMARY KEY (b))").is_err());
    }

    #[test]
    fn bad_default_is_rejected() {
        let catalog = Catalog::new();
        assert!(plan(&catalog, "CREATE TABLE t (a INTEGER DEFAULT 'abc')").is_err());
    }

    #[test]
    fn hnsw_index_options() {
        let catalog = Catalog::new();
        let Plan::CreateIndex { index, .. } = plan(
            &catalog,
            "CREATE INDEX idx ON docs(embedding) USING HNSW WITH (metric = 'cosine', m = 8)",
        )
        .unwrap() else {
            panic!("expected create index");
        };
        assert_eq!(
            index.kind(),
            IndexKind::Hnsw {
                metric: DistanceMetric::Cosine,
                params: HnswParams::with_m(8),
            }
        );
        assert!(plan(&catalog, "CREATE INDEX idx ON docs(e) USING HNSW WITH (metric = 'manhattan')").is_err());
        assert!(plan(&catalog, "CREATE INDEX idx ON docs(e) USING HNSW WITH (colour = 'red')").is_err());
        assert!(plan(&catalog, "CREATE INDEX idx ON docs(e) USING GIST").is_err());
    }

    #[test]
    fn insert_targets_and_arity() {
        let mut catalog = Catalog::new();
        create(&mut catalog, "CREATE TABLE t (a INT, b TEXT, c FLOAT)");

        let Plan::Insert(insert) = plan(&catalog, "INSERT INTO t (c, a) VALUES (1.5, 1), (2.5, 2)").unwrap()
        else {
            panic!("expected insert");
        };
        assert_eq!(insert.targets, vec![2, 0]);

        assert!(plan(&catalog, "INSERT INTO t (a, b) VALUES (1)").is_err());
        assert!(plan(&catalog, "INSERT INTO t (a, a) VALUES (1, 2)").is_err());
        assert!(plan(&catalog, "INSERT INTO t (zzz) VALUES (1)").is_err());
        assert!(plan(&catalog, "INSERT INTO t SELECT a, b FROM t").is_err());
    }

    #[test]
    fn update_assignments_resolve_columns() {
        let mut catalog = Catalog::new();
        create(&mut catalog, "CREATE TABLE t (id INT PRIMARY KEY, n INT)");

        let Plan::Update(update) = plan(&catalog, "UPDATE t SET n = n + 1 WHERE id = 3").unwrap() else {
            panic!("expected update");
        };
        assert_eq!(update.assignments.len(), 1);
        assert!(update.scan.explain().contains("IndexScan on t using t_pkey"));

        assert!(plan(&catalog, "UPDATE t SET rowid = 1").is_err());
        assert!(plan(&catalog, "UPDATE t SET n = 1, n = 2").is_err());
    }

    #[test]
    fn vector_columns_keep_dimensions() {
        let catalog = Catalog::new();
        let Plan::CreateTable { def, .. } = plan(&catalog, "CREATE TABLE v (e VECTOR(4))").unwrap() else {
            panic!("expected create table");
        };
        assert_eq!(def.columns()[0].data_type(), DataType::Vector(4));
    }
}
