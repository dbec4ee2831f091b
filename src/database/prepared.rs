//! # Prepared Statements
//!
//! `Database::prepare` parses the SQL once and keeps the statement tree.
//! The plan built from it is cached together with the catalog version and
//! the plan settings it was built under:
//!
//! ```text
//! prepare(sql) ──► parse ──► Statement (kept for the statement's lifetime)
//!                               │
//! execute(params) ──► cached plan current? ──yes──► bind ──► run
//!                               │ no
//!                               ▼
//!                     re-plan against the current catalog
//! ```
//!
//! A DDL statement or a PRAGMA that changes plan settings therefore
//! invalidates the cached plan without re-parsing the SQL.
//!
//! A prepared statement is immutable from the caller's view and may be
//! shared across threads; executions with different parameters only
//! contend on the brief cache check.

use eyre::Result;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use super::params::Params;
use super::row::{QueryResult, Row};
use super::{Database, ExecuteResult};
use crate::sql::planner::{plan_statement, PlanSettings, PlannedStatement};
use crate::sql::Statement;

struct CachedPlan {
    catalog_version: u64,
    settings: PlanSettings,
    planned: Arc<PlannedStatement>,
}

pub struct PreparedStatement<'db> {
    db: &'db Database,
    sql: String,
    statement: Statement,
    cache: Mutex<Option<CachedPlan>>,
}

impl<'db> PreparedStatement<'db> {
    pub(crate) fn new(db: &'db Database, sql: &str, statement: Statement) -> Result<Self> {
        let prepared = Self {
            db,
            sql: sql.to_string(),
            statement,
            cache: Mutex::new(None),
        };
        prepared.planned()?;
        Ok(prepared)
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The plan to run, rebuilt if the catalog or settings moved on.
    pub(crate) fn planned(&self) -> Result<Arc<PlannedStatement>> {
        let shared = &self.db.shared;
        let settings = shared.plan_settings();
        let store = shared.store.read();
        let version = store.catalog().version();

        let mut cache = self.cache.lock();
        if let Some(cached) = cache.as_ref() {
            if cached.catalog_version == version && cached.settings == settings {
                return Ok(Arc::clone(&cached.planned));
            }
        }
        let planned = Arc::new(plan_statement(store.catalog(), settings, &self.statement)?);
        *cache = Some(CachedPlan {
            catalog_version: version,
            settings,
            planned: Arc::clone(&planned),
        });
        Ok(planned)
    }

    pub fn execute(&self, params: impl Into<Params>) -> Result<u64> {
        let planned = self.planned()?;
        self.db
            .run_planned(&planned, &params.into())
            .map(ExecuteResult::affected)
    }

    pub fn query(&self, params: impl Into<Params>) -> Result<Vec<Row>> {
        Ok(self.query_raw(params)?.into_rows())
    }

    pub fn query_one(&self, params: impl Into<Params>) -> Result<Option<Row>> {
        Ok(self.query(params)?.into_iter().next())
    }

    pub fn query_raw(&self, params: impl Into<Params>) -> Result<QueryResult> {
        let planned = self.planned()?;
        self.db
            .run_planned(&planned, &params.into())
            .map(ExecuteResult::into_result)
    }

    pub fn execute_batch(&self, batch: &[Params]) -> Result<u64> {
        let planned = self.planned()?;
        self.db.run_batch(&planned, batch)
    }
}

impl fmt::Debug for PreparedStatement<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedStatement")
            .field("sql", &self.sql)
            .finish()
    }
}
