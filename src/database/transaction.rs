//! # Explicit Transactions
//!
//! `Database::begin()` returns a [`Transaction`] bound to the database
//! handle. Every statement run through it reads the snapshot taken at
//! `begin()` plus the transaction's own staged writes; nothing becomes
//! visible to other transactions until `commit()`.
//!
//! ## States
//!
//! ```text
//! ┌────────┐  commit() ok   ┌───────────┐
//! │ Active │ ─────────────► │ Committed │
//! └────────┘                └───────────┘
//!     │  rollback(), drop,
//!     │  or commit() conflict
//!     ▼
//! ┌─────────┐
//! │ Aborted │
//! └─────────┘
//! ```
//!
//! Any operation on a transaction that has left `Active` fails with a
//! `TransactionState` error. An execution error inside an active
//! transaction undoes that statement only; the transaction stays usable.
//!
//! ## Scoped Rollback
//!
//! A `Transaction` that is dropped while still active rolls back, so an
//! early return with `?` can never leave staged writes behind.

use eyre::Result;
use std::fmt;

use super::params::Params;
use super::prepared::PreparedStatement;
use super::row::{QueryResult, Row};
use super::{Database, ExecuteResult};
use crate::mvcc::{Snapshot, TxnState, WriteSet};
use crate::sql::planner::{Plan, PlannedStatement};

/// Snapshot, staged writes and state of one transaction. Shared by
/// [`Transaction`] handles and the SQL-driven session transaction.
#[derive(Debug)]
pub(crate) struct TxnInner {
    pub(crate) snapshot: Snapshot,
    pub(crate) writes: WriteSet,
    pub(crate) state: TxnState,
}

impl TxnInner {
    pub(crate) fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            writes: WriteSet::new(),
            state: TxnState::Active,
        }
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.state != TxnState::Active {
            state_bail!("transaction is already {}", self.state.as_str());
        }
        Ok(())
    }
}

pub struct Transaction<'db> {
    db: &'db Database,
    inner: TxnInner,
}

impl<'db> Transaction<'db> {
    pub(crate) fn new(db: &'db Database, inner: TxnInner) -> Self {
        Self { db, inner }
    }

    pub fn is_active(&self) -> bool {
        self.inner.state == TxnState::Active
    }

    pub fn state(&self) -> TxnState {
        self.inner.state
    }

    /// Publishes the staged writes. On a write conflict the transaction is
    /// aborted and a `TransactionConflict` error returned.
    pub fn commit(&mut self) -> Result<()> {
        self.db.shared.commit(&mut self.inner)
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.db.shared.rollback(&mut self.inner)
    }

    pub fn execute(&mut self, sql: &str, params: impl Into<Params>) -> Result<u64> {
        let planned = self.db.shared.plan_sql(sql)?;
        self.run(&planned, &params.into()).map(ExecuteResult::affected)
    }

    /// Runs a `;`-separated script inside the transaction.
    pub fn exec(&mut self, script: &str) -> Result<u64> {
        let mut total = 0;
        for sql in super::script::split_statements(script) {
            total += self.execute(sql, Params::None)?;
        }
        Ok(total)
    }

    pub fn query(&mut self, sql: &str, params: impl Into<Params>) -> Result<Vec<Row>> {
        Ok(self.query_raw(sql, params)?.into_rows())
    }

    pub fn query_one(&mut self, sql: &str, params: impl Into<Params>) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    pub fn query_raw(&mut self, sql: &str, params: impl Into<Params>) -> Result<QueryResult> {
        let planned = self.db.shared.plan_sql(sql)?;
        self.run(&planned, &params.into()).map(ExecuteResult::into_result)
    }

    /// Runs one statement once per parameter set, returning the total
    /// number of affected rows. Stops at the first failing set; the sets
    /// before it stay staged.
    pub fn execute_batch(&mut self, sql: &str, batch: &[Params]) -> Result<u64> {
        let planned = self.db.shared.plan_sql(sql)?;
        let mut total = 0;
        for params in batch {
            total += self.run(&planned, params)?.affected();
        }
        Ok(total)
    }

    pub fn execute_prepared(&mut self, stmt: &PreparedStatement<'_>, params: impl Into<Params>) -> Result<u64> {
        let planned = stmt.planned()?;
        self.run(&planned, &params.into()).map(ExecuteResult::affected)
    }

    pub fn query_prepared(&mut self, stmt: &PreparedStatement<'_>, params: impl Into<Params>) -> Result<Vec<Row>> {
        let planned = stmt.planned()?;
        Ok(self.run(&planned, &params.into())?.into_result().into_rows())
    }

    fn run(&mut self, planned: &PlannedStatement, params: &Params) -> Result<ExecuteResult> {
        self.db.shared.ensure_open()?;
        match planned.plan {
            Plan::Begin => {
                self.inner.ensure_active()?;
                state_bail!("a transaction is already active");
            }
            Plan::Commit => self.commit().map(|_| ExecuteResult::Commit),
            Plan::Rollback => self.rollback().map(|_| ExecuteResult::Rollback),
            _ => self.db.shared.run_in(&mut self.inner, planned, params),
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.is_active() {
            // rollback only fails for an inactive transaction
            let _ = self.db.shared.rollback(&mut self.inner);
        }
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.is_active() { "active" } else { "closed" };
        f.debug_struct("Transaction")
            .field("txn_id", &self.inner.snapshot.txn_id)
            .field("status", &status)
            .finish()
    }
}
