//! # Database Handle
//!
//! `Database` is the entry point of the engine. A handle holds an
//! `Arc<SharedDatabase>` with everything that outlives a single statement,
//! plus the handle's own session transaction driven by SQL `BEGIN`,
//! `COMMIT` and `ROLLBACK`.
//!
//! ```text
//! Database ──► SharedDatabase
//!   session      ├── RwLock<Store>          catalog + versioned rows + indexes
//!                ├── TransactionManager     snapshots, commit clock, commit guard
//!                ├── Mutex<Durability>      WAL + snapshot (file-backed only)
//!                └── RwLock<DatabaseConfig> runtime settings (PRAGMA)
//! ```
//!
//! ## Statement Routing
//!
//! | Statement | Runs as |
//! |-----------|---------|
//! | SELECT, INSERT, UPDATE, DELETE | in the session transaction, else an implicit one |
//! | CREATE / DROP | auto-committed DDL, immediately visible |
//! | PRAGMA, SHOW TABLES, EXPLAIN | outside any transaction |
//! | BEGIN / COMMIT / ROLLBACK | session transaction control |
//!
//! ## Commit Protocol
//!
//! Commits and DDL serialize on the transaction manager's commit guard:
//!
//! 1. validate the write set against versions committed after the
//!    snapshot (first committer wins) and re-check unique keys
//! 2. append one WAL frame carrying every row change
//! 3. apply the changes to the store under its write lock
//! 4. publish the commit timestamp, making the versions visible
//!
//! A failure in steps 1 or 2 aborts the transaction with the store
//! untouched. Lock order is always: commit guard, store, durability.
//!
//! ## Handles
//!
//! Cloning a `Database` gives another handle to the same database with
//! its own (empty) session. Closing any handle closes the database for
//! all of them.

use eyre::{Result, WrapErr};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::builder::DatabaseBuilder;
use super::config::{DatabaseConfig, Dsn, Location};
use super::params::{bind, Params};
use super::prepared::PreparedStatement;
use super::row::{QueryResult, Row};
use super::script::split_statements;
use super::transaction::{Transaction, TxnInner};
use super::ExecuteResult;
use crate::mvcc::{TransactionManager, TxnState};
use crate::sql::executor::dml::DmlEnv;
use crate::sql::executor::{collect, execute_delete, execute_insert, execute_update, ExecContext};
use crate::sql::planner::{plan_statement, Plan, PlanSettings, PlannedStatement};
use crate::sql::parse_statement;
use crate::storage::{DdlRecord, Durability, LogRecord, Store};
use crate::types::{CommitTs, Value};

pub(crate) struct SharedDatabase {
    pub(crate) store: RwLock<Store>,
    pub(crate) txns: TransactionManager,
    pub(crate) durability: Option<Mutex<Durability>>,
    pub(crate) config: RwLock<DatabaseConfig>,
    location: Location,
    closed: AtomicBool,
}

pub struct Database {
    pub(crate) shared: Arc<SharedDatabase>,
    session: Mutex<Option<TxnInner>>,
}

impl Database {
    /// Opens a database from a connection string; see
    /// [`Dsn`](super::config::Dsn) for the accepted forms.
    pub fn open(dsn: &str) -> Result<Self> {
        let dsn = Dsn::parse(dsn)?;
        Self::open_with(dsn.location, dsn.config)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open_with(Location::Memory, DatabaseConfig::default())
    }

    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    pub(crate) fn open_with(location: Location, config: DatabaseConfig) -> Result<Self> {
        let (store, txns, durability) = match &location {
            Location::Memory => (Store::new(), TransactionManager::new(), None),
            Location::Directory(dir) => {
                let (durability, recovered) =
                    Durability::open(dir, config.sync_mode, config.checkpoint_threshold_bytes)
                        .wrap_err_with(|| format!("failed to open database at '{}'", dir.display()))?;
                debug!(frames = recovered.frames_replayed, "WAL replay finished");
                (
                    recovered.store,
                    TransactionManager::with_last_commit(recovered.last_commit_ts),
                    Some(Mutex::new(durability)),
                )
            }
        };

        match &location {
            Location::Memory => info!(sync_mode = %config.sync_mode, "opened in-memory database"),
            Location::Directory(dir) => {
                info!(path = %dir.display(), sync_mode = %config.sync_mode, "opened database")
            }
        }

        Ok(Self {
            shared: Arc::new(SharedDatabase {
                store: RwLock::new(store),
                txns,
                durability,
                config: RwLock::new(config),
                location,
                closed: AtomicBool::new(false),
            }),
            session: Mutex::new(None),
        })
    }

    /// Directory of a file-backed database; `None` in memory.
    pub fn path(&self) -> Option<&Path> {
        match &self.shared.location {
            Location::Memory => None,
            Location::Directory(dir) => Some(dir),
        }
    }

    pub fn config(&self) -> DatabaseConfig {
        self.shared.config.read().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// True while a SQL `BEGIN` on this handle awaits COMMIT or ROLLBACK.
    pub fn in_transaction(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Runs one statement and returns the number of rows it affected
    /// (0 for statements that do not write rows).
    pub fn execute(&self, sql: &str, params: impl Into<Params>) -> Result<u64> {
        self.run_sql(sql, &params.into()).map(ExecuteResult::affected)
    }

    /// Runs one statement and returns its full outcome.
    pub fn run(&self, sql: &str, params: impl Into<Params>) -> Result<ExecuteResult> {
        self.run_sql(sql, &params.into())
    }

    /// Runs a `;`-separated script without parameters, returning the total
    /// number of affected rows. Stops at the first failing statement.
    pub fn exec(&self, script: &str) -> Result<u64> {
        let mut total = 0;
        for sql in split_statements(script) {
            total += self.execute(sql, Params::None)?;
        }
        Ok(total)
    }

    pub fn query(&self, sql: &str, params: impl Into<Params>) -> Result<Vec<Row>> {
        Ok(self.query_raw(sql, params)?.into_rows())
    }

    /// First row of the result, if any.
    pub fn query_one(&self, sql: &str, params: impl Into<Params>) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    pub fn query_raw(&self, sql: &str, params: impl Into<Params>) -> Result<QueryResult> {
        self.run_sql(sql, &params.into()).map(ExecuteResult::into_result)
    }

    /// Runs one statement once per parameter set and returns the total
    /// number of affected rows. Outside a transaction every set commits on
    /// its own; the first failure stops the batch.
    pub fn execute_batch(&self, sql: &str, batch: &[Params]) -> Result<u64> {
        let planned = self.shared.plan_sql(sql)?;
        self.run_batch(&planned, batch)
    }

    pub fn prepare(&self, sql: &str) -> Result<PreparedStatement<'_>> {
        self.shared.ensure_open()?;
        let statement = parse_statement(sql)?;
        PreparedStatement::new(self, sql, statement)
    }

    /// Starts an explicit transaction. It must be committed or rolled back;
    /// dropping it while active rolls it back.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        self.shared.ensure_open()?;
        Ok(Transaction::new(self, self.shared.begin()))
    }

    /// Garbage-collects row versions no active snapshot can read. Returns
    /// the number of versions reclaimed.
    pub fn vacuum(&self) -> Result<usize> {
        self.shared.ensure_open()?;
        self.shared.collect_garbage()
    }

    /// Writes a snapshot and truncates the WAL. A no-op in memory.
    pub fn checkpoint(&self) -> Result<()> {
        self.shared.ensure_open()?;
        self.shared.checkpoint()
    }

    /// Rolls back this handle's session transaction, checkpoints, flushes
    /// and closes the database.
    pub fn close(self) -> Result<()> {
        self.rollback_session();
        self.shared.shutdown()
    }

    fn run_sql(&self, sql: &str, params: &Params) -> Result<ExecuteResult> {
        let planned = self.shared.plan_sql(sql)?;
        self.run_planned(&planned, params)
    }

    pub(crate) fn run_batch(&self, planned: &PlannedStatement, batch: &[Params]) -> Result<u64> {
        let mut total = 0;
        for params in batch {
            total += self.run_planned(planned, params)?.affected();
        }
        Ok(total)
    }

    pub(crate) fn run_planned(&self, planned: &PlannedStatement, params: &Params) -> Result<ExecuteResult> {
        self.shared.ensure_open()?;
        match &planned.plan {
            Plan::Begin => {
                let mut session = self.session.lock();
                if session.is_some() {
                    state_bail!("a transaction is already active");
                }
                *session = Some(self.shared.begin());
                Ok(ExecuteResult::Begin)
            }
            Plan::Commit => match self.session.lock().take() {
                Some(mut txn) => self.shared.commit(&mut txn).map(|_| ExecuteResult::Commit),
                None => state_bail!("no transaction is active"),
            },
            Plan::Rollback => match self.session.lock().take() {
                Some(mut txn) => self.shared.rollback(&mut txn).map(|_| ExecuteResult::Rollback),
                None => state_bail!("no transaction is active"),
            },
            Plan::Query(_) | Plan::Insert(_) | Plan::Update(_) | Plan::Delete(_) => {
                let mut session = self.session.lock();
                if let Some(txn) = session.as_mut() {
                    return self.shared.run_in(txn, planned, params);
                }
                drop(session);
                self.shared.autocommit(planned, params)
            }
            plan => self.shared.run_outside(plan),
        }
    }

    fn rollback_session(&self) {
        if let Some(mut txn) = self.session.lock().take() {
            warn!(txn_id = txn.snapshot.txn_id, "rolling back unfinished session transaction");
            // the session only ever holds active transactions
            let _ = self.shared.rollback(&mut txn);
        }
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            session: Mutex::new(None),
        }
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.rollback_session();
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("location", &self.shared.location)
            .field("closed", &self.is_closed())
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}

impl SharedDatabase {
    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            state_bail!("database is closed");
        }
        Ok(())
    }

    pub(crate) fn plan_settings(&self) -> PlanSettings {
        self.config.read().plan_settings()
    }

    pub(crate) fn plan_sql(&self, sql: &str) -> Result<PlannedStatement> {
        self.ensure_open()?;
        let statement = parse_statement(sql)?;
        let settings = self.plan_settings();
        let store = self.store.read();
        plan_statement(store.catalog(), settings, &statement)
    }

    pub(crate) fn begin(&self) -> TxnInner {
        TxnInner::new(self.txns.begin())
    }

    pub(crate) fn rollback(&self, txn: &mut TxnInner) -> Result<()> {
        txn.ensure_active()?;
        txn.writes.clear();
        txn.state = TxnState::Aborted;
        self.txns.finish(txn.snapshot.txn_id);
        debug!(txn_id = txn.snapshot.txn_id, "transaction rolled back");
        Ok(())
    }

    pub(crate) fn commit(&self, txn: &mut TxnInner) -> Result<()> {
        txn.ensure_active()?;
        let txn_id = txn.snapshot.txn_id;
        if txn.writes.is_empty() {
            txn.state = TxnState::Committed;
            self.txns.finish(txn_id);
            return Ok(());
        }

        let outcome = self.publish(txn);
        txn.writes.clear();
        self.txns.finish(txn_id);
        match outcome {
            Ok((commit_ts, gc_due)) => {
                txn.state = TxnState::Committed;
                debug!(txn_id, commit_ts, "transaction committed");
                if gc_due {
                    if let Err(err) = self.collect_garbage() {
                        warn!(error = %err, "garbage collection failed");
                    }
                }
                Ok(())
            }
            Err(err) => {
                txn.state = TxnState::Aborted;
                Err(err)
            }
        }
    }

    /// Validates, logs and applies a write set. Returns the commit
    /// timestamp and whether garbage collection is due.
    fn publish(&self, txn: &TxnInner) -> Result<(CommitTs, bool)> {
        let _guard = self.txns.commit_guard();
        let txn_id = txn.snapshot.txn_id;

        if let Err(err) = self.store.read().validate_commit(&txn.writes, txn.snapshot.read_ts) {
            debug!(txn_id, error = %err, "commit rejected");
            return Err(err);
        }

        let commit_ts = self.txns.next_commit_ts();
        let changes = Store::changes_for(&txn.writes);
        if let Some(durability) = &self.durability {
            let record = LogRecord::Commit {
                commit_ts,
                changes: changes.clone(),
            };
            durability
                .lock()
                .log(&record)
                .wrap_err_with(|| format!("failed to log commit of transaction {}", txn_id))?;
        }
        self.store.write().apply_commit(commit_ts, txn_id, &changes)?;

        let gc_interval = self.config.read().gc_interval_commits;
        let gc_due = self.txns.publish(commit_ts, gc_interval);
        self.checkpoint_if_needed();
        Ok((commit_ts, gc_due))
    }

    /// Runs a read or write statement inside `txn`.
    pub(crate) fn run_in(
        &self,
        txn: &mut TxnInner,
        planned: &PlannedStatement,
        params: &Params,
    ) -> Result<ExecuteResult> {
        txn.ensure_active()?;
        let read_ts = txn.snapshot.read_ts;
        match &planned.plan {
            Plan::Query(query) => {
                let bound = bind(&planned.params, params)?;
                let ctx = ExecContext::new(&self.store, read_ts, &txn.writes, &bound);
                let rows = collect(&query.root, &ctx)?;
                Ok(ExecuteResult::Rows(QueryResult {
                    columns: query.columns.clone(),
                    rows,
                }))
            }
            Plan::Insert(plan) => {
                let bound = bind(&planned.params, params)?;
                let env = self.dml_env(read_ts, &bound);
                execute_insert(env, plan, &mut txn.writes).map(ExecuteResult::Affected)
            }
            Plan::Update(plan) => {
                let bound = bind(&planned.params, params)?;
                let env = self.dml_env(read_ts, &bound);
                execute_update(env, plan, &mut txn.writes).map(ExecuteResult::Affected)
            }
            Plan::Delete(plan) => {
                let bound = bind(&planned.params, params)?;
                let env = self.dml_env(read_ts, &bound);
                execute_delete(env, plan, &mut txn.writes).map(ExecuteResult::Affected)
            }
            Plan::Begin | Plan::Commit | Plan::Rollback => {
                state_bail!("transaction control is not allowed here")
            }
            plan => self.run_outside(plan),
        }
    }

    fn dml_env<'a>(&'a self, read_ts: CommitTs, params: &'a super::params::BoundParams) -> DmlEnv<'a> {
        DmlEnv {
            store: &self.store,
            read_ts,
            params,
        }
    }

    /// Runs one statement in its own implicit transaction.
    pub(crate) fn autocommit(&self, planned: &PlannedStatement, params: &Params) -> Result<ExecuteResult> {
        let mut txn = self.begin();
        match self.run_in(&mut txn, planned, params) {
            Ok(result) => {
                self.commit(&mut txn)?;
                Ok(result)
            }
            Err(err) => {
                self.rollback(&mut txn)?;
                Err(err)
            }
        }
    }

    /// DDL, PRAGMA and introspection: statements that do not read or write
    /// rows through a snapshot.
    pub(crate) fn run_outside(&self, plan: &Plan) -> Result<ExecuteResult> {
        match plan {
            Plan::ShowTables => {
                let names = self.store.read().catalog().table_names();
                Ok(ExecuteResult::Rows(QueryResult {
                    columns: vec!["table_name".to_string()],
                    rows: names.into_iter().map(|n| vec![Value::Text(n)]).collect(),
                }))
            }
            Plan::Explain(text) => Ok(ExecuteResult::Rows(QueryResult {
                columns: vec!["plan".to_string()],
                rows: text
                    .lines()
                    .map(|line| vec![Value::Text(line.to_string())])
                    .collect(),
            })),
            Plan::Pragma { name, value } => self
                .execute_pragma(name, value.as_deref())
                .map(ExecuteResult::Rows),
            plan if plan.is_ddl() => self.execute_ddl(plan),
            _ => state_bail!("statement must run inside a transaction"),
        }
    }

    fn execute_ddl(&self, plan: &Plan) -> Result<ExecuteResult> {
        let _guard = self.txns.commit_guard();
        match plan {
            Plan::CreateTable { def, if_not_exists } => {
                let prepared = {
                    let store = self.store.read();
                    if store.catalog().table_exists(def.name()) {
                        if *if_not_exists {
                            return Ok(ExecuteResult::CreateTable { created: false });
                        }
                        schema_bail!("table '{}' already exists", def.name());
                    }
                    store.prepare_create_table(def.clone())?
                };
                self.log_ddl(DdlRecord::CreateTable(prepared.clone()))?;
                let installed = self.store.write().install_table(prepared)?;
                info!(table = installed.name(), id = installed.id(), "table created");
                Ok(ExecuteResult::CreateTable { created: true })
            }
            Plan::DropTable { name, if_exists } => {
                let table = self.store.read().catalog().get_table(name);
                let Some(table) = table else {
                    if *if_exists {
                        return Ok(ExecuteResult::DropTable { dropped: false });
                    }
                    schema_bail!("table '{}' not found", name);
                };
                self.log_ddl(DdlRecord::DropTable { table_id: table.id() })?;
                self.store.write().remove_table(table.id())?;
                info!(table = table.name(), "table dropped");
                Ok(ExecuteResult::DropTable { dropped: true })
            }
            Plan::CreateIndex {
                table,
                index,
                if_not_exists,
            } => {
                let prepared = {
                    let store = self.store.read();
                    if store.catalog().find_index(index.name()).is_some() {
                        if *if_not_exists {
                            return Ok(ExecuteResult::CreateIndex { created: false });
                        }
                        schema_bail!("index '{}' already exists", index.name());
                    }
                    store.prepare_index(table, index.clone())?
                };
                self.log_ddl(DdlRecord::CreateIndex {
                    table_id: prepared.table.id(),
                    index: index.clone(),
                })?;
                self.store.write().install_index(prepared)?;
                info!(index = index.name(), table = %table, "index created");
                Ok(ExecuteResult::CreateIndex { created: true })
            }
            Plan::DropIndex { name, if_exists } => {
                let found = self.store.read().catalog().find_index(name);
                let Some((_, index)) = found else {
                    if *if_exists {
                        return Ok(ExecuteResult::DropIndex { dropped: false });
                    }
                    schema_bail!("index '{}' not found", name);
                };
                self.log_ddl(DdlRecord::DropIndex {
                    name: index.name().to_string(),
                })?;
                self.store.write().remove_index(index.name())?;
                info!(index = index.name(), "index dropped");
                Ok(ExecuteResult::DropIndex { dropped: true })
            }
            _ => state_bail!("not a DDL statement"),
        }
    }

    fn log_ddl(&self, record: DdlRecord) -> Result<()> {
        if let Some(durability) = &self.durability {
            durability
                .lock()
                .log(&LogRecord::Ddl(record))
                .wrap_err("failed to log DDL")?;
        }
        Ok(())
    }

    pub(crate) fn wal_size(&self) -> u64 {
        self.durability.as_ref().map_or(0, |d| d.lock().wal_size())
    }

    pub(crate) fn checkpoint(&self) -> Result<()> {
        let _guard = self.txns.commit_guard();
        self.checkpoint_locked()
    }

    /// Requires the commit guard.
    fn checkpoint_locked(&self) -> Result<()> {
        if let Some(durability) = &self.durability {
            let store = self.store.read();
            durability
                .lock()
                .checkpoint(&store, self.txns.last_commit_ts())
                .wrap_err("checkpoint failed")?;
        }
        Ok(())
    }

    /// Requires the commit guard. The commit that triggered it is already
    /// durable in the WAL, so a failed checkpoint is only logged.
    fn checkpoint_if_needed(&self) {
        let Some(durability) = &self.durability else {
            return;
        };
        if !durability.lock().needs_checkpoint() {
            return;
        }
        if let Err(err) = self.checkpoint_locked() {
            warn!(error = %err, "automatic checkpoint failed");
        }
    }

    pub(crate) fn collect_garbage(&self) -> Result<usize> {
        let watermark = self.txns.watermark();
        let reclaimed = self.store.write().collect_garbage(watermark)?;
        self.txns.reset_gc_counter();
        debug!(reclaimed, watermark, "garbage collection finished");
        Ok(reclaimed)
    }

    pub(crate) fn shutdown(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(durability) = &self.durability {
            let _guard = self.txns.commit_guard();
            self.checkpoint_locked()?;
            durability.lock().sync()?;
        }
        info!(active = self.txns.active_count(), "database closed");
        Ok(())
    }
}

impl Drop for SharedDatabase {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(error = %err, "failed to flush database on drop");
        }
    }
}
