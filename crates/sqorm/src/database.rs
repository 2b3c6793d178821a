//! Database handle, transactions and the statement log path.
//!
//! [`Database`] and [`Tx`] both implement [`Executor`]: they run statements, time them, pass
//! failures through the configured [`ErrorMapper`](crate::ErrorMapper) and hand one
//! [`LogEntry`] per statement to the logger. A transaction additionally keeps its entries and
//! flushes them exactly once, attached to the `COMMIT` or `ROLLBACK` entry.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::Utc;

use crate::client::{Connection, Connector, ExecContext, Record, with_deadline};
use crate::config::DatabaseConfig;
use crate::error::{SqlError, SqlResult};
use crate::log::{LogEntry, LogFlags};
use crate::query::Query;
use crate::value::Value;

/// Something statements can run on: a [`Database`] or a [`Tx`].
pub trait Executor: Send + Sync {
    fn config(&self) -> &DatabaseConfig;

    /// Run a row-returning statement, logged with `kind`.
    fn fetch(
        &self,
        ctx: &ExecContext,
        sql: &str,
        args: &[Value],
        kind: LogFlags,
    ) -> impl Future<Output = SqlResult<Vec<Record>>> + Send;

    /// Run a statement and return the affected row count.
    fn execute(
        &self,
        ctx: &ExecContext,
        sql: &str,
        args: &[Value],
    ) -> impl Future<Output = SqlResult<u64>> + Send;

    /// Run several statements atomically and return the summed row count.
    fn execute_all(
        &self,
        ctx: &ExecContext,
        statements: Vec<(String, Vec<Value>)>,
    ) -> impl Future<Output = SqlResult<u64>> + Send;

    /// Log a statement that failed to build; returns the (possibly mapped) error.
    fn report_build(&self, ctx: &ExecContext, sql: &str, args: &[Value], err: SqlError) -> SqlError;
}

/// Record `err` on the entry, passing it through the error mapper when one is set.
fn map_error(config: &DatabaseConfig, entry: &mut LogEntry, err: SqlError) -> SqlError {
    entry.error = Some(err.to_string());
    let Some(mapper) = &config.error_mapper else {
        return err;
    };
    entry.orig_error = entry.error.clone();
    let mapped = mapper(err, entry);
    entry.error = Some(mapped.to_string());
    mapped
}

/// Fill in the duration, map the error, then log.
fn log_outcome<T>(
    config: &DatabaseConfig,
    mut entry: LogEntry,
    started: Instant,
    result: SqlResult<T>,
) -> (SqlResult<T>, LogEntry) {
    entry.duration = started.elapsed();
    let result = result.map_err(|err| map_error(config, &mut entry, err));
    config.logger.log(&entry);
    (result, entry)
}

fn statement_entry(ctx: &ExecContext, flags: LogFlags, sql: &str, args: &[Value]) -> LogEntry {
    let mut entry = LogEntry::statement(flags, sql, args);
    entry.tag = ctx.tag.clone();
    entry
}

fn build_error(
    config: &DatabaseConfig,
    ctx: &ExecContext,
    flags: LogFlags,
    sql: &str,
    args: &[Value],
    err: SqlError,
) -> SqlError {
    let mut entry = statement_entry(ctx, flags, sql, args);
    let err = map_error(config, &mut entry, err);
    config.logger.log(&entry);
    err
}

/// Shared handle over a connection source.
///
/// Cheap to clone; clones share the connector and configuration.
pub struct Database<P> {
    inner: Arc<Inner<P>>,
}

struct Inner<P> {
    connector: P,
    config: Arc<DatabaseConfig>,
}

impl<P> Clone for Database<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: Connector> Database<P> {
    pub fn new(connector: P, config: DatabaseConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                connector,
                config: Arc::new(config),
            }),
        }
    }

    pub fn connector(&self) -> &P {
        &self.inner.connector
    }

    /// Start a query bound to this handle.
    pub fn query(&self) -> Query<'_, Self> {
        Query::new(self)
    }

    /// Open a transaction on a dedicated connection.
    pub async fn begin(&self) -> SqlResult<Tx<P::Conn>> {
        self.begin_with(ExecContext::new()).await
    }

    /// Open a transaction whose statements default to `ctx`.
    pub async fn begin_with(&self, ctx: ExecContext) -> SqlResult<Tx<P::Conn>> {
        let conn = self.inner.connector.connect().await?;
        conn.batch_execute("BEGIN").await?;
        Ok(Tx::new(conn, self.inner.config.clone(), ctx))
    }

    /// Run a raw statement.
    pub async fn exec(&self, sql: &str, args: &[Value]) -> SqlResult<u64> {
        Executor::execute(self, &ExecContext::new(), sql, args).await
    }

    /// Run a raw row-returning statement.
    pub async fn query_rows(&self, sql: &str, args: &[Value]) -> SqlResult<Vec<Record>> {
        self.fetch(&ExecContext::new(), sql, args, LogFlags::QUERY)
            .await
    }

    fn deadline(&self, ctx: &ExecContext) -> ExecContext {
        let mut ctx = ctx.clone();
        if let (None, Some(timeout)) = (ctx.deadline, self.inner.config.query_timeout) {
            ctx.deadline = Some(tokio::time::Instant::now() + timeout);
        }
        ctx
    }

    async fn connect(&self, ctx: &ExecContext) -> SqlResult<P::Conn> {
        with_deadline(ctx, None, self.inner.connector.connect()).await
    }
}

impl<P: Connector> Executor for Database<P> {
    fn config(&self) -> &DatabaseConfig {
        &self.inner.config
    }

    async fn fetch(
        &self,
        ctx: &ExecContext,
        sql: &str,
        args: &[Value],
        kind: LogFlags,
    ) -> SqlResult<Vec<Record>> {
        let ctx = self.deadline(ctx);
        let entry = statement_entry(&ctx, kind, sql, args);
        let started = Instant::now();
        let result = async {
            let conn = self.connect(&ctx).await?;
            conn.query(&ctx, sql, args).await
        }
        .await;
        log_outcome(self.config(), entry, started, result).0
    }

    async fn execute(&self, ctx: &ExecContext, sql: &str, args: &[Value]) -> SqlResult<u64> {
        let ctx = self.deadline(ctx);
        let entry = statement_entry(&ctx, LogFlags::EXEC, sql, args);
        let started = Instant::now();
        let result = async {
            let conn = self.connect(&ctx).await?;
            conn.execute(&ctx, sql, args).await
        }
        .await;
        log_outcome(self.config(), entry, started, result).0
    }

    async fn execute_all(
        &self,
        ctx: &ExecContext,
        statements: Vec<(String, Vec<Value>)>,
    ) -> SqlResult<u64> {
        match statements.len() {
            0 => Ok(0),
            1 => {
                let (sql, args) = &statements[0];
                Executor::execute(self, ctx, sql, args).await
            }
            _ => {
                let tx = self.begin_with(ctx.clone()).await?;
                match tx.execute_all(ctx, statements).await {
                    Ok(n) => {
                        tx.commit().await?;
                        Ok(n)
                    }
                    Err(err) => {
                        let _ = tx.rollback().await;
                        Err(err)
                    }
                }
            }
        }
    }

    fn report_build(&self, ctx: &ExecContext, sql: &str, args: &[Value], err: SqlError) -> SqlError {
        build_error(self.config(), ctx, LogFlags::BUILD, sql, args, err)
    }
}

/// An open transaction on one connection.
///
/// Statements are logged as they run (flagged `TX`) and kept; `commit` or `rollback` logs them
/// once more inside a single entry. The first of the two to run finishes the transaction; later
/// calls return [`SqlError::TxDone`] without logging. Dropping an unfinished transaction rolls it
/// back in the background when a Tokio runtime is available.
pub struct Tx<C: Connection + 'static> {
    conn: Option<C>,
    config: Arc<DatabaseConfig>,
    ctx: ExecContext,
    began: chrono::DateTime<Utc>,
    clock: Instant,
    queries: Mutex<Vec<LogEntry>>,
    finished: AtomicBool,
}

impl<C: Connection + 'static> Tx<C> {
    fn new(conn: C, config: Arc<DatabaseConfig>, ctx: ExecContext) -> Self {
        Self {
            conn: Some(conn),
            config,
            ctx,
            began: Utc::now(),
            clock: Instant::now(),
            queries: Mutex::new(Vec::new()),
            finished: AtomicBool::new(false),
        }
    }

    /// Start a query bound to this transaction.
    pub fn query(&self) -> Query<'_, Self> {
        Query::new(self).with_context(self.ctx.clone())
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Entries of the statements run so far.
    pub fn statements(&self) -> Vec<LogEntry> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run a raw statement inside the transaction.
    pub async fn exec(&self, sql: &str, args: &[Value]) -> SqlResult<u64> {
        Executor::execute(self, &self.ctx, sql, args).await
    }

    /// Run a raw row-returning statement inside the transaction.
    pub async fn query_rows(&self, sql: &str, args: &[Value]) -> SqlResult<Vec<Record>> {
        self.fetch(&self.ctx, sql, args, LogFlags::QUERY).await
    }

    pub async fn commit(&self) -> SqlResult<()> {
        self.finish("COMMIT", LogFlags::COMMIT).await
    }

    pub async fn rollback(&self) -> SqlResult<()> {
        self.finish("ROLLBACK", LogFlags::ROLLBACK).await
    }

    async fn finish(&self, sql: &'static str, kind: LogFlags) -> SqlResult<()> {
        if self.finished.swap(true, Ordering::AcqRel) {
            return Err(SqlError::TxDone);
        }
        let result = match &self.conn {
            Some(conn) => conn.batch_execute(sql).await,
            None => Err(SqlError::TxDone),
        };
        let entry = self.flush_entry(kind);
        log_outcome(&self.config, entry, self.clock, result).0
    }

    fn flush_entry(&self, kind: LogFlags) -> LogEntry {
        let mut entry = LogEntry::new(kind | LogFlags::TX);
        entry.time = self.began;
        entry.tag = self.ctx.tag.clone();
        entry.tx_queries =
            std::mem::take(&mut *self.queries.lock().unwrap_or_else(PoisonError::into_inner));
        entry
    }

    fn conn(&self) -> SqlResult<&C> {
        if self.is_finished() {
            return Err(SqlError::TxDone);
        }
        self.conn.as_ref().ok_or(SqlError::TxDone)
    }

    fn keep<T>(&self, entry: LogEntry, started: Instant, result: SqlResult<T>) -> SqlResult<T> {
        let (result, entry) = log_outcome(&self.config, entry, started, result);
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
        result
    }
}

impl<C: Connection + 'static> Executor for Tx<C> {
    fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    async fn fetch(
        &self,
        ctx: &ExecContext,
        sql: &str,
        args: &[Value],
        kind: LogFlags,
    ) -> SqlResult<Vec<Record>> {
        let conn = self.conn()?;
        let entry = statement_entry(ctx, kind | LogFlags::TX, sql, args);
        let started = Instant::now();
        let result = conn.query(ctx, sql, args).await;
        self.keep(entry, started, result)
    }

    async fn execute(&self, ctx: &ExecContext, sql: &str, args: &[Value]) -> SqlResult<u64> {
        let conn = self.conn()?;
        let entry = statement_entry(ctx, LogFlags::EXEC | LogFlags::TX, sql, args);
        let started = Instant::now();
        let result = conn.execute(ctx, sql, args).await;
        self.keep(entry, started, result)
    }

    async fn execute_all(
        &self,
        ctx: &ExecContext,
        statements: Vec<(String, Vec<Value>)>,
    ) -> SqlResult<u64> {
        let mut total = 0;
        for (sql, args) in &statements {
            total += Executor::execute(self, ctx, sql, args).await?;
        }
        Ok(total)
    }

    fn report_build(&self, ctx: &ExecContext, sql: &str, args: &[Value], err: SqlError) -> SqlError {
        build_error(
            &self.config,
            ctx,
            LogFlags::BUILD | LogFlags::TX,
            sql,
            args,
            err,
        )
    }
}

impl<C: Connection + 'static> Drop for Tx<C> {
    fn drop(&mut self) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(conn) = self.conn.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let entry = self.flush_entry(LogFlags::ROLLBACK);
        let config = self.config.clone();
        let clock = self.clock;
        handle.spawn(async move {
            let result = conn.batch_execute("ROLLBACK").await;
            let _ = log_outcome(&config, entry, clock, result);
        });
    }
}

/// Runs the given block inside a transaction on `$db`.
///
/// Commits when the block evaluates to `Ok(_)` and rolls back on `Err(_)`. The block must
/// evaluate to `sqorm::SqlResult<T>`.
///
/// ```ignore
/// let id = sqorm::transaction!(db, tx, {
///     tx.query().insert(&order).await?;
///     tx.query().where_("id = ?", sqorm::args![stock_id]).update(&stock).await?;
///     Ok(order.id)
/// })?;
/// ```
#[macro_export]
macro_rules! transaction {
    ($db:expr, $tx:ident, $body:block) => {{
        let $tx = ($db).begin().await?;
        let __sqorm_tx_body_result = async { $body }.await;
        match __sqorm_tx_body_result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(error) => match $tx.rollback().await {
                Ok(()) => Err(error),
                Err(rollback_err) => Err($crate::SqlError::Other(format!(
                    "{error} (rollback failed: {rollback_err})"
                ))),
            },
        }
    }};
}
