//! Driver boundary.
//!
//! [`Connection`] is the only thing the query engine needs from a driver: run a statement with
//! positional [`Value`] arguments and hand back either decoded cells or an affected-row count.
//! [`Connector`] hands out owned connections; transactions take one for their whole lifetime.

use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_postgres::types::ToSql;

use crate::error::{SqlError, SqlResult};
use crate::value::Value;

/// Per-statement execution context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecContext {
    /// The statement is cancelled once this instant passes.
    pub deadline: Option<Instant>,
    /// Free-form label carried into log entries.
    pub tag: Option<String>,
}

impl ExecContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn timeout(self, timeout: std::time::Duration) -> Self {
        self.deadline(Instant::now() + timeout)
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// One result row: column names and decoded cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Record {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cell by column name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// A connection able to run statements.
pub trait Connection: Send + Sync {
    /// Run a statement and return its rows.
    fn query(
        &self,
        ctx: &ExecContext,
        sql: &str,
        args: &[Value],
    ) -> impl Future<Output = SqlResult<Vec<Record>>> + Send;

    /// Run a statement and return the number of affected rows.
    fn execute(
        &self,
        ctx: &ExecContext,
        sql: &str,
        args: &[Value],
    ) -> impl Future<Output = SqlResult<u64>> + Send;

    /// Run argument-less control statements (`BEGIN`, `COMMIT`, ...).
    fn batch_execute(&self, sql: &str) -> impl Future<Output = SqlResult<()>> + Send;
}

/// Source of owned connections: a pool, or a single shared client.
pub trait Connector: Send + Sync {
    type Conn: Connection + 'static;

    fn connect(&self) -> impl Future<Output = SqlResult<Self::Conn>> + Send;
}

/// Run `fut` until `ctx`'s deadline, cancelling server-side work when it passes.
pub async fn with_deadline<T, F>(
    ctx: &ExecContext,
    cancel: Option<tokio_postgres::CancelToken>,
    fut: F,
) -> SqlResult<T>
where
    F: Future<Output = SqlResult<T>> + Send,
{
    let Some(deadline) = ctx.deadline else {
        return fut.await;
    };
    let started = Instant::now();
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => {
            if let Some(cancel) = cancel {
                tokio::spawn(async move {
                    let _ = cancel.cancel_query(tokio_postgres::NoTls).await;
                });
            }
            Err(SqlError::Timeout(deadline.saturating_duration_since(started)))
        }
    }
}

fn params(args: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    args.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

fn to_records(rows: Vec<tokio_postgres::Row>) -> SqlResult<Vec<Record>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let columns: Arc<[String]> = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    rows.iter()
        .map(|row| {
            let values = (0..row.len())
                .map(|i| {
                    row.try_get::<_, Value>(i)
                        .map_err(|e| SqlError::decode(&columns[i], e.to_string()))
                })
                .collect::<SqlResult<Vec<_>>>()?;
            Ok(Record::new(columns.clone(), values))
        })
        .collect()
}

impl Connection for tokio_postgres::Client {
    async fn query(&self, ctx: &ExecContext, sql: &str, args: &[Value]) -> SqlResult<Vec<Record>> {
        let params = params(args);
        let rows = with_deadline(ctx, Some(self.cancel_token()), async {
            Ok(tokio_postgres::Client::query(self, sql, &params).await?)
        })
        .await?;
        to_records(rows)
    }

    async fn execute(&self, ctx: &ExecContext, sql: &str, args: &[Value]) -> SqlResult<u64> {
        let params = params(args);
        with_deadline(ctx, Some(self.cancel_token()), async {
            Ok(tokio_postgres::Client::execute(self, sql, &params).await?)
        })
        .await
    }

    async fn batch_execute(&self, sql: &str) -> SqlResult<()> {
        Ok(tokio_postgres::Client::batch_execute(self, sql).await?)
    }
}

impl<C: Connection> Connection for Arc<C> {
    fn query(
        &self,
        ctx: &ExecContext,
        sql: &str,
        args: &[Value],
    ) -> impl Future<Output = SqlResult<Vec<Record>>> + Send {
        (**self).query(ctx, sql, args)
    }

    fn execute(
        &self,
        ctx: &ExecContext,
        sql: &str,
        args: &[Value],
    ) -> impl Future<Output = SqlResult<u64>> + Send {
        (**self).execute(ctx, sql, args)
    }

    fn batch_execute(&self, sql: &str) -> impl Future<Output = SqlResult<()>> + Send {
        (**self).batch_execute(sql)
    }
}

/// A single shared connection.
///
/// Every call hands out the same connection, so concurrent transactions would interleave on it;
/// use a pool when transactions run concurrently.
impl<C: Connection + 'static> Connector for Arc<C> {
    type Conn = Arc<C>;

    async fn connect(&self) -> SqlResult<Arc<C>> {
        Ok(self.clone())
    }
}

#[cfg(feature = "pool")]
impl Connection for deadpool_postgres::Object {
    fn query(
        &self,
        ctx: &ExecContext,
        sql: &str,
        args: &[Value],
    ) -> impl Future<Output = SqlResult<Vec<Record>>> + Send {
        let client: &tokio_postgres::Client = self;
        Connection::query(client, ctx, sql, args)
    }

    fn execute(
        &self,
        ctx: &ExecContext,
        sql: &str,
        args: &[Value],
    ) -> impl Future<Output = SqlResult<u64>> + Send {
        let client: &tokio_postgres::Client = self;
        Connection::execute(client, ctx, sql, args)
    }

    fn batch_execute(&self, sql: &str) -> impl Future<Output = SqlResult<()>> + Send {
        let client: &tokio_postgres::Client = self;
        Connection::batch_execute(client, sql)
    }
}

#[cfg(feature = "pool")]
impl Connector for deadpool_postgres::Pool {
    type Conn = deadpool_postgres::Object;

    async fn connect(&self) -> SqlResult<deadpool_postgres::Object> {
        Ok(self.get().await?)
    }
}
