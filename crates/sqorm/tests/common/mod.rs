//! In-memory connection used by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use sqorm::client::with_deadline;
use sqorm::{
    ColumnPolicy, Connection, Database, DatabaseConfig, ExecContext, FieldReader, FieldValue,
    LogEntry, Logger, Model, Preloader, Record, SqlError, SqlResult, TableDef, Value,
};

/// Records every statement and answers queries from a queue of canned results.
#[derive(Default)]
pub struct Scripted {
    statements: Mutex<Vec<String>>,
    results: Mutex<VecDeque<Vec<Record>>>,
    fail_on: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
}

impl Scripted {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue the rows returned by the next query.
    pub fn push_rows(&self, rows: Vec<Record>) {
        self.results.lock().unwrap().push_back(rows);
    }

    /// Fail every statement containing `needle`.
    pub fn fail_on(&self, needle: &str) {
        *self.fail_on.lock().unwrap() = Some(needle.to_string());
    }

    /// Hold every statement for `delay` before answering.
    pub fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    async fn run(&self, ctx: &ExecContext, sql: &str) -> SqlResult<()> {
        self.statements.lock().unwrap().push(sql.to_string());
        let delay = *self.delay.lock().unwrap();
        let fail = self
            .fail_on
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|needle| sql.contains(needle));
        with_deadline(ctx, None, async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if fail {
                return Err(SqlError::Other("boom".into()));
            }
            Ok(())
        })
        .await
    }
}

impl Connection for Scripted {
    async fn query(&self, ctx: &ExecContext, sql: &str, _args: &[Value]) -> SqlResult<Vec<Record>> {
        self.run(ctx, sql).await?;
        Ok(self.results.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn execute(&self, ctx: &ExecContext, sql: &str, _args: &[Value]) -> SqlResult<u64> {
        self.run(ctx, sql).await?;
        Ok(1)
    }

    async fn batch_execute(&self, sql: &str) -> SqlResult<()> {
        self.run(&ExecContext::new(), sql).await
    }
}

/// Keeps every log entry.
#[derive(Clone, Default)]
pub struct Captured(Arc<Mutex<Vec<LogEntry>>>);

impl Captured {
    pub fn entries(&self) -> Vec<LogEntry> {
        self.0.lock().unwrap().clone()
    }

    pub fn last(&self) -> LogEntry {
        self.entries().pop().expect("no log entries")
    }
}

impl Logger for Captured {
    fn log(&self, entry: &LogEntry) {
        self.0.lock().unwrap().push(entry.clone());
    }
}

pub fn setup() -> (Database<Arc<Scripted>>, Arc<Scripted>, Captured) {
    setup_with(DatabaseConfig::new())
}

pub fn setup_with(config: DatabaseConfig) -> (Database<Arc<Scripted>>, Arc<Scripted>, Captured) {
    let conn = Scripted::new();
    let logs = Captured::default();
    let db = Database::new(conn.clone(), config.logger(logs.clone()));
    (db, conn, logs)
}

pub fn record(columns: &[&str], values: Vec<Value>) -> Record {
    let columns: Arc<[String]> = columns.iter().map(|c| c.to_string()).collect();
    Record::new(columns, values)
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub age: i32,
}

impl User {
    pub fn new(name: &str, age: i32) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            age,
        }
    }
}

impl Model for User {
    fn table() -> SqlResult<&'static TableDef> {
        static DEF: OnceLock<TableDef> = OnceLock::new();
        TableDef::cached(&DEF, || {
            TableDef::builder("user")
                .column::<i64>(ColumnPolicy::new("id"))
                .column::<String>(ColumnPolicy::new("name"))
                .column::<i32>(ColumnPolicy::new("age"))
                .build()
        })
    }

    fn fields(&self) -> Vec<FieldValue> {
        vec![self.id.into(), self.name.clone().into(), self.age.into()]
    }

    fn read(r: &mut FieldReader<'_>) -> SqlResult<Self> {
        Ok(Self {
            id: r.next()?,
            name: r.next()?,
            age: r.next()?,
        })
    }
}

pub fn user_record(id: i64, name: &str, age: i64) -> Record {
    record(
        &["id", "name", "age"],
        vec![Value::Int(id), Value::Text(name.into()), Value::Int(age)],
    )
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
}

impl Model for Post {
    fn table() -> SqlResult<&'static TableDef> {
        static DEF: OnceLock<TableDef> = OnceLock::new();
        TableDef::cached(&DEF, || {
            TableDef::builder("post")
                .column::<i64>(ColumnPolicy::new("id"))
                .column::<i64>(ColumnPolicy::new("user_id"))
                .column::<String>(ColumnPolicy::new("title"))
                .build()
        })
    }

    fn fields(&self) -> Vec<FieldValue> {
        vec![
            self.id.into(),
            self.user_id.into(),
            self.title.clone().into(),
        ]
    }

    fn read(r: &mut FieldReader<'_>) -> SqlResult<Self> {
        Ok(Self {
            id: r.next()?,
            user_id: r.next()?,
            title: r.next()?,
        })
    }
}

pub fn post_record(id: i64, user_id: i64, title: &str) -> Record {
    record(
        &["id", "user_id", "title"],
        vec![Value::Int(id), Value::Int(user_id), Value::Text(title.into())],
    )
}

/// A user with their posts.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Author {
    pub user: User,
    pub posts: Vec<Post>,
}

impl Model for Author {
    fn table() -> SqlResult<&'static TableDef> {
        User::table()
    }

    fn fields(&self) -> Vec<FieldValue> {
        self.user.fields()
    }

    fn read(r: &mut FieldReader<'_>) -> SqlResult<Self> {
        Ok(Self {
            user: User::read(r)?,
            posts: Vec::new(),
        })
    }

    fn preload(table: &str) -> Option<Preloader<Self>> {
        match table {
            "post" => Some(Preloader::new(
                "user_id",
                |a: &Author| Value::Int(a.user.id),
                |p: &Post| Value::Int(p.user_id),
                |a: &mut Author, p: Post| a.posts.push(p),
            )),
            _ => None,
        }
    }
}
