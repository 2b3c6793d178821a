//! Staged statement assembly.
//!
//! A [`Query`] collects stages in any order and renders them in a fixed one:
//!
//! ```text
//! prefixes → SELECT list + FROM/JOIN | statement body → ad hoc SQL → WHERE
//!          → GROUP BY → ORDER BY → LIMIT → OFFSET → suffixes
//! ```
//!
//! Stage setters consume and return the query, so a base query can be cloned and extended.
//! The `build*` methods only render; `get`, `find`, `insert`, ... render, run the statement on
//! the bound executor and decode the rows. Any error raised while rendering is logged as a
//! build entry before it is returned.
//!
//! # Example
//!
//! ```ignore
//! let active = db.query().where_("status = ?", sqorm::args!["active"]);
//!
//! let users: Vec<User> = active
//!     .clone()
//!     .in_("id", sqorm::args![vec![1_i64, 2, 3]])
//!     .order_by(["created_at DESC"])
//!     .limit(20)
//!     .preload("post")
//!     .find()
//!     .await?;
//! let total = active.count::<User>().await?;
//! ```

use std::collections::BTreeMap;

use chrono::Utc;

use crate::client::{ExecContext, Record};
use crate::codec::EncodeContext;
use crate::database::Executor;
use crate::error::{SqlError, SqlResult};
use crate::fragment::{self, Fragment, SharedFragment, write_group};
use crate::log::LogFlags;
use crate::model::{Model, decode_row};
use crate::table::TableDef;
use crate::value::Value;
use crate::writer::SqlWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Select,
    Insert,
    Update,
    Delete,
}

impl Verb {
    fn requires_where(self) -> Option<&'static str> {
        match self {
            Verb::Update => Some("UPDATE"),
            Verb::Delete => Some("DELETE"),
            Verb::Select | Verb::Insert => None,
        }
    }
}

type Body<'a> = &'a dyn Fn(&mut SqlWriter) -> SqlResult<()>;

#[derive(Clone)]
struct PreloadRequest {
    table: String,
    preds: Vec<SharedFragment>,
}

/// A statement under construction, bound to a [`Database`](crate::Database) or [`Tx`](crate::Tx).
pub struct Query<'e, E> {
    exec: &'e E,
    ctx: ExecContext,

    table: String,
    update_all: bool,
    limit: Option<u64>,
    offset: Option<u64>,

    selects: Vec<String>,
    prefixes: Vec<SharedFragment>,
    sqls: Vec<SharedFragment>,
    wheres: Vec<SharedFragment>,
    order_bys: Vec<String>,
    group_bys: Vec<String>,
    suffixes: Vec<SharedFragment>,
    preloads: Vec<PreloadRequest>,
}

impl<E> Clone for Query<'_, E> {
    fn clone(&self) -> Self {
        Self {
            exec: self.exec,
            ctx: self.ctx.clone(),
            table: self.table.clone(),
            update_all: self.update_all,
            limit: self.limit,
            offset: self.offset,
            selects: self.selects.clone(),
            prefixes: self.prefixes.clone(),
            sqls: self.sqls.clone(),
            wheres: self.wheres.clone(),
            order_bys: self.order_bys.clone(),
            group_bys: self.group_bys.clone(),
            suffixes: self.suffixes.clone(),
            preloads: self.preloads.clone(),
        }
    }
}

impl<'e, E: Executor> Query<'e, E> {
    pub fn new(exec: &'e E) -> Self {
        Self {
            exec,
            ctx: ExecContext::new(),
            table: String::new(),
            update_all: false,
            limit: None,
            offset: None,
            selects: Vec::new(),
            prefixes: Vec::new(),
            sqls: Vec::new(),
            wheres: Vec::new(),
            order_bys: Vec::new(),
            group_bys: Vec::new(),
            suffixes: Vec::new(),
            preloads: Vec::new(),
        }
    }

    // ==================== Context ====================

    pub fn with_context(mut self, ctx: ExecContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// Cancel the statement once `deadline` passes.
    pub fn deadline(mut self, deadline: tokio::time::Instant) -> Self {
        self.ctx.deadline = Some(deadline);
        self
    }

    pub fn timeout(self, timeout: std::time::Duration) -> Self {
        self.deadline(tokio::time::Instant::now() + timeout)
    }

    /// Label carried into every log entry of this query.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.ctx.tag = Some(tag.into());
        self
    }

    // ==================== Stages ====================

    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.table = name.into();
        self
    }

    /// Alias of [`Query::table`].
    pub fn from(self, name: impl Into<String>) -> Self {
        self.table(name)
    }

    /// Add an expression to the start of the statement.
    pub fn prefix(mut self, sql: impl Into<String>, args: Vec<Value>) -> Self {
        self.prefixes.push(fragment::expr(sql, args).shared());
        self
    }

    /// Add an expression to the end of the statement.
    pub fn suffix(mut self, sql: impl Into<String>, args: Vec<Value>) -> Self {
        self.suffixes.push(fragment::expr(sql, args).shared());
        self
    }

    /// Add ad hoc SQL after the statement body.
    pub fn sql(mut self, sql: impl Into<String>, args: Vec<Value>) -> Self {
        self.sqls.push(fragment::expr(sql, args).shared());
        self
    }

    /// Select columns; plain identifiers are quoted, anything else is written as is.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selects.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Add a predicate; predicates are joined with `AND`.
    pub fn where_(self, cond: impl Into<String>, args: Vec<Value>) -> Self {
        self.where_fragment(fragment::expr(cond, args))
    }

    /// Add any fragment as a predicate.
    pub fn where_fragment(mut self, pred: impl Fragment + 'static) -> Self {
        self.wheres.push(pred.shared());
        self
    }

    /// `column IN (...)`; nothing to match renders `FALSE`.
    pub fn in_(self, column: impl Into<String>, args: Vec<Value>) -> Self {
        self.where_fragment(fragment::in_(column, args))
    }

    pub fn not_in(self, column: impl Into<String>, args: Vec<Value>) -> Self {
        self.where_fragment(fragment::not_in(column, args))
    }

    /// `column IS NULL` when `null`, otherwise `column IS NOT NULL`.
    pub fn is_null(self, column: impl Into<String>, null: bool) -> Self {
        self.where_fragment(fragment::IsNull::new(column, null))
    }

    /// `column IS NOT NULL` when `exists`, otherwise `column IS NULL`.
    pub fn exists(self, column: impl Into<String>, exists: bool) -> Self {
        self.is_null(column, !exists)
    }

    pub fn order_by<I, S>(mut self, order_bys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_bys.extend(order_bys.into_iter().map(Into::into));
        self
    }

    pub fn group_by<I, S>(mut self, group_bys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_bys.extend(group_bys.into_iter().map(Into::into));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Write every column on update, not only the dirty ones.
    pub fn update_all(mut self) -> Self {
        self.update_all = true;
        self
    }

    /// Load the child table `table` for every row returned by `get` or `find`.
    pub fn preload(self, table: impl Into<String>) -> Self {
        self.preload_where(table, Vec::new())
    }

    /// Like [`Query::preload`], with extra predicates on the child query.
    pub fn preload_where(mut self, table: impl Into<String>, preds: Vec<SharedFragment>) -> Self {
        self.preloads.push(PreloadRequest {
            table: table.into(),
            preds,
        });
        self
    }

    /// Apply shared query modifiers in order.
    pub fn apply<F>(self, funcs: impl IntoIterator<Item = F>) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        funcs.into_iter().fold(self, |q, f| f(q))
    }

    // ==================== Build ====================

    /// Render the stages without a statement body.
    ///
    /// Fails with [`SqlError::NoAction`] when there is neither a select list nor any prefix or
    /// ad hoc SQL to render.
    pub fn build(&self) -> SqlResult<(String, Vec<Value>)> {
        let body: Body<'_> = &|_: &mut SqlWriter| Ok(());
        let has_text = !self.prefixes.is_empty() || !self.sqls.is_empty();
        self.render(Verb::Select, None, has_text.then_some(body))
    }

    /// `SELECT <columns of M> ... LIMIT 1`.
    pub fn build_get<M: Model>(&self) -> SqlResult<(String, Vec<Value>)> {
        let mut q = self.clone();
        q.limit = Some(1);
        q.build_find::<M>()
    }

    pub fn build_find<M: Model>(&self) -> SqlResult<(String, Vec<Value>)> {
        self.build_select(M::table())
    }

    pub fn build_insert<M: Model>(&self, obj: &M) -> SqlResult<(String, Vec<Value>)> {
        let prepared = M::table().map(|def| (def, vec![obj.fields()]));
        self.with_table(prepared, Verb::Insert, |def, rows, w| {
            def.write_insert(w, rows, &self.encode_context())
        })
    }

    pub fn build_update<M: Model>(&self, obj: &M) -> SqlResult<(String, Vec<Value>)> {
        let prepared = M::table().map(|def| (def, obj.fields()));
        self.with_table(prepared, Verb::Update, |def, fields, w| {
            if self.update_all {
                def.write_update_all(w, fields, &self.encode_context())
            } else {
                def.write_update(w, fields, &self.encode_context())
            }
        })
    }

    pub fn build_delete<M: Model>(&self) -> SqlResult<(String, Vec<Value>)> {
        let prepared = M::table().map(|def| (def, ()));
        self.with_table(prepared, Verb::Delete, |def, _, w| {
            w.write_raw("DELETE FROM ");
            w.write_name(def.name());
            Ok(())
        })
    }

    /// `SELECT COUNT(*) FROM <table of M> ...`.
    pub fn build_count<M: Model>(&self) -> SqlResult<(String, Vec<Value>)> {
        let def = match M::table() {
            Ok(def) => def,
            Err(err) => return Err(self.report(String::new(), Vec::new(), err)),
        };
        if let Err(err) = self.assert_table(def.name()) {
            return Err(self.report(String::new(), Vec::new(), err));
        }
        let mut q = self.clone();
        q.selects = vec!["COUNT(*)".to_string()];
        q.table = def.name().to_string();
        q.render(Verb::Select, Some(def), None)
    }

    /// `UPDATE "t" SET "k" = ?` for one key, `SET ("a","b") = (?,?)` for several.
    pub fn build_update_map(&self, map: &BTreeMap<String, Value>) -> SqlResult<(String, Vec<Value>)> {
        let table = self.table.as_str();
        let body: Body<'_> = &|w: &mut SqlWriter| {
            if table.is_empty() {
                return Err(SqlError::invalid_argument("no table provided"));
            }
            w.write_raw("UPDATE ");
            w.write_name(table);
            match map.len() {
                0 => return Err(SqlError::NoColumnsToUpdate),
                1 => {
                    w.write_raw(" SET ");
                    for (column, value) in map {
                        w.write_name(column);
                        w.write_arg(value.clone());
                    }
                    w.write_raw(" = ");
                    w.write_marker();
                }
                n => {
                    w.write_raw(" SET (");
                    for (column, value) in map {
                        w.write_name(column);
                        w.write_byte(b',');
                        w.write_arg(value.clone());
                    }
                    w.trim_last(1);
                    w.write_raw(") = (");
                    w.write_markers(n);
                    w.write_byte(b')');
                }
            }
            Ok(())
        };
        self.render(Verb::Update, None, Some(body))
    }

    // ==================== Execute ====================

    /// Fetch the first matching row into `obj`. Returns `false` when nothing matched.
    pub async fn get<M: Model>(self, obj: &mut M) -> SqlResult<bool> {
        let (sql, args) = self.build_get::<M>()?;
        let records = self.fetch(sql, args, LogFlags::QUERY_ROW).await?;
        let Some(record) = records.into_iter().next() else {
            return Ok(false);
        };
        *obj = decode_row(record)?;
        self.run_preloads(std::slice::from_mut(obj)).await?;
        Ok(true)
    }

    pub async fn find<M: Model>(self) -> SqlResult<Vec<M>> {
        let (sql, args) = self.build_find::<M>()?;
        let records = self.fetch(sql, args, LogFlags::QUERY).await?;
        let mut rows = records
            .into_iter()
            .map(decode_row)
            .collect::<SqlResult<Vec<M>>>()?;
        self.run_preloads(&mut rows).await?;
        Ok(rows)
    }

    pub async fn insert<M: Model>(self, obj: &M) -> SqlResult<u64> {
        let (sql, args) = self.build_insert(obj)?;
        self.execute(sql, args).await
    }

    /// Insert each object with its own statement, all inside one transaction.
    ///
    /// On a [`Database`](crate::Database) a transaction is opened for the batch; inside a
    /// [`Tx`](crate::Tx) the statements join the open transaction.
    pub async fn insert_many<M: Model>(self, objs: &[M]) -> SqlResult<u64> {
        let statements = objs
            .iter()
            .map(|obj| self.build_insert(obj))
            .collect::<SqlResult<Vec<_>>>()?;
        self.exec.execute_all(&self.ctx, statements).await
    }

    pub async fn update<M: Model>(self, obj: &M) -> SqlResult<u64> {
        let (sql, args) = self.build_update(obj)?;
        self.execute(sql, args).await
    }

    pub async fn update_map(self, map: &BTreeMap<String, Value>) -> SqlResult<u64> {
        let (sql, args) = self.build_update_map(map)?;
        self.execute(sql, args).await
    }

    pub async fn delete<M: Model>(self) -> SqlResult<u64> {
        let (sql, args) = self.build_delete::<M>()?;
        self.execute(sql, args).await
    }

    pub async fn count<M: Model>(self) -> SqlResult<u64> {
        let (sql, args) = self.build_count::<M>()?;
        let first = self
            .fetch(sql, args, LogFlags::QUERY_ROW)
            .await?
            .into_iter()
            .next()
            .and_then(|record| record.into_values().into_iter().next());
        match first {
            Some(Value::Int(n)) => u64::try_from(n).map_err(|e| SqlError::decode("count", e.to_string())),
            Some(other) => Err(SqlError::decode(
                "count",
                format!("expected integer, got {}", other.kind_name()),
            )),
            None => Ok(0),
        }
    }

    /// Run the rendered stages as a statement without rows.
    pub async fn exec(self) -> SqlResult<u64> {
        let (sql, args) = self.build()?;
        self.execute(sql, args).await
    }

    /// Run the rendered stages and return the raw rows.
    pub async fn query_rows(self) -> SqlResult<Vec<Record>> {
        let (sql, args) = self.build()?;
        self.fetch(sql, args, LogFlags::QUERY).await
    }

    /// Run the rendered stages and return the cells of the first row, if any.
    pub async fn scan_one(self) -> SqlResult<Option<Vec<Value>>> {
        let (sql, args) = self.build()?;
        let records = self.fetch(sql, args, LogFlags::QUERY_ROW).await?;
        Ok(records.into_iter().next().map(Record::into_values))
    }

    // ==================== Internals ====================

    fn encode_context(&self) -> EncodeContext {
        EncodeContext::new(Utc::now(), self.exec.config().arrays())
    }

    fn report(&self, sql: String, args: Vec<Value>, err: SqlError) -> SqlError {
        let err = self.exec.report_build(&self.ctx, &sql, &args, err);
        self.exec.config().recycle(sql);
        err
    }

    async fn fetch(&self, sql: String, args: Vec<Value>, kind: LogFlags) -> SqlResult<Vec<Record>> {
        let result = self.exec.fetch(&self.ctx, &sql, &args, kind).await;
        self.exec.config().recycle(sql);
        result
    }

    async fn execute(&self, sql: String, args: Vec<Value>) -> SqlResult<u64> {
        let result = self.exec.execute(&self.ctx, &sql, &args).await;
        self.exec.config().recycle(sql);
        result
    }

    fn build_select(&self, def: SqlResult<&'static TableDef>) -> SqlResult<(String, Vec<Value>)> {
        self.with_table(def.map(|def| (def, ())), Verb::Select, |def, _, w| {
            def.write_select(w);
            Ok(())
        })
    }

    /// Render with a body writing the statement of `def`, after the table check.
    fn with_table<T>(
        &self,
        prepared: SqlResult<(&'static TableDef, T)>,
        verb: Verb,
        write: impl Fn(&TableDef, &T, &mut SqlWriter) -> SqlResult<()>,
    ) -> SqlResult<(String, Vec<Value>)> {
        let (def, data) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => return Err(self.report(String::new(), Vec::new(), err)),
        };
        let body: Body<'_> = &|w: &mut SqlWriter| {
            self.assert_table(def.name())?;
            write(def, &data, w)
        };
        self.render(verb, Some(def), Some(body))
    }

    fn assert_table(&self, object: &str) -> SqlResult<()> {
        if self.table.is_empty() && object.is_empty() {
            return Err(SqlError::invalid_argument("no table provided"));
        }
        if !self.table.is_empty() && !object.is_empty() && self.table != object {
            return Err(SqlError::TableMismatch {
                query: self.table.clone(),
                object: object.to_string(),
            });
        }
        Ok(())
    }

    /// Render every stage; failures are logged as build errors.
    fn render(
        &self,
        verb: Verb,
        def: Option<&TableDef>,
        body: Option<Body<'_>>,
    ) -> SqlResult<(String, Vec<Value>)> {
        let mut w = self.exec.config().writer();
        match self.write_stages(&mut w, verb, def, body) {
            Ok(()) => Ok(w.finish()),
            Err(err) => {
                let (sql, args) = w.finish();
                Err(self.report(sql, args, err))
            }
        }
    }

    fn write_stages(
        &self,
        w: &mut SqlWriter,
        verb: Verb,
        def: Option<&TableDef>,
        body: Option<Body<'_>>,
    ) -> SqlResult<()> {
        let required = verb.requires_where();
        if let (Some(keyword), true) = (required, self.wheres.is_empty()) {
            return Err(SqlError::MissingWhere(keyword));
        }

        write_joined(w, &self.prefixes, " ")?;
        if !w.is_empty() {
            w.write_byte(b' ');
        }

        if !self.selects.is_empty() {
            w.write_raw("SELECT ");
            write_names(w, &self.selects);
            match def.filter(|d| d.join_def().is_some()) {
                Some(def) => {
                    w.write_byte(b' ');
                    def.write_join_from(w);
                }
                None if !self.table.is_empty() => {
                    w.write_raw(" FROM ");
                    w.write_name(&self.table);
                }
                None => {}
            }
        } else if let Some(body) = body {
            body(w)?;
        } else {
            return Err(SqlError::NoAction);
        }

        if !self.sqls.is_empty() {
            if !w.is_empty() && !w.as_str().ends_with(' ') {
                w.write_byte(b' ');
            }
            write_joined(w, &self.sqls, " ")?;
        }

        if !self.wheres.is_empty() {
            w.write_raw(" WHERE ");
            let start = w.len();
            write_group(w, &self.wheres, ") AND (")?;
            if w.len() == start {
                w.trim_last(" WHERE ".len());
                if let Some(keyword) = required {
                    return Err(SqlError::MissingWhere(keyword));
                }
            }
        }

        if !self.group_bys.is_empty() {
            w.write_raw(" GROUP BY ");
            write_names(w, &self.group_bys);
        }
        if !self.order_bys.is_empty() {
            w.write_raw(" ORDER BY ");
            write_names(w, &self.order_bys);
        }
        if let Some(limit) = self.limit {
            w.write_raw(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            w.write_raw(&format!(" OFFSET {offset}"));
        }

        for suffix in &self.suffixes {
            w.write_byte(b' ');
            let start = w.len();
            suffix.write_to(w)?;
            if w.len() == start {
                w.trim_last(1);
            }
        }
        Ok(())
    }

    async fn run_preloads<M: Model>(&self, rows: &mut [M]) -> SqlResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        for request in &self.preloads {
            let Some(preloader) = M::preload(&request.table) else {
                let parent = M::table().map(|def| def.name().to_string()).unwrap_or_default();
                let err = SqlError::invalid_argument(format!(
                    "{parent} can not preload {}",
                    request.table
                ));
                return Err(self.report(String::new(), Vec::new(), err));
            };
            let child = preloader.table()?;

            let mut q = Query::new(self.exec).with_context(self.ctx.clone());
            q.wheres
                .push(fragment::in_(preloader.fkey(), preloader.ids(rows)).shared());
            q.wheres.extend(request.preds.iter().cloned());
            let (sql, args) = q.build_select(Ok(child))?;

            let records = self.fetch(sql, args, LogFlags::QUERY).await?;
            preloader.populate(rows, records)?;
        }
        Ok(())
    }
}

/// Parts separated by `sep`; parts rendering nothing leave no separator behind.
fn write_joined(w: &mut SqlWriter, parts: &[SharedFragment], sep: &str) -> SqlResult<()> {
    let mut written = false;
    for part in parts {
        let mark = w.len();
        if written {
            w.write_raw(sep);
        }
        let start = w.len();
        part.write_to(w)?;
        if w.len() == start {
            w.trim_last(start - mark);
        } else {
            written = true;
        }
    }
    Ok(())
}

fn write_names(w: &mut SqlWriter, names: &[String]) {
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            w.write_byte(b',');
        }
        w.write_query_name(name);
    }
}
