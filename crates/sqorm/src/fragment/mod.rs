//! Composable SQL fragments.
//!
//! A [`Fragment`] writes SQL text and its positional arguments into a [`SqlWriter`]. Fragments
//! are immutable values; groups hold them behind `Arc` so a query can be cloned and extended
//! without touching the fragments it shares with its origin.
//!
//! # Example
//!
//! ```ignore
//! use sqorm::fragment::{self, ColumnFilter};
//! use sqorm::args;
//!
//! let pred = fragment::and([
//!     fragment::expr("status = ?", args!["active"]).shared(),
//!     fragment::in_("id", args![1_i64, 2_i64, 3_i64]).shared(),
//!     ColumnFilter::value("", "partner_id", partner_id).optional().shared(),
//! ]);
//! ```

mod filter;
mod predicate;

pub use filter::{CmpOp, ColumnFilter, FilterMode};
pub use predicate::{And, Filter, In, Ins, IsNull, Once, Or};
pub(crate) use predicate::write_group;

use std::fmt;
use std::sync::Arc;

use crate::error::SqlResult;
use crate::value::Value;
use crate::writer::SqlWriter;

/// Anything that can write itself into a statement.
pub trait Fragment: Send + Sync {
    fn write_to(&self, w: &mut SqlWriter) -> SqlResult<()>;

    /// Move into a shared handle, for groups and query stages.
    fn shared(self) -> SharedFragment
    where
        Self: Sized + 'static,
    {
        Arc::new(self)
    }
}

/// A fragment shared between queries.
pub type SharedFragment = Arc<dyn Fragment>;

impl<T: Fragment + ?Sized> Fragment for Arc<T> {
    fn write_to(&self, w: &mut SqlWriter) -> SqlResult<()> {
        (**self).write_to(w)
    }
}

impl<T: Fragment + ?Sized> Fragment for Box<T> {
    fn write_to(&self, w: &mut SqlWriter) -> SqlResult<()> {
        (**self).write_to(w)
    }
}

impl<T: Fragment + ?Sized> Fragment for &T {
    fn write_to(&self, w: &mut SqlWriter) -> SqlResult<()> {
        (**self).write_to(w)
    }
}

/// SQL authored with `?` placeholders and `"` quotes, rewritten for the active dialect.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub sql: String,
    pub args: Vec<Value>,
}

impl Fragment for Expr {
    fn write_to(&self, w: &mut SqlWriter) -> SqlResult<()> {
        w.write_query(&self.sql);
        w.write_args(self.args.iter().cloned());
        Ok(())
    }
}

/// SQL already in the target dialect, written verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Raw {
    pub sql: String,
    pub args: Vec<Value>,
}

impl Fragment for Raw {
    fn write_to(&self, w: &mut SqlWriter) -> SqlResult<()> {
        w.write_raw(&self.sql);
        w.write_args(self.args.iter().cloned());
        Ok(())
    }
}

/// A fragment backed by a closure.
pub struct FnFragment<F>(F);

impl<F> fmt::Debug for FnFragment<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnFragment(..)")
    }
}

impl<F> Fragment for FnFragment<F>
where
    F: Fn(&mut SqlWriter) -> SqlResult<()> + Send + Sync,
{
    fn write_to(&self, w: &mut SqlWriter) -> SqlResult<()> {
        (self.0)(w)
    }
}

/// Build an [`Expr`].
pub fn expr(sql: impl Into<String>, args: Vec<Value>) -> Expr {
    Expr {
        sql: sql.into(),
        args,
    }
}

/// Build a [`Raw`] fragment.
pub fn raw(sql: impl Into<String>, args: Vec<Value>) -> Raw {
    Raw {
        sql: sql.into(),
        args,
    }
}

/// Wrap a closure as a fragment.
pub fn from_fn<F>(f: F) -> FnFragment<F>
where
    F: Fn(&mut SqlWriter) -> SqlResult<()> + Send + Sync,
{
    FnFragment(f)
}

/// `column IN (?, ...)`; collapses to `FALSE` when there is nothing to match.
pub fn in_(column: impl Into<String>, args: Vec<Value>) -> In {
    In::new(column, args, false)
}

/// `column NOT IN (?, ...)`; collapses to `FALSE` when there is nothing to match.
pub fn not_in(column: impl Into<String>, args: Vec<Value>) -> In {
    In::new(column, args, true)
}

/// `(c1,c2) IN ((?,?),...)`.
pub fn ins<I, S>(columns: I, args: Vec<Value>) -> Ins
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Ins::new(columns.into_iter().map(Into::into).collect(), args, false)
}

/// `(c1,c2) NOT IN ((?,?),...)`.
pub fn not_ins<I, S>(columns: I, args: Vec<Value>) -> Ins
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Ins::new(columns.into_iter().map(Into::into).collect(), args, true)
}

pub fn is_null(column: impl Into<String>) -> IsNull {
    IsNull::new(column, true)
}

pub fn is_not_null(column: impl Into<String>) -> IsNull {
    IsNull::new(column, false)
}

pub fn and(parts: impl IntoIterator<Item = SharedFragment>) -> And {
    And(parts.into_iter().collect())
}

pub fn or(parts: impl IntoIterator<Item = SharedFragment>) -> Or {
    Or(parts.into_iter().collect())
}

/// Exactly one of `parts` must render.
pub fn once(parts: impl IntoIterator<Item = SharedFragment>) -> Once {
    Once(parts.into_iter().collect())
}

/// A raw predicate whose `$.` token resolves to `prefix`.
pub fn filter(prefix: impl Into<String>, sql: impl Into<String>, args: Vec<Value>) -> Filter {
    Filter {
        prefix: prefix.into(),
        sql: sql.into(),
        args,
    }
}

/// Build a `Vec<Value>` from heterogeneous arguments.
///
/// ```ignore
/// let args = sqorm::args![1_i64, "alice", true];
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::Value>::new()
    };
    ($($arg:expr),+ $(,)?) => {
        ::std::vec![$($crate::Value::from($arg)),+]
    };
}
