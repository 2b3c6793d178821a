use super::{Fragment, SharedFragment};
use crate::error::{SqlError, SqlResult};
use crate::value::Value;
use crate::writer::SqlWriter;

/// `column [NOT] IN (...)` over one column.
#[derive(Debug, Clone, PartialEq)]
pub struct In {
    column: String,
    args: Vec<Value>,
    not: bool,
}

impl In {
    /// A single array argument is spliced into its elements.
    pub fn new(column: impl Into<String>, args: Vec<Value>, not: bool) -> Self {
        Self {
            column: column.into(),
            args: splice(args),
            not,
        }
    }
}

fn splice(args: Vec<Value>) -> Vec<Value> {
    match <[Value; 1]>::try_from(args) {
        Ok([Value::Array(items)]) => items,
        Ok([single]) => vec![single],
        Err(args) => args,
    }
}

impl Fragment for In {
    fn write_to(&self, w: &mut SqlWriter) -> SqlResult<()> {
        if self.args.is_empty() {
            w.write_raw("FALSE");
            return Ok(());
        }
        w.write_query_name(&self.column);
        w.write_raw(if self.not { " NOT IN (" } else { " IN (" });
        w.write_markers(self.args.len());
        w.write_byte(b')');
        w.write_args(self.args.iter().cloned());
        Ok(())
    }
}

/// `(c1,c2,...) [NOT] IN ((?,?),...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Ins {
    columns: Vec<String>,
    args: Vec<Value>,
    not: bool,
}

impl Ins {
    /// Values are row-major; a single array argument is spliced first.
    pub fn new(columns: Vec<String>, args: Vec<Value>, not: bool) -> Self {
        Self {
            columns,
            args: splice(args),
            not,
        }
    }
}

impl Fragment for Ins {
    fn write_to(&self, w: &mut SqlWriter) -> SqlResult<()> {
        if self.columns.is_empty() || self.args.len() % self.columns.len() != 0 {
            return Err(SqlError::ArityMismatch {
                columns: self.columns.len(),
                values: self.args.len(),
            });
        }
        if self.args.is_empty() {
            w.write_raw("FALSE");
            return Ok(());
        }

        w.write_byte(b'(');
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                w.write_byte(b',');
            }
            w.write_query_name(column);
        }
        w.write_raw(if self.not { ") NOT IN (" } else { ") IN (" });
        for i in 0..self.args.len() / self.columns.len() {
            if i > 0 {
                w.write_byte(b',');
            }
            w.write_byte(b'(');
            w.write_markers(self.columns.len());
            w.write_byte(b')');
        }
        w.write_byte(b')');
        w.write_args(self.args.iter().cloned());
        Ok(())
    }
}

/// `column IS [NOT] NULL`.
#[derive(Debug, Clone, PartialEq)]
pub struct IsNull {
    column: String,
    null: bool,
}

impl IsNull {
    pub fn new(column: impl Into<String>, null: bool) -> Self {
        Self {
            column: column.into(),
            null,
        }
    }
}

impl Fragment for IsNull {
    fn write_to(&self, w: &mut SqlWriter) -> SqlResult<()> {
        w.write_query_name(&self.column);
        w.write_raw(if self.null { " IS NULL" } else { " IS NOT NULL" });
        Ok(())
    }
}

/// Children joined with `) AND (`.
#[derive(Clone, Default)]
pub struct And(pub Vec<SharedFragment>);

/// Children joined with `) OR (`.
#[derive(Clone, Default)]
pub struct Or(pub Vec<SharedFragment>);

impl Fragment for And {
    fn write_to(&self, w: &mut SqlWriter) -> SqlResult<()> {
        write_group(w, &self.0, ") AND (")
    }
}

impl Fragment for Or {
    fn write_to(&self, w: &mut SqlWriter) -> SqlResult<()> {
        write_group(w, &self.0, ") OR (")
    }
}

/// Parenthesized join that skips children rendering nothing; no children renders nothing.
pub(crate) fn write_group(w: &mut SqlWriter, parts: &[SharedFragment], sep: &str) -> SqlResult<()> {
    let mut written = 0;
    for part in parts {
        let opener = if written == 0 { "(" } else { sep };
        w.write_raw(opener);
        let body = w.len();
        part.write_to(w)?;
        if w.len() == body {
            w.trim_last(opener.len());
        } else {
            written += 1;
        }
    }
    if written > 0 {
        w.write_byte(b')');
    }
    Ok(())
}

/// Exactly one child must render non-empty SQL.
#[derive(Clone, Default)]
pub struct Once(pub Vec<SharedFragment>);

impl Fragment for Once {
    fn write_to(&self, w: &mut SqlWriter) -> SqlResult<()> {
        let mut count = 0;
        for part in &self.0 {
            let before = w.len();
            part.write_to(w)?;
            if w.len() != before {
                count += 1;
            }
        }
        if count != 1 {
            return Err(SqlError::Arity(count));
        }
        Ok(())
    }
}

/// A raw predicate with its schema token bound to a prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub prefix: String,
    pub sql: String,
    pub args: Vec<Value>,
}

impl Fragment for Filter {
    fn write_to(&self, w: &mut SqlWriter) -> SqlResult<()> {
        w.write_query_with_prefix(&self.prefix, &self.sql);
        w.write_args(self.args.iter().cloned());
        Ok(())
    }
}
