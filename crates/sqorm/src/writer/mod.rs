//! Statement sink with dialect-aware markers and identifier quoting.
//!
//! Every build drives one [`SqlWriter`]: SQL text goes into a growable buffer while positional
//! arguments collect alongside it. Raw fragments are authored in a fixed notation (`?`
//! placeholders, `"` quotes and the `$.` schema token) and rewritten into the active dialect in a
//! single pass.
//!
//! ```ignore
//! use sqorm::{Dialect, SqlWriter};
//!
//! let mut w = SqlWriter::new(Dialect::Postgres);
//! w.write_query(r#""id" = ? AND "name" = ?"#);
//! w.write_args([1_i64.into(), "alice".into()]);
//! assert_eq!(w.as_str(), r#""id" = $1 AND "name" = $2"#);
//! ```

mod pool;

pub use pool::BufferPool;

use std::fmt::Write as _;

use crate::value::Value;

/// Placeholder rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerStyle {
    /// Every placeholder is `?`.
    Sequential,
    /// Placeholders are `$1`, `$2`, ... from a per-statement counter.
    Numbered,
}

/// Target SQL dialect, fixed once per database handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Postgres,
    MySql,
}

impl Dialect {
    pub fn marker_style(self) -> MarkerStyle {
        match self {
            Dialect::Postgres => MarkerStyle::Numbered,
            Dialect::MySql => MarkerStyle::Sequential,
        }
    }

    pub fn quote(self) -> char {
        match self {
            Dialect::Postgres => '"',
            Dialect::MySql => '`',
        }
    }

    /// Whether slices of basic kinds are stored as native arrays rather than JSON.
    pub fn prefers_arrays(self) -> bool {
        matches!(self, Dialect::Postgres)
    }
}

/// Mutable SQL buffer plus positional arguments.
#[derive(Debug, Clone)]
pub struct SqlWriter {
    buf: String,
    args: Vec<Value>,
    counter: usize,
    style: MarkerStyle,
    quote: char,
    schema: String,
}

impl SqlWriter {
    pub fn new(dialect: Dialect) -> Self {
        Self::with_style(dialect.marker_style(), dialect.quote())
    }

    pub fn with_style(style: MarkerStyle, quote: char) -> Self {
        Self::from_buffer(String::with_capacity(256), style, quote)
    }

    /// Reuse an existing buffer; it is cleared first.
    pub fn from_buffer(mut buf: String, style: MarkerStyle, quote: char) -> Self {
        buf.clear();
        Self {
            buf,
            args: Vec::new(),
            counter: 0,
            style,
            quote,
            schema: String::new(),
        }
    }

    /// Schema substituted for the `$.` token by [`SqlWriter::write_query`].
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn marker_style(&self) -> MarkerStyle {
        self.style
    }

    pub fn quote_char(&self) -> char {
        self.quote
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Number of markers emitted so far under the numbered style.
    pub fn marker_count(&self) -> usize {
        self.counter
    }

    /// Remove the last `n` bytes written.
    ///
    /// Used to retract a trailing separator once the element count is known. A cut landing
    /// inside a multi-byte character also removes that character.
    pub fn trim_last(&mut self, n: usize) {
        let mut len = self.buf.len().saturating_sub(n);
        while !self.buf.is_char_boundary(len) {
            len -= 1;
        }
        self.buf.truncate(len);
    }

    /// Cut the buffer back to `len` bytes and drop arguments past `args_len`.
    ///
    /// Markers already counted are not reclaimed.
    pub fn rollback_to(&mut self, len: usize, args_len: usize) {
        self.buf.truncate(len);
        self.args.truncate(args_len);
    }

    pub fn write_arg(&mut self, arg: impl Into<Value>) {
        self.args.push(arg.into());
    }

    pub fn write_args(&mut self, args: impl IntoIterator<Item = Value>) {
        self.args.extend(args);
    }

    pub fn write_marker(&mut self) {
        match self.style {
            MarkerStyle::Sequential => self.buf.push('?'),
            MarkerStyle::Numbered => self.push_numbered(),
        }
    }

    /// Write `n` comma-separated markers.
    pub fn write_markers(&mut self, n: usize) {
        for i in 0..n {
            if i > 0 {
                self.buf.push(',');
            }
            self.write_marker();
        }
    }

    /// Write a raw fragment, rewriting quotes, placeholders and the `$.` token.
    pub fn write_query(&mut self, query: &str) {
        let schema = std::mem::take(&mut self.schema);
        self.append_and_replace(query, &schema);
        self.schema = schema;
    }

    /// Like [`SqlWriter::write_query`], with `prefix` substituted for the `$.` token.
    pub fn write_query_with_prefix(&mut self, prefix: &str, query: &str) {
        self.append_and_replace(query, prefix);
    }

    /// Write a quoted identifier.
    pub fn write_name(&mut self, name: &str) {
        self.buf.push(self.quote);
        self.buf.push_str(name);
        self.buf.push(self.quote);
    }

    /// Write `prefix.` (verbatim) followed by a quoted identifier.
    pub fn write_prefixed_name(&mut self, prefix: &str, name: &str) {
        if !prefix.is_empty() {
            self.buf.push_str(prefix);
            self.buf.push('.');
        }
        self.write_name(name);
    }

    /// Quote `name` if it is a plain identifier, otherwise treat it as a raw fragment.
    pub fn write_query_name(&mut self, name: &str) {
        if is_simple_name(name) {
            self.write_name(name);
        } else {
            self.write_query(name);
        }
    }

    pub fn write_byte(&mut self, b: u8) {
        self.buf.push(char::from(b));
    }

    /// Write text verbatim, without any rewriting.
    pub fn write_raw(&mut self, sql: &str) {
        self.buf.push_str(sql);
    }

    /// Take the finished statement and its arguments.
    pub fn finish(self) -> (String, Vec<Value>) {
        (self.buf, self.args)
    }

    fn push_numbered(&mut self) {
        self.counter += 1;
        self.buf.push('$');
        let _ = write!(self.buf, "{}", self.counter);
    }

    fn append_and_replace(&mut self, query: &str, schema: &str) {
        let bytes = query.as_bytes();
        let mut last = 0u8;
        let mut idx = 0;
        for (i, &ch) in bytes.iter().enumerate() {
            match ch {
                b'"' if self.quote != '"' => {
                    self.buf.push_str(&query[idx..i]);
                    self.buf.push(self.quote);
                    idx = i + 1;
                }
                b'?' if self.style == MarkerStyle::Numbered => {
                    self.buf.push_str(&query[idx..i]);
                    self.push_numbered();
                    idx = i + 1;
                }
                b'.' if last == b'$' => {
                    self.buf.push_str(&query[idx..i - 1]);
                    if !schema.is_empty() {
                        self.buf.push_str(schema);
                        self.buf.push('.');
                    }
                    idx = i + 1;
                }
                _ => {}
            }
            last = ch;
        }
        if idx < bytes.len() {
            self.buf.push_str(&query[idx..]);
        }
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_simple_name(s: &str) -> bool {
    let mut chars = s.bytes();
    match chars.next() {
        Some(c) if c == b'_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == b'_' || c.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests;
