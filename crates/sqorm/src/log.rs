//! Statement log entries and sinks.
//!
//! Every executed statement, every transaction flush and every failed build produces one
//! [`LogEntry`] handed to the configured [`Logger`]. With the `tracing` feature,
//! [`TracingLogger`] emits them under the `sqorm.sql` target.

use std::fmt;
use std::ops::BitOr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::value::Value;

/// Statement kind plus modifier bits.
///
/// The low nibble holds the kind (`EXEC`, `QUERY`, ...); `TX` and `BUILD` are modifiers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LogFlags(u32);

impl LogFlags {
    pub const EXEC: LogFlags = LogFlags(1);
    pub const QUERY: LogFlags = LogFlags(2);
    pub const QUERY_ROW: LogFlags = LogFlags(3);
    pub const COMMIT: LogFlags = LogFlags(5);
    pub const ROLLBACK: LogFlags = LogFlags(6);
    pub const TX: LogFlags = LogFlags(1 << 4);
    pub const BUILD: LogFlags = LogFlags(1 << 8);

    const KIND_MASK: u32 = 0x0f;

    pub fn bits(self) -> u32 {
        self.0
    }

    /// The statement kind with modifiers stripped.
    pub fn kind(self) -> LogFlags {
        LogFlags(self.0 & Self::KIND_MASK)
    }

    pub fn contains(self, other: LogFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_tx(self) -> bool {
        self.contains(Self::TX)
    }

    pub fn is_build(self) -> bool {
        self.contains(Self::BUILD)
    }

    fn kind_name(self) -> &'static str {
        match self.kind().0 {
            1 => "exec",
            2 => "query",
            3 => "query_row",
            5 => "commit",
            6 => "rollback",
            _ if self.is_build() => "build",
            _ => "-",
        }
    }
}

impl BitOr for LogFlags {
    type Output = LogFlags;

    fn bitor(self, rhs: LogFlags) -> LogFlags {
        LogFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for LogFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind_name())?;
        if self.is_tx() {
            f.write_str("|tx")?;
        }
        if self.is_build() && self.kind().0 != 0 {
            f.write_str("|build")?;
        }
        Ok(())
    }
}

/// One logged statement or transaction flush.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub query: String,
    pub args: Vec<Value>,
    /// The error returned to the caller, after mapping.
    pub error: Option<String>,
    /// The driver error before the error mapper rewrote it.
    pub orig_error: Option<String>,
    pub time: DateTime<Utc>,
    pub duration: Duration,
    pub flags: LogFlags,
    pub tag: Option<String>,
    /// Statements of the transaction, on commit and rollback entries.
    pub tx_queries: Vec<LogEntry>,
}

impl LogEntry {
    pub fn new(flags: LogFlags) -> Self {
        Self {
            query: String::new(),
            args: Vec::new(),
            error: None,
            orig_error: None,
            time: Utc::now(),
            duration: Duration::ZERO,
            flags,
            tag: None,
            tx_queries: Vec::new(),
        }
    }

    pub fn statement(flags: LogFlags, query: impl Into<String>, args: &[Value]) -> Self {
        Self {
            query: query.into(),
            args: args.to_vec(),
            ..Self::new(flags)
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Receiver of log entries.
pub trait Logger: Send + Sync {
    fn log(&self, entry: &LogEntry);
}

impl<F> Logger for F
where
    F: Fn(&LogEntry) + Send + Sync,
{
    fn log(&self, entry: &LogEntry) {
        self(entry)
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _entry: &LogEntry) {}
}

/// A logger that can be replaced while the database handle is shared.
#[derive(Clone)]
pub struct DynamicLogger {
    inner: Arc<RwLock<Arc<dyn Logger>>>,
}

impl DynamicLogger {
    pub fn new(logger: impl Logger + 'static) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(logger))),
        }
    }

    /// Route every following entry to `logger`.
    pub fn set(&self, logger: impl Logger + 'static) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(logger);
    }

    fn current(&self) -> Arc<dyn Logger> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for DynamicLogger {
    fn default() -> Self {
        Self::new(NoopLogger)
    }
}

impl Logger for DynamicLogger {
    fn log(&self, entry: &LogEntry) {
        self.current().log(entry);
    }
}

impl fmt::Debug for DynamicLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicLogger").finish_non_exhaustive()
    }
}

/// Truncate to at most `max_bytes` on a char boundary.
#[cfg_attr(not(feature = "tracing"), allow(dead_code))]
pub(crate) fn truncate_sql(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

#[cfg(feature = "tracing")]
pub use tracing_logger::TracingLogger;

#[cfg(feature = "tracing")]
mod tracing_logger {
    use super::{LogEntry, Logger, truncate_sql};
    use tracing::Level;

    /// Emits entries as `tracing` events under the `sqorm.sql` target.
    ///
    /// Successful statements use `level`; failed ones use `error_level`.
    #[derive(Debug, Clone)]
    pub struct TracingLogger {
        pub level: Level,
        pub error_level: Level,
        /// Truncate long SQL strings (in bytes). `None` means no truncation.
        pub max_sql_length: Option<usize>,
    }

    impl Default for TracingLogger {
        fn default() -> Self {
            Self {
                level: Level::DEBUG,
                error_level: Level::WARN,
                max_sql_length: Some(200),
            }
        }
    }

    impl TracingLogger {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn level(mut self, level: Level) -> Self {
            self.level = level;
            self
        }

        pub fn error_level(mut self, level: Level) -> Self {
            self.error_level = level;
            self
        }

        pub fn max_sql_length(mut self, len: usize) -> Self {
            self.max_sql_length = Some(len);
            self
        }

        pub fn no_truncate(mut self) -> Self {
            self.max_sql_length = None;
            self
        }

        fn sql<'a>(&self, sql: &'a str) -> std::borrow::Cow<'a, str> {
            match self.max_sql_length {
                Some(max) if sql.len() > max => format!("{}...", truncate_sql(sql, max)).into(),
                _ => sql.into(),
            }
        }
    }

    impl Logger for TracingLogger {
        fn log(&self, entry: &LogEntry) {
            macro_rules! emit_at_level {
                ($level:expr, $($field:tt)*) => {
                    match $level {
                        Level::ERROR => tracing::error!($($field)*),
                        Level::WARN  => tracing::warn!($($field)*),
                        Level::INFO  => tracing::info!($($field)*),
                        Level::DEBUG => tracing::debug!($($field)*),
                        Level::TRACE => tracing::trace!($($field)*),
                    }
                };
            }

            let tag = entry.tag.as_deref().unwrap_or("-");
            let sql = self.sql(&entry.query);
            let duration_ms = entry.duration.as_secs_f64() * 1000.0;
            match &entry.error {
                Some(error) => emit_at_level!(
                    self.error_level,
                    target: "sqorm.sql",
                    flags = ?entry.flags,
                    tag,
                    param_count = entry.args.len(),
                    duration_ms,
                    tx_queries = entry.tx_queries.len(),
                    sql = %sql,
                    error = %error,
                ),
                None => emit_at_level!(
                    self.level,
                    target: "sqorm.sql",
                    flags = ?entry.flags,
                    tag,
                    param_count = entry.args.len(),
                    duration_ms,
                    tx_queries = entry.tx_queries.len(),
                    sql = %sql,
                ),
            }
        }
    }
}
