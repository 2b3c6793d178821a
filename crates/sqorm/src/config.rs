//! Database handle configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::SqlError;
use crate::log::{LogEntry, Logger, NoopLogger};
use crate::writer::{BufferPool, Dialect, SqlWriter};

/// Rewrites an error before it is logged and returned.
///
/// Receives the error and the entry it is about to be logged with.
pub type ErrorMapper = Arc<dyn Fn(SqlError, &LogEntry) -> SqlError + Send + Sync>;

/// Configuration shared by a [`Database`](crate::Database) and every query built from it.
#[derive(Clone)]
pub struct DatabaseConfig {
    /// Marker style and identifier quoting.
    pub dialect: Dialect,
    /// Replacement for the `$.` token in raw fragments (empty = no prefix).
    pub schema: String,
    /// Default deadline for statements without an explicit one.
    pub query_timeout: Option<Duration>,
    /// Store slices of basic kinds as native arrays. `None` follows the dialect.
    pub array_encoding: Option<bool>,
    pub logger: Arc<dyn Logger>,
    pub error_mapper: Option<ErrorMapper>,
    /// Reuse statement buffers across builds.
    pub buffer_pool: Option<Arc<BufferPool>>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            schema: String::new(),
            query_timeout: None,
            array_encoding: None,
            logger: default_logger(),
            error_mapper: None,
            buffer_pool: None,
        }
    }
}

#[cfg(feature = "tracing")]
fn default_logger() -> Arc<dyn Logger> {
    Arc::new(crate::log::TracingLogger::default())
}

#[cfg(not(feature = "tracing"))]
fn default_logger() -> Arc<dyn Logger> {
    Arc::new(NoopLogger)
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("dialect", &self.dialect)
            .field("schema", &self.schema)
            .field("query_timeout", &self.query_timeout)
            .field("array_encoding", &self.array_encoding)
            .field("error_mapper", &self.error_mapper.is_some())
            .field("buffer_pool", &self.buffer_pool.is_some())
            .finish_non_exhaustive()
    }
}

impl DatabaseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    pub fn array_encoding(mut self, enabled: bool) -> Self {
        self.array_encoding = Some(enabled);
        self
    }

    pub fn logger(mut self, logger: impl Logger + 'static) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    /// Disable statement logging.
    pub fn no_logging(self) -> Self {
        self.logger(NoopLogger)
    }

    pub fn error_mapper<F>(mut self, mapper: F) -> Self
    where
        F: Fn(SqlError, &LogEntry) -> SqlError + Send + Sync + 'static,
    {
        self.error_mapper = Some(Arc::new(mapper));
        self
    }

    pub fn with_buffer_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.buffer_pool = Some(pool);
        self
    }

    /// Whether basic-kind slices encode as native arrays.
    pub fn arrays(&self) -> bool {
        self.array_encoding
            .unwrap_or_else(|| self.dialect.prefers_arrays())
    }

    /// A fresh writer for one statement.
    pub fn writer(&self) -> SqlWriter {
        let w = match &self.buffer_pool {
            Some(pool) => pool.writer(self.dialect),
            None => SqlWriter::new(self.dialect),
        };
        if self.schema.is_empty() {
            w
        } else {
            w.schema(self.schema.clone())
        }
    }

    /// Return a finished statement buffer to the pool, if any.
    pub fn recycle(&self, sql: String) {
        if let Some(pool) = &self.buffer_pool {
            pool.put(sql);
        }
    }
}
