//! # sqorm
//!
//! Runtime half of a struct-to-SQL mapper for Postgres (and `?`-marker dialects).
//!
//! ## Features
//!
//! - **Shape classification**: every column type is reduced once to a [`Shape`]; unsupported
//!   shapes fail when the table definition is built, never per row
//! - **Column codecs**: insert/update arguments, dirty tests and scans derived per column
//! - **Composable fragments**: `IN` splicing, optional filters, `AND`/`OR` groups, `$.` schema
//!   tokens, all renumbered into one statement
//! - **Staged queries**: prefixes, select list, body, `WHERE`, `GROUP BY`, `ORDER BY`,
//!   `LIMIT`/`OFFSET` and suffixes rendered in a fixed order
//! - **Safe defaults**: `UPDATE` and `DELETE` require `WHERE`
//! - **Statement log**: one [`LogEntry`] per statement, build failure and transaction flush
//!
//! ## Example
//!
//! ```ignore
//! use sqorm::prelude::*;
//!
//! let db = sqorm::connect(&std::env::var("DATABASE_URL")?, DatabaseConfig::new())?;
//!
//! let mut user = User::default();
//! let found = db
//!     .query()
//!     .where_("id = ?", args![42_i64])
//!     .get(&mut user)
//!     .await?;
//!
//! sqorm::transaction!(db, tx, {
//!     tx.query().insert(&user).await?;
//!     tx.query().table("audit").sql("INSERT INTO audit (note) VALUES (?)", args!["added"]).exec().await?;
//!     Ok(())
//! })?;
//! ```

pub mod fragment;

pub mod client;
pub mod codec;
pub mod config;
pub mod database;
pub mod error;
pub mod log;
pub mod model;
pub mod prelude;
pub mod query;
pub mod shape;
pub mod table;
pub mod value;
pub mod writer;

#[cfg(feature = "pool")]
pub mod pool;

pub use client::{Connection, Connector, ExecContext, Record};
pub use codec::{Codec, ColumnPolicy, EncodeContext};
pub use config::{DatabaseConfig, ErrorMapper};
pub use database::{Database, Executor, Tx};
pub use error::{SqlError, SqlResult};
pub use fragment::{ColumnFilter, Fragment, SharedFragment};
pub use log::{DynamicLogger, LogEntry, LogFlags, Logger, NoopLogger};
pub use model::{FieldReader, Model, Preloader, decode_row};
pub use query::Query;
pub use shape::{Describe, Shape, TypeDesc, TypeRegistry};
pub use table::{JoinKind, TableDef};
pub use value::{FieldValue, FromField, Value, ZERO_TIME};
pub use writer::{BufferPool, Dialect, MarkerStyle, SqlWriter};

#[cfg(feature = "tracing")]
pub use log::TracingLogger;

#[cfg(feature = "pool")]
pub use pool::{PoolOptions, connect, connect_with_tls, create_pool, create_pool_with_tls};
