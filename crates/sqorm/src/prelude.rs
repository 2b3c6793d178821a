//! Convenient imports for typical `sqorm` usage.
//!
//! ```ignore
//! use sqorm::prelude::*;
//! ```

pub use crate::{
    ColumnFilter, ColumnPolicy, Database, DatabaseConfig, Dialect, Executor, FieldReader,
    FieldValue, Fragment, Model, Preloader, Query, SqlError, SqlResult, TableDef, Tx, Value, args,
};

#[cfg(feature = "pool")]
pub use crate::{PoolOptions, connect};
