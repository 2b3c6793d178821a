//! Entity mapping: how a Rust struct exposes its columns and reads a decoded row back.
//!
//! A [`Model`] pairs a [`TableDef`] with two conversions: [`Model::fields`] lists the host values
//! in column order, and [`Model::read`] rebuilds the struct from a [`FieldReader`] walking the
//! same order. Secondary collections are filled by [`Preloader`]s.
//!
//! ```ignore
//! use std::sync::OnceLock;
//! use sqorm::{ColumnPolicy, FieldReader, FieldValue, Model, SqlResult, TableDef};
//!
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Model for User {
//!     fn table() -> SqlResult<&'static TableDef> {
//!         static DEF: OnceLock<TableDef> = OnceLock::new();
//!         TableDef::cached(&DEF, || {
//!             TableDef::builder("user")
//!                 .column::<i64>(ColumnPolicy::new("id"))
//!                 .column::<String>(ColumnPolicy::new("name"))
//!                 .build()
//!         })
//!     }
//!
//!     fn fields(&self) -> Vec<FieldValue> {
//!         vec![self.id.into(), self.name.clone().into()]
//!     }
//!
//!     fn read(r: &mut FieldReader<'_>) -> SqlResult<Self> {
//!         Ok(Self { id: r.next()?, name: r.next()? })
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;

use crate::client::Record;
use crate::error::{SqlError, SqlResult};
use crate::table::TableDef;
use crate::value::{FieldValue, FromField, Value};

/// A struct mapped onto one table (or join).
pub trait Model: Sized + Send + Sync + 'static {
    /// The column layout, built once.
    fn table() -> SqlResult<&'static TableDef>;

    /// Host values in column order.
    fn fields(&self) -> Vec<FieldValue>;

    /// Rebuild from decoded values in column order.
    fn read(r: &mut FieldReader<'_>) -> SqlResult<Self>;

    /// Loader for the child table `table`, if the model preloads it.
    fn preload(table: &str) -> Option<Preloader<Self>> {
        let _ = table;
        None
    }
}

/// Sequential access to the decoded values of one row.
pub struct FieldReader<'a> {
    def: &'a TableDef,
    values: std::vec::IntoIter<FieldValue>,
    index: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(def: &'a TableDef, values: Vec<FieldValue>) -> Self {
        Self {
            def,
            values: values.into_iter(),
            index: 0,
        }
    }

    /// Name of the column the next read consumes.
    pub fn column(&self) -> &str {
        self.def
            .columns()
            .get(self.index)
            .map_or("", |codec| codec.name())
    }

    fn take(&mut self) -> SqlResult<(String, FieldValue)> {
        let column = self.column().to_string();
        let value = self.values.next().ok_or_else(|| {
            SqlError::decode(
                self.def.name(),
                format!("row has no column at position {}", self.index),
            )
        })?;
        self.index += 1;
        Ok((column, value))
    }

    /// Read the next column as `T`.
    pub fn next<T: FromField>(&mut self) -> SqlResult<T> {
        let (column, value) = self.take()?;
        T::from_field(&column, value)
    }

    /// Read the next column as a JSON-encoded `T`; empty columns give `T::default()`.
    pub fn json<T: DeserializeOwned + Default>(&mut self) -> SqlResult<T> {
        let (column, value) = self.take()?;
        value.decode_json(&column)
    }

    /// Read the next column without conversion.
    pub fn raw(&mut self) -> SqlResult<FieldValue> {
        self.take().map(|(_, value)| value)
    }

    /// Skip columns the model does not keep.
    pub fn skip(&mut self, n: usize) -> SqlResult<()> {
        for _ in 0..n {
            self.take()?;
        }
        Ok(())
    }
}

/// Decode one result row into `M`.
pub fn decode_row<M: Model>(record: Record) -> SqlResult<M> {
    let def = M::table()?;
    let fields = def.decode(record.into_values())?;
    M::read(&mut FieldReader::new(def, fields))
}

/// Key of a parent row when matching preloaded children.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum IdKey {
    Int(i64),
    Text(String),
}

impl IdKey {
    fn from_value(value: &Value) -> SqlResult<IdKey> {
        match value {
            Value::Int(v) => Ok(IdKey::Int(*v)),
            Value::Text(v) => Ok(IdKey::Text(v.clone())),
            other => Err(SqlError::invalid_argument(format!(
                "preload key must be an integer or string, got {}",
                other.kind_name()
            ))),
        }
    }
}

impl fmt::Display for IdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdKey::Int(v) => write!(f, "{v}"),
            IdKey::Text(v) => f.write_str(v),
        }
    }
}

type Populate<M> = Box<dyn Fn(&mut [M], Vec<Record>) -> SqlResult<()> + Send + Sync>;

/// Loads a child collection for a set of parent rows.
///
/// The child table is queried with `fkey IN (<parent ids>)`; each child row is matched back to
/// its parent by the value `parent_of` returns and handed to `attach`.
pub struct Preloader<M> {
    table: fn() -> SqlResult<&'static TableDef>,
    fkey: &'static str,
    id: fn(&M) -> Value,
    populate: Populate<M>,
}

impl<M: Model> Preloader<M> {
    pub fn new<C: Model>(
        fkey: &'static str,
        id: fn(&M) -> Value,
        parent_of: fn(&C) -> Value,
        attach: fn(&mut M, C),
    ) -> Self {
        let populate: Populate<M> = Box::new(move |parents: &mut [M], records: Vec<Record>| {
            let mut index = HashMap::with_capacity(parents.len());
            for (i, parent) in parents.iter().enumerate() {
                index.entry(IdKey::from_value(&id(parent))?).or_insert(i);
            }
            for record in records {
                let child: C = decode_row(record)?;
                let key = IdKey::from_value(&parent_of(&child))?;
                let Some(&i) = index.get(&key) else {
                    return Err(SqlError::Other(format!("can not populate id {key}")));
                };
                attach(&mut parents[i], child);
            }
            Ok(())
        });
        Self {
            table: C::table,
            fkey,
            id,
            populate,
        }
    }

    /// Definition of the child table.
    pub fn table(&self) -> SqlResult<&'static TableDef> {
        (self.table)()
    }

    /// Child column holding the parent id.
    pub fn fkey(&self) -> &'static str {
        self.fkey
    }

    /// Ids of `parents`, in order.
    pub fn ids(&self, parents: &[M]) -> Vec<Value> {
        parents.iter().map(|p| (self.id)(p)).collect()
    }

    /// Attach decoded child rows to their parents.
    pub fn populate(&self, parents: &mut [M], records: Vec<Record>) -> SqlResult<()> {
        (self.populate)(parents, records)
    }
}

impl<M> fmt::Debug for Preloader<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preloader")
            .field("fkey", &self.fkey)
            .finish_non_exhaustive()
    }
}
