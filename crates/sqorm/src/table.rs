//! Table definitions: the ordered column codecs of one entity.
//!
//! A [`TableDef`] is built once per entity (usually behind a `OnceLock`) from `(ColumnPolicy,
//! TypeDesc)` pairs. It writes the entity-specific statement bodies: the select list, the insert
//! values, and partial or full updates.

use std::sync::OnceLock;

use crate::codec::{Codec, ColumnPolicy, EncodeContext};
use crate::error::{SqlError, SqlResult};
use crate::shape::{Describe, TypeDesc, TypeRegistry};
use crate::value::{FieldValue, Value};
use crate::writer::SqlWriter;

/// Join operator between two tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    #[default]
    Join,
    Full,
    Left,
    Right,
    Natural,
    Cross,
    SelfJoin,
}

impl JoinKind {
    pub fn keyword(self) -> &'static str {
        match self {
            JoinKind::Join | JoinKind::SelfJoin => "JOIN",
            JoinKind::Full => "FULL OUTER JOIN",
            JoinKind::Left => "LEFT OUTER JOIN",
            JoinKind::Right => "RIGHT OUTER JOIN",
            JoinKind::Natural => "NATURAL JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

#[derive(Debug, Clone)]
struct JoinPart {
    table: String,
    alias: String,
    kind: JoinKind,
    on: String,
    columns: usize,
}

/// The FROM clause of a join-backed entity.
#[derive(Debug, Clone)]
pub struct JoinDef {
    alias: String,
    columns: usize,
    parts: Vec<JoinPart>,
}

impl JoinDef {
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct TableDef {
    name: String,
    columns: Vec<Codec>,
    preloads: Vec<String>,
    join: Option<JoinDef>,
}

impl TableDef {
    pub fn builder(name: impl Into<String>) -> TableDefBuilder {
        TableDefBuilder {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Start a join-backed definition over `base`, aliased as `alias`.
    pub fn join(base: &TableDef, alias: impl Into<String>) -> JoinBuilder {
        JoinBuilder {
            def: TableDef {
                name: base.name.clone(),
                columns: base.columns.clone(),
                preloads: Vec::new(),
                join: Some(JoinDef {
                    alias: alias.into(),
                    columns: base.columns.len(),
                    parts: Vec::new(),
                }),
            },
        }
    }

    /// Build once into `cell` and hand out the shared definition.
    ///
    /// A failed build leaves the cell empty, so the error is reported again on the next call.
    pub fn cached(
        cell: &'static OnceLock<TableDef>,
        init: impl FnOnce() -> SqlResult<TableDef>,
    ) -> SqlResult<&'static TableDef> {
        if let Some(def) = cell.get() {
            return Ok(def);
        }
        let def = init()?;
        Ok(cell.get_or_init(|| def))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Codec] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Codec> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(Codec::name)
    }

    /// Fields declared as preload targets; they are not part of the row.
    pub fn preloads(&self) -> &[String] {
        &self.preloads
    }

    pub fn join_def(&self) -> Option<&JoinDef> {
        self.join.as_ref()
    }

    /// `SELECT "c1","c2" FROM "t"`, or the aliased column list and join clause.
    pub fn write_select(&self, w: &mut SqlWriter) {
        w.write_raw("SELECT ");
        match &self.join {
            None => {
                self.write_column_list(w);
                w.write_raw(" FROM ");
                w.write_name(&self.name);
            }
            Some(join) => {
                let mut start = 0;
                let mut write_part = |w: &mut SqlWriter, alias: &str, count: usize| {
                    for (i, col) in self.columns[start..start + count].iter().enumerate() {
                        if i > 0 {
                            w.write_byte(b',');
                        }
                        w.write_prefixed_name(alias, col.name());
                    }
                    start += count;
                };
                write_part(w, &join.alias, join.columns);
                for part in &join.parts {
                    w.write_byte(b',');
                    write_part(w, &part.alias, part.columns);
                }
                w.write_byte(b' ');
                self.write_join_from(w);
            }
        }
    }

    /// `FROM "t1" AS a <KIND> "t2" AS b ON <cond> ...`; writes nothing for plain tables.
    pub fn write_join_from(&self, w: &mut SqlWriter) {
        let Some(join) = &self.join else {
            return;
        };
        w.write_raw("FROM ");
        w.write_name(&self.name);
        w.write_raw(" AS ");
        w.write_raw(&join.alias);
        for part in &join.parts {
            w.write_byte(b' ');
            w.write_raw(part.kind.keyword());
            w.write_byte(b' ');
            w.write_name(&part.table);
            w.write_raw(" AS ");
            w.write_raw(&part.alias);
            if !part.on.is_empty() {
                w.write_raw(" ON ");
                w.write_query(&part.on);
            }
        }
    }

    /// `INSERT INTO "t" ("c1",...) VALUES (?,...),(?,...)`.
    pub fn write_insert(
        &self,
        w: &mut SqlWriter,
        rows: &[Vec<FieldValue>],
        ctx: &EncodeContext,
    ) -> SqlResult<()> {
        self.assert_writable()?;
        if rows.is_empty() {
            return Err(SqlError::invalid_argument("nothing to insert"));
        }
        w.write_raw("INSERT INTO ");
        w.write_name(&self.name);
        w.write_raw(" (");
        self.write_column_list(w);
        w.write_raw(") VALUES (");
        for fields in rows {
            let args = self.encode_row(fields, |codec, v| codec.insert_arg(v, ctx))?;
            w.write_markers(self.columns.len());
            w.write_args(args);
            w.write_raw("),(");
        }
        w.trim_last(2);
        Ok(())
    }

    /// `UPDATE "t" SET "c1"=?,"c2"=?` over the dirty columns only.
    pub fn write_update(
        &self,
        w: &mut SqlWriter,
        fields: &[FieldValue],
        ctx: &EncodeContext,
    ) -> SqlResult<()> {
        self.assert_writable()?;
        self.check_arity(fields)?;
        w.write_raw("UPDATE ");
        w.write_name(&self.name);
        w.write_raw(" SET ");
        let mut dirty = false;
        for (codec, value) in self.columns.iter().zip(fields) {
            if !codec.is_dirty(value) {
                continue;
            }
            dirty = true;
            w.write_name(codec.name());
            w.write_byte(b'=');
            w.write_marker();
            w.write_byte(b',');
            w.write_arg(codec.update_arg(value, ctx)?);
        }
        if !dirty {
            return Err(SqlError::NoColumnsToUpdate);
        }
        w.trim_last(1);
        Ok(())
    }

    /// `UPDATE "t" SET ("c1",...) = (?,...)` over every column.
    pub fn write_update_all(
        &self,
        w: &mut SqlWriter,
        fields: &[FieldValue],
        ctx: &EncodeContext,
    ) -> SqlResult<()> {
        self.assert_writable()?;
        let args = self.encode_row(fields, |codec, v| codec.update_arg(v, ctx))?;
        w.write_raw("UPDATE ");
        w.write_name(&self.name);
        w.write_raw(" SET (");
        self.write_column_list(w);
        w.write_raw(") = (");
        w.write_markers(self.columns.len());
        w.write_byte(b')');
        w.write_args(args);
        Ok(())
    }

    /// Decode one result row into host values, column by column.
    pub fn decode(&self, values: Vec<Value>) -> SqlResult<Vec<FieldValue>> {
        if values.len() != self.columns.len() {
            return Err(SqlError::decode(
                &self.name,
                format!(
                    "expected {} columns, got {}",
                    self.columns.len(),
                    values.len()
                ),
            ));
        }
        self.columns
            .iter()
            .zip(values)
            .map(|(codec, value)| codec.scan(value))
            .collect()
    }

    fn write_column_list(&self, w: &mut SqlWriter) {
        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                w.write_byte(b',');
            }
            w.write_name(col.name());
        }
    }

    fn encode_row(
        &self,
        fields: &[FieldValue],
        encode: impl Fn(&Codec, &FieldValue) -> SqlResult<Value>,
    ) -> SqlResult<Vec<Value>> {
        self.check_arity(fields)?;
        self.columns
            .iter()
            .zip(fields)
            .map(|(codec, value)| encode(codec, value))
            .collect()
    }

    fn check_arity(&self, fields: &[FieldValue]) -> SqlResult<()> {
        if fields.len() != self.columns.len() {
            return Err(SqlError::ArityMismatch {
                columns: self.columns.len(),
                values: fields.len(),
            });
        }
        Ok(())
    }

    fn assert_writable(&self) -> SqlResult<()> {
        if self.join.is_some() {
            return Err(SqlError::invalid_argument(format!(
                "join on {} is read-only",
                self.name
            )));
        }
        Ok(())
    }
}

pub struct TableDefBuilder {
    name: String,
    columns: Vec<(ColumnPolicy, TypeDesc)>,
}

impl TableDefBuilder {
    /// Add a column whose Rust type describes itself.
    pub fn column<T: Describe>(self, policy: ColumnPolicy) -> Self {
        self.column_desc(policy, T::describe())
    }

    pub fn column_desc(mut self, policy: ColumnPolicy, desc: TypeDesc) -> Self {
        self.columns.push((policy, desc));
        self
    }

    /// Classify and derive codecs with a private registry.
    pub fn build(self) -> SqlResult<TableDef> {
        self.build_with(&TypeRegistry::new())
    }

    /// Classify and derive codecs, sharing `registry` with other definitions.
    pub fn build_with(self, registry: &TypeRegistry) -> SqlResult<TableDef> {
        let mut columns = Vec::with_capacity(self.columns.len());
        let mut preloads = Vec::new();
        for (policy, desc) in self.columns {
            if policy.preload {
                preloads.push(policy.name);
                continue;
            }
            let shape = registry.classify(&desc)?;
            columns.push(Codec::derive(policy, shape)?);
        }
        Ok(TableDef {
            name: self.name,
            columns,
            preloads,
            join: None,
        })
    }
}

pub struct JoinBuilder {
    def: TableDef,
}

impl JoinBuilder {
    /// Join `other` as `alias` with the given operator and `ON` condition.
    pub fn with(
        mut self,
        kind: JoinKind,
        other: &TableDef,
        alias: impl Into<String>,
        on: impl Into<String>,
    ) -> Self {
        self.def.columns.extend(other.columns.iter().cloned());
        if let Some(join) = self.def.join.as_mut() {
            join.parts.push(JoinPart {
                table: other.name.clone(),
                alias: alias.into(),
                kind,
                on: on.into(),
                columns: other.columns.len(),
            });
        }
        self
    }

    pub fn build(self) -> SqlResult<TableDef> {
        match &self.def.join {
            Some(join) if join.parts.is_empty() => Err(SqlError::invalid_argument(format!(
                "join on {} has no joined table",
                self.def.name
            ))),
            _ => Ok(self.def),
        }
    }
}
