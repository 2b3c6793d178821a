//! Column codecs.
//!
//! A [`Codec`] is derived once per column from its [`Shape`] and [`ColumnPolicy`]. It owns the
//! four row-path behaviors: the insert argument, the scan (decode) step, the dirty test used by
//! partial updates, and the update argument. Nothing on the row path inspects types again.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{SqlError, SqlResult};
use crate::shape::{ElementKind, Shape};
use crate::value::{FieldValue, Value, ZERO_TIME, field_to_json};

/// Per-column policy flags, supplied by the declaration layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnPolicy {
    pub name: String,
    pub create_timestamp: bool,
    pub update_timestamp: bool,
    pub json: bool,
    pub array: bool,
    pub inline: bool,
    pub preload: bool,
    /// Overrides the per-kind rule deciding whether a bare zero is stored as NULL.
    pub zero_is_null: Option<bool>,
}

impl ColumnPolicy {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set to the statement time on insert when absent.
    pub fn created(mut self) -> Self {
        self.create_timestamp = true;
        self
    }

    /// Set to the statement time on every update.
    pub fn updated(mut self) -> Self {
        self.update_timestamp = true;
        self
    }

    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn array(mut self) -> Self {
        self.array = true;
        self
    }

    pub fn inline(mut self) -> Self {
        self.inline = true;
        self
    }

    pub fn preload(mut self) -> Self {
        self.preload = true;
        self
    }

    pub fn zero_is_null(mut self, zero_is_null: bool) -> Self {
        self.zero_is_null = Some(zero_is_null);
        self
    }
}

/// Inputs shared by every column of one statement.
#[derive(Debug, Clone, Copy)]
pub struct EncodeContext {
    pub now: DateTime<Utc>,
    /// Encode basic/time slices as native arrays instead of JSON.
    pub arrays: bool,
}

impl EncodeContext {
    pub fn new(now: DateTime<Utc>, arrays: bool) -> Self {
        Self { now, arrays }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stamp {
    None,
    Create,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Scalar,
    Time,
    Json,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOp {
    Insert,
    Update,
}

#[derive(Debug, Clone)]
pub struct Codec {
    name: String,
    shape: Shape,
    policy: ColumnPolicy,
    encoding: Encoding,
    stamp: Stamp,
    zero_is_null: bool,
}

impl Codec {
    /// Derive the codec for one column.
    ///
    /// Timestamp policies on columns that cannot hold a time fail here, never per row.
    pub fn derive(policy: ColumnPolicy, shape: Shape) -> SqlResult<Codec> {
        let stamp = match (policy.create_timestamp, policy.update_timestamp) {
            (false, false) => Stamp::None,
            (true, false) => Stamp::Create,
            (false, true) => Stamp::Update,
            (true, true) => {
                return Err(SqlError::PolicyMismatch {
                    column: policy.name,
                    policy: "create and update",
                });
            }
        };
        if stamp != Stamp::None && !shape.is_time() {
            return Err(SqlError::PolicyMismatch {
                column: policy.name,
                policy: if stamp == Stamp::Create { "create" } else { "update" },
            });
        }

        let encoding = if shape.is_time() {
            Encoding::Time
        } else if policy.json || shape.is_json() {
            Encoding::Json
        } else if shape.is_container() {
            Encoding::List
        } else {
            Encoding::Scalar
        };

        let zero_is_null = policy.zero_is_null.unwrap_or(match shape.element_kind {
            ElementKind::Int(kind) => kind.zero_is_null(),
            ElementKind::String => true,
            _ => false,
        });

        Ok(Codec {
            name: policy.name.clone(),
            shape,
            policy,
            encoding,
            stamp,
            zero_is_null,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn policy(&self) -> &ColumnPolicy {
        &self.policy
    }

    pub fn is_create_timestamp(&self) -> bool {
        self.stamp == Stamp::Create
    }

    pub fn is_update_timestamp(&self) -> bool {
        self.stamp == Stamp::Update
    }

    /// Argument for an INSERT.
    pub fn insert_arg(&self, value: &FieldValue, ctx: &EncodeContext) -> SqlResult<Value> {
        self.encode(value, ctx, WriteOp::Insert)
    }

    /// Argument for an UPDATE.
    pub fn update_arg(&self, value: &FieldValue, ctx: &EncodeContext) -> SqlResult<Value> {
        self.encode(value, ctx, WriteOp::Update)
    }

    /// Whether a partial UPDATE includes this column.
    pub fn is_dirty(&self, value: &FieldValue) -> bool {
        if self.stamp == Stamp::Update {
            return true;
        }
        let shape = self.shape;
        if shape.pointer {
            return !value.is_nil();
        }
        if shape.is_container() {
            return !value.is_zero();
        }
        match shape.element_kind {
            ElementKind::Struct => true,
            ElementKind::Map | ElementKind::Interface => {
                !matches!(value, FieldValue::Nil | FieldValue::Json(serde_json::Value::Null))
            }
            _ => !value.is_zero(),
        }
    }

    /// Decode a column cell; SQL NULL yields the zero value of the shape.
    pub fn scan(&self, value: Value) -> SqlResult<FieldValue> {
        if value.is_null() {
            return Ok(self.shape.zero_value());
        }
        match self.encoding {
            Encoding::Scalar => self.scan_scalar(self.shape.element_kind, value),
            Encoding::Time => self.scan_time(value).map(FieldValue::Time),
            Encoding::Json => self.scan_json(value),
            Encoding::List => self.scan_list(value),
        }
    }

    fn encode(&self, value: &FieldValue, ctx: &EncodeContext, op: WriteOp) -> SqlResult<Value> {
        match self.encoding {
            Encoding::Time => self.encode_time(value, ctx, op),
            Encoding::Scalar => match value {
                FieldValue::Nil => Ok(Value::Null),
                v if !self.shape.pointer && self.zero_is_null && v.is_zero() => Ok(Value::Null),
                v => self.scalar_value(v),
            },
            Encoding::Json => match value {
                FieldValue::Nil | FieldValue::Json(serde_json::Value::Null) => Ok(Value::Null),
                FieldValue::List(items) if items.is_empty() => Ok(Value::Null),
                v => Ok(Value::Json(field_to_json(v.clone()))),
            },
            Encoding::List => match value {
                FieldValue::Nil => Ok(Value::Null),
                FieldValue::List(items) if items.is_empty() => Ok(Value::Null),
                FieldValue::List(items) if ctx.arrays || self.policy.array => items
                    .iter()
                    .map(|item| match item {
                        FieldValue::Nil => Ok(Value::Null),
                        item => self.scalar_value(item),
                    })
                    .collect::<SqlResult<Vec<_>>>()
                    .map(Value::Array),
                FieldValue::List(_) => Ok(Value::Json(field_to_json(value.clone()))),
                other => Err(self.encode_error("list", other)),
            },
        }
    }

    fn encode_time(&self, value: &FieldValue, ctx: &EncodeContext, op: WriteOp) -> SqlResult<Value> {
        let absent = value.is_zero();
        let substitute = match self.stamp {
            Stamp::None => false,
            Stamp::Create => op == WriteOp::Insert && absent,
            Stamp::Update => op == WriteOp::Update || absent,
        };
        if substitute {
            return Ok(Value::Time(ctx.now));
        }
        match value {
            FieldValue::Nil => Ok(Value::Null),
            FieldValue::Time(t) if *t == ZERO_TIME => Ok(Value::Null),
            FieldValue::Time(t) => Ok(Value::Time(*t)),
            other => Err(self.encode_error("time", other)),
        }
    }

    fn scalar_value(&self, value: &FieldValue) -> SqlResult<Value> {
        match value {
            FieldValue::Bool(v) => Ok(Value::Bool(*v)),
            FieldValue::Int(v) => Ok(Value::Int(*v)),
            FieldValue::Uint(v) => i64::try_from(*v)
                .map(Value::Int)
                .map_err(|e| SqlError::encode(&self.name, e.to_string())),
            FieldValue::Float(v) => Ok(Value::Float(*v)),
            FieldValue::Str(v) => Ok(Value::Text(v.clone())),
            FieldValue::Time(v) => Ok(Value::Time(*v)),
            FieldValue::Json(v) => Ok(Value::Json(v.clone())),
            other => Err(self.encode_error("scalar", other)),
        }
    }

    fn encode_error(&self, expected: &str, got: &FieldValue) -> SqlError {
        SqlError::encode(&self.name, format!("expected {expected}, got {got:?}"))
    }

    fn decode_error(&self, expected: &str, got: &impl std::fmt::Debug) -> SqlError {
        SqlError::decode(&self.name, format!("expected {expected}, got {got:?}"))
    }

    fn scan_scalar(&self, kind: ElementKind, value: Value) -> SqlResult<FieldValue> {
        match (kind, value) {
            (ElementKind::Bool, Value::Bool(v)) => Ok(FieldValue::Bool(v)),
            (ElementKind::Bool, Value::Int(v)) => Ok(FieldValue::Bool(v != 0)),
            (ElementKind::Int(k), Value::Int(v)) if k.is_signed() => Ok(FieldValue::Int(v)),
            (ElementKind::Int(_), Value::Int(v)) => u64::try_from(v)
                .map(FieldValue::Uint)
                .map_err(|e| SqlError::decode(&self.name, e.to_string())),
            (ElementKind::Float, Value::Float(v)) => Ok(FieldValue::Float(v)),
            (ElementKind::Float, Value::Int(v)) => Ok(FieldValue::Float(v as f64)),
            (ElementKind::String, Value::Text(v)) => Ok(FieldValue::Str(v)),
            (ElementKind::String, Value::Bytes(v)) => String::from_utf8(v)
                .map(FieldValue::Str)
                .map_err(|e| SqlError::decode(&self.name, e.to_string())),
            (ElementKind::Time, value) => self.scan_time(value).map(FieldValue::Time),
            (kind, Value::Text(v)) => self.scan_text(kind, &v),
            (_, other) => Err(self.decode_error(kind_label(kind), &other)),
        }
    }

    /// Decode a textual cell, as found in array literals and text protocols.
    fn scan_text(&self, kind: ElementKind, text: &str) -> SqlResult<FieldValue> {
        let parse_err = |e: &dyn std::fmt::Display| SqlError::decode(&self.name, e.to_string());
        match kind {
            ElementKind::Bool => match text {
                "t" | "true" | "TRUE" | "1" => Ok(FieldValue::Bool(true)),
                "f" | "false" | "FALSE" | "0" => Ok(FieldValue::Bool(false)),
                other => Err(self.decode_error("bool", &other)),
            },
            ElementKind::Int(k) if k.is_signed() => text
                .parse::<i64>()
                .map(FieldValue::Int)
                .map_err(|e| parse_err(&e)),
            ElementKind::Int(_) => text
                .parse::<u64>()
                .map(FieldValue::Uint)
                .map_err(|e| parse_err(&e)),
            ElementKind::Float => text
                .parse::<f64>()
                .map(FieldValue::Float)
                .map_err(|e| parse_err(&e)),
            ElementKind::String => Ok(FieldValue::Str(text.to_string())),
            ElementKind::Time => parse_time(text)
                .map(FieldValue::Time)
                .map_err(|e| parse_err(&e)),
            ElementKind::Struct | ElementKind::Map | ElementKind::Interface => {
                serde_json::from_str(text)
                    .map(FieldValue::Json)
                    .map_err(|e| parse_err(&e))
            }
        }
    }

    fn scan_time(&self, value: Value) -> SqlResult<DateTime<Utc>> {
        match value {
            Value::Time(t) => Ok(t),
            Value::Text(s) => parse_time(&s).map_err(|e| SqlError::decode(&self.name, e.to_string())),
            other => Err(self.decode_error("time", &other)),
        }
    }

    fn scan_json(&self, value: Value) -> SqlResult<FieldValue> {
        let json = match value {
            Value::Json(v) => v,
            Value::Text(s) if s.is_empty() => return Ok(self.shape.zero_value()),
            Value::Text(s) => serde_json::from_str(&s)
                .map_err(|e| SqlError::decode(&self.name, e.to_string()))?,
            Value::Bytes(b) if b.is_empty() => return Ok(self.shape.zero_value()),
            Value::Bytes(b) => serde_json::from_slice(&b)
                .map_err(|e| SqlError::decode(&self.name, e.to_string()))?,
            other => return Err(self.decode_error("json", &other)),
        };
        if json.is_null() {
            return Ok(self.shape.zero_value());
        }
        if !self.shape.is_container() {
            return self.json_element(json);
        }
        match json {
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(|item| self.json_element(item))
                .collect::<SqlResult<Vec<_>>>()
                .map(FieldValue::List),
            other => Err(self.decode_error("json array", &other)),
        }
    }

    /// One JSON element converted to the element kind of this column.
    fn json_element(&self, json: serde_json::Value) -> SqlResult<FieldValue> {
        use serde_json::Value as J;

        let kind = self.shape.element_kind;
        match (kind, json) {
            (_, J::Null) if self.shape.element_pointer || self.shape.pointer => Ok(FieldValue::Nil),
            (_, J::Null) => Ok(kind.zero_value()),
            (ElementKind::Struct | ElementKind::Map | ElementKind::Interface, v) => {
                Ok(FieldValue::Json(v))
            }
            (ElementKind::Bool, J::Bool(v)) => Ok(FieldValue::Bool(v)),
            (ElementKind::Int(k), J::Number(n)) if k.is_signed() => n
                .as_i64()
                .map(FieldValue::Int)
                .ok_or_else(|| self.decode_error("integer", &n)),
            (ElementKind::Int(_), J::Number(n)) => n
                .as_u64()
                .map(FieldValue::Uint)
                .ok_or_else(|| self.decode_error("unsigned integer", &n)),
            (ElementKind::Float, J::Number(n)) => n
                .as_f64()
                .map(FieldValue::Float)
                .ok_or_else(|| self.decode_error("float", &n)),
            (ElementKind::String, J::String(s)) => Ok(FieldValue::Str(s)),
            (ElementKind::Time, J::String(s)) => DateTime::parse_from_rfc3339(&s)
                .map(|t| FieldValue::Time(t.with_timezone(&Utc)))
                .or_else(|_| parse_time(&s).map(FieldValue::Time))
                .map_err(|e| SqlError::decode(&self.name, e.to_string())),
            (_, other) => Err(self.decode_error(kind_label(kind), &other)),
        }
    }

    fn scan_list(&self, value: Value) -> SqlResult<FieldValue> {
        let kind = self.shape.element_kind;
        let null_element = || {
            if self.shape.element_pointer {
                FieldValue::Nil
            } else {
                kind.zero_value()
            }
        };
        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Null => Ok(null_element()),
                    item => self.scan_scalar(kind, item),
                })
                .collect::<SqlResult<Vec<_>>>()
                .map(FieldValue::List),
            Value::Text(s) if s.starts_with('{') => parse_array_literal(&s)
                .map_err(|e| SqlError::decode(&self.name, e))?
                .into_iter()
                .map(|item| match item {
                    None => Ok(null_element()),
                    Some(text) => self.scan_text(kind, &text),
                })
                .collect::<SqlResult<Vec<_>>>()
                .map(FieldValue::List),
            other => self.scan_json(other),
        }
    }
}

fn kind_label(kind: ElementKind) -> &'static str {
    match kind {
        ElementKind::Bool => "bool",
        ElementKind::Int(_) => "integer",
        ElementKind::Float => "float",
        ElementKind::String => "string",
        ElementKind::Time => "time",
        ElementKind::Struct => "struct",
        ElementKind::Map => "map",
        ElementKind::Interface => "json",
    }
}

const TIME_LAYOUT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Parse a timestamp as rendered inside text arrays (`2006-01-02 15:04:05.000+00`).
pub fn parse_time(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let s = s.strip_suffix("+00").unwrap_or(s);
    match NaiveDateTime::parse_from_str(s, TIME_LAYOUT) {
        Ok(t) => Ok(t.and_utc()),
        Err(err) => DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| err),
    }
}

/// Split a Postgres text array literal (`{a,"b c",NULL}`) into its elements.
pub fn parse_array_literal(s: &str) -> Result<Vec<Option<String>>, String> {
    let inner = s
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| format!("invalid array literal: {s}"))?;
    if inner.is_empty() {
        return Ok(Vec::new());
    }

    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();
    loop {
        let mut item = String::new();
        let mut quoted = false;
        if chars.peek() == Some(&'"') {
            quoted = true;
            chars.next();
            loop {
                match chars.next() {
                    Some('\\') => match chars.next() {
                        Some(c) => item.push(c),
                        None => return Err(format!("invalid array literal: {s}")),
                    },
                    Some('"') => break,
                    Some(c) => item.push(c),
                    None => return Err(format!("unterminated quote in array literal: {s}")),
                }
            }
        }
        while let Some(&c) = chars.peek() {
            if c == ',' {
                break;
            }
            item.push(c);
            chars.next();
        }
        if !quoted && item.eq_ignore_ascii_case("NULL") {
            items.push(None);
        } else {
            items.push(Some(item));
        }
        if chars.next().is_none() {
            break;
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{Describe, TypeDesc};
    use chrono::TimeZone;
    use serde_json::json;

    struct Info;

    impl Describe for Info {
        fn describe() -> TypeDesc {
            TypeDesc::structure("Info")
        }
    }

    fn codec<T: Describe>(policy: ColumnPolicy) -> Codec {
        Codec::derive(policy, Shape::classify(&T::describe()).unwrap()).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap()
    }

    fn pg() -> EncodeContext {
        EncodeContext::new(now(), true)
    }

    fn mysql() -> EncodeContext {
        EncodeContext::new(now(), false)
    }

    #[test]
    fn id_like_kinds_store_zero_as_null() {
        let c = codec::<i64>(ColumnPolicy::new("id"));
        assert_eq!(c.insert_arg(&FieldValue::Int(0), &pg()).unwrap(), Value::Null);
        assert_eq!(c.insert_arg(&FieldValue::Int(7), &pg()).unwrap(), Value::Int(7));

        let c = codec::<u64>(ColumnPolicy::new("id"));
        assert_eq!(c.insert_arg(&FieldValue::Uint(0), &pg()).unwrap(), Value::Null);

        let c = codec::<String>(ColumnPolicy::new("name"));
        assert_eq!(c.insert_arg(&FieldValue::Str(String::new()), &pg()).unwrap(), Value::Null);

        let c = codec::<DateTime<Utc>>(ColumnPolicy::new("at"));
        assert_eq!(c.insert_arg(&FieldValue::Time(ZERO_TIME), &pg()).unwrap(), Value::Null);
    }

    #[test]
    fn other_scalars_store_zero() {
        let c = codec::<i32>(ColumnPolicy::new("n"));
        assert_eq!(c.insert_arg(&FieldValue::Int(0), &pg()).unwrap(), Value::Int(0));
        let c = codec::<isize>(ColumnPolicy::new("n"));
        assert_eq!(c.insert_arg(&FieldValue::Int(0), &pg()).unwrap(), Value::Int(0));
        let c = codec::<bool>(ColumnPolicy::new("b"));
        assert_eq!(c.insert_arg(&FieldValue::Bool(false), &pg()).unwrap(), Value::Bool(false));
        let c = codec::<f64>(ColumnPolicy::new("f"));
        assert_eq!(c.insert_arg(&FieldValue::Float(0.0), &pg()).unwrap(), Value::Float(0.0));
    }

    #[test]
    fn zero_is_null_override() {
        let c = codec::<i32>(ColumnPolicy::new("n").zero_is_null(true));
        assert_eq!(c.insert_arg(&FieldValue::Int(0), &pg()).unwrap(), Value::Null);
        let c = codec::<i64>(ColumnPolicy::new("n").zero_is_null(false));
        assert_eq!(c.insert_arg(&FieldValue::Int(0), &pg()).unwrap(), Value::Int(0));
    }

    #[test]
    fn pointers_keep_zero_pointee() {
        let c = codec::<Option<i64>>(ColumnPolicy::new("id"));
        assert_eq!(c.insert_arg(&FieldValue::Nil, &pg()).unwrap(), Value::Null);
        assert_eq!(c.insert_arg(&FieldValue::Int(0), &pg()).unwrap(), Value::Int(0));
        assert_eq!(c.scan(Value::Null).unwrap(), FieldValue::Nil);
        assert_eq!(c.scan(Value::Int(0)).unwrap(), FieldValue::Int(0));
    }

    #[test]
    fn create_timestamp_only_fills_absent_on_insert() {
        let c = codec::<DateTime<Utc>>(ColumnPolicy::new("created_at").created());
        let set = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(c.insert_arg(&FieldValue::Time(ZERO_TIME), &pg()).unwrap(), Value::Time(now()));
        assert_eq!(c.insert_arg(&FieldValue::Time(set), &pg()).unwrap(), Value::Time(set));
        assert_eq!(c.update_arg(&FieldValue::Time(set), &pg()).unwrap(), Value::Time(set));
        assert_eq!(c.update_arg(&FieldValue::Time(ZERO_TIME), &pg()).unwrap(), Value::Null);
        assert!(!c.is_dirty(&FieldValue::Time(ZERO_TIME)));
    }

    #[test]
    fn update_timestamp_always_substituted_on_update() {
        let c = codec::<Option<DateTime<Utc>>>(ColumnPolicy::new("updated_at").updated());
        let set = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(c.update_arg(&FieldValue::Time(set), &pg()).unwrap(), Value::Time(now()));
        assert_eq!(c.update_arg(&FieldValue::Nil, &pg()).unwrap(), Value::Time(now()));
        assert_eq!(c.insert_arg(&FieldValue::Nil, &pg()).unwrap(), Value::Time(now()));
        assert_eq!(c.insert_arg(&FieldValue::Time(set), &pg()).unwrap(), Value::Time(set));
        assert!(c.is_dirty(&FieldValue::Nil));
    }

    #[test]
    fn timestamp_policy_requires_time_column() {
        let shape = Shape::classify(&String::describe()).unwrap();
        let err = Codec::derive(ColumnPolicy::new("created_at").created(), shape).unwrap_err();
        assert!(matches!(err, SqlError::PolicyMismatch { policy: "create", .. }));

        let shape = Shape::classify(&Vec::<DateTime<Utc>>::describe()).unwrap();
        let err = Codec::derive(ColumnPolicy::new("updated_at").updated(), shape).unwrap_err();
        assert!(matches!(err, SqlError::PolicyMismatch { policy: "update", .. }));
    }

    #[test]
    fn dirty_tests() {
        let c = codec::<i64>(ColumnPolicy::new("n"));
        assert!(!c.is_dirty(&FieldValue::Int(0)));
        assert!(c.is_dirty(&FieldValue::Int(3)));

        let c = codec::<String>(ColumnPolicy::new("s"));
        assert!(!c.is_dirty(&FieldValue::Str(String::new())));
        assert!(c.is_dirty(&FieldValue::Str("x".into())));

        let c = codec::<bool>(ColumnPolicy::new("b"));
        assert!(!c.is_dirty(&FieldValue::Bool(false)));
        assert!(c.is_dirty(&FieldValue::Bool(true)));

        let c = codec::<Option<i64>>(ColumnPolicy::new("p"));
        assert!(!c.is_dirty(&FieldValue::Nil));
        assert!(c.is_dirty(&FieldValue::Int(0)));

        let c = codec::<Info>(ColumnPolicy::new("info"));
        assert!(c.is_dirty(&FieldValue::Json(serde_json::Value::Null)));

        let c = codec::<Vec<String>>(ColumnPolicy::new("tags"));
        assert!(!c.is_dirty(&FieldValue::List(vec![])));
        assert!(c.is_dirty(&FieldValue::from(vec!["a"])));
    }

    #[test]
    fn json_columns() {
        let c = codec::<Info>(ColumnPolicy::new("info"));
        let v = FieldValue::Json(json!({"a": 1}));
        assert_eq!(c.insert_arg(&v, &pg()).unwrap(), Value::Json(json!({"a": 1})));
        assert_eq!(c.scan(Value::Text(r#"{"a":1}"#.into())).unwrap(), v);
        assert_eq!(c.scan(Value::Bytes(vec![])).unwrap(), FieldValue::Json(serde_json::Value::Null));

        let c = codec::<Option<Info>>(ColumnPolicy::new("info"));
        assert_eq!(c.insert_arg(&FieldValue::Nil, &pg()).unwrap(), Value::Null);
        assert_eq!(c.scan(Value::Null).unwrap(), FieldValue::Nil);

        let c = codec::<Vec<Option<Info>>>(ColumnPolicy::new("items"));
        let v = FieldValue::List(vec![FieldValue::Json(json!({"a": 1})), FieldValue::Nil]);
        let encoded = c.insert_arg(&v, &pg()).unwrap();
        assert_eq!(encoded, Value::Json(json!([{"a": 1}, null])));
        assert_eq!(c.scan(encoded).unwrap(), v);
    }

    #[test]
    fn basic_slices_follow_dialect() {
        let c = codec::<Vec<i64>>(ColumnPolicy::new("ids"));
        let v = FieldValue::from(vec![1_i64, 2]);
        assert_eq!(
            c.insert_arg(&v, &pg()).unwrap(),
            Value::Array(vec![Value::Int(1), Value::Int(2)])
        );
        assert_eq!(c.insert_arg(&v, &mysql()).unwrap(), Value::Json(json!([1, 2])));

        let c = codec::<Vec<i64>>(ColumnPolicy::new("ids").array());
        assert_eq!(
            c.insert_arg(&v, &mysql()).unwrap(),
            Value::Array(vec![Value::Int(1), Value::Int(2)])
        );

        let c = codec::<Vec<i64>>(ColumnPolicy::new("ids").json());
        assert_eq!(c.insert_arg(&v, &pg()).unwrap(), Value::Json(json!([1, 2])));
    }

    #[test]
    fn scans_text_array_literals() {
        let c = codec::<Vec<DateTime<Utc>>>(ColumnPolicy::new("times"));
        let got = c
            .scan(Value::Text(
                r#"{"2020-01-02 03:04:05.678+00","2020-01-02 03:04:05+00"}"#.into(),
            ))
            .unwrap();
        let first = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap()
            + chrono::Duration::milliseconds(678);
        let second = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(got, FieldValue::from(vec![first, second]));

        let c = codec::<Vec<Option<String>>>(ColumnPolicy::new("names"));
        let got = c.scan(Value::Text(r#"{a,"b c",NULL,"NULL","q\"x"}"#.into())).unwrap();
        assert_eq!(
            got,
            FieldValue::List(vec![
                FieldValue::Str("a".into()),
                FieldValue::Str("b c".into()),
                FieldValue::Nil,
                FieldValue::Str("NULL".into()),
                FieldValue::Str("q\"x".into()),
            ])
        );

        assert_eq!(parse_array_literal("{}").unwrap(), Vec::<Option<String>>::new());
        assert!(parse_array_literal("a,b").is_err());
    }

    #[test]
    fn round_trip_law() {
        let at = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap();
        let cases: Vec<(TypeDesc, FieldValue)> = vec![
            (bool::describe(), FieldValue::Bool(true)),
            (bool::describe(), FieldValue::Bool(false)),
            (i64::describe(), FieldValue::Int(-42)),
            (i32::describe(), FieldValue::Int(0)),
            (u64::describe(), FieldValue::Uint(9)),
            (u16::describe(), FieldValue::Uint(0)),
            (f64::describe(), FieldValue::Float(1.5)),
            (String::describe(), FieldValue::Str("hello".into())),
            (DateTime::<Utc>::describe(), FieldValue::Time(at)),
            (Option::<i64>::describe(), FieldValue::Int(0)),
            (Option::<String>::describe(), FieldValue::Str(String::new())),
            (Option::<DateTime<Utc>>::describe(), FieldValue::Time(at)),
            (Info::describe(), FieldValue::Json(json!({"k": [1, 2]}))),
            (Option::<Info>::describe(), FieldValue::Json(json!({"k": null}))),
            (
                std::collections::HashMap::<String, i64>::describe(),
                FieldValue::Json(json!({"x": 1})),
            ),
            (serde_json::Value::describe(), FieldValue::Json(json!("text"))),
            (Vec::<i64>::describe(), FieldValue::from(vec![1_i64, 0, 3])),
            (Vec::<u32>::describe(), FieldValue::from(vec![1_u32, 2])),
            (Vec::<String>::describe(), FieldValue::from(vec!["a", ""])),
            (Vec::<bool>::describe(), FieldValue::from(vec![true, false])),
            (Vec::<f64>::describe(), FieldValue::from(vec![0.5_f64])),
            (Vec::<DateTime<Utc>>::describe(), FieldValue::from(vec![at])),
            (
                Vec::<Option<i64>>::describe(),
                FieldValue::List(vec![FieldValue::Int(1), FieldValue::Nil]),
            ),
            (
                Vec::<Info>::describe(),
                FieldValue::List(vec![FieldValue::Json(json!({"a": 1}))]),
            ),
        ];

        for (desc, value) in cases {
            let c = Codec::derive(ColumnPolicy::new("c"), Shape::classify(&desc).unwrap()).unwrap();
            for ctx in [pg(), mysql()] {
                let encoded = c.insert_arg(&value, &ctx).unwrap();
                assert_eq!(c.scan(encoded).unwrap(), value, "{desc}");
            }
            assert_eq!(c.scan(Value::Null).unwrap(), c.shape().zero_value(), "{desc}");
        }
    }
}
