//! Column shape classification.
//!
//! A [`Shape`] is the normalized form of a column type: at most one pointer level, at most one
//! container level, at most one element pointer level, and a terminal [`ElementKind`]. Codecs are
//! selected from the shape alone, so everything the row path needs is decided here once per type.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{SqlError, SqlResult};
use crate::value::{FieldValue, ZERO_TIME};

/// Integer kinds. Only the 64-bit kinds treat zero as NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntKind {
    I8,
    I16,
    I32,
    I64,
    Isize,
    U8,
    U16,
    U32,
    U64,
    Usize,
}

impl IntKind {
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            IntKind::I8 | IntKind::I16 | IntKind::I32 | IntKind::I64 | IntKind::Isize
        )
    }

    /// Id-like kinds: their zero value is written as NULL.
    pub fn zero_is_null(self) -> bool {
        matches!(self, IntKind::I64 | IntKind::U64)
    }

    fn name(self) -> &'static str {
        match self {
            IntKind::I8 => "i8",
            IntKind::I16 => "i16",
            IntKind::I32 => "i32",
            IntKind::I64 => "i64",
            IntKind::Isize => "isize",
            IntKind::U8 => "u8",
            IntKind::U16 => "u16",
            IntKind::U32 => "u32",
            IntKind::U64 => "u64",
            IntKind::Usize => "usize",
        }
    }
}

/// Host type model handed to the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    Pointer(Box<TypeDesc>),
    Slice(Box<TypeDesc>),
    Array(Box<TypeDesc>, usize),
    Bool,
    Int(IntKind),
    Float,
    String,
    Time,
    Struct(String),
    Map(Box<TypeDesc>, Box<TypeDesc>),
    Interface,
    Other(String),
}

impl TypeDesc {
    pub fn pointer(inner: TypeDesc) -> Self {
        TypeDesc::Pointer(Box::new(inner))
    }

    pub fn slice(inner: TypeDesc) -> Self {
        TypeDesc::Slice(Box::new(inner))
    }

    pub fn structure(name: impl Into<String>) -> Self {
        TypeDesc::Struct(name.into())
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Pointer(inner) => write!(f, "Option<{inner}>"),
            TypeDesc::Slice(inner) => write!(f, "Vec<{inner}>"),
            TypeDesc::Array(inner, n) => write!(f, "[{inner}; {n}]"),
            TypeDesc::Bool => f.write_str("bool"),
            TypeDesc::Int(kind) => f.write_str(kind.name()),
            TypeDesc::Float => f.write_str("f64"),
            TypeDesc::String => f.write_str("String"),
            TypeDesc::Time => f.write_str("DateTime<Utc>"),
            TypeDesc::Struct(name) | TypeDesc::Other(name) => f.write_str(name),
            TypeDesc::Map(k, v) => write!(f, "Map<{k}, {v}>"),
            TypeDesc::Interface => f.write_str("serde_json::Value"),
        }
    }
}

/// Rust types that can describe themselves to the classifier.
///
/// Struct columns (stored as JSON) implement this by returning [`TypeDesc::Struct`].
pub trait Describe {
    fn describe() -> TypeDesc;
}

macro_rules! describe_int {
    ($($t:ty => $kind:ident),*) => {
        $(impl Describe for $t {
            fn describe() -> TypeDesc {
                TypeDesc::Int(IntKind::$kind)
            }
        })*
    };
}

describe_int!(
    i8 => I8, i16 => I16, i32 => I32, i64 => I64, isize => Isize,
    u8 => U8, u16 => U16, u32 => U32, u64 => U64, usize => Usize
);

impl Describe for bool {
    fn describe() -> TypeDesc {
        TypeDesc::Bool
    }
}

impl Describe for f32 {
    fn describe() -> TypeDesc {
        TypeDesc::Float
    }
}

impl Describe for f64 {
    fn describe() -> TypeDesc {
        TypeDesc::Float
    }
}

impl Describe for String {
    fn describe() -> TypeDesc {
        TypeDesc::String
    }
}

impl Describe for DateTime<Utc> {
    fn describe() -> TypeDesc {
        TypeDesc::Time
    }
}

impl Describe for NaiveDateTime {
    fn describe() -> TypeDesc {
        TypeDesc::Time
    }
}

impl Describe for serde_json::Value {
    fn describe() -> TypeDesc {
        TypeDesc::Interface
    }
}

impl<T: Describe> Describe for Option<T> {
    fn describe() -> TypeDesc {
        TypeDesc::pointer(T::describe())
    }
}

impl<T: Describe> Describe for Box<T> {
    fn describe() -> TypeDesc {
        TypeDesc::pointer(T::describe())
    }
}

impl<T: Describe> Describe for Vec<T> {
    fn describe() -> TypeDesc {
        TypeDesc::slice(T::describe())
    }
}

impl<T: Describe, const N: usize> Describe for [T; N] {
    fn describe() -> TypeDesc {
        TypeDesc::Array(Box::new(T::describe()), N)
    }
}

impl<K: Describe, V: Describe, S> Describe for HashMap<K, V, S> {
    fn describe() -> TypeDesc {
        TypeDesc::Map(Box::new(K::describe()), Box::new(V::describe()))
    }
}

impl<K: Describe, V: Describe> Describe for BTreeMap<K, V> {
    fn describe() -> TypeDesc {
        TypeDesc::Map(Box::new(K::describe()), Box::new(V::describe()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    None,
    Slice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Bool,
    Int(IntKind),
    Float,
    String,
    Time,
    Struct,
    Map,
    Interface,
}

impl ElementKind {
    /// Bool, integer, float and string kinds.
    pub fn is_basic(self) -> bool {
        matches!(
            self,
            ElementKind::Bool | ElementKind::Int(_) | ElementKind::Float | ElementKind::String
        )
    }

    pub fn zero_value(self) -> FieldValue {
        match self {
            ElementKind::Bool => FieldValue::Bool(false),
            ElementKind::Int(kind) if kind.is_signed() => FieldValue::Int(0),
            ElementKind::Int(_) => FieldValue::Uint(0),
            ElementKind::Float => FieldValue::Float(0.0),
            ElementKind::String => FieldValue::Str(String::new()),
            ElementKind::Time => FieldValue::Time(ZERO_TIME),
            ElementKind::Struct | ElementKind::Map | ElementKind::Interface => {
                FieldValue::Json(serde_json::Value::Null)
            }
        }
    }
}

/// Normalized descriptor of a column's value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shape {
    pub pointer: bool,
    pub container: Container,
    pub element_pointer: bool,
    pub element_kind: ElementKind,
}

impl Shape {
    /// Classify a type descriptor.
    ///
    /// Unwraps one pointer level, one slice/array level and one element pointer level, then
    /// matches the remaining type against the known kinds.
    pub fn classify(desc: &TypeDesc) -> SqlResult<Shape> {
        let mut t = desc;

        let pointer = match t {
            TypeDesc::Pointer(inner) => {
                t = &**inner;
                true
            }
            _ => false,
        };
        let container = match t {
            TypeDesc::Slice(inner) | TypeDesc::Array(inner, _) => {
                t = &**inner;
                Container::Slice
            }
            _ => Container::None,
        };
        let element_pointer = match t {
            TypeDesc::Pointer(inner) => {
                t = &**inner;
                true
            }
            _ => false,
        };

        if pointer && element_pointer && container == Container::None {
            return Err(SqlError::classification(desc.to_string(), "double pointer"));
        }
        if matches!(t, TypeDesc::Pointer(_)) {
            return Err(SqlError::classification(desc.to_string(), "double pointer"));
        }

        let element_kind = match t {
            TypeDesc::Bool => ElementKind::Bool,
            TypeDesc::Int(kind) => ElementKind::Int(*kind),
            TypeDesc::Float => ElementKind::Float,
            TypeDesc::String => ElementKind::String,
            TypeDesc::Time => ElementKind::Time,
            TypeDesc::Struct(_) => ElementKind::Struct,
            TypeDesc::Map(..) => ElementKind::Map,
            TypeDesc::Interface => ElementKind::Interface,
            other => {
                return Err(SqlError::classification(
                    desc.to_string(),
                    format!("unsupported element type {other}"),
                ));
            }
        };

        Ok(Shape {
            pointer,
            container,
            element_pointer,
            element_kind,
        })
    }

    pub fn is_container(&self) -> bool {
        self.container == Container::Slice
    }

    /// A non-container column of a basic kind, pointer or not.
    pub fn is_scalar(&self) -> bool {
        !self.is_container() && self.element_kind.is_basic()
    }

    pub fn is_time(&self) -> bool {
        !self.is_container() && self.element_kind == ElementKind::Time
    }

    pub fn is_bare_time(&self) -> bool {
        self.is_time() && !self.pointer
    }

    /// Slices whose elements are basic kinds or times; these can use native arrays.
    pub fn is_slice_of_basic_or_time(&self) -> bool {
        self.is_container()
            && (self.element_kind.is_basic() || self.element_kind == ElementKind::Time)
    }

    /// Columns always encoded as JSON regardless of dialect.
    pub fn is_json(&self) -> bool {
        match self.container {
            Container::Slice => !self.is_slice_of_basic_or_time(),
            Container::None => matches!(
                self.element_kind,
                ElementKind::Struct | ElementKind::Map | ElementKind::Interface
            ),
        }
    }

    /// Whether the host value can be absent.
    pub fn is_nillable(&self) -> bool {
        self.pointer
            || self.is_container()
            || matches!(self.element_kind, ElementKind::Map | ElementKind::Interface)
    }

    /// The host value decoded from SQL NULL.
    pub fn zero_value(&self) -> FieldValue {
        if self.pointer {
            return FieldValue::Nil;
        }
        if self.is_container() {
            return FieldValue::List(Vec::new());
        }
        self.element_kind.zero_value()
    }
}

/// Memoized classification, shared by every table definition of one entity set.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    shapes: RwLock<HashMap<TypeDesc, Shape>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a descriptor, reusing the cached shape when it was seen before.
    pub fn classify(&self, desc: &TypeDesc) -> SqlResult<Shape> {
        {
            let shapes = self.shapes.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(shape) = shapes.get(desc) {
                return Ok(*shape);
            }
        }

        let shape = Shape::classify(desc)?;
        let mut shapes = self.shapes.write().unwrap_or_else(PoisonError::into_inner);
        Ok(*shapes.entry(desc.clone()).or_insert(shape))
    }

    pub fn classify_type<T: Describe>(&self) -> SqlResult<Shape> {
        self.classify(&T::describe())
    }

    /// Number of distinct types classified so far.
    pub fn len(&self) -> usize {
        self.shapes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
