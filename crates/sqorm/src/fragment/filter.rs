//! Null-aware column filters.
//!
//! A filter compares one column against a value that may be absent. Two independent axes decide
//! what absence means: whether the filter is optional (skip instead of failing) and how a
//! present-but-zero pointee is matched (`= ?`, `IS NULL`, or either).
//!
//! | mode           | absent     | zero pointee            | non-zero |
//! |----------------|------------|-------------------------|----------|
//! | `Default`      | error      | `IS NULL OR col = ?`    | `= ?`    |
//! | `Optional`     | skipped    | `IS NULL OR col = ?`    | `= ?`    |
//! | `Nullable`     | `IS NULL`  | `= ?`                   | `= ?`    |
//! | `RequiredZero` | error      | `= ?`                   | `= ?`    |
//! | `RequiredNull` | error      | `IS NULL`               | `= ?`    |
//! | `OptionalZero` | skipped    | `= ?`                   | `= ?`    |
//! | `OptionalNull` | skipped    | `IS NULL`               | `= ?`    |
//!
//! A bare value built with [`ColumnFilter::value`] counts as absent when it is zero.

use super::Fragment;
use crate::error::{SqlError, SqlResult};
use crate::value::Value;
use crate::writer::SqlWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    #[default]
    Default,
    Optional,
    Nullable,
    RequiredZero,
    RequiredNull,
    OptionalZero,
    OptionalNull,
}

enum ZeroRule {
    Value,
    Null,
    NullOrValue,
}

impl FilterMode {
    fn is_optional(self) -> bool {
        matches!(
            self,
            FilterMode::Optional | FilterMode::OptionalZero | FilterMode::OptionalNull
        )
    }

    fn zero_rule(self) -> ZeroRule {
        match self {
            FilterMode::Nullable | FilterMode::RequiredZero | FilterMode::OptionalZero => {
                ZeroRule::Value
            }
            FilterMode::RequiredNull | FilterMode::OptionalNull => ZeroRule::Null,
            FilterMode::Default | FilterMode::Optional => ZeroRule::NullOrValue,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CmpOp {
    #[default]
    Eq,
    Gt,
    Lt,
    Gte,
    Lte,
}

impl CmpOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Gt => ">",
            CmpOp::Lt => "<",
            CmpOp::Gte => ">=",
            CmpOp::Lte => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnFilter {
    prefix: String,
    column: String,
    value: Value,
    is_nil: bool,
    is_zero: bool,
    op: CmpOp,
    mode: FilterMode,
}

impl ColumnFilter {
    /// Filter on a bare value; zero counts as absent.
    pub fn value(prefix: impl Into<String>, column: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        Self {
            prefix: prefix.into(),
            column: column.into(),
            is_nil: value.is_zero(),
            is_zero: false,
            value,
            op: CmpOp::Eq,
            mode: FilterMode::Default,
        }
    }

    /// Filter on an optional value; `None` is absent, `Some(zero)` is a zero pointee.
    pub fn ptr<T: Into<Value>>(
        prefix: impl Into<String>,
        column: impl Into<String>,
        value: Option<T>,
    ) -> Self {
        let (value, is_nil, is_zero) = match value {
            None => (Value::Null, true, false),
            Some(v) => {
                let v = v.into();
                let zero = v.is_zero();
                (v, false, zero)
            }
        };
        Self {
            prefix: prefix.into(),
            column: column.into(),
            value,
            is_nil,
            is_zero,
            op: CmpOp::Eq,
            mode: FilterMode::Default,
        }
    }

    pub fn mode(mut self, mode: FilterMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn optional(self) -> Self {
        self.mode(FilterMode::Optional)
    }

    pub fn nullable(self) -> Self {
        self.mode(FilterMode::Nullable)
    }

    pub fn required_zero(self) -> Self {
        self.mode(FilterMode::RequiredZero)
    }

    pub fn required_null(self) -> Self {
        self.mode(FilterMode::RequiredNull)
    }

    pub fn optional_zero(self) -> Self {
        self.mode(FilterMode::OptionalZero)
    }

    pub fn optional_null(self) -> Self {
        self.mode(FilterMode::OptionalNull)
    }

    pub fn op(mut self, op: CmpOp) -> Self {
        self.op = op;
        self
    }

    pub fn gt(self) -> Self {
        self.op(CmpOp::Gt)
    }

    pub fn lt(self) -> Self {
        self.op(CmpOp::Lt)
    }

    pub fn gte(self) -> Self {
        self.op(CmpOp::Gte)
    }

    pub fn lte(self) -> Self {
        self.op(CmpOp::Lte)
    }

    fn write_name(&self, w: &mut SqlWriter) {
        w.write_prefixed_name(&self.prefix, &self.column);
    }

    fn write_cmp(&self, w: &mut SqlWriter) {
        self.write_name(w);
        w.write_byte(b' ');
        w.write_raw(self.op.as_str());
        w.write_byte(b' ');
        w.write_marker();
        w.write_arg(self.value.clone());
    }

    fn write_is_null(&self, w: &mut SqlWriter) {
        self.write_name(w);
        w.write_raw(" IS NULL");
    }
}

impl Fragment for ColumnFilter {
    fn write_to(&self, w: &mut SqlWriter) -> SqlResult<()> {
        if self.is_nil {
            if self.mode == FilterMode::Nullable {
                self.write_is_null(w);
                return Ok(());
            }
            if self.mode.is_optional() {
                return Ok(());
            }
            return Err(SqlError::invalid_argument(format!("missing {}", self.column)));
        }

        if self.is_zero {
            match self.mode.zero_rule() {
                ZeroRule::Null => self.write_is_null(w),
                ZeroRule::Value => self.write_cmp(w),
                ZeroRule::NullOrValue if self.op == CmpOp::Eq => {
                    self.write_is_null(w);
                    w.write_raw(" OR ");
                    self.write_cmp(w);
                }
                ZeroRule::NullOrValue => self.write_cmp(w),
            }
            return Ok(());
        }

        self.write_cmp(w);
        Ok(())
    }
}
