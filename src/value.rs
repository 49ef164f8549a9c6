//! Runtime values and the closed set of type tags the mapping layer understands.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, TimeDelta};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Fixed text layout for timestamps stored as text.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Built-in primitive kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    Bool,
    U8,
    I8,
    U16,
    I16,
    I32,
    U32,
    I64,
    F32,
    F64,
    Decimal,
    Text,
    Duration,
    Timestamp,
    Blob,
    Uuid,
}

impl SqlType {
    pub fn name(self) -> &'static str {
        match self {
            SqlType::Bool => "bool",
            SqlType::U8 => "u8",
            SqlType::I8 => "i8",
            SqlType::U16 => "u16",
            SqlType::I16 => "i16",
            SqlType::I32 => "i32",
            SqlType::U32 => "u32",
            SqlType::I64 => "i64",
            SqlType::F32 => "f32",
            SqlType::F64 => "f64",
            SqlType::Decimal => "decimal",
            SqlType::Text => "text",
            SqlType::Duration => "duration",
            SqlType::Timestamp => "timestamp",
            SqlType::Blob => "blob",
            SqlType::Uuid => "uuid",
        }
    }
}

/// Identity of an application type that only a blob serializer can store.
#[derive(Debug, Clone, Copy)]
pub struct CustomType {
    id: TypeId,
    name: &'static str,
}

impl CustomType {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for CustomType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CustomType {}

impl std::hash::Hash for CustomType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Storage shape of a mapped field, resolved once when the mapping is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Primitive(SqlType),
    /// A wrapper stored as the given primitive and rebuilt from it on read.
    Serializable(SqlType),
    Enum,
    Custom(CustomType),
}

impl FieldType {
    /// The primitive a field is stored as, if it has one.
    pub fn sql_type(&self) -> Option<SqlType> {
        match self {
            FieldType::Primitive(t) | FieldType::Serializable(t) => Some(*t),
            FieldType::Enum | FieldType::Custom(_) => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Primitive(t) | FieldType::Serializable(t) => t.name(),
            FieldType::Enum => "enum",
            FieldType::Custom(c) => c.name(),
        }
    }
}

/// A value of an arbitrary application type, shared behind an `Arc`.
#[derive(Clone)]
pub struct CustomValue {
    ty: CustomType,
    value: Arc<dyn Any + Send + Sync>,
}

impl CustomValue {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            ty: CustomType::of::<T>(),
            value: Arc::new(value),
        }
    }

    pub fn ty(&self) -> CustomType {
        self.ty
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustomValue({})", self.ty.name())
    }
}

impl PartialEq for CustomValue {
    fn eq(&self, other: &Self) -> bool {
        self.ty == other.ty && Arc::ptr_eq(&self.value, &other.value)
    }
}

/// A typed runtime value on its way to or from a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    I32(i32),
    U32(u32),
    I64(i64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Text(String),
    Duration(TimeDelta),
    Timestamp(NaiveDateTime),
    Blob(Vec<u8>),
    Uuid(Uuid),
    /// Ordinal of an enumerated value.
    Enum(i32),
    Custom(CustomValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => SqlType::Bool.name(),
            Value::U8(_) => SqlType::U8.name(),
            Value::I8(_) => SqlType::I8.name(),
            Value::U16(_) => SqlType::U16.name(),
            Value::I16(_) => SqlType::I16.name(),
            Value::I32(_) => SqlType::I32.name(),
            Value::U32(_) => SqlType::U32.name(),
            Value::I64(_) => SqlType::I64.name(),
            Value::F32(_) => SqlType::F32.name(),
            Value::F64(_) => SqlType::F64.name(),
            Value::Decimal(_) => SqlType::Decimal.name(),
            Value::Text(_) => SqlType::Text.name(),
            Value::Duration(_) => SqlType::Duration.name(),
            Value::Timestamp(_) => SqlType::Timestamp.name(),
            Value::Blob(_) => SqlType::Blob.name(),
            Value::Uuid(_) => SqlType::Uuid.name(),
            Value::Enum(_) => "enum",
            Value::Custom(c) => c.ty().name(),
        }
    }

    pub fn custom<T: Any + Send + Sync>(value: T) -> Self {
        Value::Custom(CustomValue::new(value))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "{v}"),
            Value::I8(v) => write!(f, "{v}"),
            Value::U16(v) => write!(f, "{v}"),
            Value::I16(v) => write!(f, "{v}"),
            Value::I32(v) => write!(f, "{v}"),
            Value::U32(v) => write!(f, "{v}"),
            Value::I64(v) => write!(f, "{v}"),
            Value::F32(v) => write!(f, "{v}"),
            Value::F64(v) => write!(f, "{v}"),
            Value::Decimal(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
            Value::Duration(v) => write!(f, "{v}"),
            Value::Timestamp(v) => write!(f, "{}", v.format(TIMESTAMP_FORMAT)),
            Value::Blob(v) => write!(f, "<{} bytes>", v.len()),
            Value::Uuid(v) => write!(f, "{}", v.hyphenated()),
            Value::Enum(v) => write!(f, "{v}"),
            Value::Custom(c) => write!(f, "<{}>", c.ty().name()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Blob(value.to_vec())
    }
}

impl<T: crate::column::ColumnValue> From<T> for Value {
    fn from(value: T) -> Self {
        value.to_value()
    }
}

// ── Tick counts ─────────────────────────────────────────────────────
//
// A tick is 100 ns. Timestamps count ticks from 0001-01-01 00:00:00.

pub(crate) const TICKS_PER_SECOND: i64 = 10_000_000;
const NANOS_PER_TICK: i64 = 100;
const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// `None` when the duration does not fit in an `i64` tick count.
pub(crate) fn duration_to_ticks(duration: TimeDelta) -> Option<i64> {
    duration
        .num_seconds()
        .checked_mul(TICKS_PER_SECOND)?
        .checked_add(i64::from(duration.subsec_nanos()) / NANOS_PER_TICK)
}

pub(crate) fn ticks_to_duration(ticks: i64) -> TimeDelta {
    TimeDelta::seconds(ticks / TICKS_PER_SECOND)
        + TimeDelta::nanoseconds((ticks % TICKS_PER_SECOND) * NANOS_PER_TICK)
}

/// `None` when the timestamp lies outside the `i64` tick range (about ±29,000 years).
pub(crate) fn timestamp_to_ticks(timestamp: NaiveDateTime) -> Option<i64> {
    let utc = timestamp.and_utc();
    utc.timestamp()
        .checked_mul(TICKS_PER_SECOND)?
        .checked_add(UNIX_EPOCH_TICKS)?
        .checked_add(i64::from(utc.timestamp_subsec_nanos()) / NANOS_PER_TICK)
}

pub(crate) fn ticks_to_timestamp(ticks: i64) -> Option<NaiveDateTime> {
    let since_epoch = ticks.checked_sub(UNIX_EPOCH_TICKS)?;
    let secs = since_epoch.div_euclid(TICKS_PER_SECOND);
    let nanos = u32::try_from(since_epoch.rem_euclid(TICKS_PER_SECOND) * NANOS_PER_TICK).ok()?;
    DateTime::from_timestamp(secs, nanos).map(|dt| dt.naive_utc())
}
