//! Value decoder: reads result cells back into typed values.
//!
//! The storage class reported by the engine only decides the `NULL` case;
//! everything else is read through the rule of the target field type, which
//! mirrors the rule the encoder used to bind it.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::engine::{Engine, StorageClass};
use crate::error::{OrmError, Result};
use crate::mapping::MappingOptions;
use crate::value::{self, FieldType, SqlType, Value};

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Reads column `index` of the current row as `target`.
///
/// For [`FieldType::Serializable`] targets this yields the primitive; the
/// wrapper is rebuilt from it by its [`ColumnValue`](crate::ColumnValue) impl.
pub fn read_column<'s, E: Engine + 's>(
    engine: &E,
    stmt: &E::Stmt<'s>,
    index: usize,
    storage: StorageClass,
    target: &FieldType,
    options: &MappingOptions<'_>,
) -> Result<Value> {
    if storage == StorageClass::Null {
        return Ok(Value::Null);
    }
    match target {
        FieldType::Primitive(t) | FieldType::Serializable(t) => {
            read_primitive(engine, stmt, index, *t, options)
        }
        // Ordinals are range-checked when the enum is rebuilt.
        FieldType::Enum => Ok(Value::Enum(engine.column_int(stmt, index))),
        FieldType::Custom(ty) => {
            let serializer = options
                .serializer_for(target)
                .ok_or_else(|| OrmError::unsupported(ty.name()))?;
            let bytes = engine.column_blob(stmt, index);
            serializer
                .deserialize(*ty, &bytes)
                .map(Value::Custom)
                .map_err(|e| OrmError::serialization(ty.name(), e))
        }
    }
}

fn read_primitive<'s, E: Engine + 's>(
    engine: &E,
    stmt: &E::Stmt<'s>,
    index: usize,
    target: SqlType,
    options: &MappingOptions<'_>,
) -> Result<Value> {
    let value = match target {
        SqlType::Text => Value::Text(engine.column_text(stmt, index)?),
        SqlType::I32 => Value::I32(engine.column_int(stmt, index)),
        SqlType::Bool => Value::Bool(engine.column_int(stmt, index) == 1),
        SqlType::F64 => Value::F64(engine.column_double(stmt, index)),
        SqlType::F32 => Value::F32(engine.column_double(stmt, index) as f32),
        SqlType::Duration => {
            Value::Duration(value::ticks_to_duration(engine.column_int64(stmt, index)))
        }
        SqlType::Timestamp if options.store_timestamps_as_ticks => {
            let ticks = engine.column_int64(stmt, index);
            let ts = value::ticks_to_timestamp(ticks).ok_or_else(|| {
                OrmError::format("timestamp", ticks.to_string(), "tick count out of range")
            })?;
            Value::Timestamp(ts)
        }
        SqlType::Timestamp => Value::Timestamp(parse_timestamp(&engine.column_text(stmt, index)?)?),
        SqlType::I64 => Value::I64(engine.column_int64(stmt, index)),
        SqlType::U32 => Value::U32(engine.column_int64(stmt, index) as u32),
        SqlType::Decimal => {
            let v = engine.column_double(stmt, index);
            let d = Decimal::from_f64(v)
                .ok_or_else(|| OrmError::format("decimal", v.to_string(), "not representable"))?;
            Value::Decimal(d)
        }
        SqlType::U8 => Value::U8(engine.column_int(stmt, index) as u8),
        SqlType::U16 => Value::U16(engine.column_int(stmt, index) as u16),
        SqlType::I16 => Value::I16(engine.column_int(stmt, index) as i16),
        SqlType::I8 => Value::I8(engine.column_int(stmt, index) as i8),
        SqlType::Blob => Value::Blob(engine.column_blob(stmt, index)),
        SqlType::Uuid => {
            let text = engine.column_text(stmt, index)?;
            let id = Uuid::parse_str(text.trim()).map_err(|e| OrmError::format("uuid", text.clone(), e))?;
            Value::Uuid(id)
        }
    };
    Ok(value)
}

/// Parses stored timestamp text, independent of locale.
///
/// Accepts `yyyy-MM-dd HH:mm:ss` with optional fractional seconds, the same
/// with a `T` separator or without seconds, a bare date, and RFC 3339 (which
/// is converted to UTC).
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime> {
    let s = text.trim();
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(ts);
        }
    }
    if let Some(ts) = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(ts);
    }
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.naive_utc())
        .map_err(|e| OrmError::format("timestamp", text, e))
}
