//! Value encoder: binds typed values into statement parameter slots.

use rust_decimal::prelude::ToPrimitive;

use crate::engine::{Engine, SQLITE_OK};
use crate::error::{OrmError, Result};
use crate::mapping::MappingOptions;
use crate::value::{self, FieldType, Value, TIMESTAMP_FORMAT};

/// Binds `value` to the one-based parameter `index`.
///
/// Integers up to 32 bits and booleans (as 1/0) bind as 32-bit integers,
/// `u32`, `i64`, durations and tick-mode timestamps as 64-bit integers, floats
/// and decimals as doubles, UUIDs as their hyphenated text. Custom values go
/// through the blob serializer.
pub fn bind_value<'s, E: Engine + 's>(
    engine: &E,
    stmt: &mut E::Stmt<'s>,
    index: i32,
    value: &Value,
    options: &MappingOptions<'_>,
) -> Result<()> {
    tracing::trace!(target: "rust_sqlite_orm", index, value = %value, "bind");
    let rc = match value {
        Value::Null => engine.bind_null(stmt, index),
        Value::I32(v) => engine.bind_int(stmt, index, *v),
        Value::Text(v) => engine.bind_text(stmt, index, v),
        Value::U8(v) => engine.bind_int(stmt, index, i32::from(*v)),
        Value::U16(v) => engine.bind_int(stmt, index, i32::from(*v)),
        Value::I8(v) => engine.bind_int(stmt, index, i32::from(*v)),
        Value::I16(v) => engine.bind_int(stmt, index, i32::from(*v)),
        Value::Bool(v) => engine.bind_int(stmt, index, i32::from(*v)),
        Value::U32(v) => engine.bind_int64(stmt, index, i64::from(*v)),
        Value::I64(v) => engine.bind_int64(stmt, index, *v),
        Value::F32(v) => engine.bind_double(stmt, index, f64::from(*v)),
        Value::F64(v) => engine.bind_double(stmt, index, *v),
        Value::Decimal(v) => {
            let v = v
                .to_f64()
                .ok_or_else(|| OrmError::format("f64", v.to_string(), "decimal out of range"))?;
            engine.bind_double(stmt, index, v)
        }
        Value::Duration(v) => {
            let ticks = value::duration_to_ticks(*v)
                .ok_or_else(|| OrmError::format("duration", v.to_string(), "tick count out of range"))?;
            engine.bind_int64(stmt, index, ticks)
        }
        Value::Timestamp(v) if options.store_timestamps_as_ticks => {
            let ticks = value::timestamp_to_ticks(*v)
                .ok_or_else(|| OrmError::format("timestamp", v.to_string(), "tick count out of range"))?;
            engine.bind_int64(stmt, index, ticks)
        }
        Value::Timestamp(v) => {
            engine.bind_text(stmt, index, &v.format(TIMESTAMP_FORMAT).to_string())
        }
        Value::Enum(v) => engine.bind_int(stmt, index, *v),
        Value::Blob(v) => engine.bind_blob(stmt, index, v),
        Value::Uuid(v) => engine.bind_text(stmt, index, &v.hyphenated().to_string()),
        Value::Custom(v) => {
            let serializer = options
                .serializer_for(&FieldType::Custom(v.ty()))
                .ok_or_else(|| OrmError::unsupported(v.ty().name()))?;
            let bytes = serializer
                .serialize(v)
                .map_err(|e| OrmError::serialization(v.ty().name(), e))?;
            engine.bind_blob(stmt, index, &bytes)
        }
    };
    check_bind(engine, rc)
}

fn check_bind<E: Engine>(engine: &E, rc: i32) -> Result<()> {
    if rc == SQLITE_OK {
        Ok(())
    } else {
        Err(OrmError::sqlite(rc, engine.errmsg()))
    }
}
