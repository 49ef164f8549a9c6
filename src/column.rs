//! Conversions between Rust field types and [`Value`].
//!
//! | Rust type                  | Field type                      |
//! |----------------------------|---------------------------------|
//! | `bool`                     | `Primitive(Bool)`               |
//! | `u8`, `i8`, `u16`, `i16`   | `Primitive(U8 .. I16)`          |
//! | `i32`, `u32`, `i64`        | `Primitive(I32 / U32 / I64)`    |
//! | `f32`, `f64`               | `Primitive(F32 / F64)`          |
//! | `rust_decimal::Decimal`    | `Primitive(Decimal)`            |
//! | `String`                   | `Primitive(Text)`               |
//! | `chrono::TimeDelta`        | `Primitive(Duration)`           |
//! | `chrono::NaiveDateTime`    | `Primitive(Timestamp)`          |
//! | `Vec<u8>`                  | `Primitive(Blob)`               |
//! | `uuid::Uuid`               | `Primitive(Uuid)`               |
//! | `Option<T>`                | as `T`, nullable                |
//!
//! Application types join through [`serializable_column!`](crate::serializable_column),
//! [`enum_column!`](crate::enum_column) and [`blob_column!`](crate::blob_column).
//!
//! A non-optional field that receives SQL `NULL` takes its type's default value.

use chrono::{NaiveDateTime, TimeDelta};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{OrmError, Result};
use crate::value::{FieldType, SqlType, Value};

/// A type that can be stored in a mapped column.
pub trait ColumnValue: Sized {
    fn field_type() -> FieldType;

    fn is_nullable() -> bool {
        false
    }

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self>;
}

/// A type represented losslessly by a single primitive.
///
/// Declare the column mapping with [`serializable_column!`](crate::serializable_column).
pub trait SerializableValue: Sized {
    type Primitive: ColumnValue;

    fn serialize(&self) -> Self::Primitive;

    fn deserialize(value: Self::Primitive) -> Self;
}

/// An enumeration stored as its ordinal.
///
/// Declare the column mapping with [`enum_column!`](crate::enum_column).
pub trait SqlEnum: Sized {
    fn ordinal(&self) -> i32;

    /// `None` if no variant has this ordinal.
    fn from_ordinal(ordinal: i32) -> Option<Self>;
}

macro_rules! primitive_column {
    ($($ty:ty => $tag:ident),* $(,)?) => {
        $(
            impl ColumnValue for $ty {
                fn field_type() -> FieldType {
                    FieldType::Primitive(SqlType::$tag)
                }

                fn to_value(&self) -> Value {
                    Value::$tag(self.clone())
                }

                fn from_value(value: Value) -> Result<Self> {
                    match value {
                        Value::$tag(v) => Ok(v),
                        Value::Null => Ok(<$ty>::default()),
                        other => Err(OrmError::mismatch(SqlType::$tag.name(), other.type_name())),
                    }
                }
            }
        )*
    };
}

primitive_column! {
    bool => Bool,
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    Decimal => Decimal,
    String => Text,
    TimeDelta => Duration,
    NaiveDateTime => Timestamp,
    Vec<u8> => Blob,
    Uuid => Uuid,
}

impl<T: ColumnValue> ColumnValue for Option<T> {
    fn field_type() -> FieldType {
        T::field_type()
    }

    fn is_nullable() -> bool {
        true
    }

    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, T::to_value)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            value => T::from_value(value).map(Some),
        }
    }
}

/// Field type of a wrapper stored as `P`.
pub fn serializable_field_type<P: ColumnValue>() -> FieldType {
    match P::field_type() {
        FieldType::Primitive(t) => FieldType::Serializable(t),
        other => other,
    }
}

/// Rebuilds an enum from a decoded ordinal.
pub fn enum_from_value<E: SqlEnum>(value: Value) -> Result<E> {
    let ordinal = match value {
        Value::Enum(o) | Value::I32(o) => o,
        Value::Null => 0,
        other => return Err(OrmError::mismatch("enum", other.type_name())),
    };
    E::from_ordinal(ordinal).ok_or_else(|| {
        OrmError::format(
            "enum",
            ordinal.to_string(),
            format!("no variant of {} has this ordinal", std::any::type_name::<E>()),
        )
    })
}

/// Stores a [`SerializableValue`] as its primitive.
#[macro_export]
macro_rules! serializable_column {
    ($ty:ty) => {
        impl $crate::ColumnValue for $ty {
            fn field_type() -> $crate::FieldType {
                $crate::column::serializable_field_type::<
                    <$ty as $crate::SerializableValue>::Primitive,
                >()
            }

            fn to_value(&self) -> $crate::Value {
                $crate::ColumnValue::to_value(&$crate::SerializableValue::serialize(self))
            }

            fn from_value(value: $crate::Value) -> $crate::Result<Self> {
                let primitive =
                    <<$ty as $crate::SerializableValue>::Primitive as $crate::ColumnValue>::from_value(value)?;
                Ok(<$ty as $crate::SerializableValue>::deserialize(primitive))
            }
        }
    };
}

/// Stores a [`SqlEnum`] as its ordinal.
#[macro_export]
macro_rules! enum_column {
    ($ty:ty) => {
        impl $crate::ColumnValue for $ty {
            fn field_type() -> $crate::FieldType {
                $crate::FieldType::Enum
            }

            fn to_value(&self) -> $crate::Value {
                $crate::Value::Enum($crate::SqlEnum::ordinal(self))
            }

            fn from_value(value: $crate::Value) -> $crate::Result<Self> {
                $crate::column::enum_from_value(value)
            }
        }
    };
}

/// Stores a type through the connection's blob serializer.
///
/// The type must be `Clone + Default + Send + Sync + 'static`.
#[macro_export]
macro_rules! blob_column {
    ($ty:ty) => {
        impl $crate::ColumnValue for $ty {
            fn field_type() -> $crate::FieldType {
                $crate::FieldType::Custom($crate::CustomType::of::<$ty>())
            }

            fn to_value(&self) -> $crate::Value {
                $crate::Value::custom(::std::clone::Clone::clone(self))
            }

            fn from_value(value: $crate::Value) -> $crate::Result<Self> {
                match value {
                    $crate::Value::Custom(c) => c.downcast_ref::<$ty>().cloned().ok_or_else(|| {
                        $crate::OrmError::mismatch(::std::any::type_name::<$ty>(), c.ty().name())
                    }),
                    $crate::Value::Null => Ok(<$ty as ::std::default::Default>::default()),
                    other => Err($crate::OrmError::mismatch(
                        ::std::any::type_name::<$ty>(),
                        other.type_name(),
                    )),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct UserId(u32);

    impl SerializableValue for UserId {
        type Primitive = u32;

        fn serialize(&self) -> u32 {
            self.0
        }

        fn deserialize(value: u32) -> Self {
            UserId(value)
        }
    }

    crate::serializable_column!(UserId);

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Level {
        Low = 1,
        High = 5,
    }

    impl SqlEnum for Level {
        fn ordinal(&self) -> i32 {
            *self as i32
        }

        fn from_ordinal(ordinal: i32) -> Option<Self> {
            match ordinal {
                1 => Some(Level::Low),
                5 => Some(Level::High),
                _ => None,
            }
        }
    }

    crate::enum_column!(Level);

    #[test]
    fn test_primitive_field_types() {
        assert_eq!(i32::field_type(), FieldType::Primitive(SqlType::I32));
        assert_eq!(String::field_type(), FieldType::Primitive(SqlType::Text));
        assert!(!i32::is_nullable());
        assert!(Option::<i32>::is_nullable());
        assert_eq!(Option::<Uuid>::field_type(), FieldType::Primitive(SqlType::Uuid));
    }

    #[test]
    fn test_null_takes_default() {
        assert_eq!(i32::from_value(Value::Null).unwrap(), 0);
        assert_eq!(String::from_value(Value::Null).unwrap(), "");
        assert_eq!(Option::<i64>::from_value(Value::Null).unwrap(), None);
        assert_eq!(Option::<i64>::from_value(Value::I64(-1)).unwrap(), Some(-1));
    }

    #[test]
    fn test_mismatched_tag_is_rejected() {
        let err = i32::from_value(Value::Text("7".into())).unwrap_err();
        assert!(matches!(err, OrmError::TypeMismatch { expected: "i32", found: "text" }));
    }

    #[test]
    fn test_serializable_wrapper() {
        assert_eq!(UserId::field_type(), FieldType::Serializable(SqlType::U32));
        assert_eq!(UserId(9).to_value(), Value::U32(9));
        assert_eq!(UserId::from_value(Value::U32(9)).unwrap(), UserId(9));
        assert_eq!(UserId::from_value(Value::Null).unwrap(), UserId(0));
    }

    #[test]
    fn test_enum_ordinals() {
        assert_eq!(Level::field_type(), FieldType::Enum);
        assert_eq!(Level::High.to_value(), Value::Enum(5));
        assert_eq!(Level::from_value(Value::Enum(1)).unwrap(), Level::Low);
        let err = Level::from_value(Value::Enum(3)).unwrap_err();
        assert!(matches!(err, OrmError::Format { target: "enum", .. }));
    }
}
