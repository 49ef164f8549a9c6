//! Column type and declaration derivation.

use crate::error::{OrmError, Result};
use crate::mapping::{FieldDescriptor, MappingOptions};
use crate::value::{FieldType, SqlType};

/// Double-quotes an identifier.
pub fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// SQL column type for a field.
pub fn sql_type(field: &FieldDescriptor, options: &MappingOptions<'_>) -> Result<String> {
    match &field.field_type {
        FieldType::Primitive(t) | FieldType::Serializable(t) => Ok(primitive_sql_type(*t, field, options)),
        FieldType::Enum => Ok("integer".to_string()),
        FieldType::Custom(ty) => match options.serializer_for(&field.field_type) {
            Some(_) => Ok("blob".to_string()),
            None => Err(OrmError::unsupported(ty.name())),
        },
    }
}

fn primitive_sql_type(t: SqlType, field: &FieldDescriptor, options: &MappingOptions<'_>) -> String {
    match t {
        SqlType::Bool | SqlType::U8 | SqlType::I8 | SqlType::U16 | SqlType::I16 | SqlType::I32 => {
            "integer".to_string()
        }
        SqlType::U32 | SqlType::I64 => "bigint".to_string(),
        SqlType::F32 | SqlType::F64 | SqlType::Decimal => "float".to_string(),
        SqlType::Text => format!(
            "varchar({})",
            field.max_length.unwrap_or(options.default_text_length)
        ),
        SqlType::Duration => "bigint".to_string(),
        SqlType::Timestamp if options.store_timestamps_as_ticks => "bigint".to_string(),
        SqlType::Timestamp => "datetime".to_string(),
        SqlType::Blob => "blob".to_string(),
        SqlType::Uuid => "varchar(36)".to_string(),
    }
}

/// Column type plus the constraint clause: `primary key`, `autoincrement`,
/// `not null` and `collate <name>`, in that order, each only when it applies.
pub fn declare_column(
    field: &FieldDescriptor,
    options: &MappingOptions<'_>,
) -> Result<(String, String)> {
    let sql_type = sql_type(field, options)?;
    let mut clause = Vec::new();
    if field.primary_key {
        clause.push("primary key".to_string());
    }
    if field.autoincrement {
        clause.push("autoincrement".to_string());
    }
    if !field.nullable {
        clause.push("not null".to_string());
    }
    if let Some(collation) = field.collation.as_deref().filter(|c| !c.is_empty()) {
        clause.push(format!("collate {collation}"));
    }
    Ok((sql_type, clause.join(" ")))
}

/// Full column definition as it appears in `create table`.
pub fn column_definition(field: &FieldDescriptor, options: &MappingOptions<'_>) -> Result<String> {
    let (sql_type, clause) = declare_column(field, options)?;
    let mut definition = format!("{} {}", quote(&field.name), sql_type);
    if !clause.is_empty() {
        definition.push(' ');
        definition.push_str(&clause);
    }
    Ok(definition)
}
