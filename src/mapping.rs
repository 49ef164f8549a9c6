//! Record types and their column mappings.

use std::fmt;

use crate::classify;
use crate::column::ColumnValue;
use crate::error::Result;
use crate::serializer::BlobSerializer;
use crate::value::{FieldType, SqlType, Value};

/// Text length used when a text column declares none.
pub const DEFAULT_TEXT_LENGTH: u32 = 140;

/// Per-connection choices that shape column types and value encoding.
#[derive(Clone, Copy)]
pub struct MappingOptions<'a> {
    pub store_timestamps_as_ticks: bool,
    pub default_text_length: u32,
    pub blob_serializer: Option<&'a dyn BlobSerializer>,
}

impl MappingOptions<'_> {
    /// The blob serializer, if one is configured and accepts `field_type`.
    pub(crate) fn serializer_for(&self, field_type: &FieldType) -> Option<&dyn BlobSerializer> {
        let FieldType::Custom(ty) = field_type else {
            return None;
        };
        self.blob_serializer.filter(|s| s.can_handle(*ty))
    }
}

impl Default for MappingOptions<'_> {
    fn default() -> Self {
        Self {
            store_timestamps_as_ticks: false,
            default_text_length: DEFAULT_TEXT_LENGTH,
            blob_serializer: None,
        }
    }
}

impl fmt::Debug for MappingOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingOptions")
            .field("store_timestamps_as_ticks", &self.store_timestamps_as_ticks)
            .field("default_text_length", &self.default_text_length)
            .field("blob_serializer", &self.blob_serializer.is_some())
            .finish()
    }
}

/// How one record field maps to one column.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    pub max_length: Option<u32>,
    pub primary_key: bool,
    pub autoincrement: bool,
    pub collation: Option<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
            max_length: None,
            primary_key: false,
            autoincrement: false,
            collation: None,
        }
    }
}

type Getter<T> = Box<dyn Fn(&T) -> Value>;
type Setter<T> = Box<dyn Fn(&mut T, Value) -> Result<()>>;

/// A mapped column of record type `T`.
pub struct Column<T> {
    descriptor: FieldDescriptor,
    get: Getter<T>,
    set: Setter<T>,
}

impl<T: 'static> Column<T> {
    pub fn new<V: ColumnValue + 'static>(
        name: impl Into<String>,
        get: fn(&T) -> V,
        set: fn(&mut T, V),
    ) -> Self {
        let mut descriptor = FieldDescriptor::new(name, V::field_type());
        descriptor.nullable = V::is_nullable();
        Self {
            descriptor,
            get: Box::new(move |record| get(record).to_value()),
            set: Box::new(move |record, value| {
                set(record, V::from_value(value)?);
                Ok(())
            }),
        }
    }

    /// Marks the column as the primary key. Primary keys are never nullable.
    pub fn primary_key(mut self) -> Self {
        self.descriptor.primary_key = true;
        self.descriptor.nullable = false;
        self
    }

    /// Lets the engine assign the key on insert.
    ///
    /// SQLite accepts `autoincrement` only on an `integer primary key`, so the
    /// field must classify as `integer` (`i32` or narrower). An `i64` or `u32`
    /// key declares `bigint`, and `create table` then fails with
    /// "AUTOINCREMENT is only allowed on an INTEGER PRIMARY KEY".
    pub fn autoincrement(mut self) -> Self {
        self.descriptor.autoincrement = true;
        self
    }

    pub fn max_length(mut self, length: u32) -> Self {
        self.descriptor.max_length = Some(length);
        self
    }

    pub fn collation(mut self, collation: impl Into<String>) -> Self {
        self.descriptor.collation = Some(collation.into());
        self
    }

    pub fn nullable(mut self) -> Self {
        if !self.descriptor.primary_key {
            self.descriptor.nullable = true;
        }
        self
    }
}

impl<T> Column<T> {
    pub fn descriptor(&self) -> &FieldDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn get_value(&self, record: &T) -> Value {
        (self.get)(record)
    }

    pub fn set_value(&self, record: &mut T, value: Value) -> Result<()> {
        (self.set)(record, value)
    }
}

impl<T> fmt::Debug for Column<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Column").field(&self.descriptor).finish()
    }
}

/// A record type stored in one table.
///
/// Rows are materialized into `Self::default()` before their columns are
/// assigned, then [`on_loaded`](Record::on_loaded) runs.
pub trait Record: Default + 'static {
    fn table_mapping() -> TableMapping<Self>;

    fn on_loaded(&mut self) {}
}

/// Table name and columns of a record type.
#[derive(Debug)]
pub struct TableMapping<T> {
    table_name: String,
    columns: Vec<Column<T>>,
}

impl<T> TableMapping<T> {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, column: Column<T>) -> Self {
        self.columns.push(column);
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn columns(&self) -> &[Column<T>] {
        &self.columns
    }

    /// Column mapped to `name`, compared ASCII case-insensitively.
    pub fn find_column(&self, name: &str) -> Option<&Column<T>> {
        self.position(name).map(|i| &self.columns[i])
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name().eq_ignore_ascii_case(name))
    }

    pub fn primary_key(&self) -> Option<&Column<T>> {
        self.columns.iter().find(|c| c.descriptor.primary_key)
    }

    /// Columns written by an insert; autoincrement columns are left to the engine.
    pub fn insert_columns(&self) -> impl Iterator<Item = &Column<T>> {
        self.columns.iter().filter(|c| !c.descriptor.autoincrement)
    }

    pub fn create_table_sql(&self, options: &MappingOptions<'_>) -> Result<String> {
        let definitions = self
            .columns
            .iter()
            .map(|c| classify::column_definition(c.descriptor(), options))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!(
            "create table if not exists {}(\n{})",
            classify::quote(&self.table_name),
            definitions.join(",\n")
        ))
    }

    pub fn insert_sql(&self) -> String {
        let names: Vec<String> = self.insert_columns().map(|c| classify::quote(c.name())).collect();
        if names.is_empty() {
            return format!("insert into {} default values", classify::quote(&self.table_name));
        }
        let placeholders = vec!["?"; names.len()].join(", ");
        format!(
            "insert into {}({}) values ({})",
            classify::quote(&self.table_name),
            names.join(", "),
            placeholders
        )
    }
}

/// Value to write back into an integer primary key after an insert.
pub(crate) fn rowid_value(field_type: &FieldType, rowid: i64) -> Option<Value> {
    match field_type.sql_type()? {
        SqlType::I64 => Some(Value::I64(rowid)),
        SqlType::I32 => i32::try_from(rowid).ok().map(Value::I32),
        SqlType::U32 => u32::try_from(rowid).ok().map(Value::U32),
        _ => None,
    }
}
