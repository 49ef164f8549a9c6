use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::column::ColumnValue;
use crate::command::{Command, Rows};
use crate::engine::{Engine, SqliteEngine};
use crate::error::Result;
use crate::mapping::{self, MappingOptions, Record, TableMapping, DEFAULT_TEXT_LENGTH};
use crate::serializer::BlobSerializer;
use crate::value::Value;

/// Connection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Path to the SQLite database file, or `:memory:`
    pub db_path: String,
    /// Store timestamps as tick counts instead of `yyyy-MM-dd HH:mm:ss` text
    pub store_timestamps_as_ticks: bool,
    /// How long the engine waits on a locked database before reporting busy
    pub busy_timeout_ms: Option<u64>,
    /// Length of text columns that declare none
    pub default_text_length: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            db_path: ":memory:".to_string(),
            store_timestamps_as_ticks: false,
            busy_timeout_ms: None,
            default_text_length: DEFAULT_TEXT_LENGTH,
        }
    }
}

impl SqliteConfig {
    /// Create a new SQLite config for the database at `db_path`
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_timestamps_as_ticks(mut self, enabled: bool) -> Self {
        self.store_timestamps_as_ticks = enabled;
        self
    }

    pub fn with_busy_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.busy_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_default_text_length(mut self, length: u32) -> Self {
        self.default_text_length = length;
        self
    }
}

/// A database connection with cached table mappings.
///
/// Not thread-safe: every statement runs on the calling thread.
pub struct Connection<E: Engine = SqliteEngine> {
    engine: E,
    config: SqliteConfig,
    blob_serializer: Option<Rc<dyn BlobSerializer>>,
    mappings: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
}

impl Connection<SqliteEngine> {
    pub fn open(config: SqliteConfig) -> Result<Self> {
        tracing::info!(target: "rust_sqlite_orm", path = %config.db_path, "opening sqlite database");
        let conn = rusqlite::Connection::open(&config.db_path)?;
        if let Some(timeout_ms) = config.busy_timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout_ms))?;
        }
        Ok(Self::with_engine(SqliteEngine::new(conn), config))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(SqliteConfig::in_memory())
    }
}

impl<E: Engine> Connection<E> {
    pub fn with_engine(engine: E, config: SqliteConfig) -> Self {
        Self {
            engine,
            config,
            blob_serializer: None,
            mappings: RefCell::new(HashMap::new()),
        }
    }

    /// Installs the fallback serializer for types with no built-in mapping.
    pub fn with_blob_serializer(mut self, serializer: Rc<dyn BlobSerializer>) -> Self {
        self.blob_serializer = Some(serializer);
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    pub fn mapping_options(&self) -> MappingOptions<'_> {
        MappingOptions {
            store_timestamps_as_ticks: self.config.store_timestamps_as_ticks,
            default_text_length: self.config.default_text_length,
            blob_serializer: self.blob_serializer.as_deref(),
        }
    }

    /// The mapping of `T`, built on first use and cached for the connection's lifetime.
    pub fn table_mapping<T: Record>(&self) -> Rc<TableMapping<T>> {
        let cached = self.mappings.borrow().get(&TypeId::of::<T>()).cloned();
        if let Some(mapping) = cached.and_then(|m| m.downcast::<TableMapping<T>>().ok()) {
            return mapping;
        }
        let mapping = Rc::new(T::table_mapping());
        self.mappings
            .borrow_mut()
            .insert(TypeId::of::<T>(), mapping.clone());
        mapping
    }

    pub fn create_command(&self, sql: impl Into<String>) -> Command<'_, E> {
        Command::new(self, sql)
    }

    fn command_with(&self, sql: &str, params: &[Value]) -> Command<'_, E> {
        params
            .iter()
            .cloned()
            .fold(self.create_command(sql), |cmd, value| cmd.bind(value))
    }

    /// Runs a statement with positional parameters and returns the rows it changed.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize> {
        self.command_with(sql, params).execute_non_query()
    }

    pub fn query<T: Record>(&self, sql: &str, params: &[Value]) -> Result<Vec<T>> {
        self.command_with(sql, params).execute_query()
    }

    pub fn deferred_query<T: Record>(&self, sql: &str, params: &[Value]) -> Result<Rows<'_, T, E>> {
        self.command_with(sql, params).execute_deferred_query()
    }

    pub fn execute_scalar<V: ColumnValue>(&self, sql: &str, params: &[Value]) -> Result<V> {
        self.command_with(sql, params).execute_scalar()
    }

    /// Creates the table of `T` unless it already exists.
    pub fn create_table<T: Record>(&self) -> Result<usize> {
        let sql = self
            .table_mapping::<T>()
            .create_table_sql(&self.mapping_options())?;
        self.execute(&sql, &[])
    }

    /// Inserts `record`; an autoincrement integer primary key receives the new rowid.
    pub fn insert<T: Record>(&self, record: &mut T) -> Result<usize> {
        let mapping = self.table_mapping::<T>();
        let params: Vec<Value> = mapping.insert_columns().map(|c| c.get_value(record)).collect();
        let count = self.execute(&mapping.insert_sql(), &params)?;
        if let Some(pk) = mapping.primary_key().filter(|c| c.descriptor().autoincrement) {
            let rowid = self.engine.last_insert_rowid();
            if let Some(value) = mapping::rowid_value(&pk.descriptor().field_type, rowid) {
                pk.set_value(record, value)?;
            }
        }
        Ok(count)
    }
}

impl<E: Engine> fmt::Debug for Connection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("config", &self.config)
            .field("blob_serializer", &self.blob_serializer.is_some())
            .finish()
    }
}
