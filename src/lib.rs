//! Object-relational mapping over embedded SQLite.
//!
//! # Intention
//!
//! - Derive table schemas from record types registered through [`Record`].
//! - Convert typed values to and from SQLite's storage classes without loss,
//!   with a pluggable [`BlobSerializer`] for types that have no built-in rule.
//! - Execute prepared statements and materialize rows into records.
//!
//! # Architectural Boundaries
//!
//! - The SQL engine itself sits behind [`Engine`]; storage, planning and the
//!   file format are SQLite's.
//! - No transactions, migrations or query builders; SQL text is passed through verbatim.
//!
//! # Example
//!
//! ```rust
//! use rust_sqlite_orm::{Column, Connection, Record, TableMapping, Value};
//!
//! #[derive(Debug, Default)]
//! struct User {
//!     id: i32,
//!     name: String,
//!     age: Option<i32>,
//! }
//!
//! impl Record for User {
//!     fn table_mapping() -> TableMapping<Self> {
//!         TableMapping::new("users")
//!             .column(Column::new("id", |u: &User| u.id, |u: &mut User, v| u.id = v).primary_key().autoincrement())
//!             .column(Column::new("name", |u: &User| u.name.clone(), |u: &mut User, v| u.name = v))
//!             .column(Column::new("age", |u: &User| u.age, |u: &mut User, v| u.age = v))
//!     }
//! }
//!
//! # fn main() -> rust_sqlite_orm::Result<()> {
//! let conn = Connection::open_in_memory()?;
//! conn.create_table::<User>()?;
//! conn.insert(&mut User { id: 0, name: "John Doe".into(), age: Some(30) })?;
//!
//! let users: Vec<User> = conn.query("select * from users where age > ?", &[Value::from(18)])?;
//! assert_eq!(users[0].name, "John Doe");
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod column;
pub mod command;
pub mod decode;
pub mod encode;
pub mod engine;
pub mod error;
pub mod mapping;
pub mod serializer;
pub mod sqlite;
pub mod value;

pub use column::{ColumnValue, SerializableValue, SqlEnum};
pub use command::{Command, Rows};
pub use engine::{Engine, SqliteEngine, StepResult, StorageClass};
pub use error::{OrmError, Result};
pub use mapping::{Column, FieldDescriptor, MappingOptions, Record, TableMapping};
pub use serializer::BlobSerializer;
pub use sqlite::{Connection, SqliteConfig};
pub use value::{CustomType, CustomValue, FieldType, SqlType, Value};
