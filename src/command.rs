//! Statement execution: prepare, bind, step, materialize, finalize.
//!
//! Every execution owns its prepared statement through a [`StatementGuard`],
//! which finalizes exactly once: explicitly on completion, or on drop when an
//! error or an abandoned [`Rows`] iterator leaves the bracket early.

use std::fmt;
use std::iter::FusedIterator;
use std::rc::Rc;

use crate::column::ColumnValue;
use crate::decode;
use crate::encode;
use crate::engine::{Engine, StepResult, SQLITE_MISUSE, SQLITE_ROW};
use crate::error::{OrmError, Result};
use crate::mapping::{MappingOptions, Record, TableMapping};
use crate::sqlite::Connection;
use crate::value::Value;

const LOG_TARGET: &str = "rust_sqlite_orm";

/// Owns a prepared statement for one prepare-to-finalize bracket.
pub(crate) struct StatementGuard<'c, E: Engine + 'c> {
    engine: &'c E,
    stmt: Option<E::Stmt<'c>>,
}

impl<'c, E: Engine + 'c> StatementGuard<'c, E> {
    fn prepare(engine: &'c E, sql: &str) -> Result<Self> {
        tracing::debug!(target: LOG_TARGET, sql, "prepare");
        let stmt = engine.prepare(sql).map_err(|e| {
            tracing::warn!(target: LOG_TARGET, sql, error = %e, "prepare failed");
            e
        })?;
        Ok(Self {
            engine,
            stmt: Some(stmt),
        })
    }

    fn stmt_mut(&mut self) -> Result<&mut E::Stmt<'c>> {
        self.stmt
            .as_mut()
            .ok_or_else(|| OrmError::sqlite(SQLITE_MISUSE, "statement already finalized"))
    }

    fn step(&mut self) -> Result<StepResult> {
        let engine = self.engine;
        let result = engine.step(self.stmt_mut()?);
        tracing::trace!(target: LOG_TARGET, ?result, "step");
        Ok(result)
    }

    fn error(&mut self, code: i32) -> OrmError {
        let message = self.engine.errmsg();
        self.finalize();
        tracing::warn!(target: LOG_TARGET, code, message = %message, "statement failed");
        OrmError::sqlite(code, message)
    }

    fn finalize(&mut self) {
        if let Some(stmt) = self.stmt.take() {
            let rc = self.engine.finalize(stmt);
            tracing::debug!(target: LOG_TARGET, rc, "finalize");
        }
    }
}

impl<'c, E: Engine + 'c> Drop for StatementGuard<'c, E> {
    fn drop(&mut self) {
        self.finalize();
    }
}

#[derive(Debug, Clone)]
struct Binding {
    name: Option<String>,
    value: Value,
}

/// SQL text plus the parameters to bind to it.
pub struct Command<'c, E: Engine> {
    conn: &'c Connection<E>,
    text: String,
    bindings: Vec<Binding>,
}

impl<'c, E: Engine + 'c> Command<'c, E> {
    pub(crate) fn new(conn: &'c Connection<E>, text: impl Into<String>) -> Self {
        Self {
            conn,
            text: text.into(),
            bindings: Vec::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Adds a positional parameter.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.bindings.push(Binding {
            name: None,
            value: value.into(),
        });
        self
    }

    /// Adds a named parameter; `name` includes its prefix (`:id`, `@id`, `$id`).
    pub fn bind_named(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.bindings.push(Binding {
            name: Some(name.to_string()),
            value: value.into(),
        });
        self
    }

    /// Runs a statement that returns no rows and reports the rows it changed.
    pub fn execute_non_query(&self) -> Result<usize> {
        let _span = tracing::debug_span!("sqlite_command", op = "execute_non_query").entered();
        let mut guard = self.prepare()?;
        match guard.step()? {
            StepResult::Done => {
                let changes = self.conn.engine().changes();
                guard.finalize();
                Ok(usize::try_from(changes).unwrap_or(0))
            }
            StepResult::Error(code) => Err(guard.error(code)),
            StepResult::Row => {
                guard.finalize();
                Err(OrmError::sqlite(SQLITE_ROW, "non-query statement returned a row"))
            }
        }
    }

    /// Runs a query and collects every row.
    pub fn execute_query<T: Record>(&self) -> Result<Vec<T>> {
        let _span = tracing::debug_span!("sqlite_command", op = "execute_query").entered();
        self.execute_deferred_query::<T>()?.collect()
    }

    /// Runs a query and yields rows as the iterator is pulled.
    pub fn execute_deferred_query<T: Record>(&self) -> Result<Rows<'c, T, E>> {
        let mapping = self.conn.table_mapping::<T>();
        let guard = self.prepare()?;
        Ok(Rows::new(guard, mapping, self.conn.mapping_options()))
    }

    /// Returns the first column of the first row, or `V`'s default if there is none.
    pub fn execute_scalar<V: ColumnValue>(&self) -> Result<V> {
        let _span = tracing::debug_span!("sqlite_command", op = "execute_scalar").entered();
        let mut guard = self.prepare()?;
        match guard.step()? {
            StepResult::Row => {
                let engine = self.conn.engine();
                let stmt = guard.stmt_mut()?;
                let storage = engine.column_type(stmt, 0);
                let options = self.conn.mapping_options();
                let value = decode::read_column(engine, stmt, 0, storage, &V::field_type(), &options)?;
                guard.finalize();
                V::from_value(value)
            }
            StepResult::Done => {
                guard.finalize();
                V::from_value(Value::Null)
            }
            StepResult::Error(code) => Err(guard.error(code)),
        }
    }

    fn prepare(&self) -> Result<StatementGuard<'c, E>> {
        let engine = self.conn.engine();
        let mut guard = StatementGuard::prepare(engine, &self.text)?;
        let options = self.conn.mapping_options();
        let stmt = guard.stmt_mut()?;
        let mut next_index = 1;
        for binding in &self.bindings {
            let index = match &binding.name {
                Some(name) => engine.bind_parameter_index(stmt, name),
                None => {
                    let index = next_index;
                    next_index += 1;
                    index
                }
            };
            encode::bind_value(engine, stmt, index, &binding.value, &options)?;
        }
        Ok(guard)
    }
}

impl<E: Engine> fmt::Display for Command<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)?;
        for (i, binding) in self.bindings.iter().enumerate() {
            write!(f, "\n  {i}: {}", binding.value)?;
        }
        Ok(())
    }
}

impl<E: Engine> fmt::Debug for Command<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("text", &self.text)
            .field("bindings", &self.bindings)
            .finish()
    }
}

/// Forward-only, single-pass rows of a query.
///
/// The statement is finalized when the rows run out, when a step or a decode
/// fails, or when the iterator is dropped, whichever comes first.
pub struct Rows<'c, T, E: Engine + 'c> {
    guard: StatementGuard<'c, E>,
    mapping: Rc<TableMapping<T>>,
    /// (result column, mapping column) pairs; unmapped result columns are skipped.
    columns: Vec<(usize, usize)>,
    options: MappingOptions<'c>,
    done: bool,
}

impl<'c, T: Record, E: Engine + 'c> Rows<'c, T, E> {
    fn new(guard: StatementGuard<'c, E>, mapping: Rc<TableMapping<T>>, options: MappingOptions<'c>) -> Self {
        let mut columns = Vec::new();
        if let Some(stmt) = guard.stmt.as_ref() {
            let engine = guard.engine;
            for i in 0..engine.column_count(stmt) {
                let name = engine.column_name(stmt, i);
                match mapping.position(&name) {
                    Some(field) => columns.push((i, field)),
                    None => tracing::trace!(target: LOG_TARGET, column = %name, "unmapped column"),
                }
            }
        }
        Self {
            guard,
            mapping,
            columns,
            options,
            done: false,
        }
    }

    fn read_row(&self) -> Result<T> {
        let engine = self.guard.engine;
        let stmt = self
            .guard
            .stmt
            .as_ref()
            .ok_or_else(|| OrmError::sqlite(SQLITE_MISUSE, "statement already finalized"))?;
        let mut record = T::default();
        for &(index, field) in &self.columns {
            let column = &self.mapping.columns()[field];
            let storage = engine.column_type(stmt, index);
            let value = decode::read_column(
                engine,
                stmt,
                index,
                storage,
                &column.descriptor().field_type,
                &self.options,
            )?;
            column.set_value(&mut record, value)?;
        }
        record.on_loaded();
        Ok(record)
    }

    fn finish(&mut self) {
        self.done = true;
        self.guard.finalize();
    }
}

impl<'c, T: Record, E: Engine + 'c> Iterator for Rows<'c, T, E> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let step = match self.guard.step() {
            Ok(step) => step,
            Err(e) => {
                self.finish();
                return Some(Err(e));
            }
        };
        match step {
            StepResult::Row => {
                let row = self.read_row();
                if row.is_err() {
                    self.finish();
                }
                Some(row)
            }
            StepResult::Done => {
                self.finish();
                None
            }
            StepResult::Error(code) => {
                self.done = true;
                Some(Err(self.guard.error(code)))
            }
        }
    }
}

impl<'c, T: Record, E: Engine + 'c> FusedIterator for Rows<'c, T, E> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::{Bound, FakeCell, FakeEngine};
    use crate::engine::SQLITE_RANGE;
    use crate::mapping::Column;
    use crate::sqlite::SqliteConfig;

    #[derive(Debug, Default, PartialEq)]
    struct Item {
        id: i64,
        name: String,
        price: f64,
        qty: i32,
        tag: Option<String>,
        loads: u32,
    }

    impl Record for Item {
        fn table_mapping() -> TableMapping<Self> {
            TableMapping::new("Item")
                .column(Column::new("Id", |r: &Item| r.id, |r: &mut Item, v| r.id = v).primary_key())
                .column(Column::new("Name", |r: &Item| r.name.clone(), |r: &mut Item, v| r.name = v))
                .column(Column::new("Price", |r: &Item| r.price, |r: &mut Item, v| r.price = v))
                .column(Column::new("Qty", |r: &Item| r.qty, |r: &mut Item, v| r.qty = v))
                .column(Column::new("Tag", |r: &Item| r.tag.clone(), |r: &mut Item, v| r.tag = v))
        }

        fn on_loaded(&mut self) {
            self.loads += 1;
        }
    }

    fn conn(engine: FakeEngine) -> Connection<FakeEngine> {
        Connection::with_engine(engine, SqliteConfig::default())
    }

    fn item_row(id: i64, name: &str) -> Vec<FakeCell> {
        vec![
            FakeCell::Int(id),
            FakeCell::Text("ignored".into()),
            FakeCell::Text(name.into()),
            FakeCell::Real(1.5),
            FakeCell::Int(3),
            FakeCell::Null,
            FakeCell::Int(99),
        ]
    }

    fn item_engine(rows: Vec<Vec<FakeCell>>) -> FakeEngine {
        FakeEngine::with_rows(&["Id", "Extra", "name", "Price", "Qty", "Tag", "Other"], rows)
    }

    #[test]
    fn test_non_query_returns_changes() {
        let mut engine = FakeEngine::default();
        engine.changes = 3;
        let conn = conn(engine);
        let n = conn.create_command("delete from Item").execute_non_query().unwrap();
        assert_eq!(n, 3);
        assert_eq!(conn.engine().finalized.get(), 1);
    }

    #[test]
    fn test_non_query_error_finalizes_first() {
        let mut engine = FakeEngine::default();
        engine.step_error = Some(19);
        let conn = conn(engine);
        let err = conn.create_command("insert").execute_non_query().unwrap_err();
        assert_eq!(err.sqlite_code(), Some(19));
        assert!(err.to_string().contains("scripted failure"));
        assert_eq!(conn.engine().finalized.get(), 1);
    }

    #[test]
    fn test_non_query_rejects_rows() {
        let conn = conn(item_engine(vec![item_row(1, "a")]));
        let err = conn.create_command("select").execute_non_query().unwrap_err();
        assert_eq!(err.sqlite_code(), Some(SQLITE_ROW));
        assert_eq!(conn.engine().finalized.get(), 1);
    }

    #[test]
    fn test_prepare_failure_does_not_finalize() {
        let mut engine = FakeEngine::default();
        engine.prepare_error = Some(1);
        let conn = conn(engine);
        assert!(conn.create_command("bad").execute_non_query().is_err());
        assert_eq!(conn.engine().finalized.get(), 0);
    }

    #[test]
    fn test_query_skips_unmapped_columns() {
        let conn = conn(item_engine(vec![item_row(1, "apple"), item_row(2, "pear")]));
        let items: Vec<Item> = conn.create_command("select *").execute_query().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[1],
            Item {
                id: 2,
                name: "pear".into(),
                price: 1.5,
                qty: 3,
                tag: None,
                loads: 1,
            }
        );
        assert_eq!(conn.engine().finalized.get(), 1);
    }

    #[test]
    fn test_empty_deferred_query_finalizes_once() {
        let conn = conn(item_engine(Vec::new()));
        let mut rows = conn.create_command("select *").execute_deferred_query::<Item>().unwrap();
        assert!(rows.next().is_none());
        assert!(rows.next().is_none());
        drop(rows);
        assert_eq!(conn.engine().finalized.get(), 1);
        assert_eq!(conn.engine().steps.get(), 1);
    }

    #[test]
    fn test_abandoned_deferred_query_finalizes() {
        let conn = conn(item_engine(vec![item_row(1, "a"), item_row(2, "b"), item_row(3, "c")]));
        {
            let mut rows = conn.create_command("select *").execute_deferred_query::<Item>().unwrap();
            assert_eq!(rows.next().unwrap().unwrap().id, 1);
            assert_eq!(conn.engine().finalized.get(), 0);
        }
        assert_eq!(conn.engine().finalized.get(), 1);
        assert_eq!(conn.engine().steps.get(), 1);
    }

    #[test]
    fn test_deferred_query_step_error() {
        let mut engine = item_engine(vec![item_row(1, "a")]);
        engine.step_error = Some(5);
        let conn = conn(engine);
        let mut rows = conn.create_command("select *").execute_deferred_query::<Item>().unwrap();
        let err = rows.next().unwrap().unwrap_err();
        assert_eq!(err.sqlite_code(), Some(5));
        assert!(rows.next().is_none());
        drop(rows);
        assert_eq!(conn.engine().finalized.get(), 1);
    }

    #[derive(Debug, Default)]
    struct Session {
        token: uuid::Uuid,
    }

    impl Record for Session {
        fn table_mapping() -> TableMapping<Self> {
            TableMapping::new("Session").column(Column::new(
                "Token",
                |r: &Session| r.token,
                |r: &mut Session, v| r.token = v,
            ))
        }
    }

    #[test]
    fn test_decode_failure_stops_iteration() {
        let conn = conn(FakeEngine::with_rows(
            &["Token"],
            vec![
                vec![FakeCell::Text("not-a-uuid".into())],
                vec![FakeCell::Text("67e55044-10b1-426f-9247-bb680e5fe0c8".into())],
            ],
        ));
        let mut rows = conn.create_command("select").execute_deferred_query::<Session>().unwrap();
        let err = rows.next().unwrap().unwrap_err();
        assert!(matches!(err, OrmError::Format { target: "uuid", .. }));
        assert!(rows.next().is_none());
        assert_eq!(conn.engine().finalized.get(), 1);
        assert_eq!(conn.engine().steps.get(), 1);
    }

    #[test]
    fn test_scalar() {
        let conn = conn(FakeEngine::with_rows(&["n"], vec![vec![FakeCell::Int(42)]]));
        assert_eq!(conn.create_command("select count(*)").execute_scalar::<i32>().unwrap(), 42);
        assert_eq!(conn.engine().finalized.get(), 1);
    }

    #[test]
    fn test_scalar_without_rows_is_default() {
        let conn = conn(FakeEngine::with_rows(&["n"], Vec::new()));
        assert_eq!(conn.create_command("select n").execute_scalar::<i32>().unwrap(), 0);
        assert_eq!(conn.create_command("select n").execute_scalar::<Option<String>>().unwrap(), None);
        assert_eq!(conn.engine().finalized.get(), 2);
    }

    #[test]
    fn test_scalar_error() {
        let mut engine = FakeEngine::with_rows(&["n"], Vec::new());
        engine.step_error = Some(6);
        let conn = conn(engine);
        let err = conn.create_command("select n").execute_scalar::<i64>().unwrap_err();
        assert_eq!(err.sqlite_code(), Some(6));
        assert_eq!(conn.engine().finalized.get(), 1);
    }

    #[test]
    fn test_binding_indices() {
        let mut engine = FakeEngine::default();
        engine.parameters = vec![":a".into(), ":b".into(), ":c".into()];
        let conn = conn(engine);
        conn.create_command("update")
            .bind(10)
            .bind_named(":c", "named")
            .bind(20_i64)
            .execute_non_query()
            .unwrap();
        assert_eq!(
            conn.engine().bound(),
            vec![
                (1, Bound::Int(10)),
                (3, Bound::Text("named".into())),
                (2, Bound::Int64(20)),
            ]
        );
    }

    #[test]
    fn test_unknown_named_parameter() {
        let conn = conn(FakeEngine::default());
        let err = conn
            .create_command("update")
            .bind_named(":missing", 1)
            .execute_non_query()
            .unwrap_err();
        assert_eq!(err.sqlite_code(), Some(SQLITE_RANGE));
        assert_eq!(conn.engine().finalized.get(), 1);
        assert_eq!(conn.engine().steps.get(), 0);
    }

    #[test]
    fn test_unsupported_bind_is_finalized() {
        struct Opaque;
        let conn = conn(FakeEngine::default());
        let err = conn
            .create_command("insert")
            .bind(Value::custom(Opaque))
            .execute_non_query()
            .unwrap_err();
        assert!(err.is_unsupported());
        assert!(err.to_string().contains("Opaque"));
        assert_eq!(conn.engine().finalized.get(), 1);
    }

    #[test]
    fn test_display_lists_bindings() {
        let conn = conn(FakeEngine::default());
        let cmd = conn
            .create_command("select * from Item where Id = ? and Name = ?")
            .bind(5)
            .bind("pear");
        assert_eq!(
            cmd.to_string(),
            "select * from Item where Id = ? and Name = ?\n  0: 5\n  1: pear"
        );
    }
}
