//! Scripted in-memory engine that records every call made against it.

use std::cell::{Cell, RefCell};

use super::{Engine, StepResult, StorageClass, SQLITE_OK, SQLITE_RANGE};
use crate::error::{OrmError, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FakeCell {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Bound {
    Null,
    Int(i32),
    Int64(i64),
    Double(f64),
    Text(String),
    Blob(Vec<u8>),
}

#[derive(Debug, Default)]
pub(crate) struct FakeEngine {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<FakeCell>>,
    /// Named parameters; a name's index is its position plus one.
    pub parameters: Vec<String>,
    pub prepare_error: Option<i32>,
    pub step_error: Option<i32>,
    pub changes: i32,
    pub rowid: i64,
    pub bound: RefCell<Vec<(i32, Bound)>>,
    pub prepared: Cell<usize>,
    pub finalized: Cell<usize>,
    pub steps: Cell<usize>,
}

#[derive(Debug)]
pub(crate) struct FakeStmt {
    next: usize,
    current: Option<usize>,
}

impl FakeEngine {
    pub fn with_rows(columns: &[&str], rows: Vec<Vec<FakeCell>>) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
            ..Self::default()
        }
    }

    /// Binds recorded so far, in call order.
    pub fn bound(&self) -> Vec<(i32, Bound)> {
        self.bound.borrow().clone()
    }

    /// The last value bound to `index`.
    pub fn bound_at(&self, index: i32) -> Option<Bound> {
        self.bound
            .borrow()
            .iter()
            .rev()
            .find(|(i, _)| *i == index)
            .map(|(_, b)| b.clone())
    }

    fn cell(&self, stmt: &FakeStmt, index: usize) -> &FakeCell {
        stmt.current
            .and_then(|row| self.rows.get(row))
            .and_then(|row| row.get(index))
            .unwrap_or(&FakeCell::Null)
    }

    fn record(&self, index: i32, bound: Bound) -> i32 {
        if index <= 0 {
            return SQLITE_RANGE;
        }
        self.bound.borrow_mut().push((index, bound));
        SQLITE_OK
    }
}

impl Engine for FakeEngine {
    type Stmt<'a> = FakeStmt
    where
        Self: 'a;

    fn prepare<'a>(&'a self, _sql: &str) -> Result<FakeStmt> {
        if let Some(code) = self.prepare_error {
            return Err(OrmError::sqlite(code, self.errmsg()));
        }
        self.prepared.set(self.prepared.get() + 1);
        Ok(FakeStmt {
            next: 0,
            current: None,
        })
    }

    fn step(&self, stmt: &mut FakeStmt) -> StepResult {
        self.steps.set(self.steps.get() + 1);
        if let Some(code) = self.step_error {
            return StepResult::Error(code);
        }
        if stmt.next < self.rows.len() {
            stmt.current = Some(stmt.next);
            stmt.next += 1;
            StepResult::Row
        } else {
            stmt.current = None;
            StepResult::Done
        }
    }

    fn finalize(&self, _stmt: FakeStmt) -> i32 {
        self.finalized.set(self.finalized.get() + 1);
        SQLITE_OK
    }

    fn bind_null(&self, _stmt: &mut FakeStmt, index: i32) -> i32 {
        self.record(index, Bound::Null)
    }

    fn bind_int(&self, _stmt: &mut FakeStmt, index: i32, value: i32) -> i32 {
        self.record(index, Bound::Int(value))
    }

    fn bind_int64(&self, _stmt: &mut FakeStmt, index: i32, value: i64) -> i32 {
        self.record(index, Bound::Int64(value))
    }

    fn bind_double(&self, _stmt: &mut FakeStmt, index: i32, value: f64) -> i32 {
        self.record(index, Bound::Double(value))
    }

    fn bind_text(&self, _stmt: &mut FakeStmt, index: i32, value: &str) -> i32 {
        self.record(index, Bound::Text(value.to_string()))
    }

    fn bind_blob(&self, _stmt: &mut FakeStmt, index: i32, value: &[u8]) -> i32 {
        self.record(index, Bound::Blob(value.to_vec()))
    }

    fn bind_parameter_index(&self, _stmt: &FakeStmt, name: &str) -> i32 {
        self.parameters
            .iter()
            .position(|p| p == name)
            .map_or(0, |i| i as i32 + 1)
    }

    fn column_count(&self, _stmt: &FakeStmt) -> usize {
        self.columns.len()
    }

    fn column_name(&self, _stmt: &FakeStmt, index: usize) -> String {
        self.columns.get(index).cloned().unwrap_or_default()
    }

    fn column_type(&self, stmt: &FakeStmt, index: usize) -> StorageClass {
        match self.cell(stmt, index) {
            FakeCell::Null => StorageClass::Null,
            FakeCell::Int(_) => StorageClass::Integer,
            FakeCell::Real(_) => StorageClass::Float,
            FakeCell::Text(_) => StorageClass::Text,
            FakeCell::Blob(_) => StorageClass::Blob,
        }
    }

    fn column_int(&self, stmt: &FakeStmt, index: usize) -> i32 {
        self.column_int64(stmt, index) as i32
    }

    fn column_int64(&self, stmt: &FakeStmt, index: usize) -> i64 {
        match self.cell(stmt, index) {
            FakeCell::Int(v) => *v,
            FakeCell::Real(v) => *v as i64,
            FakeCell::Text(s) => s.parse().unwrap_or(0),
            FakeCell::Null | FakeCell::Blob(_) => 0,
        }
    }

    fn column_double(&self, stmt: &FakeStmt, index: usize) -> f64 {
        match self.cell(stmt, index) {
            FakeCell::Int(v) => *v as f64,
            FakeCell::Real(v) => *v,
            FakeCell::Text(s) => s.parse().unwrap_or(0.0),
            FakeCell::Null | FakeCell::Blob(_) => 0.0,
        }
    }

    fn column_text(&self, stmt: &FakeStmt, index: usize) -> Result<String> {
        Ok(match self.cell(stmt, index) {
            FakeCell::Null => String::new(),
            FakeCell::Int(v) => v.to_string(),
            FakeCell::Real(v) => v.to_string(),
            FakeCell::Text(s) => s.clone(),
            FakeCell::Blob(b) => String::from_utf8_lossy(b).into_owned(),
        })
    }

    fn column_blob(&self, stmt: &FakeStmt, index: usize) -> Vec<u8> {
        match self.cell(stmt, index) {
            FakeCell::Blob(b) => b.clone(),
            FakeCell::Text(s) => s.as_bytes().to_vec(),
            _ => Vec::new(),
        }
    }

    fn changes(&self) -> i32 {
        self.changes
    }

    fn last_insert_rowid(&self) -> i64 {
        self.rowid
    }

    fn errmsg(&self) -> String {
        "scripted failure".to_string()
    }
}
