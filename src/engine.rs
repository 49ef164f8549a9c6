//! Statement-level access to the embedded SQLite engine.
//!
//! [`Engine`] is the capability the mapping layer consumes: prepare, bind,
//! step, read columns and finalize. [`SqliteEngine`] implements it over the
//! bundled SQLite that ships with `rusqlite`. Statement calls go to the C API
//! directly so that the step loop and the finalize point stay under the
//! caller's control; connection-level calls use `rusqlite`'s safe methods.

#![allow(unsafe_code)]

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::mem::ManuallyDrop;
use std::ptr::{self, NonNull};

use rusqlite::ffi;

use crate::error::{OrmError, Result};

#[cfg(test)]
pub(crate) mod fake;

// ── Result codes ────────────────────────────────────────────────────

pub const SQLITE_OK: i32 = ffi::SQLITE_OK;
pub const SQLITE_ERROR: i32 = ffi::SQLITE_ERROR;
pub const SQLITE_MISUSE: i32 = ffi::SQLITE_MISUSE;
pub const SQLITE_RANGE: i32 = ffi::SQLITE_RANGE;
pub const SQLITE_ROW: i32 = ffi::SQLITE_ROW;
pub const SQLITE_DONE: i32 = ffi::SQLITE_DONE;

/// Storage class of a single result cell, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Null,
    Integer,
    Float,
    Text,
    Blob,
}

/// Outcome of advancing a statement by one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Row,
    Done,
    Error(i32),
}

/// Statement-level operations of an embedded SQL engine.
///
/// The engine value stands in for the connection handle. Bind calls return the
/// engine's raw status code ([`SQLITE_OK`] on success). A statement borrows the
/// engine that prepared it, and `finalize` takes it by value, so a statement
/// can neither outlive its engine, be finalized twice, nor be used after it
/// was finalized.
pub trait Engine {
    type Stmt<'a>
    where
        Self: 'a;

    fn prepare<'a>(&'a self, sql: &str) -> Result<Self::Stmt<'a>>;
    fn step(&self, stmt: &mut Self::Stmt<'_>) -> StepResult;
    fn finalize(&self, stmt: Self::Stmt<'_>) -> i32;

    fn bind_null(&self, stmt: &mut Self::Stmt<'_>, index: i32) -> i32;
    fn bind_int(&self, stmt: &mut Self::Stmt<'_>, index: i32, value: i32) -> i32;
    fn bind_int64(&self, stmt: &mut Self::Stmt<'_>, index: i32, value: i64) -> i32;
    fn bind_double(&self, stmt: &mut Self::Stmt<'_>, index: i32, value: f64) -> i32;
    fn bind_text(&self, stmt: &mut Self::Stmt<'_>, index: i32, value: &str) -> i32;
    fn bind_blob(&self, stmt: &mut Self::Stmt<'_>, index: i32, value: &[u8]) -> i32;
    /// One-based index of a named parameter, or 0 if the statement has none by that name.
    fn bind_parameter_index(&self, stmt: &Self::Stmt<'_>, name: &str) -> i32;

    fn column_count(&self, stmt: &Self::Stmt<'_>) -> usize;
    fn column_name(&self, stmt: &Self::Stmt<'_>, index: usize) -> String;
    fn column_type(&self, stmt: &Self::Stmt<'_>, index: usize) -> StorageClass;
    fn column_int(&self, stmt: &Self::Stmt<'_>, index: usize) -> i32;
    fn column_int64(&self, stmt: &Self::Stmt<'_>, index: usize) -> i64;
    fn column_double(&self, stmt: &Self::Stmt<'_>, index: usize) -> f64;
    /// Fails with [`OrmError::Format`] when the stored text is not valid UTF-8.
    fn column_text(&self, stmt: &Self::Stmt<'_>, index: usize) -> Result<String>;
    fn column_blob(&self, stmt: &Self::Stmt<'_>, index: usize) -> Vec<u8>;

    /// Rows changed by the most recently completed statement.
    fn changes(&self) -> i32;
    fn last_insert_rowid(&self) -> i64;
    fn errmsg(&self) -> String;
}

/// Prepared statement owned by [`SqliteEngine`].
///
/// Finalized when dropped unless [`Engine::finalize`] already did so.
#[derive(Debug)]
pub struct RawStatement<'conn> {
    ptr: NonNull<ffi::sqlite3_stmt>,
    conn: &'conn rusqlite::Connection,
}

impl RawStatement<'_> {
    fn as_ptr(&self) -> *mut ffi::sqlite3_stmt {
        self.ptr.as_ptr()
    }

    fn finish(self) -> i32 {
        let this = ManuallyDrop::new(self);
        // SAFETY: `ptr` came from a successful prepare on `conn`, which is
        // still borrowed, and `ManuallyDrop` keeps `Drop` from finalizing it again.
        unsafe { ffi::sqlite3_finalize(this.as_ptr()) }
    }
}

impl Drop for RawStatement<'_> {
    fn drop(&mut self) {
        // SAFETY: as in `finish`; this is the only other place that finalizes `ptr`.
        unsafe {
            ffi::sqlite3_finalize(self.as_ptr());
        }
    }
}

/// [`Engine`] over a `rusqlite` connection.
pub struct SqliteEngine {
    conn: rusqlite::Connection,
}

impl SqliteEngine {
    pub fn new(conn: rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// The wrapped connection, for anything outside the mapping layer.
    pub fn connection(&self) -> &rusqlite::Connection {
        &self.conn
    }

    pub fn into_connection(self) -> rusqlite::Connection {
        self.conn
    }

    fn owns(&self, stmt: &RawStatement<'_>) -> bool {
        ptr::eq(stmt.conn, &self.conn)
    }
}

fn c_index(index: usize) -> c_int {
    c_int::try_from(index).unwrap_or(c_int::MAX)
}

impl Engine for SqliteEngine {
    type Stmt<'a> = RawStatement<'a>
    where
        Self: 'a;

    fn prepare<'a>(&'a self, sql: &str) -> Result<RawStatement<'a>> {
        let len = c_int::try_from(sql.len())
            .map_err(|_| OrmError::sqlite(ffi::SQLITE_TOOBIG, "statement text too long"))?;
        let mut raw = ptr::null_mut();
        // SAFETY: the database handle is valid while `self.conn` lives, and
        // `sql` is read for exactly `len` bytes.
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                self.conn.handle(),
                sql.as_ptr().cast::<c_char>(),
                len,
                &mut raw,
                ptr::null_mut(),
            )
        };
        if rc != SQLITE_OK {
            return Err(OrmError::sqlite(rc, self.errmsg()));
        }
        NonNull::new(raw)
            .map(|ptr| RawStatement {
                ptr,
                conn: &self.conn,
            })
            .ok_or_else(|| OrmError::sqlite(SQLITE_MISUSE, "statement text contains no SQL"))
    }

    fn step(&self, stmt: &mut RawStatement<'_>) -> StepResult {
        // SAFETY: `stmt` is a live statement; it is finalized only by consuming it.
        match unsafe { ffi::sqlite3_step(stmt.as_ptr()) } {
            ffi::SQLITE_ROW => StepResult::Row,
            ffi::SQLITE_DONE => StepResult::Done,
            rc => StepResult::Error(rc),
        }
    }

    /// Statements prepared by another engine are finalized on drop and
    /// reported as [`SQLITE_MISUSE`].
    fn finalize(&self, stmt: RawStatement<'_>) -> i32 {
        if !self.owns(&stmt) {
            return SQLITE_MISUSE;
        }
        stmt.finish()
    }

    fn bind_null(&self, stmt: &mut RawStatement<'_>, index: i32) -> i32 {
        // SAFETY: `stmt` is a live statement.
        unsafe { ffi::sqlite3_bind_null(stmt.as_ptr(), index) }
    }

    fn bind_int(&self, stmt: &mut RawStatement<'_>, index: i32, value: i32) -> i32 {
        // SAFETY: `stmt` is a live statement.
        unsafe { ffi::sqlite3_bind_int(stmt.as_ptr(), index, value) }
    }

    fn bind_int64(&self, stmt: &mut RawStatement<'_>, index: i32, value: i64) -> i32 {
        // SAFETY: `stmt` is a live statement.
        unsafe { ffi::sqlite3_bind_int64(stmt.as_ptr(), index, value) }
    }

    fn bind_double(&self, stmt: &mut RawStatement<'_>, index: i32, value: f64) -> i32 {
        // SAFETY: `stmt` is a live statement.
        unsafe { ffi::sqlite3_bind_double(stmt.as_ptr(), index, value) }
    }

    fn bind_text(&self, stmt: &mut RawStatement<'_>, index: i32, value: &str) -> i32 {
        let Ok(len) = c_int::try_from(value.len()) else {
            return ffi::SQLITE_TOOBIG;
        };
        // SAFETY: `stmt` is live; SQLITE_TRANSIENT makes SQLite copy the `len`
        // bytes before the call returns.
        unsafe {
            ffi::sqlite3_bind_text(
                stmt.as_ptr(),
                index,
                value.as_ptr().cast::<c_char>(),
                len,
                ffi::SQLITE_TRANSIENT(),
            )
        }
    }

    fn bind_blob(&self, stmt: &mut RawStatement<'_>, index: i32, value: &[u8]) -> i32 {
        let Ok(len) = c_int::try_from(value.len()) else {
            return ffi::SQLITE_TOOBIG;
        };
        // SAFETY: as in `bind_text`. An empty slice still has a non-null
        // pointer, which keeps it a zero-length blob rather than NULL.
        unsafe {
            ffi::sqlite3_bind_blob(
                stmt.as_ptr(),
                index,
                value.as_ptr().cast::<c_void>(),
                len,
                ffi::SQLITE_TRANSIENT(),
            )
        }
    }

    fn bind_parameter_index(&self, stmt: &RawStatement<'_>, name: &str) -> i32 {
        let Ok(name) = CString::new(name) else {
            return 0;
        };
        // SAFETY: `stmt` is live and `name` is NUL-terminated.
        unsafe { ffi::sqlite3_bind_parameter_index(stmt.as_ptr(), name.as_ptr()) }
    }

    fn column_count(&self, stmt: &RawStatement<'_>) -> usize {
        // SAFETY: `stmt` is a live statement.
        let n = unsafe { ffi::sqlite3_column_count(stmt.as_ptr()) };
        usize::try_from(n).unwrap_or(0)
    }

    fn column_name(&self, stmt: &RawStatement<'_>, index: usize) -> String {
        // SAFETY: `stmt` is live; a non-null name is a NUL-terminated string
        // valid until the statement is finalized, and it is copied out here.
        unsafe {
            let name = ffi::sqlite3_column_name(stmt.as_ptr(), c_index(index));
            if name.is_null() {
                return String::new();
            }
            CStr::from_ptr(name).to_string_lossy().into_owned()
        }
    }

    fn column_type(&self, stmt: &RawStatement<'_>, index: usize) -> StorageClass {
        // SAFETY: `stmt` is a live statement.
        match unsafe { ffi::sqlite3_column_type(stmt.as_ptr(), c_index(index)) } {
            ffi::SQLITE_INTEGER => StorageClass::Integer,
            ffi::SQLITE_FLOAT => StorageClass::Float,
            ffi::SQLITE_TEXT => StorageClass::Text,
            ffi::SQLITE_BLOB => StorageClass::Blob,
            _ => StorageClass::Null,
        }
    }

    fn column_int(&self, stmt: &RawStatement<'_>, index: usize) -> i32 {
        // SAFETY: `stmt` is a live statement.
        unsafe { ffi::sqlite3_column_int(stmt.as_ptr(), c_index(index)) }
    }

    fn column_int64(&self, stmt: &RawStatement<'_>, index: usize) -> i64 {
        // SAFETY: `stmt` is a live statement.
        unsafe { ffi::sqlite3_column_int64(stmt.as_ptr(), c_index(index)) }
    }

    fn column_double(&self, stmt: &RawStatement<'_>, index: usize) -> f64 {
        // SAFETY: `stmt` is a live statement.
        unsafe { ffi::sqlite3_column_double(stmt.as_ptr(), c_index(index)) }
    }

    fn column_text(&self, stmt: &RawStatement<'_>, index: usize) -> Result<String> {
        let bytes = column_bytes(stmt, index, ffi::sqlite3_column_text);
        String::from_utf8(bytes).map_err(|e| {
            OrmError::format(
                "text",
                String::from_utf8_lossy(e.as_bytes()),
                e.utf8_error(),
            )
        })
    }

    fn column_blob(&self, stmt: &RawStatement<'_>, index: usize) -> Vec<u8> {
        column_bytes(stmt, index, ffi::sqlite3_column_blob)
    }

    fn changes(&self) -> i32 {
        i32::try_from(self.conn.changes()).unwrap_or(i32::MAX)
    }

    fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    fn errmsg(&self) -> String {
        // SAFETY: the handle is valid while `self.conn` lives; a non-null
        // message is NUL-terminated and copied out before any further call.
        unsafe {
            let msg = ffi::sqlite3_errmsg(self.conn.handle());
            if msg.is_null() {
                return String::new();
            }
            CStr::from_ptr(msg).to_string_lossy().into_owned()
        }
    }
}

/// Copies the text or blob bytes of a result cell.
fn column_bytes<P>(
    stmt: &RawStatement<'_>,
    index: usize,
    read: unsafe extern "C" fn(*mut ffi::sqlite3_stmt, c_int) -> *const P,
) -> Vec<u8> {
    let i = c_index(index);
    // SAFETY: `stmt` is live. The pointer from `read` stays valid until the
    // next step or finalize and covers `sqlite3_column_bytes` bytes, which are
    // fetched after it as the C API requires.
    unsafe {
        let data = read(stmt.as_ptr(), i);
        if data.is_null() {
            return Vec::new();
        }
        let len = usize::try_from(ffi::sqlite3_column_bytes(stmt.as_ptr(), i)).unwrap_or(0);
        std::slice::from_raw_parts(data.cast::<u8>(), len).to_vec()
    }
}
