//! Row Executor Layer
//!
//! The engine never talks to a driver directly. It hands a finished
//! statement to a [`RowExecutor`] and reads rows back through a
//! [`RowCursor`]. SQLite is provided; other backends implement the pair.

pub mod dialect;
pub mod sqlite;

pub use dialect::SqlDialect;
pub use sqlite::SqliteExecutor;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use uuid::Uuid;

use super::context::RunContext;
use super::error::{HydrateError, Result};
use super::loader::ScanCell;

/// Executes one bound statement and streams its rows to a visitor.
pub trait RowExecutor {
    /// Which SQL dialect projections are rendered in
    fn dialect(&self) -> SqlDialect;

    /// Whether projected identifiers should be quoted
    fn quote_identifiers(&self) -> bool {
        false
    }

    /// Run `sql` with positional `params` and pass the open cursor to `visit`.
    ///
    /// The cursor only lives for the duration of the call: implementations
    /// release it before returning, whether `visit` succeeded, failed, or the
    /// statement never produced a cursor. Cancellation is read from `ctx`.
    fn query(
        &self,
        ctx: &RunContext,
        sql: &str,
        params: &[SqlValue],
        visit: &mut dyn FnMut(&mut dyn RowCursor) -> Result<()>,
    ) -> Result<()>;
}

/// Forward-only cursor over the rows of one statement
pub trait RowCursor {
    /// Advance to the next row. `false` once the rows are exhausted.
    fn next(&mut self) -> Result<bool>;

    /// Fill `cells` from the current row, starting at column `offset`.
    fn scan_into(&mut self, offset: usize, cells: &mut [ScanCell]) -> Result<()>;
}

/// Copy a buffered row into scan cells. Shared by cursors that materialize
/// the current row as a `Vec<SqlValue>`.
pub fn scan_row(row: &[SqlValue], offset: usize, cells: &mut [ScanCell]) -> Result<()> {
    let end = offset + cells.len();
    if end > row.len() {
        return Err(HydrateError::Execution(format!(
            "row has {} columns but the projection needs {}",
            row.len(),
            end
        )));
    }

    for (cell, raw) in cells.iter_mut().zip(&row[offset..end]) {
        cell.fill(raw.clone())?;
    }
    Ok(())
}

/// SQL value for parameters and scanned columns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
    Blob(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Short name of the variant, used in conversion errors
    pub fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Integer(_) => "integer",
            SqlValue::Real(_) => "real",
            SqlValue::Text(_) => "text",
            SqlValue::Bool(_) => "bool",
            SqlValue::Blob(_) => "blob",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::Uuid(_) => "uuid",
        }
    }
}

// Reals compare by bit pattern so the value can live in hash-based identity maps.
impl PartialEq for SqlValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SqlValue::Null, SqlValue::Null) => true,
            (SqlValue::Integer(a), SqlValue::Integer(b)) => a == b,
            (SqlValue::Real(a), SqlValue::Real(b)) => a.to_bits() == b.to_bits(),
            (SqlValue::Text(a), SqlValue::Text(b)) => a == b,
            (SqlValue::Bool(a), SqlValue::Bool(b)) => a == b,
            (SqlValue::Blob(a), SqlValue::Blob(b)) => a == b,
            (SqlValue::Timestamp(a), SqlValue::Timestamp(b)) => a == b,
            (SqlValue::Uuid(a), SqlValue::Uuid(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for SqlValue {}

impl Hash for SqlValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            SqlValue::Null => {}
            SqlValue::Integer(i) => i.hash(state),
            SqlValue::Real(f) => f.to_bits().hash(state),
            SqlValue::Text(s) => s.hash(state),
            SqlValue::Bool(b) => b.hash(state),
            SqlValue::Blob(b) => b.hash(state),
            SqlValue::Timestamp(t) => t.hash(state),
            SqlValue::Uuid(u) => u.hash(state),
        }
    }
}

macro_rules! sql_value_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(value: $ty) -> Self {
                    SqlValue::Integer(i64::from(value))
                }
            }
        )*
    };
}

sql_value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        SqlValue::Blob(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(value)
    }
}

impl From<Uuid> for SqlValue {
    fn from(value: Uuid) -> Self {
        SqlValue::Uuid(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}
