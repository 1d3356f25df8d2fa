//! SQLite Adapter
//!
//! Implements RowExecutor for SQLite using rusqlite + r2d2 connection pooling.

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, trace};

use super::dialect::SqlDialect;
use super::{scan_row, RowCursor, RowExecutor, SqlValue};
use crate::engine::config::Config;
use crate::engine::context::RunContext;
use crate::engine::error::Result;
use crate::engine::loader::ScanCell;

type DbPool = Pool<SqliteConnectionManager>;
type DbConn = PooledConnection<SqliteConnectionManager>;

const DEFAULT_POOL_SIZE: u32 = 4;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

pub struct SqliteExecutor {
    pool: DbPool,
    db_path: PathBuf,
    dialect: SqlDialect,
    quote_identifiers: bool,
}

impl SqliteExecutor {
    pub fn new(db_path: &Path) -> Result<Self> {
        Self::build(db_path, DEFAULT_POOL_SIZE, DEFAULT_BUSY_TIMEOUT_MS, true)
    }

    /// Executor for the database configured for `project_dir`
    pub fn open(config: &Config, project_dir: &Path) -> Result<Self> {
        let db = &config.database;
        let mut executor = Self::build(
            &config.database_path(project_dir),
            db.pool_size,
            db.busy_timeout_ms,
            db.foreign_keys,
        )?;
        executor.dialect = config.query.dialect;
        executor.quote_identifiers = config.query.quote_identifiers;
        Ok(executor)
    }

    /// Single-connection in-memory database. The connection is never
    /// recycled, so data written through [`SqliteExecutor::connection`]
    /// stays visible to later queries.
    pub fn in_memory() -> Result<Self> {
        let manager =
            SqliteConnectionManager::memory().with_init(pragmas(DEFAULT_BUSY_TIMEOUT_MS, true));
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;

        Ok(Self {
            pool,
            db_path: PathBuf::from(":memory:"),
            dialect: SqlDialect::Sqlite,
            quote_identifiers: false,
        })
    }

    fn build(
        db_path: &Path,
        pool_size: u32,
        busy_timeout_ms: u64,
        foreign_keys: bool,
    ) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path)
            .with_init(pragmas(busy_timeout_ms, foreign_keys));
        let pool = Pool::builder().max_size(pool_size.max(1)).build(manager)?;
        debug!(path = %db_path.display(), pool_size, "opened sqlite pool");

        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
            dialect: SqlDialect::Sqlite,
            quote_identifiers: false,
        })
    }

    pub fn with_quoted_identifiers(mut self, quote: bool) -> Self {
        self.quote_identifiers = quote;
        self
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// A pooled connection, for schema setup and seeding
    pub fn connection(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.connection()?.execute_batch(sql)?;
        Ok(())
    }

    /// Convert a rusqlite ValueRef to SqlValue
    fn value_ref_to_sql(val: ValueRef<'_>) -> SqlValue {
        match val {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(i) => SqlValue::Integer(i),
            ValueRef::Real(f) => SqlValue::Real(f),
            ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
        }
    }
}

fn pragmas(
    busy_timeout_ms: u64,
    foreign_keys: bool,
) -> impl Fn(&mut rusqlite::Connection) -> rusqlite::Result<()> + Send + Sync + 'static {
    move |conn| {
        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
        conn.execute_batch(if foreign_keys {
            "PRAGMA foreign_keys=ON"
        } else {
            "PRAGMA foreign_keys=OFF"
        })
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Bool(b) => ToSqlOutput::Owned(Value::Integer(i64::from(*b))),
            SqlValue::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            SqlValue::Timestamp(t) => ToSqlOutput::Owned(Value::Text(t.to_rfc3339())),
            SqlValue::Uuid(u) => ToSqlOutput::Owned(Value::Text(u.to_string())),
        })
    }
}

struct SqliteCursor<'s> {
    rows: rusqlite::Rows<'s>,
    ctx: &'s RunContext,
    current: Vec<SqlValue>,
    width: usize,
}

impl RowCursor for SqliteCursor<'_> {
    fn next(&mut self) -> Result<bool> {
        self.ctx.check()?;
        match self.rows.next()? {
            Some(row) => {
                self.current.clear();
                for i in 0..self.width {
                    self.current
                        .push(SqliteExecutor::value_ref_to_sql(row.get_ref(i)?));
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn scan_into(&mut self, offset: usize, cells: &mut [ScanCell]) -> Result<()> {
        scan_row(&self.current, offset, cells)
    }
}

impl RowExecutor for SqliteExecutor {
    fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    fn quote_identifiers(&self) -> bool {
        self.quote_identifiers
    }

    fn query(
        &self,
        ctx: &RunContext,
        sql: &str,
        params: &[SqlValue],
        visit: &mut dyn FnMut(&mut dyn RowCursor) -> Result<()>,
    ) -> Result<()> {
        ctx.check()?;
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql)?;
        let width = stmt.column_count();

        let rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        let mut cursor = SqliteCursor {
            rows,
            ctx,
            current: Vec::with_capacity(width),
            width,
        };
        let result = visit(&mut cursor);

        // Release the statement and hand the connection back before returning
        drop(cursor);
        drop(stmt);
        drop(conn);
        trace!(ok = result.is_ok(), "cursor released");

        result
    }
}
