//! Embedded relational backend (single-file SQLite database).

use std::path::{Path, PathBuf};

use log::debug;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqliteValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags, OptionalExtension};

use crate::entities::{EntityDef, Row, SqlValue};
use crate::errors::{MigrationError, Result};
use crate::storage::schema::{self, Dialect};

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(SqliteValue::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(SqliteValue::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Owned(SqliteValue::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

fn cell(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Integer(i),
        ValueRef::Real(f) => SqlValue::Real(f),
        ValueRef::Text(t) | ValueRef::Blob(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
    }
}

pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, creating its parent directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        debug!("Opened SQLite database {}", path.display());
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing database without write access; never creates the file.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MigrationError::NotFound(format!(
                "SQLite database {}",
                path.display()
            )));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ensure_schema(&self, defs: &[EntityDef]) -> Result<()> {
        let ddl: Vec<String> = defs
            .iter()
            .map(|def| schema::create_table_sql(def, Dialect::Sqlite))
            .collect();
        self.conn.execute_batch(&format!("{};", ddl.join(";\n")))?;
        Ok(())
    }

    pub fn table_exists(&self, def: &EntityDef) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [def.table()],
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Row count, or `None` when the table does not exist.
    pub fn count(&self, def: &EntityDef) -> Result<Option<usize>> {
        if !self.table_exists(def)? {
            return Ok(None);
        }
        let n: i64 = self
            .conn
            .query_row(&schema::count_sql(def), [], |r| r.get(0))?;
        Ok(Some(n.max(0) as usize))
    }

    /// Every row of the entity's table, or `None` when the table does not exist.
    pub fn read_rows(&self, def: &EntityDef) -> Result<Option<Vec<Row>>> {
        if !self.table_exists(def)? {
            return Ok(None);
        }
        let width = def.column_count();
        let mut stmt = self.conn.prepare(&schema::select_all_sql(def))?;
        let rows = stmt
            .query_map([], |r| {
                let mut values = Vec::with_capacity(width);
                for i in 0..width {
                    values.push(cell(r.get_ref(i)?));
                }
                Ok(Row { values })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Some(rows))
    }

    /// Upsert all rows of one entity inside a single transaction.
    pub fn upsert_rows(&mut self, def: &EntityDef, rows: &[Row]) -> Result<usize> {
        let sql = schema::upsert_sql(def, Dialect::Sqlite);
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                stmt.execute(params_from_iter(row.values.iter()))?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }
}
