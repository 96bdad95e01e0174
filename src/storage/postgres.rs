//! Networked relational backend (PostgreSQL via sqlx).

use std::time::Duration;

use log::debug;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row as _};

use crate::entities::{Column, ColumnType, EntityDef, Row, SqlValue};
use crate::errors::Result;
use crate::logutil::redact_url;
use crate::storage::schema::{self, Dialect};

pub struct PostgresStore {
    pool: PgPool,
    url: String,
}

fn bind<'q>(
    query: Query<'q, Postgres, PgArguments>,
    column: &Column,
    value: &SqlValue,
) -> Query<'q, Postgres, PgArguments> {
    match (value, column.ty) {
        (SqlValue::Integer(i), ColumnType::Real) => query.bind(*i as f64),
        (SqlValue::Integer(i), _) => query.bind(*i),
        (SqlValue::Real(f), ColumnType::Integer) => query.bind(f.round() as i64),
        (SqlValue::Real(f), _) => query.bind(*f),
        (SqlValue::Text(s), _) => query.bind(s.clone()),
        (SqlValue::Null, ColumnType::Text) => query.bind(None::<String>),
        (SqlValue::Null, ColumnType::Integer) => query.bind(None::<i64>),
        (SqlValue::Null, ColumnType::Real) => query.bind(None::<f64>),
    }
}

fn cell(row: &PgRow, idx: usize, column: &Column) -> std::result::Result<SqlValue, sqlx::Error> {
    let value = match column.ty {
        ColumnType::Text => row.try_get::<Option<String>, _>(idx)?.map(SqlValue::Text),
        ColumnType::Integer => row.try_get::<Option<i64>, _>(idx)?.map(SqlValue::Integer),
        ColumnType::Real => row.try_get::<Option<f64>, _>(idx)?.map(SqlValue::Real),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

impl PostgresStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;
        debug!("Connected to PostgreSQL at {}", redact_url(url));
        Ok(Self {
            pool,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn ensure_schema(&self, defs: &[EntityDef]) -> Result<()> {
        for def in defs {
            sqlx::query(&schema::create_table_sql(def, Dialect::Postgres))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn table_exists(&self, def: &EntityDef) -> Result<bool> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1",
        )
        .bind(def.table())
        .fetch_one(&self.pool)
        .await?;
        Ok(n > 0)
    }

    pub async fn count(&self, def: &EntityDef) -> Result<Option<usize>> {
        if !self.table_exists(def).await? {
            return Ok(None);
        }
        let n: i64 = sqlx::query_scalar(&schema::count_sql(def))
            .fetch_one(&self.pool)
            .await?;
        Ok(Some(n.max(0) as usize))
    }

    pub async fn read_rows(&self, def: &EntityDef) -> Result<Option<Vec<Row>>> {
        if !self.table_exists(def).await? {
            return Ok(None);
        }
        let columns = def.columns();
        let fetched = sqlx::query(&schema::select_all_sql(def))
            .fetch_all(&self.pool)
            .await?;
        let mut rows = Vec::with_capacity(fetched.len());
        for pg_row in &fetched {
            let values = columns
                .iter()
                .enumerate()
                .map(|(idx, col)| cell(pg_row, idx, col))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.push(Row { values });
        }
        Ok(Some(rows))
    }

    /// Upsert all rows of one entity inside a single transaction.
    pub async fn upsert_rows(&self, def: &EntityDef, rows: &[Row]) -> Result<usize> {
        let sql = schema::upsert_sql(def, Dialect::Postgres);
        let columns = def.columns();
        let mut tx = self.pool.begin().await?;
        for row in rows {
            let mut query = sqlx::query(&sql);
            for (column, value) in columns.iter().zip(&row.values) {
                query = bind(query, column, value);
            }
            query.execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(rows.len())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
