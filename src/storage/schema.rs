//! SQL generation for the relational backends.
//!
//! Tables are created with `CREATE TABLE IF NOT EXISTS` only; there is no
//! schema versioning. Identifiers are always double-quoted so column names
//! such as `type` or `value` need no special casing.

use crate::entities::{ColumnType, EntityDef};
use crate::errors::Result;
use crate::storage::Backend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    pub fn column_type(self, ty: ColumnType) -> &'static str {
        match (self, ty) {
            (_, ColumnType::Text) => "TEXT",
            (Dialect::Sqlite, ColumnType::Integer) => "INTEGER",
            (Dialect::Sqlite, ColumnType::Real) => "REAL",
            (Dialect::Postgres, ColumnType::Integer) => "BIGINT",
            (Dialect::Postgres, ColumnType::Real) => "DOUBLE PRECISION",
        }
    }

    /// Bind placeholder for the 1-based parameter `n`.
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Dialect::Sqlite => format!("?{n}"),
            Dialect::Postgres => format!("${n}"),
        }
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub fn create_table_sql(def: &EntityDef, dialect: Dialect) -> String {
    let key = def.key_column();
    let columns: Vec<String> = def
        .columns()
        .iter()
        .map(|c| {
            let mut line = format!("{} {}", quote(c.name), dialect.column_type(c.ty));
            if c.name == key {
                line.push_str(" NOT NULL PRIMARY KEY");
            }
            line
        })
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        quote(def.table()),
        columns.join(",\n    ")
    )
}

/// Insert-or-update statement; conflicting keys refresh only
/// [`EntityDef::update_columns`].
pub fn upsert_sql(def: &EntityDef, dialect: Dialect) -> String {
    let columns = def.columns();
    let names: Vec<String> = columns.iter().map(|c| quote(c.name)).collect();
    let params: Vec<String> = (1..=columns.len()).map(|n| dialect.placeholder(n)).collect();
    let updates: Vec<String> = def
        .update_columns()
        .iter()
        .map(|c| format!("{0} = excluded.{0}", quote(c)))
        .collect();
    let on_conflict = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };
    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
        quote(def.table()),
        names.join(", "),
        params.join(", "),
        quote(def.key_column()),
        on_conflict
    )
}

pub fn select_all_sql(def: &EntityDef) -> String {
    let names: Vec<String> = def.columns().iter().map(|c| quote(c.name)).collect();
    format!(
        "SELECT {} FROM {} ORDER BY {}",
        names.join(", "),
        quote(def.table()),
        quote(def.key_column())
    )
}

pub fn count_sql(def: &EntityDef) -> String {
    format!("SELECT COUNT(*) FROM {}", quote(def.table()))
}

/// Create every missing table of `defs` on a relational backend.
///
/// Idempotent. A no-op on the document backend, where collections are files.
pub async fn ensure_schema(backend: &Backend, defs: &[EntityDef]) -> Result<()> {
    match backend {
        Backend::Documents(_) => Ok(()),
        Backend::Embedded(store) => store.ensure_schema(defs),
        Backend::Networked(store) => store.ensure_schema(defs).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities;

    #[test]
    fn create_table_uses_three_column_types() {
        let npc = entities::find("npc_templates").unwrap();
        let sql = create_table_sql(npc, Dialect::Sqlite);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"npc_templates\""));
        assert!(sql.contains("\"id\" TEXT NOT NULL PRIMARY KEY"));
        assert!(sql.contains("\"damage_min\" INTEGER"));
        assert!(sql.contains("\"merchant\" INTEGER,"));
        assert!(sql.contains("\"extra\" TEXT"));

        let pg = create_table_sql(entities::find("item_templates").unwrap(), Dialect::Postgres);
        assert!(pg.contains("\"weight\" DOUBLE PRECISION"));
        assert!(pg.contains("\"value\" BIGINT"));
    }

    #[test]
    fn upsert_updates_only_the_mutable_subset() {
        let users = entities::find("users").unwrap();
        let sql = upsert_sql(users, Dialect::Postgres);
        assert!(sql.contains("ON CONFLICT (\"username\") DO UPDATE SET"));
        assert!(sql.contains("\"health\" = excluded.\"health\""));
        assert!(!sql.contains("\"email\" = excluded"));
        assert!(sql.contains(&format!("${}", users.column_count())));

        let sqlite = upsert_sql(users, Dialect::Sqlite);
        assert!(sqlite.contains("?1, ?2"));
    }

    #[test]
    fn singleton_tables_key_on_id() {
        let cfg = entities::find("mud_config").unwrap();
        assert!(upsert_sql(cfg, Dialect::Sqlite).contains("ON CONFLICT (\"id\")"));
        assert!(select_all_sql(cfg).ends_with("ORDER BY \"id\""));
    }
}
