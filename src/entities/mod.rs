//! # Entity Codec Registry
//!
//! Every persisted game entity is described once, declaratively, in
//! [`catalog`]. The orchestrator walks [`registry()`] generically instead of
//! carrying bespoke per-entity code.
//!
//! ```rust
//! use mudmigrate::entities;
//! use serde_json::json;
//!
//! let users = entities::find("users").unwrap();
//! let row = users.to_row(&json!({"username": "alice", "level": 3})).unwrap();
//! let doc = users.from_row(&row).unwrap();
//! assert_eq!(doc["level"], json!(3));
//! assert_eq!(doc["health"], json!(100)); // filled from the defaults table
//! ```

pub mod catalog;
pub mod codec;

pub use codec::{
    normalize_timestamp, Column, ColumnType, EntityDef, Fallback, Field, FieldKind, Layout,
    PrimaryKey, Row, SqlValue, Upsert, EXTRA_COLUMN, SINGLETON_COLUMN, SINGLETON_KEY,
};

/// All entity definitions, in migration order.
pub fn registry() -> &'static [EntityDef] {
    &catalog::ENTITIES
}

/// Look an entity up by collection name (`users`) or type name (`User`).
pub fn find(name: &str) -> Option<&'static EntityDef> {
    registry()
        .iter()
        .find(|e| e.collection == name || e.name.eq_ignore_ascii_case(name))
}
