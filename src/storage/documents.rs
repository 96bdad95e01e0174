//! Document-directory backend: one JSON file per entity collection.
//!
//! ```text
//! data/
//! ├── users.json              ← list of user documents
//! ├── rooms.json
//! ├── ...
//! ├── mud_config.json         ← singleton object
//! └── game_timer_config.json  ← singleton object
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde_json::Value;
use tokio::fs;

use crate::entities::{EntityDef, PrimaryKey};
use crate::errors::{MigrationError, Result};
use crate::storage::write_atomic;

pub struct DocumentStore {
    dir: PathBuf,
}

impl DocumentStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Like [`DocumentStore::new`] but fails when the directory is absent.
    pub fn open_existing<P: Into<PathBuf>>(dir: P) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(MigrationError::NotFound(format!(
                "document directory {}",
                dir.display()
            )));
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, def: &EntityDef) -> PathBuf {
        self.dir.join(def.file_name())
    }

    /// All documents of a collection, or `None` when its file does not exist.
    pub async fn read(&self, def: &EntityDef) -> Result<Option<Vec<Value>>> {
        let path = self.path_for(def);
        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Some(Vec::new()));
        }
        let parsed: Value = serde_json::from_str(&content)
            .map_err(|source| MigrationError::MalformedFile { path: path.clone(), source })?;
        Ok(Some(unpack(def, parsed, &path)))
    }

    pub async fn count(&self, def: &EntityDef) -> Result<Option<usize>> {
        Ok(self.read(def).await?.map(|docs| docs.len()))
    }

    /// Replace a collection file atomically. Singletons are written as one object.
    pub async fn write(&self, def: &EntityDef, docs: &[Value]) -> Result<()> {
        let path = self.path_for(def);
        let content = if def.is_singleton() {
            match docs {
                [] => {
                    debug!("No {} record to write; leaving {} untouched", def.name, path.display());
                    return Ok(());
                }
                [only] => serde_json::to_string_pretty(only)?,
                [first, ..] => {
                    warn!("{} has {} records; writing the first only", def.name, docs.len());
                    serde_json::to_string_pretty(first)?
                }
            }
        } else {
            serde_json::to_string_pretty(docs)?
        };
        fs::create_dir_all(&self.dir).await?;
        write_atomic(&path, &content)?;
        Ok(())
    }
}

/// Flatten the accepted file shapes into a list of documents.
///
/// Lists are taken as-is. For keyed collections an object whose values are all
/// objects is read as `{ key: document }`, filling in the key when missing.
fn unpack(def: &EntityDef, parsed: Value, path: &Path) -> Vec<Value> {
    match parsed {
        Value::Null => Vec::new(),
        Value::Array(items) => items,
        Value::Object(map) if def.is_singleton() => vec![Value::Object(map)],
        Value::Object(map) => {
            let PrimaryKey::Field { key, .. } = def.primary_key else {
                return vec![Value::Object(map)];
            };
            if !map.values().all(Value::is_object) {
                return vec![Value::Object(map)];
            }
            debug!("{} is keyed by {}; unpacking", path.display(), key);
            map.into_iter()
                .map(|(id, mut doc)| {
                    if let Value::Object(fields) = &mut doc {
                        fields.entry(key.to_string()).or_insert(Value::String(id));
                    }
                    doc
                })
                .collect()
        }
        other => {
            warn!("{} holds a bare value; treating it as one document", path.display());
            vec![other]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities;
    use serde_json::json;

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let users = entities::find("users").unwrap();
        assert!(store.read(users).await.unwrap().is_none());
        assert_eq!(store.count(users).await.unwrap(), None);
    }

    #[tokio::test]
    async fn singleton_written_as_object() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let cfg = entities::find("mud_config").unwrap();
        store.write(cfg, &[json!({"name": "Test MUD"})]).await.unwrap();
        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(store.path_for(cfg)).unwrap()).unwrap();
        assert!(raw.is_object());
        assert_eq!(store.count(cfg).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn keyed_object_collections_are_unpacked() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let users = entities::find("users").unwrap();
        std::fs::write(
            store.path_for(users),
            r#"{"alice": {"level": 2}, "bob": {"username": "bob"}}"#,
        )
        .unwrap();
        let docs = store.read(users).await.unwrap().unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().any(|d| d["username"] == json!("alice")));
    }

    #[tokio::test]
    async fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::new(dir.path());
        let rooms = entities::find("rooms").unwrap();
        std::fs::write(store.path_for(rooms), "[{").unwrap();
        assert!(matches!(
            store.read(rooms).await,
            Err(MigrationError::MalformedFile { .. })
        ));
    }
}
