//! # Storage Module - Backend Connector
//!
//! Opens a handle to one of the three storage engines game state can live in:
//!
//! - [`BackendKind::Documents`] - a directory of JSON collection files
//! - [`BackendKind::EmbeddedRelational`] - a single SQLite database file
//! - [`BackendKind::NetworkedRelational`] - a PostgreSQL server
//!
//! Opening a backend never touches its schema; see [`schema::ensure_schema`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mudmigrate::storage::{Backend, BackendKind, ConnectParams};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let params = ConnectParams::new("./data");
//!     let backend = Backend::open(BackendKind::EmbeddedRelational, &params).await?;
//!     println!("opened {}", backend.describe());
//!     Ok(())
//! }
//! ```

pub mod backup;
pub mod documents;
pub mod postgres;
pub mod schema;
pub mod sqlite;
pub mod state;

use std::fmt;
use std::fs::{self as stdfs, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::entities::{EntityDef, Row};
use crate::errors::{MigrationError, Result};
use crate::logutil::redact_url;

pub use documents::DocumentStore;
pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

/// Default embedded database file name inside the data directory.
pub const DEFAULT_SQLITE_FILE: &str = "mud.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    Documents,
    EmbeddedRelational,
    NetworkedRelational,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [
        BackendKind::Documents,
        BackendKind::EmbeddedRelational,
        BackendKind::NetworkedRelational,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Documents => "documents",
            BackendKind::EmbeddedRelational => "embedded-relational",
            BackendKind::NetworkedRelational => "networked-relational",
        }
    }

    pub fn is_relational(self) -> bool {
        !matches!(self, BackendKind::Documents)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "documents" | "document" | "json" | "files" => Ok(BackendKind::Documents),
            "embedded-relational" | "embedded" | "sqlite" => Ok(BackendKind::EmbeddedRelational),
            "networked-relational" | "networked" | "postgres" | "postgresql" => {
                Ok(BackendKind::NetworkedRelational)
            }
            other => Err(MigrationError::Configuration(format!(
                "unknown backend '{other}' (expected documents, embedded-relational or networked-relational)"
            ))),
        }
    }
}

/// Connection parameters for [`Backend::open`].
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub data_dir: PathBuf,
    pub sqlite_path: PathBuf,
    pub database_url: Option<String>,
}

impl ConnectParams {
    pub fn new<P: Into<PathBuf>>(data_dir: P) -> Self {
        let data_dir = data_dir.into();
        Self {
            sqlite_path: data_dir.join(DEFAULT_SQLITE_FILE),
            data_dir,
            database_url: None,
        }
    }

    /// The database URL, or a configuration error naming how to supply one.
    pub fn require_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                MigrationError::Configuration(
                    "networked-relational backend requires a database URL (--database-url or DATABASE_URL)"
                        .to_string(),
                )
            })
    }
}

/// An open storage handle.
pub enum Backend {
    Documents(DocumentStore),
    Embedded(SqliteStore),
    Networked(PostgresStore),
}

impl Backend {
    /// Open a backend for reading and writing. The embedded backend creates its
    /// parent directory and database file when missing.
    pub async fn open(kind: BackendKind, params: &ConnectParams) -> Result<Self> {
        Ok(match kind {
            BackendKind::Documents => Backend::Documents(DocumentStore::new(&params.data_dir)),
            BackendKind::EmbeddedRelational => Backend::Embedded(SqliteStore::open(&params.sqlite_path)?),
            BackendKind::NetworkedRelational => {
                Backend::Networked(PostgresStore::connect(params.require_url()?).await?)
            }
        })
    }

    /// Open without creating anything; used by `status` and dry runs.
    pub async fn open_read_only(kind: BackendKind, params: &ConnectParams) -> Result<Self> {
        Ok(match kind {
            BackendKind::Documents => Backend::Documents(DocumentStore::open_existing(&params.data_dir)?),
            BackendKind::EmbeddedRelational => {
                Backend::Embedded(SqliteStore::open_read_only(&params.sqlite_path)?)
            }
            BackendKind::NetworkedRelational => {
                Backend::Networked(PostgresStore::connect(params.require_url()?).await?)
            }
        })
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Documents(_) => BackendKind::Documents,
            Backend::Embedded(_) => BackendKind::EmbeddedRelational,
            Backend::Networked(_) => BackendKind::NetworkedRelational,
        }
    }

    /// Human-readable location, with credentials redacted.
    pub fn describe(&self) -> String {
        match self {
            Backend::Documents(s) => format!("documents at {}", s.dir().display()),
            Backend::Embedded(s) => format!("embedded-relational at {}", s.path().display()),
            Backend::Networked(s) => format!("networked-relational at {}", redact_url(s.url())),
        }
    }

    /// Record count per collection, `None` when the file or table is absent.
    pub async fn count(&self, def: &EntityDef) -> Result<Option<usize>> {
        match self {
            Backend::Documents(s) => s.count(def).await,
            Backend::Embedded(s) => s.count(def),
            Backend::Networked(s) => s.count(def).await,
        }
    }

    /// All rows of a relational table, `None` when the table is absent.
    pub async fn read_rows(&self, def: &EntityDef) -> Result<Option<Vec<Row>>> {
        match self {
            Backend::Documents(_) => Err(not_relational("read rows from")),
            Backend::Embedded(s) => s.read_rows(def),
            Backend::Networked(s) => s.read_rows(def).await,
        }
    }

    /// Upsert one entity's rows in a single transaction.
    pub async fn upsert_rows(&mut self, def: &EntityDef, rows: &[Row]) -> Result<usize> {
        match self {
            Backend::Documents(_) => Err(not_relational("upsert rows into")),
            Backend::Embedded(s) => s.upsert_rows(def, rows),
            Backend::Networked(s) => s.upsert_rows(def, rows).await,
        }
    }

    pub async fn close(self) {
        if let Backend::Networked(store) = self {
            store.close().await;
        }
    }
}

fn not_relational(action: &str) -> MigrationError {
    MigrationError::Configuration(format!("cannot {action} the documents backend"))
}

/// Replace `path` with `content` via a locked temp-file-then-rename.
///
/// Writers serialise on a `.<name>.lock` sibling; the destination itself is
/// only ever touched by the rename.
pub(crate) fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let base = path.file_name().and_then(|s| s.to_str()).unwrap_or("data.json");
    let lock_file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(dir.join(format!(".{base}.lock")))?;
    lock_file.lock_exclusive()?;

    let mut counter = 0u32;
    let tmp_path = loop {
        let candidate = dir.join(format!(".{}.tmp-{}-{}", base, std::process::id(), counter));
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(mut tmp) => {
                tmp.write_all(content.as_bytes())?;
                tmp.flush()?;
                let _ = tmp.sync_all();
                break candidate;
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                counter = counter.saturating_add(1);
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    };

    if let Err(e) = stdfs::rename(&tmp_path, path) {
        let _ = stdfs::remove_file(&tmp_path);
        return Err(e.into());
    }
    // Persist the rename (best-effort)
    if let Ok(dir_file) = File::open(dir) {
        let _ = dir_file.sync_all();
    }
    drop(lock_file);
    Ok(())
}
