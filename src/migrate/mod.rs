//! # Migration Orchestrator
//!
//! Moves game state between backends using the document directory as the
//! pivot format:
//!
//! - **export**: relational backend -> document files
//! - **import**: document files -> relational backend
//! - **switch**: backup, export from the active backend, import into the
//!   target, then record the new active backend
//!
//! Every operation honours `dry_run`: reads, decoding, logging and the printed
//! report all happen, but no file, directory, table or state is written.
//!
//! ```rust,no_run
//! use mudmigrate::config::Config;
//! use mudmigrate::migrate::Migrator;
//! use mudmigrate::storage::BackendKind;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load_or_default("mudmigrate.toml").await?;
//!     let migrator = Migrator::new(config, BackendKind::Documents, false);
//!     let report = migrator.import(Some(BackendKind::EmbeddedRelational)).await?;
//!     println!("{report}");
//!     Ok(())
//! }
//! ```

pub mod report;

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde_json::{Map, Value};

use crate::config::Config;
use crate::entities::{self, EntityDef, Row};
use crate::errors::{ErrorKind, MigrationError, Result};
use crate::logutil::{escape_log, redact_url};
use crate::storage::backup::{BackupManager, BackupMetadata, VerifyReport};
use crate::storage::state::BackendState;
use crate::storage::{schema, Backend, BackendKind, ConnectParams, DocumentStore};

pub use report::{
    BackendStatus, BackupSummary, Direction, EntityReport, MigrationReport, Reachability,
    StatusReport, SwitchReport,
};

pub struct Migrator {
    config: Config,
    active: BackendKind,
    dry_run: bool,
}

impl Migrator {
    /// `active` is resolved once by the caller (see [`Config::resolve_active`]).
    pub fn new(config: Config, active: BackendKind, dry_run: bool) -> Self {
        Self {
            config,
            active,
            dry_run,
        }
    }

    pub fn active(&self) -> BackendKind {
        self.active
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Relational backend used when export/import is given no explicit one.
    pub fn default_relational(&self) -> BackendKind {
        if self.active.is_relational() {
            self.active
        } else {
            BackendKind::EmbeddedRelational
        }
    }

    fn params(&self) -> ConnectParams {
        self.config.connect_params()
    }

    fn location(&self, kind: BackendKind, params: &ConnectParams) -> String {
        match kind {
            BackendKind::Documents => params.data_dir.display().to_string(),
            BackendKind::EmbeddedRelational => params.sqlite_path.display().to_string(),
            BackendKind::NetworkedRelational => params
                .database_url
                .as_deref()
                .map_or_else(|| "not configured".to_string(), redact_url),
        }
    }

    /// Per-entity record counts on every backend. Never mutates anything.
    pub async fn status(&self) -> StatusReport {
        let params = self.params();
        let mut backends = Vec::with_capacity(BackendKind::ALL.len());
        for kind in BackendKind::ALL {
            let location = self.location(kind, &params);
            let state = match Backend::open_read_only(kind, &params).await {
                Ok(backend) => {
                    let state = match count_all(&backend).await {
                        Ok(counts) => Reachability::Reachable(counts),
                        Err(e) => Reachability::Unreachable(e.to_string()),
                    };
                    backend.close().await;
                    state
                }
                Err(e) => {
                    debug!("{} unreachable: {}", kind, e);
                    Reachability::Unreachable(e.to_string())
                }
            };
            backends.push(BackendStatus {
                kind,
                location,
                state,
            });
        }
        StatusReport {
            active: self.active,
            backends,
        }
    }

    /// Export every entity from a relational backend into the document directory.
    pub async fn export(&self, source: Option<BackendKind>) -> Result<MigrationReport> {
        let source = source.unwrap_or_else(|| self.default_relational());
        require_relational(source, "export from")?;
        let params = self.params();
        let backend = Backend::open_read_only(source, &params).await?;
        let documents = DocumentStore::new(params.data_dir.clone());
        info!(
            "Exporting {} -> documents at {}{}",
            backend.describe(),
            documents.dir().display(),
            if self.dry_run { " (dry run)" } else { "" }
        );

        let result = self.export_entities(&backend, &documents).await;
        backend.close().await;
        let entities = result?;
        Ok(MigrationReport {
            direction: Direction::Export,
            source: source.to_string(),
            destination: BackendKind::Documents.to_string(),
            dry_run: self.dry_run,
            entities,
        })
    }

    async fn export_entities(
        &self,
        backend: &Backend,
        documents: &DocumentStore,
    ) -> Result<Vec<EntityReport>> {
        let mut reports = Vec::with_capacity(entities::registry().len());
        for def in entities::registry() {
            let Some(rows) = backend.read_rows(def).await? else {
                warn!("No {} table in {}; leaving its file untouched", def.table(), backend.kind());
                reports.push(EntityReport::missing(def.collection));
                continue;
            };
            let mut report = EntityReport::new(def.collection);
            report.read = rows.len();
            let docs = decode_rows(def, &rows, &mut report)?;
            if def.is_singleton() && docs.is_empty() {
                debug!("{} has no row; not writing {}", def.name, def.file_name());
            } else if !self.dry_run {
                documents.write(def, &docs).await?;
            }
            report.written = if def.is_singleton() { docs.len().min(1) } else { docs.len() };
            info!(
                "Exported {} {} record(s), {} skipped",
                report.written, def.collection, report.skipped
            );
            reports.push(report);
        }
        Ok(reports)
    }

    /// Import every document collection into a relational backend, one
    /// transaction per entity.
    pub async fn import(&self, target: Option<BackendKind>) -> Result<MigrationReport> {
        let target = target.unwrap_or_else(|| self.default_relational());
        require_relational(target, "import into")?;
        let params = self.params();
        let documents = DocumentStore::new(params.data_dir.clone());

        let mut backend = if self.dry_run {
            match Backend::open_read_only(target, &params).await {
                Ok(b) => Some(b),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    info!("{} does not exist yet; it would be created", self.location(target, &params));
                    None
                }
                Err(e) => return Err(e),
            }
        } else {
            let b = Backend::open(target, &params).await?;
            schema::ensure_schema(&b, entities::registry()).await?;
            Some(b)
        };
        info!(
            "Importing documents at {} -> {}{}",
            documents.dir().display(),
            self.location(target, &params),
            if self.dry_run { " (dry run)" } else { "" }
        );

        let result = self.import_entities(&documents, backend.as_mut()).await;
        if let Some(b) = backend {
            b.close().await;
        }
        let entities = result?;
        Ok(MigrationReport {
            direction: Direction::Import,
            source: BackendKind::Documents.to_string(),
            destination: target.to_string(),
            dry_run: self.dry_run,
            entities,
        })
    }

    async fn import_entities(
        &self,
        documents: &DocumentStore,
        mut backend: Option<&mut Backend>,
    ) -> Result<Vec<EntityReport>> {
        let mut reports = Vec::with_capacity(entities::registry().len());
        for def in entities::registry() {
            let mut report = EntityReport::new(def.collection);
            let mut docs = match documents.read(def).await? {
                Some(docs) => docs,
                None if def.is_singleton() => {
                    report.missing = true;
                    Vec::new()
                }
                None => {
                    warn!("{} not found; skipping {}", documents.path_for(def).display(), def.name);
                    reports.push(EntityReport::missing(def.collection));
                    continue;
                }
            };
            report.read = docs.len();

            if def.is_singleton() {
                if docs.len() > 1 {
                    warn!("{} holds {} records; importing the first only", def.file_name(), docs.len());
                    docs.truncate(1);
                }
                if docs.is_empty() {
                    let existing = match backend.as_deref() {
                        Some(b) => b.count(def).await?.unwrap_or(0),
                        None => 0,
                    };
                    if existing > 0 {
                        info!("{} already has a row; keeping it", def.name);
                        reports.push(report);
                        continue;
                    }
                    info!("No {} document; writing defaults", def.name);
                    docs.push(Value::Object(Map::new()));
                }
            }

            let rows = encode_docs(def, &docs, &mut report)?;
            if !self.dry_run {
                if let Some(b) = backend.as_deref_mut() {
                    b.upsert_rows(def, &rows).await?;
                }
            }
            let distinct = rows.iter().filter_map(Row::key).collect::<HashSet<_>>().len();
            if distinct < rows.len() {
                warn!(
                    "{} repeats {} key(s); later records only refresh updatable columns",
                    def.file_name(),
                    rows.len() - distinct
                );
            }
            report.written = distinct;
            info!(
                "Imported {} {} record(s), {} skipped",
                report.written, def.collection, report.skipped
            );
            reports.push(report);
        }
        Ok(reports)
    }

    /// Files a backup copies: every collection file, the embedded database
    /// with its journal siblings, and the state file.
    pub fn backup_sources(&self) -> Vec<PathBuf> {
        let data_dir = self.config.data_dir();
        let mut sources: Vec<PathBuf> = entities::registry()
            .iter()
            .map(|def| data_dir.join(def.file_name()))
            .collect();
        let sqlite = self.config.sqlite_path();
        for suffix in ["-wal", "-shm"] {
            let mut sibling = OsString::from(sqlite.as_os_str());
            sibling.push(suffix);
            sources.push(PathBuf::from(sibling));
        }
        sources.push(sqlite);
        sources.push(self.config.state_file());
        sources
    }

    pub fn backup(&self) -> Result<BackupMetadata> {
        BackupManager::new(self.config.backup_dir()).create_backup(&self.backup_sources(), self.dry_run)
    }

    pub fn verify_backup(&self, dir: &Path) -> Result<VerifyReport> {
        BackupManager::new(self.config.backup_dir()).verify_backup(dir)
    }

    /// Existing backup directories, newest first.
    pub fn list_backups(&self) -> Result<Vec<PathBuf>> {
        BackupManager::new(self.config.backup_dir()).list_backups()
    }

    /// Move the active backend to `target`.
    pub async fn switch(&self, target: BackendKind) -> Result<SwitchReport> {
        let from = self.active;
        let mut report = SwitchReport {
            from,
            to: target,
            dry_run: self.dry_run,
            backup: None,
            export: None,
            import: None,
            state: None,
            config_change: Vec::new(),
        };
        if from == target {
            info!("Already on {}; nothing to switch", target);
            return Ok(report);
        }
        if from == BackendKind::NetworkedRelational || target == BackendKind::NetworkedRelational {
            self.params().require_url()?;
        }

        info!("Switching {} -> {}{}", from, target, if self.dry_run { " (dry run)" } else { "" });
        report.backup = Some(self.backup()?);
        if from.is_relational() {
            report.export = Some(self.export(Some(from)).await?);
        }
        if target.is_relational() {
            report.import = Some(self.import(Some(target)).await?);
        }

        report.state = Some(if self.dry_run {
            BackendState {
                current: target,
                previous: Some(from),
                migrated_at: None,
            }
        } else {
            self.config.state_tracker().write(target, Some(from))?
        });
        report.config_change = self.config_change(target);
        Ok(report)
    }

    /// Settings the game server should use for `target`.
    fn config_change(&self, target: BackendKind) -> Vec<String> {
        let params = self.params();
        let mut lines = vec![format!("[storage] backend = \"{}\"", target)];
        match target {
            BackendKind::Documents => {
                lines.push(format!("[storage] data_dir = \"{}\"", params.data_dir.display()))
            }
            BackendKind::EmbeddedRelational => {
                lines.push(format!("[storage] sqlite_path = \"{}\"", params.sqlite_path.display()))
            }
            BackendKind::NetworkedRelational => {
                if let Some(url) = &params.database_url {
                    lines.push(format!("[storage] database_url = \"{}\"", redact_url(url)));
                }
            }
        }
        lines
    }
}

fn require_relational(kind: BackendKind, action: &str) -> Result<()> {
    if kind.is_relational() {
        Ok(())
    } else {
        Err(MigrationError::Configuration(format!(
            "cannot {action} {kind}; choose embedded-relational or networked-relational"
        )))
    }
}

async fn count_all(backend: &Backend) -> Result<Vec<(&'static str, Option<usize>)>> {
    let mut counts = Vec::with_capacity(entities::registry().len());
    for def in entities::registry() {
        counts.push((def.collection, backend.count(def).await?));
    }
    Ok(counts)
}

fn decode_rows(def: &EntityDef, rows: &[Row], report: &mut EntityReport) -> Result<Vec<Value>> {
    let mut docs = Vec::with_capacity(rows.len());
    for row in rows {
        match def.from_row(row) {
            Ok(doc) => docs.push(doc),
            Err(e) if e.is_recoverable() => {
                warn!(
                    "Skipping {} '{}': {}",
                    def.name,
                    escape_log(&row.key().unwrap_or_default()),
                    escape_log(&e.to_string())
                );
                report.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(docs)
}

fn encode_docs(def: &EntityDef, docs: &[Value], report: &mut EntityReport) -> Result<Vec<Row>> {
    let mut rows = Vec::with_capacity(docs.len());
    for doc in docs {
        match def.to_row(doc) {
            Ok(row) => rows.push(row),
            Err(e) if e.is_recoverable() => {
                warn!(
                    "Skipping {} '{}': {}",
                    def.name,
                    escape_log(&def.record_id(doc)),
                    escape_log(&e.to_string())
                );
                report.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(rows)
}
