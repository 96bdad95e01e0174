//! Backup of the local stores
//!
//! Copies document collection files, the embedded database and the backend
//! state file into a timestamped directory with a checksum manifest. The
//! networked database is never touched; backing it up is an operational
//! concern outside this tool.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{MigrationError, Result};

pub const MANIFEST_FILE: &str = "manifest.json";

/// One copied file as recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupFile {
    /// File name inside the backup directory
    pub name: String,
    /// Where the file was copied from
    pub source: PathBuf,
    pub size_bytes: u64,
    /// SHA256 checksum for verification
    pub checksum: String,
}

/// Backup metadata, written as `manifest.json` inside the backup directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupMetadata {
    /// Unique backup identifier (timestamp-based)
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Backup directory
    pub path: PathBuf,
    pub files: Vec<BackupFile>,
    /// True when nothing was written
    #[serde(default)]
    pub dry_run: bool,
}

impl BackupMetadata {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub verified: Vec<String>,
    pub mismatched: Vec<String>,
    pub missing: Vec<String>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.mismatched.is_empty() && self.missing.is_empty()
    }
}

pub struct BackupManager {
    /// Parent directory holding one sub-directory per backup
    backup_root: PathBuf,
}

impl BackupManager {
    pub fn new<P: Into<PathBuf>>(backup_root: P) -> Self {
        Self {
            backup_root: backup_root.into(),
        }
    }

    pub fn backup_root(&self) -> &Path {
        &self.backup_root
    }

    /// Copy every existing file in `sources` into a fresh timestamped directory.
    ///
    /// Missing sources are skipped. In dry-run mode checksums are still computed
    /// but no directory or file is created.
    pub fn create_backup(&self, sources: &[PathBuf], dry_run: bool) -> Result<BackupMetadata> {
        let timestamp = Utc::now();
        let id = format!("backup_{}", timestamp.format("%Y%m%d_%H%M%S_%3f"));
        let dest = self.backup_root.join(&id);

        log::info!(
            "{} backup {} ({} candidate files)",
            if dry_run { "Planning" } else { "Creating" },
            id,
            sources.len()
        );

        if !dry_run {
            fs::create_dir_all(&dest)?;
        }

        let mut files = Vec::new();
        for source in sources {
            if !source.is_file() {
                log::debug!("Backup skipping absent {}", source.display());
                continue;
            }
            let name = source
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| {
                    MigrationError::Configuration(format!("unusable file name {}", source.display()))
                })?
                .to_string();
            let checksum = calculate_checksum(source)?;
            let size_bytes = fs::metadata(source)?.len();
            if !dry_run {
                fs::copy(source, dest.join(&name))?;
                let copied = calculate_checksum(&dest.join(&name))?;
                if copied != checksum {
                    return Err(MigrationError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("checksum changed while copying {}", source.display()),
                    )));
                }
            }
            log::debug!("Backup {} <- {} ({} bytes)", name, source.display(), size_bytes);
            files.push(BackupFile {
                name,
                source: source.clone(),
                size_bytes,
                checksum,
            });
        }

        let metadata = BackupMetadata {
            id,
            created_at: timestamp,
            path: dest,
            files,
            dry_run,
        };

        if !dry_run {
            let manifest = serde_json::to_string_pretty(&metadata)?;
            fs::write(metadata.path.join(MANIFEST_FILE), manifest)?;
            log::info!(
                "Backup created successfully: {} ({} files, {} bytes)",
                metadata.id,
                metadata.files.len(),
                metadata.total_bytes()
            );
        }

        Ok(metadata)
    }

    /// Re-hash every file listed in a backup's manifest.
    pub fn verify_backup(&self, backup_dir: &Path) -> Result<VerifyReport> {
        let manifest_path = backup_dir.join(MANIFEST_FILE);
        let content = fs::read_to_string(&manifest_path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                MigrationError::NotFound(format!("backup manifest {}", manifest_path.display()))
            }
            _ => e.into(),
        })?;
        let metadata: BackupMetadata = serde_json::from_str(&content).map_err(|source| {
            MigrationError::MalformedFile {
                path: manifest_path.clone(),
                source,
            }
        })?;

        let mut report = VerifyReport::default();
        for file in &metadata.files {
            let copy = backup_dir.join(&file.name);
            if !copy.is_file() {
                report.missing.push(file.name.clone());
                continue;
            }
            if calculate_checksum(&copy)? == file.checksum {
                report.verified.push(file.name.clone());
            } else {
                log::error!("Backup verification FAILED: {} (checksum mismatch)", file.name);
                report.mismatched.push(file.name.clone());
            }
        }
        if report.is_ok() {
            log::info!("Backup verification passed: {}", metadata.id);
        }
        Ok(report)
    }

    /// Backup directories under the root, newest first.
    pub fn list_backups(&self) -> Result<Vec<PathBuf>> {
        if !self.backup_root.is_dir() {
            return Ok(Vec::new());
        }
        let mut dirs: Vec<PathBuf> = fs::read_dir(&self.backup_root)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.join(MANIFEST_FILE).is_file())
            .collect();
        dirs.sort();
        dirs.reverse();
        Ok(dirs)
    }
}

/// Calculate SHA256 checksum of a file
fn calculate_checksum(path: &Path) -> Result<String> {
    use sha2::{Digest, Sha256};

    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0; 8192];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
