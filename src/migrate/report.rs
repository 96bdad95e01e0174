//! Console summaries printed by each orchestrator operation.
//!
//! Dry runs produce the same shape as live runs, with the header marked.

use std::fmt;

use crate::storage::backup::{BackupMetadata, VerifyReport};
use crate::storage::state::BackendState;
use crate::storage::BackendKind;

const NAME_WIDTH: usize = 18;

fn dry_run_marker(dry_run: bool) -> &'static str {
    if dry_run {
        " (dry run)"
    } else {
        ""
    }
}

/// Per-entity outcome of an export or import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityReport {
    pub collection: &'static str,
    pub read: usize,
    /// Records written, or that would be written in a dry run
    pub written: usize,
    pub skipped: usize,
    /// Source file or table was absent
    pub missing: bool,
}

impl EntityReport {
    pub fn new(collection: &'static str) -> Self {
        Self {
            collection,
            read: 0,
            written: 0,
            skipped: 0,
            missing: false,
        }
    }

    pub fn missing(collection: &'static str) -> Self {
        Self {
            missing: true,
            ..Self::new(collection)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Export,
    Import,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Export => "export",
            Direction::Import => "import",
        })
    }
}

#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub direction: Direction,
    pub source: String,
    pub destination: String,
    pub dry_run: bool,
    pub entities: Vec<EntityReport>,
}

impl MigrationReport {
    pub fn entity(&self, collection: &str) -> Option<&EntityReport> {
        self.entities.iter().find(|e| e.collection == collection)
    }

    pub fn total_written(&self) -> usize {
        self.entities.iter().map(|e| e.written).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.entities.iter().map(|e| e.skipped).sum()
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}{}: {} -> {}",
            self.direction,
            dry_run_marker(self.dry_run),
            self.source,
            self.destination
        )?;
        let verb = if self.dry_run { "would write" } else { "written" };
        for e in &self.entities {
            if e.missing && e.written == 0 {
                writeln!(f, "  {:<NAME_WIDTH$} missing", e.collection)?;
            } else {
                writeln!(
                    f,
                    "  {:<NAME_WIDTH$} read {:>6}  {verb} {:>6}  skipped {:>4}",
                    e.collection, e.read, e.written, e.skipped
                )?;
            }
        }
        write!(
            f,
            "  total: {} {verb}, {} skipped",
            self.total_written(),
            self.total_skipped()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reachability {
    /// Per-collection counts; `None` marks an absent file or table
    Reachable(Vec<(&'static str, Option<usize>)>),
    Unreachable(String),
}

#[derive(Debug, Clone)]
pub struct BackendStatus {
    pub kind: BackendKind,
    pub location: String,
    pub state: Reachability,
}

impl BackendStatus {
    pub fn count(&self, collection: &str) -> Option<usize> {
        match &self.state {
            Reachability::Reachable(counts) => counts
                .iter()
                .find(|(name, _)| *name == collection)
                .and_then(|(_, n)| *n),
            Reachability::Unreachable(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub active: BackendKind,
    pub backends: Vec<BackendStatus>,
}

impl StatusReport {
    pub fn backend(&self, kind: BackendKind) -> Option<&BackendStatus> {
        self.backends.iter().find(|b| b.kind == kind)
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "active backend: {}", self.active)?;
        for (i, backend) in self.backends.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            let marker = if backend.kind == self.active { " *" } else { "" };
            writeln!(f, "{}{} ({})", backend.kind, marker, backend.location)?;
            match &backend.state {
                Reachability::Unreachable(reason) => write!(f, "  unreachable: {reason}")?,
                Reachability::Reachable(counts) => {
                    for (j, (name, count)) in counts.iter().enumerate() {
                        if j > 0 {
                            writeln!(f)?;
                        }
                        match count {
                            Some(n) => write!(f, "  {:<NAME_WIDTH$} {n}", format!("{name}:"))?,
                            None => write!(f, "  {:<NAME_WIDTH$} missing", format!("{name}:"))?,
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

pub struct BackupSummary<'a>(pub &'a BackupMetadata);

impl fmt::Display for BackupSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.0;
        write!(
            f,
            "backup{}: {} ({} files, {} bytes)",
            dry_run_marker(m.dry_run),
            m.path.display(),
            m.files.len(),
            m.total_bytes()
        )?;
        for file in &m.files {
            write!(f, "\n  {:<24} {:>10}  {}", file.name, file.size_bytes, &file.checksum[..12.min(file.checksum.len())])?;
        }
        Ok(())
    }
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "verify: {} ok, {} mismatched, {} missing",
            self.verified.len(),
            self.mismatched.len(),
            self.missing.len()
        )?;
        for name in &self.mismatched {
            write!(f, "\n  checksum mismatch: {name}")?;
        }
        for name in &self.missing {
            write!(f, "\n  missing: {name}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SwitchReport {
    pub from: BackendKind,
    pub to: BackendKind,
    pub dry_run: bool,
    pub backup: Option<BackupMetadata>,
    pub export: Option<MigrationReport>,
    pub import: Option<MigrationReport>,
    /// Written state, or the state that would be written in a dry run
    pub state: Option<BackendState>,
    /// Settings the game server needs to pick up the new backend
    pub config_change: Vec<String>,
}

impl SwitchReport {
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

impl fmt::Display for SwitchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "switch{}: {} -> {}", dry_run_marker(self.dry_run), self.from, self.to)?;
        if self.is_noop() {
            return write!(f, "  already on {}; nothing to do", self.to);
        }
        if let Some(backup) = &self.backup {
            writeln!(f, "{}", BackupSummary(backup))?;
        }
        if let Some(export) = &self.export {
            writeln!(f, "{export}")?;
        }
        if let Some(import) = &self.import {
            writeln!(f, "{import}")?;
        }
        if let Some(state) = &self.state {
            let verb = if self.dry_run { "would record" } else { "recorded" };
            writeln!(
                f,
                "state {verb}: current = {}, previous = {}",
                state.current,
                state.previous.map_or_else(|| "none".to_string(), |p| p.to_string())
            )?;
        }
        write!(f, "configuration change:")?;
        for line in &self.config_change {
            write!(f, "\n  {line}")?;
        }
        Ok(())
    }
}
