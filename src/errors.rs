use std::path::PathBuf;

use thiserror::Error;

/// Broad classification used to decide whether a failure aborts a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    NotFound,
    Serialization,
    Io,
}

/// Errors that can arise while moving game state between backends.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Missing or contradictory settings (e.g. networked backend without a URL).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An expected collection file, table or backup is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// A single record could not be converted between document and row shape.
    #[error("serialization error in {entity}.{field}: {message}")]
    Serialization {
        entity: &'static str,
        field: String,
        message: String,
    },

    /// A whole collection file could not be parsed.
    #[error("malformed document file {path}: {source}")]
    MalformedFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Wrapper around IO errors (directory creation, file copies, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapper around serde_json errors outside of per-record decoding.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrapper around rusqlite's error type.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Wrapper around sqlx's error type.
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Config file parse failures.
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl MigrationError {
    pub fn serialization(
        entity: &'static str,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        MigrationError::Serialization {
            entity,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MigrationError::Configuration(_) | MigrationError::Toml(_) => ErrorKind::Configuration,
            MigrationError::NotFound(_) => ErrorKind::NotFound,
            MigrationError::Serialization { .. } => ErrorKind::Serialization,
            MigrationError::MalformedFile { .. }
            | MigrationError::Io(_)
            | MigrationError::Json(_)
            | MigrationError::Sqlite(_)
            | MigrationError::Postgres(_) => ErrorKind::Io,
        }
    }

    /// True for errors that only affect one record and can be skipped.
    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::Serialization
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_errors_are_recoverable() {
        let err = MigrationError::serialization("User", "inventory", "expected value");
        assert_eq!(err.kind(), ErrorKind::Serialization);
        assert!(err.is_recoverable());
        assert_eq!(
            err.to_string(),
            "serialization error in User.inventory: expected value"
        );
    }

    #[test]
    fn configuration_and_io_abort() {
        let cfg = MigrationError::Configuration("no url".into());
        assert!(!cfg.is_recoverable());
        let io = MigrationError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(io.kind(), ErrorKind::Io);
        assert!(!io.is_recoverable());
    }
}
