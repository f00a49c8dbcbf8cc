use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OvsBackupError>;

/// Errors raised while capturing, storing and restoring switch topologies. The parsing variants
/// (`MalformedRecord`, `UnresolvedReference`, `UnnamedBridge`) are never returned as `Err`, they
/// are collected as diagnostics next to the snapshot that was still built.
#[derive(Error, Debug)]
pub enum OvsBackupError {
    #[error("could not run `{command}` on {host}: {message}")]
    Transport {
        host: String,
        command: String,
        message: String,
    },
    #[error("skipped undecodable line {line_number} of the {table} listing: {line:?}")]
    MalformedRecord {
        table: String,
        line_number: usize,
        line: String,
    },
    #[error("reference {identifier} from {owner} did not resolve to a name, kept as-is")]
    UnresolvedReference {
        owner: String,
        identifier: String,
    },
    #[error("bridge record {index} has no name, skipped")]
    UnnamedBridge {
        index: usize,
    },
    #[error("snapshot {source_name} is malformed: {message}")]
    MalformedSnapshot {
        source_name: String,
        message: String,
    },
    #[error("`{command}` failed: {message}")]
    ToolReportedFailure {
        command: String,
        message: String,
    },
    #[error("snapshot {name} already exists")]
    SnapshotExists {
        name: String,
    },
    #[error("snapshot {name} does not exist")]
    SnapshotNotFound {
        name: String,
    },
    #[error("{name:?} is not a valid snapshot file name")]
    InvalidSnapshotName {
        name: String,
    },
    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OvsBackupError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OvsBackupError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for the kinds that only degrade a capture rather than stop it
    pub fn is_diagnostic(&self) -> bool {
        matches!(
            self,
            OvsBackupError::MalformedRecord { .. }
                | OvsBackupError::UnresolvedReference { .. }
                | OvsBackupError::UnnamedBridge { .. }
        )
    }
}
