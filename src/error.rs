//! Error types for pyramid export and chunk store operations

use std::fmt;
use thiserror::Error;

/// Error type for the storage layer (sinks, chunk store, reader, codecs)
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported store version: {0}")]
    UnsupportedVersion(u32),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Checksum mismatch for {0}")]
    Checksum(String),

    #[error("Invalid dataset write: {0}")]
    InvalidWrite(String),

    #[error("Dataset state error: {0}")]
    DatasetState(String),

    #[error("Data type mismatch: expected {expected}, found {found}")]
    DataTypeMismatch {
        expected: crate::types::DataType,
        found: crate::types::DataType,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Incomplete pyramid: {0}")]
    Incomplete(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Sink is closed")]
    Closed,
}

/// Specialized Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Position of the export when an error occurred.
///
/// Fields are filled in as the writer descends, so an error raised while
/// writing global metadata carries no timepoint, while a cell write failure
/// names all four coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkUnit {
    pub timepoint: Option<usize>,
    pub view: Option<usize>,
    pub level: Option<usize>,
    pub cell: Option<[usize; 3]>,
}

impl WorkUnit {
    pub fn metadata() -> Self {
        Self::default()
    }

    pub fn view(timepoint: usize, view: usize) -> Self {
        Self {
            timepoint: Some(timepoint),
            view: Some(view),
            ..Self::default()
        }
    }

    pub fn with_level(self, level: usize) -> Self {
        Self {
            level: Some(level),
            ..self
        }
    }

    pub fn with_cell(self, cell: [usize; 3]) -> Self {
        Self {
            cell: Some(cell),
            ..self
        }
    }
}

impl fmt::Display for WorkUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(t) = self.timepoint {
            parts.push(format!("timepoint {}", t));
        }
        if let Some(v) = self.view {
            parts.push(format!("view {}", v));
        }
        if let Some(l) = self.level {
            parts.push(format!("level {}", l));
        }
        if let Some([x, y, z]) = self.cell {
            parts.push(format!("cell ({}, {}, {})", x, y, z));
        }
        if parts.is_empty() {
            write!(f, "metadata")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Error type for the export pipeline
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to load source volume at {unit}: {source}")]
    SourceLoad {
        unit: WorkUnit,
        #[source]
        source: anyhow::Error,
    },

    #[error("Sink write failed at {unit}: {source}")]
    SinkWrite {
        unit: WorkUnit,
        #[source]
        source: StorageError,
    },

    #[error("Export cancelled at {unit}")]
    Cancelled { unit: WorkUnit },

    #[error("Pyramid writer is closed")]
    Closed,
}

impl ExportError {
    /// The work unit in progress when the error occurred, if any
    pub fn unit(&self) -> Option<WorkUnit> {
        match self {
            ExportError::SourceLoad { unit, .. }
            | ExportError::SinkWrite { unit, .. }
            | ExportError::Cancelled { unit } => Some(*unit),
            ExportError::Configuration(_) | ExportError::Closed => None,
        }
    }
}

/// Specialized Result type for export operations
pub type ExportResult<T> = std::result::Result<T, ExportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_unit_display() {
        assert_eq!(WorkUnit::metadata().to_string(), "metadata");
        let unit = WorkUnit::view(3, 1).with_level(2).with_cell([0, 4, 1]);
        assert_eq!(
            unit.to_string(),
            "timepoint 3, view 1, level 2, cell (0, 4, 1)"
        );
    }

    #[test]
    fn test_export_error_unit() {
        let err = ExportError::SinkWrite {
            unit: WorkUnit::view(0, 0).with_level(1),
            source: StorageError::Closed,
        };
        assert_eq!(err.unit().and_then(|u| u.level), Some(1));
        assert!(ExportError::Closed.unit().is_none());
    }
}
