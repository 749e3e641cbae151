use std::path::PathBuf;

use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("source not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("malformed source {}: {reason}", path.display())]
    MalformedSource { path: PathBuf, reason: String },
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] StorageError),
    #[error("chunk starting at row {offset} was rolled back: {source}")]
    ChunkCommitFailure {
        offset: u64,
        #[source]
        source: StorageError,
    },
    #[error("load cancelled before chunk starting at row {offset}")]
    Cancelled { offset: u64 },
    #[error("invalid configuration for {field}: {message}")]
    InvalidConfig { field: String, message: String },
    #[error("reject log {}: {source}", path.display())]
    RejectLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IngestError {
    /// Row offset at which processing stopped, when the failure is tied to a chunk.
    pub fn offset(&self) -> Option<u64> {
        match self {
            IngestError::ChunkCommitFailure { offset, .. } | IngestError::Cancelled { offset } => {
                Some(*offset)
            }
            _ => None,
        }
    }

    /// Errors that invalidate the whole run before any row could be processed.
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            IngestError::SourceNotFound(_) | IngestError::MalformedSource { .. }
        )
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        IngestError::MalformedSource {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn config(field: &str, message: impl Into<String>) -> Self {
        IngestError::InvalidConfig {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_is_reported_for_chunk_failures() {
        let err = IngestError::ChunkCommitFailure {
            offset: 50_000,
            source: StorageError::Backend("disk full".to_string()),
        };
        assert_eq!(err.offset(), Some(50_000));
        assert!(err.to_string().contains("row 50000"));

        let err = IngestError::SourceNotFound(PathBuf::from("missing.csv"));
        assert_eq!(err.offset(), None);
        assert!(err.is_source_error());
    }
}
