use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::RecordIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    SourceUnavailable,
    MalformedRecord,
    Timeout,
}

/// Recoverable failure of a single refresh. The previous snapshot is kept
/// whenever one of these is returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("failed to read record count: {0}")]
    CountUnavailable(String),
    #[error("record count {0} exceeds addressable range")]
    CountOutOfRange(String),
    #[error("failed to fetch record {index}: {reason}")]
    RecordFetch { index: RecordIndex, reason: String },
    #[error("record {index} could not be decoded: {reason}")]
    MalformedRecord { index: RecordIndex, reason: String },
    #[error("{what} timed out after {after_ms}ms")]
    Timeout { what: String, after_ms: u64 },
}

impl SyncError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::CountUnavailable(_) | Self::RecordFetch { .. } => ErrorCode::SourceUnavailable,
            Self::CountOutOfRange(_) | Self::MalformedRecord { .. } => ErrorCode::MalformedRecord,
            Self::Timeout { .. } => ErrorCode::Timeout,
        }
    }
}
