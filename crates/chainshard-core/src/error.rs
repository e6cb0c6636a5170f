//! Error taxonomy for the ingestion pipeline.
//!
//! Per-log decode errors are absorbed at the window level. Fetch and store
//! errors abort only the worker that owns the sub-range; the coordinator turns
//! them into a failed-range entry in the job summary.

use thiserror::Error;

use crate::types::BlockWindow;

/// Why a single raw log could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// `topics[0]` is absent or does not match any known signature hash.
    #[error("schema mismatch: expected {expected}, got {got}")]
    SchemaMismatch { expected: String, got: String },

    /// The log matches the schema but its topics or payload are unusable.
    #[error("malformed log: {reason}")]
    Malformed { reason: String },
}

impl DecodeError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    pub fn is_schema_mismatch(&self) -> bool {
        matches!(self, Self::SchemaMismatch { .. })
    }
}

/// A failed "get logs" call after the retry policy has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Transient failure. `exhausted` is `true` once every attempt was used.
    #[error("transient fetch failure after {attempts} attempt(s) (exhausted: {exhausted}): {reason}")]
    Transient {
        reason: String,
        attempts: u32,
        exhausted: bool,
    },

    /// Non-retryable failure (bad request, unknown address, undecodable reply).
    #[error("fatal fetch failure: {reason}")]
    Fatal { reason: String },
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transient { .. } => ErrorKind::FetchTransientExhausted,
            Self::Fatal { .. } => ErrorKind::FetchFatal,
        }
    }

    /// Returns `true` if retries ran out on a transient error.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Transient { exhausted: true, .. })
    }
}

/// Shard persistence failure. Always fatal for the owning worker.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("shard format error in {path}: {reason}")]
    Format { path: String, reason: String },

    #[error("block {block} is outside shard {shard}")]
    OutOfRange { block: u64, shard: String },

    #[error("store task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn format(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::StoreIoFailure
    }
}

/// Why a worker stopped before finishing its sub-range.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("fetch failed for window {window}: {source}")]
    Fetch {
        window: BlockWindow,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Plan(#[from] IngestError),

    #[error("worker panicked: {0}")]
    Panicked(String),
}

impl WorkerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Fetch { source, .. } => source.kind(),
            Self::Store(e) => e.kind(),
            Self::Plan(_) => ErrorKind::InvalidPlan,
            Self::Panicked(_) => ErrorKind::WorkerPanicked,
        }
    }
}

/// Coarse classification reported in the job summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FetchTransientExhausted,
    FetchFatal,
    StoreIoFailure,
    WorkerPanicked,
    InvalidPlan,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FetchTransientExhausted => write!(f, "fetch-transient-exhausted"),
            Self::FetchFatal => write!(f, "fetch-fatal"),
            Self::StoreIoFailure => write!(f, "store-io-failure"),
            Self::WorkerPanicked => write!(f, "worker-panicked"),
            Self::InvalidPlan => write!(f, "invalid-plan"),
        }
    }
}

/// Errors raised while loading an event schema.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("no event declaration found")]
    NoEvent,

    #[error("event '{0}' not found in ABI")]
    EventNotFound(String),

    #[error("unsupported field type '{0}'")]
    UnsupportedType(String),

    #[error("invalid event declaration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ABI JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Job-level validation and configuration errors.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid job plan: {0}")]
    InvalidPlan(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_kinds() {
        let t = FetchError::Transient {
            reason: "timeout".into(),
            attempts: 3,
            exhausted: true,
        };
        assert!(t.is_exhausted());
        assert_eq!(t.kind(), ErrorKind::FetchTransientExhausted);

        let f = FetchError::Fatal {
            reason: "invalid params".into(),
        };
        assert!(!f.is_exhausted());
        assert_eq!(f.kind(), ErrorKind::FetchFatal);
    }

    #[test]
    fn worker_error_kind_follows_source() {
        let err = WorkerError::Fetch {
            window: BlockWindow::new(0, 10),
            source: FetchError::Fatal {
                reason: "bad".into(),
            },
        };
        assert_eq!(err.kind(), ErrorKind::FetchFatal);

        let err: WorkerError = StoreError::format("x.parquet", "bad column").into();
        assert_eq!(err.kind(), ErrorKind::StoreIoFailure);
        assert_eq!(ErrorKind::StoreIoFailure.to_string(), "store-io-failure");
    }
}
