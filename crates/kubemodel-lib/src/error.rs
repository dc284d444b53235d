//! Error types for the KubeModel library
//!
//! Each subsystem has its own error enum so callers can match on the
//! failure class that matters to them: registration, metrics queries,
//! encoding, storage, computation and export.

use thiserror::Error;

/// Errors returned by KubeModelSet registration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KubeModelError {
    /// An entity was registered with an empty UID.
    #[error("UID is nil for {kind} '{name}'")]
    InvalidUid {
        /// Entity type being registered.
        kind: &'static str,
        /// Name supplied alongside the empty UID.
        name: String,
    },

    /// The cluster was registered with an empty UID.
    #[error("RegisterCluster: uid is nil")]
    InvalidClusterUid,

    /// The set has been completed and no longer accepts registrations.
    #[error("KubeModelSet is frozen: completed at {completed_at}")]
    Frozen {
        /// Completion timestamp of the set.
        completed_at: chrono::DateTime<chrono::Utc>,
    },
}

/// Errors returned by a metrics source query.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    /// Transport level failure talking to the metrics backend.
    #[error("request failed: {0}")]
    Request(String),

    /// The backend answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The backend reported a query error in its response payload.
    #[error("query error ({error_type}): {message}")]
    Query {
        /// Backend error class.
        error_type: String,
        /// Backend error message.
        message: String,
    },

    /// The response could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Retries on a rate-limited backend were exhausted.
    #[error("rate limited after {retries} retries")]
    RateLimited {
        /// Number of retries attempted.
        retries: u32,
    },

    /// The query was cancelled before it completed.
    #[error("query cancelled")]
    Cancelled,

    /// The task running the query panicked or was aborted.
    #[error("query task failed: {0}")]
    TaskFailed(String),

    /// The source is misconfigured.
    #[error("invalid metrics source configuration: {0}")]
    Config(String),
}

/// Result alias for metrics source queries.
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors produced by the binary and JSON codecs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The stream ended before a value could be read.
    #[error("unexpected end of data: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof {
        /// Bytes required by the read.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// A string was not valid UTF-8.
    #[error("invalid utf-8 string")]
    InvalidUtf8,

    /// A string-table reference pointed past the table.
    #[error("string table index {index} out of range (table size {size})")]
    InvalidStringIndex {
        /// Index read from the stream.
        index: u32,
        /// Number of entries in the table.
        size: usize,
    },

    /// A string table reference was read without a table.
    #[error("string table reference without a string table")]
    MissingStringTable,

    /// An enumerated value was not recognized.
    #[error("invalid {kind} value '{value}'")]
    InvalidValue {
        /// Type being decoded.
        kind: &'static str,
        /// Raw value found.
        value: String,
    },

    /// A required field was absent from the stream.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// A length did not fit the wire representation.
    #[error("{what} too large to encode: {len}")]
    LengthOverflow {
        /// Description of the oversized item.
        what: &'static str,
        /// Actual length.
        len: usize,
    },

    /// JSON encoding or decoding failed.
    #[error("json codec error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError::Json(err.to_string())
    }
}

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors returned by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No object exists at the path.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Local filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote storage answered with a failure status.
    #[error("storage request for '{path}' failed with status {status}")]
    Http {
        /// Object path.
        path: String,
        /// HTTP status code.
        status: u16,
    },

    /// Transport level failure talking to remote storage.
    #[error("storage request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote response could not be interpreted.
    #[error("invalid storage response: {0}")]
    InvalidResponse(String),

    /// The path escapes the storage root or is otherwise unusable.
    #[error("invalid storage path: {0}")]
    InvalidPath(String),

    /// The backend is misconfigured.
    #[error("invalid storage configuration: {0}")]
    Config(String),
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors returned by a compute run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ComputeError {
    /// The run was cancelled; partial state was discarded.
    #[error("compute cancelled")]
    Cancelled,

    /// The requested window is empty or inverted.
    #[error("invalid window: start {start} is not before end {end}")]
    InvalidWindow {
        /// Requested start.
        start: chrono::DateTime<chrono::Utc>,
        /// Requested end.
        end: chrono::DateTime<chrono::Utc>,
    },

    /// The pipeline was constructed with an unusable configuration.
    #[error("invalid compute configuration: {0}")]
    Config(String),
}

/// Errors returned by export controllers.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The controller cannot be constructed with this configuration.
    #[error("invalid export configuration: {0}")]
    Config(String),

    /// The compute source failed.
    #[error("compute failed: {0}")]
    Compute(#[from] ComputeError),

    /// The computed value could not be encoded.
    #[error("encode failed: {0}")]
    Encode(#[from] CodecError),

    /// Writing the artifact failed.
    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),
}
