use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use std::fmt;
use std::io;
use std::result;
use thiserror::Error;

/// Error status categories
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorStatus {
    /// Temporary errors that can be resolved by retrying (e.g., timeouts, interrupted I/O)
    Temporary,
    /// Permanent errors that cannot be solved by retrying (e.g., not found, malformed data)
    Permanent,
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorStatus::Temporary => write!(f, "temporary"),
            ErrorStatus::Permanent => write!(f, "permanent"),
        }
    }
}

/// Message plus retry classification for wrapped external errors.
#[derive(Clone, Debug)]
pub struct ErrorStruct {
    pub message: String,
    pub status: ErrorStatus,
}

impl ErrorStruct {
    pub fn new(message: String, status: ErrorStatus) -> Self {
        Self { message, status }
    }
}

impl fmt::Display for ErrorStruct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.status)
    }
}

/// Error type for the icebridge table engine.
#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error("table `{0}` not found")]
    TableNotFound(String),

    #[error("snapshot {snapshot_id} not found in table `{table}`")]
    SnapshotNotFound { table: String, snapshot_id: i64 },

    #[error("refusing to create a table from zero input rows")]
    EmptyInput,

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("invalid row: {0}")]
    InvalidRow(String),

    #[error("commit conflict on table `{table}`: expected version {expected}, found {found}")]
    CommitConflict {
        table: String,
        expected: u64,
        found: u64,
    },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("{0}")]
    Io(ErrorStruct),

    #[error("{0}")]
    Parquet(ErrorStruct),

    #[error("{0}")]
    Arrow(ErrorStruct),

    #[error("{0}")]
    Avro(ErrorStruct),

    #[error("{0}")]
    Json(ErrorStruct),
}

pub type Result<T> = result::Result<T, Error>;

impl Error {
    /// Retry classification of this error.
    pub fn status(&self) -> ErrorStatus {
        match self {
            Error::Io(s)
            | Error::Parquet(s)
            | Error::Arrow(s)
            | Error::Avro(s)
            | Error::Json(s) => s.status,
            Error::Cancelled(_) => ErrorStatus::Temporary,
            Error::CommitConflict { .. } => ErrorStatus::Temporary,
            _ => ErrorStatus::Permanent,
        }
    }
}

impl From<io::Error> for Error {
    fn from(source: io::Error) -> Self {
        let status = match source.kind() {
            io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock => ErrorStatus::Temporary,

            // All other errors are permanent
            _ => ErrorStatus::Permanent,
        };

        Error::Io(ErrorStruct {
            message: format!("IO error: {source}"),
            status,
        })
    }
}

impl From<ParquetError> for Error {
    fn from(source: ParquetError) -> Self {
        let status = match source {
            ParquetError::EOF(_) | ParquetError::NeedMoreData(_) => ErrorStatus::Temporary,

            // All other errors are permanent
            _ => ErrorStatus::Permanent,
        };

        Error::Parquet(ErrorStruct {
            message: format!("Parquet error: {source}"),
            status,
        })
    }
}

impl From<ArrowError> for Error {
    fn from(source: ArrowError) -> Self {
        let status = match source {
            ArrowError::MemoryError(_) | ArrowError::IoError(_, _) => ErrorStatus::Temporary,

            // All other errors are permanent
            _ => ErrorStatus::Permanent,
        };

        Error::Arrow(ErrorStruct {
            message: format!("Arrow error: {source}"),
            status,
        })
    }
}

impl From<apache_avro::Error> for Error {
    fn from(source: apache_avro::Error) -> Self {
        Error::Avro(ErrorStruct {
            message: format!("Avro error: {source}"),
            status: ErrorStatus::Permanent,
        })
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        let status = match source.classify() {
            serde_json::error::Category::Io => ErrorStatus::Temporary,

            // Data format and syntax issues do not go away on retry
            _ => ErrorStatus::Permanent,
        };

        Error::Json(ErrorStruct {
            message: format!("JSON serialization/deserialization error: {source}"),
            status,
        })
    }
}
