use std::result;
use thiserror::Error;

/// Error type for the sync orchestration layer.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] icebridge::Error),

    #[error(transparent)]
    Connector(#[from] icebridge_connectors::Error),

    #[error("invalid configuration: {0}")]
    Configuration(String),
}

pub type Result<T> = result::Result<T, Error>;

impl Error {
    /// Stable kind label reported in sync results.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Engine(e) => match e {
                icebridge::Error::TableNotFound(_) => "TableNotFound",
                icebridge::Error::SnapshotNotFound { .. } => "SnapshotNotFound",
                icebridge::Error::EmptyInput => "EmptyInput",
                icebridge::Error::SchemaMismatch(_) => "SchemaMismatch",
                icebridge::Error::InvalidRow(_) => "InvalidRow",
                icebridge::Error::CommitConflict { .. } => "CommitConflict",
                icebridge::Error::Configuration(_) => "ConfigurationError",
                icebridge::Error::Cancelled(_) => "Cancelled",
                _ => "IoError",
            },
            Error::Connector(e) => match e {
                icebridge_connectors::Error::Engine(inner) => {
                    Error::Engine(inner.clone()).kind()
                }
                icebridge_connectors::Error::Configuration(_) => "ConfigurationError",
                _ => "IoError",
            },
            Error::Configuration(_) => "ConfigurationError",
        }
    }
}
