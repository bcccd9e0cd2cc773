use std::result;
use thiserror::Error;

/// Error type for database connectors and merge strategies.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] icebridge::Error),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("could not decode column `{column}`: {message}")]
    Decode { column: String, message: String },

    #[error("unsupported source column type for `{column}`: {type_name}")]
    UnsupportedColumnType { column: String, type_name: String },

    #[cfg(feature = "db-postgres")]
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[cfg(feature = "db-sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] sqlx::Error),
}

pub type Result<T> = result::Result<T, Error>;

impl Error {
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Decode {
            column: column.into(),
            message: message.into(),
        }
    }
}
