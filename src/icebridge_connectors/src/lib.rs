mod convert;
mod error;
pub mod extraction;
pub mod merge;
pub mod session;

#[cfg(feature = "db-postgres")]
pub mod postgres;
#[cfg(feature = "db-sqlite")]
pub mod sqlite;

pub use error::{Error, Result};
pub use extraction::{validate_identifier, ChangeDetector, ExtractionQuery};
pub use merge::{merge_rows, MergeOutcome, MergeRequest, MergeStrategy, DEFAULT_BATCH_SIZE};
pub use session::{ColumnInfo, Dialect, ExtractedRows, SourceSession, TargetSession};

#[cfg(feature = "db-postgres")]
pub use postgres::PostgresSession;
#[cfg(feature = "db-sqlite")]
pub use sqlite::SqliteSession;
