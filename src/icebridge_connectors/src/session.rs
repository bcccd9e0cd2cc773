//! Backend-agnostic database session traits.
//!
//! One session object wraps one connection; a session is used either as the
//! extraction source or as the merge target of a sync run. Implementations
//! live in the feature-gated `postgres` and `sqlite` modules.

use crate::error::Result;
use crate::extraction::ExtractionQuery;
use async_trait::async_trait;
use icebridge::type_mapper::RelationalType;
use icebridge::{LogicalType, Row};

/// SQL flavor, for the few statements that differ per backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Positional parameter placeholder for the first bound parameter.
    pub fn placeholder(&self) -> &'static str {
        match self {
            Dialect::Postgres => "$1",
            Dialect::Sqlite => "?1",
        }
    }
}

/// One column of an extraction result set.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub relational_type: RelationalType,
    pub nullable: bool,
}

/// A materialised extraction delta: result-set columns plus all rows.
#[derive(Debug)]
pub struct ExtractedRows {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Row>,
}

/// A session the coordinator extracts changes from.
#[async_trait]
pub trait SourceSession: Send {
    fn dialect(&self) -> Dialect;

    /// Run the extraction query and materialise the delta. Column metadata
    /// is returned even when the delta is empty.
    async fn extract(&mut self, query: &ExtractionQuery) -> Result<ExtractedRows>;
}

/// A session the merge strategies drive.
#[async_trait]
pub trait TargetSession: Send {
    fn dialect(&self) -> Dialect;

    /// Execute one statement, returning the affected row count.
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Run a single-row, single-column counting query.
    async fn query_count(&mut self, sql: &str) -> Result<i64>;

    /// Bulk-load one batch into `table`. `columns` pairs each column name
    /// with the logical type of the values bound for it.
    async fn bulk_insert(
        &mut self,
        table: &str,
        columns: &[(String, LogicalType)],
        rows: &[Row],
    ) -> Result<u64>;

    async fn begin(&mut self) -> Result<()>;
    async fn commit(&mut self) -> Result<()>;
    async fn rollback(&mut self) -> Result<()>;
}
