//! Store traits executing queries against a backend
//!
//! The repository layer only decides *which* query runs; a [`Store`] runs
//! it. Rows travel as JSON objects ([`Record`]).

use crate::core::error::RepoResult;
use crate::core::query::Query;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// A row as a JSON object
pub type Record = Map<String, Value>;

/// Aggregate functions supported by [`Store::aggregate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Min,
    Max,
    Sum,
    Avg,
}

/// Backend executing queries
///
/// Implementations must honor every clause of a [`Query`] they accept and
/// reject the ones they cannot evaluate instead of silently ignoring them.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch matching rows, projected to `columns` (`["*"]` selects all)
    async fn select(&self, query: &Query, columns: &[&str]) -> RepoResult<Vec<Record>>;

    /// Count matching rows, ignoring ordering and slicing
    async fn count(&self, query: &Query) -> RepoResult<u64>;

    /// Compute an aggregate over `column` of the matching rows
    ///
    /// Returns `Value::Null` for min/max/avg over no rows and `0` for sum.
    async fn aggregate(&self, query: &Query, function: Aggregate, column: &str)
        -> RepoResult<Value>;

    /// Insert rows into `table`, generating keys where missing
    ///
    /// # Returns
    /// The key of every inserted row, in input order
    async fn insert(&self, table: &str, key_name: &str, rows: Vec<Record>)
        -> RepoResult<Vec<Value>>;

    /// Set `data` on every matching row; returns the number of affected rows
    async fn update(&self, query: &Query, data: &Record) -> RepoResult<u64>;

    /// Delete every matching row; returns the number of deleted rows
    async fn delete(&self, query: &Query) -> RepoResult<u64>;

    /// Add `amount` to numeric `column` on every matching row
    async fn increment(&self, query: &Query, column: &str, amount: f64) -> RepoResult<u64>;
}

/// Backend supporting a single, non-nested transaction
#[async_trait]
pub trait Transactional: Send + Sync {
    async fn begin(&self) -> RepoResult<()>;

    async fn commit(&self) -> RepoResult<()>;

    async fn rollback(&self) -> RepoResult<()>;
}
