pub mod sqlite;

use crate::hit::RawHit;
use crate::query::QueryJob;

pub use sqlite::SqliteWarehouse;

/// Result of a dry run: what the query would scan, without reading rows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DryRun {
    /// Estimated bytes processed across the referenced columns.
    pub total_bytes_processed: u64,
    /// Partitions the query would touch, in date order.
    pub partitions: Vec<String>,
}

/// Errors produced by warehouse operations.
#[derive(Debug)]
pub enum WarehouseError {
    Db(rusqlite::Error),
    InvalidPartition(String),
}

impl std::fmt::Display for WarehouseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WarehouseError::Db(e) => write!(f, "warehouse error: {e}"),
            WarehouseError::InvalidPartition(name) => {
                write!(f, "invalid partition name: {name}")
            }
        }
    }
}

impl std::error::Error for WarehouseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WarehouseError::Db(e) => Some(e),
            WarehouseError::InvalidPartition(_) => None,
        }
    }
}

impl From<rusqlite::Error> for WarehouseError {
    fn from(e: rusqlite::Error) -> Self {
        WarehouseError::Db(e)
    }
}

/// Query interface over a day-partitioned event log.
pub trait Warehouse {
    /// Estimate what `job` would scan without materializing any rows.
    fn dry_run(&self, job: &QueryJob) -> Result<DryRun, WarehouseError>;

    /// Execute `job` and return the matching rows.
    fn run(&self, job: &QueryJob) -> Result<Vec<RawHit>, WarehouseError>;
}
