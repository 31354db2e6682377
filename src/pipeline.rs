/// Guarded extraction: dry run, cost confirmation, full query, extraction.
use crate::cost::{CostError, CostGuard};
use crate::extract::{self, ExtractParams, Extraction};
use crate::query::QueryJob;
use crate::warehouse::{Warehouse, WarehouseError};
use std::io::{BufRead, Write};

#[derive(Debug)]
pub enum PipelineError {
    Cost(CostError),
    Warehouse(WarehouseError),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Cost(e) => write!(f, "{e}"),
            PipelineError::Warehouse(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Cost(e) => Some(e),
            PipelineError::Warehouse(e) => Some(e),
        }
    }
}

impl From<CostError> for PipelineError {
    fn from(e: CostError) -> Self {
        PipelineError::Cost(e)
    }
}

impl From<WarehouseError> for PipelineError {
    fn from(e: WarehouseError) -> Self {
        PipelineError::Warehouse(e)
    }
}

/// Run the extractor query behind the cost guard.
///
/// The full query is only issued after the guard lets it through; a
/// declined prompt returns `PipelineError::Cost` without touching the
/// warehouse again.
pub fn run_guarded<W, R, O>(
    warehouse: &W,
    job: &QueryJob,
    params: &ExtractParams,
    guard: &CostGuard,
    input: R,
    output: O,
) -> Result<Extraction, PipelineError>
where
    W: Warehouse + ?Sized,
    R: BufRead,
    O: Write,
{
    let dry_run = warehouse.dry_run(job)?;
    let estimate = guard.estimate(dry_run.total_bytes_processed);
    tracing::info!(
        partitions = dry_run.partitions.len(),
        bytes = estimate.bytes,
        usd = estimate.usd,
        "dry run estimate"
    );

    let decision = guard.confirm(&estimate, input, output)?;
    tracing::debug!(?decision, "running full query");

    let raw = warehouse.run(job)?;
    tracing::info!(rows = raw.len(), "query returned");
    Ok(extract::extract(raw, job, params))
}
