//! Cost guard: turns a dry-run byte estimate into a price and asks the
//! operator to confirm before the full query runs.

use crate::config::CostConfig;
use std::io::{BufRead, Write};

const BYTES_PER_TIB: f64 = 1_099_511_627_776.0;

/// Price of a query at the configured rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    pub bytes: u64,
    pub usd: f64,
}

/// Outcome of a guard check that allows the query to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Estimate at or below the confirmation threshold.
    BelowThreshold,
    /// Operator answered yes.
    Confirmed,
}

#[derive(Debug)]
pub enum CostError {
    /// Operator did not answer yes. Terminal, never retried.
    Declined { answer: String },
    Io(std::io::Error),
}

impl std::fmt::Display for CostError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CostError::Declined { answer } if answer.is_empty() => {
                write!(f, "query cancelled: no confirmation given")
            }
            CostError::Declined { answer } => {
                write!(f, "query cancelled: answered {answer:?}, expected \"yes\"")
            }
            CostError::Io(e) => write!(f, "failed to read confirmation: {e}"),
        }
    }
}

impl std::error::Error for CostError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CostError::Declined { .. } => None,
            CostError::Io(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for CostError {
    fn from(e: std::io::Error) -> Self {
        CostError::Io(e)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CostGuard {
    usd_per_tib: f64,
    confirm_above_bytes: u64,
}

impl CostGuard {
    pub fn new(usd_per_tib: f64, confirm_above_bytes: u64) -> Self {
        Self {
            usd_per_tib,
            confirm_above_bytes,
        }
    }

    pub fn from_config(config: &CostConfig) -> Self {
        Self::new(config.usd_per_tib, config.confirm_above_bytes)
    }

    pub fn estimate(&self, bytes: u64) -> CostEstimate {
        CostEstimate {
            bytes,
            usd: bytes as f64 / BYTES_PER_TIB * self.usd_per_tib,
        }
    }

    /// Show the estimate on `output` and read one line of `input`.
    ///
    /// Only a case-insensitive `yes` lets the query run; anything else,
    /// including end of input, is `CostError::Declined`.
    pub fn confirm<R: BufRead, W: Write>(
        &self,
        estimate: &CostEstimate,
        mut input: R,
        mut output: W,
    ) -> Result<Decision, CostError> {
        if estimate.bytes <= self.confirm_above_bytes {
            tracing::info!(
                bytes = estimate.bytes,
                usd = estimate.usd,
                "estimate below confirmation threshold"
            );
            return Ok(Decision::BelowThreshold);
        }

        writeln!(output, "{}", format_estimate(estimate))?;
        write!(output, "Are you happy to pay this amount? Type \"yes\" to proceed: ")?;
        output.flush()?;

        let mut answer = String::new();
        input.read_line(&mut answer)?;
        let answer = answer.trim();

        if is_affirmative(answer) {
            tracing::info!(bytes = estimate.bytes, usd = estimate.usd, "cost confirmed");
            Ok(Decision::Confirmed)
        } else {
            tracing::warn!(answer, "cost not confirmed");
            Err(CostError::Declined {
                answer: answer.to_string(),
            })
        }
    }
}

pub fn is_affirmative(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}

/// Format a byte count with binary units.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

/// Format an estimate for display.
pub fn format_estimate(est: &CostEstimate) -> String {
    format!(
        "This query will process {} ({} bytes) and cost approximately ${:.4}.",
        format_bytes(est.bytes),
        est.bytes,
        est.usd
    )
}
