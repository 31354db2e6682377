/// Partition loader: read newline-delimited JSON raw hits and append them to
/// a day partition of the warehouse.
use crate::hit::RawHit;
use crate::warehouse::{SqliteWarehouse, WarehouseError};
use chrono::NaiveDate;
use std::io::BufRead;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ImportError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        line: usize,
        source: serde_json::Error,
    },
    Warehouse(WarehouseError),
}

impl std::fmt::Display for ImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportError::Io { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            ImportError::Parse { line, source } => {
                write!(f, "invalid raw hit on line {line}: {source}")
            }
            ImportError::Warehouse(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImportError::Io { source, .. } => Some(source),
            ImportError::Parse { source, .. } => Some(source),
            ImportError::Warehouse(e) => Some(e),
        }
    }
}

impl From<WarehouseError> for ImportError {
    fn from(e: WarehouseError) -> Self {
        ImportError::Warehouse(e)
    }
}

/// Parse raw hits, one JSON object per line. Blank lines are skipped; any
/// malformed line fails the whole import.
pub fn parse_hits<R: BufRead>(reader: R) -> Result<Vec<RawHit>, ImportError> {
    let mut hits = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| ImportError::Io {
            path: PathBuf::from("<input>"),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let hit = serde_json::from_str(&line).map_err(|source| ImportError::Parse {
            line: i + 1,
            source,
        })?;
        hits.push(hit);
    }
    Ok(hits)
}

/// Load `path` into the `day` partition. Returns the number of rows written.
pub fn import_file(
    warehouse: &mut SqliteWarehouse,
    day: NaiveDate,
    path: &Path,
) -> Result<usize, ImportError> {
    let file = std::fs::File::open(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let hits = parse_hits(std::io::BufReader::new(file))?;
    let written = warehouse.insert_hits(day, &hits)?;
    tracing::info!(
        file = %path.display(),
        partition = %warehouse.partition_name(day),
        rows = written,
        "imported raw hits"
    );
    Ok(written)
}
