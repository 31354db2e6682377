//! Interim snapshots of extracted hits.
//!
//! Hits are written as JSON lines and compressed with zstd, so a report can
//! be rebuilt later without paying for another warehouse query.

use crate::hit::Hit;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

const ZSTD_LEVEL: i32 = 3;

#[derive(Debug)]
pub enum SnapshotError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },
    Serialize(serde_json::Error),
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotError::Io { path, source } => {
                write!(f, "snapshot I/O error on {}: {}", path.display(), source)
            }
            SnapshotError::Parse { path, line, source } => {
                write!(f, "invalid hit at {}:{}: {}", path.display(), line, source)
            }
            SnapshotError::Serialize(e) => write!(f, "failed to serialize hit: {e}"),
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SnapshotError::Io { source, .. } => Some(source),
            SnapshotError::Parse { source, .. } => Some(source),
            SnapshotError::Serialize(e) => Some(e),
        }
    }
}

/// Write `hits` to `path` as zstd-compressed JSON lines, creating parent
/// directories as needed. The file is written to a temp name then renamed.
pub fn save(path: &Path, hits: &[Hit]) -> Result<(), SnapshotError> {
    let io_err = |source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut jsonl = Vec::new();
    for hit in hits {
        serde_json::to_writer(&mut jsonl, hit).map_err(SnapshotError::Serialize)?;
        jsonl.push(b'\n');
    }
    let compressed = zstd::encode_all(jsonl.as_slice(), ZSTD_LEVEL).map_err(io_err)?;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(io_err)?;
    }
    let tmp_path = path.with_extension(format!("tmp.{}", std::process::id()));
    if let Err(e) = write_then_rename(&tmp_path, path, &compressed) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(io_err(e));
    }

    tracing::info!(
        path = %path.display(),
        hits = hits.len(),
        bytes = compressed.len(),
        "saved snapshot"
    );
    Ok(())
}

fn write_then_rename(tmp_path: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(tmp_path, path)
}

/// Read a snapshot written by `save`. Blank lines are skipped.
pub fn load(path: &Path) -> Result<Vec<Hit>, SnapshotError> {
    let io_err = |source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    };

    let compressed = std::fs::read(path).map_err(io_err)?;
    let jsonl = zstd::decode_all(compressed.as_slice()).map_err(io_err)?;

    let mut hits = Vec::new();
    for (i, line) in jsonl.as_slice().lines().enumerate() {
        let line = line.map_err(io_err)?;
        if line.trim().is_empty() {
            continue;
        }
        let hit = serde_json::from_str(&line).map_err(|source| SnapshotError::Parse {
            path: path.to_path_buf(),
            line: i + 1,
            source,
        })?;
        hits.push(hit);
    }

    tracing::debug!(path = %path.display(), hits = hits.len(), "loaded snapshot");
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use tempfile::tempdir;

    fn hits() -> Vec<Hit> {
        (1..=3)
            .map(|n| Hit {
                session_id: "10154-1".to_string(),
                client_id: "c".to_string(),
                hit_number: n,
                timestamp: DateTime::from_timestamp(1_653_350_400 + n, 0).unwrap(),
                page_path: format!("/page-{n}"),
                hostname: "www.gov.uk".to_string(),
                row_number: n as u32,
            })
            .collect()
    }

    #[test]
    fn save_then_load_returns_same_hits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("interim/journeys.jsonl.zst");

        save(&path, &hits()).unwrap();
        assert!(path.exists());
        assert_eq!(load(&path).unwrap(), hits());
    }

    #[test]
    fn snapshot_is_zstd_jsonl() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.jsonl.zst");
        save(&path, &hits()).unwrap();

        let raw = zstd::decode_all(std::fs::read(&path).unwrap().as_slice()).unwrap();
        let text = String::from_utf8(raw).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.contains("\"page_path\":\"/page-2\""));
    }

    #[test]
    fn corrupt_line_reports_position() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.jsonl.zst");
        let body = "\n{\"not\":\"a hit\"}\n";
        std::fs::write(&path, zstd::encode_all(body.as_bytes(), 3).unwrap()).unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, SnapshotError::Parse { line: 2, .. }));
    }

    #[test]
    fn failed_rename_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        // a non-empty directory at the target path makes the rename fail
        let path = dir.path().join("taken.jsonl.zst");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();

        let err = save(&path, &hits()).unwrap_err();
        assert!(matches!(err, SnapshotError::Io { .. }));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|name| name.to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty(), "left behind: {leftovers:?}");
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = load(&dir.path().join("nope.jsonl.zst")).unwrap_err();
        assert!(matches!(err, SnapshotError::Io { .. }));
    }
}
