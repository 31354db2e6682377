use std::path::{Path, PathBuf};

use crate::query::DateRange;

/// Manages the `.journeys/` directory layout.
///
/// The warehouse file and interim snapshots live under a single data
/// directory (default `.journeys/`).
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory (e.g. `.journeys/`).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a configured path: absolute paths are kept, relative ones
    /// land under the data directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Directory for extracted-hit snapshots.
    pub fn interim_dir(&self) -> PathBuf {
        self.root.join("interim")
    }

    /// Snapshot file for an extraction over `range`
    /// (e.g. `interim/journeys-20220524-20220524.jsonl.zst`).
    pub fn snapshot_file(&self, range: &DateRange) -> PathBuf {
        self.interim_dir().join(format!(
            "journeys-{}-{}.jsonl.zst",
            range.start_suffix(),
            range.end_suffix()
        ))
    }

    /// Create the root and interim directories.
    /// Returns Ok(true) if the root was created, Ok(false) if it already existed.
    pub fn init(&self) -> std::io::Result<bool> {
        let created = !self.root.exists();
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.interim_dir())?;
        Ok(created)
    }

    /// Ensure the data directory exists and is listed in a sibling
    /// .gitignore when one is present.
    pub fn ensure_initialized(&self) -> std::io::Result<()> {
        if self.init()? {
            tracing::debug!(root = %self.root.display(), "created data directory");
        }
        self.update_gitignore()
    }

    /// Append the data directory to .gitignore if the file exists and
    /// doesn't already contain the entry. A missing .gitignore is left alone.
    pub fn update_gitignore(&self) -> std::io::Result<()> {
        let gitignore_dir = match self.root.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let gitignore_path = gitignore_dir.join(".gitignore");

        let dir_name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.root.to_string_lossy().to_string());
        let entry = format!("{dir_name}/");

        if !gitignore_path.exists() {
            return Ok(());
        }

        let contents = std::fs::read_to_string(&gitignore_path)?;
        let already_present = contents.lines().any(|line| {
            let trimmed = line.trim();
            trimmed == entry || trimmed == dir_name
        });
        if already_present {
            return Ok(());
        }

        let prefix = if contents.ends_with('\n') || contents.is_empty() {
            ""
        } else {
            "\n"
        };
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&gitignore_path)?;
        use std::io::Write;
        writeln!(file, "{prefix}{entry}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_dir_paths() {
        let dd = DataDir::new(".journeys");
        assert_eq!(dd.root(), Path::new(".journeys"));
        assert_eq!(dd.interim_dir(), PathBuf::from(".journeys/interim"));
        assert_eq!(
            dd.resolve(Path::new("warehouse.db")),
            PathBuf::from(".journeys/warehouse.db")
        );
    }

    #[test]
    fn test_resolve_keeps_absolute_paths() {
        let dd = DataDir::new(".journeys");
        let abs = std::env::temp_dir().join("w.db");
        assert_eq!(dd.resolve(&abs), abs);
    }

    #[test]
    fn test_snapshot_file_names_range() {
        let dd = DataDir::new(".journeys");
        let range = DateRange::parse("20220524", "20220526").unwrap();
        assert_eq!(
            dd.snapshot_file(&range),
            PathBuf::from(".journeys/interim/journeys-20220524-20220526.jsonl.zst")
        );
    }

    #[test]
    fn test_init_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join(".journeys");
        let dd = DataDir::new(&root);

        assert!(dd.init().unwrap());
        assert!(dd.interim_dir().exists());
        assert!(!dd.init().unwrap());
    }

    #[test]
    fn test_ensure_initialized_updates_gitignore_once() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join(".journeys");
        let gitignore = tmp.path().join(".gitignore");
        std::fs::write(&gitignore, "target/").unwrap();

        let dd = DataDir::new(&root);
        dd.ensure_initialized().unwrap();
        dd.ensure_initialized().unwrap();

        let contents = std::fs::read_to_string(&gitignore).unwrap();
        assert_eq!(contents, "target/\n.journeys/\n");
    }

    #[test]
    fn test_gitignore_not_created_if_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let dd = DataDir::new(tmp.path().join(".journeys"));
        dd.ensure_initialized().unwrap();
        assert!(!tmp.path().join(".gitignore").exists());
    }
}
