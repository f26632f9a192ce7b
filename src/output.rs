use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::catalog::record::NormalizedRecord;

pub const DEFAULT_OUTPUT: &str = "docs/public/books.json";

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to serialize catalog: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Replace the file at `path` with `records` as a pretty-printed JSON array.
///
/// The document is written to a temp file next to the target and renamed over
/// it, so readers see either the old or the new file, never a partial one.
pub fn write_catalog<T: Serialize>(path: &Path, records: &[T]) -> Result<(), WriteError> {
    let json = serde_json::to_string_pretty(records)?;
    let io_err = |source: std::io::Error| WriteError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(io_err)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
    tmp.write_all(json.as_bytes()).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;

    // Temp files are created 0600; the catalog is a public asset.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::metadata(path)
            .map(|m| m.permissions())
            .unwrap_or_else(|_| fs::Permissions::from_mode(0o644));
        tmp.as_file().set_permissions(perms).map_err(io_err)?;
    }

    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

/// Fallback document for degraded runs.
pub fn write_empty(path: &Path) -> Result<(), WriteError> {
    write_catalog::<NormalizedRecord>(path, &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::normalize::{normalize, FieldSelection};
    use crate::catalog::record::RawRow;

    fn book(title: &str, cover: &str) -> NormalizedRecord {
        let row: RawRow = [("Title", title), ("Cover", cover)].into_iter().collect();
        normalize(row, &FieldSelection::default())
    }

    #[test]
    fn pretty_array_with_source_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.json");
        write_catalog(&path, &[book("Dune", "http://x/y.png")]).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "[\n  {\n    \"Title\": \"Dune\",\n    \"Cover\": \"http://x/y.png\"\n  }\n]"
        );
    }

    #[test]
    fn empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.json");
        write_empty(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "[]");
    }

    #[test]
    fn creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs/public/books.json");
        write_empty(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn replaces_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.json");
        write_catalog(&path, &[book("Dune", ""), book("Emma", "")]).unwrap();
        write_catalog(&path, &[book("Solaris", "")]).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
        assert_eq!(value[0]["Title"], "Solaris");
        // Only the target remains, no stray temp files.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn same_records_same_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.json");
        write_catalog(&path, &[book("Dune", "a"), book("Dune", "a")]).unwrap();
        let first = fs::read(&path).unwrap();
        write_catalog(&path, &[book("Dune", "a"), book("Dune", "a")]).unwrap();
        assert_eq!(first, fs::read(&path).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn new_file_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.json");
        write_empty(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn parent_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("docs");
        fs::write(&blocker, "not a directory").unwrap();
        let err = write_empty(&blocker.join("books.json")).unwrap_err();
        assert!(matches!(err, WriteError::Io { .. }));
    }
}
