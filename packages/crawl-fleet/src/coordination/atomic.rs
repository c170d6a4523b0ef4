//! Atomic JSON file persistence.
//!
//! Writes go to a temp file in the destination directory, are flushed and
//! fsynced, then renamed over the destination. Readers never observe a
//! partially written record.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{FleetError, Result};

/// Serialize `value` as pretty JSON and atomically replace `path` with it.
pub fn atomic_write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| FleetError::json(path, e))?;
    atomic_write(path, &bytes)
}

/// Atomically replace `path` with `bytes`.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| FleetError::io(dir, e))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| FleetError::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| FleetError::io(tmp.path(), e))?;
    tmp.flush().map_err(|e| FleetError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| FleetError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| FleetError::io(path, e.error))?;

    Ok(())
}

/// Read and decode a JSON record. A missing file is `Ok(None)`.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(FleetError::io(path, e)),
    };
    let value = serde_json::from_slice(&bytes).map_err(|e| FleetError::json(path, e))?;
    Ok(Some(value))
}

/// Delete `path`. A file that is already gone is not an error.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(FleetError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
        count: u64,
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("record.json");

        let record = Record {
            name: "alpha".into(),
            count: 3,
        };
        atomic_write_json(&path, &record).unwrap();

        let loaded: Option<Record> = read_json(&path).unwrap();
        assert_eq!(loaded, Some(record));
    }

    #[test]
    fn test_overwrite_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.json");

        for count in 0..5 {
            atomic_write_json(
                &path,
                &Record {
                    name: "alpha".into(),
                    count,
                },
            )
            .unwrap();
        }

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let loaded: Record = read_json(&path).unwrap().unwrap();
        assert_eq!(loaded.count, 4);
    }

    #[test]
    fn test_missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Option<Record> = read_json(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_corrupt_file_is_a_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, b"{ not json").unwrap();

        let result: Result<Option<Record>> = read_json(&path);
        assert!(matches!(result, Err(FleetError::Json { .. })));
    }

    #[test]
    fn test_remove_missing_file_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.json");
        assert!(!remove_if_exists(&path).unwrap());

        fs::write(&path, b"{}").unwrap();
        assert!(remove_if_exists(&path).unwrap());
        assert!(!path.exists());
    }
}
