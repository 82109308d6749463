//! Whole-file persistence. Every write goes to a temporary file next to the
//! target and is renamed over it, so readers see the old file or the new
//! one and never a partial write.

use std::{
    fs::{self, Permissions},
    io::{ErrorKind, Write},
    path::Path,
};

use serde::{Serialize, de::DeserializeOwned};
use tempfile::NamedTempFile;

use crate::{error::StoreError, model::Snapshot};

/// Atomically replace `path` with `bytes`, creating parent directories.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| StoreError::Write(path.to_path_buf(), e))?;

    let mut tmp =
        NamedTempFile::new_in(parent).map_err(|e| StoreError::Write(path.to_path_buf(), e))?;
    if let Some(perms) = target_permissions(path) {
        tmp.as_file()
            .set_permissions(perms)
            .map_err(|e| StoreError::Write(path.to_path_buf(), e))?;
    }
    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| StoreError::Write(path.to_path_buf(), e))?;
    tmp.persist(path)
        .map_err(|e| StoreError::Write(path.to_path_buf(), e.error))?;

    Ok(())
}

/// Mode for the replacement file: the existing target's, else world-readable.
fn target_permissions(path: &Path) -> Option<Permissions> {
    match fs::metadata(path) {
        Ok(meta) => Some(meta.permissions()),
        Err(_) => new_file_permissions(),
    }
}

#[cfg(unix)]
fn new_file_permissions() -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn new_file_permissions() -> Option<Permissions> {
    None
}

/// Read the whole file at `path`, mapping a missing file to `NotFound`.
pub fn read_to_string(path: &Path) -> Result<String, StoreError> {
    fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => StoreError::NotFound(path.to_path_buf()),
        _ => StoreError::Read(path.to_path_buf(), e),
    })
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let mut json = serde_json::to_vec_pretty(value)
        .map_err(|e| StoreError::Encode(path.to_path_buf(), e))?;
    json.push(b'\n');
    write_atomic(path, &json)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let text = read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| StoreError::Parse(path.to_path_buf(), e))
}

pub fn save_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    write_json(path, snapshot)?;
    log::info!(
        "Snapshot with {} stations written to {}",
        snapshot.metadata.stations_count,
        path.display()
    );
    Ok(())
}

pub fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
    read_json(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Measurement, MeasurementSet, StationConfig, StationResult};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn sample_snapshot() -> Snapshot {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 9, 30, 0).unwrap();
        let girona = StationConfig::new("XJ", "GIRONA", "GIRONA").unwrap();
        let lleida = StationConfig::new("VK", "LLEIDA", "LLEIDA - RAIMAT").unwrap();

        let mut snapshot = Snapshot::new("meteocat_web_scraping", at);
        snapshot.insert(
            "XJ",
            StationResult::succeeded(
                &girona,
                MeasurementSet {
                    tx: Measurement::Value(11.8),
                    tn: Measurement::Value(-3.5),
                    ppt: Measurement::Value(0.0),
                },
                "https://example.test?codi=XJ".into(),
                at,
            ),
        );
        snapshot.insert(
            "VK",
            StationResult::failed(&lleida, "timeout", "https://example.test?codi=VK".into(), at),
        );
        snapshot
    }

    #[test]
    fn snapshot_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data/latest_weather.json");
        let snapshot = sample_snapshot();

        save_snapshot(&path, &snapshot).unwrap();
        let loaded = load_snapshot(&path).unwrap();

        assert_eq!(loaded.stations, snapshot.stations);
        assert_eq!(loaded.metadata, snapshot.metadata);
    }

    #[test]
    fn snapshot_json_shape() {
        let value = serde_json::to_value(sample_snapshot()).unwrap();

        assert_eq!(value["metadata"]["stations_count"], 2);
        assert_eq!(value["metadata"]["source"], "meteocat_web_scraping");
        assert_eq!(value["stations"]["XJ"]["values"]["TX"], 11.8);
        assert_eq!(value["stations"]["VK"]["values"]["PPT"], "-");
        assert_eq!(value["stations"]["VK"]["metadata"]["error"], "timeout");
        assert!(value["stations"]["XJ"]["metadata"].get("error").is_none());
    }

    #[test]
    fn overwrite_replaces_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latest.json");

        save_snapshot(&path, &sample_snapshot()).unwrap();
        let empty = Snapshot::new("other", Utc::now());
        save_snapshot(&path, &empty).unwrap();

        let loaded = load_snapshot(&path).unwrap();
        assert!(loaded.stations.is_empty());
        assert_eq!(loaded.metadata.source, "other");

        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1, "no temporary files left behind");
    }

    #[test]
    fn missing_and_corrupt_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latest.json");

        assert!(matches!(load_snapshot(&path), Err(StoreError::NotFound(_))));

        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_snapshot(&path), Err(StoreError::Parse(..))));
    }

    #[cfg(unix)]
    #[test]
    fn overwrite_keeps_target_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;

        let fresh = dir.path().join("docs/index.html");
        write_atomic(&fresh, b"first").unwrap();
        assert_eq!(mode(&fresh), 0o644);

        let shared = dir.path().join("shared.html");
        fs::write(&shared, "old").unwrap();
        fs::set_permissions(&shared, Permissions::from_mode(0o664)).unwrap();
        write_atomic(&shared, b"new").unwrap();

        assert_eq!(fs::read_to_string(&shared).unwrap(), "new");
        assert_eq!(mode(&shared), 0o664);
    }
}
