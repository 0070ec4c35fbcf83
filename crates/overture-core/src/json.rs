//! JSON operations using sonic-rs.

use crate::{Error, Result};
use serde::{Serialize, de::DeserializeOwned};
use std::path::Path;

/// Deserialize JSON string.
///
/// # Errors
/// Returns error if JSON is invalid.
pub fn from_json<T: DeserializeOwned>(s: &str) -> Result<T> {
    sonic_rs::from_str(s).map_err(Error::from)
}

/// Deserialize JSON bytes.
///
/// # Errors
/// Returns error if JSON is invalid.
pub fn from_json_slice<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    sonic_rs::from_slice(bytes).map_err(Error::from)
}

/// Serialize to compact JSON.
///
/// # Errors
/// Returns error if serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    sonic_rs::to_string(value).map_err(Error::from)
}

/// Serialize to pretty JSON.
///
/// # Errors
/// Returns error if serialization fails.
pub fn to_json_pretty<T: Serialize>(value: &T) -> Result<String> {
    sonic_rs::to_string_pretty(value).map_err(Error::from)
}

/// Read a JSON state file. A missing file yields `None`.
///
/// # Errors
/// Returns [`Error::CorruptState`] if the file exists but does not parse.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(path, e)),
    };
    sonic_rs::from_slice(&bytes)
        .map(Some)
        .map_err(|e| Error::CorruptState {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Write a value as pretty JSON, atomically replacing `path`.
///
/// # Errors
/// Returns error if serialization or the write fails.
pub fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = to_json_pretty(value)?;
    crate::write_atomic(path, json.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
    struct State {
        global: Option<String>,
        #[serde(default)]
        pins: BTreeMap<String, String>,
    }

    #[test]
    fn state_file_survives_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("registry.json");
        let mut pins = BTreeMap::new();
        pins.insert("/srv/app".to_string(), "8.1.27".to_string());
        let state = State {
            global: Some("8.3.4".into()),
            pins,
        };

        write_json_file(&path, &state).unwrap();
        let back: Option<State> = read_json_file(&path).unwrap();
        assert_eq!(back, Some(state));
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let back: Option<State> = read_json_file(&dir.path().join("absent.json")).unwrap();
        assert!(back.is_none());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, b"{\"global\": ").unwrap();
        let err = read_json_file::<State>(&path).unwrap_err();
        assert!(matches!(err, Error::CorruptState { .. }));
    }

    #[test]
    fn invalid_json_string() {
        assert!(from_json::<State>("not json").is_err());
    }
}
