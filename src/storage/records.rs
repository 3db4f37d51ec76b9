//! Versioned JSON records written atomically.
//!
//! Each record file holds `{"version": N, "data": {...}}`. Unknown fields are
//! ignored and missing ones take their default, so older records stay
//! readable. Records written by a newer format version are rejected.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::{Error, Result};

/// Current format version of every record.
pub const RECORD_FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeOut<'a, T> {
    version: u32,
    data: &'a T,
}

#[derive(serde::Deserialize)]
struct EnvelopeIn {
    version: u32,
    data: serde_json::Value,
}

/// Write `bytes` to `path` through a temporary file in the same directory,
/// so readers see either the old or the new content.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Storage(format!("No parent directory for {}", path.display())))?;
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// A typed record stored in a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonRecord<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> JsonRecord<T> {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the record, or `None` if it was never written.
    pub fn read(&self) -> Result<Option<T>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let envelope: EnvelopeIn = serde_json::from_str(&content)?;
        if envelope.version > RECORD_FORMAT_VERSION {
            return Err(Error::Storage(format!(
                "{} was written with format version {}, this build supports up to {}",
                self.path.display(),
                envelope.version,
                RECORD_FORMAT_VERSION
            )));
        }
        Ok(Some(serde_json::from_value(envelope.data)?))
    }

    /// Replace the record wholesale.
    pub fn write(&self, value: &T) -> Result<()> {
        let envelope = EnvelopeOut {
            version: RECORD_FORMAT_VERSION,
            data: value,
        };
        let json = serde_json::to_vec_pretty(&envelope)?;
        write_atomically(&self.path, &json)
    }

    /// Delete the record if present.
    pub fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        #[serde(default)]
        count: u32,
    }

    #[test]
    fn test_read_missing_record() {
        let dir = TempDir::new().unwrap();
        let record: JsonRecord<Sample> = JsonRecord::new(dir.path().join("sample.json"));
        assert!(record.read().unwrap().is_none());
        assert!(!record.exists());
    }

    #[test]
    fn test_write_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let record = JsonRecord::new(dir.path().join("a/b/sample.json"));
        let value = Sample {
            name: "x".to_string(),
            count: 3,
        };
        record.write(&value).unwrap();
        assert_eq!(record.read().unwrap(), Some(value));
    }

    #[test]
    fn test_write_replaces_previous_content() {
        let dir = TempDir::new().unwrap();
        let record = JsonRecord::new(dir.path().join("sample.json"));
        record
            .write(&Sample {
                name: "old".to_string(),
                count: 1,
            })
            .unwrap();
        record
            .write(&Sample {
                name: "new".to_string(),
                count: 2,
            })
            .unwrap();
        assert_eq!(record.read().unwrap().unwrap().name, "new");
        // Only the record itself remains, no leftover temp files
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_unknown_fields_ignored_and_missing_defaulted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.json");
        fs::write(&path, r#"{"version": 1, "data": {"name": "n", "extra": true}}"#).unwrap();
        let record: JsonRecord<Sample> = JsonRecord::new(path);
        assert_eq!(
            record.read().unwrap(),
            Some(Sample {
                name: "n".to_string(),
                count: 0
            })
        );
    }

    #[test]
    fn test_newer_format_version_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.json");
        fs::write(&path, r#"{"version": 99, "data": {"name": "n"}}"#).unwrap();
        let record: JsonRecord<Sample> = JsonRecord::new(path);
        assert!(matches!(record.read(), Err(Error::Storage(_))));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let record = JsonRecord::new(dir.path().join("sample.json"));
        record
            .write(&Sample {
                name: "x".to_string(),
                count: 0,
            })
            .unwrap();
        record.delete().unwrap();
        record.delete().unwrap();
        assert!(!record.exists());
    }
}
