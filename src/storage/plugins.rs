//! Plugin jars and their references for one connection.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use super::records::{JsonRecord, write_atomically};
use crate::{Error, Result};
use crate::models::{PluginReference, PluginReferences};

const REFERENCES_FILE: &str = "plugin_references.json";

/// Whether `name` is a single normal path component, so it stays inside the plugins directory.
pub fn is_plain_file_name(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(components.next(), Some(Component::Normal(c)) if c == name) && components.next().is_none()
}

/// Directory holding downloaded jars and `plugin_references.json`.
#[derive(Debug, Clone)]
pub struct PluginsStorage {
    dir: PathBuf,
    references: JsonRecord<PluginReferences>,
}

impl PluginsStorage {
    pub fn new(dir: PathBuf) -> Self {
        let references = JsonRecord::new(dir.join(REFERENCES_FILE));
        Self { dir, references }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn references_exist(&self) -> bool {
        self.references.exists()
    }

    /// Stored references, empty when nothing was ever synchronized.
    pub fn references(&self) -> Result<PluginReferences> {
        Ok(self.references.read()?.unwrap_or_default())
    }

    /// Replace the stored references wholesale.
    pub fn store_references(&self, references: &PluginReferences) -> Result<()> {
        self.references.write(references)
    }

    pub fn jar_path(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// Whether `wanted` is already on disk: same filename and hash as the stored reference.
    pub fn is_up_to_date(&self, stored: &PluginReferences, wanted: &PluginReference) -> bool {
        let Some(filename) = &wanted.filename else {
            return true;
        };
        stored.get(&wanted.key) == Some(wanted) && self.jar_path(filename).is_file()
    }

    /// Write a jar atomically. Names that would leave the directory are refused.
    pub fn write_jar(&self, filename: &str, content: &[u8]) -> Result<()> {
        if !is_plain_file_name(filename) {
            return Err(Error::Storage(format!("Refusing to write plugin jar '{}'", filename)));
        }
        write_atomically(&self.jar_path(filename), content)
    }

    /// Delete every jar not listed in `keep`. Returns the deleted filenames.
    pub fn clean_up_unknown_jars(&self, keep: &BTreeSet<String>) -> Result<Vec<String>> {
        let mut deleted = Vec::new();
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(deleted),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".jar") && !keep.contains(&name) {
                debug!(jar = %name, "Deleting unused plugin");
                fs::remove_file(entry.path())?;
                deleted.push(name);
            }
        }
        deleted.sort();
        Ok(deleted)
    }
}
