//! On-disk mirror of a connection.
//!
//! Layout under the storage root:
//!
//! ```text
//! <root>/<sha256(connection id)[..16]>/
//!     server_info.json
//!     user.json
//!     plugins/plugin_references.json
//!     plugins/<filename>.jar
//!     projects/<hex(project key)>/findings.db
//!     projects/<hex(project key)>/analyzer_config.json
//!     projects/<hex(project key)>/project_branches.json
//! ```
//!
//! - JSON records are versioned and written atomically (see [`records`])
//! - Findings live in one SQLite database per project (see [`findings`])

pub mod findings;
pub mod plugins;
pub mod records;

pub use findings::FindingsStore;
pub use plugins::{PluginsStorage, is_plain_file_name};
pub use records::JsonRecord;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::{AnalyzerConfiguration, BranchSyncState, FindingKind, ProjectBranches, ServerInfo};
use crate::{Error, Result};

/// Persisted identity of the user of an organization-scoped connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredUser {
    pub id: String,
}

/// Directory name of a connection: first 16 hex chars of the SHA-256 of its id.
pub fn connection_dir_name(connection_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(connection_id.as_bytes());
    let hash_hex = format!("{:x}", hasher.finalize());
    hash_hex[..16].to_string()
}

/// Directory name of a project: lowercase hex encoding of its key bytes.
pub fn project_dir_name(project_key: &str) -> String {
    project_key.bytes().map(|b| format!("{:02x}", b)).collect()
}

/// Decode a project directory name back to the project key.
pub fn project_key_from_dir_name(dir_name: &str) -> Option<String> {
    if dir_name.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..dir_name.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(dir_name.get(i..i + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}

/// Default storage root: `~/.local/share/connected-mirror` on Linux.
pub fn default_storage_root() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| Error::Config("Could not determine data directory".to_string()))?;
    Ok(data_dir.join("connected-mirror"))
}

/// Everything mirrored for one connection.
#[derive(Debug, Clone)]
pub struct ConnectionStorage {
    root: PathBuf,
}

impl ConnectionStorage {
    /// Storage of `connection_id` under `storage_root`. Nothing is created until written.
    pub fn new(storage_root: &Path, connection_id: &str) -> Self {
        Self {
            root: storage_root.join(connection_dir_name(connection_id)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.exists()
    }

    pub fn server_info(&self) -> JsonRecord<ServerInfo> {
        JsonRecord::new(self.root.join("server_info.json"))
    }

    pub fn user(&self) -> JsonRecord<StoredUser> {
        JsonRecord::new(self.root.join("user.json"))
    }

    pub fn plugins(&self) -> PluginsStorage {
        PluginsStorage::new(self.root.join("plugins"))
    }

    pub fn project(&self, project_key: &str) -> ProjectStorage {
        ProjectStorage {
            project_key: project_key.to_string(),
            dir: self.root.join("projects").join(project_dir_name(project_key)),
        }
    }

    /// Keys of every project that has a directory in this mirror.
    pub fn project_keys(&self) -> Result<Vec<String>> {
        let dir = self.root.join("projects");
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(key) = project_key_from_dir_name(&entry.file_name().to_string_lossy()) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Everything mirrored for one project of a connection.
#[derive(Debug, Clone)]
pub struct ProjectStorage {
    project_key: String,
    dir: PathBuf,
}

impl ProjectStorage {
    pub fn project_key(&self) -> &str {
        &self.project_key
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn findings_db_path(&self) -> PathBuf {
        self.dir.join("findings.db")
    }

    /// Open (creating it if needed) the findings database of the project.
    pub fn findings(&self) -> Result<FindingsStore> {
        FindingsStore::open(&self.findings_db_path())
    }

    pub fn has_findings(&self) -> bool {
        self.findings_db_path().exists()
    }

    /// Sync bookkeeping of a branch, without creating the database when it does not exist yet.
    pub fn sync_state(&self, kind: FindingKind, branch: &str) -> Result<BranchSyncState> {
        if !self.has_findings() {
            return Ok(BranchSyncState::default());
        }
        self.findings()?.sync_state(kind, branch)
    }

    pub fn analyzer_config(&self) -> JsonRecord<AnalyzerConfiguration> {
        JsonRecord::new(self.dir.join("analyzer_config.json"))
    }

    pub fn branches(&self) -> JsonRecord<ProjectBranches> {
        JsonRecord::new(self.dir.join("project_branches.json"))
    }
}
