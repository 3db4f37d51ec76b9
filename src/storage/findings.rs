//! Per-project findings store backed by SQLite.
//!
//! One database per project holds the findings of every branch and kind,
//! plus the incremental sync state of each (branch, kind) pair. Replace and
//! merge each run in a single transaction, and the WAL journal lets readers
//! keep seeing the last committed snapshot while a sync writes.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::models::{BranchSyncState, Finding, FindingKind, HotspotReviewStatus, Language, ProjectBinding};
use crate::paths::ide_to_server_path;
use crate::{Error, Result};

/// Current schema version of the findings database.
pub const SCHEMA_VERSION: i64 = 1;

/// Findings of one project, all branches and kinds.
pub struct FindingsStore {
    conn: Connection,
}

impl FindingsStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::init_schema(&conn)?;
        Self::check_schema_version(&conn)?;
        Ok(Self { conn })
    }

    /// Initialize the SQLite schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS findings (
                kind TEXT NOT NULL,
                branch TEXT NOT NULL,
                key TEXT NOT NULL,
                file_path TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (kind, branch, key)
            );

            CREATE INDEX IF NOT EXISTS idx_findings_file ON findings(kind, branch, file_path);

            CREATE TABLE IF NOT EXISTS branch_sync_state (
                kind TEXT NOT NULL,
                branch TEXT NOT NULL,
                last_sync_timestamp TEXT,
                last_enabled_languages TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY (kind, branch)
            );

            CREATE TABLE IF NOT EXISTS store_metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO store_metadata (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )?;
        Ok(())
    }

    fn check_schema_version(conn: &Connection) -> Result<()> {
        let stored: String = conn.query_row(
            "SELECT value FROM store_metadata WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )?;
        let stored: i64 = stored
            .parse()
            .map_err(|_| Error::Storage(format!("Invalid schema version: {}", stored)))?;
        if stored > SCHEMA_VERSION {
            return Err(Error::Storage(format!(
                "Findings database has schema version {}, this build supports up to {}",
                stored, SCHEMA_VERSION
            )));
        }
        Ok(())
    }

    fn insert_findings(tx: &Transaction<'_>, kind: FindingKind, branch: &str, findings: &[Finding]) -> Result<()> {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO findings (kind, branch, key, file_path, data) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for finding in findings {
            let data = serde_json::to_string(finding)?;
            stmt.execute(params![kind.as_str(), branch, finding.key, finding.file_path, data])?;
        }
        Ok(())
    }

    fn mark_updated(tx: &Transaction<'_>) -> Result<()> {
        tx.execute(
            "INSERT OR REPLACE INTO store_metadata (key, value) VALUES ('last_updated_at', ?1)",
            params![Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Replace every finding of a kind on a branch with `findings`.
    pub fn replace_all_of_branch(&mut self, kind: FindingKind, branch: &str, findings: &[Finding]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM findings WHERE kind = ?1 AND branch = ?2",
            params![kind.as_str(), branch],
        )?;
        Self::insert_findings(&tx, kind, branch, findings)?;
        Self::mark_updated(&tx)?;
        tx.commit()?;
        Ok(())
    }

    /// Replace the findings of a kind in one file of a branch with `findings`.
    pub fn replace_all_of_file(
        &mut self,
        kind: FindingKind,
        branch: &str,
        server_path: &str,
        findings: &[Finding],
    ) -> Result<()> {
        if let Some(stray) = findings.iter().find(|f| f.file_path != server_path) {
            return Err(Error::InvalidInput(format!(
                "Finding {} belongs to {}, not {}",
                stray.key, stray.file_path, server_path
            )));
        }
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM findings WHERE kind = ?1 AND branch = ?2 AND file_path = ?3",
            params![kind.as_str(), branch, server_path],
        )?;
        Self::insert_findings(&tx, kind, branch, findings)?;
        Self::mark_updated(&tx)?;
        tx.commit()?;
        Ok(())
    }

    /// Merge a pull result into a branch.
    ///
    /// Closed keys are removed, changed findings are upserted by key, and the
    /// branch sync state is overwritten, all in one transaction.
    pub fn merge(
        &mut self,
        kind: FindingKind,
        branch: &str,
        changed: &[Finding],
        closed_keys: &BTreeSet<String>,
        sync_timestamp: DateTime<Utc>,
        languages: &BTreeSet<Language>,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut delete = tx.prepare("DELETE FROM findings WHERE kind = ?1 AND branch = ?2 AND key = ?3")?;
            for key in closed_keys {
                delete.execute(params![kind.as_str(), branch, key])?;
            }
        }
        Self::insert_findings(&tx, kind, branch, changed)?;
        let languages_json = serde_json::to_string(languages)?;
        tx.execute(
            "INSERT OR REPLACE INTO branch_sync_state (kind, branch, last_sync_timestamp, last_enabled_languages)
             VALUES (?1, ?2, ?3, ?4)",
            params![kind.as_str(), branch, sync_timestamp.to_rfc3339(), languages_json],
        )?;
        Self::mark_updated(&tx)?;
        tx.commit()?;
        Ok(())
    }

    /// Incremental sync state of a branch, default when never pulled.
    pub fn sync_state(&self, kind: FindingKind, branch: &str) -> Result<BranchSyncState> {
        let row: Option<(Option<String>, String)> = self
            .conn
            .query_row(
                "SELECT last_sync_timestamp, last_enabled_languages FROM branch_sync_state
                 WHERE kind = ?1 AND branch = ?2",
                params![kind.as_str(), branch],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((timestamp, languages)) = row else {
            return Ok(BranchSyncState::default());
        };
        let last_sync_timestamp = timestamp
            .map(|ts| {
                DateTime::parse_from_rfc3339(&ts)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| Error::Storage(format!("Invalid sync timestamp '{}': {}", ts, e)))
            })
            .transpose()?;
        Ok(BranchSyncState {
            last_sync_timestamp,
            last_enabled_languages: serde_json::from_str(&languages)?,
        })
    }

    fn query_findings(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Finding>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;
        let mut findings = Vec::new();
        for data in rows {
            findings.push(serde_json::from_str(&data?)?);
        }
        Ok(findings)
    }

    /// Findings of a kind on a branch, ordered by file then key.
    pub fn load_all(&self, kind: FindingKind, branch: &str) -> Result<Vec<Finding>> {
        self.query_findings(
            "SELECT data FROM findings WHERE kind = ?1 AND branch = ?2 ORDER BY file_path, key",
            &[&kind.as_str(), &branch],
        )
    }

    /// Findings of a kind in one file of a branch.
    pub fn load_of_file(&self, kind: FindingKind, branch: &str, server_path: &str) -> Result<Vec<Finding>> {
        self.query_findings(
            "SELECT data FROM findings WHERE kind = ?1 AND branch = ?2 AND file_path = ?3 ORDER BY key",
            &[&kind.as_str(), &branch, &server_path],
        )
    }

    pub fn load_issues(&self, branch: &str, server_path: &str) -> Result<Vec<Finding>> {
        self.load_of_file(FindingKind::Issue, branch, server_path)
    }

    pub fn load_hotspots(&self, branch: &str, server_path: &str) -> Result<Vec<Finding>> {
        self.load_of_file(FindingKind::Hotspot, branch, server_path)
    }

    pub fn load_taint(&self, branch: &str) -> Result<Vec<Finding>> {
        self.load_all(FindingKind::Taint, branch)
    }

    /// Findings of a kind for a file given by its IDE path. Unmapped paths have none.
    pub fn load_for_ide_path(
        &self,
        kind: FindingKind,
        branch: &str,
        binding: &ProjectBinding,
        ide_path: &str,
    ) -> Result<Vec<Finding>> {
        match ide_to_server_path(binding, ide_path) {
            Some(server_path) => self.load_of_file(kind, branch, &server_path),
            None => Ok(Vec::new()),
        }
    }

    /// Number of findings of a kind on a branch.
    pub fn count(&self, kind: FindingKind, branch: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM findings WHERE kind = ?1 AND branch = ?2",
            params![kind.as_str(), branch],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Branches that hold findings or sync state.
    pub fn branches(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT branch FROM findings UNION SELECT branch FROM branch_sync_state ORDER BY branch",
        )?;
        let branches = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(branches)
    }

    /// Whether any replace or merge ever committed.
    pub fn was_ever_updated(&self) -> Result<bool> {
        let updated: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM store_metadata WHERE key = 'last_updated_at'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(updated.is_some())
    }

    /// Rewrite findings matching `kinds` and `key` on every branch.
    fn update_by_key<F>(&mut self, kinds: &[FindingKind], key: &str, mut update: F) -> Result<bool>
    where
        F: FnMut(&mut Finding),
    {
        let tx = self.conn.transaction()?;
        let mut changed = false;
        for kind in kinds {
            let rows: Vec<(String, String)> = {
                let mut stmt = tx.prepare("SELECT branch, data FROM findings WHERE kind = ?1 AND key = ?2")?;
                let rows = stmt
                    .query_map(params![kind.as_str(), key], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<std::result::Result<_, _>>()?;
                rows
            };
            for (branch, data) in rows {
                let mut finding: Finding = serde_json::from_str(&data)?;
                update(&mut finding);
                tx.execute(
                    "UPDATE findings SET data = ?1 WHERE kind = ?2 AND branch = ?3 AND key = ?4",
                    params![serde_json::to_string(&finding)?, kind.as_str(), branch, key],
                )?;
                changed = true;
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    /// Mark an issue or taint vulnerability as resolved or not. Returns whether it was found.
    pub fn set_issue_resolved(&mut self, key: &str, resolved: bool) -> Result<bool> {
        self.update_by_key(&[FindingKind::Issue, FindingKind::Taint], key, |finding| {
            finding.resolved = resolved;
        })
    }

    /// Change the review status of a hotspot. Returns whether it was found.
    pub fn change_hotspot_status(&mut self, key: &str, status: HotspotReviewStatus) -> Result<bool> {
        let (new_status, resolution) = status.to_status_and_resolution();
        self.update_by_key(&[FindingKind::Hotspot], key, |finding| {
            finding.status = new_status;
            finding.resolution = resolution.clone();
            finding.resolved = status != HotspotReviewStatus::ToReview;
        })
    }
}
