//! Findings synchronization for one project, per finding kind and branch.
//!
//! Each (kind, branch) pair moves from no local state to a full sync and then
//! to incremental pulls. Servers without the pull endpoint get a full
//! snapshot every time, replacing the branch content.

use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

use crate::api::{PullResult, ServerApi, fetch_all_pages};
use crate::models::{Finding, FindingKind, Language, ProjectBinding, UpdateSummary, Version};
use crate::paths::{file_key_for, ide_to_server_path};
use crate::storage::ProjectStorage;
use crate::{CancelToken, Error, Result};

/// Minimal server version serving `/api/issues/pull` and `/api/issues/pull_taint`.
pub const ISSUES_PULL_MIN_VERSION: &str = "9.6";
/// Minimal server version serving `/api/hotspots/pull`.
pub const HOTSPOTS_PULL_MIN_VERSION: &str = "10.1";

/// How findings are downloaded from a given server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncProtocol {
    /// Incremental changes since a timestamp, merged into the store
    Pull,
    /// Full snapshot replacing the store content
    Batch,
}

impl SyncProtocol {
    /// Protocol to use for `kind` on a server of `version`.
    ///
    /// Organization-scoped servers never serve the pull endpoints.
    pub fn select(kind: FindingKind, version: &Version, organization_scoped: bool) -> Self {
        if organization_scoped {
            return SyncProtocol::Batch;
        }
        let min = match kind {
            FindingKind::Issue | FindingKind::Taint => ISSUES_PULL_MIN_VERSION,
            FindingKind::Hotspot => HOTSPOTS_PULL_MIN_VERSION,
        };
        if version.satisfies_min_str(min) {
            SyncProtocol::Pull
        } else {
            SyncProtocol::Batch
        }
    }
}

impl fmt::Display for SyncProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncProtocol::Pull => write!(f, "pull"),
            SyncProtocol::Batch => write!(f, "batch"),
        }
    }
}

/// Outcome of one synchronization of a (kind, branch) pair.
#[derive(Debug, Clone, Serialize)]
pub struct FindingsSyncReport {
    pub kind: FindingKind,
    pub branch: String,
    pub protocol: SyncProtocol,
    /// False only for pulls sent with `changedSince`
    pub full: bool,
    pub summary: UpdateSummary,
}

/// Outcome of a single-file refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileRefresh {
    /// The pull protocol keeps the whole branch current already
    PullActive,
    /// The IDE path is outside the binding
    Unmapped,
    Refreshed { server_path: String, count: usize },
}

/// Downloads findings of one kind for a project and commits them to its store.
pub struct FindingsSynchronizer {
    project: ProjectStorage,
    kind: FindingKind,
}

impl FindingsSynchronizer {
    pub fn new(project: ProjectStorage, kind: FindingKind) -> Self {
        Self { project, kind }
    }

    pub fn kind(&self) -> FindingKind {
        self.kind
    }

    /// Bring the findings of `branch` up to date.
    ///
    /// Everything is downloaded before the store is touched: on failure or
    /// cancellation the store keeps its previous content.
    pub fn synchronize(
        &self,
        api: &dyn ServerApi,
        branch: &str,
        languages: &BTreeSet<Language>,
        version: &Version,
        cancel: &CancelToken,
    ) -> Result<FindingsSyncReport> {
        let protocol = SyncProtocol::select(self.kind, version, api.is_organization_scoped());
        let started = Instant::now();
        let report = match protocol {
            SyncProtocol::Pull => self.pull(api, branch, languages, cancel)?,
            SyncProtocol::Batch => self.download_all(api, branch, cancel)?,
        };
        info!(
            project = %self.project.project_key(),
            kind = %self.kind,
            branch = %branch,
            protocol = %protocol,
            full = report.full,
            added = report.summary.added.len(),
            updated = report.summary.updated.len(),
            deleted = report.summary.deleted_keys.len(),
            "[SYNC] Findings synchronized"
        );
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Findings sync duration");
        Ok(report)
    }

    fn pull(
        &self,
        api: &dyn ServerApi,
        branch: &str,
        languages: &BTreeSet<Language>,
        cancel: &CancelToken,
    ) -> Result<FindingsSyncReport> {
        let state = self.project.sync_state(self.kind, branch)?;
        let since = state.changed_since(languages);
        if since.is_none() && state.last_sync_timestamp.is_some() {
            info!(kind = %self.kind, branch = %branch, "[SYNC] Enabled languages changed, pulling everything");
        }

        let project_key = self.project.project_key();
        let result: PullResult = match self.kind {
            FindingKind::Issue => api.pull_issues(project_key, branch, languages, since, cancel),
            FindingKind::Taint => api.pull_taint_issues(project_key, branch, languages, since, cancel),
            FindingKind::Hotspot => api.pull_hotspots(project_key, branch, languages, since, cancel),
        }
        .map_err(|e| e.into_download_failure(&format!("Failed to pull {} of branch '{}'", self.kind, branch)))?;
        cancel.check()?;

        let mut store = self.project.findings()?;
        let previous = store.load_all(self.kind, branch)?;
        let summary = summarize_merge(&previous, &result.changed, &result.closed_keys);
        store.merge(
            self.kind,
            branch,
            &result.changed,
            &result.closed_keys,
            result.query_timestamp,
            languages,
        )?;
        Ok(FindingsSyncReport {
            kind: self.kind,
            branch: branch.to_string(),
            protocol: SyncProtocol::Pull,
            full: since.is_none(),
            summary,
        })
    }

    fn download_all(&self, api: &dyn ServerApi, branch: &str, cancel: &CancelToken) -> Result<FindingsSyncReport> {
        let project_key = self.project.project_key();
        let downloaded = match self.kind {
            FindingKind::Issue => api.batch_issues(project_key, Some(branch), cancel),
            FindingKind::Hotspot => {
                fetch_all_pages(cancel, |page| api.search_hotspots(project_key, branch, page, cancel))
            }
            FindingKind::Taint => {
                fetch_all_pages(cancel, |page| api.search_taint_issues(project_key, branch, page, cancel))
            }
        }
        .map_err(|e| e.into_download_failure(&format!("Failed to download {} of branch '{}'", self.kind, branch)))?;
        cancel.check()?;

        let mut store = self.project.findings()?;
        let previous = store.load_all(self.kind, branch)?;
        let summary = summarize_replace(&previous, &downloaded);
        store.replace_all_of_branch(self.kind, branch, &downloaded)?;
        Ok(FindingsSyncReport {
            kind: self.kind,
            branch: branch.to_string(),
            protocol: SyncProtocol::Batch,
            full: true,
            summary,
        })
    }

    /// Refresh the issues of a single file on servers without the pull endpoint.
    ///
    /// No-op when the pull protocol is active or the path is outside the binding.
    pub fn update_file_issues_if_needed(
        &self,
        api: &dyn ServerApi,
        binding: &ProjectBinding,
        ide_path: &str,
        branch: &str,
        version: &Version,
        cancel: &CancelToken,
    ) -> Result<FileRefresh> {
        if self.kind != FindingKind::Issue {
            return Err(Error::InvalidInput(format!(
                "Single-file refresh only applies to issues, not {}",
                self.kind
            )));
        }
        if SyncProtocol::select(self.kind, version, api.is_organization_scoped()) == SyncProtocol::Pull {
            debug!(file = %ide_path, "Skip downloading file issues, the pull protocol keeps them current");
            return Ok(FileRefresh::PullActive);
        }
        let Some(server_path) = ide_to_server_path(binding, ide_path) else {
            debug!(file = %ide_path, "File is outside of the binding, not refreshing its issues");
            return Ok(FileRefresh::Unmapped);
        };

        let file_key = file_key_for(binding, &server_path);
        let issues: Vec<Finding> = api
            .batch_issues(&file_key, Some(branch), cancel)
            .map_err(|e| e.into_download_failure("Failed to update file issues"))?
            .into_iter()
            .filter(|issue| issue.file_path == server_path)
            .collect();
        cancel.check()?;

        let mut store = self.project.findings()?;
        store.replace_all_of_file(self.kind, branch, &server_path, &issues)?;
        Ok(FileRefresh::Refreshed {
            server_path,
            count: issues.len(),
        })
    }
}

/// Compare a pull result with the previous store content.
fn summarize_merge(previous: &[Finding], changed: &[Finding], closed_keys: &BTreeSet<String>) -> UpdateSummary {
    let previous_keys: HashSet<&str> = previous.iter().map(|f| f.key.as_str()).collect();
    let (updated, added): (Vec<Finding>, Vec<Finding>) =
        changed.iter().cloned().partition(|f| previous_keys.contains(f.key.as_str()));
    UpdateSummary {
        deleted_keys: closed_keys
            .iter()
            .filter(|k| previous_keys.contains(k.as_str()))
            .cloned()
            .collect(),
        added,
        updated,
    }
}

/// Compare a full snapshot with the previous store content.
fn summarize_replace(previous: &[Finding], downloaded: &[Finding]) -> UpdateSummary {
    let new_keys: HashSet<&str> = downloaded.iter().map(|f| f.key.as_str()).collect();
    let deleted_keys = previous
        .iter()
        .filter(|f| !new_keys.contains(f.key.as_str()))
        .map(|f| f.key.clone())
        .collect();
    let previous_keys: HashSet<&str> = previous.iter().map(|f| f.key.as_str()).collect();
    let (updated, added) = downloaded
        .iter()
        .cloned()
        .partition(|f| previous_keys.contains(f.key.as_str()));
    UpdateSummary {
        deleted_keys,
        added,
        updated,
    }
}
