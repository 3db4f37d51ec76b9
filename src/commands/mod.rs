//! Command implementations for the `cmirror` CLI.
//!
//! - `sync` - Synchronize the mirror of a bound project
//! - `refresh_file` - Refresh the issues of one file on legacy servers
//! - `status` - Describe what is mirrored for a connection
//! - `findings` - List the mirrored findings of an IDE file

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::api::ServerApi;
use crate::api::http::HttpServerApi;
use crate::config::{ConnectionConfig, ResolvedSettings};
use crate::models::{Finding, FindingKind, Language, ProjectBinding, ProjectBranches};
use crate::paths::ide_to_server_path;
use crate::storage::{ConnectionStorage, StoredUser};
use crate::sync::{ConnectionSynchronizer, FileRefresh, SyncRequest, SyncSummary};
use crate::{CancelToken, Result};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn http_api(settings: &ResolvedSettings, connection: &ConnectionConfig) -> HttpServerApi {
    HttpServerApi::new(
        &connection.to_server_connection(),
        connection.token(),
        settings.http_timeout(),
    )
}

fn connection_storage(settings: &ResolvedSettings, connection_id: &str) -> ConnectionStorage {
    ConnectionStorage::new(&settings.storage_root.value, connection_id)
}

// === sync ===

/// Outcome of `cmirror sync`. A cancelled sync is reported as skipped.
#[derive(Serialize)]
pub struct SyncOutput {
    pub connection: String,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SyncSummary>,
}

impl Output for SyncOutput {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn to_human(&self) -> String {
        let Some(summary) = &self.summary else {
            return format!("Sync of connection '{}' skipped (cancelled)", self.connection);
        };
        let mut lines = vec![format!(
            "Synchronized {} on branch {} (server {})",
            summary.project_key, summary.branch, summary.server_version
        )];
        if summary.plugins.any_plugin_updated {
            lines.push(format!("  Plugins downloaded: {}", summary.plugins.downloaded.join(", ")));
        } else {
            lines.push("  Plugins up-to-date".to_string());
        }
        if !summary.plugins.deleted_jars.is_empty() {
            lines.push(format!("  Plugins removed: {}", summary.plugins.deleted_jars.join(", ")));
        }
        lines.push(format!("  Main branch: {}", summary.main_branch));
        for report in &summary.findings {
            lines.push(format!(
                "  {} ({}, {}): +{} ~{} -{}",
                report.kind,
                report.protocol,
                if report.full { "full" } else { "incremental" },
                report.summary.added.len(),
                report.summary.updated.len(),
                report.summary.deleted_keys.len()
            ));
        }
        lines.join("\n")
    }
}

/// Synchronize a bound project through the HTTP API.
pub fn sync(
    settings: &ResolvedSettings,
    connection_id: &str,
    request: &SyncRequest,
    embedded_plugins: BTreeSet<String>,
    cancel: &CancelToken,
) -> Result<SyncOutput> {
    let connection = settings.connection(connection_id)?;
    let api = http_api(settings, connection);
    sync_with(&api, connection_storage(settings, connection_id), connection_id, request, embedded_plugins, cancel)
}

/// Synchronize a bound project through any [`ServerApi`].
pub fn sync_with(
    api: &dyn ServerApi,
    storage: ConnectionStorage,
    connection_id: &str,
    request: &SyncRequest,
    embedded_plugins: BTreeSet<String>,
    cancel: &CancelToken,
) -> Result<SyncOutput> {
    let synchronizer = ConnectionSynchronizer::new(api, storage, embedded_plugins);
    match synchronizer.synchronize(request, cancel) {
        Ok(summary) => Ok(SyncOutput {
            connection: connection_id.to_string(),
            skipped: false,
            summary: Some(summary),
        }),
        Err(e) if e.is_cancellation() => Ok(SyncOutput {
            connection: connection_id.to_string(),
            skipped: true,
            summary: None,
        }),
        Err(e) => Err(e),
    }
}

// === refresh-file ===

#[derive(Serialize)]
pub struct RefreshFileOutput {
    pub ide_path: String,
    #[serde(flatten)]
    pub refresh: FileRefresh,
}

impl Output for RefreshFileOutput {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn to_human(&self) -> String {
        match &self.refresh {
            FileRefresh::PullActive => format!("{}: issues are kept current by the pull protocol", self.ide_path),
            FileRefresh::Unmapped => format!("{}: not part of the bound project", self.ide_path),
            FileRefresh::Refreshed { server_path, count } => {
                format!("{}: {} issue(s) refreshed from {}", self.ide_path, count, server_path)
            }
        }
    }
}

pub fn refresh_file(
    settings: &ResolvedSettings,
    connection_id: &str,
    binding: &ProjectBinding,
    ide_path: &str,
    branch: &str,
    cancel: &CancelToken,
) -> Result<RefreshFileOutput> {
    let connection = settings.connection(connection_id)?;
    let api = http_api(settings, connection);
    let synchronizer = ConnectionSynchronizer::new(&api, connection_storage(settings, connection_id), BTreeSet::new());
    let refresh = synchronizer.refresh_file(binding, ide_path, branch, cancel)?;
    Ok(RefreshFileOutput {
        ide_path: ide_path.to_string(),
        refresh,
    })
}

// === status ===

#[derive(Serialize)]
pub struct BranchStatus {
    pub branch: String,
    pub counts: BTreeMap<FindingKind, usize>,
    /// Last pull timestamp per kind, in RFC 3339
    pub last_sync: BTreeMap<FindingKind, String>,
    pub languages: BTreeSet<Language>,
}

#[derive(Serialize)]
pub struct ProjectStatus {
    pub project_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branches: Option<ProjectBranches>,
    pub rule_set_languages: Vec<String>,
    pub findings: Vec<BranchStatus>,
}

#[derive(Serialize)]
pub struct StatusOutput {
    pub connection: String,
    pub storage_dir: String,
    pub mirrored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
    pub features: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<StoredUser>,
    pub plugins: Vec<String>,
    pub projects: Vec<ProjectStatus>,
}

impl Output for StatusOutput {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn to_human(&self) -> String {
        if !self.mirrored {
            return format!("Connection '{}' has no local mirror yet ({})", self.connection, self.storage_dir);
        }
        let mut lines = vec![format!("Connection '{}' ({})", self.connection, self.storage_dir)];
        if let Some(ref version) = self.server_version {
            lines.push(format!("  Server version: {}", version));
        }
        if let Some(ref user) = self.user {
            lines.push(format!("  User: {}", user.id));
        }
        if !self.plugins.is_empty() {
            lines.push(format!("  Plugins: {}", self.plugins.join(", ")));
        }
        for project in &self.projects {
            lines.push(format!("  Project {}", project.project_key));
            if let Some(ref branches) = project.branches {
                lines.push(format!("    Main branch: {}", branches.main_branch_name));
            }
            for branch in &project.findings {
                let counts: Vec<String> = branch.counts.iter().map(|(kind, n)| format!("{} {}", n, kind)).collect();
                lines.push(format!("    {}: {}", branch.branch, counts.join(", ")));
            }
        }
        lines.join("\n")
    }
}

fn branch_status(storage: &ConnectionStorage, project_key: &str, branch: &str) -> Result<BranchStatus> {
    let store = storage.project(project_key).findings()?;
    let mut status = BranchStatus {
        branch: branch.to_string(),
        counts: BTreeMap::new(),
        last_sync: BTreeMap::new(),
        languages: BTreeSet::new(),
    };
    for kind in FindingKind::ALL {
        status.counts.insert(kind, store.count(kind, branch)?);
        let state = store.sync_state(kind, branch)?;
        if let Some(ts) = state.last_sync_timestamp {
            status.last_sync.insert(kind, ts.to_rfc3339());
        }
        status.languages.extend(state.last_enabled_languages);
    }
    Ok(status)
}

fn project_status(storage: &ConnectionStorage, project_key: &str, branch: Option<&str>) -> Result<ProjectStatus> {
    let project = storage.project(project_key);
    let branches = match branch {
        Some(b) => vec![b.to_string()],
        None if project.has_findings() => project.findings()?.branches()?,
        None => Vec::new(),
    };
    let findings = branches
        .iter()
        .map(|b| branch_status(storage, project_key, b))
        .collect::<Result<Vec<_>>>()?;
    let rule_set_languages = project
        .analyzer_config()
        .read()?
        .map(|c| c.rule_sets_by_language.into_keys().collect())
        .unwrap_or_default();
    Ok(ProjectStatus {
        project_key: project_key.to_string(),
        branches: project.branches().read()?,
        rule_set_languages,
        findings,
    })
}

/// Describe the local mirror of a connection without contacting the server.
pub fn status(storage_root: &Path, connection_id: &str, project: Option<&str>, branch: Option<&str>) -> Result<StatusOutput> {
    let storage = ConnectionStorage::new(storage_root, connection_id);
    let mut output = StatusOutput {
        connection: connection_id.to_string(),
        storage_dir: storage.root().display().to_string(),
        mirrored: storage.exists(),
        server_version: None,
        features: BTreeSet::new(),
        user: None,
        plugins: Vec::new(),
        projects: Vec::new(),
    };
    if !output.mirrored {
        return Ok(output);
    }
    if let Some(info) = storage.server_info().read()? {
        output.server_version = Some(info.version.to_string());
        output.features = info.features;
    }
    output.user = storage.user().read()?;
    output.plugins = storage.plugins().references()?.plugins_by_key.into_keys().collect();

    let project_keys = match project {
        Some(key) => vec![key.to_string()],
        None => storage.project_keys()?,
    };
    for key in project_keys {
        output.projects.push(project_status(&storage, &key, branch)?);
    }
    Ok(output)
}

// === findings ===

#[derive(Serialize)]
pub struct FindingsOutput {
    pub ide_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_path: Option<String>,
    pub issues: Vec<Finding>,
    pub hotspots: Vec<Finding>,
    pub taint: Vec<Finding>,
}

impl Output for FindingsOutput {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn to_human(&self) -> String {
        let Some(ref server_path) = self.server_path else {
            return format!("{}: not part of the bound project", self.ide_path);
        };
        let mut lines = vec![format!(
            "{} ({}): {} issue(s), {} hotspot(s), {} taint vulnerability(ies)",
            self.ide_path,
            server_path,
            self.issues.len(),
            self.hotspots.len(),
            self.taint.len()
        )];
        for finding in self.issues.iter().chain(&self.hotspots).chain(&self.taint) {
            let line = finding.line.map(|l| format!(":{}", l)).unwrap_or_default();
            lines.push(format!("  [{}]{} {} ({})", finding.rule_key, line, finding.message, finding.key));
        }
        lines.join("\n")
    }
}

/// Mirrored findings of an IDE file, read from the local store only.
pub fn findings(
    storage_root: &Path,
    connection_id: &str,
    binding: &ProjectBinding,
    branch: &str,
    ide_path: &str,
) -> Result<FindingsOutput> {
    let mut output = FindingsOutput {
        ide_path: ide_path.to_string(),
        server_path: ide_to_server_path(binding, ide_path),
        issues: Vec::new(),
        hotspots: Vec::new(),
        taint: Vec::new(),
    };
    let project = ConnectionStorage::new(storage_root, connection_id).project(&binding.project_key);
    let Some(ref server_path) = output.server_path else {
        return Ok(output);
    };
    if !project.has_findings() {
        return Ok(output);
    }
    let store = project.findings()?;
    output.issues = store.load_issues(branch, server_path)?;
    output.hotspots = store.load_hotspots(branch, server_path)?;
    output.taint = store.load_of_file(FindingKind::Taint, branch, server_path)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PullResult;
    use crate::api::fake::{FakeServer, finding, timestamp};
    use crate::test_utils::{CONNECTION_ID, TestEnv};

    fn request() -> SyncRequest {
        SyncRequest {
            project_key: "k".to_string(),
            branch: "master".to_string(),
            languages: [Language::Java].into_iter().collect(),
            force_server_info: false,
        }
    }

    fn synced_env() -> TestEnv {
        let env = TestEnv::new();
        let server = FakeServer::new("10.4").with_pull(
            FindingKind::Issue,
            PullResult {
                query_timestamp: timestamp(5),
                changed: vec![finding("i1", "sq/src/path1")],
                closed_keys: BTreeSet::new(),
            },
        );
        sync_with(
            &server,
            env.connection_storage(),
            CONNECTION_ID,
            &request(),
            BTreeSet::new(),
            &CancelToken::new(),
        )
        .unwrap();
        env
    }

    #[test]
    fn test_cancelled_sync_is_skipped() {
        let env = TestEnv::new();
        let server = FakeServer::new("10.4");
        let cancel = CancelToken::new();
        cancel.cancel();

        let output = sync_with(&server, env.connection_storage(), CONNECTION_ID, &request(), BTreeSet::new(), &cancel)
            .unwrap();

        assert!(output.skipped);
        assert!(output.to_human().contains("skipped"));
    }

    #[test]
    fn test_status_of_unmirrored_connection() {
        let env = TestEnv::new();
        let output = status(env.data_path(), CONNECTION_ID, None, None).unwrap();
        assert!(!output.mirrored);
        assert!(output.projects.is_empty());
    }

    #[test]
    fn test_status_after_sync() {
        let env = synced_env();
        let output = status(env.data_path(), CONNECTION_ID, None, None).unwrap();

        assert!(output.mirrored);
        assert_eq!(output.server_version.as_deref(), Some("10.4"));
        assert_eq!(output.projects.len(), 1);
        let branch = &output.projects[0].findings[0];
        assert_eq!(branch.branch, "master");
        assert_eq!(branch.counts[&FindingKind::Issue], 1);
        assert!(branch.last_sync.contains_key(&FindingKind::Issue));

        let json: serde_json::Value = serde_json::from_str(&output.to_json()).unwrap();
        assert_eq!(json["projects"][0]["project_key"], "k");
        assert!(output.to_human().contains("1 issue"));
    }

    #[test]
    fn test_findings_of_ide_file() {
        let env = synced_env();
        let binding = ProjectBinding::new("k", "sq", "ide");

        let found = findings(env.data_path(), CONNECTION_ID, &binding, "master", "ide/src/path1").unwrap();
        assert_eq!(found.server_path.as_deref(), Some("sq/src/path1"));
        assert_eq!(found.issues.len(), 1);

        let other = findings(env.data_path(), CONNECTION_ID, &binding, "master", "ide/src/path3").unwrap();
        assert!(other.issues.is_empty());

        let outside = findings(env.data_path(), CONNECTION_ID, &binding, "master", "elsewhere/x").unwrap();
        assert_eq!(outside.server_path, None);
        assert!(outside.to_human().contains("not part of the bound project"));
    }
}
