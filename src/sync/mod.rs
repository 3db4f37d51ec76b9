//! Synchronization of a connection's local mirror with the server.
//!
//! Each synchronizer owns one part of the mirror. [`ConnectionSynchronizer`]
//! runs them in order for a bound project:
//!
//! 1. server info (cached unless forced)
//! 2. user identity, for organization-scoped connections
//! 3. plugins
//! 4. analyzer configuration and branches
//! 5. findings, per kind, for the requested branch

pub mod analyzer_config;
pub mod findings;
pub mod plugins;
pub mod server_info;
pub mod user;

pub use analyzer_config::{AnalyzerConfigReport, AnalyzerConfigSynchronizer};
pub use findings::{FileRefresh, FindingsSyncReport, FindingsSynchronizer, SyncProtocol};
pub use plugins::{PluginSyncReport, PluginSynchronizer, compute_download_set};
pub use server_info::ServerInfoSynchronizer;
pub use user::UserSynchronizer;

use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, info};

use crate::api::ServerApi;
use crate::models::{FindingKind, Language, ProjectBinding, ServerInfo};
use crate::storage::{ConnectionStorage, StoredUser};
use crate::{CancelToken, Result};

/// What to synchronize for a bound project.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub project_key: String,
    pub branch: String,
    pub languages: BTreeSet<Language>,
    pub force_server_info: bool,
}

/// Outcome of a full project synchronization.
#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub project_key: String,
    pub branch: String,
    pub server_version: String,
    pub user: Option<StoredUser>,
    pub plugins: PluginSyncReport,
    pub analyzer_config: AnalyzerConfigReport,
    pub main_branch: String,
    pub findings: Vec<FindingsSyncReport>,
}

/// Runs every synchronizer of a connection against one server.
pub struct ConnectionSynchronizer<'a> {
    api: &'a dyn ServerApi,
    storage: ConnectionStorage,
    embedded_plugin_keys: BTreeSet<String>,
}

impl<'a> ConnectionSynchronizer<'a> {
    pub fn new(api: &'a dyn ServerApi, storage: ConnectionStorage, embedded_plugin_keys: BTreeSet<String>) -> Self {
        Self {
            api,
            storage,
            embedded_plugin_keys,
        }
    }

    fn server_info(&self, project_key: &str, force: bool, cancel: &CancelToken) -> Result<ServerInfo> {
        ServerInfoSynchronizer::new(self.storage.server_info()).read_or_synchronize(
            self.api,
            Some(project_key),
            force,
            cancel,
        )
    }

    /// Synchronize everything mirrored for `request`.
    ///
    /// Stops at the first failure. Parts synchronized before it stay committed,
    /// the failing part keeps its previous content.
    pub fn synchronize(&self, request: &SyncRequest, cancel: &CancelToken) -> Result<SyncSummary> {
        let started = Instant::now();
        info!(
            project = %request.project_key,
            branch = %request.branch,
            languages = %Language::join_keys(&request.languages),
            "[SYNC] Synchronizing project"
        );

        let server_info = self.server_info(&request.project_key, request.force_server_info, cancel)?;
        let user = UserSynchronizer::new(self.storage.user()).synchronize(self.api, cancel)?;
        let plugins = PluginSynchronizer::new(self.storage.plugins(), self.embedded_plugin_keys.clone()).synchronize(
            self.api,
            &request.languages,
            &server_info.version,
            cancel,
        )?;

        let project = self.storage.project(&request.project_key);
        let config_sync = AnalyzerConfigSynchronizer::new(project.clone());
        let analyzer_config = config_sync.synchronize(self.api, &request.languages, cancel)?;
        let branches = config_sync.synchronize_branches(self.api, cancel)?;

        let mut findings = Vec::new();
        for kind in FindingKind::ALL {
            let report = FindingsSynchronizer::new(project.clone(), kind).synchronize(
                self.api,
                &request.branch,
                &request.languages,
                &server_info.version,
                cancel,
            )?;
            findings.push(report);
        }

        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Project sync duration");
        Ok(SyncSummary {
            project_key: request.project_key.clone(),
            branch: request.branch.clone(),
            server_version: server_info.version.to_string(),
            user,
            plugins,
            analyzer_config,
            main_branch: branches.main_branch_name,
            findings,
        })
    }

    /// Refresh the issues of one IDE file when the server has no pull endpoint.
    pub fn refresh_file(
        &self,
        binding: &ProjectBinding,
        ide_path: &str,
        branch: &str,
        cancel: &CancelToken,
    ) -> Result<FileRefresh> {
        let server_info = self.server_info(&binding.project_key, false, cancel)?;
        FindingsSynchronizer::new(self.storage.project(&binding.project_key), FindingKind::Issue)
            .update_file_issues_if_needed(self.api, binding, ide_path, branch, &server_info.version, cancel)
    }
}
