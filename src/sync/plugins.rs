//! Plugin synchronization: decide which server plugins the local engine needs,
//! download the missing ones and keep the plugin cache consistent.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info};

use crate::api::ServerApi;
use crate::models::{Language, PluginReference, PluginReferences, ServerPlugin, Version};
use crate::storage::{PluginsStorage, is_plain_file_name};
use crate::{CancelToken, Result};

/// Plugin families whose server-hosted variant replaces the embedded one,
/// with the minimal server version from which it does.
pub const SERVER_HOSTED_PREFERRED: &[(&str, &str)] = &[("text", "10.4")];

const ENTERPRISE_SUFFIX: &str = "enterprise";

/// Whether the server-hosted `plugin_key` supersedes the embedded plugin on this server.
///
/// Organization-scoped servers always run the latest plugins, the table only
/// applies to self-hosted ones.
pub fn prefers_server_hosted(plugin_key: &str, version: &Version, organization_scoped: bool) -> bool {
    !organization_scoped
        && SERVER_HOSTED_PREFERRED
            .iter()
            .any(|(family, min)| *family == plugin_key && version.satisfies_min_str(min))
}

fn in_compatibility_table(plugin_key: &str) -> bool {
    SERVER_HOSTED_PREFERRED.iter().any(|(family, _)| *family == plugin_key)
}

/// Why a server plugin is not downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    Embedded,
    NotSupported,
    LanguageNotEnabled,
    UnsupportedVersion { found: String, minimum: String },
    InvalidFilename { filename: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Embedded => write!(f, "it is embedded in the local engine"),
            SkipReason::NotSupported => write!(f, "it does not support local analysis"),
            SkipReason::LanguageNotEnabled => write!(f, "none of its languages is enabled"),
            SkipReason::UnsupportedVersion { found, minimum } => {
                write!(f, "version '{}' is older than the minimal supported '{}'", found, minimum)
            }
            SkipReason::InvalidFilename { filename } => {
                write!(f, "its filename '{}' is not a plain jar name", filename)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPlugin {
    pub key: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// Outcome of plugin selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadPlan {
    pub to_download: Vec<ServerPlugin>,
    /// Embedded plugins of compatibility-table families, recorded as references
    pub embedded: Vec<String>,
    pub skipped: Vec<SkippedPlugin>,
}

impl DownloadPlan {
    /// References describing every plugin of this plan.
    pub fn references(&self) -> PluginReferences {
        let mut references = PluginReferences::default();
        for key in &self.embedded {
            references.insert(PluginReference::embedded(key.as_str()));
        }
        for plugin in &self.to_download {
            references.insert(PluginReference::downloaded(plugin));
        }
        references
    }
}

/// Select the server plugins the local engine needs.
pub fn compute_download_set(
    server_plugins: &[ServerPlugin],
    enabled_languages: &BTreeSet<Language>,
    embedded_keys: &BTreeSet<String>,
    version: &Version,
    organization_scoped: bool,
) -> DownloadPlan {
    let mut plan = DownloadPlan::default();
    for plugin in server_plugins {
        let reason = skip_reason(plugin, enabled_languages, embedded_keys, version, organization_scoped).or_else(|| {
            (!is_plain_file_name(&plugin.filename)).then(|| SkipReason::InvalidFilename {
                filename: plugin.filename.clone(),
            })
        });
        match reason {
            None => plan.to_download.push(plugin.clone()),
            Some(reason) => {
                info!("[SYNC] Code analyzer '{}' is skipped: {}", plugin.key, reason);
                if reason == SkipReason::Embedded && in_compatibility_table(&plugin.key) {
                    plan.embedded.push(plugin.key.clone());
                }
                plan.skipped.push(SkippedPlugin {
                    key: plugin.key.clone(),
                    reason,
                });
            }
        }
    }
    plan
}

fn skip_reason(
    plugin: &ServerPlugin,
    enabled_languages: &BTreeSet<Language>,
    embedded_keys: &BTreeSet<String>,
    version: &Version,
    organization_scoped: bool,
) -> Option<SkipReason> {
    if embedded_keys.contains(&plugin.key) && !prefers_server_hosted(&plugin.key, version, organization_scoped) {
        return Some(SkipReason::Embedded);
    }
    if !plugin.sonar_lint_supported {
        return Some(SkipReason::NotSupported);
    }

    let languages_key = match plugin.key.strip_suffix(ENTERPRISE_SUFFIX) {
        Some(base) if !base.is_empty() => {
            let base_languages = Language::for_plugin_key(base);
            if !base_languages.iter().any(|l| enabled_languages.contains(l)) {
                return Some(SkipReason::LanguageNotEnabled);
            }
            return None;
        }
        _ => plugin.key.as_str(),
    };

    let languages = Language::for_plugin_key(languages_key);
    if languages.is_empty() {
        // Custom rules plugins are not tied to a known language
        return None;
    }
    let enabled: Vec<Language> = languages.into_iter().filter(|l| enabled_languages.contains(l)).collect();
    if enabled.is_empty() {
        return Some(SkipReason::LanguageNotEnabled);
    }

    let minimum = enabled.iter().find_map(|l| l.min_plugin_version())?;
    let found = plugin.version_from_filename()?;
    if found.satisfies_min_str(minimum) {
        None
    } else {
        Some(SkipReason::UnsupportedVersion {
            found: found.to_string(),
            minimum: minimum.to_string(),
        })
    }
}

/// Outcome of a plugin synchronization.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PluginSyncReport {
    pub any_plugin_updated: bool,
    pub downloaded: Vec<String>,
    pub up_to_date: Vec<String>,
    pub skipped: Vec<SkippedPlugin>,
    pub deleted_jars: Vec<String>,
}

/// Keeps the plugin cache of a connection in line with the server.
pub struct PluginSynchronizer {
    storage: PluginsStorage,
    embedded_keys: BTreeSet<String>,
}

impl PluginSynchronizer {
    pub fn new(storage: PluginsStorage, embedded_keys: BTreeSet<String>) -> Self {
        Self { storage, embedded_keys }
    }

    /// List the server plugins, select the needed ones and fetch them.
    pub fn synchronize(
        &self,
        api: &dyn ServerApi,
        enabled_languages: &BTreeSet<Language>,
        version: &Version,
        cancel: &CancelToken,
    ) -> Result<PluginSyncReport> {
        let server_plugins = api
            .installed_plugins(cancel)
            .map_err(|e| e.into_download_failure("Failed to list installed plugins"))?;
        let plan = compute_download_set(
            &server_plugins,
            enabled_languages,
            &self.embedded_keys,
            version,
            api.is_organization_scoped(),
        );
        let mut report = self.fetch(api, &plan, cancel)?;
        report.skipped = plan.skipped;
        Ok(report)
    }

    /// Download the plugins of `plan` missing from the cache, then replace the references.
    ///
    /// Jars and references are only written once every download succeeded.
    pub fn fetch(&self, api: &dyn ServerApi, plan: &DownloadPlan, cancel: &CancelToken) -> Result<PluginSyncReport> {
        let stored = self.storage.references()?;
        let mut report = PluginSyncReport::default();
        let mut contents = Vec::new();

        for plugin in &plan.to_download {
            if self.storage.is_up_to_date(&stored, &PluginReference::downloaded(plugin)) {
                info!("[SYNC] Code analyzer '{}' is up-to-date. Skip downloading it.", plugin.key);
                report.up_to_date.push(plugin.key.clone());
                continue;
            }
            cancel.check()?;
            info!("[SYNC] Downloading analyzer '{}'", plugin.key);
            let bytes = api
                .download_plugin(&plugin.key, cancel)
                .map_err(|e| e.into_download_failure(&format!("Failed to download plugin '{}'", plugin.key)))?;
            debug!(plugin = %plugin.key, bytes = bytes.len(), "Plugin downloaded");
            contents.push((plugin, bytes));
        }
        cancel.check()?;

        for (plugin, bytes) in &contents {
            self.storage.write_jar(&plugin.filename, bytes)?;
            report.downloaded.push(plugin.key.clone());
        }

        let references = plan.references();
        if !references.is_empty() || self.storage.references_exist() {
            self.storage.store_references(&references)?;
        }
        report.deleted_jars = self.storage.clean_up_unknown_jars(&references.filenames())?;
        report.any_plugin_updated = !report.downloaded.is_empty();
        Ok(report)
    }
}
