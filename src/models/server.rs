//! Server-level state: connection, server info, plugins, user and analyzer configuration.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::Version;

/// Setting enabling the multi quality mode (standard experience vs MQR).
pub const MULTI_QUALITY_MODE_SETTING: &str = "sonar.multi-quality-mode.enabled";
/// Early access flag for MISRA compliance.
pub const EARLY_ACCESS_MISRA_SETTING: &str = "sonar.earlyAccess.misra.enabled";
/// Setting synthesized when both settings above are enabled.
pub const MISRA_COMPLIANCE_SETTING: &str = "sonar.misracompliance.enabled";

/// Where and how to reach a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConnection {
    pub id: String,
    pub base_url: String,
    /// Set for organization-scoped (cloud) servers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

impl ServerConnection {
    pub fn is_organization_scoped(&self) -> bool {
        self.organization.is_some()
    }
}

/// Answer of `/api/system/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    #[serde(default)]
    pub id: String,
    pub version: String,
    pub status: String,
}

/// Version, features and settings of the server, overwritten on every refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub version: Version,

    #[serde(default)]
    pub features: BTreeSet<String>,

    #[serde(default)]
    pub global_settings: BTreeMap<String, String>,
}

impl ServerInfo {
    pub fn new(version: Version, features: BTreeSet<String>, mut global_settings: BTreeMap<String, String>) -> Self {
        apply_derived_settings(&mut global_settings);
        Self {
            version,
            features,
            global_settings,
        }
    }

    pub fn setting(&self, key: &str) -> Option<&str> {
        self.global_settings.get(key).map(String::as_str)
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.contains(feature)
    }
}

/// Synthesize settings derived from others.
///
/// MISRA compliance is enabled when the multi quality mode and the MISRA early
/// access flag are both enabled, even though the server never sends it.
pub fn apply_derived_settings(settings: &mut BTreeMap<String, String>) {
    let enabled = |key: &str| settings.get(key).is_some_and(|v| v.eq_ignore_ascii_case("true"));
    if enabled(MULTI_QUALITY_MODE_SETTING) && enabled(EARLY_ACCESS_MISRA_SETTING) {
        settings.insert(MISRA_COMPLIANCE_SETTING.to_string(), "true".to_string());
    }
}

/// A plugin installed on the server (`/api/plugins/installed`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerPlugin {
    pub key: String,
    pub hash: String,
    pub filename: String,
    #[serde(default)]
    pub sonar_lint_supported: bool,
}

impl ServerPlugin {
    /// Plugin version parsed from the jar filename (`sonar-java-plugin-5.13.1.18282.jar`).
    pub fn version_from_filename(&self) -> Option<Version> {
        let stem = self.filename.strip_suffix(".jar").unwrap_or(&self.filename);
        stem.rsplit('-')
            .find(|part| part.starts_with(|c: char| c.is_ascii_digit()))
            .and_then(Version::parse)
    }
}

/// A mirrored plugin. Embedded plugins carry neither filename nor hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PluginReference {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl PluginReference {
    pub fn embedded(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            filename: None,
            hash: None,
        }
    }

    pub fn downloaded(plugin: &ServerPlugin) -> Self {
        Self {
            key: plugin.key.clone(),
            filename: Some(plugin.filename.clone()),
            hash: Some(plugin.hash.clone()),
        }
    }

    pub fn is_embedded(&self) -> bool {
        self.filename.is_none()
    }
}

/// The full set of mirrored plugins of a connection. Always replaced as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginReferences {
    #[serde(default)]
    pub plugins_by_key: BTreeMap<String, PluginReference>,
}

impl PluginReferences {
    pub fn get(&self, key: &str) -> Option<&PluginReference> {
        self.plugins_by_key.get(key)
    }

    pub fn insert(&mut self, reference: PluginReference) {
        self.plugins_by_key.insert(reference.key.clone(), reference);
    }

    pub fn is_empty(&self) -> bool {
        self.plugins_by_key.is_empty()
    }

    /// Filenames of the downloaded (non-embedded) plugins.
    pub fn filenames(&self) -> BTreeSet<String> {
        self.plugins_by_key.values().filter_map(|r| r.filename.clone()).collect()
    }
}

/// Answer of `/api/users/current`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    #[serde(default)]
    pub is_logged_in: bool,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub login: Option<String>,
}

/// A quality profile used by a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityProfile {
    pub key: String,
    #[serde(default)]
    pub name: String,
    pub language: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub rules_updated_at: String,
}

/// A rule activated in a quality profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveRule {
    pub rule_key: String,
    pub severity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_key: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// Active rules of one language, tagged with the profile update date they were fetched at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<ActiveRule>,
    #[serde(default)]
    pub last_modified: String,
}

/// Project settings and the rule sets of its quality profiles, per language key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerConfiguration {
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
    #[serde(default)]
    pub rule_sets_by_language: BTreeMap<String, RuleSet>,
}

/// A branch of a project on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerBranch {
    pub name: String,
    #[serde(default)]
    pub is_main: bool,
}

/// Mirrored branch list of a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectBranches {
    #[serde(default)]
    pub branch_names: BTreeSet<String>,
    #[serde(default)]
    pub main_branch_name: String,
}
