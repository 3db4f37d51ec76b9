//! Data models for mirrored server state.
//!
//! This module defines the core data structures:
//! - `Finding` - An issue, security hotspot or taint vulnerability known to the server
//! - `BranchSyncState` - Incremental sync bookkeeping per branch and finding kind
//! - `ServerInfo` - Version, features and settings of the server
//! - `PluginReference` - A mirrored analyzer plugin
//! - `ProjectBinding` - Link between a local project and a server project

pub mod language;
pub mod server;
pub mod version;

pub use language::Language;
pub use server::{
    ActiveRule, AnalyzerConfiguration, CurrentUser, PluginReference, PluginReferences, ProjectBranches, QualityProfile,
    RuleSet, ServerBranch, ServerConnection, ServerInfo, ServerPlugin, SystemStatus,
};
pub use version::Version;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Link between a local (IDE) project and a server project.
///
/// Prefixes are matched on whole `/`-separated segments only. An empty prefix
/// matches every path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectBinding {
    pub project_key: String,
    pub server_path_prefix: String,
    pub ide_path_prefix: String,
}

impl ProjectBinding {
    pub fn new(
        project_key: impl Into<String>,
        server_path_prefix: impl Into<String>,
        ide_path_prefix: impl Into<String>,
    ) -> Self {
        Self {
            project_key: project_key.into(),
            server_path_prefix: server_path_prefix.into(),
            ide_path_prefix: ide_path_prefix.into(),
        }
    }
}

/// The three kinds of findings mirrored per branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Issue,
    Hotspot,
    Taint,
}

impl FindingKind {
    pub const ALL: [FindingKind; 3] = [FindingKind::Issue, FindingKind::Taint, FindingKind::Hotspot];

    pub fn as_str(&self) -> &'static str {
        match self {
            FindingKind::Issue => "issue",
            FindingKind::Hotspot => "hotspot",
            FindingKind::Taint => "taint",
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FindingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "issue" | "issues" => Ok(FindingKind::Issue),
            "hotspot" | "hotspots" => Ok(FindingKind::Hotspot),
            "taint" | "taints" => Ok(FindingKind::Taint),
            _ => Err(format!("Invalid finding kind: {}", s)),
        }
    }
}

/// Precise location of a finding inside its file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRange {
    pub start_line: u32,
    pub start_line_offset: u32,
    pub end_line: u32,
    pub end_line_offset: u32,
    /// Hash of the flagged code, used to track the finding when lines move.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Lifecycle status as reported by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingStatus {
    #[default]
    Open,
    Confirmed,
    Reopened,
    Resolved,
    Closed,
    ToReview,
    Reviewed,
    /// Anything this version does not know about.
    #[serde(other)]
    Unknown,
}

impl FindingStatus {
    /// Parse a server status string, mapping unknown values to [`FindingStatus::Unknown`].
    pub fn from_server(raw: &str) -> Self {
        serde_json::from_value(serde_json::Value::String(raw.to_string())).unwrap_or(FindingStatus::Unknown)
    }
}

/// Review outcome of a security hotspot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HotspotReviewStatus {
    ToReview,
    Safe,
    Fixed,
    Acknowledged,
}

impl HotspotReviewStatus {
    /// Server status and resolution matching this review outcome.
    pub fn to_status_and_resolution(self) -> (FindingStatus, Option<String>) {
        match self {
            HotspotReviewStatus::ToReview => (FindingStatus::ToReview, None),
            HotspotReviewStatus::Safe => (FindingStatus::Reviewed, Some("SAFE".to_string())),
            HotspotReviewStatus::Fixed => (FindingStatus::Reviewed, Some("FIXED".to_string())),
            HotspotReviewStatus::Acknowledged => (FindingStatus::Reviewed, Some("ACKNOWLEDGED".to_string())),
        }
    }
}

impl FromStr for HotspotReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "TO_REVIEW" => Ok(HotspotReviewStatus::ToReview),
            "SAFE" => Ok(HotspotReviewStatus::Safe),
            "FIXED" => Ok(HotspotReviewStatus::Fixed),
            "ACKNOWLEDGED" => Ok(HotspotReviewStatus::Acknowledged),
            _ => Err(format!("Invalid hotspot status: {}", s)),
        }
    }
}

/// Legacy severity of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueSeverity {
    Info,
    Minor,
    Major,
    Critical,
    Blocker,
}

/// Legacy rule type of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    CodeSmell,
    Bug,
    Vulnerability,
    SecurityHotspot,
}

/// Software quality affected by a finding, in the clean code taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SoftwareQuality {
    Maintainability,
    Reliability,
    Security,
}

/// Impact severity on a software quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImpactSeverity {
    Info,
    Low,
    Medium,
    High,
    Blocker,
}

/// An issue, security hotspot or taint vulnerability mirrored from the server.
///
/// `file_path` is always server-relative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Server-side unique key
    pub key: String,

    /// Rule that raised the finding (e.g. "java:S1234")
    pub rule_key: String,

    pub message: String,

    /// Server-relative file path
    pub file_path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_range: Option<TextRange>,

    /// Line of line-level findings downloaded through the batch endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,

    /// Checksum of the flagged line, for line-level findings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_hash: Option<String>,

    #[serde(default)]
    pub status: FindingStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,

    /// Whether the finding is resolved (accepted, false positive, fixed...)
    #[serde(default)]
    pub resolved: bool,

    pub introduction_date: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<IssueSeverity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_type: Option<RuleType>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub impacts: BTreeMap<SoftwareQuality, ImpactSeverity>,

    /// Vulnerability probability of a hotspot (HIGH, MEDIUM, LOW)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vulnerability_probability: Option<String>,
}

impl Finding {
    /// Create an open finding with the mandatory fields set.
    pub fn new(
        key: impl Into<String>,
        rule_key: impl Into<String>,
        message: impl Into<String>,
        file_path: impl Into<String>,
        introduction_date: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            rule_key: rule_key.into(),
            message: message.into(),
            file_path: file_path.into(),
            text_range: None,
            line: None,
            line_hash: None,
            status: FindingStatus::Open,
            resolution: None,
            resolved: false,
            introduction_date,
            severity: None,
            rule_type: None,
            impacts: BTreeMap::new(),
            vulnerability_probability: None,
        }
    }

    /// Set the text range.
    pub fn with_text_range(mut self, range: TextRange) -> Self {
        self.text_range = Some(range);
        self
    }

    /// Set the legacy severity.
    pub fn with_severity(mut self, severity: IssueSeverity) -> Self {
        self.severity = Some(severity);
        self
    }
}

/// Incremental synchronization bookkeeping for one branch and one finding kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSyncState {
    /// Query timestamp returned by the last successful pull
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_timestamp: Option<DateTime<Utc>>,

    /// Language set the last successful pull was made with
    #[serde(default)]
    pub last_enabled_languages: BTreeSet<Language>,
}

impl BranchSyncState {
    /// Timestamp to pull changes since, or `None` when a full pull is required.
    ///
    /// A full pull is required when nothing was pulled yet or when the requested
    /// language set differs from the one of the last pull.
    pub fn changed_since(&self, languages: &BTreeSet<Language>) -> Option<DateTime<Utc>> {
        if &self.last_enabled_languages != languages {
            return None;
        }
        self.last_sync_timestamp
    }
}

/// What a synchronization changed in the store, compared to its previous content.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateSummary {
    pub deleted_keys: BTreeSet<String>,
    pub added: Vec<Finding>,
    pub updated: Vec<Finding>,
}

impl UpdateSummary {
    pub fn is_empty(&self) -> bool {
        self.deleted_keys.is_empty() && self.added.is_empty() && self.updated.is_empty()
    }
}
