//! Request URLs and response bodies exchanged with the server.
//!
//! URL builders are pure so their exact shape is unit tested. Record streams
//! (pull and batch endpoints) carry one JSON document per line.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{PAGE_SIZE, Page, PullResult};
use crate::models::{
    ActiveRule, Finding, FindingStatus, ImpactSeverity, IssueSeverity, Language, RuleType, SoftwareQuality, TextRange,
};
use crate::{Error, Result};

/// Rule repositories whose rules raise taint vulnerabilities.
pub const TAINT_REPOSITORIES: [&str; 6] = [
    "roslyn.sonaranalyzer.security.cs",
    "javasecurity",
    "jssecurity",
    "tssecurity",
    "phpsecurity",
    "pythonsecurity",
];

/// Whether a rule key (`<repository>:<rule>`) belongs to a taint repository.
pub fn is_taint_rule(rule_key: &str) -> bool {
    let repository = rule_key.split_once(':').map_or(rule_key, |(repo, _)| repo);
    TAINT_REPOSITORIES.contains(&repository)
}

/// Percent-encode a query parameter value, keeping RFC 3986 unreserved characters.
pub fn encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// URLs
// ---------------------------------------------------------------------------

pub const SYSTEM_STATUS_URL: &str = "/api/system/status";
pub const FEATURES_URL: &str = "/api/features/list";
pub const INSTALLED_PLUGINS_URL: &str = "/api/plugins/installed";
pub const CURRENT_USER_URL: &str = "/api/users/current";

pub fn settings_url(component: Option<&str>) -> String {
    match component {
        Some(key) => format!("/api/settings/values.protobuf?component={}", encode(key)),
        None => "/api/settings/values.protobuf".to_string(),
    }
}

pub fn plugin_download_url(plugin_key: &str) -> String {
    format!("/api/plugins/download?plugin={}", encode(plugin_key))
}

fn pull_url(
    endpoint: &str,
    project_key: &str,
    branch: &str,
    languages: &BTreeSet<Language>,
    changed_since: Option<DateTime<Utc>>,
) -> String {
    let mut url = format!("{}?projectKey={}&branchName={}", endpoint, encode(project_key), encode(branch));
    if !languages.is_empty() {
        url.push_str("&languages=");
        url.push_str(&Language::join_keys(languages));
    }
    if let Some(since) = changed_since {
        url.push_str(&format!("&changedSince={}", since.timestamp_millis()));
    }
    url
}

pub fn pull_issues_url(
    project_key: &str,
    branch: &str,
    languages: &BTreeSet<Language>,
    changed_since: Option<DateTime<Utc>>,
) -> String {
    pull_url("/api/issues/pull", project_key, branch, languages, changed_since)
}

pub fn pull_taint_url(
    project_key: &str,
    branch: &str,
    languages: &BTreeSet<Language>,
    changed_since: Option<DateTime<Utc>>,
) -> String {
    pull_url("/api/issues/pull_taint", project_key, branch, languages, changed_since)
}

pub fn pull_hotspots_url(
    project_key: &str,
    branch: &str,
    languages: &BTreeSet<Language>,
    changed_since: Option<DateTime<Utc>>,
) -> String {
    pull_url("/api/hotspots/pull", project_key, branch, languages, changed_since)
}

pub fn batch_issues_url(key: &str, branch: Option<&str>) -> String {
    let mut url = format!("/batch/issues?key={}", encode(key));
    if let Some(branch) = branch {
        url.push_str(&format!("&branch={}", encode(branch)));
    }
    url
}

pub fn search_hotspots_url(project_key: &str, branch: &str, page: u32) -> String {
    format!(
        "/api/hotspots/search?projectKey={}&branch={}&ps={}&p={}",
        encode(project_key),
        encode(branch),
        PAGE_SIZE,
        page
    )
}

pub fn search_taint_url(project_key: &str, branch: &str, organization: Option<&str>, page: u32) -> String {
    let mut url = format!(
        "/api/issues/search?componentKeys={}&branch={}&types=VULNERABILITY&statuses=OPEN,CONFIRMED,REOPENED",
        encode(project_key),
        encode(branch)
    );
    if let Some(org) = organization {
        url.push_str(&format!("&organization={}", encode(org)));
    }
    url.push_str(&format!("&ps={}&p={}", PAGE_SIZE, page));
    url
}

pub fn quality_profiles_url(project_key: &str, organization: Option<&str>) -> String {
    let mut url = format!("/api/qualityprofiles/search?project={}", encode(project_key));
    if let Some(org) = organization {
        url.push_str(&format!("&organization={}", encode(org)));
    }
    url
}

pub fn active_rules_url(profile_key: &str, organization: Option<&str>, page: u32) -> String {
    let mut url = format!(
        "/api/rules/search?qprofile={}&activation=true&f=templateKey,actives",
        encode(profile_key)
    );
    if let Some(org) = organization {
        url.push_str(&format!("&organization={}", encode(org)));
    }
    url.push_str(&format!("&ps={}&p={}", PAGE_SIZE, page));
    url
}

pub fn project_branches_url(project_key: &str) -> String {
    format!("/api/project_branches/list?project={}", encode(project_key))
}

// ---------------------------------------------------------------------------
// Decoding helpers
// ---------------------------------------------------------------------------

/// Parse a JSON body, embedding the raw payload in the error when it is not understood.
pub fn parse_json<T: DeserializeOwned>(context: &str, body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|e| Error::UnexpectedBody {
        context: format!("{} ({})", context, e),
        payload: body.to_string(),
    })
}

/// Parse a stream of newline-delimited JSON records, skipping blank lines.
pub fn parse_records<T: DeserializeOwned>(context: &str, body: &str) -> Result<Vec<T>> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| parse_json(context, line))
        .collect()
}

fn millis_to_datetime(context: &str, millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single().ok_or_else(|| Error::UnexpectedBody {
        context: context.to_string(),
        payload: millis.to_string(),
    })
}

/// Parse the `2020-10-27T23:08:58+0000` dates of the search endpoints.
fn parse_server_date(context: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::UnexpectedBody {
            context: context.to_string(),
            payload: raw.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Simple bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SettingsBody {
    #[serde(default)]
    settings: Vec<SettingValue>,
}

#[derive(Debug, Deserialize)]
struct SettingValue {
    key: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    values: Option<Vec<String>>,
}

/// Decode a settings body; multi-valued settings are joined with commas.
pub fn decode_settings(body: &str) -> Result<BTreeMap<String, String>> {
    let parsed: SettingsBody = parse_json("settings", body)?;
    Ok(parsed
        .settings
        .into_iter()
        .filter_map(|s| {
            let value = s.value.or_else(|| s.values.map(|v| v.join(",")))?;
            Some((s.key, value))
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct InstalledPluginsBody {
    plugins: Vec<crate::models::ServerPlugin>,
}

pub fn decode_installed_plugins(body: &str) -> Result<Vec<crate::models::ServerPlugin>> {
    let parsed: InstalledPluginsBody = parse_json("installed plugins", body)?;
    Ok(parsed.plugins)
}

#[derive(Debug, Deserialize)]
struct QualityProfilesBody {
    #[serde(default)]
    profiles: Vec<crate::models::QualityProfile>,
}

pub fn decode_quality_profiles(body: &str) -> Result<Vec<crate::models::QualityProfile>> {
    let parsed: QualityProfilesBody = parse_json("quality profiles", body)?;
    Ok(parsed.profiles)
}

#[derive(Debug, Deserialize)]
struct BranchesBody {
    #[serde(default)]
    branches: Vec<crate::models::ServerBranch>,
}

pub fn decode_project_branches(body: &str) -> Result<Vec<crate::models::ServerBranch>> {
    let parsed: BranchesBody = parse_json("project branches", body)?;
    Ok(parsed.branches)
}

// ---------------------------------------------------------------------------
// Pull streams
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimestampRecord {
    query_timestamp: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTextRange {
    start_line: u32,
    #[serde(default)]
    start_line_offset: u32,
    end_line: u32,
    #[serde(default)]
    end_line_offset: u32,
    #[serde(default)]
    hash: Option<String>,
}

impl From<WireTextRange> for TextRange {
    fn from(r: WireTextRange) -> Self {
        TextRange {
            start_line: r.start_line,
            start_line_offset: r.start_line_offset,
            end_line: r.end_line,
            end_line_offset: r.end_line_offset,
            hash: r.hash,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLocation {
    #[serde(default)]
    file_path: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    text_range: Option<WireTextRange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireImpact {
    software_quality: SoftwareQuality,
    severity: ImpactSeverity,
}

/// One record of `/api/issues/pull` or `/api/issues/pull_taint`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullIssueRecord {
    key: String,
    #[serde(default)]
    closed: bool,
    #[serde(default)]
    rule_key: String,
    #[serde(default)]
    main_location: Option<WireLocation>,
    #[serde(default)]
    creation_date: i64,
    #[serde(default)]
    resolved: bool,
    #[serde(default)]
    user_severity: Option<IssueSeverity>,
    #[serde(default)]
    severity: Option<IssueSeverity>,
    #[serde(default, rename = "type")]
    rule_type: Option<RuleType>,
    #[serde(default)]
    impacts: Vec<WireImpact>,
}

/// One record of `/api/hotspots/pull`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullHotspotRecord {
    key: String,
    #[serde(default)]
    closed: bool,
    #[serde(default)]
    file_path: Option<String>,
    #[serde(default)]
    rule_key: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    creation_date: i64,
    #[serde(default)]
    text_range: Option<WireTextRange>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    resolution: Option<String>,
    #[serde(default)]
    vulnerability_probability: Option<String>,
}

/// Split a pull stream into its timestamp record and its item lines.
fn split_pull_stream<'a>(context: &str, body: &'a str) -> Result<(DateTime<Utc>, Vec<&'a str>)> {
    let mut lines = body.lines().map(str::trim).filter(|l| !l.is_empty());
    let first = lines.next().ok_or_else(|| Error::UnexpectedBody {
        context: format!("{} (missing timestamp record)", context),
        payload: body.to_string(),
    })?;
    let ts: TimestampRecord = parse_json(context, first)?;
    Ok((millis_to_datetime(context, ts.query_timestamp)?, lines.collect()))
}

/// Decode an issue or taint pull stream.
///
/// Records without a file path are ignored and closed records only
/// contribute their key.
pub fn decode_issue_pull(context: &str, body: &str) -> Result<PullResult> {
    let (query_timestamp, lines) = split_pull_stream(context, body)?;
    let mut changed = Vec::new();
    let mut closed_keys = BTreeSet::new();
    for line in lines {
        let record: PullIssueRecord = parse_json(context, line)?;
        if record.closed {
            closed_keys.insert(record.key);
            continue;
        }
        let Some(location) = record.main_location else {
            continue;
        };
        let Some(file_path) = location.file_path.filter(|p| !p.is_empty()) else {
            continue;
        };
        let mut finding = Finding::new(
            record.key,
            record.rule_key,
            location.message.unwrap_or_default(),
            file_path,
            millis_to_datetime(context, record.creation_date)?,
        );
        finding.text_range = location.text_range.map(Into::into);
        finding.resolved = record.resolved;
        finding.status = if record.resolved {
            FindingStatus::Resolved
        } else {
            FindingStatus::Open
        };
        finding.severity = record.user_severity.or(record.severity);
        finding.rule_type = record.rule_type;
        finding.impacts = record
            .impacts
            .into_iter()
            .map(|i| (i.software_quality, i.severity))
            .collect();
        changed.push(finding);
    }
    Ok(PullResult {
        query_timestamp,
        changed,
        closed_keys,
    })
}

/// Decode a hotspot pull stream.
pub fn decode_hotspot_pull(body: &str) -> Result<PullResult> {
    let context = "hotspots pull";
    let (query_timestamp, lines) = split_pull_stream(context, body)?;
    let mut changed = Vec::new();
    let mut closed_keys = BTreeSet::new();
    for line in lines {
        let record: PullHotspotRecord = parse_json(context, line)?;
        if record.closed {
            closed_keys.insert(record.key);
            continue;
        }
        let Some(file_path) = record.file_path.filter(|p| !p.is_empty()) else {
            continue;
        };
        let mut finding = Finding::new(
            record.key,
            record.rule_key,
            record.message,
            file_path,
            millis_to_datetime(context, record.creation_date)?,
        );
        finding.text_range = record.text_range.map(Into::into);
        finding.status = record
            .status
            .as_deref()
            .map_or(FindingStatus::ToReview, FindingStatus::from_server);
        finding.resolved = finding.status == FindingStatus::Reviewed;
        finding.resolution = record.resolution;
        finding.rule_type = Some(RuleType::SecurityHotspot);
        finding.vulnerability_probability = record.vulnerability_probability;
        changed.push(finding);
    }
    Ok(PullResult {
        query_timestamp,
        changed,
        closed_keys,
    })
}

// ---------------------------------------------------------------------------
// Batch stream
// ---------------------------------------------------------------------------

/// One record of `/batch/issues`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchIssueRecord {
    key: String,
    #[serde(default)]
    rule_repository: String,
    #[serde(default)]
    rule_key: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    line: Option<u32>,
    #[serde(default)]
    checksum: Option<String>,
    #[serde(default)]
    creation_date: i64,
    #[serde(default)]
    severity: Option<IssueSeverity>,
    #[serde(default, rename = "type")]
    rule_type: Option<RuleType>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    resolution: Option<String>,
}

/// Decode a batch issue stream, dropping taint rules and project-level issues.
pub fn decode_batch_issues(body: &str) -> Result<Vec<Finding>> {
    let context = "batch issues";
    let records: Vec<BatchIssueRecord> = parse_records(context, body)?;
    let mut findings = Vec::new();
    for record in records {
        if TAINT_REPOSITORIES.contains(&record.rule_repository.as_str()) {
            continue;
        }
        let Some(path) = record.path.filter(|p| !p.is_empty()) else {
            continue;
        };
        let rule_key = if record.rule_repository.is_empty() {
            record.rule_key
        } else {
            format!("{}:{}", record.rule_repository, record.rule_key)
        };
        let mut finding = Finding::new(
            record.key,
            rule_key,
            record.msg,
            path,
            millis_to_datetime(context, record.creation_date)?,
        );
        finding.line = record.line;
        finding.line_hash = record.checksum;
        finding.severity = record.severity;
        finding.rule_type = record.rule_type;
        finding.status = record
            .status
            .as_deref()
            .map_or(FindingStatus::Open, FindingStatus::from_server);
        finding.resolved = record.resolution.is_some();
        finding.resolution = record.resolution;
        findings.push(finding);
    }
    Ok(findings)
}

// ---------------------------------------------------------------------------
// Paginated search bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Paging {
    page_index: u32,
    page_size: u32,
    total: u64,
}

#[derive(Debug, Deserialize)]
struct WireComponent {
    key: String,
    #[serde(default)]
    path: Option<String>,
}

fn component_paths(components: Vec<WireComponent>) -> HashMap<String, String> {
    components
        .into_iter()
        .filter_map(|c| c.path.map(|p| (c.key, p)))
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HotspotSearchBody {
    paging: Paging,
    #[serde(default)]
    hotspots: Vec<SearchHotspot>,
    #[serde(default)]
    components: Vec<WireComponent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchHotspot {
    key: String,
    component: String,
    #[serde(default)]
    rule_key: String,
    #[serde(default)]
    message: String,
    creation_date: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    resolution: Option<String>,
    #[serde(default)]
    text_range: Option<WireTextRange>,
    #[serde(default)]
    vulnerability_probability: Option<String>,
}

/// Decode one page of `/api/hotspots/search`. Hotspots on unknown components are dropped.
pub fn decode_hotspot_search(body: &str) -> Result<Page<Finding>> {
    let context = "hotspots search";
    let parsed: HotspotSearchBody = parse_json(context, body)?;
    let paths = component_paths(parsed.components);
    let mut items = Vec::new();
    for hotspot in parsed.hotspots {
        let Some(path) = paths.get(&hotspot.component) else {
            continue;
        };
        let mut finding = Finding::new(
            hotspot.key,
            hotspot.rule_key,
            hotspot.message,
            path.clone(),
            parse_server_date(context, &hotspot.creation_date)?,
        );
        finding.text_range = hotspot.text_range.map(Into::into);
        finding.status = hotspot
            .status
            .as_deref()
            .map_or(FindingStatus::ToReview, FindingStatus::from_server);
        finding.resolved = finding.status == FindingStatus::Reviewed;
        finding.resolution = hotspot.resolution;
        finding.rule_type = Some(RuleType::SecurityHotspot);
        finding.vulnerability_probability = hotspot.vulnerability_probability;
        items.push(finding);
    }
    Ok(Page {
        items,
        page_index: parsed.paging.page_index,
        page_size: parsed.paging.page_size,
        total: parsed.paging.total,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueSearchBody {
    paging: Paging,
    #[serde(default)]
    issues: Vec<SearchIssue>,
    #[serde(default)]
    components: Vec<WireComponent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchIssue {
    key: String,
    rule: String,
    component: String,
    #[serde(default)]
    message: String,
    creation_date: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    resolution: Option<String>,
    #[serde(default)]
    severity: Option<IssueSeverity>,
    #[serde(default, rename = "type")]
    rule_type: Option<RuleType>,
    #[serde(default)]
    text_range: Option<WireTextRange>,
    #[serde(default)]
    impacts: Vec<WireImpact>,
}

/// Decode one page of `/api/issues/search`, keeping only taint vulnerabilities with a file.
pub fn decode_taint_search(body: &str) -> Result<Page<Finding>> {
    let context = "taint issues search";
    let parsed: IssueSearchBody = parse_json(context, body)?;
    let paths = component_paths(parsed.components);
    let mut items = Vec::new();
    for issue in parsed.issues {
        if !is_taint_rule(&issue.rule) {
            continue;
        }
        let Some(path) = paths.get(&issue.component) else {
            continue;
        };
        let mut finding = Finding::new(
            issue.key,
            issue.rule,
            issue.message,
            path.clone(),
            parse_server_date(context, &issue.creation_date)?,
        );
        finding.text_range = issue.text_range.map(Into::into);
        finding.status = issue
            .status
            .as_deref()
            .map_or(FindingStatus::Open, FindingStatus::from_server);
        finding.resolved = issue.resolution.is_some();
        finding.resolution = issue.resolution;
        finding.severity = issue.severity;
        finding.rule_type = issue.rule_type;
        finding.impacts = issue
            .impacts
            .into_iter()
            .map(|i| (i.software_quality, i.severity))
            .collect();
        items.push(finding);
    }
    Ok(Page {
        items,
        page_index: parsed.paging.page_index,
        page_size: parsed.paging.page_size,
        total: parsed.paging.total,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RulesSearchBody {
    total: u64,
    p: u32,
    ps: u32,
    #[serde(default)]
    rules: Vec<SearchRule>,
    #[serde(default)]
    actives: HashMap<String, Vec<WireActivation>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRule {
    key: String,
    #[serde(default)]
    template_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireActivation {
    #[serde(default)]
    severity: String,
    #[serde(default)]
    params: Vec<WireParam>,
}

#[derive(Debug, Deserialize)]
struct WireParam {
    key: String,
    #[serde(default)]
    value: String,
}

/// Decode one page of active rules of a quality profile.
pub fn decode_active_rules(body: &str) -> Result<Page<ActiveRule>> {
    let mut parsed: RulesSearchBody = parse_json("active rules", body)?;
    let items = parsed
        .rules
        .into_iter()
        .map(|rule| {
            let activation = parsed.actives.remove(&rule.key).and_then(|mut a| a.pop());
            let (severity, params) = match activation {
                Some(a) => (a.severity, a.params.into_iter().map(|p| (p.key, p.value)).collect()),
                None => (String::new(), BTreeMap::new()),
            };
            ActiveRule {
                rule_key: rule.key,
                severity,
                template_key: rule.template_key,
                params,
            }
        })
        .collect();
    Ok(Page {
        items,
        page_index: parsed.p,
        page_size: parsed.ps,
        total: parsed.total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn langs(list: &[Language]) -> BTreeSet<Language> {
        list.iter().copied().collect()
    }

    #[test]
    fn test_encode_reserved_characters() {
        assert_eq!(encode("my project:key/1"), "my%20project%3Akey%2F1");
        assert_eq!(encode("feature/é"), "feature%2F%C3%A9");
        assert_eq!(encode("plain-key_1.0~"), "plain-key_1.0~");
    }

    #[test]
    fn test_pull_url_without_languages_or_timestamp() {
        assert_eq!(
            pull_issues_url("projectKey", "master", &BTreeSet::new(), None),
            "/api/issues/pull?projectKey=projectKey&branchName=master"
        );
    }

    #[test]
    fn test_pull_url_with_languages_and_timestamp() {
        let since = Utc.timestamp_millis_opt(123_456_789).unwrap();
        assert_eq!(
            pull_taint_url("projectKey", "feat/x", &langs(&[Language::Js, Language::Java]), Some(since)),
            "/api/issues/pull_taint?projectKey=projectKey&branchName=feat%2Fx&languages=java,js&changedSince=123456789"
        );
        assert_eq!(
            pull_hotspots_url("p", "b", &langs(&[Language::Java]), None),
            "/api/hotspots/pull?projectKey=p&branchName=b&languages=java"
        );
    }

    #[test]
    fn test_batch_url() {
        assert_eq!(batch_issues_url("k:src/Foo.java", None), "/batch/issues?key=k%3Asrc%2FFoo.java");
        assert_eq!(batch_issues_url("k", Some("main")), "/batch/issues?key=k&branch=main");
    }

    #[test]
    fn test_search_urls() {
        assert_eq!(
            search_hotspots_url("p", "main", 2),
            "/api/hotspots/search?projectKey=p&branch=main&ps=500&p=2"
        );
        assert_eq!(
            search_taint_url("p", "main", Some("org"), 1),
            "/api/issues/search?componentKeys=p&branch=main&types=VULNERABILITY&statuses=OPEN,CONFIRMED,REOPENED&organization=org&ps=500&p=1"
        );
        assert_eq!(settings_url(Some("p")), "/api/settings/values.protobuf?component=p");
        assert_eq!(settings_url(None), "/api/settings/values.protobuf");
    }

    #[test]
    fn test_decode_issue_pull_filters_records() {
        let body = [
            r#"{"queryTimestamp": 123}"#,
            r#"{"key": "a", "ruleKey": "java:S1", "creationDate": 1000, "resolved": false, "mainLocation": {"filePath": "src/A.java", "message": "msg", "textRange": {"startLine": 1, "startLineOffset": 2, "endLine": 3, "endLineOffset": 4, "hash": "h"}}, "userSeverity": "MAJOR", "type": "BUG", "impacts": [{"softwareQuality": "RELIABILITY", "severity": "HIGH"}]}"#,
            r#"{"key": "b", "ruleKey": "java:S2", "creationDate": 1000, "mainLocation": {"message": "project level"}}"#,
            r#"{"key": "c", "closed": true}"#,
            "",
        ]
        .join("\n");
        let result = decode_issue_pull("issues pull", &body).unwrap();
        assert_eq!(result.query_timestamp.timestamp_millis(), 123);
        assert_eq!(result.changed.len(), 1);
        let issue = &result.changed[0];
        assert_eq!(issue.key, "a");
        assert_eq!(issue.file_path, "src/A.java");
        assert_eq!(issue.message, "msg");
        assert_eq!(issue.severity, Some(IssueSeverity::Major));
        assert_eq!(issue.rule_type, Some(RuleType::Bug));
        assert_eq!(issue.impacts.get(&SoftwareQuality::Reliability), Some(&ImpactSeverity::High));
        assert_eq!(issue.text_range.as_ref().unwrap().hash.as_deref(), Some("h"));
        assert_eq!(result.closed_keys, ["c".to_string()].into_iter().collect());
    }

    #[test]
    fn test_decode_pull_requires_timestamp_record() {
        let err = decode_issue_pull("issues pull", "").unwrap_err();
        assert!(matches!(err, Error::UnexpectedBody { .. }));
    }

    #[test]
    fn test_decode_pull_embeds_payload_on_garbage() {
        match decode_hotspot_pull("not json") {
            Err(Error::UnexpectedBody { payload, .. }) => assert_eq!(payload, "not json"),
            other => panic!("Expected UnexpectedBody, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_hotspot_pull() {
        let body = [
            r#"{"queryTimestamp": 5}"#,
            r#"{"key": "h1", "filePath": "src/A.java", "ruleKey": "java:S4790", "message": "hash", "creationDate": 10, "status": "REVIEWED", "resolution": "SAFE", "vulnerabilityProbability": "LOW"}"#,
            r#"{"key": "h2", "closed": true}"#,
        ]
        .join("\n");
        let result = decode_hotspot_pull(&body).unwrap();
        assert_eq!(result.changed.len(), 1);
        assert_eq!(result.changed[0].status, FindingStatus::Reviewed);
        assert!(result.changed[0].resolved);
        assert_eq!(result.changed[0].resolution.as_deref(), Some("SAFE"));
        assert!(result.closed_keys.contains("h2"));
    }

    #[test]
    fn test_decode_batch_drops_taint_and_project_level_issues() {
        let body = [
            r#"{"key": "1", "ruleRepository": "java", "ruleKey": "S1", "msg": "m", "path": "src/A.java", "line": 3, "checksum": "c", "creationDate": 1}"#,
            r#"{"key": "2", "ruleRepository": "javasecurity", "ruleKey": "S3649", "msg": "taint", "path": "src/A.java"}"#,
            r#"{"key": "3", "ruleRepository": "java", "ruleKey": "S2", "msg": "project"}"#,
        ]
        .join("\n");
        let issues = decode_batch_issues(&body).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].rule_key, "java:S1");
        assert_eq!(issues[0].line, Some(3));
        assert_eq!(issues[0].line_hash.as_deref(), Some("c"));
    }

    #[test]
    fn test_decode_hotspot_search_resolves_component_paths() {
        let body = r#"{
            "paging": {"pageIndex": 1, "pageSize": 500, "total": 1},
            "hotspots": [{"key": "h", "component": "p:src/A.java", "ruleKey": "java:S2068", "message": "pwd", "creationDate": "2020-10-27T23:08:58+0000", "status": "TO_REVIEW"}],
            "components": [{"key": "p:src/A.java", "path": "src/A.java"}, {"key": "p"}]
        }"#;
        let page = decode_hotspot_search(body).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].file_path, "src/A.java");
        assert_eq!(page.items[0].status, FindingStatus::ToReview);
        assert!(!page.has_next());
    }

    #[test]
    fn test_decode_taint_search_keeps_taint_rules_only() {
        let body = r#"{
            "paging": {"pageIndex": 1, "pageSize": 1, "total": 3},
            "issues": [
                {"key": "t", "rule": "javasecurity:S3649", "component": "p:src/A.java", "message": "sql", "creationDate": "2021-01-01T00:00:00+0100", "severity": "CRITICAL", "type": "VULNERABILITY"},
                {"key": "n", "rule": "java:S1", "component": "p:src/A.java", "message": "x", "creationDate": "2021-01-01T00:00:00+0100"}
            ],
            "components": [{"key": "p:src/A.java", "path": "src/A.java"}]
        }"#;
        let page = decode_taint_search(body).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].key, "t");
        assert!(page.has_next());
    }

    #[test]
    fn test_decode_settings_joins_multi_values() {
        let body = r#"{"settings": [{"key": "a", "value": "1"}, {"key": "b", "values": ["x", "y"]}, {"key": "c"}]}"#;
        let settings = decode_settings(body).unwrap();
        assert_eq!(settings.get("a").map(String::as_str), Some("1"));
        assert_eq!(settings.get("b").map(String::as_str), Some("x,y"));
        assert!(!settings.contains_key("c"));
    }

    #[test]
    fn test_decode_active_rules() {
        let body = r#"{
            "total": 1, "p": 1, "ps": 500,
            "rules": [{"key": "java:S100", "templateKey": "java:Template"}],
            "actives": {"java:S100": [{"severity": "MINOR", "params": [{"key": "format", "value": "^[a-z]+$"}]}]}
        }"#;
        let page = decode_active_rules(body).unwrap();
        assert_eq!(page.items[0].severity, "MINOR");
        assert_eq!(page.items[0].template_key.as_deref(), Some("java:Template"));
        assert_eq!(page.items[0].params.get("format").map(String::as_str), Some("^[a-z]+$"));
    }

    #[test]
    fn test_is_taint_rule() {
        assert!(is_taint_rule("javasecurity:S3649"));
        assert!(!is_taint_rule("java:S1"));
    }
}
