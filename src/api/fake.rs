//! Scripted in-memory server used by synchronizer tests.
//!
//! Every call is recorded with the exact URL the HTTP implementation would
//! request, so tests can assert on request shapes and counts.

use chrono::{DateTime, TimeZone, Utc};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::wire;
use super::{Page, PullResult, ServerApi};
use crate::models::{
    ActiveRule, CurrentUser, Finding, FindingKind, Language, QualityProfile, ServerBranch, ServerPlugin, SystemStatus,
};
use crate::{CancelToken, Error, Result};

pub struct FakeServer {
    pub organization_scoped: bool,
    pub status: SystemStatus,
    pub features: BTreeSet<String>,
    pub global_settings: BTreeMap<String, String>,
    pub project_settings: BTreeMap<String, String>,
    pub plugins: Vec<ServerPlugin>,
    /// Jar content per plugin key; a missing key fails the download
    pub plugin_contents: HashMap<String, Vec<u8>>,
    pub pulls: HashMap<FindingKind, PullResult>,
    /// Batch issues per component key
    pub batch: HashMap<String, Vec<Finding>>,
    pub hotspot_pages: Vec<Page<Finding>>,
    pub taint_pages: Vec<Page<Finding>>,
    pub user: CurrentUser,
    pub profiles: Vec<QualityProfile>,
    pub rule_pages: HashMap<String, Vec<Page<ActiveRule>>>,
    pub branches: Vec<ServerBranch>,
    /// URL prefixes answered with a transport error
    pub failing: Vec<String>,
    /// Trip the token once a request with this URL prefix has been served
    pub cancel_after: Option<(String, CancelToken)>,
    requests: RefCell<Vec<String>>,
}

impl FakeServer {
    /// A server that is UP at the given version, with nothing else configured.
    pub fn new(version: &str) -> Self {
        Self {
            organization_scoped: false,
            status: SystemStatus {
                id: "20160308094653".to_string(),
                version: version.to_string(),
                status: "UP".to_string(),
            },
            features: BTreeSet::new(),
            global_settings: BTreeMap::new(),
            project_settings: BTreeMap::new(),
            plugins: Vec::new(),
            plugin_contents: HashMap::new(),
            pulls: HashMap::new(),
            batch: HashMap::new(),
            hotspot_pages: Vec::new(),
            taint_pages: Vec::new(),
            user: CurrentUser::default(),
            profiles: Vec::new(),
            rule_pages: HashMap::new(),
            branches: vec![ServerBranch {
                name: "master".to_string(),
                is_main: true,
            }],
            failing: Vec::new(),
            cancel_after: None,
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Script a pull answer for a finding kind.
    pub fn with_pull(mut self, kind: FindingKind, result: PullResult) -> Self {
        self.pulls.insert(kind, result);
        self
    }

    /// Add a plugin along with its jar content.
    pub fn with_plugin(mut self, key: &str, filename: &str, hash: &str, supported: bool, content: &str) -> Self {
        self.plugins.push(ServerPlugin {
            key: key.to_string(),
            hash: hash.to_string(),
            filename: filename.to_string(),
            sonar_lint_supported: supported,
        });
        self.plugin_contents.insert(key.to_string(), content.as_bytes().to_vec());
        self
    }

    /// Every URL requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }

    /// Number of requests whose URL starts with `prefix`.
    pub fn request_count(&self, prefix: &str) -> usize {
        self.requests.borrow().iter().filter(|r| r.starts_with(prefix)).count()
    }

    pub fn clear_requests(&self) {
        self.requests.borrow_mut().clear();
    }

    fn record(&self, url: String, cancel: &CancelToken) -> Result<()> {
        cancel.check()?;
        let failing = self.failing.iter().any(|prefix| url.starts_with(prefix.as_str()));
        if let Some((prefix, token)) = &self.cancel_after {
            if url.starts_with(prefix.as_str()) {
                token.cancel();
            }
        }
        self.requests.borrow_mut().push(url.clone());
        if failing {
            return Err(Error::Http(format!("connection reset while requesting {}", url)));
        }
        Ok(())
    }

    fn pull(&self, kind: FindingKind, url: String, cancel: &CancelToken) -> Result<PullResult> {
        self.record(url, cancel)?;
        Ok(self.pulls.get(&kind).cloned().unwrap_or_else(|| PullResult {
            query_timestamp: timestamp(0),
            changed: Vec::new(),
            closed_keys: BTreeSet::new(),
        }))
    }
}

/// A UTC instant from epoch milliseconds.
pub fn timestamp(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap()
}

/// A finding at `path` with fixed metadata.
pub fn finding(key: &str, path: &str) -> Finding {
    Finding::new(key, "java:S1234", format!("message of {}", key), path, timestamp(1_000))
}

/// A single page holding every item.
pub fn single_page<T>(items: Vec<T>) -> Page<T> {
    let total = items.len() as u64;
    Page {
        items,
        page_index: 1,
        page_size: super::PAGE_SIZE,
        total,
    }
}

fn page_at<T: Clone>(pages: &[Page<T>], page: u32) -> Page<T> {
    pages.get(page as usize - 1).cloned().unwrap_or(Page {
        items: Vec::new(),
        page_index: page,
        page_size: super::PAGE_SIZE,
        total: 0,
    })
}

impl ServerApi for FakeServer {
    fn is_organization_scoped(&self) -> bool {
        self.organization_scoped
    }

    fn system_status(&self, cancel: &CancelToken) -> Result<SystemStatus> {
        self.record(wire::SYSTEM_STATUS_URL.to_string(), cancel)?;
        Ok(self.status.clone())
    }

    fn features(&self, cancel: &CancelToken) -> Result<BTreeSet<String>> {
        self.record(wire::FEATURES_URL.to_string(), cancel)?;
        Ok(self.features.clone())
    }

    fn settings(&self, component: Option<&str>, cancel: &CancelToken) -> Result<BTreeMap<String, String>> {
        self.record(wire::settings_url(component), cancel)?;
        Ok(match component {
            Some(_) => self.project_settings.clone(),
            None => self.global_settings.clone(),
        })
    }

    fn installed_plugins(&self, cancel: &CancelToken) -> Result<Vec<ServerPlugin>> {
        self.record(wire::INSTALLED_PLUGINS_URL.to_string(), cancel)?;
        Ok(self.plugins.clone())
    }

    fn download_plugin(&self, plugin_key: &str, cancel: &CancelToken) -> Result<Vec<u8>> {
        self.record(wire::plugin_download_url(plugin_key), cancel)?;
        self.plugin_contents
            .get(plugin_key)
            .cloned()
            .ok_or_else(|| Error::Http(format!("HTTP 500 on download of {}", plugin_key)))
    }

    fn pull_issues(
        &self,
        project_key: &str,
        branch: &str,
        languages: &BTreeSet<Language>,
        changed_since: Option<DateTime<Utc>>,
        cancel: &CancelToken,
    ) -> Result<PullResult> {
        let url = wire::pull_issues_url(project_key, branch, languages, changed_since);
        self.pull(FindingKind::Issue, url, cancel)
    }

    fn pull_taint_issues(
        &self,
        project_key: &str,
        branch: &str,
        languages: &BTreeSet<Language>,
        changed_since: Option<DateTime<Utc>>,
        cancel: &CancelToken,
    ) -> Result<PullResult> {
        let url = wire::pull_taint_url(project_key, branch, languages, changed_since);
        self.pull(FindingKind::Taint, url, cancel)
    }

    fn pull_hotspots(
        &self,
        project_key: &str,
        branch: &str,
        languages: &BTreeSet<Language>,
        changed_since: Option<DateTime<Utc>>,
        cancel: &CancelToken,
    ) -> Result<PullResult> {
        let url = wire::pull_hotspots_url(project_key, branch, languages, changed_since);
        self.pull(FindingKind::Hotspot, url, cancel)
    }

    fn batch_issues(&self, key: &str, branch: Option<&str>, cancel: &CancelToken) -> Result<Vec<Finding>> {
        self.record(wire::batch_issues_url(key, branch), cancel)?;
        Ok(self.batch.get(key).cloned().unwrap_or_default())
    }

    fn search_hotspots(&self, project_key: &str, branch: &str, page: u32, cancel: &CancelToken) -> Result<Page<Finding>> {
        self.record(wire::search_hotspots_url(project_key, branch, page), cancel)?;
        Ok(page_at(&self.hotspot_pages, page))
    }

    fn search_taint_issues(
        &self,
        project_key: &str,
        branch: &str,
        page: u32,
        cancel: &CancelToken,
    ) -> Result<Page<Finding>> {
        self.record(wire::search_taint_url(project_key, branch, None, page), cancel)?;
        Ok(page_at(&self.taint_pages, page))
    }

    fn current_user(&self, cancel: &CancelToken) -> Result<CurrentUser> {
        self.record(wire::CURRENT_USER_URL.to_string(), cancel)?;
        Ok(self.user.clone())
    }

    fn quality_profiles(&self, project_key: &str, cancel: &CancelToken) -> Result<Vec<QualityProfile>> {
        self.record(wire::quality_profiles_url(project_key, None), cancel)?;
        Ok(self.profiles.clone())
    }

    fn active_rules(&self, profile_key: &str, page: u32, cancel: &CancelToken) -> Result<Page<ActiveRule>> {
        self.record(wire::active_rules_url(profile_key, None, page), cancel)?;
        Ok(self
            .rule_pages
            .get(profile_key)
            .map(|pages| page_at(pages, page))
            .unwrap_or_else(|| single_page(Vec::new())))
    }

    fn project_branches(&self, project_key: &str, cancel: &CancelToken) -> Result<Vec<ServerBranch>> {
        self.record(wire::project_branches_url(project_key), cancel)?;
        Ok(self.branches.clone())
    }
}
