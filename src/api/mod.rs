//! Access to the analysis server.
//!
//! Synchronizers only talk to the server through the [`ServerApi`] trait. The
//! production implementation is [`http::HttpServerApi`]; tests use a scripted
//! in-memory fake.

pub mod http;
pub mod wire;

#[cfg(test)]
pub(crate) mod fake;

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{
    ActiveRule, CurrentUser, Finding, Language, QualityProfile, ServerBranch, ServerPlugin, SystemStatus,
};
use crate::{CancelToken, Result};

/// Page size used by every paginated endpoint.
pub const PAGE_SIZE: u32 = 500;

/// Outcome of a pull request: changed findings, closed keys and the server timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct PullResult {
    /// Server time of the query, to pass as `changedSince` next time
    pub query_timestamp: DateTime<Utc>,
    /// New or changed findings, each with a file path
    pub changed: Vec<Finding>,
    /// Keys of findings closed since the previous pull
    pub closed_keys: BTreeSet<String>,
}

/// One page of a paginated endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based index of this page
    pub page_index: u32,
    pub page_size: u32,
    /// Total number of items across all pages
    pub total: u64,
}

impl<T> Page<T> {
    /// Whether another page follows this one.
    pub fn has_next(&self) -> bool {
        !self.items.is_empty() && u64::from(self.page_index) * u64::from(self.page_size) < self.total
    }
}

/// Fetch every page of a paginated endpoint.
///
/// The cancellation token is checked before each page, and nothing is
/// returned unless all pages were collected.
pub fn fetch_all_pages<T, F>(cancel: &CancelToken, mut fetch_page: F) -> Result<Vec<T>>
where
    F: FnMut(u32) -> Result<Page<T>>,
{
    let mut items = Vec::new();
    let mut page_index = 1;
    loop {
        cancel.check()?;
        let page = fetch_page(page_index)?;
        let has_next = page.has_next();
        items.extend(page.items);
        if !has_next {
            return Ok(items);
        }
        page_index += 1;
    }
}

/// Every server call the synchronizers need.
///
/// Implementations must check the cancellation token before sending any
/// request, return [`crate::Error::NotFound`] for unknown resources and
/// [`crate::Error::UnexpectedBody`] for bodies they cannot understand.
pub trait ServerApi {
    /// Whether the server is organization-scoped (cloud).
    fn is_organization_scoped(&self) -> bool;

    /// `GET /api/system/status`
    fn system_status(&self, cancel: &CancelToken) -> Result<SystemStatus>;

    /// `GET /api/features/list`
    fn features(&self, cancel: &CancelToken) -> Result<BTreeSet<String>>;

    /// `GET /api/settings/values.protobuf`, optionally scoped to a project.
    fn settings(&self, component: Option<&str>, cancel: &CancelToken) -> Result<BTreeMap<String, String>>;

    /// `GET /api/plugins/installed`
    fn installed_plugins(&self, cancel: &CancelToken) -> Result<Vec<ServerPlugin>>;

    /// `GET /api/plugins/download?plugin=<key>`
    fn download_plugin(&self, plugin_key: &str, cancel: &CancelToken) -> Result<Vec<u8>>;

    /// `GET /api/issues/pull`
    fn pull_issues(
        &self,
        project_key: &str,
        branch: &str,
        languages: &BTreeSet<Language>,
        changed_since: Option<DateTime<Utc>>,
        cancel: &CancelToken,
    ) -> Result<PullResult>;

    /// `GET /api/issues/pull_taint`
    fn pull_taint_issues(
        &self,
        project_key: &str,
        branch: &str,
        languages: &BTreeSet<Language>,
        changed_since: Option<DateTime<Utc>>,
        cancel: &CancelToken,
    ) -> Result<PullResult>;

    /// `GET /api/hotspots/pull`
    fn pull_hotspots(
        &self,
        project_key: &str,
        branch: &str,
        languages: &BTreeSet<Language>,
        changed_since: Option<DateTime<Utc>>,
        cancel: &CancelToken,
    ) -> Result<PullResult>;

    /// `GET /batch/issues?key=<fileOrProjectKey>&branch=`
    ///
    /// Unknown or forbidden components yield an empty list.
    fn batch_issues(&self, key: &str, branch: Option<&str>, cancel: &CancelToken) -> Result<Vec<Finding>>;

    /// `GET /api/hotspots/search`, one page.
    fn search_hotspots(&self, project_key: &str, branch: &str, page: u32, cancel: &CancelToken) -> Result<Page<Finding>>;

    /// `GET /api/issues/search` restricted to open vulnerabilities, one page.
    fn search_taint_issues(
        &self,
        project_key: &str,
        branch: &str,
        page: u32,
        cancel: &CancelToken,
    ) -> Result<Page<Finding>>;

    /// `GET /api/users/current`
    fn current_user(&self, cancel: &CancelToken) -> Result<CurrentUser>;

    /// `GET /api/qualityprofiles/search?project=<key>`
    fn quality_profiles(&self, project_key: &str, cancel: &CancelToken) -> Result<Vec<QualityProfile>>;

    /// `GET /api/rules/search` for the active rules of a profile, one page.
    fn active_rules(&self, profile_key: &str, page: u32, cancel: &CancelToken) -> Result<Page<ActiveRule>>;

    /// `GET /api/project_branches/list?project=<key>`
    fn project_branches(&self, project_key: &str, cancel: &CancelToken) -> Result<Vec<ServerBranch>>;
}
