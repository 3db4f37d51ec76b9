//! Blocking HTTP implementation of [`ServerApi`] on top of `ureq`.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::time::Duration;
use tracing::debug;

use super::wire;
use super::{Page, PullResult, ServerApi};
use crate::models::{
    ActiveRule, CurrentUser, Finding, Language, QualityProfile, ServerBranch, ServerConnection, ServerPlugin,
    SystemStatus,
};
use crate::{CancelToken, Error, Result};

/// User-Agent header sent with every request.
const USER_AGENT: &str = concat!("connected-mirror/", env!("CARGO_PKG_VERSION"));

/// Default timeout applied to connect and read.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Talks to a real server over HTTP.
pub struct HttpServerApi {
    agent: ureq::Agent,
    base_url: String,
    organization: Option<String>,
    token: Option<String>,
}

impl HttpServerApi {
    /// Create a client for a connection.
    ///
    /// The token is passed through as a bearer token, never validated.
    pub fn new(connection: &ServerConnection, token: Option<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .user_agent(USER_AGENT)
            .build();
        Self {
            agent,
            base_url: connection.base_url.trim_end_matches('/').to_string(),
            organization: connection.organization.clone(),
            token,
        }
    }

    fn request(&self, path: &str, cancel: &CancelToken) -> Result<ureq::Response> {
        cancel.check()?;
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "GET");
        let mut request = self.agent.get(&url);
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {}", token));
        }
        match request.call() {
            Ok(resp) => Ok(resp),
            Err(ureq::Error::Status(404, _)) => Err(Error::NotFound(path.to_string())),
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                Err(Error::Http(format!("HTTP {} on {}: {}", code, path, body)))
            }
            Err(e) => Err(Error::Http(e.to_string())),
        }
    }

    fn get_string(&self, path: &str, cancel: &CancelToken) -> Result<String> {
        let body = self.request(path, cancel)?.into_string()?;
        Ok(body)
    }

    fn get_bytes(&self, path: &str, cancel: &CancelToken) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.request(path, cancel)?.into_reader().read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

impl ServerApi for HttpServerApi {
    fn is_organization_scoped(&self) -> bool {
        self.organization.is_some()
    }

    fn system_status(&self, cancel: &CancelToken) -> Result<SystemStatus> {
        let body = self.get_string(wire::SYSTEM_STATUS_URL, cancel)?;
        wire::parse_json("system status", &body)
    }

    fn features(&self, cancel: &CancelToken) -> Result<BTreeSet<String>> {
        let body = self.get_string(wire::FEATURES_URL, cancel)?;
        wire::parse_json("features", &body)
    }

    fn settings(&self, component: Option<&str>, cancel: &CancelToken) -> Result<BTreeMap<String, String>> {
        let body = self.get_string(&wire::settings_url(component), cancel)?;
        wire::decode_settings(&body)
    }

    fn installed_plugins(&self, cancel: &CancelToken) -> Result<Vec<ServerPlugin>> {
        let body = self.get_string(wire::INSTALLED_PLUGINS_URL, cancel)?;
        wire::decode_installed_plugins(&body)
    }

    fn download_plugin(&self, plugin_key: &str, cancel: &CancelToken) -> Result<Vec<u8>> {
        self.get_bytes(&wire::plugin_download_url(plugin_key), cancel)
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
        let body = self.get_string(&url, cancel)?;
        wire::decode_issue_pull("issues pull", &body)
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
        let body = self.get_string(&url, cancel)?;
        wire::decode_issue_pull("taint issues pull", &body)
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
        let body = self.get_string(&url, cancel)?;
        wire::decode_hotspot_pull(&body)
    }

    fn batch_issues(&self, key: &str, branch: Option<&str>, cancel: &CancelToken) -> Result<Vec<Finding>> {
        let url = wire::batch_issues_url(key, branch);
        match self.request(&url, cancel) {
            Ok(resp) => wire::decode_batch_issues(&resp.into_string()?),
            // Unknown component or no permission on it
            Err(Error::NotFound(_)) => Ok(Vec::new()),
            Err(Error::Http(msg)) if msg.starts_with("HTTP 403 ") => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn search_hotspots(&self, project_key: &str, branch: &str, page: u32, cancel: &CancelToken) -> Result<Page<Finding>> {
        let body = self.get_string(&wire::search_hotspots_url(project_key, branch, page), cancel)?;
        wire::decode_hotspot_search(&body)
    }

    fn search_taint_issues(
        &self,
        project_key: &str,
        branch: &str,
        page: u32,
        cancel: &CancelToken,
    ) -> Result<Page<Finding>> {
        let url = wire::search_taint_url(project_key, branch, self.organization.as_deref(), page);
        let body = self.get_string(&url, cancel)?;
        wire::decode_taint_search(&body)
    }

    fn current_user(&self, cancel: &CancelToken) -> Result<CurrentUser> {
        let body = self.get_string(wire::CURRENT_USER_URL, cancel)?;
        wire::parse_json("current user", &body)
    }

    fn quality_profiles(&self, project_key: &str, cancel: &CancelToken) -> Result<Vec<QualityProfile>> {
        let url = wire::quality_profiles_url(project_key, self.organization.as_deref());
        let body = self.get_string(&url, cancel)?;
        wire::decode_quality_profiles(&body)
    }

    fn active_rules(&self, profile_key: &str, page: u32, cancel: &CancelToken) -> Result<Page<ActiveRule>> {
        let url = wire::active_rules_url(profile_key, self.organization.as_deref(), page);
        let body = self.get_string(&url, cancel)?;
        wire::decode_active_rules(&body)
    }

    fn project_branches(&self, project_key: &str, cancel: &CancelToken) -> Result<Vec<ServerBranch>> {
        let body = self.get_string(&wire::project_branches_url(project_key), cancel)?;
        wire::decode_project_branches(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(url: &str, organization: Option<&str>) -> ServerConnection {
        ServerConnection {
            id: "c".to_string(),
            base_url: url.to_string(),
            organization: organization.map(String::from),
        }
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let api = HttpServerApi::new(&connection("https://sonar.example.com/", None), None, DEFAULT_TIMEOUT);
        assert_eq!(api.base_url, "https://sonar.example.com");
        assert!(!api.is_organization_scoped());
    }

    #[test]
    fn test_organization_makes_api_org_scoped() {
        let api = HttpServerApi::new(&connection("https://cloud.example.com", Some("org")), None, DEFAULT_TIMEOUT);
        assert!(api.is_organization_scoped());
    }

    #[test]
    fn test_cancelled_token_prevents_request() {
        // Port 9 (discard) is never contacted: the token is checked first.
        let api = HttpServerApi::new(&connection("http://127.0.0.1:9", None), None, DEFAULT_TIMEOUT);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(api.system_status(&cancel).unwrap_err().is_cancellation());
    }
}
