//! Project settings, quality profile rule sets and branches.

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::api::{ServerApi, fetch_all_pages};
use crate::models::{AnalyzerConfiguration, Language, ProjectBranches, RuleSet};
use crate::storage::ProjectStorage;
use crate::{CancelToken, Error, Result};

/// Languages whose rule sets were fetched or reused.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalyzerConfigReport {
    pub refreshed_languages: Vec<String>,
    pub reused_languages: Vec<String>,
}

pub struct AnalyzerConfigSynchronizer {
    project: ProjectStorage,
}

impl AnalyzerConfigSynchronizer {
    pub fn new(project: ProjectStorage) -> Self {
        Self { project }
    }

    /// Refresh the analyzer configuration of the project for `languages`.
    ///
    /// Active rules of a profile are only fetched again when the profile
    /// changed since the stored rule set, or when its language is new.
    pub fn synchronize(
        &self,
        api: &dyn ServerApi,
        languages: &BTreeSet<Language>,
        cancel: &CancelToken,
    ) -> Result<AnalyzerConfigReport> {
        let project_key = self.project.project_key();
        let record = self.project.analyzer_config();
        let previous = record.read()?.unwrap_or_default();

        let settings = api
            .settings(Some(project_key), cancel)
            .map_err(|e| e.into_download_failure("Failed to download project settings"))?;
        let profiles = api
            .quality_profiles(project_key, cancel)
            .map_err(|e| e.into_download_failure("Failed to download quality profiles"))?;

        let mut config = AnalyzerConfiguration {
            settings,
            ..Default::default()
        };
        let mut report = AnalyzerConfigReport::default();
        let enabled_keys: BTreeSet<&str> = languages.iter().map(|l| l.key()).collect();

        for profile in profiles.iter().filter(|p| enabled_keys.contains(p.language.as_str())) {
            if let Some(stored) = previous.rule_sets_by_language.get(&profile.language) {
                if stored.last_modified == profile.rules_updated_at {
                    debug!(language = %profile.language, "Rule set is up-to-date");
                    config.rule_sets_by_language.insert(profile.language.clone(), stored.clone());
                    report.reused_languages.push(profile.language.clone());
                    continue;
                }
            }
            let rules = fetch_all_pages(cancel, |page| api.active_rules(&profile.key, page, cancel)).map_err(|e| {
                e.into_download_failure(&format!("Failed to download active rules of profile '{}'", profile.key))
            })?;
            info!(
                language = %profile.language,
                profile = %profile.key,
                rules = rules.len(),
                "[SYNC] Active rules downloaded"
            );
            config.rule_sets_by_language.insert(
                profile.language.clone(),
                RuleSet {
                    rules,
                    last_modified: profile.rules_updated_at.clone(),
                },
            );
            report.refreshed_languages.push(profile.language.clone());
        }

        cancel.check()?;
        record.write(&config)?;
        Ok(report)
    }

    /// Mirror the branch list of the project. A project without a main branch is an error.
    pub fn synchronize_branches(&self, api: &dyn ServerApi, cancel: &CancelToken) -> Result<ProjectBranches> {
        let project_key = self.project.project_key();
        let branches = api
            .project_branches(project_key, cancel)
            .map_err(|e| e.into_download_failure("Failed to download project branches"))?;
        let main_branch_name = branches
            .iter()
            .find(|b| b.is_main)
            .map(|b| b.name.clone())
            .ok_or_else(|| Error::UnexpectedBody {
                context: format!("No main branch for project '{}'", project_key),
                payload: format!("{:?}", branches),
            })?;
        let mirrored = ProjectBranches {
            branch_names: branches.into_iter().map(|b| b.name).collect(),
            main_branch_name,
        };
        cancel.check()?;
        self.project.branches().write(&mirrored)?;
        Ok(mirrored)
    }
}
