//! Server info: version, features and settings of the server.

use tracing::{debug, info};

use crate::api::ServerApi;
use crate::models::{ServerInfo, Version};
use crate::storage::JsonRecord;
use crate::{CancelToken, Error, Result};

/// Refreshes and caches the [`ServerInfo`] of a connection.
pub struct ServerInfoSynchronizer {
    store: JsonRecord<ServerInfo>,
}

impl ServerInfoSynchronizer {
    pub fn new(store: JsonRecord<ServerInfo>) -> Self {
        Self { store }
    }

    /// Cached server info, if any.
    pub fn read(&self) -> Result<Option<ServerInfo>> {
        self.store.read()
    }

    /// Return the cached server info, refreshing it when absent or when `force` is set.
    pub fn read_or_synchronize(
        &self,
        api: &dyn ServerApi,
        project_key: Option<&str>,
        force: bool,
        cancel: &CancelToken,
    ) -> Result<ServerInfo> {
        if !force {
            if let Some(cached) = self.store.read()? {
                debug!(version = %cached.version, "Using cached server info");
                return Ok(cached);
            }
        }
        self.refresh(api, project_key, cancel)
    }

    /// Query the server and replace the stored server info.
    ///
    /// For a bound project, component settings are merged over the global
    /// ones. Nothing is written unless every request succeeded.
    pub fn refresh(&self, api: &dyn ServerApi, project_key: Option<&str>, cancel: &CancelToken) -> Result<ServerInfo> {
        let status = api.system_status(cancel).map_err(|e| download_failure(e, "Failed to read server status"))?;
        if status.status != "UP" {
            return Err(Error::ServerNotReady(status.status));
        }
        let version = Version::parse(&status.version).ok_or_else(|| Error::UnexpectedBody {
            context: "server version".to_string(),
            payload: format!("{:?}", status),
        })?;

        let features = api
            .features(cancel)
            .map_err(|e| download_failure(e, "Failed to list server features"))?;
        let mut settings = api
            .settings(None, cancel)
            .map_err(|e| download_failure(e, "Failed to read global settings"))?;
        if let Some(key) = project_key {
            let project_settings = api
                .settings(Some(key), cancel)
                .map_err(|e| download_failure(e, &format!("Failed to read settings of project '{}'", key)))?;
            settings.extend(project_settings);
        }

        let info = ServerInfo::new(version, features, settings);
        cancel.check()?;
        self.store.write(&info)?;
        info!(version = %info.version, features = info.features.len(), "[SYNC] Server info refreshed");
        Ok(info)
    }
}

/// Undecodable bodies keep their payload, everything else becomes a download failure.
fn download_failure(error: Error, context: &str) -> Error {
    match error {
        Error::UnexpectedBody { .. } => error,
        other => other.into_download_failure(context),
    }
}
