//! Identity of the user of organization-scoped connections.

use tracing::{debug, info};

use crate::api::ServerApi;
use crate::storage::{JsonRecord, StoredUser};
use crate::{CancelToken, Result};

pub struct UserSynchronizer {
    store: JsonRecord<StoredUser>,
}

impl UserSynchronizer {
    pub fn new(store: JsonRecord<StoredUser>) -> Self {
        Self { store }
    }

    /// Fetch and store the current user id. Returns the stored user, if any was written.
    pub fn synchronize(&self, api: &dyn ServerApi, cancel: &CancelToken) -> Result<Option<StoredUser>> {
        if !api.is_organization_scoped() {
            debug!("Not an organization-scoped connection, skipping user sync");
            return Ok(None);
        }
        let current = api.current_user(cancel)?;
        let Some(id) = current.id.filter(|id| !id.is_empty()) else {
            debug!("Server returned no user id");
            return Ok(None);
        };
        cancel.check()?;
        let user = StoredUser { id };
        self.store.write(&user)?;
        info!(user_id = %user.id, "[SYNC] User synchronized");
        Ok(Some(user))
    }

    pub fn read(&self) -> Result<Option<StoredUser>> {
        self.store.read()
    }
}
