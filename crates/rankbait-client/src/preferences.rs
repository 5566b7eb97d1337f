//! Device-local preferences: device id, joined groups, selected group.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use rankbait_shared::GroupId;
use rankbait_store::{Result, ScalarStore};

const DEVICE_ID_KEY: &str = "com.rankbait.deviceId";
const JOINED_GROUPS_KEY: &str = "com.rankbait.userGroups";
const SELECTED_GROUP_KEY: &str = "com.rankbait.selectedGroup";

#[derive(Clone)]
pub struct Preferences {
    store: Arc<dyn ScalarStore>,
}

impl Preferences {
    pub fn new(store: Arc<dyn ScalarStore>) -> Self {
        Self { store }
    }

    /// Stable per-install id, generated on first use.
    pub fn device_id(&self) -> Result<String> {
        if let Some(id) = self.store.get(DEVICE_ID_KEY)? {
            return Ok(id);
        }
        let id = Uuid::new_v4().to_string();
        self.store.set(DEVICE_ID_KEY, &id)?;
        debug!(device_id = %id, "Generated device id");
        Ok(id)
    }

    pub fn joined_groups(&self) -> Result<Vec<GroupId>> {
        let Some(raw) = self.store.get(JOINED_GROUPS_KEY)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(groups) => Ok(groups),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable joined-groups list");
                Ok(Vec::new())
            }
        }
    }

    pub fn is_in_group(&self, group: &GroupId) -> Result<bool> {
        Ok(self.joined_groups()?.contains(group))
    }

    /// Add `group` to the joined list unless already present.
    pub fn remember_group(&self, group: GroupId) -> Result<()> {
        let mut groups = self.joined_groups()?;
        if !groups.contains(&group) {
            groups.push(group);
            self.store_groups(&groups)?;
        }
        Ok(())
    }

    /// Drop `group` from the joined list, clearing the selection if it was
    /// the selected group.
    pub fn forget_group(&self, group: &GroupId) -> Result<()> {
        let mut groups = self.joined_groups()?;
        groups.retain(|g| g != group);
        self.store_groups(&groups)?;

        if self.selected_group()?.as_ref() == Some(group) {
            self.store.remove(SELECTED_GROUP_KEY)?;
        }
        Ok(())
    }

    pub fn selected_group(&self) -> Result<Option<GroupId>> {
        let Some(raw) = self.store.get(SELECTED_GROUP_KEY)? else {
            return Ok(None);
        };
        match GroupId::parse(&raw) {
            Ok(group) => Ok(Some(group)),
            Err(e) => {
                warn!(value = %raw, error = %e, "Ignoring unreadable selected group");
                Ok(None)
            }
        }
    }

    /// Select `group`, also recording it as joined.
    pub fn select_group(&self, group: GroupId) -> Result<()> {
        self.store.set(SELECTED_GROUP_KEY, &group.to_doc_id())?;
        self.remember_group(group)
    }

    fn store_groups(&self, groups: &[GroupId]) -> Result<()> {
        let raw = serde_json::to_string(groups)?;
        self.store.set(JOINED_GROUPS_KEY, &raw)
    }
}
