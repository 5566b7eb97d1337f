//! Session state shared by the presentation layer.
//!
//! [`AppState`] wires the injected handles together (remote store, identity
//! provider, local preferences, optional object storage) and exposes the
//! account-scoped operations that need the signed-in id.

use std::sync::Arc;

use bytes::Bytes;
use tracing::info;

use rankbait_shared::{Group, GroupId, MemberId, NewPost, PostId, VoteAction, VoteTransition};
use rankbait_store::{Database, DocumentStore, ScalarStore};

use crate::admission::{Admission, JoinAttempt};
use crate::config::ClientConfig;
use crate::coordinator::PendingWrite;
use crate::error::{ClientError, Result};
use crate::feed::PostFeed;
use crate::identity::IdentityProvider;
use crate::preferences::Preferences;
use crate::profile::Profiles;
use crate::repository::Repository;
use crate::upload::{post_image_path, CloudinaryStorage, ObjectStorage};

/// An image attached to a post or profile before upload.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub data: Bytes,
    pub content_type: String,
}

/// Central application state.
pub struct AppState {
    /// Settings the engine was started with.
    pub config: ClientConfig,

    /// Typed access to the remote document store.
    repo: Repository,

    /// Source of the signed-in account id.
    identity: Arc<dyn IdentityProvider>,

    /// Device-local preferences (selected group, joined groups).
    preferences: Preferences,

    /// Image host. `None` when uploads are not configured.
    storage: Option<Arc<dyn ObjectStorage>>,

    profiles: Profiles,
    admission: Admission,
}

impl AppState {
    pub fn new(
        config: ClientConfig,
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        scalars: Arc<dyn ScalarStore>,
    ) -> Self {
        let repo = Repository::new(store);
        let preferences = Preferences::new(scalars);
        let profiles = Profiles::new(repo.clone());
        let admission =
            Admission::new(repo.clone(), profiles.clone(), &config).with_preferences(preferences.clone());
        let storage = CloudinaryStorage::from_config(&config)
            .map(|storage| Arc::new(storage) as Arc<dyn ObjectStorage>);

        Self {
            config,
            repo,
            identity,
            preferences,
            storage,
            profiles,
            admission,
        }
    }

    /// Build state with preferences in the local settings database, under
    /// `config.data_dir` or the platform data directory.
    pub fn open(
        config: ClientConfig,
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Self> {
        let database = match &config.data_dir {
            Some(dir) => Database::open_in(dir)?,
            None => Database::new()?,
        };
        info!(path = ?database.path(), "Local settings opened");
        Ok(Self::new(config, store, identity, Arc::new(database)))
    }

    /// Replace the object storage used for image uploads.
    pub fn with_storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn profiles(&self) -> &Profiles {
        &self.profiles
    }

    pub fn admission(&self) -> &Admission {
        &self.admission
    }

    pub fn account_id(&self) -> Result<MemberId> {
        self.identity.require_account_id()
    }

    /// Create the user document for the signed-in account if needed.
    pub async fn ensure_signed_in_user(&self, email: Option<&str>) -> Result<()> {
        let account = self.account_id()?;
        self.profiles.ensure_user(&account, email).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Feed
    // ------------------------------------------------------------------

    /// Open a feed on the last selected group, if any.
    pub async fn open_selected_feed(&self) -> Result<Option<PostFeed>> {
        match self.preferences.selected_group()? {
            Some(group) => Ok(Some(self.open_feed(group).await?)),
            None => Ok(None),
        }
    }

    /// Select `group` and open a feed on it.
    pub async fn open_feed(&self, group: GroupId) -> Result<PostFeed> {
        self.preferences.select_group(group)?;
        PostFeed::open(self.repo.clone(), &self.config, group).await
    }

    /// Point an existing feed at another group and remember the choice.
    pub async fn switch_feed(&self, feed: &mut PostFeed, group: GroupId) -> Result<()> {
        self.preferences.select_group(group)?;
        feed.switch_group(group).await
    }

    /// Vote as the signed-in account.
    pub fn vote(
        &self,
        feed: &mut PostFeed,
        post_id: &PostId,
        action: VoteAction,
    ) -> Result<Option<VoteTransition>> {
        let voter = self.account_id()?;
        Ok(feed.apply_vote(post_id, &voter, action))
    }

    /// Write a post about `subject` in the feed's group, uploading `image`
    /// first when given.
    pub async fn compose_post(
        &self,
        feed: &mut PostFeed,
        subject: MemberId,
        content: &str,
        image: Option<ImageUpload>,
    ) -> Result<PendingWrite> {
        let author = self.account_id()?;
        let group_id = feed.group_id().ok_or(ClientError::NoGroupSelected)?;

        let image_url = match image {
            Some(image) => Some(self.upload(&post_image_path(&author), image).await?),
            None => None,
        };

        feed.create_post(NewPost {
            group_id,
            subject_id: subject,
            author_id: author,
            content: content.to_string(),
            image_url,
        })
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    /// Create a group as the signed-in account, record the creator's
    /// nickname and select the group.
    pub async fn create_group(&self, name: &str, nickname: &str) -> Result<Group> {
        let creator = self.account_id()?;
        let group = self.admission.create_group(name, &creator).await?;
        self.profiles.set_nickname(&creator, &group.id, nickname).await?;
        self.preferences.select_group(group.id)?;
        Ok(group)
    }

    pub async fn join_group(&self, attempt: &mut JoinAttempt, code: &str, nickname: &str) -> Result<Group> {
        let member = self.account_id()?;
        let group = self
            .admission
            .join_with_code(attempt, code, &member, nickname)
            .await?;
        self.preferences.select_group(group.id)?;
        Ok(group)
    }

    pub async fn leave_group(&self, group: &GroupId) -> Result<()> {
        let member = self.account_id()?;
        self.admission.leave_group(group, &member).await
    }

    pub async fn my_groups(&self) -> Result<Vec<Group>> {
        let member = self.account_id()?;
        self.admission.groups_for_member(&member).await
    }

    // ------------------------------------------------------------------
    // Profile
    // ------------------------------------------------------------------

    pub async fn update_profile_image(&self, image: ImageUpload) -> Result<String> {
        let member = self.account_id()?;
        let storage = self.storage()?;
        self.profiles
            .upload_profile_image(&**storage, &member, image.data, &image.content_type)
            .await
    }

    fn storage(&self) -> Result<&Arc<dyn ObjectStorage>> {
        self.storage
            .as_ref()
            .ok_or_else(|| ClientError::Upload("image uploads are not configured".to_string()))
    }

    async fn upload(&self, path: &str, image: ImageUpload) -> Result<String> {
        self.storage()?
            .upload(path, image.data, &image.content_type)
            .await
    }
}
