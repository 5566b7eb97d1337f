//! Member profiles: per-group nicknames, profile images and stats.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tracing::{debug, info};

use rankbait_shared::constants::FALLBACK_NICKNAME;
use rankbait_shared::models::validate_nickname;
use rankbait_shared::{GroupId, MemberId, UserProfile};

use crate::error::Result;
use crate::repository::Repository;
use crate::upload::{profile_image_path, ObjectStorage};

type NicknameCache = HashMap<(MemberId, GroupId), String>;

/// Activity of one member within one group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemberStats {
    /// Posts the member wrote.
    pub posts: usize,
    /// Posts written about the member.
    pub mentions: usize,
    /// Voters across the member's own posts.
    pub total_votes: usize,
}

#[derive(Clone)]
pub struct Profiles {
    repo: Repository,
    nicknames: Arc<Mutex<NicknameCache>>,
}

impl Profiles {
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            nicknames: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn cache(&self) -> MutexGuard<'_, NicknameCache> {
        self.nicknames.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fetch the user document, creating it on first sign-in.
    pub async fn ensure_user(&self, account: &MemberId, email: Option<&str>) -> Result<UserProfile> {
        if let Some(profile) = self.repo.fetch_user(account).await? {
            return Ok(profile);
        }
        let profile = UserProfile::new(account.clone(), email.map(str::to_string));
        self.repo.save_user(&profile).await?;
        info!(account = %account.short(), "User document created");
        Ok(profile)
    }

    /// Store a trimmed nickname for `member` in `group`. Returns the stored
    /// value.
    pub async fn set_nickname(
        &self,
        member: &MemberId,
        group: &GroupId,
        nickname: &str,
    ) -> Result<String> {
        let nickname = validate_nickname(nickname)?;
        self.ensure_user(member, None).await?;
        self.repo.set_nickname(member, group, &nickname).await?;

        self.cache()
            .insert((member.clone(), *group), nickname.clone());
        debug!(member = %member.short(), group = %group, "Nickname updated");
        Ok(nickname)
    }

    /// Remove the nickname entry for `member` in `group`, if any.
    pub async fn clear_nickname(&self, member: &MemberId, group: &GroupId) -> Result<()> {
        self.cache().remove(&(member.clone(), *group));

        let has_entry = self
            .repo
            .fetch_user(member)
            .await?
            .is_some_and(|profile| profile.nickname_for(group).is_some());
        if has_entry {
            self.repo.delete_nickname(member, group).await?;
            debug!(member = %member.short(), group = %group, "Nickname removed");
        }
        Ok(())
    }

    pub async fn nickname(&self, member: &MemberId, group: &GroupId) -> Result<Option<String>> {
        let key = (member.clone(), *group);
        let cached = self.cache().get(&key).cloned();
        if cached.is_some() {
            return Ok(cached);
        }

        let nickname = self
            .repo
            .fetch_user(member)
            .await?
            .and_then(|profile| profile.nickname_for(group).map(str::to_string));
        if let Some(name) = &nickname {
            self.cache().insert(key, name.clone());
        }
        Ok(nickname)
    }

    /// Display names for `members` in `group`; members without a nickname
    /// get the fallback name.
    pub async fn nicknames(
        &self,
        members: &[MemberId],
        group: &GroupId,
    ) -> Result<HashMap<MemberId, String>> {
        let mut names = HashMap::with_capacity(members.len());
        for member in members {
            let name = self
                .nickname(member, group)
                .await?
                .unwrap_or_else(|| FALLBACK_NICKNAME.to_string());
            names.insert(member.clone(), name);
        }
        Ok(names)
    }

    pub async fn set_profile_image(&self, member: &MemberId, url: &str) -> Result<()> {
        self.ensure_user(member, None).await?;
        self.repo.set_profile_image(member, url).await?;
        Ok(())
    }

    /// Upload a new profile image and point the user document at it.
    pub async fn upload_profile_image(
        &self,
        storage: &dyn ObjectStorage,
        member: &MemberId,
        data: Bytes,
        content_type: &str,
    ) -> Result<String> {
        let url = storage
            .upload(&profile_image_path(member), data, content_type)
            .await?;
        self.set_profile_image(member, &url).await?;
        Ok(url)
    }

    pub async fn member_stats(&self, member: &MemberId, group: &GroupId) -> Result<MemberStats> {
        let authored = self
            .repo
            .posts_where_member(group, "authorId", member)
            .await?;
        let mentions = self
            .repo
            .posts_where_member(group, "subjectId", member)
            .await?;

        Ok(MemberStats {
            posts: authored.len(),
            mentions: mentions.len(),
            total_votes: authored.iter().map(|p| p.votes.len()).sum(),
        })
    }
}
