//! Group creation and invite-code admission.
//!
//! Joining a group is a short state machine driven by
//! [`Admission::join_with_code`]:
//!
//! ```text
//! EnteringCode -> LookingUp -> Found -> Joining -> Joined
//!                           -> NotFound
//!                           -> LookupFailed
//!                                      Joining -> JoinFailed
//! ```
//!
//! Store errors propagate to the caller unchanged; the attempt records the
//! terminal state and always clears its in-progress flag.

use tracing::{debug, info, warn};

use rankbait_shared::invite;
use rankbait_shared::models::validate_nickname;
use rankbait_shared::{Group, GroupId, InviteCode, MemberId};
use rankbait_store::Subscription;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::preferences::Preferences;
use crate::profile::Profiles;
use crate::repository::Repository;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinState {
    EnteringCode,
    LookingUp { code: String },
    Found(Group),
    Joining(Group),
    Joined(Group),
    NotFound { code: String },
    LookupFailed { message: String },
    JoinFailed { group_id: GroupId, message: String },
}

impl JoinState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Joined(_) | Self::NotFound { .. } | Self::LookupFailed { .. } | Self::JoinFailed { .. }
        )
    }
}

/// One user-visible attempt at joining a group by invite code.
#[derive(Debug, Clone)]
pub struct JoinAttempt {
    state: JoinState,
    in_progress: bool,
}

impl JoinAttempt {
    pub fn new() -> Self {
        Self {
            state: JoinState::EnteringCode,
            in_progress: false,
        }
    }

    pub fn state(&self) -> &JoinState {
        &self.state
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    /// Back to code entry, e.g. after the user edits the code.
    pub fn reset(&mut self) {
        self.state = JoinState::EnteringCode;
        self.in_progress = false;
    }

    fn enter(&mut self, state: JoinState) {
        debug!(from = ?self.state, to = ?state, "Join state");
        self.state = state;
    }
}

impl Default for JoinAttempt {
    fn default() -> Self {
        Self::new()
    }
}

/// Live view of one group document. Yields `None` when the group is
/// deleted.
#[derive(Debug)]
pub struct GroupWatch {
    subscription: Subscription,
}

impl GroupWatch {
    /// Next pushed value; outer `None` once the store closed the watch.
    pub async fn next(&mut self) -> Option<Option<Group>> {
        let snapshot = self.subscription.next_snapshot().await?;
        Some(snapshot.decode_all().into_iter().next())
    }
}

#[derive(Clone)]
pub struct Admission {
    repo: Repository,
    profiles: Profiles,
    preferences: Option<Preferences>,
    invite_code_attempts: usize,
}

impl Admission {
    pub fn new(repo: Repository, profiles: Profiles, config: &ClientConfig) -> Self {
        Self {
            repo,
            profiles,
            preferences: None,
            invite_code_attempts: config.invite_code_attempts.max(1),
        }
    }

    /// Record joined and left groups in local preferences as well.
    pub fn with_preferences(mut self, preferences: Preferences) -> Self {
        self.preferences = Some(preferences);
        self
    }

    /// Create a group whose only member is `creator`.
    pub async fn create_group(&self, name: &str, creator: &MemberId) -> Result<Group> {
        self.create_group_with(name, creator, InviteCode::generate)
            .await
    }

    /// Create a group drawing invite codes from `next_code` until one is
    /// unused.
    pub(crate) async fn create_group_with(
        &self,
        name: &str,
        creator: &MemberId,
        mut next_code: impl FnMut() -> InviteCode,
    ) -> Result<Group> {
        let mut group = Group::new(name, creator.clone(), next_code())?;

        for attempt in 1..=self.invite_code_attempts {
            let taken = self
                .repo
                .fetch_group_by_invite_code(group.invite_code.as_str())
                .await?
                .is_some();
            if !taken {
                self.repo.save_group(&group).await?;
                info!(
                    group = %group.id,
                    code = %group.invite_code,
                    creator = %creator.short(),
                    "Group created"
                );
                self.remember(group.id)?;
                return Ok(group);
            }

            warn!(attempt, code = %group.invite_code, "Invite code already in use, regenerating");
            group.invite_code = next_code();
        }

        Err(ClientError::InviteCodeExhausted(self.invite_code_attempts))
    }

    /// Case-insensitive lookup by invite code.
    pub async fn fetch_group_by_invite_code(&self, code: &str) -> Result<Option<Group>> {
        Ok(self.repo.fetch_group_by_invite_code(code).await?)
    }

    pub async fn fetch_group(&self, group_id: &GroupId) -> Result<Option<Group>> {
        Ok(self.repo.fetch_group(group_id).await?)
    }

    pub async fn watch_group(&self, group_id: &GroupId) -> Result<GroupWatch> {
        let subscription = self.repo.subscribe_group(group_id).await?;
        Ok(GroupWatch { subscription })
    }

    /// Add `member` to the group's members unless already present.
    pub async fn add_member_to_group(&self, group_id: &GroupId, member: &MemberId) -> Result<Group> {
        let mut group = self
            .repo
            .fetch_group(group_id)
            .await?
            .ok_or(ClientError::GroupNotFound(*group_id))?;

        if group.add_member(member.clone()) {
            self.repo.update_members(&group).await?;
            info!(group = %group_id, member = %member.short(), "Member added");
        } else {
            debug!(group = %group_id, member = %member.short(), "Already a member");
        }
        Ok(group)
    }

    /// Remove `member` and their nickname for the group. Unknown groups and
    /// non-members are a no-op.
    pub async fn remove_member_from_group(&self, group_id: &GroupId, member: &MemberId) -> Result<()> {
        let Some(mut group) = self.repo.fetch_group(group_id).await? else {
            debug!(group = %group_id, "Removing member from unknown group");
            return Ok(());
        };

        if group.remove_member(member) {
            self.repo.update_members(&group).await?;
            info!(group = %group_id, member = %member.short(), "Member removed");
        }
        self.profiles.clear_nickname(member, group_id).await
    }

    /// Remove `member` from the group and forget it locally.
    pub async fn leave_group(&self, group_id: &GroupId, member: &MemberId) -> Result<()> {
        self.remove_member_from_group(group_id, member).await?;
        if let Some(preferences) = &self.preferences {
            preferences.forget_group(group_id)?;
        }
        Ok(())
    }

    pub async fn groups_for_member(&self, member: &MemberId) -> Result<Vec<Group>> {
        Ok(self.repo.groups_for_member(member).await?)
    }

    /// Look up `code`, join the group as `member` under `nickname` and
    /// remember it locally.
    pub async fn join_with_code(
        &self,
        attempt: &mut JoinAttempt,
        code: &str,
        member: &MemberId,
        nickname: &str,
    ) -> Result<Group> {
        attempt.in_progress = true;
        let result = self.drive_join(attempt, code, member, nickname).await;
        attempt.in_progress = false;
        result
    }

    async fn drive_join(
        &self,
        attempt: &mut JoinAttempt,
        code: &str,
        member: &MemberId,
        nickname: &str,
    ) -> Result<Group> {
        let nickname = validate_nickname(nickname)?;
        let code = invite::normalize(code);
        attempt.enter(JoinState::LookingUp { code: code.clone() });

        if let Err(e) = InviteCode::parse(&code) {
            attempt.enter(JoinState::NotFound { code });
            return Err(e.into());
        }

        let group = match self.repo.fetch_group_by_invite_code(&code).await {
            Ok(Some(group)) => group,
            Ok(None) => {
                info!(code = %code, "No group for invite code");
                attempt.enter(JoinState::NotFound { code: code.clone() });
                return Err(ClientError::InviteCodeNotFound(code));
            }
            Err(e) => {
                warn!(code = %code, error = %e, "Invite code lookup failed");
                attempt.enter(JoinState::LookupFailed {
                    message: e.to_string(),
                });
                return Err(e.into());
            }
        };

        attempt.enter(JoinState::Found(group.clone()));
        attempt.enter(JoinState::Joining(group.clone()));

        match self.admit(&group.id, member, &nickname).await {
            Ok(joined) => {
                info!(group = %joined.id, member = %member.short(), "Joined group");
                attempt.enter(JoinState::Joined(joined.clone()));
                Ok(joined)
            }
            Err(e) => {
                warn!(group = %group.id, error = %e, "Joining group failed");
                attempt.enter(JoinState::JoinFailed {
                    group_id: group.id,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn admit(&self, group_id: &GroupId, member: &MemberId, nickname: &str) -> Result<Group> {
        let group = self.add_member_to_group(group_id, member).await?;
        self.profiles.set_nickname(member, group_id, nickname).await?;
        self.remember(group.id)?;
        Ok(group)
    }

    fn remember(&self, group_id: GroupId) -> Result<()> {
        if let Some(preferences) = &self.preferences {
            preferences.remember_group(group_id)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rankbait_store::{Database, MemoryStore, StoreError};

    struct Fixture {
        store: MemoryStore,
        repo: Repository,
        admission: Admission,
        preferences: Preferences,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let repo = Repository::new(Arc::new(store.clone()));
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("prefs.db")).unwrap();
        let preferences = Preferences::new(Arc::new(db));
        let admission = Admission::new(
            repo.clone(),
            Profiles::new(repo.clone()),
            &ClientConfig::default(),
        )
        .with_preferences(preferences.clone());
        Fixture {
            store,
            repo,
            admission,
            preferences,
            _dir: dir,
        }
    }

    fn code(s: &str) -> InviteCode {
        InviteCode::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_create_group_persists_creator_only() {
        let fx = fixture();
        let creator = MemberId::new("creator");

        let group = fx.admission.create_group("  Office  ", &creator).await.unwrap();
        assert_eq!(group.name, "Office");
        assert_eq!(group.members, vec![creator]);
        assert_eq!(group.invite_code.as_str().len(), 6);

        let stored = fx.repo.fetch_group(&group.id).await.unwrap().unwrap();
        assert_eq!(stored, group);
        assert!(fx.preferences.is_in_group(&group.id).unwrap());
    }

    #[tokio::test]
    async fn test_create_group_regenerates_taken_code() {
        let fx = fixture();
        let creator = MemberId::new("creator");
        let first = fx
            .admission
            .create_group_with("First", &creator, || code("AAAAAA"))
            .await
            .unwrap();

        let mut codes = vec![code("BBBBBB"), code("AAAAAA")];
        let second = fx
            .admission
            .create_group_with("Second", &creator, move || codes.pop().unwrap())
            .await
            .unwrap();

        assert_eq!(first.invite_code.as_str(), "AAAAAA");
        assert_eq!(second.invite_code.as_str(), "BBBBBB");
    }

    #[tokio::test]
    async fn test_create_group_gives_up_after_attempts() {
        let fx = fixture();
        let creator = MemberId::new("creator");
        fx.admission
            .create_group_with("First", &creator, || code("AAAAAA"))
            .await
            .unwrap();

        let err = fx
            .admission
            .create_group_with("Second", &creator, || code("AAAAAA"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InviteCodeExhausted(5)));
    }

    #[tokio::test]
    async fn test_create_group_rejects_blank_name() {
        let fx = fixture();
        let err = fx
            .admission
            .create_group("  ", &MemberId::new("c"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_group_propagates_store_error() {
        let fx = fixture();
        fx.store.go_offline();
        let err = fx
            .admission
            .create_group("Office", &MemberId::new("c"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Store(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_add_member_is_idempotent() {
        let fx = fixture();
        let group = fx
            .admission
            .create_group("Office", &MemberId::new("c"))
            .await
            .unwrap();
        let joiner = MemberId::new("j");

        let once = fx.admission.add_member_to_group(&group.id, &joiner).await.unwrap();
        let twice = fx.admission.add_member_to_group(&group.id, &joiner).await.unwrap();
        assert_eq!(once, twice);
        assert_eq!(twice.members, vec![MemberId::new("c"), joiner]);
    }

    #[tokio::test]
    async fn test_add_member_to_unknown_group() {
        let fx = fixture();
        let missing = GroupId::new();
        let err = fx
            .admission
            .add_member_to_group(&missing, &MemberId::new("j"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::GroupNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn test_remove_non_member_is_noop() {
        let fx = fixture();
        let group = fx
            .admission
            .create_group("Office", &MemberId::new("c"))
            .await
            .unwrap();

        fx.admission
            .remove_member_from_group(&group.id, &MemberId::new("stranger"))
            .await
            .unwrap();
        fx.admission
            .remove_member_from_group(&GroupId::new(), &MemberId::new("stranger"))
            .await
            .unwrap();

        let stored = fx.repo.fetch_group(&group.id).await.unwrap().unwrap();
        assert_eq!(stored.members, group.members);
    }

    #[tokio::test]
    async fn test_join_with_code_happy_path() {
        let fx = fixture();
        let group = fx
            .admission
            .create_group("Office", &MemberId::new("c"))
            .await
            .unwrap();
        let joiner = MemberId::new("j");
        let mut attempt = JoinAttempt::new();

        let lower = group.invite_code.as_str().to_lowercase();
        let joined = fx
            .admission
            .join_with_code(&mut attempt, &format!(" {lower} "), &joiner, " Jo ")
            .await
            .unwrap();

        assert!(joined.is_member(&joiner));
        assert_eq!(attempt.state(), &JoinState::Joined(joined.clone()));
        assert!(!attempt.in_progress());

        let profile = fx.repo.fetch_user(&joiner).await.unwrap().unwrap();
        assert_eq!(profile.nickname_for(&group.id), Some("Jo"));
        assert!(fx.preferences.is_in_group(&group.id).unwrap());
    }

    #[tokio::test]
    async fn test_join_with_unknown_code() {
        let fx = fixture();
        let mut attempt = JoinAttempt::new();

        let err = fx
            .admission
            .join_with_code(&mut attempt, "zzzzzz", &MemberId::new("j"), "Jo")
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::InviteCodeNotFound(ref c) if c == "ZZZZZZ"));
        assert_eq!(
            attempt.state(),
            &JoinState::NotFound {
                code: "ZZZZZZ".to_string()
            }
        );
        assert!(!attempt.in_progress());
    }

    #[tokio::test]
    async fn test_join_lookup_failure() {
        let fx = fixture();
        fx.store.go_offline();
        let mut attempt = JoinAttempt::new();

        let err = fx
            .admission
            .join_with_code(&mut attempt, "ABC234", &MemberId::new("j"), "Jo")
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Store(_)));
        assert!(matches!(attempt.state(), JoinState::LookupFailed { .. }));
        assert!(attempt.state().is_terminal());
        assert!(!attempt.in_progress());
    }

    #[tokio::test]
    async fn test_join_malformed_code() {
        let fx = fixture();
        let mut attempt = JoinAttempt::new();

        let err = fx
            .admission
            .join_with_code(&mut attempt, "12", &MemberId::new("j"), "Jo")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert!(matches!(attempt.state(), JoinState::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_leave_group_removes_member_nickname_and_preference() {
        let fx = fixture();
        let group = fx
            .admission
            .create_group("Office", &MemberId::new("c"))
            .await
            .unwrap();
        let joiner = MemberId::new("j");
        let mut attempt = JoinAttempt::new();
        fx.admission
            .join_with_code(&mut attempt, group.invite_code.as_str(), &joiner, "Jo")
            .await
            .unwrap();
        fx.preferences.select_group(group.id).unwrap();

        fx.admission.leave_group(&group.id, &joiner).await.unwrap();

        let stored = fx.repo.fetch_group(&group.id).await.unwrap().unwrap();
        assert!(!stored.is_member(&joiner));
        let profile = fx.repo.fetch_user(&joiner).await.unwrap().unwrap();
        assert_eq!(profile.nickname_for(&group.id), None);
        assert!(!fx.preferences.is_in_group(&group.id).unwrap());
        assert_eq!(fx.preferences.selected_group().unwrap(), None);
    }

    #[tokio::test]
    async fn test_groups_for_member() {
        let fx = fixture();
        let me = MemberId::new("me");
        let mine = fx.admission.create_group("Mine", &me).await.unwrap();
        fx.admission
            .create_group("Theirs", &MemberId::new("them"))
            .await
            .unwrap();

        let groups = fx.admission.groups_for_member(&me).await.unwrap();
        assert_eq!(groups, vec![mine]);
    }

    #[tokio::test]
    async fn test_watch_group_sees_membership_changes() {
        let fx = fixture();
        let group = fx
            .admission
            .create_group("Office", &MemberId::new("c"))
            .await
            .unwrap();
        let mut watch = fx.admission.watch_group(&group.id).await.unwrap();
        assert_eq!(watch.next().await, Some(Some(group.clone())));

        fx.admission
            .add_member_to_group(&group.id, &MemberId::new("j"))
            .await
            .unwrap();
        let updated = watch.next().await.unwrap().unwrap();
        assert_eq!(updated.members.len(), 2);
    }
}
