//! Domain documents shared by the store and the client.
//!
//! Every struct serializes to the camelCase JSON document kept in the remote
//! store. Timestamps travel as integer milliseconds so the store can order
//! them numerically.

use std::collections::BTreeMap;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::invite::InviteCode;
use crate::types::{GroupId, MemberId, PostId};
use crate::vote::{next_vote_state, Vote, VoteAction, VoteIntent, VoteTransition};

/// Current time truncated to the millisecond precision documents carry.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

// ---------------------------------------------------------------------------
// Post
// ---------------------------------------------------------------------------

/// A ranked comment one member wrote about another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub group_id: GroupId,
    /// Member the post is about.
    pub subject_id: MemberId,
    pub author_id: MemberId,
    pub content: String,
    /// Stored as an empty string when absent.
    #[serde(default, with = "empty_string_as_none")]
    pub image_url: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub upvotes: u32,
    #[serde(default)]
    pub downvotes: u32,
    /// One entry per voter.
    #[serde(default)]
    pub votes: BTreeMap<MemberId, Vote>,
}

/// Fields supplied by the author when composing a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub group_id: GroupId,
    pub subject_id: MemberId,
    pub author_id: MemberId,
    pub content: String,
    pub image_url: Option<String>,
}

impl Post {
    /// Build a fresh post from author input, assigning id and creation time.
    pub fn compose(new: NewPost) -> Result<Self, ValidationError> {
        let content = new.content.trim();
        if content.is_empty() {
            return Err(ValidationError::EmptyContent);
        }
        if new.subject_id.is_empty() || new.author_id.is_empty() {
            return Err(ValidationError::EmptyMemberId);
        }

        Ok(Self {
            id: PostId::new(),
            group_id: new.group_id,
            subject_id: new.subject_id,
            author_id: new.author_id,
            content: content.to_string(),
            image_url: new.image_url.filter(|url| !url.trim().is_empty()),
            created_at: now_millis(),
            upvotes: 0,
            downvotes: 0,
            votes: BTreeMap::new(),
        })
    }

    /// Net score shown on the card and folded into the leaderboard.
    pub fn score(&self) -> i64 {
        i64::from(self.upvotes) - i64::from(self.downvotes)
    }

    pub fn intent_of(&self, voter: &MemberId) -> VoteIntent {
        VoteIntent::from_vote(self.votes.get(voter).copied())
    }

    /// Apply a vote action for `voter`, updating the map entry and both
    /// counters together.
    pub fn apply_vote(&mut self, voter: &MemberId, action: VoteAction) -> VoteTransition {
        let transition = next_vote_state(self.intent_of(voter), action);

        match transition.intent.as_vote() {
            Some(vote) => {
                self.votes.insert(voter.clone(), vote);
            }
            None => {
                self.votes.remove(voter);
            }
        }
        self.upvotes = self.upvotes.saturating_add_signed(transition.delta_up);
        self.downvotes = self.downvotes.saturating_add_signed(transition.delta_down);

        transition
    }

    /// Whether both counters equal the number of matching `votes` entries.
    pub fn tallies_consistent(&self) -> bool {
        let ups = self.votes.values().filter(|v| **v == Vote::Up).count();
        let downs = self.votes.len() - ups;
        self.upvotes as usize == ups && self.downvotes as usize == downs
    }
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// A private group of members sharing one post feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    pub invite_code: InviteCode,
    /// Insertion order is kept for display; membership checks ignore it.
    #[serde(default)]
    pub members: Vec<MemberId>,
}

impl Group {
    /// A new group whose only member is its creator.
    pub fn new(
        name: &str,
        creator: MemberId,
        invite_code: InviteCode,
    ) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyGroupName);
        }
        if creator.is_empty() {
            return Err(ValidationError::EmptyMemberId);
        }

        Ok(Self {
            id: GroupId::new(),
            name: name.to_string(),
            created_at: now_millis(),
            invite_code,
            members: vec![creator],
        })
    }

    pub fn is_member(&self, member: &MemberId) -> bool {
        self.members.contains(member)
    }

    /// Append `member` unless already present. Returns whether it was added.
    pub fn add_member(&mut self, member: MemberId) -> bool {
        if self.is_member(&member) {
            return false;
        }
        self.members.push(member);
        true
    }

    /// Remove every occurrence of `member`. Returns whether anything changed.
    pub fn remove_member(&mut self, member: &MemberId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != member);
        self.members.len() != before
    }
}

// ---------------------------------------------------------------------------
// User profile
// ---------------------------------------------------------------------------

/// Per-account profile document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: MemberId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub created_at: Option<DateTime<Utc>>,
    /// Display name per group; the same account may use a different name in
    /// each group.
    #[serde(default)]
    pub nicknames: BTreeMap<GroupId, String>,
}

impl UserProfile {
    pub fn new(id: MemberId, email: Option<String>) -> Self {
        Self {
            id,
            email,
            profile_image_url: None,
            created_at: Some(now_millis()),
            nicknames: BTreeMap::new(),
        }
    }

    pub fn nickname_for(&self, group: &GroupId) -> Option<&str> {
        self.nicknames.get(group).map(String::as_str)
    }
}

/// Trim and check a nickname before it is stored.
pub fn validate_nickname(nickname: &str) -> Result<String, ValidationError> {
    let trimmed = nickname.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyNickname);
    }
    Ok(trimmed.to_string())
}

mod empty_string_as_none {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(value.as_deref().unwrap_or(""))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        Ok(raw.filter(|s| !s.trim().is_empty()))
    }
}
