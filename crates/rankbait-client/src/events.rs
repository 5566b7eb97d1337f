use serde::Serialize;

use rankbait_shared::{GroupId, PostId};

pub const EVENT_POSTS_REPLACED: &str = "posts-replaced";
pub const EVENT_VOTE_PERSISTED: &str = "vote-persisted";
pub const EVENT_VOTE_ROLLED_BACK: &str = "vote-rolled-back";
pub const EVENT_POST_CREATED: &str = "post-created";
pub const EVENT_POST_CREATE_FAILED: &str = "post-create-failed";
pub const EVENT_POST_DELETED: &str = "post-deleted";
pub const EVENT_POST_DELETE_REVERTED: &str = "post-delete-reverted";
pub const EVENT_SUBSCRIPTION_CLOSED: &str = "subscription-closed";

/// Something the presentation layer may want to react to, produced by
/// [`PostFeed::next_event`](crate::feed::PostFeed::next_event) after the
/// feed state has already been updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum FeedEvent {
    /// A pushed snapshot replaced the whole list.
    PostsReplaced { group_id: GroupId, count: usize },
    VotePersisted { post_id: PostId },
    /// A vote write failed; the post now holds the re-fetched value, or was
    /// removed when the store no longer has it.
    VoteRolledBack { post_id: PostId, removed: bool },
    PostCreated { post_id: PostId },
    /// The optimistic entry has been removed.
    PostCreateFailed { post_id: PostId, error: String },
    PostDeleted { post_id: PostId },
    /// A delete failed and the authoritative copy was put back.
    PostDeleteReverted { post_id: PostId },
    /// The store closed the live query; no further snapshots will arrive.
    SubscriptionClosed { group_id: GroupId },
}

impl FeedEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PostsReplaced { .. } => EVENT_POSTS_REPLACED,
            Self::VotePersisted { .. } => EVENT_VOTE_PERSISTED,
            Self::VoteRolledBack { .. } => EVENT_VOTE_ROLLED_BACK,
            Self::PostCreated { .. } => EVENT_POST_CREATED,
            Self::PostCreateFailed { .. } => EVENT_POST_CREATE_FAILED,
            Self::PostDeleted { .. } => EVENT_POST_DELETED,
            Self::PostDeleteReverted { .. } => EVENT_POST_DELETE_REVERTED,
            Self::SubscriptionClosed { .. } => EVENT_SUBSCRIPTION_CLOSED,
        }
    }

    /// The post this event concerns, if it is about a single post.
    pub fn post_id(&self) -> Option<PostId> {
        match self {
            Self::VotePersisted { post_id }
            | Self::VoteRolledBack { post_id, .. }
            | Self::PostCreated { post_id }
            | Self::PostCreateFailed { post_id, .. }
            | Self::PostDeleted { post_id }
            | Self::PostDeleteReverted { post_id } => Some(*post_id),
            Self::PostsReplaced { .. } | Self::SubscriptionClosed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_kind_tag() {
        let post_id = PostId::new();
        let event = FeedEvent::VoteRolledBack {
            post_id,
            removed: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "voteRolledBack");
        assert_eq!(json["postId"], post_id.to_doc_id());
        assert!(json.get("post_id").is_none());
        assert_eq!(event.name(), EVENT_VOTE_ROLLED_BACK);
        assert_eq!(event.post_id(), Some(post_id));
    }

    #[test]
    fn test_group_event_fields_are_camel_case() {
        let group_id = GroupId::new();
        let json = serde_json::to_value(FeedEvent::PostsReplaced { group_id, count: 3 }).unwrap();
        assert_eq!(json["kind"], "postsReplaced");
        assert_eq!(json["groupId"], group_id.to_doc_id());
        assert_eq!(json["count"], 3);
    }
}
