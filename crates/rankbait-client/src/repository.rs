//! Typed access to the remote collections.
//!
//! Translates domain models to and from store documents. Every method is a
//! single async store round trip (or two for read-modify-write helpers) and
//! returns store errors undecorated.

use std::sync::Arc;

use serde_json::json;

use rankbait_shared::constants::{GROUPS_COLLECTION, POSTS_COLLECTION, USERS_COLLECTION};
use rankbait_shared::invite;
use rankbait_shared::{Group, GroupId, MemberId, Post, PostId, UserProfile};
use rankbait_store::document::decode_documents;
use rankbait_store::{DocumentStore, Patch, Query, Result, Subscription};

#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn DocumentStore>,
}

impl Repository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    // ------------------------------------------------------------------
    // Posts
    // ------------------------------------------------------------------

    /// Live feed query: a group's posts, newest first.
    pub fn group_posts_query(group: &GroupId) -> Query {
        Query::new()
            .where_eq("groupId", group.to_doc_id())
            .order_by_desc("createdAt")
    }

    pub async fn create_post(&self, post: &Post) -> Result<()> {
        let data = serde_json::to_value(post)?;
        self.store
            .set_document(POSTS_COLLECTION, &post.id.to_doc_id(), data)
            .await
    }

    pub async fn fetch_post(&self, id: &PostId) -> Result<Option<Post>> {
        self.store
            .get_document(POSTS_COLLECTION, &id.to_doc_id())
            .await?
            .map(|doc| doc.decode())
            .transpose()
    }

    pub async fn fetch_posts(&self, group: &GroupId) -> Result<Vec<Post>> {
        let docs = self
            .store
            .query(POSTS_COLLECTION, &Self::group_posts_query(group))
            .await?;
        Ok(decode_documents(&docs))
    }

    /// Persist the vote fields of `post` in one partial update.
    pub async fn update_votes(&self, post: &Post) -> Result<()> {
        let patch = Patch::new()
            .set("upvotes", post.upvotes)
            .set("downvotes", post.downvotes)
            .set("votes", serde_json::to_value(&post.votes)?);
        self.store
            .update_fields(POSTS_COLLECTION, &post.id.to_doc_id(), patch)
            .await
    }

    pub async fn delete_post(&self, id: &PostId) -> Result<()> {
        self.store
            .delete_document(POSTS_COLLECTION, &id.to_doc_id())
            .await
    }

    pub async fn subscribe_posts(&self, group: &GroupId) -> Result<Subscription> {
        self.store
            .subscribe(POSTS_COLLECTION, Self::group_posts_query(group))
            .await
    }

    /// Posts in `group` whose `field` equals `member`.
    pub async fn posts_where_member(
        &self,
        group: &GroupId,
        field: &str,
        member: &MemberId,
    ) -> Result<Vec<Post>> {
        let query = Query::new()
            .where_eq("groupId", group.to_doc_id())
            .where_eq(field, member.as_str());
        let docs = self.store.query(POSTS_COLLECTION, &query).await?;
        Ok(decode_documents(&docs))
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    pub async fn save_group(&self, group: &Group) -> Result<()> {
        let data = serde_json::to_value(group)?;
        self.store
            .set_document(GROUPS_COLLECTION, &group.id.to_doc_id(), data)
            .await
    }

    pub async fn fetch_group(&self, id: &GroupId) -> Result<Option<Group>> {
        self.store
            .get_document(GROUPS_COLLECTION, &id.to_doc_id())
            .await?
            .map(|doc| doc.decode())
            .transpose()
    }

    /// Case-insensitive lookup; at most one group is returned.
    pub async fn fetch_group_by_invite_code(&self, code: &str) -> Result<Option<Group>> {
        let query = Query::new()
            .where_eq("inviteCode", invite::normalize(code))
            .limit(1);
        let docs = self.store.query(GROUPS_COLLECTION, &query).await?;
        Ok(decode_documents(&docs).into_iter().next())
    }

    pub async fn update_members(&self, group: &Group) -> Result<()> {
        let patch = Patch::new().set("members", serde_json::to_value(&group.members)?);
        self.store
            .update_fields(GROUPS_COLLECTION, &group.id.to_doc_id(), patch)
            .await
    }

    /// Live view of one group document.
    pub async fn subscribe_group(&self, id: &GroupId) -> Result<Subscription> {
        let query = Query::new().where_eq("id", id.to_doc_id()).limit(1);
        self.store.subscribe(GROUPS_COLLECTION, query).await
    }

    pub async fn groups_for_member(&self, member: &MemberId) -> Result<Vec<Group>> {
        let query = Query::new().where_array_contains("members", member.as_str());
        let docs = self.store.query(GROUPS_COLLECTION, &query).await?;
        Ok(decode_documents(&docs))
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub async fn fetch_user(&self, id: &MemberId) -> Result<Option<UserProfile>> {
        self.store
            .get_document(USERS_COLLECTION, id.as_str())
            .await?
            .map(|doc| doc.decode())
            .transpose()
    }

    pub async fn save_user(&self, profile: &UserProfile) -> Result<()> {
        let data = serde_json::to_value(profile)?;
        self.store
            .set_document(USERS_COLLECTION, profile.id.as_str(), data)
            .await
    }

    pub async fn set_nickname(&self, member: &MemberId, group: &GroupId, nickname: &str) -> Result<()> {
        let patch = Patch::new().set(&group.nickname_path(), nickname);
        self.store
            .update_fields(USERS_COLLECTION, member.as_str(), patch)
            .await
    }

    pub async fn delete_nickname(&self, member: &MemberId, group: &GroupId) -> Result<()> {
        let patch = Patch::new().delete(&group.nickname_path());
        self.store
            .update_fields(USERS_COLLECTION, member.as_str(), patch)
            .await
    }

    pub async fn set_profile_image(&self, member: &MemberId, url: &str) -> Result<()> {
        let patch = Patch::new().set("profileImageUrl", json!(url));
        self.store
            .update_fields(USERS_COLLECTION, member.as_str(), patch)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rankbait_shared::{InviteCode, NewPost, VoteAction};
    use rankbait_store::MemoryStore;

    fn repo() -> Repository {
        Repository::new(Arc::new(MemoryStore::new()))
    }

    fn new_post(group: GroupId) -> Post {
        Post::compose(NewPost {
            group_id: group,
            subject_id: MemberId::new("subject"),
            author_id: MemberId::new("author"),
            content: "never replies".to_string(),
            image_url: Some("https://img.example/p.jpg".to_string()),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_post_persists_and_refetches_equal() {
        let repo = repo();
        let post = new_post(GroupId::new());
        repo.create_post(&post).await.unwrap();

        let fetched = repo.fetch_post(&post.id).await.unwrap().unwrap();
        assert_eq!(fetched, post);
    }

    #[tokio::test]
    async fn test_fetch_posts_scoped_and_newest_first() {
        let repo = repo();
        let group = GroupId::new();
        let mut older = new_post(group);
        older.created_at -= chrono::Duration::seconds(60);
        let newer = new_post(group);
        let elsewhere = new_post(GroupId::new());
        for p in [&older, &newer, &elsewhere] {
            repo.create_post(p).await.unwrap();
        }

        let ids: Vec<PostId> = repo
            .fetch_posts(&group)
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn test_update_votes_writes_all_three_fields() {
        let repo = repo();
        let mut post = new_post(GroupId::new());
        repo.create_post(&post).await.unwrap();

        post.apply_vote(&MemberId::new("v"), VoteAction::Downvote);
        repo.update_votes(&post).await.unwrap();

        let fetched = repo.fetch_post(&post.id).await.unwrap().unwrap();
        assert_eq!(fetched.downvotes, 1);
        assert_eq!(fetched.votes, post.votes);
    }

    #[tokio::test]
    async fn test_invite_lookup_is_case_insensitive() {
        let repo = repo();
        let mut group = Group::new("Crew", MemberId::new("c"), InviteCode::generate()).unwrap();
        group.invite_code = serde_json::from_str("\"ABC123\"").unwrap();
        repo.save_group(&group).await.unwrap();

        let lower = repo.fetch_group_by_invite_code("abc123").await.unwrap();
        let upper = repo.fetch_group_by_invite_code("ABC123").await.unwrap();
        assert_eq!(lower.as_ref().map(|g| g.id), Some(group.id));
        assert_eq!(lower, upper);

        assert!(repo.fetch_group_by_invite_code("ZZZZZZ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_nickname_set_and_delete() {
        let repo = repo();
        let member = MemberId::new("u1");
        let group = GroupId::new();
        repo.save_user(&UserProfile::new(member.clone(), None)).await.unwrap();

        repo.set_nickname(&member, &group, "Ace").await.unwrap();
        let profile = repo.fetch_user(&member).await.unwrap().unwrap();
        assert_eq!(profile.nickname_for(&group), Some("Ace"));

        repo.delete_nickname(&member, &group).await.unwrap();
        let profile = repo.fetch_user(&member).await.unwrap().unwrap();
        assert_eq!(profile.nickname_for(&group), None);
    }
}
