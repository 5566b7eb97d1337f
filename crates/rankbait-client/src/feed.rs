//! Real-time feed reconciler.
//!
//! `PostFeed` owns the post list of one view. It holds exactly one live
//! subscription (`posts where groupId == g order by createdAt desc`) and
//! replaces its list wholesale with every pushed snapshot. Background
//! persistence tasks spawned by the optimistic coordinator report back over
//! an mpsc channel; their completions, like snapshots, are only folded into
//! the list inside [`PostFeed::next_event`], on the owning task.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use rankbait_shared::{GroupId, Leaderboard, LeaderboardMetric, Post, PostId};
use rankbait_store::{Snapshot, Subscription};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::events::FeedEvent;
use crate::repository::Repository;

/// In-flight persistence for one post.
///
/// Removing the entry clears the context: every task in it is aborted and
/// any completion that still arrives for it is discarded.
#[derive(Default)]
pub(crate) struct MutationContext {
    pub(crate) tasks: Vec<(u64, JoinHandle<()>)>,
}

impl MutationContext {
    fn abort_all(&self) {
        for (_, task) in &self.tasks {
            task.abort();
        }
    }
}

/// Result reported by a background persistence task.
pub(crate) struct Completion {
    pub(crate) epoch: u64,
    pub(crate) generation: u64,
    pub(crate) post_id: PostId,
    pub(crate) outcome: Outcome,
}

pub(crate) enum Outcome {
    VotePersisted,
    /// The write failed. Carries the authoritative post from a re-fetch of
    /// the group (`Some(None)` when the store no longer has it), or `None`
    /// when the re-fetch failed as well. `seen` is the snapshot count read
    /// just before the re-fetch started.
    VoteFailed {
        authoritative: Option<Option<Post>>,
        seen: u64,
    },
    Created,
    CreateFailed { error: String },
    Deleted,
    DeleteFailed {
        authoritative: Option<Option<Post>>,
        seen: u64,
    },
}

enum Step {
    Snapshot(Option<Snapshot>),
    Completion(Completion),
}

pub struct PostFeed {
    pub(crate) repo: Repository,
    pub(crate) write_timeout: Duration,
    pub(crate) group_id: Option<GroupId>,
    pub(crate) posts: Vec<Post>,
    pub(crate) subscription: Option<Subscription>,
    /// Bumped on every group switch; completions from an older epoch are
    /// discarded.
    pub(crate) epoch: u64,
    pub(crate) next_generation: u64,
    /// Number of snapshots folded into the list. Shared with persistence
    /// tasks so a re-fetch can be ordered against pushed snapshots.
    pub(crate) snapshots_applied: Arc<AtomicU64>,
    pub(crate) pending: HashMap<PostId, MutationContext>,
    /// Optimistically created posts the store has not acknowledged yet.
    pub(crate) unconfirmed: HashSet<PostId>,
    pub(crate) completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl PostFeed {
    pub fn new(repo: Repository, config: &ClientConfig) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            repo,
            write_timeout: config.write_timeout,
            group_id: None,
            posts: Vec::new(),
            subscription: None,
            epoch: 0,
            next_generation: 0,
            snapshots_applied: Arc::new(AtomicU64::new(0)),
            pending: HashMap::new(),
            unconfirmed: HashSet::new(),
            completions_tx,
            completions_rx,
        }
    }

    /// Open a feed already subscribed to `group`.
    pub async fn open(repo: Repository, config: &ClientConfig, group: GroupId) -> Result<Self> {
        let mut feed = Self::new(repo, config);
        feed.switch_group(group).await?;
        Ok(feed)
    }

    pub fn group_id(&self) -> Option<GroupId> {
        self.group_id
    }

    /// Most recent list, newest first.
    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn post(&self, id: &PostId) -> Option<&Post> {
        self.posts.iter().find(|p| p.id == *id)
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Number of posts with persistence still in flight.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_confirmed(&self, id: &PostId) -> bool {
        !self.unconfirmed.contains(id)
    }

    pub fn leaderboard(&self, metric: LeaderboardMetric) -> Leaderboard {
        Leaderboard::compute(&self.posts, metric)
    }

    /// Point the feed at `group`.
    ///
    /// The previous subscription is released before the new one is opened,
    /// and every in-flight task of the previous group is aborted. On error
    /// the feed is left unsubscribed.
    pub async fn switch_group(&mut self, group: GroupId) -> Result<()> {
        self.teardown();
        self.group_id = Some(group);

        let subscription = self.repo.subscribe_posts(&group).await?;
        info!(
            group = %group,
            subscription = subscription.id(),
            epoch = self.epoch,
            "Feed subscribed"
        );
        self.subscription = Some(subscription);
        Ok(())
    }

    /// Release the subscription and abort in-flight persistence.
    pub fn close(&mut self) {
        if self.subscription.is_some() || !self.pending.is_empty() {
            info!(group = ?self.group_id, "Feed closed");
        }
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
        for (_, ctx) in self.pending.drain() {
            ctx.abort_all();
        }
        self.epoch += 1;
        self.posts.clear();
        self.unconfirmed.clear();
    }

    /// Wait for the next snapshot or background completion and fold it into
    /// the list.
    ///
    /// Returns `None` once there is nothing left to wait for: no live
    /// subscription and no in-flight persistence.
    pub async fn next_event(&mut self) -> Option<FeedEvent> {
        loop {
            let step = match self.subscription.as_mut() {
                Some(subscription) => tokio::select! {
                    snapshot = subscription.next_snapshot() => Step::Snapshot(snapshot),
                    Some(completion) = self.completions_rx.recv() => Step::Completion(completion),
                },
                None => {
                    if self.pending.is_empty() {
                        return None;
                    }
                    match self.completions_rx.recv().await {
                        Some(completion) => Step::Completion(completion),
                        None => return None,
                    }
                }
            };

            let event = match step {
                Step::Snapshot(Some(snapshot)) => self.apply_snapshot(snapshot),
                Step::Snapshot(None) => self.on_subscription_closed(),
                Step::Completion(completion) => self.apply_completion(completion),
            };
            if event.is_some() {
                return event;
            }
        }
    }

    fn apply_snapshot(&mut self, snapshot: Snapshot) -> Option<FeedEvent> {
        let group_id = self.group_id?;
        self.posts = snapshot.decode_all();
        self.snapshots_applied.fetch_add(1, Ordering::SeqCst);
        let posts = &self.posts;
        self.unconfirmed
            .retain(|id| !posts.iter().any(|p| p.id == *id));

        debug!(group = %group_id, count = self.posts.len(), "Snapshot applied");
        Some(FeedEvent::PostsReplaced {
            group_id,
            count: self.posts.len(),
        })
    }

    fn on_subscription_closed(&mut self) -> Option<FeedEvent> {
        self.subscription = None;
        let group_id = self.group_id?;
        warn!(group = %group_id, "Store closed the feed subscription");
        Some(FeedEvent::SubscriptionClosed { group_id })
    }

    fn apply_completion(&mut self, completion: Completion) -> Option<FeedEvent> {
        let Completion {
            epoch,
            generation,
            post_id,
            outcome,
        } = completion;

        if epoch != self.epoch {
            debug!(post = %post_id, epoch, "Discarding completion from previous group");
            return None;
        }
        let Some(ctx) = self.pending.get_mut(&post_id) else {
            debug!(post = %post_id, "Discarding completion for cleared context");
            return None;
        };
        ctx.tasks.retain(|(g, _)| *g != generation);
        if ctx.tasks.is_empty() {
            self.pending.remove(&post_id);
        }

        match outcome {
            Outcome::VotePersisted => Some(FeedEvent::VotePersisted { post_id }),
            Outcome::VoteFailed {
                authoritative,
                seen,
            } => {
                let removed = if self.snapshot_since(seen) {
                    debug!(post = %post_id, "Newer snapshot already applied, dropping re-fetched value");
                    self.post(&post_id).is_none()
                } else {
                    self.reconcile(post_id, authoritative)
                };
                Some(FeedEvent::VoteRolledBack { post_id, removed })
            }
            Outcome::Created => {
                self.unconfirmed.remove(&post_id);
                Some(FeedEvent::PostCreated { post_id })
            }
            Outcome::CreateFailed { error } => {
                self.unconfirmed.remove(&post_id);
                self.posts.retain(|p| p.id != post_id);
                Some(FeedEvent::PostCreateFailed { post_id, error })
            }
            Outcome::Deleted => Some(FeedEvent::PostDeleted { post_id }),
            Outcome::DeleteFailed { seen, .. } if self.snapshot_since(seen) => {
                debug!(post = %post_id, "Newer snapshot already applied after failed delete");
                match self.post(&post_id) {
                    Some(_) => Some(FeedEvent::PostDeleteReverted { post_id }),
                    None => Some(FeedEvent::PostDeleted { post_id }),
                }
            }
            Outcome::DeleteFailed { authoritative, .. } => match authoritative {
                Some(Some(post)) => {
                    self.reinstate(post);
                    Some(FeedEvent::PostDeleteReverted { post_id })
                }
                Some(None) => Some(FeedEvent::PostDeleted { post_id }),
                None => {
                    warn!(post = %post_id, "Delete failed and could not be verified");
                    None
                }
            },
        }
    }

    /// Whether a snapshot was folded in after the count `seen` was read.
    fn snapshot_since(&self, seen: u64) -> bool {
        self.snapshots_applied.load(Ordering::SeqCst) > seen
    }

    /// Move the local entry to the last authoritative read. Returns whether
    /// the post was removed.
    fn reconcile(&mut self, post_id: PostId, authoritative: Option<Option<Post>>) -> bool {
        match authoritative {
            Some(Some(post)) => {
                if let Some(local) = self.posts.iter_mut().find(|p| p.id == post_id) {
                    *local = post;
                }
                false
            }
            Some(None) => {
                self.posts.retain(|p| p.id != post_id);
                true
            }
            None => {
                warn!(post = %post_id, "Rollback re-fetch failed, waiting for next snapshot");
                false
            }
        }
    }

    /// Put `post` back in `createdAt` descending position unless a snapshot
    /// already did.
    fn reinstate(&mut self, post: Post) {
        if self.post(&post.id).is_some() {
            return;
        }
        let at = self
            .posts
            .iter()
            .position(|p| p.created_at < post.created_at)
            .unwrap_or(self.posts.len());
        self.posts.insert(at, post);
    }
}

impl Drop for PostFeed {
    fn drop(&mut self) {
        for (_, ctx) in self.pending.drain() {
            ctx.abort_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rankbait_shared::{MemberId, NewPost};
    use rankbait_store::MemoryStore;

    async fn next(feed: &mut PostFeed) -> FeedEvent {
        tokio::time::timeout(Duration::from_secs(2), feed.next_event())
            .await
            .expect("timed out waiting for feed event")
            .expect("feed ended")
    }

    fn post_in(group: GroupId, subject: &str) -> Post {
        Post::compose(NewPost {
            group_id: group,
            subject_id: MemberId::new(subject),
            author_id: MemberId::new("author"),
            content: format!("about {subject}"),
            image_url: None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_initial_snapshot_fills_list() {
        let store = MemoryStore::new();
        let repo = Repository::new(Arc::new(store.clone()));
        let group = GroupId::new();
        let post = post_in(group, "s1");
        repo.create_post(&post).await.unwrap();
        repo.create_post(&post_in(GroupId::new(), "other")).await.unwrap();

        let mut feed = PostFeed::open(repo, &ClientConfig::default(), group)
            .await
            .unwrap();
        let event = next(&mut feed).await;

        assert_eq!(event, FeedEvent::PostsReplaced { group_id: group, count: 1 });
        assert_eq!(feed.posts(), &[post]);
    }

    #[tokio::test]
    async fn test_remote_write_replaces_list() {
        let store = MemoryStore::new();
        let repo = Repository::new(Arc::new(store.clone()));
        let group = GroupId::new();
        let mut feed = PostFeed::open(repo.clone(), &ClientConfig::default(), group)
            .await
            .unwrap();
        next(&mut feed).await;

        let remote = post_in(group, "s1");
        repo.create_post(&remote).await.unwrap();

        let event = next(&mut feed).await;
        assert_eq!(event, FeedEvent::PostsReplaced { group_id: group, count: 1 });
        assert_eq!(feed.posts()[0].id, remote.id);
    }

    #[tokio::test]
    async fn test_switch_group_keeps_single_subscription() {
        let store = MemoryStore::new();
        let repo = Repository::new(Arc::new(store.clone()));
        let first = GroupId::new();
        let second = GroupId::new();
        repo.create_post(&post_in(first, "a")).await.unwrap();
        let in_second = post_in(second, "b");
        repo.create_post(&in_second).await.unwrap();

        let mut feed = PostFeed::open(repo.clone(), &ClientConfig::default(), first)
            .await
            .unwrap();
        next(&mut feed).await;
        assert_eq!(store.subscription_count(), 1);

        feed.switch_group(second).await.unwrap();
        assert_eq!(store.subscription_count(), 1);
        assert!(feed.posts().is_empty());

        next(&mut feed).await;
        assert_eq!(feed.group_id(), Some(second));
        assert_eq!(feed.posts(), &[in_second]);

        // Writes to the abandoned group never reach the list.
        repo.create_post(&post_in(first, "late")).await.unwrap();
        let event = next(&mut feed).await;
        assert_eq!(event, FeedEvent::PostsReplaced { group_id: second, count: 1 });
        repo.create_post(&post_in(second, "c")).await.unwrap();
        let event = next(&mut feed).await;
        assert_eq!(event, FeedEvent::PostsReplaced { group_id: second, count: 2 });
        assert!(feed.posts().iter().all(|p| p.group_id == second));
    }

    #[tokio::test]
    async fn test_close_releases_subscription() {
        let store = MemoryStore::new();
        let repo = Repository::new(Arc::new(store.clone()));
        let mut feed = PostFeed::open(repo, &ClientConfig::default(), GroupId::new())
            .await
            .unwrap();
        assert_eq!(store.subscription_count(), 1);

        feed.close();
        assert_eq!(store.subscription_count(), 0);
        assert!(!feed.is_subscribed());
        assert!(feed.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_releases_subscription() {
        let store = MemoryStore::new();
        let repo = Repository::new(Arc::new(store.clone()));
        let feed = PostFeed::open(repo, &ClientConfig::default(), GroupId::new())
            .await
            .unwrap();
        assert_eq!(store.subscription_count(), 1);
        drop(feed);
        assert_eq!(store.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_failure_leaves_feed_unsubscribed() {
        let store = MemoryStore::new();
        store.go_offline();
        let repo = Repository::new(Arc::new(store.clone()));
        let mut feed = PostFeed::new(repo, &ClientConfig::default());

        assert!(feed.switch_group(GroupId::new()).await.is_err());
        assert!(!feed.is_subscribed());
    }

    #[tokio::test]
    async fn test_leaderboard_follows_list() {
        let store = MemoryStore::new();
        let repo = Repository::new(Arc::new(store.clone()));
        let group = GroupId::new();
        let mut baited = post_in(group, "bait");
        baited.downvotes = 3;
        repo.create_post(&baited).await.unwrap();
        repo.create_post(&post_in(group, "fine")).await.unwrap();

        let mut feed = PostFeed::open(repo, &ClientConfig::default(), group)
            .await
            .unwrap();
        next(&mut feed).await;

        let board = feed.leaderboard(LeaderboardMetric::NetScore);
        assert_eq!(board.standings[0].subject_id, MemberId::new("bait"));
        assert_eq!(board.standings[0].value, -3);
    }
}
