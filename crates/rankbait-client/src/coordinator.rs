//! Optimistic mutation coordinator.
//!
//! Votes, post creation and deletion are applied to the feed synchronously
//! and persisted on spawned tasks. Each task is bounded by the configured
//! write timeout and reports a [`Completion`] that the feed folds in from
//! `next_event`. A failed vote or delete re-fetches the group's posts and
//! moves the local entry to whatever the store returned.

use std::future::Future;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use rankbait_shared::{GroupId, MemberId, NewPost, Post, PostId, VoteAction, VoteTransition};

use crate::error::{ClientError, Result};
use crate::feed::{Completion, Outcome, PostFeed};
use crate::repository::Repository;

/// Handle on an optimistic post creation.
#[derive(Debug)]
pub struct PendingWrite {
    post_id: PostId,
    rx: oneshot::Receiver<Result<Post>>,
}

impl PendingWrite {
    pub fn post_id(&self) -> PostId {
        self.post_id
    }

    /// Wait for the store to acknowledge the write.
    ///
    /// Yields [`ClientError::Cancelled`] when the feed dropped the write
    /// first (group switch, close, or delete of the same post).
    pub async fn wait(self) -> Result<Post> {
        self.rx.await.unwrap_or(Err(ClientError::Cancelled))
    }
}

/// Run a store call under `limit`; an elapsed limit is a timeout error.
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = rankbait_store::Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(ClientError::Timeout(limit)),
    }
}

/// Authoritative copy of `post_id` from a fresh read of the group.
/// `None` when the read itself failed.
async fn refetch(
    repo: &Repository,
    limit: Duration,
    group: &GroupId,
    post_id: PostId,
) -> Option<Option<Post>> {
    match bounded(limit, repo.fetch_posts(group)).await {
        Ok(posts) => Some(posts.into_iter().find(|p| p.id == post_id)),
        Err(e) => {
            warn!(post = %post_id, error = %e, "Re-fetch after failed write failed");
            None
        }
    }
}

impl PostFeed {
    /// Apply `action` by `voter` to the local post and persist it in the
    /// background.
    ///
    /// Returns the applied transition, or `None` when the post is not in the
    /// list (or not yet confirmed by the store) and nothing was done.
    pub fn apply_vote(
        &mut self,
        post_id: &PostId,
        voter: &MemberId,
        action: VoteAction,
    ) -> Option<VoteTransition> {
        if self.unconfirmed.contains(post_id) {
            error!(post = %post_id, voter = %voter.short(), "Vote on a post the store has not confirmed");
            return None;
        }
        let Some(post) = self.posts.iter_mut().find(|p| p.id == *post_id) else {
            debug!(post = %post_id, "Vote on a post no longer in the feed");
            return None;
        };

        let transition = post.apply_vote(voter, action);
        let optimistic = post.clone();
        debug!(
            post = %post_id,
            voter = %voter.short(),
            ?action,
            intent = ?transition.intent,
            upvotes = optimistic.upvotes,
            downvotes = optimistic.downvotes,
            "Vote applied locally"
        );

        let repo = self.repo.clone();
        let limit = self.write_timeout;
        let snapshots = self.snapshots_applied.clone();
        let post_id = *post_id;
        self.track(post_id, async move {
            match bounded(limit, repo.update_votes(&optimistic)).await {
                Ok(()) => Outcome::VotePersisted,
                Err(e) => {
                    warn!(post = %post_id, error = %e, "Vote write failed, rolling back");
                    let seen = snapshots.load(Ordering::SeqCst);
                    let authoritative =
                        refetch(&repo, limit, &optimistic.group_id, post_id).await;
                    Outcome::VoteFailed {
                        authoritative,
                        seen,
                    }
                }
            }
        });

        Some(transition)
    }

    /// Compose a post, insert it at the head of the list and persist it in
    /// the background.
    pub fn create_post(&mut self, new: NewPost) -> Result<PendingWrite> {
        let post = Post::compose(new)?;
        let post_id = post.id;

        if self.group_id == Some(post.group_id) {
            self.posts.insert(0, post.clone());
            self.unconfirmed.insert(post_id);
        } else {
            debug!(post = %post_id, group = %post.group_id, "Creating post outside the viewed group");
        }

        let (tx, rx) = oneshot::channel();
        let repo = self.repo.clone();
        let limit = self.write_timeout;
        self.track(post_id, async move {
            match bounded(limit, repo.create_post(&post)).await {
                Ok(()) => {
                    info!(post = %post_id, group = %post.group_id, "Post created");
                    let _ = tx.send(Ok(post));
                    Outcome::Created
                }
                Err(e) => {
                    warn!(post = %post_id, error = %e, "Post creation failed");
                    let error = e.to_string();
                    let _ = tx.send(Err(e));
                    Outcome::CreateFailed { error }
                }
            }
        });

        Ok(PendingWrite { post_id, rx })
    }

    /// Remove a post locally and delete it in the background.
    ///
    /// Any vote still in flight for the post is dropped. Returns whether the
    /// post was in the list.
    pub fn delete_post(&mut self, post_id: &PostId) -> bool {
        let Some(index) = self.posts.iter().position(|p| p.id == *post_id) else {
            return false;
        };
        let removed = self.posts.remove(index);
        if let Some(ctx) = self.pending.remove(post_id) {
            debug!(post = %post_id, tasks = ctx.tasks.len(), "Clearing in-flight mutations");
            for (_, task) in &ctx.tasks {
                task.abort();
            }
        }
        self.unconfirmed.remove(post_id);

        let repo = self.repo.clone();
        let limit = self.write_timeout;
        let snapshots = self.snapshots_applied.clone();
        let post_id = *post_id;
        self.track(post_id, async move {
            match bounded(limit, repo.delete_post(&post_id)).await {
                Ok(()) => {
                    info!(post = %post_id, "Post deleted");
                    Outcome::Deleted
                }
                Err(e) => {
                    warn!(post = %post_id, error = %e, "Post delete failed, restoring");
                    let seen = snapshots.load(Ordering::SeqCst);
                    let authoritative = refetch(&repo, limit, &removed.group_id, post_id).await;
                    Outcome::DeleteFailed {
                        authoritative,
                        seen,
                    }
                }
            }
        });

        true
    }

    /// Spawn `work` and register it in the post's mutation context.
    fn track<F>(&mut self, post_id: PostId, work: F)
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        let generation = self.next_generation;
        self.next_generation += 1;
        let epoch = self.epoch;
        let tx = self.completions_tx.clone();

        let task = tokio::spawn(async move {
            let outcome = work.await;
            let _ = tx.send(Completion {
                epoch,
                generation,
                post_id,
                outcome,
            });
        });

        self.pending
            .entry(post_id)
            .or_default()
            .tasks
            .push((generation, task));
    }
}
