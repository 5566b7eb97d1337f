//! Three-state vote toggle.
//!
//! A voter holds one of `none`, `up` or `down` on each post. Tapping the
//! same arrow again withdraws the vote; tapping the opposite arrow flips it
//! and corrects both counters in a single step.

use serde::{Deserialize, Serialize};

/// A persisted vote, as stored in a post's `votes` map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Up,
    Down,
}

/// What a voter currently holds on a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VoteIntent {
    #[default]
    None,
    Up,
    Down,
}

impl VoteIntent {
    pub fn from_vote(vote: Option<Vote>) -> Self {
        match vote {
            None => Self::None,
            Some(Vote::Up) => Self::Up,
            Some(Vote::Down) => Self::Down,
        }
    }

    /// The map entry this intent is stored as (`None` removes the entry).
    pub fn as_vote(self) -> Option<Vote> {
        match self {
            Self::None => None,
            Self::Up => Some(Vote::Up),
            Self::Down => Some(Vote::Down),
        }
    }
}

/// A tap on one of the two arrows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteAction {
    Upvote,
    Downvote,
}

/// Result of applying an action: the new intent and the counter corrections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTransition {
    pub intent: VoteIntent,
    pub delta_up: i32,
    pub delta_down: i32,
}

/// Compute the next vote state.
pub fn next_vote_state(current: VoteIntent, action: VoteAction) -> VoteTransition {
    let (intent, delta_up, delta_down) = match (current, action) {
        (VoteIntent::None, VoteAction::Upvote) => (VoteIntent::Up, 1, 0),
        (VoteIntent::None, VoteAction::Downvote) => (VoteIntent::Down, 0, 1),
        (VoteIntent::Up, VoteAction::Upvote) => (VoteIntent::None, -1, 0),
        (VoteIntent::Up, VoteAction::Downvote) => (VoteIntent::Down, -1, 1),
        (VoteIntent::Down, VoteAction::Downvote) => (VoteIntent::None, 0, -1),
        (VoteIntent::Down, VoteAction::Upvote) => (VoteIntent::Up, 1, -1),
    };

    VoteTransition {
        intent,
        delta_up,
        delta_down,
    }
}
