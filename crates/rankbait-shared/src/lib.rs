//! # rankbait-shared
//!
//! Identifiers, domain models and the pure logic shared by every RankBait
//! crate: the vote state machine, invite-code generation and the leaderboard
//! fold. Nothing in here performs I/O.

pub mod constants;
pub mod error;
pub mod invite;
pub mod leaderboard;
pub mod models;
pub mod types;
pub mod vote;

pub use error::ValidationError;
pub use invite::InviteCode;
pub use leaderboard::{Leaderboard, LeaderboardMetric, Standing};
pub use models::{Group, NewPost, Post, UserProfile};
pub use types::{GroupId, MemberId, PostId};
pub use vote::{next_vote_state, Vote, VoteAction, VoteIntent, VoteTransition};
