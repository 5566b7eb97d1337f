//! Leaderboard aggregation.
//!
//! A stateless fold over the current post list. It is recomputed from the
//! reconciled feed whenever the presentation layer needs it.

use std::collections::{BTreeMap, HashMap};

use crate::constants::FALLBACK_NICKNAME;
use crate::models::Post;
use crate::types::MemberId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LeaderboardMetric {
    /// Sum of post scores; lowest first, so the most baited member leads.
    #[default]
    NetScore,
    MostUpvotes,
    MostDownvotes,
}

impl LeaderboardMetric {
    pub const ALL: [LeaderboardMetric; 3] = [
        LeaderboardMetric::NetScore,
        LeaderboardMetric::MostUpvotes,
        LeaderboardMetric::MostDownvotes,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::NetScore => "Net Score",
            Self::MostUpvotes => "Upvotes",
            Self::MostDownvotes => "Downvotes",
        }
    }

    fn value_of(self, post: &Post) -> i64 {
        match self {
            Self::NetScore => post.score(),
            Self::MostUpvotes => i64::from(post.upvotes),
            Self::MostDownvotes => i64::from(post.downvotes),
        }
    }
}

/// One row of the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standing {
    pub subject_id: MemberId,
    pub value: i64,
    pub post_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Leaderboard {
    pub metric: LeaderboardMetric,
    pub standings: Vec<Standing>,
}

impl Leaderboard {
    pub fn compute(posts: &[Post], metric: LeaderboardMetric) -> Self {
        let mut totals: BTreeMap<&MemberId, (i64, usize)> = BTreeMap::new();
        for post in posts {
            let entry = totals.entry(&post.subject_id).or_insert((0, 0));
            entry.0 += metric.value_of(post);
            entry.1 += 1;
        }

        let mut standings: Vec<Standing> = totals
            .into_iter()
            .map(|(subject_id, (value, post_count))| Standing {
                subject_id: subject_id.clone(),
                value,
                post_count,
            })
            .collect();

        // BTreeMap iteration already orders by subject, so a stable sort
        // keeps ties deterministic.
        match metric {
            LeaderboardMetric::NetScore => standings.sort_by_key(|s| s.value),
            LeaderboardMetric::MostUpvotes | LeaderboardMetric::MostDownvotes => {
                standings.sort_by(|a, b| b.value.cmp(&a.value))
            }
        }

        Self { metric, standings }
    }

    pub fn is_empty(&self) -> bool {
        self.standings.is_empty()
    }

    /// Pair each standing with a display name, falling back to a generic
    /// name for members without a nickname.
    pub fn with_names<'a>(
        &'a self,
        nicknames: &'a HashMap<MemberId, String>,
    ) -> impl Iterator<Item = (&'a str, &'a Standing)> + 'a {
        self.standings.iter().map(move |s| {
            let name = nicknames
                .get(&s.subject_id)
                .map(String::as_str)
                .unwrap_or(FALLBACK_NICKNAME);
            (name, s)
        })
    }
}
