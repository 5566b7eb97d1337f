use std::time::Duration;

use thiserror::Error;

use rankbait_shared::{GroupId, ValidationError};
use rankbait_store::StoreError;

/// Failures surfaced to the presentation layer.
///
/// Vote persistence never produces one of these: failed votes are rolled
/// back to the authoritative value and only logged.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("No account is signed in")]
    NotSignedIn,

    #[error("No group is selected")]
    NoGroupSelected,

    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("No group uses invite code {0}")]
    InviteCodeNotFound(String),

    #[error("Could not find an unused invite code after {0} attempts")]
    InviteCodeExhausted(usize),

    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
