use thiserror::Error;

/// Input rejected before it reaches the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Post content is empty")]
    EmptyContent,

    #[error("Group name is empty")]
    EmptyGroupName,

    #[error("Nickname is empty")]
    EmptyNickname,

    #[error("Member id is empty")]
    EmptyMemberId,

    #[error("Invalid invite code: {0}")]
    InvalidInviteCode(String),
}
