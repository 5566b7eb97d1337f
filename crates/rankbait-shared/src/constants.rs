/// Application name
pub const APP_NAME: &str = "RankBait";

/// Remote collection holding post documents
pub const POSTS_COLLECTION: &str = "posts";

/// Remote collection holding group documents
pub const GROUPS_COLLECTION: &str = "groups";

/// Remote collection holding user profile documents
pub const USERS_COLLECTION: &str = "users";

/// Invite code alphabet: A-Z and 2-9 without I, O, 0 and 1
pub const INVITE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Number of symbols in an invite code
pub const INVITE_CODE_LEN: usize = 6;

/// Display name used when a member never set a nickname for a group
pub const FALLBACK_NICKNAME: &str = "User";
