//! RankBait client engine.
//!
//! Optimistic votes and posts over a live-reconciled group feed, group
//! admission by invite code, member profiles and device preferences. The
//! remote store, identity provider, object storage and local settings store
//! are all injected.

pub mod admission;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod feed;
pub mod identity;
pub mod preferences;
pub mod profile;
pub mod repository;
pub mod state;
pub mod upload;

use tracing_subscriber::{fmt, EnvFilter};

pub use admission::{Admission, GroupWatch, JoinAttempt, JoinState};
pub use config::ClientConfig;
pub use coordinator::PendingWrite;
pub use error::{ClientError, Result};
pub use events::FeedEvent;
pub use feed::PostFeed;
pub use identity::{IdentityProvider, SessionIdentity};
pub use preferences::Preferences;
pub use profile::{MemberStats, Profiles};
pub use repository::Repository;
pub use state::{AppState, ImageUpload};
pub use upload::{CloudinaryStorage, ObjectStorage};

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set. Calling this more than once is harmless.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rankbait_client=debug,rankbait_store=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();

    tracing::info!(app = rankbait_shared::constants::APP_NAME, "Logging initialised");
}
