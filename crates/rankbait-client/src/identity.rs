//! Identity provider boundary.
//!
//! The engine only ever reads the signed-in account id; sign-in, tokens and
//! sessions belong to the provider.

use tokio::sync::watch;

use rankbait_shared::MemberId;

use crate::error::{ClientError, Result};

pub trait IdentityProvider: Send + Sync {
    /// Account id of the signed-in user, if any.
    fn current_account_id(&self) -> Option<MemberId>;

    /// Notification channel that changes whenever the user signs in or out.
    fn changes(&self) -> watch::Receiver<Option<MemberId>>;

    fn require_account_id(&self) -> Result<MemberId> {
        self.current_account_id().ok_or(ClientError::NotSignedIn)
    }
}

/// In-process identity holder fed by whatever authentication layer the
/// host application uses.
#[derive(Debug)]
pub struct SessionIdentity {
    tx: watch::Sender<Option<MemberId>>,
}

impl SessionIdentity {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn signed_in(account: MemberId) -> Self {
        let identity = Self::new();
        identity.sign_in(account);
        identity
    }

    pub fn sign_in(&self, account: MemberId) {
        tracing::info!(account = %account.short(), "Account signed in");
        self.tx.send_replace(Some(account));
    }

    pub fn sign_out(&self) {
        tracing::info!("Account signed out");
        self.tx.send_replace(None);
    }
}

impl Default for SessionIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_account_id(&self) -> Option<MemberId> {
        self.tx.borrow().clone()
    }

    fn changes(&self) -> watch::Receiver<Option<MemberId>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_in_out_notifies() {
        let identity = SessionIdentity::new();
        let mut changes = identity.changes();
        assert!(matches!(
            identity.require_account_id(),
            Err(ClientError::NotSignedIn)
        ));

        identity.sign_in(MemberId::new("uid-1"));
        changes.changed().await.unwrap();
        assert_eq!(*changes.borrow(), Some(MemberId::new("uid-1")));
        assert_eq!(identity.require_account_id().unwrap(), MemberId::new("uid-1"));

        identity.sign_out();
        changes.changed().await.unwrap();
        assert_eq!(*changes.borrow(), None);
    }
}
