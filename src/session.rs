use crate::backend::traits::AuthProvider;
use crate::backend::types::AuthUser;
use crate::error::MarketError;
use crate::models::Listing;
use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Identity of the signed-in user, passed to operations that need it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user: AuthUser,
}

impl Session {
    pub fn new(user: AuthUser) -> Self {
        Self { user }
    }

    /// Capture the provider's current user, failing when nobody is signed in
    pub fn from_auth(auth: &dyn AuthProvider) -> Result<Self, MarketError> {
        auth.current_user()
            .map(Self::new)
            .ok_or(MarketError::Unauthenticated)
    }

    pub fn user(&self) -> &AuthUser {
        &self.user
    }

    pub fn uid(&self) -> &str {
        &self.user.uid
    }

    pub fn display_name(&self) -> Option<&str> {
        self.user.display_name.as_deref()
    }

    pub fn owns(&self, listing: &Listing) -> bool {
        listing.owner_ref == self.user.uid
    }

    pub(crate) fn set_display_name(&mut self, name: &str) {
        self.user.display_name = Some(name.to_string());
    }
}

/// Auth state derived from the provider's event stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthStatus {
    pub logged_in: bool,
    /// True until the first auth event arrives
    pub checking_status: bool,
}

impl Default for AuthStatus {
    fn default() -> Self {
        Self {
            logged_in: false,
            checking_status: true,
        }
    }
}

impl AuthStatus {
    pub fn observe(self, user: Option<&AuthUser>) -> Self {
        Self {
            logged_in: user.is_some(),
            checking_status: false,
        }
    }
}

/// Subscribe to auth events and expose the derived status.
///
/// The subscription lives until `mounted` is cancelled, the receiver is
/// dropped, or the provider closes its stream. Must be called from within a
/// tokio runtime.
pub fn watch_auth_status(
    auth: &dyn AuthProvider,
    mounted: CancellationToken,
) -> watch::Receiver<AuthStatus> {
    let mut events = auth.auth_events();
    let (tx, rx) = watch::channel(AuthStatus::default());

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = mounted.cancelled() => break,
                _ = tx.closed() => break,
                event = events.next() => match event {
                    Some(user) => {
                        tx.send_modify(|status| *status = status.observe(user.as_ref()));
                    }
                    None => break,
                },
            }
        }
        debug!("Auth status subscription ended");
    });

    rx
}
