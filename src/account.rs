use crate::backend::traits::{AuthProvider, DocumentStore};
use crate::backend::types::Record;
use crate::backend::Backend;
use crate::config::Config;
use crate::error::MarketError;
use crate::models::User;
use crate::notify::Notifier;
use crate::session::Session;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
struct UserRecord<'a> {
    name: &'a str,
    email: &'a str,
}

/// Registration, sign-in and profile operations
pub struct Accounts {
    store: Arc<dyn DocumentStore>,
    auth: Arc<dyn AuthProvider>,
    users_collection: String,
    notifier: Option<Notifier>,
}

impl Accounts {
    pub fn new(backend: &Backend, config: &Config) -> Self {
        Self {
            store: Arc::clone(&backend.store),
            auth: Arc::clone(&backend.auth),
            users_collection: config.users_collection.clone(),
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Register credentials and write the user's profile document
    pub async fn sign_up(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<Session, MarketError> {
        self.auth.sign_up(email, password).await?;
        let user = self.auth.update_profile(name).await?;
        self.write_user(&user.uid, name, email).await?;

        info!(uid = %user.uid, "Registered user");
        Ok(Session::new(user))
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, MarketError> {
        let user = self.auth.sign_in(email, password).await?;
        Ok(Session::new(user))
    }

    /// Federated sign-in; the profile document is written on first login only
    pub async fn sign_in_with_provider(&self) -> Result<Session, MarketError> {
        let user = self.auth.sign_in_with_provider().await?;

        let existing = self
            .store
            .get(&self.users_collection, &user.uid)
            .await
            .map_err(MarketError::Store)?;
        if existing.is_none() {
            let name = user.display_name.clone().unwrap_or_default();
            self.write_user(&user.uid, &name, &user.email).await?;
            info!(uid = %user.uid, "Created profile for provider sign-in");
        }

        Ok(Session::new(user))
    }

    pub async fn sign_out(&self) -> Result<(), MarketError> {
        self.auth.sign_out().await?;
        Ok(())
    }

    pub async fn send_password_reset(&self, email: &str) -> Result<(), MarketError> {
        self.auth.send_password_reset(email).await?;
        debug!("Password reset email requested");
        Ok(())
    }

    /// Rename the user in both the auth profile and the users collection.
    ///
    /// Returns `false` when the name is unchanged and nothing was written.
    pub async fn update_display_name(
        &self,
        session: &mut Session,
        name: &str,
    ) -> Result<bool, MarketError> {
        if session.display_name() == Some(name) {
            return Ok(false);
        }

        if let Err(err) = self.rename(session.uid(), name).await {
            warn!(uid = %session.uid(), error = %err, "Profile update failed");
            if let Some(notifier) = &self.notifier {
                notifier.error("Could not update profile details");
            }
            return Err(err);
        }

        session.set_display_name(name);
        Ok(true)
    }

    async fn rename(&self, uid: &str, name: &str) -> Result<(), MarketError> {
        self.auth.update_profile(name).await?;
        let mut patch = Record::new();
        patch.set("name", name);
        self.store
            .update(&self.users_collection, uid, patch)
            .await
            .map_err(MarketError::Persistence)
    }

    pub async fn fetch_user(&self, uid: &str) -> Result<User, MarketError> {
        let doc = self
            .store
            .get(&self.users_collection, uid)
            .await
            .map_err(MarketError::Store)?
            .ok_or_else(|| MarketError::not_found("user", uid))?;
        User::from_document(&doc).map_err(MarketError::Store)
    }

    async fn write_user(&self, uid: &str, name: &str, email: &str) -> Result<(), MarketError> {
        let record = Record::from_serialize(&UserRecord { name, email })
            .map_err(MarketError::Persistence)?
            .with_server_timestamp();
        self.store
            .set(&self.users_collection, uid, record)
            .await
            .map_err(MarketError::Persistence)
    }
}
