use std::sync::Arc;

use chat_backend::{AuthToken, BackendError, Profile, ProfileUpdate};
use tracing::{info, warn};

use crate::navigation::Navigator;

/// Reads and edits the signed-in account's profile.
///
/// Failures are classified like the sync engine's: `401` takes the forced
/// logout path, validation errors carry the backend's field messages.
#[derive(Debug, Clone)]
pub struct ProfileService {
    navigator: Arc<Navigator>,
}

impl ProfileService {
    #[must_use]
    pub fn new(navigator: Arc<Navigator>) -> Self {
        Self { navigator }
    }

    pub async fn fetch(&self) -> Result<Profile, BackendError> {
        let token = self.token()?;
        let result = self.navigator.session().backend().get_profile(&token).await;
        self.settle(result)
    }

    /// Sends only the fields that are `Some`.
    pub async fn update(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Profile, BackendError> {
        let mut update = ProfileUpdate::default();
        if let Some(username) = username {
            update = update.with_username(username);
        }
        if let Some(email) = email {
            update = update.with_email(email);
        }

        let token = self.token()?;
        let result = self
            .navigator
            .session()
            .backend()
            .update_profile(&token, &update)
            .await;
        let profile = self.settle(result)?;
        info!(username = %profile.username, "profile updated");
        Ok(profile)
    }

    fn token(&self) -> Result<AuthToken, BackendError> {
        self.navigator.session().token().ok_or_else(|| {
            self.navigator.force_logout();
            BackendError::unauthorized("not authenticated")
        })
    }

    fn settle(&self, result: Result<Profile, BackendError>) -> Result<Profile, BackendError> {
        match result {
            Err(error) if error.is_unauthorized() => {
                self.navigator.force_logout();
                Err(error)
            }
            Err(error @ BackendError::Network { .. }) => {
                warn!(%error, "profile request failed");
                Err(error)
            }
            other => other,
        }
    }
}
