//! Single-account authentication.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::{LoginResponse, ReservationBackend};
use crate::error::AuthError;

/// Turns one credential pair into a ready session, or an [`AuthError`].
///
/// Nothing the backend does escapes as anything other than an `AuthError`,
/// so sibling logins running in parallel are never affected.
pub struct SessionAuthenticator<B> {
    backend: Arc<B>,
    timeout: Duration,
}

impl<B> Clone for SessionAuthenticator<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            timeout: self.timeout,
        }
    }
}

impl<B: ReservationBackend> SessionAuthenticator<B> {
    pub fn new(backend: Arc<B>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<B::Session, AuthError> {
        match tokio::time::timeout(self.timeout, self.backend.login(username, password)).await {
            Err(_) => Err(AuthError::TimedOut(self.timeout)),
            Ok(Err(e)) => Err(AuthError::Transport(format!("{:#}", e))),
            Ok(Ok(LoginResponse::Rejected(detail))) => Err(AuthError::Rejected(detail)),
            Ok(Ok(LoginResponse::Accepted(session))) => Ok(session),
        }
    }
}
