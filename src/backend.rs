//! The seam to the reservation website.
//!
//! Everything protocol-specific (credential submission, captcha handling,
//! request signing, cookie management) lives behind [`ReservationBackend`].
//! The scheduler only sees sessions and success/failure.

use async_trait::async_trait;

/// Answer of the login endpoint.
#[derive(Debug)]
pub enum LoginResponse<S> {
    /// Authenticated; the session is ready for submissions.
    Accepted(S),
    /// The endpoint refused the credentials.
    Rejected(String),
}

/// One reservation request as handed to the backend.
#[derive(Debug, Clone, Copy)]
pub struct SubmitRequest<'a> {
    pub time_label: &'a str,
    pub room_id: &'a str,
    pub seat_id: &'a str,
    /// Running without an operator (credentials from the environment).
    pub unattended: bool,
}

/// External login and submission operations.
///
/// `login` performs any pre/post setup (status probing, header
/// normalisation) before returning an accepted session. When the scheduler
/// dispatches with [`Dispatch::PerTask`](crate::Dispatch::PerTask), `submit`
/// may be called concurrently for one session, so `Session` must tolerate
/// concurrent use in that mode.
#[async_trait]
pub trait ReservationBackend: Send + Sync + 'static {
    type Session: Send + Sync + 'static;

    async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> anyhow::Result<LoginResponse<Self::Session>>;

    /// Returns `Ok(true)` when the seat was reserved.
    async fn submit(
        &self,
        session: &Self::Session,
        request: SubmitRequest<'_>,
    ) -> anyhow::Result<bool>;
}
