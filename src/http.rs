//! Generic JSON-over-HTTP reservation backend.
//!
//! `POST {base_url}/login` with `{username, password}` answers `{ok, detail}`.
//! `POST {base_url}/reserve` with the task answers `{ok}`. Each account gets
//! its own client and cookie jar; a client is safe to share between tasks.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{LoginResponse, ReservationBackend, SubmitRequest};
use crate::config::BackendConfig;

pub struct HttpBackend {
    config: BackendConfig,
    login_timeout: Duration,
    submit_timeout: Duration,
}

/// An authenticated account: a client carrying the login cookies.
pub struct HttpSession {
    client: reqwest::Client,
    username: String,
}

impl HttpSession {
    pub fn username(&self) -> &str {
        &self.username
    }
}

#[derive(Serialize)]
struct LoginBody<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginReply {
    ok: bool,
    #[serde(default)]
    detail: String,
}

#[derive(Serialize)]
struct ReserveBody<'a> {
    time: &'a str,
    roomid: &'a str,
    seatid: &'a str,
    unattended: bool,
    slider: bool,
    next_day: bool,
}

#[derive(Deserialize)]
struct ReserveReply {
    ok: bool,
}

impl HttpBackend {
    /// Login and reserve requests carry their own per-request timeouts.
    pub fn new(config: BackendConfig, login_timeout: Duration, submit_timeout: Duration) -> Self {
        Self {
            config,
            login_timeout,
            submit_timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")
    }

    async fn post_reserve(&self, session: &HttpSession, body: &ReserveBody<'_>) -> Result<bool> {
        let response = session
            .client
            .post(self.url("reserve"))
            .timeout(self.submit_timeout)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("HTTP {} from reserve endpoint", response.status());
        }

        let reply: ReserveReply = response.json().await?;
        Ok(reply.ok)
    }
}

#[async_trait]
impl ReservationBackend for HttpBackend {
    type Session = HttpSession;

    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse<HttpSession>> {
        let client = self.client()?;

        debug!("Posting login for {}", username);
        let response = client
            .post(self.url("login"))
            .timeout(self.login_timeout)
            .json(&LoginBody { username, password })
            .send()
            .await
            .context("Login request failed")?;

        if !response.status().is_success() {
            bail!("HTTP {} from login endpoint", response.status());
        }

        let reply: LoginReply = response.json().await.context("Malformed login reply")?;
        if !reply.ok {
            return Ok(LoginResponse::Rejected(reply.detail));
        }

        Ok(LoginResponse::Accepted(HttpSession {
            client,
            username: username.to_string(),
        }))
    }

    async fn submit(&self, session: &HttpSession, request: SubmitRequest<'_>) -> Result<bool> {
        let body = ReserveBody {
            time: request.time_label,
            roomid: request.room_id,
            seatid: request.seat_id,
            unattended: request.unattended,
            slider: self.config.enable_slider,
            next_day: self.config.reserve_next_day,
        };

        let attempts = self.config.max_attempt.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.post_reserve(session, &body).await {
                Ok(ok) => return Ok(ok),
                Err(e) => {
                    warn!(
                        "Reserve request for {} failed (attempt {}/{}): {:#}",
                        session.username, attempt, attempts, e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("No reserve attempt made"))
            .context(format!("Reserve failed after {} attempts", attempts)))
    }
}
