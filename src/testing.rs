//! Scripted in-memory backend for exercising the scheduler without a network.

#![cfg(test)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::backend::{LoginResponse, ReservationBackend, SubmitRequest};

#[derive(Debug, Clone, Copy)]
pub enum LoginScript {
    Accept,
    Reject(&'static str),
    Fail(&'static str),
    Panic,
    Hang,
}

#[derive(Debug, Clone, Copy)]
pub enum SeatScript {
    /// Succeeds on the k-th submission for this seat (1-based), and after.
    SucceedOn(u32),
    Never,
    Error(&'static str),
    Panic,
}

/// Session handed out by [`ScriptedBackend`]; tracks concurrent use.
#[derive(Debug)]
pub struct ScriptedSession {
    pub username: String,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitCall {
    pub username: String,
    pub seat_id: String,
    pub unattended: bool,
}

#[derive(Default)]
pub struct ScriptedBackend {
    logins: HashMap<String, LoginScript>,
    seats: HashMap<String, SeatScript>,
    submit_delay: Duration,
    seat_calls: Mutex<HashMap<String, u32>>,
    pub login_calls: Mutex<Vec<String>>,
    pub submit_calls: Mutex<Vec<SubmitCall>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_login(mut self, username: &str, script: LoginScript) -> Self {
        self.logins.insert(username.to_string(), script);
        self
    }

    pub fn with_seat(mut self, seat_id: &str, script: SeatScript) -> Self {
        self.seats.insert(seat_id.to_string(), script);
        self
    }

    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = delay;
        self
    }

    pub fn login_calls(&self) -> Vec<String> {
        self.login_calls.lock().unwrap().clone()
    }

    pub fn submit_calls(&self) -> Vec<SubmitCall> {
        self.submit_calls.lock().unwrap().clone()
    }

    pub fn submits_for(&self, username: &str) -> usize {
        self.submit_calls()
            .iter()
            .filter(|c| c.username == username)
            .count()
    }
}

#[async_trait]
impl ReservationBackend for ScriptedBackend {
    type Session = ScriptedSession;

    async fn login(
        &self,
        username: &str,
        _password: &str,
    ) -> anyhow::Result<LoginResponse<ScriptedSession>> {
        self.login_calls.lock().unwrap().push(username.to_string());

        match self.logins.get(username).copied() {
            Some(LoginScript::Accept) => Ok(LoginResponse::Accepted(ScriptedSession {
                username: username.to_string(),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })),
            Some(LoginScript::Reject(detail)) => Ok(LoginResponse::Rejected(detail.to_string())),
            Some(LoginScript::Fail(detail)) => Err(anyhow!(detail)),
            Some(LoginScript::Panic) => panic!("login backend exploded"),
            Some(LoginScript::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            None => Ok(LoginResponse::Rejected("unknown user".to_string())),
        }
    }

    async fn submit(
        &self,
        session: &ScriptedSession,
        request: SubmitRequest<'_>,
    ) -> anyhow::Result<bool> {
        let concurrent = session.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        session.max_in_flight.fetch_max(concurrent, Ordering::SeqCst);

        self.submit_calls.lock().unwrap().push(SubmitCall {
            username: session.username.clone(),
            seat_id: request.seat_id.to_string(),
            unattended: request.unattended,
        });

        let attempt = {
            let mut calls = self.seat_calls.lock().unwrap();
            let count = calls.entry(request.seat_id.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        if !self.submit_delay.is_zero() {
            tokio::time::sleep(self.submit_delay).await;
        }
        session.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self
            .seats
            .get(request.seat_id)
            .copied()
            .unwrap_or(SeatScript::SucceedOn(1))
        {
            SeatScript::SucceedOn(k) => Ok(attempt >= k),
            SeatScript::Never => Ok(false),
            SeatScript::Error(detail) => Err(anyhow!(detail)),
            SeatScript::Panic => panic!("submit backend exploded"),
        }
    }
}
