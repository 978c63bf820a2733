//! One (account, task) reservation attempt.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Weekday;
use tracing::{info, warn};

use crate::backend::{ReservationBackend, SubmitRequest};
use crate::config::TaskConfig;
use crate::error::SubmissionError;
use crate::filter::is_active_today;

/// What happened to one task in one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Not scheduled today; counts as satisfied.
    Skipped,
    Reserved,
    Failed(SubmissionError),
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skipped => write!(f, "skipped"),
            Self::Reserved => write!(f, "reserved"),
            Self::Failed(e) => write!(f, "failed ({})", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub account_id: String,
    pub time_label: String,
    pub seat_id: String,
    pub status: TaskStatus,
}

impl TaskOutcome {
    pub fn new(account_id: &str, task: &TaskConfig, status: TaskStatus) -> Self {
        Self {
            account_id: account_id.to_string(),
            time_label: task.time_label.clone(),
            seat_id: task.seat_id.clone(),
            status,
        }
    }

    pub fn satisfied(&self) -> bool {
        matches!(self.status, TaskStatus::Skipped | TaskStatus::Reserved)
    }
}

/// Runs single reservation attempts against the backend.
pub struct ReservationWorker<B> {
    backend: Arc<B>,
    submit_timeout: Duration,
    unattended: bool,
}

impl<B> Clone for ReservationWorker<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            submit_timeout: self.submit_timeout,
            unattended: self.unattended,
        }
    }
}

impl<B: ReservationBackend> ReservationWorker<B> {
    pub fn new(backend: Arc<B>, submit_timeout: Duration, unattended: bool) -> Self {
        Self {
            backend,
            submit_timeout,
            unattended,
        }
    }

    /// Attempt `task` for `account_id` once. Never fails; errors are folded
    /// into the returned status.
    pub async fn attempt(
        &self,
        session: &B::Session,
        account_id: &str,
        task: &TaskConfig,
        today: Weekday,
    ) -> TaskOutcome {
        if !is_active_today(task, today) {
            return TaskOutcome::new(account_id, task, TaskStatus::Skipped);
        }

        info!(
            account = %account_id,
            time = %task.time_label,
            seat = %task.seat_id,
            "Attempting reservation"
        );

        let request = SubmitRequest {
            time_label: &task.time_label,
            room_id: &task.room_id,
            seat_id: &task.seat_id,
            unattended: self.unattended,
        };

        let status =
            match tokio::time::timeout(self.submit_timeout, self.backend.submit(session, request))
                .await
            {
                Ok(Ok(true)) => TaskStatus::Reserved,
                Ok(Ok(false)) => TaskStatus::Failed(SubmissionError::Rejected),
                Ok(Err(e)) => TaskStatus::Failed(SubmissionError::Transport(format!("{:#}", e))),
                Err(_) => TaskStatus::Failed(SubmissionError::TimedOut(self.submit_timeout)),
            };

        match &status {
            TaskStatus::Reserved => {
                info!(
                    account = %account_id,
                    time = %task.time_label,
                    seat = %task.seat_id,
                    "Reservation succeeded"
                );
            }
            TaskStatus::Failed(e) => {
                warn!(
                    account = %account_id,
                    time = %task.time_label,
                    seat = %task.seat_id,
                    error = %e,
                    "Reservation failed"
                );
            }
            TaskStatus::Skipped => {}
        }

        TaskOutcome::new(account_id, task, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LoginResponse, ReservationBackend};
    use crate::testing::{LoginScript, ScriptedBackend, ScriptedSession, SeatScript};

    fn task(seat: &str, days: &[Weekday]) -> TaskConfig {
        TaskConfig {
            time_label: "08:00-22:00".to_string(),
            room_id: "101".to_string(),
            seat_id: seat.to_string(),
            active_weekdays: days.iter().copied().collect(),
        }
    }

    async fn session_for(backend: &ScriptedBackend, username: &str) -> ScriptedSession {
        match backend.login(username, "pw").await.unwrap() {
            LoginResponse::Accepted(session) => session,
            LoginResponse::Rejected(detail) => panic!("login rejected: {}", detail),
        }
    }

    fn worker(
        backend: ScriptedBackend,
    ) -> (ReservationWorker<ScriptedBackend>, Arc<ScriptedBackend>) {
        let backend = Arc::new(backend);
        (
            ReservationWorker::new(backend.clone(), Duration::from_secs(5), true),
            backend,
        )
    }

    #[tokio::test]
    async fn test_inactive_day_is_satisfied_without_submitting() {
        let (worker, backend) =
            worker(ScriptedBackend::new().with_login("alice", LoginScript::Accept));
        let session = session_for(&backend, "alice").await;

        let outcome = worker
            .attempt(&session, "a", &task("S1", &[Weekday::Tue]), Weekday::Mon)
            .await;

        assert_eq!(outcome.status, TaskStatus::Skipped);
        assert!(outcome.satisfied());
        assert!(backend.submit_calls().is_empty());
    }

    #[tokio::test]
    async fn test_successful_submission() {
        let (worker, backend) =
            worker(ScriptedBackend::new().with_login("alice", LoginScript::Accept));
        let session = session_for(&backend, "alice").await;

        let outcome = worker
            .attempt(&session, "a", &task("S1", &[Weekday::Mon]), Weekday::Mon)
            .await;

        assert_eq!(outcome.status, TaskStatus::Reserved);
        assert_eq!(outcome.account_id, "a");
        assert_eq!(outcome.seat_id, "S1");

        let calls = backend.submit_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].unattended);
    }

    #[tokio::test]
    async fn test_rejection_and_error_are_not_satisfied() {
        let (worker, backend) = worker(
            ScriptedBackend::new()
                .with_login("alice", LoginScript::Accept)
                .with_seat("S1", SeatScript::Never)
                .with_seat("S2", SeatScript::Error("connection reset")),
        );
        let session = session_for(&backend, "alice").await;

        let rejected = worker
            .attempt(&session, "a", &task("S1", &[Weekday::Mon]), Weekday::Mon)
            .await;
        assert_eq!(rejected.status, TaskStatus::Failed(SubmissionError::Rejected));
        assert!(!rejected.satisfied());

        let errored = worker
            .attempt(&session, "a", &task("S2", &[Weekday::Mon]), Weekday::Mon)
            .await;
        assert!(matches!(
            errored.status,
            TaskStatus::Failed(SubmissionError::Transport(ref d)) if d.contains("reset")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_submission_times_out() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_login("alice", LoginScript::Accept)
                .with_submit_delay(Duration::from_secs(60)),
        );
        let worker = ReservationWorker::new(backend.clone(), Duration::from_secs(2), false);
        let session = session_for(&backend, "alice").await;

        let outcome = worker
            .attempt(&session, "a", &task("S1", &[Weekday::Mon]), Weekday::Mon)
            .await;

        assert_eq!(
            outcome.status,
            TaskStatus::Failed(SubmissionError::TimedOut(Duration::from_secs(2)))
        );
    }
}
