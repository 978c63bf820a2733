//! Time-gated run orchestration.
//!
//! ```text
//! AwaitingLogin -> LoggingIn -> AwaitingReservationWindow -> Retrying -> Done
//! ```
//!
//! The retry loop is bounded by the end-of-window clock time, not by an
//! attempt count: rounds are fired at a fixed cadence from the moment the
//! reservation gate opens until every task is satisfied or the window closes.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::auth::SessionAuthenticator;
use crate::backend::ReservationBackend;
use crate::clock::{Clock, ClockGate, GateRelease};
use crate::config::{AccountConfig, ScheduleConfig};
use crate::pool::{Credentials, SessionPool};
use crate::round::ReservationRound;
use crate::worker::ReservationWorker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    AwaitingLogin,
    LoggingIn,
    AwaitingReservationWindow,
    Retrying,
    Done,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every task was satisfied.
    Succeeded { rounds: u32 },
    /// The end of the window passed with tasks still unsatisfied.
    TimedOut { rounds: u32 },
    /// A single debug round finished with tasks still unsatisfied.
    Unsatisfied { rounds: u32 },
    /// No account could log in; no round was attempted.
    NoSessions,
    /// The run was cancelled from outside.
    Cancelled { rounds: u32 },
}

impl RunOutcome {
    pub fn rounds(&self) -> u32 {
        match self {
            Self::Succeeded { rounds }
            | Self::TimedOut { rounds }
            | Self::Unsatisfied { rounds }
            | Self::Cancelled { rounds } => *rounds,
            Self::NoSessions => 0,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded { rounds } => {
                write!(f, "all tasks satisfied after {} round(s)", rounds)
            }
            Self::TimedOut { rounds } => {
                write!(f, "window closed after {} round(s) with tasks unsatisfied", rounds)
            }
            Self::Unsatisfied { rounds } => {
                write!(f, "{} round(s) run, tasks still unsatisfied", rounds)
            }
            Self::NoSessions => write!(f, "no account could log in"),
            Self::Cancelled { rounds } => write!(f, "cancelled after {} round(s)", rounds),
        }
    }
}

/// Drives one run from the login gate to a terminal [`RunOutcome`].
pub struct RetryScheduler<B> {
    schedule: ScheduleConfig,
    accounts: Arc<[AccountConfig]>,
    backend: Arc<B>,
    clock: Arc<dyn Clock>,
    credentials: Option<Credentials>,
    cancel: CancellationToken,
}

impl<B: ReservationBackend> RetryScheduler<B> {
    pub fn new(
        schedule: ScheduleConfig,
        accounts: Vec<AccountConfig>,
        backend: Arc<B>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            schedule,
            accounts: accounts.into(),
            backend,
            clock,
            credentials: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Log in with external credentials instead of the configured ones.
    /// This also marks submissions as unattended.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn unattended(&self) -> bool {
        self.credentials.is_some()
    }

    fn enter(&self, state: SchedulerState) {
        info!(state = ?state, "Scheduler state changed");
    }

    /// Full run: wait, log in, wait, retry until success or the window closes.
    pub async fn run(&self) -> RunOutcome {
        info!(
            accounts = self.accounts.len(),
            login_time = %self.schedule.login_time,
            reserve_time = %self.schedule.reserve_time,
            end_time = %self.schedule.end_time,
            "Reservation run starting"
        );
        let gate = ClockGate::new(self.clock.as_ref(), self.schedule.poll_interval);

        self.enter(SchedulerState::AwaitingLogin);
        if gate.wait_until(self.schedule.login_time, &self.cancel).await == GateRelease::Cancelled {
            return self.finish(RunOutcome::Cancelled { rounds: 0 });
        }

        self.enter(SchedulerState::LoggingIn);
        let Some(round) = self.login().await else {
            return self.finish(RunOutcome::NoSessions);
        };

        self.enter(SchedulerState::AwaitingReservationWindow);
        if gate.wait_until(self.schedule.reserve_time, &self.cancel).await
            == GateRelease::Cancelled
        {
            return self.finish(RunOutcome::Cancelled { rounds: 0 });
        }

        self.enter(SchedulerState::Retrying);
        let outcome = self.retry(&round).await;
        self.finish(outcome)
    }

    /// Log in immediately and run exactly one round, ignoring all gates.
    pub async fn debug(&self) -> RunOutcome {
        info!(
            login_time = %self.schedule.login_time,
            reserve_time = %self.schedule.reserve_time,
            end_time = %self.schedule.end_time,
            timezone = %self.schedule.timezone,
            round_pause = ?self.schedule.round_pause,
            dispatch = ?self.schedule.dispatch,
            unattended = self.unattended(),
            "Debug run starting"
        );

        self.enter(SchedulerState::LoggingIn);
        let Some(round) = self.login().await else {
            return self.finish(RunOutcome::NoSessions);
        };

        self.enter(SchedulerState::Retrying);
        let report = round.run(1, self.clock.weekday()).await;
        let outcome = if report.all_satisfied() {
            RunOutcome::Succeeded { rounds: 1 }
        } else {
            RunOutcome::Unsatisfied { rounds: 1 }
        };
        self.finish(outcome)
    }

    async fn login(&self) -> Option<ReservationRound<B>> {
        let authenticator = SessionAuthenticator::new(
            Arc::clone(&self.backend),
            self.schedule.login_timeout,
        );
        let pool =
            SessionPool::build(&self.accounts, self.credentials.as_ref(), &authenticator).await;

        if pool.is_empty() {
            error!("No account logged in, aborting run");
            return None;
        }

        let worker = ReservationWorker::new(
            Arc::clone(&self.backend),
            self.schedule.submit_timeout,
            self.unattended(),
        );
        Some(ReservationRound::new(
            worker,
            Arc::new(pool),
            Arc::clone(&self.accounts),
            &self.schedule,
        ))
    }

    async fn retry(&self, round: &ReservationRound<B>) -> RunOutcome {
        info!(workers = round.max_workers(), "Starting reservation rounds");
        let mut rounds = 0;

        loop {
            rounds += 1;
            info!(round = rounds, "Reservation round starting");

            let report = round.run(rounds, self.clock.weekday()).await;
            if report.all_satisfied() {
                return RunOutcome::Succeeded { rounds };
            }

            let now = self.clock.time_of_day();
            info!(
                round = rounds,
                now = %now,
                end_time = %self.schedule.end_time,
                "Round incomplete"
            );
            if now >= self.schedule.end_time {
                return RunOutcome::TimedOut { rounds };
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return RunOutcome::Cancelled { rounds },
                _ = tokio::time::sleep(self.schedule.round_pause) => {}
            }
        }
    }

    fn finish(&self, outcome: RunOutcome) -> RunOutcome {
        self.enter(SchedulerState::Done);
        match outcome {
            RunOutcome::Succeeded { .. } => info!("Run finished: {}", outcome),
            RunOutcome::NoSessions => error!("Run aborted: {}", outcome),
            _ => info!("Run ended: {}", outcome),
        }
        outcome
    }
}
