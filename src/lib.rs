//! Time-gated concurrent seat reservation.
//!
//! At a known wall-clock instant many accounts race to reserve scarce seats.
//! This crate logs the accounts in ahead of time, waits for the reservation
//! window to open, then fires rounds of reservation attempts at a fixed
//! cadence until every task is satisfied or the window closes.

mod auth;
mod backend;
mod clock;
mod config;
mod error;
mod filter;
pub mod http;
mod pool;
mod round;
mod scheduler;
mod worker;

#[cfg(test)]
mod testing;

pub use auth::SessionAuthenticator;
pub use backend::{LoginResponse, ReservationBackend, SubmitRequest};
pub use clock::{Clock, ClockGate, GateRelease, SystemClock};
pub use config::{
    AccountConfig, BackendConfig, CONFIG_ENV, Dispatch, RunConfig, ScheduleConfig, TaskConfig,
    load_config, resolve_config_path,
};
pub use error::{AuthError, ConfigurationMismatch, SubmissionError};
pub use filter::is_active_today;
pub use http::{HttpBackend, HttpSession};
pub use pool::{Credentials, LoginTarget, SessionPool, login_targets};
pub use round::{ReservationRound, RoundReport};
pub use scheduler::{RetryScheduler, RunOutcome, SchedulerState};
pub use worker::{ReservationWorker, TaskOutcome, TaskStatus};
