//! Wall-clock gating in a fixed reference time zone.
//!
//! The gate polls the clock at a coarse, fixed resolution. It is a
//! coordination primitive, not a precision timer: callers observe release
//! at most one poll interval after the target time-of-day is reached.

use chrono::{Datelike, NaiveDateTime, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Source of the current local date and time in the reference zone.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn time_of_day(&self) -> NaiveTime {
        self.now().time()
    }

    fn weekday(&self) -> Weekday {
        self.now().weekday()
    }
}

/// The system clock viewed from a fixed time zone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.tz).naive_local()
    }
}

/// How a gate wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRelease {
    Reached,
    Cancelled,
}

/// Blocks until a time-of-day is reached.
pub struct ClockGate<'a> {
    clock: &'a dyn Clock,
    poll_interval: Duration,
}

impl<'a> ClockGate<'a> {
    pub fn new(clock: &'a dyn Clock, poll_interval: Duration) -> Self {
        Self {
            clock,
            poll_interval,
        }
    }

    /// Wait until the clock's time-of-day is at or past `target`.
    ///
    /// Comparison is within a single calendar day, so a target earlier than
    /// the current time releases immediately.
    pub async fn wait_until(&self, target: NaiveTime, cancel: &CancellationToken) -> GateRelease {
        info!(target = %target, "Waiting for gate");

        loop {
            if self.clock.time_of_day() >= target {
                info!(target = %target, "Gate reached, continuing");
                return GateRelease::Reached;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(target = %target, "Gate wait cancelled");
                    return GateRelease::Cancelled;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tokio::time::Instant;

    /// A clock that starts at a fixed local time and advances with tokio time,
    /// so paused-runtime tests can drive it deterministically.
    pub struct TokioClock {
        origin: NaiveDateTime,
        started: Instant,
    }

    impl TokioClock {
        pub fn starting_at(origin: NaiveDateTime) -> Self {
            Self {
                origin,
                started: Instant::now(),
            }
        }
    }

    impl Clock for TokioClock {
        fn now(&self) -> NaiveDateTime {
            let elapsed = chrono::Duration::from_std(self.started.elapsed())
                .unwrap_or(chrono::Duration::zero());
            self.origin + elapsed
        }
    }

    /// Monday 2024-01-01 at the given time.
    pub fn monday_at(hour: u32, min: u32, sec: u32) -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(hour, min, sec)
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{TokioClock, monday_at};
    use super::*;
    use tokio::time::Instant;

    const POLL: Duration = Duration::from_millis(500);

    #[tokio::test(start_paused = true)]
    async fn test_gate_does_not_release_early() {
        let clock = TokioClock::starting_at(monday_at(21, 59, 50));
        let gate = ClockGate::new(&clock, POLL);
        let cancel = CancellationToken::new();
        let target = NaiveTime::from_hms_opt(22, 0, 0).unwrap();

        let started = Instant::now();
        let release = gate.wait_until(target, &cancel).await;
        let waited = started.elapsed();

        assert_eq!(release, GateRelease::Reached);
        assert!(clock.time_of_day() >= target);
        assert!(waited >= Duration::from_secs(10));
        assert!(waited <= Duration::from_secs(10) + POLL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_in_the_past_releases_immediately() {
        let clock = TokioClock::starting_at(monday_at(22, 0, 30));
        let gate = ClockGate::new(&clock, POLL);
        let cancel = CancellationToken::new();

        let started = Instant::now();
        let release = gate
            .wait_until(NaiveTime::from_hms_opt(22, 0, 0).unwrap(), &cancel)
            .await;

        assert_eq!(release, GateRelease::Reached);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_observes_cancellation() {
        let clock = TokioClock::starting_at(monday_at(8, 0, 0));
        let gate = ClockGate::new(&clock, POLL);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let release = gate
            .wait_until(NaiveTime::from_hms_opt(9, 0, 0).unwrap(), &cancel)
            .await;

        assert_eq!(release, GateRelease::Cancelled);
        assert!(clock.time_of_day() < NaiveTime::from_hms_opt(8, 0, 4).unwrap());
    }

    #[test]
    fn test_system_clock_uses_reference_zone() {
        let utc = SystemClock::new(chrono_tz::UTC).now();
        let shanghai = SystemClock::new(chrono_tz::Asia::Shanghai).now();

        let offset = (shanghai - utc).num_seconds();
        assert!((offset - 8 * 3600).abs() < 5);
    }
}
