//! One reservation round: every (account, task) pair attempted once.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Weekday;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::backend::ReservationBackend;
use crate::config::{AccountConfig, Dispatch, ScheduleConfig, TaskConfig};
use crate::error::SubmissionError;
use crate::pool::SessionPool;
use crate::worker::{ReservationWorker, TaskOutcome, TaskStatus};

/// Result of one round.
#[derive(Debug, Clone, Default)]
pub struct RoundReport {
    pub round: u32,
    /// Outcomes in configuration order.
    pub outcomes: Vec<TaskOutcome>,
    /// Accounts without a live session; none of their tasks were attempted.
    pub skipped_accounts: Vec<String>,
}

impl RoundReport {
    /// True iff every dispatched pair is satisfied.
    pub fn all_satisfied(&self) -> bool {
        self.outcomes.iter().all(TaskOutcome::satisfied)
    }

    pub fn satisfied_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.satisfied()).count()
    }
}

/// A batch of tasks executed sequentially by one worker against one session.
struct WorkUnit<S> {
    order: usize,
    account_id: String,
    session: Arc<S>,
    tasks: Vec<TaskConfig>,
}

/// Run one attempt on its own task so a panicking backend only fails that pair.
/// The caller still awaits it, so tasks of one unit stay sequential.
async fn attempt_contained<B: ReservationBackend>(
    worker: &ReservationWorker<B>,
    session: &Arc<B::Session>,
    account_id: &str,
    task: TaskConfig,
    round: u32,
    today: Weekday,
) -> TaskOutcome {
    let worker = worker.clone();
    let session = Arc::clone(session);
    let owner = account_id.to_string();
    let label = task.clone();

    let handle =
        tokio::spawn(async move { worker.attempt(&session, &owner, &task, today).await });

    match handle.await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(
                round,
                account = %account_id,
                seat = %label.seat_id,
                error = %e,
                "Reservation attempt crashed"
            );
            TaskOutcome::new(
                account_id,
                &label,
                TaskStatus::Failed(SubmissionError::Crashed(e.to_string())),
            )
        }
    }
}

/// Runs rounds over a fixed account list and session pool.
pub struct ReservationRound<B: ReservationBackend> {
    worker: ReservationWorker<B>,
    pool: Arc<SessionPool<B::Session>>,
    accounts: Arc<[AccountConfig]>,
    dispatch: Dispatch,
    max_workers: usize,
}

impl<B: ReservationBackend> ReservationRound<B> {
    pub fn new(
        worker: ReservationWorker<B>,
        pool: Arc<SessionPool<B::Session>>,
        accounts: Arc<[AccountConfig]>,
        schedule: &ScheduleConfig,
    ) -> Self {
        let max_workers = schedule.round_workers(accounts.len());
        Self {
            worker,
            pool,
            accounts,
            dispatch: schedule.dispatch,
            max_workers,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    fn work_units(&self, skipped: &mut Vec<String>) -> Vec<WorkUnit<B::Session>> {
        let mut units = Vec::new();

        for account in self.accounts.iter() {
            let Some(session) = self.pool.get(&account.id) else {
                warn!(
                    account = %account.id,
                    "No live session, skipping all tasks for this account"
                );
                skipped.push(account.id.clone());
                continue;
            };

            match self.dispatch {
                Dispatch::PerAccount => units.push(WorkUnit {
                    order: units.len(),
                    account_id: account.id.clone(),
                    session,
                    tasks: account.tasks.clone(),
                }),
                Dispatch::PerTask => {
                    for task in &account.tasks {
                        units.push(WorkUnit {
                            order: units.len(),
                            account_id: account.id.clone(),
                            session: Arc::clone(&session),
                            tasks: vec![task.clone()],
                        });
                    }
                }
            }
        }

        units
    }

    /// Attempt every pair once and wait for all of them.
    ///
    /// A failing pair never cuts the round short; seats are independent.
    pub async fn run(&self, round: u32, today: Weekday) -> RoundReport {
        let mut skipped_accounts = Vec::new();
        let units = self.work_units(&mut skipped_accounts);

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut join_set = JoinSet::new();
        let mut inflight: HashMap<tokio::task::Id, (usize, String, Vec<TaskConfig>)> =
            HashMap::new();

        for unit in units {
            let worker = self.worker.clone();
            let semaphore = Arc::clone(&semaphore);
            let key = (unit.order, unit.account_id.clone(), unit.tasks.clone());

            let handle = join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();

                let mut outcomes = Vec::with_capacity(unit.tasks.len());
                for task in unit.tasks {
                    let outcome = attempt_contained(
                        &worker,
                        &unit.session,
                        &unit.account_id,
                        task,
                        round,
                        today,
                    )
                    .await;
                    outcomes.push(outcome);
                }
                (unit.order, outcomes)
            });
            inflight.insert(handle.id(), key);
        }

        let mut collected: Vec<(usize, Vec<TaskOutcome>)> = Vec::with_capacity(inflight.len());
        while let Some(joined) = join_set.join_next_with_id().await {
            match joined {
                Ok((_, (order, outcomes))) => {
                    for outcome in outcomes.iter().filter(|o| !o.satisfied()) {
                        error!(
                            round,
                            account = %outcome.account_id,
                            time = %outcome.time_label,
                            "Task not completed: {}",
                            outcome.status
                        );
                    }
                    collected.push((order, outcomes));
                }
                Err(e) => {
                    let Some((order, account_id, tasks)) = inflight.remove(&e.id()) else {
                        error!(round, error = %e, "Unknown reservation worker crashed");
                        continue;
                    };
                    error!(round, account = %account_id, error = %e, "Reservation worker crashed");
                    let outcomes = tasks
                        .iter()
                        .map(|task| {
                            TaskOutcome::new(
                                &account_id,
                                task,
                                TaskStatus::Failed(SubmissionError::Crashed(e.to_string())),
                            )
                        })
                        .collect();
                    collected.push((order, outcomes));
                }
            }
        }

        collected.sort_by_key(|(order, _)| *order);
        let report = RoundReport {
            round,
            outcomes: collected.into_iter().flat_map(|(_, o)| o).collect(),
            skipped_accounts,
        };

        info!(
            round,
            satisfied = report.satisfied_count(),
            total = report.outcomes.len(),
            skipped_accounts = report.skipped_accounts.len(),
            "Round finished"
        );

        report
    }
}
