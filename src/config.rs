//! Run configuration: the JSON document on disk and its validated form.

use anyhow::{Context, anyhow, bail};
use chrono::{NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use std::{env, fs, path::Path, path::PathBuf};

/// Environment variable that points at the configuration document.
pub const CONFIG_ENV: &str = "SEAT_RUSH_CONFIG";

/// A reservation task for one account: a seat in a room, on some weekdays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskConfig {
    /// Display/log label for the requested time window.
    pub time_label: String,
    pub room_id: String,
    pub seat_id: String,
    pub active_weekdays: HashSet<Weekday>,
}

/// One account and the tasks it should reserve.
///
/// `id` is the stable key used to correlate sessions and results with the
/// configuration; it need not equal the login username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountConfig {
    pub id: String,
    pub username: String,
    pub password: String,
    pub tasks: Vec<TaskConfig>,
}

/// How the tasks of one account are dispatched within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dispatch {
    /// One worker per account, its tasks run one after another.
    #[default]
    PerAccount,
    /// One worker per (account, task) pair sharing the account's session.
    PerTask,
}

/// Timing and concurrency settings for one run. Immutable once built.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub login_time: NaiveTime,
    pub reserve_time: NaiveTime,
    pub end_time: NaiveTime,
    pub timezone: Tz,
    /// Pause between two reservation rounds.
    pub round_pause: Duration,
    /// Resolution of the clock gate.
    pub poll_interval: Duration,
    pub fanout_factor: usize,
    pub worker_cap: usize,
    pub login_timeout: Duration,
    pub submit_timeout: Duration,
    pub dispatch: Dispatch,
}

impl ScheduleConfig {
    /// Worker bound for a reservation round over `accounts` live accounts.
    pub fn round_workers(&self, accounts: usize) -> usize {
        accounts
            .saturating_mul(self.fanout_factor)
            .min(self.worker_cap)
            .max(1)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            login_time: clock_time(21, 29, 30),
            reserve_time: clock_time(22, 0, 0),
            end_time: clock_time(22, 1, 0),
            timezone: chrono_tz::Asia::Shanghai,
            round_pause: Duration::from_millis(200),
            poll_interval: Duration::from_millis(500),
            fanout_factor: 4,
            worker_cap: 16,
            login_timeout: Duration::from_secs(120),
            submit_timeout: Duration::from_secs(15),
            dispatch: Dispatch::PerAccount,
        }
    }
}

fn clock_time(hour: u32, min: u32, sec: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, min, sec).unwrap_or(NaiveTime::MIN)
}

/// Settings handed to the HTTP backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub enable_slider: bool,
    pub max_attempt: u32,
    pub reserve_next_day: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            enable_slider: true,
            max_attempt: 5,
            reserve_next_day: false,
        }
    }
}

/// Fully validated configuration for a run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub schedule: ScheduleConfig,
    pub backend: BackendConfig,
    pub accounts: Vec<AccountConfig>,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    schedule: RawSchedule,
    #[serde(default)]
    backend: BackendConfig,
    reserve: Vec<RawAccount>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawSchedule {
    login_time: String,
    reserve_time: String,
    end_time: String,
    timezone: String,
    round_pause_ms: u64,
    poll_interval_ms: u64,
    fanout_factor: usize,
    worker_cap: usize,
    login_timeout_ms: u64,
    submit_timeout_ms: u64,
    dispatch: Dispatch,
}

impl Default for RawSchedule {
    fn default() -> Self {
        Self {
            login_time: "21:29:30".to_string(),
            reserve_time: "22:00:00".to_string(),
            end_time: "22:01:00".to_string(),
            timezone: "Asia/Shanghai".to_string(),
            round_pause_ms: 200,
            poll_interval_ms: 500,
            fanout_factor: 4,
            worker_cap: 16,
            login_timeout_ms: 120_000,
            submit_timeout_ms: 15_000,
            dispatch: Dispatch::PerAccount,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    #[serde(default)]
    id: Option<String>,
    username: String,
    password: String,
    #[serde(default)]
    tasks: Vec<RawTask>,
}

#[derive(Debug, Deserialize)]
struct RawTask {
    time: TimeLabel,
    roomid: String,
    seatid: String,
    daysofweek: Vec<String>,
}

/// `"08:00-22:00"` or `["08:00", "22:00"]`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TimeLabel {
    Single(String),
    Range(Vec<String>),
}

impl TimeLabel {
    fn into_label(self) -> String {
        match self {
            TimeLabel::Single(label) => label,
            TimeLabel::Range(parts) => parts.join("-"),
        }
    }
}

fn parse_clock(field: &str, value: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M:%S")
        .with_context(|| format!("`{}` must be HH:MM:SS, got `{}`", field, value))
}

impl RawSchedule {
    fn into_schedule(self) -> anyhow::Result<ScheduleConfig> {
        let login_time = parse_clock("login_time", &self.login_time)?;
        let reserve_time = parse_clock("reserve_time", &self.reserve_time)?;
        let end_time = parse_clock("end_time", &self.end_time)?;

        if login_time > reserve_time || reserve_time > end_time {
            bail!(
                "Gate times must be ordered login <= reserve <= end, got {} / {} / {}",
                login_time,
                reserve_time,
                end_time
            );
        }
        if self.fanout_factor == 0 || self.worker_cap == 0 {
            bail!("`fanout_factor` and `worker_cap` must be positive");
        }

        let timezone: Tz = self
            .timezone
            .parse()
            .map_err(|e| anyhow!("Unknown time zone `{}`: {}", self.timezone, e))?;

        Ok(ScheduleConfig {
            login_time,
            reserve_time,
            end_time,
            timezone,
            round_pause: Duration::from_millis(self.round_pause_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            fanout_factor: self.fanout_factor,
            worker_cap: self.worker_cap,
            login_timeout: Duration::from_millis(self.login_timeout_ms),
            submit_timeout: Duration::from_millis(self.submit_timeout_ms),
            dispatch: self.dispatch,
        })
    }
}

impl RawTask {
    fn into_task(self, account: &str) -> anyhow::Result<TaskConfig> {
        let mut active_weekdays = HashSet::new();
        for day in &self.daysofweek {
            let weekday: Weekday = day.trim().parse().map_err(|_| {
                anyhow!("Account `{}`: `{}` is not a weekday name", account, day)
            })?;
            active_weekdays.insert(weekday);
        }

        Ok(TaskConfig {
            time_label: self.time.into_label(),
            room_id: self.roomid,
            seat_id: self.seatid,
            active_weekdays,
        })
    }
}

impl RunConfig {
    /// Parse and validate a configuration document.
    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let file: ConfigFile = serde_json::from_str(raw).context("Malformed configuration")?;

        if file.reserve.is_empty() {
            bail!("Configuration lists no accounts under `reserve`");
        }

        let schedule = file.schedule.into_schedule()?;

        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut accounts = Vec::with_capacity(file.reserve.len());
        for (index, raw) in file.reserve.into_iter().enumerate() {
            let id = raw.id.unwrap_or_else(|| raw.username.clone());
            if let Some(first) = seen.insert(id.clone(), index) {
                bail!(
                    "Duplicate account id `{}` at positions {} and {}",
                    id,
                    first,
                    index
                );
            }

            let tasks = raw
                .tasks
                .into_iter()
                .map(|t| t.into_task(&id))
                .collect::<anyhow::Result<Vec<_>>>()?;

            accounts.push(AccountConfig {
                id,
                username: raw.username,
                password: raw.password,
                tasks,
            });
        }

        Ok(Self {
            schedule,
            backend: file.backend,
            accounts,
        })
    }
}

/// Pick the configuration file: explicit path, then `$SEAT_RUSH_CONFIG`,
/// then `./config.json`.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p);
    }

    if let Ok(p) = env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(p));
    }

    let candidate = PathBuf::from("config.json");
    if candidate.exists() {
        return Ok(candidate);
    }

    Err(anyhow!(
        "Could not find config.json (pass --config, set {} or create ./config.json)",
        CONFIG_ENV
    ))
}

pub fn load_config(path: &Path) -> anyhow::Result<RunConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Cannot read configuration file {}", path.display()))?;
    RunConfig::from_json_str(&raw)
        .with_context(|| format!("Invalid configuration file {}", path.display()))
}
