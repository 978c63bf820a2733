//! Parallel login of all accounts into a read-only session pool.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::auth::SessionAuthenticator;
use crate::backend::ReservationBackend;
use crate::config::AccountConfig;
use crate::error::{AuthError, ConfigurationMismatch};

pub const USERNAMES_ENV: &str = "USERNAMES";
pub const PASSWORDS_ENV: &str = "PASSWORDS";

/// Externally supplied credentials, positionally aligned to account order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    usernames: Vec<String>,
    passwords: Vec<String>,
}

impl Credentials {
    /// Build from two comma-separated lists.
    pub fn from_lists(usernames: &str, passwords: &str) -> Self {
        Self {
            usernames: split_list(usernames),
            passwords: split_list(passwords),
        }
    }

    /// Read `$USERNAMES` and `$PASSWORDS`.
    pub fn from_env() -> anyhow::Result<Self> {
        let usernames = env::var(USERNAMES_ENV)
            .with_context(|| format!("Unattended mode needs ${}", USERNAMES_ENV))?;
        let passwords = env::var(PASSWORDS_ENV)
            .with_context(|| format!("Unattended mode needs ${}", PASSWORDS_ENV))?;
        Ok(Self::from_lists(&usernames, &passwords))
    }

    /// The credential pair at `index`, if both lists reach that far.
    pub fn get(&self, index: usize) -> Option<(&str, &str)> {
        let username = self.usernames.get(index)?;
        let password = self.passwords.get(index)?;
        Some((username.as_str(), password.as_str()))
    }

    pub fn len(&self) -> usize {
        self.usernames.len().min(self.passwords.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn split_list(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    raw.split(',').map(|s| s.trim().to_string()).collect()
}

/// Who to log in, and under which configuration id to file the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginTarget {
    pub account_id: String,
    pub username: String,
    pub password: String,
}

/// Pair every account with the credentials it will log in with.
///
/// With external credentials the i-th account takes the i-th pair; accounts
/// past the end of either list are reported as mismatches and left out.
pub fn login_targets(
    accounts: &[AccountConfig],
    credentials: Option<&Credentials>,
) -> (Vec<LoginTarget>, Vec<ConfigurationMismatch>) {
    let mut targets = Vec::with_capacity(accounts.len());
    let mut mismatches = Vec::new();

    for (index, account) in accounts.iter().enumerate() {
        let (username, password) = match credentials {
            None => (account.username.as_str(), account.password.as_str()),
            Some(creds) => match creds.get(index) {
                Some(pair) => pair,
                None => {
                    mismatches.push(ConfigurationMismatch {
                        index,
                        account_id: account.id.clone(),
                    });
                    continue;
                }
            },
        };

        targets.push(LoginTarget {
            account_id: account.id.clone(),
            username: username.to_string(),
            password: password.to_string(),
        });
    }

    (targets, mismatches)
}

/// Live sessions keyed by account configuration id. Read-only once built.
pub struct SessionPool<S> {
    sessions: HashMap<String, Arc<S>>,
}

impl<S> SessionPool<S> {
    pub fn get(&self, account_id: &str) -> Option<Arc<S>> {
        self.sessions.get(account_id).cloned()
    }

    pub fn contains(&self, account_id: &str) -> bool {
        self.sessions.contains_key(account_id)
    }

    pub fn account_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<S: Send + Sync + 'static> SessionPool<S> {
    /// Log in every account concurrently, one task per account.
    ///
    /// Failed logins (of any kind, including a panicking backend) are logged
    /// and left out; they are not retried.
    pub async fn build<B>(
        accounts: &[AccountConfig],
        credentials: Option<&Credentials>,
        authenticator: &SessionAuthenticator<B>,
    ) -> Self
    where
        B: ReservationBackend<Session = S>,
    {
        let (targets, mismatches) = login_targets(accounts, credentials);
        for mismatch in &mismatches {
            error!(
                account = %mismatch.account_id,
                index = mismatch.index,
                "{}, skipping",
                mismatch
            );
        }

        let mut join_set = JoinSet::new();
        let mut owners = HashMap::new();

        for target in targets {
            let auth = authenticator.clone();
            let account_id = target.account_id.clone();

            let handle = join_set.spawn(async move {
                info!(account = %target.account_id, username = %target.username, "Logging in");
                let result = auth.authenticate(&target.username, &target.password).await;
                (target.account_id, result)
            });
            owners.insert(handle.id(), account_id);
        }

        let mut sessions = HashMap::new();
        while let Some(joined) = join_set.join_next_with_id().await {
            let (account_id, result) = match joined {
                Ok((_, outcome)) => outcome,
                Err(e) => {
                    let account_id = owners.get(&e.id()).cloned().unwrap_or_default();
                    (account_id, Err(AuthError::Crashed(e.to_string())))
                }
            };

            match result {
                Ok(session) => {
                    info!(account = %account_id, "Login succeeded");
                    sessions.insert(account_id, Arc::new(session));
                }
                Err(e) => {
                    error!(account = %account_id, error = %e, "Login failed");
                }
            }
        }

        info!(
            "Login phase finished, {} of {} accounts logged in",
            sessions.len(),
            accounts.len()
        );

        Self { sessions }
    }
}
