use std::sync::Mutex;

use chrono::{Duration as ChronoDuration, Local, TimeZone, Utc};
use tracing::{info, instrument, warn};

use crate::error::{CredentialError, Result};
use crate::types::{mask, Credential, CredentialOutcome, CredentialStatus};

/// Errors needed within the window to transition to blocked.
const BLOCK_THRESHOLD: u32 = 5;

/// 5 errors within this window blocks a credential (spec §4.1).
fn error_window() -> ChronoDuration {
    ChronoDuration::minutes(5)
}

/// Blocked credentials are released after this long (spec §4.1).
fn block_duration() -> ChronoDuration {
    ChronoDuration::hours(1)
}

struct Inner {
    credentials: Vec<Credential>,
    cursor: usize,
}

/// Rotates LLM API credentials across calls; tracks failures; blocks and
/// unblocks automatically. A single instance is shared (via `Arc`) across
/// every concurrent LLM call the client makes.
pub struct CredentialPool {
    inner: Mutex<Inner>,
}

impl CredentialPool {
    /// Merge and deduplicate the primary and backup lists, preserving
    /// insertion order (primary first) as spec §3 requires.
    pub fn new(primary: Vec<String>, backup: Vec<String>) -> Result<Self> {
        let mut seen = std::collections::HashSet::new();
        let mut credentials = Vec::new();
        for secret in primary.into_iter().chain(backup.into_iter()) {
            if seen.insert(secret.clone()) {
                credentials.push(Credential::new(secret));
            }
        }
        if credentials.is_empty() {
            return Err(CredentialError::Empty);
        }
        Ok(Self {
            inner: Mutex::new(Inner {
                credentials,
                cursor: 0,
            }),
        })
    }

    /// Return the first non-blocked credential starting at the rotation
    /// cursor. If every credential is blocked, degrade to the one with the
    /// earliest `blockedAt` and emit a warning (spec §4.1).
    #[instrument(skip(self))]
    pub fn acquire(&self) -> String {
        self.sweep();

        let mut inner = self.inner.lock().unwrap();
        let len = inner.credentials.len();

        for offset in 0..len {
            let idx = (inner.cursor + offset) % len;
            if !inner.credentials[idx].is_blocked() {
                inner.cursor = idx;
                return inner.credentials[idx].secret.clone();
            }
        }

        // Degraded mode: every credential is blocked, pick earliest blockedAt.
        let (idx, _) = inner
            .credentials
            .iter()
            .enumerate()
            .min_by_key(|(_, c)| c.blocked_at.expect("every credential is blocked in this branch"))
            .expect("credentials is non-empty by construction");
        warn!("all credentials blocked, degrading to earliest-blocked credential");
        inner.credentials[idx].secret.clone()
    }

    /// Record the outcome of a call made with `secret` (spec §4.1).
    #[instrument(skip(self, secret))]
    pub fn report_outcome(&self, secret: &str, outcome: CredentialOutcome) {
        let mut inner = self.inner.lock().unwrap();
        let len = inner.credentials.len();
        let Some(idx) = inner.credentials.iter().position(|c| c.secret == secret) else {
            return;
        };

        match outcome {
            CredentialOutcome::Success => {
                inner.credentials[idx].error_count = 0;
            }
            CredentialOutcome::RateLimited => {
                let now = Utc::now();
                let cred = &mut inner.credentials[idx];
                let window_elapsed = cred
                    .first_error_at_in_window
                    .map(|first| now - first > error_window())
                    .unwrap_or(false);

                if cred.first_error_at_in_window.is_none() || window_elapsed {
                    cred.error_count = 0;
                    cred.first_error_at_in_window = Some(now);
                }
                cred.error_count += 1;

                if cred.error_count >= BLOCK_THRESHOLD {
                    cred.blocked_at = Some(now);
                    warn!(credential = %mask(secret), "credential blocked after repeated rate limits");
                    // Advance cursor to the next non-blocked credential.
                    for offset in 1..=len {
                        let next = (idx + offset) % len;
                        if !inner.credentials[next].is_blocked() {
                            inner.cursor = next;
                            break;
                        }
                    }
                }
            }
            CredentialOutcome::CredentialInvalid | CredentialOutcome::Other => {
                // Diagnostics only — never contributes to the block counter.
            }
        }
    }

    /// Advance the rotation cursor by one, wrapping around. Used by the LLM
    /// client to rotate away from a credential that just failed with a
    /// rate-limit or credential-invalid error (spec §4.2 step 4), independent
    /// of whether that failure actually blocked the credential.
    pub fn rotate(&self) {
        let mut inner = self.inner.lock().unwrap();
        let len = inner.credentials.len();
        inner.cursor = (inner.cursor + 1) % len;
    }

    /// Unblock credentials whose block has outlived the block duration,
    /// resetting their error state. Called on every `acquire()` and may also
    /// be driven by a periodic background tick.
    pub fn sweep(&self) {
        let now = Utc::now();
        let mut inner = self.inner.lock().unwrap();
        for cred in inner.credentials.iter_mut() {
            if let Some(blocked_at) = cred.blocked_at {
                if now - blocked_at > block_duration() {
                    cred.blocked_at = None;
                    cred.error_count = 0;
                    cred.first_error_at_in_window = None;
                }
            }
        }
    }

    /// Clear every credential's error state and block (local-midnight reset,
    /// spec §4.1).
    pub fn daily_reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        for cred in inner.credentials.iter_mut() {
            cred.error_count = 0;
            cred.blocked_at = None;
            cred.first_error_at_in_window = None;
        }
        info!("credential pool: daily reset applied");
    }

    /// Admin operation: force the rotation cursor forward. Logs the operator
    /// action.
    pub fn force_advance(&self) {
        self.rotate();
        info!("credential pool: cursor force-advanced by operator");
    }

    /// Admin operation: clear the error/block state of the credential whose
    /// masked form starts with `prefix`. Logs the operator action.
    pub fn force_reset(&self, prefix: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let cred = inner
            .credentials
            .iter_mut()
            .find(|c| mask(&c.secret).starts_with(prefix) || c.secret.starts_with(prefix));
        match cred {
            Some(cred) => {
                cred.error_count = 0;
                cred.blocked_at = None;
                cred.first_error_at_in_window = None;
                info!(prefix, "credential pool: force-reset by operator");
                Ok(())
            }
            None => Err(CredentialError::PrefixNotFound {
                prefix: prefix.to_string(),
            }),
        }
    }

    /// Read-only snapshot for the observability surface.
    pub fn statuses(&self) -> Vec<CredentialStatus> {
        let inner = self.inner.lock().unwrap();
        inner
            .credentials
            .iter()
            .map(|c| CredentialStatus {
                masked_secret: mask(&c.secret),
                error_count: c.error_count,
                blocked: c.is_blocked(),
                blocked_at: c.blocked_at,
            })
            .collect()
    }
}

/// Compute the `std::time::Duration` until the next local midnight, for
/// scheduling [`CredentialPool::daily_reset`] from a background tick loop
/// (mirrors the scheduler engine's tick-and-reschedule pattern elsewhere in
/// this workspace).
pub fn duration_until_next_local_midnight() -> std::time::Duration {
    let now = Local::now();
    let tomorrow_midnight = (now + ChronoDuration::days(1))
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time");
    let tomorrow_midnight = Local
        .from_local_datetime(&tomorrow_midnight)
        .single()
        .unwrap_or_else(|| now + ChronoDuration::days(1));
    (tomorrow_midnight - now)
        .to_std()
        .unwrap_or(std::time::Duration::from_secs(3600))
}

/// Background loop: sleeps until the next local midnight, applies
/// [`CredentialPool::daily_reset`], then reschedules — mirrors the
/// scheduler engine's tick-and-reschedule loop elsewhere in this workspace.
/// Exits when `shutdown` reports `true`.
pub async fn run_daily_reset_loop(
    pool: std::sync::Arc<CredentialPool>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    loop {
        let sleep_for = duration_until_next_local_midnight();
        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {
                pool.daily_reset();
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("credential pool: daily reset loop shutting down");
                    break;
                }
            }
        }
    }
}
