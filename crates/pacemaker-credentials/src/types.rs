use chrono::{DateTime, Utc};

/// Per-credential bookkeeping. Ordering and dedup identity is the opaque
/// secret string itself.
#[derive(Debug, Clone)]
pub struct Credential {
    pub secret: String,
    pub error_count: u32,
    pub blocked_at: Option<DateTime<Utc>>,
    pub first_error_at_in_window: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(secret: String) -> Self {
        Self {
            secret,
            error_count: 0,
            blocked_at: None,
            first_error_at_in_window: None,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked_at.is_some()
    }
}

/// Read-only snapshot for the observability surface. The secret is masked
/// to its last 4 characters — never surfaced in full outside the client.
#[derive(Debug, Clone)]
pub struct CredentialStatus {
    pub masked_secret: String,
    pub error_count: u32,
    pub blocked: bool,
    pub blocked_at: Option<DateTime<Utc>>,
}

pub fn mask(secret: &str) -> String {
    if secret.len() <= 4 {
        "*".repeat(secret.len())
    } else {
        format!("{}{}", "*".repeat(secret.len() - 4), &secret[secret.len() - 4..])
    }
}

/// Outcome classification a caller reports back to the pool after a call
/// (spec §4.1, §4.2). `CredentialInvalid` is tracked for diagnostics only —
/// it never contributes to the 5-in-5-minutes block counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialOutcome {
    Success,
    RateLimited,
    CredentialInvalid,
    Other,
}
