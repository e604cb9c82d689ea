pub mod error;
pub mod pool;
pub mod types;

pub use error::{CredentialError, Result};
pub use pool::{duration_until_next_local_midnight, run_daily_reset_loop, CredentialPool};
pub use types::{Credential, CredentialOutcome, CredentialStatus};
