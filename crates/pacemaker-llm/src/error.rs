use thiserror::Error;

use pacemaker_core::interfaces::LlmBackendError;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("rate limited")]
    RateLimited,
    #[error("credential invalid: {0}")]
    CredentialInvalid(String),
    #[error("transient remote failure: {0}")]
    TransientRemote(String),
    #[error("could not parse a decision out of the model response: {0}")]
    ParseError(String),
    #[error("all {attempts} attempts exhausted")]
    Exhausted { attempts: u32 },
}

impl From<LlmBackendError> for LlmError {
    fn from(e: LlmBackendError) -> Self {
        match e {
            LlmBackendError::RateLimited { .. } => LlmError::RateLimited,
            LlmBackendError::CredentialInvalid(msg) => LlmError::CredentialInvalid(msg),
            LlmBackendError::TransientRemote(msg) => LlmError::TransientRemote(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
