use thiserror::Error;

#[derive(Debug, Error)]
pub enum CorrelatorError {
    #[error("no pending correlation for inbound id {0}")]
    NotPending(String),
}

pub type Result<T> = std::result::Result<T, CorrelatorError>;
