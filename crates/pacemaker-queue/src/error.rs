use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum QueueError {
    #[error("batch processing failed: {0}")]
    ProcessingFailed(String),
}

pub type Result<T> = std::result::Result<T, QueueError>;
