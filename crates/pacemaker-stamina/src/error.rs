use thiserror::Error;

#[derive(Debug, Error)]
pub enum StaminaError {
    #[error("stamina level out of range: {0}")]
    OutOfRange(f64),
}

pub type Result<T> = std::result::Result<T, StaminaError>;
