use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssemblerError {
    #[error("cannot assemble an empty batch")]
    EmptyBatch,
}

pub type Result<T> = std::result::Result<T, AssemblerError>;
