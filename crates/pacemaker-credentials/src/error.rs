use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no credentials configured")]
    Empty,
    #[error("no credential matching prefix {prefix:?}")]
    PrefixNotFound { prefix: String },
}

pub type Result<T> = std::result::Result<T, CredentialError>;
