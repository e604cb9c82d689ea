use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("not accepting new ingress, orchestrator is shutting down")]
    ShuttingDown,
    #[error("credential pool error: {0}")]
    Credential(#[from] pacemaker_credentials::CredentialError),
    #[error("admin command failed: {0}")]
    AdminCommand(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
