use thiserror::Error;

/// Aggregate error type for the whole mediator core.
///
/// Each component crate (`pacemaker-credentials`, `pacemaker-llm`, …) defines
/// its own error enum; this type is what the orchestrator and the service
/// binary deal in, following the same top-level-aggregates-subsystem-errors
/// shape the rest of this workspace uses.
#[derive(Debug, Error)]
pub enum PacemakerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("credential pool error: {0}")]
    Credential(String),

    #[error("LLM client error: {0}")]
    Llm(String),

    #[error("stamina controller error: {0}")]
    Stamina(String),

    #[error("per-context queue error: {0}")]
    Queue(String),

    #[error("batch assembler error: {0}")]
    Assembler(String),

    #[error("task runner error: {0}")]
    Task(String),

    #[error("outbound correlator error: {0}")]
    Correlator(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PacemakerError {
    /// Short error code string, stable for external observability surfaces.
    pub fn code(&self) -> &'static str {
        match self {
            PacemakerError::Config(_) => "CONFIG_ERROR",
            PacemakerError::Credential(_) => "CREDENTIAL_ERROR",
            PacemakerError::Llm(_) => "LLM_ERROR",
            PacemakerError::Stamina(_) => "STAMINA_ERROR",
            PacemakerError::Queue(_) => "QUEUE_ERROR",
            PacemakerError::Assembler(_) => "ASSEMBLER_ERROR",
            PacemakerError::Task(_) => "TASK_ERROR",
            PacemakerError::Correlator(_) => "CORRELATOR_ERROR",
            PacemakerError::Serialization(_) => "SERIALIZATION_ERROR",
            PacemakerError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, PacemakerError>;

/// The error taxonomy from the LLM call boundary (spec §7). Components
/// classify failures into these kinds rather than branching on status
/// codes or substrings more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// HTTP 429, or a message containing "rate limit" / "quota exceeded".
    RateLimited,
    /// 401/403, or a message containing "invalid key" / "api key".
    CredentialInvalid,
    /// 5xx, network, or timeout.
    TransientRemote,
    /// The LLM returned non-conforming text.
    ParseError,
}
