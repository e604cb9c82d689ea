use thiserror::Error;

use pacemaker_core::types::TaskKind;

#[derive(Debug, Error, Clone)]
pub enum TaskError {
    #[error("no handler registered for task kind {0:?}")]
    NoHandler(TaskKind),
    #[error("task failed terminally after {attempts} attempts: {message}")]
    TerminalFailure { attempts: u32, message: String },
    #[error("task runner is shutting down")]
    ShuttingDown,
}

pub type Result<T> = std::result::Result<T, TaskError>;
