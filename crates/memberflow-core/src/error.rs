//! Error types shared by every MemberFlow crate.

use thiserror::Error;

/// Workspace-wide error.
#[derive(Debug, Error)]
pub enum MemberFlowError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// A lifecycle command that the job's current status does not allow.
    #[error("Cannot {action} job {job_id} while it is {from}")]
    InvalidTransition {
        job_id: String,
        from: String,
        action: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MemberFlowError>;
