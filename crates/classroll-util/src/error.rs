//! Error types for classroll

use thiserror::Error;

use crate::SubjectId;

/// Core error type for classroll operations
#[derive(Debug, Error)]
pub enum ClassrollError {
    #[error("Batch has no session key (meet code)")]
    MissingSessionKey,

    #[error("Subject not found: {0}")]
    UnknownSubject(SubjectId),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClassrollError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ClassrollError>;
