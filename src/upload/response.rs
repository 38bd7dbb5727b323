//! Upload errors and their retry classification

use thiserror::Error;

/// Statuses that will fail the same way no matter how often they are retried
const TERMINAL_STATUSES: [u16; 4] = [400, 401, 404, 422];

/// Error returned by a single upload attempt
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    #[error("server responded {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(_) => None,
        }
    }

    /// Transport failures and statuses other than bad request, unauthorized,
    /// not found and unprocessable are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Status { status, .. } => !TERMINAL_STATUSES.contains(status),
            ApiError::Transport(_) => true,
        }
    }
}

/// Why a pipeline could not be uploaded
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("pipeline upload rejected: {0}")]
    Rejected(#[source] ApiError),

    #[error("pipeline upload failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: ApiError,
    },

    #[error("pipeline upload cancelled")]
    Cancelled,

    #[error("failed to serialize pipeline: {0}")]
    Serialize(#[from] serde_json::Error),
}
