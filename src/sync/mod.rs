pub mod api;
pub mod cache;
pub(crate) mod pipeline;
pub(crate) mod scheduler;
#[cfg(test)]
pub(crate) mod testing;

use reqwest::StatusCode;
use thiserror::Error;

use crate::core::note::Note;
use crate::core::tree::TreeError;

/// Why a sync operation failed.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("note {id} not found")]
    NotFound { id: String },
    #[error("server rejected the request with {status}: {body}")]
    Remote { status: StatusCode, body: String },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error(transparent)]
    Structural(#[from] TreeError),
}

impl SyncError {
    /// Whether retrying the same request might succeed. Client-side
    /// rejections and structural violations never heal on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Request(_) => true,
            SyncError::Remote { status, .. } => status.is_server_error(),
            SyncError::NotFound { .. } | SyncError::Structural(_) => false,
        }
    }
}

/// Notifications pushed to the embedding view layer.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A save round-trip completed; `note` is the server-merged copy.
    /// `created` is set when this was the note's first persist.
    Saved { note: Note, created: bool },
    /// A save was given up on after `attempts` tries.
    SaveFailed {
        id: String,
        attempts: u32,
        error: String,
    },
    /// A note was deleted and detached from the tree.
    Removed { id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_only_on_server_errors() {
        let server = SyncError::Remote {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: String::new(),
        };
        let client = SyncError::Remote {
            status: StatusCode::BAD_REQUEST,
            body: String::new(),
        };
        let missing = SyncError::NotFound {
            id: "n1".to_string(),
        };
        let structural = SyncError::Structural(TreeError::SelfParent {
            id: "n1".to_string(),
        });

        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert!(!missing.is_retryable());
        assert!(!structural.is_retryable());
    }
}
