//! Error types for conversation operations

use sea_orm::DbErr;
use thiserror::Error;

/// Errors surfaced to callers of [`crate::ChatService`].
///
/// Degraded enrichment is not represented here: it falls back to placeholder
/// labels and is only logged.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Message text is empty")]
    EmptyMessage,
    #[error("Conversation {conversation_id} is closed")]
    ConversationClosed { conversation_id: String },
    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("Guest and restaurant are the same participant: {0}")]
    SameParticipant(String),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] DbErr),
}

impl ChatError {
    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::StorageUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
