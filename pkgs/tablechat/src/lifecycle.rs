//! Active/closed lifecycle of a conversation

use serde::{Deserialize, Serialize};
use tablechat_store::Conversation;

use crate::error::{ChatError, Result};

/// Messaging state of a conversation. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    Active,
    Closed,
}

impl ConversationState {
    pub fn of(conversation: &Conversation) -> Self {
        if conversation.is_active {
            ConversationState::Active
        } else {
            ConversationState::Closed
        }
    }

    pub fn accepts_messages(&self) -> bool {
        matches!(self, ConversationState::Active)
    }
}

/// Reject writes against a closed conversation
pub fn ensure_open(conversation: &Conversation) -> Result<()> {
    if ConversationState::of(conversation).accepts_messages() {
        Ok(())
    } else {
        Err(ChatError::ConversationClosed {
            conversation_id: conversation.id.clone(),
        })
    }
}

/// Status of the reservation a conversation belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl ReservationStatus {
    /// Completed and cancelled reservations close their conversation
    pub fn closes_conversation(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Completed | ReservationStatus::Cancelled
        )
    }
}
