//! Tablechat - conversations between a guest and a restaurant about one reservation
//!
//! [`ChatService`] ties the storage layer in `tablechat-store` to a change
//! feed so clients can hold live, full-snapshot subscriptions to a message
//! list or a conversation list. Writes from other processes sharing the
//! database reach subscribers through periodic storage polling. Sends go through a lifecycle gate: once the
//! reservation is completed or cancelled its conversation is closed and
//! further messages are rejected.
//!
//! Presentation helpers live in [`transcript`] (date-grouped messages) and
//! [`enrichment`] (restaurant and reservation labels for list views).

pub mod enrichment;
pub mod error;
pub mod lifecycle;
pub mod service;
pub mod subscription;
pub mod transcript;

pub use enrichment::{
    ConversationView, Enricher, Reservation, ReservationDirectory, Restaurant,
    RestaurantDirectory, UNKNOWN_RESTAURANT,
};
pub use error::{ChatError, Result};
pub use lifecycle::{ConversationState, ReservationStatus};
pub use service::ChatService;
pub use subscription::{ChangeKind, StoreChange, Subscription};
pub use transcript::{group_by_date, group_local, DateGroup, EMPTY_TRANSCRIPT_NOTICE};

pub use tablechat_store::{
    Conversation, ConversationKind, ConversationMessage, ParticipantRole, Participants,
    PersistenceConfig, SenderRole, Watermark,
};

use std::time::Duration;

/// Service configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub persistence: PersistenceConfig,

    /// Pending change notifications kept per subscriber before it lags (default: 256)
    pub change_feed_capacity: usize,

    /// How often live subscriptions check storage for writes made by other
    /// services or processes (default: 500ms)
    pub poll_interval: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            persistence: PersistenceConfig::default(),
            change_feed_capacity: 256,
            poll_interval: Duration::from_millis(500),
        }
    }
}
