//! Tablechat Store - persistent storage for reservation conversations
//!
//! This crate provides SQLite-based storage for the conversation attached to a
//! restaurant reservation and the messages exchanged in it, using Sea-ORM.
//!
//! # Architecture
//!
//! - **ConversationStore**: at most one conversation per reservation, created
//!   idempotently, plus the lifecycle flag and last-message cache
//! - **MessageStore**: append-only, totally ordered messages with read flags
//! - **MonotonicClock**: the single timestamp authority for both stores
//!
//! # Database Schema
//!
//! - `conversations`: participants, lifecycle flag, last-message preview.
//!   `reservation_id` is unique. `revision` grows with every write to the
//!   conversation or its messages and backs [`Watermark`] change detection.
//! - `conversation_messages`: message text, sender, read flag. Ordered by
//!   `created_at`, ties broken by the auto-incremented `seq`.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tablechat_store::{
//!     ConversationStore, MessageStore, MessageText, MonotonicClock, PersistenceConfig, SenderRole,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = tablechat_store::connect(&PersistenceConfig::default()).await?;
//! let clock = Arc::new(MonotonicClock::seeded_from(&db).await?);
//!
//! let conversations = ConversationStore::new(db.clone(), clock.clone());
//! let messages = MessageStore::new(db, clock);
//!
//! let registration = conversations
//!     .get_or_create("user-1", "restaurant-7", "reservation-42")
//!     .await?;
//! let text = MessageText::parse("Can we bring a cake?").expect("non-empty");
//! messages
//!     .append(&registration.conversation.id, "user-1", SenderRole::User, text)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod conversation_store;
pub mod entities;
pub mod message_store;
pub mod migration;
pub mod models;

pub use clock::MonotonicClock;
pub use conversation_store::{ConversationStore, Registration};
pub use message_store::MessageStore;
pub use models::{
    Conversation, ConversationKind, ConversationMessage, MessageText, ParticipantRole,
    Participants, SenderRole, Watermark,
};

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use tracing::info;

/// Configuration for persistence layer
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Path to the SQLite database file
    pub db_path: std::path::PathBuf,

    /// Maximum pooled connections (default: 5)
    pub max_connections: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            db_path: std::path::PathBuf::from("tablechat.db"),
            max_connections: 5,
        }
    }
}

/// Open (or create) the database and bring the schema up to date
pub async fn connect(config: &PersistenceConfig) -> Result<DatabaseConnection, DbErr> {
    let db_path_str = config
        .db_path
        .to_str()
        .ok_or_else(|| DbErr::Custom(format!("Invalid database path: {:?}", config.db_path)))?
        .replace("\\", "/");

    let db_url = format!("sqlite:{}?mode=rwc", db_path_str);

    let mut options = ConnectOptions::new(db_url);
    options
        .max_connections(config.max_connections)
        .sqlx_logging(false);

    let db = Database::connect(options).await?;

    migration::Migrator::up(&db, None).await?;

    info!("Conversation store initialized at {}", config.db_path.display());
    Ok(db)
}
