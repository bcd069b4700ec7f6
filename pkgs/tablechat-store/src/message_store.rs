//! Message store - ordered messages of a conversation

use crate::clock::MonotonicClock;
use crate::entities::{conversation_messages, conversations};
use crate::models::{ConversationMessage, MessageText, SenderRole};
use sea_orm::prelude::Expr;
use sea_orm::*;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Message store - manages persistent message storage
pub struct MessageStore {
    pub(crate) db: DatabaseConnection,
    clock: Arc<MonotonicClock>,
}

impl MessageStore {
    /// Create a message store with an existing database connection
    pub fn new(db: DatabaseConnection, clock: Arc<MonotonicClock>) -> Self {
        Self { db, clock }
    }

    /// Append a message and refresh the conversation's last-message cache.
    ///
    /// Both writes happen in one transaction. The cache only moves forward,
    /// so a slower concurrent sender cannot regress it. Whether the
    /// conversation is still active is not checked here.
    pub async fn append(
        &self,
        conversation_id: &str,
        sender_id: &str,
        sender_role: SenderRole,
        text: MessageText,
    ) -> Result<ConversationMessage, DbErr> {
        let txn = self.db.begin().await?;
        let created_at = self.clock.now_millis();
        let preview = text.as_str().to_string();

        let message = conversation_messages::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            conversation_id: Set(conversation_id.to_string()),
            sender_id: Set(sender_id.to_string()),
            sender_role: Set(sender_role.as_str().to_string()),
            text: Set(text.into_inner()),
            created_at: Set(created_at),
            is_read: Set(false),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        conversations::Entity::update_many()
            .col_expr(conversations::Column::LastMessage, Expr::value(preview))
            .col_expr(conversations::Column::LastMessageAt, Expr::value(created_at))
            .filter(conversations::Column::Id.eq(conversation_id))
            .filter(conversations::Column::LastMessageAt.lte(created_at))
            .exec(&txn)
            .await?;
        bump_revision(&txn, conversation_id).await?;

        txn.commit().await?;

        debug!(
            "Stored message {} in conversation {} (seq {})",
            message.id, conversation_id, message.seq
        );
        message.try_into()
    }

    /// All messages of a conversation, oldest first
    pub async fn list(&self, conversation_id: &str) -> Result<Vec<ConversationMessage>, DbErr> {
        let messages = conversation_messages::Entity::find()
            .filter(conversation_messages::Column::ConversationId.eq(conversation_id))
            .order_by_asc(conversation_messages::Column::CreatedAt)
            .order_by_asc(conversation_messages::Column::Seq)
            .all(&self.db)
            .await?;

        debug!(
            "Retrieved {} messages from conversation {}",
            messages.len(),
            conversation_id
        );
        messages
            .into_iter()
            .map(ConversationMessage::try_from)
            .collect()
    }

    /// Get message by ID
    pub async fn get(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<Option<ConversationMessage>, DbErr> {
        conversation_messages::Entity::find()
            .filter(conversation_messages::Column::ConversationId.eq(conversation_id))
            .filter(conversation_messages::Column::Id.eq(message_id))
            .one(&self.db)
            .await?
            .map(ConversationMessage::try_from)
            .transpose()
    }

    /// Mark messages as read. Already-read messages and ids from other
    /// conversations are left alone. Returns how many rows changed; the
    /// conversation revision only moves when that is non-zero.
    pub async fn mark_read(
        &self,
        conversation_id: &str,
        message_ids: &[String],
    ) -> Result<u64, DbErr> {
        if message_ids.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin().await?;
        let result = conversation_messages::Entity::update_many()
            .col_expr(conversation_messages::Column::IsRead, Expr::value(true))
            .filter(conversation_messages::Column::ConversationId.eq(conversation_id))
            .filter(conversation_messages::Column::Id.is_in(message_ids.iter().cloned()))
            .filter(conversation_messages::Column::IsRead.eq(false))
            .exec(&txn)
            .await?;
        if result.rows_affected > 0 {
            bump_revision(&txn, conversation_id).await?;
        }
        txn.commit().await?;

        debug!(
            "Marked {} of {} messages as read in conversation {}",
            result.rows_affected,
            message_ids.len(),
            conversation_id
        );
        Ok(result.rows_affected)
    }

    /// Unread messages in a conversation that were not sent by `viewer_id`
    pub async fn unread_count(&self, conversation_id: &str, viewer_id: &str) -> Result<u64, DbErr> {
        conversation_messages::Entity::find()
            .filter(conversation_messages::Column::ConversationId.eq(conversation_id))
            .filter(conversation_messages::Column::SenderId.ne(viewer_id))
            .filter(conversation_messages::Column::IsRead.eq(false))
            .count(&self.db)
            .await
    }
}

async fn bump_revision<C: ConnectionTrait>(db: &C, conversation_id: &str) -> Result<(), DbErr> {
    conversations::Entity::update_many()
        .col_expr(
            conversations::Column::Revision,
            Expr::col(conversations::Column::Revision).add(1),
        )
        .filter(conversations::Column::Id.eq(conversation_id))
        .exec(db)
        .await?;
    Ok(())
}
