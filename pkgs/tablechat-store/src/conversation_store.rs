//! Conversation store - one conversation per reservation

use crate::clock::MonotonicClock;
use crate::entities::conversations;
use crate::models::{Conversation, ConversationKind, Participants, Watermark};
use sea_orm::prelude::Expr;
use sea_orm::sea_query::SimpleExpr;
use sea_orm::*;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Outcome of [`ConversationStore::get_or_create`]
#[derive(Debug, Clone)]
pub struct Registration {
    pub conversation: Conversation,
    /// False when the conversation already existed, including when a
    /// concurrent caller won the insert.
    pub created: bool,
}

/// Conversation store
pub struct ConversationStore {
    pub(crate) db: DatabaseConnection,
    clock: Arc<MonotonicClock>,
}

impl ConversationStore {
    /// Create a conversation store with an existing database connection
    pub fn new(db: DatabaseConnection, clock: Arc<MonotonicClock>) -> Self {
        Self { db, clock }
    }

    /// Return the conversation for `reservation_id`, creating it when missing.
    ///
    /// The guest and the restaurant must be different participants.
    pub async fn get_or_create(
        &self,
        user_id: &str,
        restaurant_id: &str,
        reservation_id: &str,
    ) -> Result<Registration, DbErr> {
        let participants = Participants {
            user_id: user_id.to_string(),
            restaurant_id: restaurant_id.to_string(),
        };
        if !participants.are_distinct() {
            return Err(DbErr::Custom(format!(
                "Conversation for reservation {} needs two participants, got {} on both sides",
                reservation_id, user_id
            )));
        }

        if let Some(conversation) = self.find_by_reservation(reservation_id).await? {
            debug!(
                "Conversation {} already exists for reservation {}",
                conversation.id, reservation_id
            );
            return Ok(Registration {
                conversation,
                created: false,
            });
        }

        let roles_json = serde_json::to_string(&participants.roles())
            .map_err(|e| DbErr::Custom(format!("Failed to encode participant roles: {}", e)))?;
        let now = self.clock.now_millis();

        let new_conv = conversations::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            kind: Set(ConversationKind::Reservation.as_str().to_string()),
            reservation_id: Set(reservation_id.to_string()),
            user_id: Set(participants.user_id),
            restaurant_id: Set(participants.restaurant_id),
            participant_roles_json: Set(roles_json),
            last_message: Set(String::new()),
            last_message_at: Set(now),
            created_at: Set(now),
            is_active: Set(true),
            revision: Set(0),
        };

        match new_conv.insert(&self.db).await {
            Ok(model) => {
                info!(
                    "Created conversation {} for reservation {}",
                    model.id, reservation_id
                );
                Ok(Registration {
                    conversation: model.try_into()?,
                    created: true,
                })
            }
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                // Another caller inserted the same reservation between our lookup and insert
                info!(
                    "Conversation for reservation {} created concurrently, using existing one",
                    reservation_id
                );
                let conversation = self
                    .find_by_reservation(reservation_id)
                    .await?
                    .ok_or_else(|| {
                        DbErr::RecordNotFound(format!(
                            "conversation for reservation {} after concurrent insert",
                            reservation_id
                        ))
                    })?;
                Ok(Registration {
                    conversation,
                    created: false,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Get a single conversation by ID
    pub async fn get(&self, id: &str) -> Result<Option<Conversation>, DbErr> {
        conversations::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .map(Conversation::try_from)
            .transpose()
    }

    /// Get the conversation linked to a reservation
    pub async fn find_by_reservation(
        &self,
        reservation_id: &str,
    ) -> Result<Option<Conversation>, DbErr> {
        conversations::Entity::find()
            .filter(conversations::Column::ReservationId.eq(reservation_id))
            .one(&self.db)
            .await?
            .map(Conversation::try_from)
            .transpose()
    }

    /// All conversations where `user_id` is the guest. Unordered.
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Conversation>, DbErr> {
        let convs = conversations::Entity::find()
            .filter(conversations::Column::UserId.eq(user_id))
            .all(&self.db)
            .await?;

        debug!("Found {} conversations for user {}", convs.len(), user_id);
        convs.into_iter().map(Conversation::try_from).collect()
    }

    /// All conversations addressed to a restaurant. Unordered.
    pub async fn list_for_restaurant(
        &self,
        restaurant_id: &str,
    ) -> Result<Vec<Conversation>, DbErr> {
        let convs = conversations::Entity::find()
            .filter(conversations::Column::RestaurantId.eq(restaurant_id))
            .all(&self.db)
            .await?;

        debug!(
            "Found {} conversations for restaurant {}",
            convs.len(),
            restaurant_id
        );
        convs.into_iter().map(Conversation::try_from).collect()
    }

    /// Flip the lifecycle flag. Returns true when a row actually changed.
    pub async fn set_active(&self, id: &str, is_active: bool) -> Result<bool, DbErr> {
        let result = conversations::Entity::update_many()
            .col_expr(conversations::Column::IsActive, Expr::value(is_active))
            .col_expr(
                conversations::Column::Revision,
                Expr::col(conversations::Column::Revision).add(1),
            )
            .filter(conversations::Column::Id.eq(id))
            .filter(conversations::Column::IsActive.ne(is_active))
            .exec(&self.db)
            .await?;

        if result.rows_affected > 0 {
            info!("Conversation {} is_active set to {}", id, is_active);
        }
        Ok(result.rows_affected > 0)
    }

    /// Change marker for one conversation and its messages
    pub async fn watermark_of(&self, id: &str) -> Result<Watermark, DbErr> {
        self.watermark(conversations::Column::Id.eq(id)).await
    }

    /// Change marker for every conversation of a guest
    pub async fn watermark_for_user(&self, user_id: &str) -> Result<Watermark, DbErr> {
        self.watermark(conversations::Column::UserId.eq(user_id)).await
    }

    /// Change marker for every conversation of a restaurant
    pub async fn watermark_for_restaurant(&self, restaurant_id: &str) -> Result<Watermark, DbErr> {
        self.watermark(conversations::Column::RestaurantId.eq(restaurant_id))
            .await
    }

    // Revisions only grow and rows are never deleted, so (count, sum) changes
    // with every write in scope.
    async fn watermark(&self, scope: SimpleExpr) -> Result<Watermark, DbErr> {
        let row = conversations::Entity::find()
            .select_only()
            .column_as(Expr::col(conversations::Column::Id).count(), "conversations")
            .column_as(Expr::col(conversations::Column::Revision).sum(), "revisions")
            .filter(scope)
            .into_tuple::<(i64, Option<i64>)>()
            .one(&self.db)
            .await?;

        Ok(row
            .map(|(conversations, revisions)| Watermark {
                conversations,
                revisions: revisions.unwrap_or(0),
            })
            .unwrap_or_default())
    }
}
