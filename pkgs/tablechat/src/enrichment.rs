//! Display metadata for conversation lists
//!
//! Joins each conversation against the reservation and restaurant
//! read-models. Lookups that fail or come back empty fall back to
//! placeholders; enrichment never fails a batch and never writes.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tablechat_store::{Conversation, MessageStore};
use tracing::warn;

use crate::lifecycle::ReservationStatus;

pub const UNKNOWN_RESTAURANT: &str = "Unknown Restaurant";

/// Reservation as seen by the conversation list
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reservation {
    pub id: String,
    pub user_id: String,
    pub restaurant_id: String,
    /// Name cached on the reservation at booking time
    pub restaurant_name: Option<String>,
    pub restaurant_image: Option<String>,
    pub date: String,
    pub time: String,
    pub status: ReservationStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Restaurant {
    pub id: String,
    pub name: String,
    pub images: Vec<String>,
}

/// Read access to reservations owned by another system
#[async_trait]
pub trait ReservationDirectory: Send + Sync {
    async fn get_reservation(&self, id: &str) -> anyhow::Result<Option<Reservation>>;

    async fn list_reservations_for_user(&self, user_id: &str) -> anyhow::Result<Vec<Reservation>>;
}

/// Read access to restaurant profiles owned by another system
#[async_trait]
pub trait RestaurantDirectory: Send + Sync {
    async fn get_restaurant(&self, id: &str) -> anyhow::Result<Option<Restaurant>>;
}

/// A conversation plus the labels a list view needs
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConversationView {
    pub conversation: Conversation,
    pub restaurant_name: String,
    pub restaurant_image: Option<String>,
    pub reservation_date: Option<String>,
    pub reservation_time: Option<String>,
    pub unread_count: u64,
}

#[derive(Clone)]
pub struct Enricher {
    messages: Arc<MessageStore>,
    reservations: Arc<dyn ReservationDirectory>,
    restaurants: Arc<dyn RestaurantDirectory>,
}

impl Enricher {
    pub fn new(
        messages: Arc<MessageStore>,
        reservations: Arc<dyn ReservationDirectory>,
        restaurants: Arc<dyn RestaurantDirectory>,
    ) -> Self {
        Self {
            messages,
            reservations,
            restaurants,
        }
    }

    /// Enrich every conversation concurrently. Output order matches input.
    pub async fn enrich(
        &self,
        conversations: Vec<Conversation>,
        viewer_id: &str,
    ) -> Vec<ConversationView> {
        join_all(
            conversations
                .into_iter()
                .map(|conversation| self.enrich_one(conversation, viewer_id)),
        )
        .await
    }

    async fn enrich_one(&self, conversation: Conversation, viewer_id: &str) -> ConversationView {
        let (reservation, restaurant, unread) = tokio::join!(
            self.reservations.get_reservation(&conversation.reservation_id),
            self.restaurants
                .get_restaurant(&conversation.participants.restaurant_id),
            self.messages.unread_count(&conversation.id, viewer_id),
        );

        let reservation = reservation.unwrap_or_else(|e| {
            warn!(
                "Enrichment degraded: reservation {} lookup failed: {}",
                conversation.reservation_id, e
            );
            None
        });
        let restaurant = restaurant.unwrap_or_else(|e| {
            warn!(
                "Enrichment degraded: restaurant {} lookup failed: {}",
                conversation.participants.restaurant_id, e
            );
            None
        });
        let unread_count = unread.unwrap_or_else(|e| {
            warn!(
                "Enrichment degraded: unread count for {} failed: {}",
                conversation.id, e
            );
            0
        });

        let restaurant_name = restaurant
            .as_ref()
            .map(|r| r.name.clone())
            .filter(|name| !name.is_empty())
            .or_else(|| {
                reservation
                    .as_ref()
                    .and_then(|r| r.restaurant_name.clone())
                    .filter(|name| !name.is_empty())
            })
            .unwrap_or_else(|| UNKNOWN_RESTAURANT.to_string());

        let restaurant_image = restaurant
            .as_ref()
            .and_then(|r| r.images.first().cloned())
            .or_else(|| reservation.as_ref().and_then(|r| r.restaurant_image.clone()));

        ConversationView {
            restaurant_name,
            restaurant_image,
            reservation_date: reservation.as_ref().map(|r| r.date.clone()),
            reservation_time: reservation.as_ref().map(|r| r.time.clone()),
            unread_count,
            conversation,
        }
    }
}
