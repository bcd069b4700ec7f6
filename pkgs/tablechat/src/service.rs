//! Conversation service: registry, gated sends, read receipts and live feeds

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sea_orm::{DatabaseConnection, DbErr};
use tablechat_store::{
    Conversation, ConversationMessage, ConversationStore, MessageStore, MessageText,
    MonotonicClock, Participants, SenderRole, Watermark,
};
use tracing::{debug, info, instrument};

use crate::enrichment::{ConversationView, Enricher, ReservationDirectory, RestaurantDirectory};
use crate::error::{ChatError, Result};
use crate::lifecycle::{ensure_open, ReservationStatus};
use crate::subscription::{
    sort_by_recent_activity, ChangeFeed, ChangeKind, ChangeSource, StoreChange, Subscription,
};
use crate::ChatConfig;

/// Entry point for everything a client does with reservation conversations
pub struct ChatService {
    conversations: Arc<ConversationStore>,
    messages: Arc<MessageStore>,
    feed: ChangeFeed,
    poll_interval: Duration,
}

impl ChatService {
    /// Open the configured database and start a service on it
    pub async fn open(config: &ChatConfig) -> Result<Self> {
        let db = tablechat_store::connect(&config.persistence).await?;
        Self::with_connection(db, config).await
    }

    /// Start a service on an already migrated connection.
    /// `config.persistence` is not used.
    pub async fn with_connection(db: DatabaseConnection, config: &ChatConfig) -> Result<Self> {
        let clock = Arc::new(MonotonicClock::seeded_from(&db).await?);

        Ok(Self {
            conversations: Arc::new(ConversationStore::new(db.clone(), clock.clone())),
            messages: Arc::new(MessageStore::new(db, clock)),
            feed: ChangeFeed::new(config.change_feed_capacity),
            poll_interval: config.poll_interval,
        })
    }

    /// Id of the conversation for a reservation, created on first use
    #[instrument(skip(self))]
    pub async fn get_or_create_conversation(
        &self,
        user_id: &str,
        restaurant_id: &str,
        reservation_id: &str,
    ) -> Result<String> {
        let participants = Participants {
            user_id: user_id.to_string(),
            restaurant_id: restaurant_id.to_string(),
        };
        if !participants.are_distinct() {
            return Err(ChatError::SameParticipant(user_id.to_string()));
        }

        let registration = self
            .conversations
            .get_or_create(user_id, restaurant_id, reservation_id)
            .await?;

        if registration.created {
            self.feed.publish(StoreChange::for_conversation(
                ChangeKind::ConversationCreated,
                &registration.conversation,
            ));
        }
        Ok(registration.conversation.id)
    }

    pub async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation> {
        self.conversations
            .get(conversation_id)
            .await?
            .ok_or_else(|| ChatError::ConversationNotFound(conversation_id.to_string()))
    }

    /// Conversations of a guest, most recently active first
    pub async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let mut conversations = self.conversations.list_for_user(user_id).await?;
        sort_by_recent_activity(&mut conversations);
        Ok(conversations)
    }

    /// Messages of a conversation, oldest first
    pub async fn list_messages(&self, conversation_id: &str) -> Result<Vec<ConversationMessage>> {
        Ok(self.messages.list(conversation_id).await?)
    }

    /// Validate, check the lifecycle gate, then append.
    ///
    /// Blank text and closed conversations are rejected before anything is
    /// written.
    #[instrument(skip(self, text))]
    pub async fn send_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        sender_role: SenderRole,
        text: &str,
    ) -> Result<ConversationMessage> {
        let text = MessageText::parse(text).ok_or(ChatError::EmptyMessage)?;
        let conversation = self.get_conversation(conversation_id).await?;
        ensure_open(&conversation)?;

        let message = self
            .messages
            .append(conversation_id, sender_id, sender_role, text)
            .await?;

        self.feed.publish(StoreChange::for_conversation(
            ChangeKind::MessageAppended,
            &conversation,
        ));
        Ok(message)
    }

    /// Mark messages read. Returns how many were newly marked.
    #[instrument(skip(self))]
    pub async fn mark_messages_as_read(
        &self,
        conversation_id: &str,
        message_ids: &[String],
    ) -> Result<u64> {
        let conversation = self.get_conversation(conversation_id).await?;
        let changed = self.messages.mark_read(conversation_id, message_ids).await?;

        if changed > 0 {
            self.feed.publish(StoreChange::for_conversation(
                ChangeKind::MessagesRead,
                &conversation,
            ));
        }
        Ok(changed)
    }

    /// Close a conversation for good. Returns false if it was already closed.
    #[instrument(skip(self))]
    pub async fn close_conversation(&self, conversation_id: &str) -> Result<bool> {
        let conversation = self.get_conversation(conversation_id).await?;
        let closed = self.conversations.set_active(conversation_id, false).await?;

        if closed {
            info!("Conversation {} closed", conversation_id);
            self.feed.publish(StoreChange::for_conversation(
                ChangeKind::ConversationClosed,
                &conversation,
            ));
        }
        Ok(closed)
    }

    /// React to a reservation status change coming from the reservation system.
    /// Returns true if a conversation was closed.
    #[instrument(skip(self))]
    pub async fn apply_reservation_status(
        &self,
        reservation_id: &str,
        status: ReservationStatus,
    ) -> Result<bool> {
        if !status.closes_conversation() {
            return Ok(false);
        }
        match self.conversations.find_by_reservation(reservation_id).await? {
            Some(conversation) => self.close_conversation(&conversation.id).await,
            None => {
                debug!("No conversation for reservation {}", reservation_id);
                Ok(false)
            }
        }
    }

    /// Live ordered message list. The current snapshot is delivered before
    /// this returns, then again after every append or read change, whichever
    /// process made it. A failed refresh is delivered as an error.
    pub async fn subscribe_messages<F>(
        &self,
        conversation_id: &str,
        mut on_update: F,
    ) -> Result<Subscription>
    where
        F: FnMut(Result<Vec<ConversationMessage>>) + Send + 'static,
    {
        // Attach before loading so nothing written in between is missed
        let receiver = self.feed.subscribe();

        let conversations = self.conversations.clone();
        let id = conversation_id.to_string();
        let watermark = move || {
            let store = conversations.clone();
            let id = id.clone();
            async move { store.watermark_of(&id).await }
        };

        let store = self.messages.clone();
        let id = conversation_id.to_string();
        let load = move || {
            let store = store.clone();
            let id = id.clone();
            async move { store.list(&id).await }
        };

        let seen = watermark().await?;
        on_update(Ok(load().await?));
        debug!("Subscribed to messages of {}", conversation_id);

        let watched = conversation_id.to_string();
        Ok(Subscription::spawn(
            self.change_source(
                receiver,
                move |change| change.affects_messages_of(&watched),
                watermark,
                seen,
            ),
            load,
            on_update,
        ))
    }

    /// Live conversation list of a guest, most recently active first
    pub async fn subscribe_conversations<F>(&self, user_id: &str, on_update: F) -> Result<Subscription>
    where
        F: FnMut(Result<Vec<Conversation>>) + Send + 'static,
    {
        let watched = user_id.to_string();
        self.subscribe_list(
            user_id,
            move |change| change.user_id == watched,
            |store, id| async move { store.watermark_for_user(&id).await },
            |store, id| async move { store.list_for_user(&id).await },
            on_update,
        )
        .await
    }

    /// Live conversation list of a restaurant, most recently active first
    pub async fn subscribe_restaurant_conversations<F>(
        &self,
        restaurant_id: &str,
        on_update: F,
    ) -> Result<Subscription>
    where
        F: FnMut(Result<Vec<Conversation>>) + Send + 'static,
    {
        let watched = restaurant_id.to_string();
        self.subscribe_list(
            restaurant_id,
            move |change| change.restaurant_id == watched,
            |store, id| async move { store.watermark_for_restaurant(&id).await },
            |store, id| async move { store.list_for_restaurant(&id).await },
            on_update,
        )
        .await
    }

    /// Live guest conversation list with display labels and unread counts
    pub async fn subscribe_conversation_views<F>(
        &self,
        user_id: &str,
        enricher: Enricher,
        mut on_update: F,
    ) -> Result<Subscription>
    where
        F: FnMut(Result<Vec<ConversationView>>) + Send + 'static,
    {
        let receiver = self.feed.subscribe();

        let store = self.conversations.clone();
        let viewer = user_id.to_string();
        let watermark = move || {
            let store = store.clone();
            let viewer = viewer.clone();
            async move { store.watermark_for_user(&viewer).await }
        };

        let store = self.conversations.clone();
        let viewer = user_id.to_string();
        let load = move || {
            let store = store.clone();
            let enricher = enricher.clone();
            let viewer = viewer.clone();
            async move {
                let mut conversations = store.list_for_user(&viewer).await?;
                sort_by_recent_activity(&mut conversations);
                Ok::<_, DbErr>(enricher.enrich(conversations, &viewer).await)
            }
        };

        let seen = watermark().await?;
        on_update(Ok(load().await?));

        let watched = user_id.to_string();
        Ok(Subscription::spawn(
            self.change_source(
                receiver,
                move |change| change.user_id == watched,
                watermark,
                seen,
            ),
            load,
            on_update,
        ))
    }

    /// Enricher backed by this service's message store
    pub fn enricher(
        &self,
        reservations: Arc<dyn ReservationDirectory>,
        restaurants: Arc<dyn RestaurantDirectory>,
    ) -> Enricher {
        Enricher::new(self.messages.clone(), reservations, restaurants)
    }

    async fn subscribe_list<M, WQ, WFut, Q, Fut, F>(
        &self,
        scope_id: &str,
        is_relevant: M,
        watermark_query: WQ,
        query: Q,
        mut on_update: F,
    ) -> Result<Subscription>
    where
        M: Fn(&StoreChange) -> bool + Send + 'static,
        WQ: Fn(Arc<ConversationStore>, String) -> WFut + Send + Sync + 'static,
        WFut: Future<Output = std::result::Result<Watermark, DbErr>> + Send + 'static,
        Q: Fn(Arc<ConversationStore>, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Vec<Conversation>, DbErr>> + Send + 'static,
        F: FnMut(Result<Vec<Conversation>>) + Send + 'static,
    {
        let receiver = self.feed.subscribe();

        let store = self.conversations.clone();
        let scope = scope_id.to_string();
        let watermark = move || watermark_query(store.clone(), scope.clone());

        let store = self.conversations.clone();
        let scope = scope_id.to_string();
        let load = move || {
            let fetch = query(store.clone(), scope.clone());
            async move {
                let mut conversations = fetch.await?;
                sort_by_recent_activity(&mut conversations);
                Ok::<_, DbErr>(conversations)
            }
        };

        let seen = watermark().await?;
        on_update(Ok(load().await?));
        debug!("Subscribed to conversation list of {}", scope_id);

        Ok(Subscription::spawn(
            self.change_source(receiver, is_relevant, watermark, seen),
            load,
            on_update,
        ))
    }

    fn change_source<M, W>(
        &self,
        receiver: tokio::sync::broadcast::Receiver<StoreChange>,
        is_relevant: M,
        watermark: W,
        seen: Watermark,
    ) -> ChangeSource<M, W>
    where
        M: Fn(&StoreChange) -> bool + Send + 'static,
    {
        ChangeSource {
            receiver,
            is_relevant,
            watermark,
            poll_interval: self.poll_interval,
            seen,
        }
    }
}
