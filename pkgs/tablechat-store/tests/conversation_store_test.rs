// Copyright 2026 Tablechat Team.
//
// Tests for ConversationStore

use std::sync::Arc;

use tablechat_store::{
    ConversationKind, ConversationStore, MonotonicClock, ParticipantRole, PersistenceConfig,
    Watermark,
};
use tempfile::NamedTempFile;

async fn create_test_store(path: &NamedTempFile) -> ConversationStore {
    let config = PersistenceConfig {
        db_path: path.path().to_path_buf(),
        ..Default::default()
    };
    let db = tablechat_store::connect(&config)
        .await
        .expect("Failed to open database");

    ConversationStore::new(db, Arc::new(MonotonicClock::new()))
}

#[tokio::test]
async fn test_get_or_create_new_conversation() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = create_test_store(&temp_file).await;

    let registration = store
        .get_or_create("user-1", "resto-1", "res-1")
        .await
        .expect("Failed to create conversation");

    assert!(registration.created);
    let conv = registration.conversation;
    assert_eq!(conv.kind, ConversationKind::Reservation);
    assert_eq!(conv.reservation_id, "res-1");
    assert_eq!(conv.participants.user_id, "user-1");
    assert_eq!(conv.participants.restaurant_id, "resto-1");
    assert_eq!(conv.participant_roles["user-1"], ParticipantRole::User);
    assert_eq!(conv.participant_roles["resto-1"], ParticipantRole::Restaurant);
    assert_eq!(conv.last_message, "");
    assert_eq!(conv.last_message_at, conv.created_at);
    assert!(conv.is_active);
}

#[tokio::test]
async fn test_get_or_create_is_idempotent() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = create_test_store(&temp_file).await;

    let first = store
        .get_or_create("user-1", "resto-1", "res-1")
        .await
        .unwrap();
    let second = store
        .get_or_create("user-1", "resto-1", "res-1")
        .await
        .unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.conversation.id, second.conversation.id);

    let all = store.list_for_user("user-1").await.unwrap();
    assert_eq!(all.len(), 1, "Only one conversation per reservation");
}

#[tokio::test]
async fn test_get_or_create_from_restaurant_side_reuses_conversation() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = create_test_store(&temp_file).await;

    let from_guest = store
        .get_or_create("user-1", "resto-1", "res-1")
        .await
        .unwrap();
    let from_staff = store
        .get_or_create("user-1", "resto-1", "res-1")
        .await
        .unwrap();

    assert_eq!(from_guest.conversation.id, from_staff.conversation.id);
}

#[tokio::test]
async fn test_concurrent_get_or_create_yields_single_conversation() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = Arc::new(create_test_store(&temp_file).await);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.get_or_create("user-1", "resto-1", "res-race").await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        // Lock contention may surface as a storage error; only successful calls are compared
        if let Ok(registration) = handle.await.unwrap() {
            ids.push(registration.conversation.id);
        }
    }

    assert!(!ids.is_empty());
    assert!(ids.iter().all(|id| id == &ids[0]));

    let stored = store.list_for_restaurant("resto-1").await.unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn test_find_by_reservation_and_get() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = create_test_store(&temp_file).await;

    assert!(store.find_by_reservation("res-1").await.unwrap().is_none());

    let created = store
        .get_or_create("user-1", "resto-1", "res-1")
        .await
        .unwrap()
        .conversation;

    let by_reservation = store.find_by_reservation("res-1").await.unwrap().unwrap();
    assert_eq!(by_reservation.id, created.id);

    let by_id = store.get(&created.id).await.unwrap().unwrap();
    assert_eq!(by_id, created);

    assert!(store.get("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_list_for_user_and_restaurant() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = create_test_store(&temp_file).await;

    store.get_or_create("alice", "resto-1", "res-1").await.unwrap();
    store.get_or_create("alice", "resto-2", "res-2").await.unwrap();
    store.get_or_create("bob", "resto-1", "res-3").await.unwrap();

    assert_eq!(store.list_for_user("alice").await.unwrap().len(), 2);
    assert_eq!(store.list_for_user("bob").await.unwrap().len(), 1);
    assert_eq!(store.list_for_user("carol").await.unwrap().len(), 0);
    assert_eq!(store.list_for_restaurant("resto-1").await.unwrap().len(), 2);
    assert_eq!(store.list_for_restaurant("resto-2").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_set_active() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = create_test_store(&temp_file).await;

    let conv = store
        .get_or_create("user-1", "resto-1", "res-1")
        .await
        .unwrap()
        .conversation;

    assert!(store.set_active(&conv.id, false).await.unwrap());
    // Second close changes nothing
    assert!(!store.set_active(&conv.id, false).await.unwrap());
    assert!(!store.set_active("missing", false).await.unwrap());

    let closed = store.get(&conv.id).await.unwrap().unwrap();
    assert!(!closed.is_active);
}

#[tokio::test]
async fn test_get_or_create_rejects_same_participant_on_both_sides() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = create_test_store(&temp_file).await;

    let result = store.get_or_create("owner-1", "owner-1", "res-1").await;

    assert!(result.is_err());
    assert!(store.find_by_reservation("res-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_watermarks_track_scope() {
    let temp_file = NamedTempFile::new().unwrap();
    let store = create_test_store(&temp_file).await;
    assert_eq!(
        store.watermark_for_user("user-1").await.unwrap(),
        Watermark::default()
    );

    let conv = store
        .get_or_create("user-1", "resto-1", "res-1")
        .await
        .unwrap()
        .conversation;
    let user_mark = store.watermark_for_user("user-1").await.unwrap();
    let restaurant_mark = store.watermark_for_restaurant("resto-1").await.unwrap();
    assert_eq!(user_mark.conversations, 1);
    assert_eq!(restaurant_mark.conversations, 1);

    // Another guest's conversation leaves user-1's scope alone
    store
        .get_or_create("user-2", "resto-1", "res-2")
        .await
        .unwrap();
    assert_eq!(store.watermark_for_user("user-1").await.unwrap(), user_mark);
    assert_ne!(
        store.watermark_for_restaurant("resto-1").await.unwrap(),
        restaurant_mark
    );

    // Closing is a change, closing again is not
    store.set_active(&conv.id, false).await.unwrap();
    let closed = store.watermark_for_user("user-1").await.unwrap();
    assert_ne!(closed, user_mark);
    store.set_active(&conv.id, false).await.unwrap();
    assert_eq!(store.watermark_for_user("user-1").await.unwrap(), closed);
}
