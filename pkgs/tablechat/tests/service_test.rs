// Copyright 2026 Tablechat Team.
//
// Tests for ChatService sends, read receipts and the lifecycle gate

use tablechat::{
    ChatConfig, ChatError, ChatService, PersistenceConfig, ReservationStatus, SenderRole,
};
use tempfile::NamedTempFile;

async fn create_test_service(path: &NamedTempFile) -> ChatService {
    let config = ChatConfig {
        persistence: PersistenceConfig {
            db_path: path.path().to_path_buf(),
            ..Default::default()
        },
        ..Default::default()
    };
    ChatService::open(&config)
        .await
        .expect("Failed to open chat service")
}

#[tokio::test]
async fn test_get_or_create_conversation_returns_same_id() {
    let temp_file = NamedTempFile::new().unwrap();
    let service = create_test_service(&temp_file).await;

    let first = service
        .get_or_create_conversation("u1", "r1", "res1")
        .await
        .unwrap();
    let second = service
        .get_or_create_conversation("u1", "r1", "res1")
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(service.list_conversations("u1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_conversation_needs_two_distinct_participants() {
    let temp_file = NamedTempFile::new().unwrap();
    let service = create_test_service(&temp_file).await;

    let result = service.get_or_create_conversation("owner-1", "owner-1", "res1").await;

    assert!(matches!(result, Err(ChatError::SameParticipant(id)) if id == "owner-1"));
    assert!(service.list_conversations("owner-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_send_message_round_trip() {
    let temp_file = NamedTempFile::new().unwrap();
    let service = create_test_service(&temp_file).await;
    let conv_id = service
        .get_or_create_conversation("u1", "r1", "res1")
        .await
        .unwrap();

    service
        .send_message(&conv_id, "u1", SenderRole::User, "hello")
        .await
        .unwrap();

    let messages = service.list_messages(&conv_id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, "hello");
    assert_eq!(messages[0].sender_role, SenderRole::User);
    assert_eq!(messages[0].sender_id, "u1");
    assert!(!messages[0].is_read);

    let conversation = service.get_conversation(&conv_id).await.unwrap();
    assert_eq!(conversation.last_message, "hello");
}

#[tokio::test]
async fn test_blank_message_is_rejected_before_storage() {
    let temp_file = NamedTempFile::new().unwrap();
    let service = create_test_service(&temp_file).await;
    let conv_id = service
        .get_or_create_conversation("u1", "r1", "res1")
        .await
        .unwrap();

    let result = service
        .send_message(&conv_id, "u1", SenderRole::User, "   \n\t ")
        .await;

    assert!(matches!(result, Err(ChatError::EmptyMessage)));
    assert!(service.list_messages(&conv_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_send_to_unknown_conversation() {
    let temp_file = NamedTempFile::new().unwrap();
    let service = create_test_service(&temp_file).await;

    let result = service
        .send_message("missing", "u1", SenderRole::User, "hi")
        .await;

    assert!(matches!(result, Err(ChatError::ConversationNotFound(id)) if id == "missing"));
}

#[tokio::test]
async fn test_closed_conversation_stores_nothing() {
    let temp_file = NamedTempFile::new().unwrap();
    let service = create_test_service(&temp_file).await;
    let conv_id = service
        .get_or_create_conversation("u1", "r1", "res1")
        .await
        .unwrap();
    service
        .send_message(&conv_id, "u1", SenderRole::User, "before closing")
        .await
        .unwrap();

    assert!(service.close_conversation(&conv_id).await.unwrap());

    let result = service
        .send_message(&conv_id, "r1", SenderRole::Restaurant, "too late")
        .await;

    match result {
        Err(ChatError::ConversationClosed { conversation_id }) => {
            assert_eq!(conversation_id, conv_id)
        }
        other => panic!("Expected ConversationClosed, got {:?}", other),
    }

    let messages = service.list_messages(&conv_id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, "before closing");

    let conversation = service.get_conversation(&conv_id).await.unwrap();
    assert_eq!(conversation.last_message, "before closing");
}

#[tokio::test]
async fn test_closing_twice_is_harmless() {
    let temp_file = NamedTempFile::new().unwrap();
    let service = create_test_service(&temp_file).await;
    let conv_id = service
        .get_or_create_conversation("u1", "r1", "res1")
        .await
        .unwrap();

    assert!(service.close_conversation(&conv_id).await.unwrap());
    assert!(!service.close_conversation(&conv_id).await.unwrap());
    assert!(!service.get_conversation(&conv_id).await.unwrap().is_active);
}

#[tokio::test]
async fn test_reservation_status_drives_lifecycle() {
    let temp_file = NamedTempFile::new().unwrap();
    let service = create_test_service(&temp_file).await;
    let conv_id = service
        .get_or_create_conversation("u1", "r1", "res1")
        .await
        .unwrap();

    assert!(!service
        .apply_reservation_status("res1", ReservationStatus::Confirmed)
        .await
        .unwrap());
    assert!(service.get_conversation(&conv_id).await.unwrap().is_active);

    assert!(service
        .apply_reservation_status("res1", ReservationStatus::Cancelled)
        .await
        .unwrap());
    assert!(!service.get_conversation(&conv_id).await.unwrap().is_active);

    // Reservations without a conversation are ignored
    assert!(!service
        .apply_reservation_status("res-unknown", ReservationStatus::Completed)
        .await
        .unwrap());

    let result = service
        .send_message(&conv_id, "u1", SenderRole::User, "still there?")
        .await;
    assert!(matches!(result, Err(ChatError::ConversationClosed { .. })));
}

#[tokio::test]
async fn test_mark_messages_as_read() {
    let temp_file = NamedTempFile::new().unwrap();
    let service = create_test_service(&temp_file).await;
    let conv_id = service
        .get_or_create_conversation("u1", "r1", "res1")
        .await
        .unwrap();

    let mut ids = Vec::new();
    for text in ["Table for two confirmed", "See you at 7"] {
        let message = service
            .send_message(&conv_id, "r1", SenderRole::Restaurant, text)
            .await
            .unwrap();
        ids.push(message.id);
    }

    assert_eq!(service.mark_messages_as_read(&conv_id, &ids).await.unwrap(), 2);
    assert_eq!(service.mark_messages_as_read(&conv_id, &ids).await.unwrap(), 0);

    let messages = service.list_messages(&conv_id).await.unwrap();
    assert!(messages.iter().all(|m| m.is_read));
}

#[tokio::test]
async fn test_conversation_list_is_most_recent_first() {
    let temp_file = NamedTempFile::new().unwrap();
    let service = create_test_service(&temp_file).await;

    let older = service
        .get_or_create_conversation("u1", "r1", "res1")
        .await
        .unwrap();
    let newer = service
        .get_or_create_conversation("u1", "r2", "res2")
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    service
        .send_message(&older, "u1", SenderRole::User, "bumping this one")
        .await
        .unwrap();

    let list = service.list_conversations("u1").await.unwrap();
    let ids: Vec<_> = list.iter().map(|c| c.id.clone()).collect();
    assert_eq!(ids, vec![older, newer]);
}

#[tokio::test]
async fn test_clock_survives_reopen() {
    let temp_file = NamedTempFile::new().unwrap();
    let conv_id;
    let first_sent;
    {
        let service = create_test_service(&temp_file).await;
        conv_id = service
            .get_or_create_conversation("u1", "r1", "res1")
            .await
            .unwrap();
        first_sent = service
            .send_message(&conv_id, "u1", SenderRole::User, "first")
            .await
            .unwrap();
    }

    let service = create_test_service(&temp_file).await;
    let second_sent = service
        .send_message(&conv_id, "u1", SenderRole::User, "second")
        .await
        .unwrap();

    assert!(second_sent.created_at >= first_sent.created_at);
    let texts: Vec<_> = service
        .list_messages(&conv_id)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.text)
        .collect();
    assert_eq!(texts, ["first", "second"]);
}
