// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use remodel_rag::conversation::{
    ConversationError, ConversationLog, ConversationStore, ConversationTurn, Role,
};
use remodel_rag::vision::ImageObservation;

#[tokio::test]
async fn test_same_unknown_id_twice_gives_two_new_ids() {
    let store = ConversationStore::new();
    let first = store
        .append(Some("not-a-real-id"), ConversationTurn::user("hello"))
        .await
        .unwrap();
    let second = store
        .append(Some("not-a-real-id"), ConversationTurn::user("hello again"))
        .await
        .unwrap();

    assert_ne!(first, second);
    assert_eq!(store.get(&first).await.unwrap().turns.len(), 1);
    assert_eq!(store.get(&second).await.unwrap().turns.len(), 1);
    assert!(!store.contains("not-a-real-id").await);
}

#[tokio::test]
async fn test_known_id_appends_in_order() {
    let store = ConversationStore::new();
    let id = store.append(None, ConversationTurn::user("q1")).await.unwrap();
    assert_eq!(
        store.append(Some(&id), ConversationTurn::assistant("a1")).await.unwrap(),
        id
    );
    assert_eq!(
        store.append(Some(&id), ConversationTurn::user("q2")).await.unwrap(),
        id
    );

    let conversation = store.get(&id).await.unwrap();
    let roles: Vec<Role> = conversation.turns.iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
    assert!(conversation
        .turns
        .windows(2)
        .all(|w| w[0].timestamp < w[1].timestamp));
    assert!(conversation.created_at <= conversation.turns[0].timestamp);
}

#[tokio::test]
async fn test_get_unknown_is_not_found() {
    let store = ConversationStore::new();
    assert!(matches!(
        store.get("missing").await,
        Err(ConversationError::NotFound(id)) if id == "missing"
    ));
}

#[tokio::test]
async fn test_attachments_round_trip_through_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs").join("conversations.jsonl");

    let id = {
        let store = ConversationStore::open(ConversationLog::new(&path)).await.unwrap();
        let turn = ConversationTurn::user("What about this room?")
            .with_attachments(vec![ImageObservation::new("room:bathroom", 0.8)]);
        let id = store.append(None, turn).await.unwrap();
        store.flush().await.unwrap();
        id
    };

    let store = ConversationStore::open(ConversationLog::new(&path)).await.unwrap();
    let turn = &store.get(&id).await.unwrap().turns[0];
    let attachments = turn.attachments.as_ref().unwrap();
    assert_eq!(attachments[0].label, "room:bathroom");
    assert_eq!(attachments[0].confidence, 0.8);
}
