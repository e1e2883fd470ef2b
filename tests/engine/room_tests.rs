//! Room directory tests: creation, direct-chat dedup, membership.

use futures::StreamExt;
use pretty_assertions::assert_eq;

use classchat::application::services::{CreateRoomDto, MessageService, RoomService, SendMessageDto};
use classchat::domain::{ParticipantRole, RoomKind};
use classchat::ChatError;

use crate::common::{engine_for, participant, shared_store};

#[tokio::test]
async fn sequential_get_or_create_returns_the_same_room() {
    let store = shared_store();
    let alice = engine_for(&store, "alice", "Alice", ParticipantRole::Teacher);

    let first = alice
        .rooms
        .get_or_create_direct_room("bob", "Bob", ParticipantRole::Student)
        .await
        .unwrap();
    let second = alice
        .rooms
        .get_or_create_direct_room("bob", "Bob", ParticipantRole::Student)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn concurrent_get_or_create_converges_on_one_room() {
    let store = shared_store();
    let alice = engine_for(&store, "alice", "Alice", ParticipantRole::Teacher);
    let bob = engine_for(&store, "bob", "Bob", ParticipantRole::Student);

    let (a, b) = tokio::join!(
        alice.rooms.get_or_create_direct_room("bob", "Bob", ParticipantRole::Student),
        bob.rooms.get_or_create_direct_room("alice", "Alice", ParticipantRole::Teacher),
    );

    let a = a.unwrap();
    let b = b.unwrap();
    assert_eq!(a.id, b.id);

    let found = alice.rooms.find_direct_room("alice", "bob").await.unwrap();
    assert_eq!(found.unwrap().id, a.id);
}

#[tokio::test]
async fn direct_room_name_is_the_counterpart() {
    let store = shared_store();
    let alice = engine_for(&store, "alice", "Alice", ParticipantRole::Teacher);

    let room = alice
        .rooms
        .get_or_create_direct_room("bob", "Bob", ParticipantRole::Student)
        .await
        .unwrap();

    assert_eq!(room.kind, RoomKind::Direct);
    assert_eq!(room.name, "Bob");
    assert_eq!(room.participant_ids.len(), 2);
    assert!(room.unread_counts.values().all(|&n| n == 0));
}

#[tokio::test]
async fn direct_room_with_self_is_rejected() {
    let store = shared_store();
    let alice = engine_for(&store, "alice", "Alice", ParticipantRole::Teacher);

    let err = alice
        .rooms
        .get_or_create_direct_room("alice", "Alice", ParticipantRole::Teacher)
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::InvalidRoomSpec(_)));
}

#[tokio::test]
async fn create_room_validates_arity() {
    let store = shared_store();
    let alice = engine_for(&store, "alice", "Alice", ParticipantRole::Teacher);

    // Direct room with three participants.
    let err = alice
        .rooms
        .create_room(CreateRoomDto {
            name: "Trio".into(),
            kind: RoomKind::Direct,
            participants: vec![
                participant("alice", "Alice", ParticipantRole::Teacher),
                participant("bob", "Bob", ParticipantRole::Student),
                participant("carol", "Carol", ParticipantRole::Student),
            ],
            class_id: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::InvalidRoomSpec(_)));

    // No participants at all.
    let err = alice
        .rooms
        .create_room(CreateRoomDto {
            name: "Empty".into(),
            kind: RoomKind::Group,
            participants: vec![],
            class_id: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::InvalidRoomSpec(_)));

    // Blank name.
    let err = alice
        .rooms
        .create_room(CreateRoomDto {
            name: "".into(),
            kind: RoomKind::Group,
            participants: vec![participant("alice", "Alice", ParticipantRole::Teacher)],
            class_id: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::InvalidRoomSpec(_)));
}

#[tokio::test]
async fn identical_group_memberships_may_coexist() {
    let store = shared_store();
    let alice = engine_for(&store, "alice", "Alice", ParticipantRole::Teacher);
    let members = vec![
        participant("alice", "Alice", ParticipantRole::Teacher),
        participant("bob", "Bob", ParticipantRole::Student),
    ];

    let first = alice
        .rooms
        .create_group_room("Math club", RoomKind::Group, members.clone(), None)
        .await
        .unwrap();
    let second = alice
        .rooms
        .create_group_room("Math club", RoomKind::Group, members, None)
        .await
        .unwrap();

    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn class_room_keeps_its_back_reference() {
    let store = shared_store();
    let alice = engine_for(&store, "alice", "Alice", ParticipantRole::Teacher);

    let room = alice
        .rooms
        .create_group_room(
            "Biology 7B",
            RoomKind::Class,
            vec![participant("alice", "Alice", ParticipantRole::Teacher)],
            Some("class-7b".into()),
        )
        .await
        .unwrap();

    let fetched = alice.rooms.get_room(&room.id).await.unwrap();
    assert_eq!(fetched.class_id.as_deref(), Some("class-7b"));
}

#[tokio::test]
async fn membership_changes_are_idempotent_and_keep_the_unread_invariant() {
    let store = shared_store();
    let alice = engine_for(&store, "alice", "Alice", ParticipantRole::Teacher);

    let room = alice
        .rooms
        .create_group_room(
            "Homeroom",
            RoomKind::Group,
            vec![participant("alice", "Alice", ParticipantRole::Teacher)],
            None,
        )
        .await
        .unwrap();

    let carol = participant("carol", "Carol", ParticipantRole::Student);
    alice.rooms.add_participant(&room.id, carol.clone()).await.unwrap();
    alice.rooms.add_participant(&room.id, carol).await.unwrap();

    let after_add = alice.rooms.get_room(&room.id).await.unwrap();
    assert_eq!(after_add.participant_ids, vec!["alice", "carol"]);
    assert_eq!(after_add.participants.len(), 2);
    assert_eq!(after_add.unread_for("carol"), 0);
    assert!(after_add
        .unread_counts
        .keys()
        .all(|k| after_add.participant_ids.contains(k)));

    alice.rooms.remove_participant(&room.id, "carol").await.unwrap();
    alice.rooms.remove_participant(&room.id, "carol").await.unwrap();

    let after_remove = alice.rooms.get_room(&room.id).await.unwrap();
    assert_eq!(after_remove.participant_ids, vec!["alice"]);
    assert!(!after_remove.unread_counts.contains_key("carol"));
    assert!(after_remove
        .unread_counts
        .keys()
        .all(|k| after_remove.participant_ids.contains(k)));
}

#[tokio::test]
async fn leaving_a_direct_room_is_refused() {
    let store = shared_store();
    let alice = engine_for(&store, "alice", "Alice", ParticipantRole::Teacher);

    let room = alice
        .rooms
        .get_or_create_direct_room("bob", "Bob", ParticipantRole::Student)
        .await
        .unwrap();

    let err = alice.rooms.leave_room(&room.id).await.unwrap_err();
    assert!(matches!(err, ChatError::NotAuthorized(_)));
}

#[tokio::test]
async fn leaving_a_group_room_removes_the_caller() {
    let store = shared_store();
    let alice = engine_for(&store, "alice", "Alice", ParticipantRole::Teacher);
    let bob = engine_for(&store, "bob", "Bob", ParticipantRole::Student);

    let room = alice
        .rooms
        .create_group_room(
            "Chess",
            RoomKind::Group,
            vec![
                participant("alice", "Alice", ParticipantRole::Teacher),
                participant("bob", "Bob", ParticipantRole::Student),
            ],
            None,
        )
        .await
        .unwrap();

    bob.rooms.leave_room(&room.id).await.unwrap();

    let after = alice.rooms.get_room(&room.id).await.unwrap();
    assert_eq!(after.participant_ids, vec!["alice"]);
}

#[tokio::test]
async fn deleting_a_room_cascades_to_its_messages() {
    let store = shared_store();
    let alice = engine_for(&store, "alice", "Alice", ParticipantRole::Teacher);
    let room = alice
        .rooms
        .get_or_create_direct_room("bob", "Bob", ParticipantRole::Student)
        .await
        .unwrap();

    let message_id = alice
        .messages
        .send(&room.id, SendMessageDto::text("hello"))
        .await
        .unwrap();

    alice.rooms.delete_room(&room.id).await.unwrap();

    let room_err = alice.rooms.get_room(&room.id).await.unwrap_err();
    assert!(matches!(room_err, ChatError::RoomNotFound(_)));
    let message_err = alice.messages.get_message(&room.id, &message_id).await.unwrap_err();
    assert!(matches!(message_err, ChatError::MessageNotFound(_)));
}

#[tokio::test]
async fn room_stream_tracks_the_callers_rooms() {
    let store = shared_store();
    let alice = engine_for(&store, "alice", "Alice", ParticipantRole::Teacher);

    let mut rooms = alice.rooms.stream_rooms().await;
    assert!(rooms.next().await.unwrap().is_empty());

    let created = alice
        .rooms
        .get_or_create_direct_room("bob", "Bob", ParticipantRole::Student)
        .await
        .unwrap();

    let snapshot = rooms.next().await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, created.id);
}
