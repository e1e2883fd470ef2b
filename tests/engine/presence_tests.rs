//! Typing presence tests: flag visibility, debounce, TTL expiry and
//! cleanup on membership changes.

use std::time::Duration;

use futures::StreamExt;
use pretty_assertions::assert_eq;

use classchat::application::services::RoomService;
use classchat::config::Settings;
use classchat::domain::{ParticipantRole, RoomKind, ROOMS_COLLECTION};
use classchat::infrastructure::store::{DocumentStore, FieldOp};

use crate::common::{engine_for, engine_with_settings, participant, shared_store};

#[tokio::test]
async fn typing_flags_are_visible_to_other_participants() {
    let store = shared_store();
    let alice = engine_for(&store, "alice", "Alice", ParticipantRole::Teacher);
    let bob = engine_for(&store, "bob", "Bob", ParticipantRole::Student);

    let room = alice
        .rooms
        .get_or_create_direct_room("bob", "Bob", ParticipantRole::Student)
        .await
        .unwrap();

    alice.presence.set_typing(&room.id, true).await;
    let view = bob.rooms.get_room(&room.id).await.unwrap();
    assert!(view.is_typing("alice"));
    assert!(!view.is_typing("bob"));

    alice.presence.set_typing(&room.id, false).await;
    let view = bob.rooms.get_room(&room.id).await.unwrap();
    assert!(!view.is_typing("alice"));
    assert!(!view.typing_users.contains_key("alice"));
}

#[tokio::test]
async fn an_unrefreshed_flag_expires() {
    let store = shared_store();
    let mut settings = Settings::default();
    settings.presence.typing_ttl_ms = 40;
    settings.presence.typing_debounce_ms = 5;
    let alice = engine_with_settings(&store, "alice", "Alice", ParticipantRole::Teacher, settings);

    let room = alice
        .rooms
        .get_or_create_direct_room("bob", "Bob", ParticipantRole::Student)
        .await
        .unwrap();

    alice.presence.set_typing(&room.id, true).await;
    assert!(alice.rooms.get_room(&room.id).await.unwrap().is_typing("alice"));

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(!alice.rooms.get_room(&room.id).await.unwrap().is_typing("alice"));
}

#[tokio::test]
async fn refreshes_inside_the_debounce_window_are_suppressed() {
    let store = shared_store();
    let mut settings = Settings::default();
    settings.presence.typing_ttl_ms = 60_000;
    settings.presence.typing_debounce_ms = 60_000;
    let alice = engine_with_settings(&store, "alice", "Alice", ParticipantRole::Teacher, settings);

    let room = alice
        .rooms
        .get_or_create_direct_room("bob", "Bob", ParticipantRole::Student)
        .await
        .unwrap();

    alice.presence.set_typing(&room.id, true).await;

    // Clear the flag behind the service's back; a refresh inside the
    // debounce window must not write it again.
    store
        .update(
            ROOMS_COLLECTION,
            &room.id,
            vec![FieldOp::delete("typingUsers.alice")],
        )
        .await
        .unwrap();

    alice.presence.set_typing(&room.id, true).await;
    assert!(!alice.rooms.get_room(&room.id).await.unwrap().is_typing("alice"));
}

#[tokio::test]
async fn stopping_typing_works_inside_the_debounce_window() {
    let store = shared_store();
    let mut settings = Settings::default();
    settings.presence.typing_debounce_ms = 60_000;
    let alice = engine_with_settings(&store, "alice", "Alice", ParticipantRole::Teacher, settings);

    let room = alice
        .rooms
        .get_or_create_direct_room("bob", "Bob", ParticipantRole::Student)
        .await
        .unwrap();

    alice.presence.set_typing(&room.id, true).await;
    alice.presence.set_typing(&room.id, false).await;
    assert!(!alice.rooms.get_room(&room.id).await.unwrap().is_typing("alice"));
}

#[tokio::test]
async fn removing_a_participant_clears_their_typing_entry() {
    let store = shared_store();
    let alice = engine_for(&store, "alice", "Alice", ParticipantRole::Teacher);
    let carol = engine_for(&store, "carol", "Carol", ParticipantRole::Student);

    let room = alice
        .rooms
        .create_group_room(
            "Homeroom",
            RoomKind::Group,
            vec![
                participant("alice", "Alice", ParticipantRole::Teacher),
                participant("carol", "Carol", ParticipantRole::Student),
            ],
            None,
        )
        .await
        .unwrap();

    carol.presence.set_typing(&room.id, true).await;
    assert!(alice.rooms.get_room(&room.id).await.unwrap().is_typing("carol"));

    alice.rooms.remove_participant(&room.id, "carol").await.unwrap();
    let after = alice.rooms.get_room(&room.id).await.unwrap();
    assert!(!after.typing_users.contains_key("carol"));
}

#[tokio::test]
async fn typing_stream_tracks_flag_changes() {
    let store = shared_store();
    let alice = engine_for(&store, "alice", "Alice", ParticipantRole::Teacher);
    let bob = engine_for(&store, "bob", "Bob", ParticipantRole::Student);

    let room = alice
        .rooms
        .get_or_create_direct_room("bob", "Bob", ParticipantRole::Student)
        .await
        .unwrap();

    let mut typing = bob.presence.stream_typing(&room.id).await;
    assert!(typing.next().await.unwrap().is_empty());

    alice.presence.set_typing(&room.id, true).await;
    let snapshot = typing.next().await.unwrap();
    assert_eq!(snapshot.get("alice"), Some(&true));
}

#[tokio::test]
async fn presence_writes_to_a_missing_room_are_swallowed() {
    let store = shared_store();
    let alice = engine_for(&store, "alice", "Alice", ParticipantRole::Teacher);

    // Best-effort contract: no panic, no error surface.
    alice.presence.set_typing("no-such-room", true).await;
    alice.presence.clear_room("no-such-room").await;
}
