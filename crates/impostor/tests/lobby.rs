//! Integration tests for the lobby facade.

use std::sync::Arc;
use std::time::Duration;

use impostor::prelude::*;
use impostor::room::RoomInfo;

fn lobby(config: LobbyConfig) -> Lobby<MemoryStore> {
    Lobby::new(Arc::new(MemoryStore::new()), config)
}

fn no_reaper() -> LobbyConfig {
    LobbyConfig {
        idle_timeout_secs: 0,
        ..LobbyConfig::default()
    }
}

// =========================================================================
// Codes
// =========================================================================

#[tokio::test]
async fn test_join_by_typed_code() {
    let lobby = lobby(no_reaper());
    let created = lobby.create_room("ana", "red").await.unwrap();
    let typed = format!("  {}  ", created.code.as_str().to_lowercase());

    let joined = lobby.join(&typed, "bo", "blue").await.unwrap();
    assert_eq!(joined.value.view.players.len(), 2);
    assert_eq!(joined.value.view.code, created.code);
}

#[tokio::test]
async fn test_unknown_and_malformed_codes() {
    let lobby = lobby(no_reaper());
    lobby.create_room("ana", "red").await.unwrap();

    let err = lobby.room("ZZZZZZ").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = lobby.join("AB12", "bo", "blue").await.unwrap_err();
    assert!(matches!(err, ImpostorError::Protocol(_)));
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_list_rooms_only_joinable() {
    let lobby = lobby(no_reaper());
    let open = lobby.create_room("ana", "red").await.unwrap();
    let running = lobby.create_room("bo", "blue").await.unwrap();
    for name in ["cy", "di"] {
        running.handle.join(name, "green").await.unwrap();
    }
    running.handle.start(running.host).await.unwrap();

    let rooms: Vec<RoomInfo> = lobby.list_rooms().await;
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].code, open.code);
}

// =========================================================================
// Closing and reaping
// =========================================================================

#[tokio::test]
async fn test_close_room_persists_end_and_evicts() {
    let lobby = lobby(no_reaper());
    let created = lobby.create_room("ana", "red").await.unwrap();
    let mut events = created.handle.subscribe();

    lobby.close_room(created.code.as_str()).await.unwrap();

    let stored = lobby
        .registry()
        .store()
        .room(created.handle.room_id())
        .unwrap();
    assert_eq!(stored.status, RoomStatus::Ended);
    assert!(matches!(
        events.recv().await.unwrap(),
        RoomEvent::GameEnded { outcome, .. } if outcome.reason == EndReason::Closed
    ));
    assert_eq!(
        lobby.room(created.code.as_str()).unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[tokio::test(start_paused = true)]
async fn test_reaper_evicts_idle_rooms() {
    let lobby = lobby(LobbyConfig {
        idle_timeout_secs: 60,
        reap_interval_secs: 10,
        ..LobbyConfig::default()
    });
    let created = lobby.create_room("ana", "red").await.unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(lobby.room(created.code.as_str()).is_ok());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(lobby.room(created.code.as_str()).is_err());
    assert!(created.handle.view().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_zero_idle_timeout_keeps_rooms() {
    let lobby = lobby(no_reaper());
    let created = lobby.create_room("ana", "red").await.unwrap();

    tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
    assert!(lobby.room(created.code.as_str()).is_ok());
}

#[tokio::test]
async fn test_shutdown_evicts_everything() {
    let lobby = lobby(LobbyConfig::default());
    let a = lobby.create_room("ana", "red").await.unwrap();
    let b = lobby.create_room("bo", "blue").await.unwrap();
    let registry = Arc::clone(lobby.registry());

    lobby.shutdown();

    assert!(registry.is_empty());
    assert!(a.handle.view().await.is_err());
    assert!(b.handle.view().await.is_err());
}

// =========================================================================
// Events on the wire
// =========================================================================

#[tokio::test]
async fn test_events_encode_as_tagged_json() {
    let lobby = lobby(no_reaper());
    let created = lobby.create_room("ana", "red").await.unwrap();
    for name in ["bo", "cy"] {
        lobby
            .join(created.code.as_str(), name, "blue")
            .await
            .unwrap();
    }

    let started = created.handle.start(created.host).await.unwrap();
    let bytes = JsonCodec.encode(&started.events[0]).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(json["type"], "GameStarted");
    assert_eq!(json["view"]["status"], "Playing");
    // The adversary stays hidden while the game runs.
    assert!(json["view"]["adversary"].is_null());

    let decoded: RoomEvent = JsonCodec.decode(&bytes).unwrap();
    assert_eq!(decoded, started.events[0]);
}
