//! Plays one scripted game against the in-memory store and prints every
//! room event as a line of JSON.
//!
//! ```text
//! cargo run -p impostor-sim [config.toml]
//! ```

use std::sync::Arc;

use impostor::prelude::*;
use impostor::telemetry;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

const SEED: u64 = 2024;
const CREW_TASKS: [&str; 3] = ["wires", "fuel", "scan"];

// ---------------------------------------------------------------------------
// Event printer
// ---------------------------------------------------------------------------

/// Prints events until the room closes.
fn spawn_printer(handle: &RoomHandle) -> tokio::task::JoinHandle<()> {
    let mut events = handle.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    match JsonCodec.encode(&event) {
                        Ok(bytes) => println!("{}", String::from_utf8_lossy(&bytes)),
                        Err(e) => eprintln!("encode failed: {e}"),
                    }
                    if matches!(event, RoomEvent::RoomClosed { .. }) {
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => eprintln!("printer missed {n} events"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

async fn play(lobby: &Lobby<MemoryStore>) -> Result<(), ImpostorError> {
    let created = lobby.create_room("ana", "red").await?;
    let room = created.handle.clone();
    let printer = spawn_printer(&room);
    info!(room = %created.code, "room open");

    let mut players = vec![created.host];
    for (name, color) in [("bo", "blue"), ("cy", "green"), ("di", "yellow"), ("ed", "purple")] {
        let joined = lobby.join(created.code.as_str(), name, color).await?;
        players.push(joined.value.player);
    }
    room.post_message(players[1], "who's ready?").await?;

    room.start(created.host).await?;

    // Each player asks for their own role; the script peeks at all of them.
    let mut adversary = None;
    for player in &players {
        if room.role_of(*player).await? == Some(Side::Adversary) {
            adversary = Some(*player);
        }
    }
    let Some(adversary) = adversary else {
        return Err(RoomError::Internal {
            code: created.code.clone(),
            detail: "no adversary after start".into(),
        }
        .into());
    };
    let crew: Vec<PlayerId> = players.iter().copied().filter(|p| *p != adversary).collect();

    for player in &crew {
        for task in CREW_TASKS {
            room.complete_task(*player, TaskId::from(task)).await?;
        }
    }
    // Pretending to work.
    room.complete_task(adversary, TaskId::from("wires")).await?;

    let round = room.call_meeting(crew[0]).await?.value;
    room.post_message(crew[0], "I saw something in electrical").await?;
    let mut last = None;
    for (i, voter) in players.iter().enumerate() {
        let target = if i == 0 {
            VoteTarget::Skip
        } else {
            VoteTarget::Player(adversary)
        };
        last = Some(room.cast_vote(*voter, target, round).await?.value);
    }
    if let Some(result) = last.and_then(|receipt| receipt.result) {
        info!(round, eliminated = ?result.eliminated, abstentions = result.abstentions, "round closed");
    }

    let view = room.view().await?;
    info!(status = %view.status, outcome = ?view.outcome, "game over");

    room.reset(created.host).await?;
    lobby.close_room(created.code.as_str()).await?;
    // The printer stops on RoomClosed.
    let _ = printer.await;

    let messages = lobby.registry().store().list_messages(room.room_id()).await?;
    info!(messages = messages.len(), "chat log persisted");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => LobbyConfig::load(&path)?,
        None => LobbyConfig::default(),
    };
    telemetry::init(&config.log_filter);

    let store = Arc::new(MemoryStore::new());
    let registry = SessionRegistry::new(store, config.registry.clone()).with_seed(SEED);
    let lobby = Lobby::with_registry(registry, config);

    play(&lobby).await?;
    lobby.shutdown();
    Ok(())
}
