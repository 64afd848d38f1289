//! Live smoke run against a real homeserver.
//!
//! Requires `ENGINE_HOMESERVER`, `ENGINE_USER`, and `ENGINE_PASSWORD`; logs
//! in, syncs, prints the room list with the first page of the first room,
//! then logs out.

use std::{env, path::PathBuf, process::ExitCode};

use engine_matrix::{Engine, logging};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let homeserver =
        env::var("ENGINE_HOMESERVER").unwrap_or_else(|_| "https://matrix.example.org".to_owned());
    let (Ok(user), Ok(password)) = (env::var("ENGINE_USER"), env::var("ENGINE_PASSWORD")) else {
        eprintln!("Set ENGINE_HOMESERVER, ENGINE_USER and ENGINE_PASSWORD to run the live smoke.");
        return ExitCode::FAILURE;
    };
    let data_dir = env::var("ENGINE_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.engine-smoke-store"));

    let engine = Engine::new(data_dir);

    let outcome = match engine.login(&homeserver, &user, &password).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(%err, "login failed");
            return ExitCode::FAILURE;
        }
    };
    info!(user_id = %outcome.user_id, device_id = %outcome.device_id, "logged in");

    match engine.list_rooms().await {
        Ok(rooms) => {
            info!(rooms = rooms.len(), "room list fetched");
            if let Some(room) = rooms.first() {
                match engine.fetch_page(&room.room_id, 20, None).await {
                    Ok(page) => info!(
                        room_id = %room.room_id,
                        messages = page.messages.len(),
                        has_more = page.has_more,
                        "first history page fetched"
                    ),
                    Err(err) => error!(%err, "history fetch failed"),
                }
            }
        }
        Err(err) => error!(%err, "room list failed"),
    }

    if let Err(err) = engine.logout().await {
        error!(%err, "logout failed");
        return ExitCode::FAILURE;
    }

    info!("smoke run complete");
    ExitCode::SUCCESS
}
