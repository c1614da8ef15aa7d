//! Echo bot.
//!
//! Demonstrates:
//! - Building a client with a credential store
//! - Logging in and joining a room
//! - Client-level and room-level listeners
//! - Replying from inside a listener through the event's room handle
//!
//! Usage:
//!   SE_EMAIL=bot@example.com SE_PASSWORD=secret SE_ROOM=1 cargo run --example echo_bot
//!   SE_SITE=meta SE_ROOM=1 cargo run --example echo_bot -- --debug
//!
//! Any message starting with `!echo ` is answered with the rest of its text.

// ============================================================================
// Imports
// ============================================================================

use std::env;

use anyhow::{Context, Result};
use sechat::{Client, EventName, FileCredentialStore, JoinOptions, Notification, RoomId};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

const CREDENTIALS_DIR: &str = "./.sechat-credentials";
const COMMAND: &str = "!echo ";

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let debug = env::args().any(|arg| arg == "--debug");
    init_logging(debug);

    let email = env::var("SE_EMAIL").context("SE_EMAIL is not set")?;
    let password = env::var("SE_PASSWORD").context("SE_PASSWORD is not set")?;
    let site = env::var("SE_SITE").unwrap_or_else(|_| "meta".to_string());
    let room_id: u64 = env::var("SE_ROOM")
        .context("SE_ROOM is not set")?
        .parse()
        .context("SE_ROOM must be a number")?;

    println!("=== Echo Bot ===\n");

    // ========================================================================
    // Login
    // ========================================================================

    let client = Client::builder()
        .credential_store(FileCredentialStore::new(CREDENTIALS_DIR))
        .build()?;

    println!("[1] Logging in to {site}...");
    client.login(&site, &email, &password).await?;
    println!("    ✓ Logged in as user {:?}\n", client.user_id());

    // ========================================================================
    // Listeners
    // ========================================================================

    client.on(EventName::UserJoin, |notification| {
        if let Some(name) = notification.event().and_then(|event| event.user_name()) {
            println!("    -> {name} joined");
        }
    });

    let own_id = client.user_id();
    let room = client
        .join_room(RoomId::new(room_id), JoinOptions::new().message_cache_limit(1_000))
        .await?;
    room.on(EventName::MessageCreate, move |notification| {
        let Notification::MessageCreate(event) = notification else {
            return;
        };
        if event.user_id() == own_id {
            return;
        }
        let Some(text) = event.content().and_then(|content| content.strip_prefix(COMMAND)) else {
            return;
        };

        let event = event.clone();
        let text = text.to_string();
        tokio::spawn(async move {
            match event.reply(&text).await {
                Ok(id) => println!("    ✓ Echoed as message {id}"),
                Err(e) => eprintln!("    [WARN] Echo failed: {e}"),
            }
        });
    });

    println!("[2] Listening in {room} (Ctrl+C to stop)\n");

    tokio::signal::ctrl_c().await?;

    client.leave_room(room.id());
    client.logout().await?;
    println!("\n=== Done ===");
    Ok(())
}

fn init_logging(debug: bool) {
    let filter = if debug { "sechat=debug" } else { "sechat=info" };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}
