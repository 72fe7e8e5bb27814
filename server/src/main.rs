//! serv499: a four-player partnership trick-taking game server speaking a
//! one-message-per-line TCP protocol.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use log::{info, warn};
use tokio::net::TcpListener;

mod conn;
mod deck;
mod game;
mod lobby;

use deck::{DeckError, DeckStore};
use lobby::ServerState;

// One stable exit code per failure category, so operators can tell the
// causes apart without reading logs.
const EXIT_USAGE: i32 = 1;
const EXIT_BAD_PORT: i32 = 4;
const EXIT_BIND: i32 = 5;
const EXIT_DECK_UNREADABLE: i32 = 6;
const EXIT_DECK_MALFORMED: i32 = 7;

#[derive(Parser, Debug)]
#[command(name = "serv499", about = "Four-player 499 card game server")]
struct Cli {
    /// TCP port to listen on (1-65535). Validated by hand to keep the
    /// bad-port exit code distinct from general usage errors.
    port: String,
    /// Greeting sent to every connecting player.
    greeting: String,
    /// File of pre-shuffled decks, one 104-character line per deck.
    deck_file: PathBuf,
}

#[tokio::main]
async fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp_millis()
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("{err}");
            process::exit(EXIT_USAGE);
        }
    };

    let port = match cli.port.parse::<u32>() {
        Ok(port @ 1..=65535) => port as u16,
        _ => {
            eprintln!("Invalid Port");
            process::exit(EXIT_BAD_PORT);
        }
    };

    let decks = match DeckStore::load(&cli.deck_file) {
        Ok(decks) => decks,
        Err(err @ DeckError::Unreadable(_)) => {
            eprintln!("Deck Error: {err}");
            process::exit(EXIT_DECK_UNREADABLE);
        }
        Err(err) => {
            eprintln!("Deck Error: {err}");
            process::exit(EXIT_DECK_MALFORMED);
        }
    };

    let listener = match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("Port Error: {err}");
            process::exit(EXIT_BIND);
        }
    };

    info!("listening on port {port} with {} deck(s)", decks.len());
    let state = ServerState::new(cli.greeting, decks);

    tokio::select! {
        _ = lobby::serve(listener, state.clone()) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt: shutting down");
            state.shutdown();
            // give sessions a chance to observe the flag and send their
            // game-over lines before the process exits
            if !state.await_drained(Duration::from_secs(5)).await {
                warn!("exiting with sessions still winding down");
            }
        }
    }
}
