//! Matchmaking: the accept loop, the name/game handshake, pending groups
//! and their promotion into running game sessions.
//!
//! The pending table and the running-game registry are the only state
//! touched by more than one task (the listener fills them, a finishing
//! session removes itself), so both sit behind a mutex in `ServerState`.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{info, warn};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};

use four99_protocol::ServerMessage;

use crate::conn::{PlayerConn, HANDSHAKE_TIMEOUT};
use crate::deck::DeckStore;
use crate::game::{GameSession, SEATS};

/// Pending groups older than this are evicted on the periodic sweep.
pub const PENDING_MAX_AGE: Duration = Duration::from_secs(10 * 60);

/// Process-wide context shared by the listener, the sessions and the
/// shutdown path.
pub struct ServerState {
    pub greeting: String,
    pub decks: Arc<DeckStore>,
    pub lobby: Mutex<Lobby>,
    pub games: Mutex<Vec<GameHandle>>,
}

/// Listener-side view of a running session: enough to cancel it.
pub struct GameHandle {
    pub name: String,
    pub running: Arc<AtomicBool>,
}

impl ServerState {
    pub fn new(greeting: String, decks: DeckStore) -> Arc<ServerState> {
        Arc::new(ServerState {
            greeting,
            decks: Arc::new(decks),
            lobby: Mutex::new(Lobby::new()),
            games: Mutex::new(Vec::new()),
        })
    }

    /// Cooperative shutdown: flag every running session and drop every
    /// waiting connection. Sessions observe the flag at their next read.
    pub fn shutdown(&self) {
        for handle in self.games.lock().iter() {
            info!("cancelling game {:?}", handle.name);
            handle.running.store(false, Ordering::Relaxed);
        }
        let waiting = self.lobby.lock().drain();
        if !waiting.is_empty() {
            info!("dropping {} waiting connections", waiting.len());
        }
    }

    /// Waits for every cancelled session to unregister itself, up to
    /// `deadline`. Returns false if some session is still winding down.
    pub async fn await_drained(&self, deadline: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.games.lock().is_empty() {
                return true;
            }
            if start.elapsed() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

struct PendingGroup {
    players: Vec<PlayerConn>,
    created: Instant,
}

/// Named groups of players waiting for a fourth member.
pub struct Lobby {
    pending: HashMap<String, PendingGroup>,
}

impl Lobby {
    pub fn new() -> Lobby {
        Lobby {
            pending: HashMap::new(),
        }
    }

    /// Adds `player` to the named group, creating it if needed. On the
    /// fourth member the group is removed from the table and returned with
    /// deterministic seating (sorted by name, case-insensitively); the
    /// caller must start the session. Removal happens under the same lock
    /// as the join, so a promoted group can never also be evicted.
    pub fn join(&mut self, game_name: &str, player: PlayerConn) -> Option<Vec<PlayerConn>> {
        let group = self
            .pending
            .entry(game_name.to_string())
            .or_insert_with(|| PendingGroup {
                players: Vec::with_capacity(SEATS),
                created: Instant::now(),
            });
        group.players.push(player);
        if group.players.len() < SEATS {
            return None;
        }
        let mut group = self.pending.remove(game_name)?;
        group
            .players
            .sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Some(group.players)
    }

    /// Evicts every group older than `max_age`, returning the dropped
    /// connections so the caller can dispose of them outside the lock.
    pub fn sweep(&mut self, max_age: Duration) -> Vec<PlayerConn> {
        let stale: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, group)| group.created.elapsed() > max_age)
            .map(|(name, _)| name.clone())
            .collect();
        let mut dropped = Vec::new();
        for name in stale {
            info!("evicting pending game {:?} (timed out)", name);
            if let Some(group) = self.pending.remove(&name) {
                dropped.extend(group.players);
            }
        }
        dropped
    }

    /// Evicts the oldest pending group outright. Used when accept fails
    /// under resource pressure: fresh connections win over stale waiters.
    pub fn evict_oldest(&mut self) -> Option<Vec<PlayerConn>> {
        let name = self
            .pending
            .iter()
            .min_by_key(|(_, group)| group.created)
            .map(|(name, _)| name.clone())?;
        info!("evicting pending game {:?} (resource pressure)", name);
        self.pending.remove(&name).map(|group| group.players)
    }

    /// Drops every pending group; used at shutdown.
    pub fn drain(&mut self) -> Vec<PlayerConn> {
        self.pending
            .drain()
            .flat_map(|(_, group)| group.players)
            .collect()
    }

    pub fn pending_games(&self) -> usize {
        self.pending.len()
    }

    pub fn contains(&self, game_name: &str) -> bool {
        self.pending.contains_key(game_name)
    }
}

/// True for the out-of-file-descriptors errors accept reports under
/// resource pressure. Only these justify evicting waiting players; a
/// transient accept failure must not cost anyone their seat.
pub(crate) fn accept_out_of_fds(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::EMFILE | libc::ENFILE))
}

/// Accept loop: each connection gets its own handshake task, matchmaking
/// itself happens under the lobby lock. Upkeep (stale-group sweep)
/// piggybacks on the loop the way the original listener did it.
pub async fn serve(listener: TcpListener, state: Arc<ServerState>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("accepted connection from {addr}");
                tokio::spawn(handle_connection(state.clone(), stream));
            }
            Err(err) => {
                warn!("accept failed: {err}");
                if accept_out_of_fds(&err) {
                    // Out of file descriptors: free the oldest pending
                    // group so fresh connections win over stale waiters.
                    if state.lobby.lock().evict_oldest().is_some() {
                        continue;
                    }
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        }

        let stale = state.lobby.lock().sweep(PENDING_MAX_AGE);
        drop(stale);
    }
}

/// Greets the connection and reads the two untagged handshake lines (player
/// name, then game name) under the short handshake timeout. A bad handshake
/// only costs this connection; nothing has been matched yet.
pub async fn handle_connection(state: Arc<ServerState>, stream: TcpStream) {
    let mut conn = PlayerConn::new(stream);
    conn.send(&ServerMessage::Info(state.greeting.clone())).await;

    let name = match conn.recv(HANDSHAKE_TIMEOUT).await {
        Ok(name) if !name.is_empty() => name,
        result => {
            warn!("handshake failed at player name: {result:?}");
            conn.send(&ServerMessage::Info("Invalid player name.".into())).await;
            conn.close().await;
            return;
        }
    };
    conn.name = name;

    let game_name = match conn.recv(HANDSHAKE_TIMEOUT).await {
        Ok(game) if !game.is_empty() => game,
        result => {
            warn!("handshake failed at game name for {:?}: {result:?}", conn.name);
            conn.send(&ServerMessage::Info("Invalid game name.".into())).await;
            conn.close().await;
            return;
        }
    };

    info!("connection: player {:?}, game {:?}", conn.name, game_name);
    join_game(&state, &game_name, conn);
}

/// Adds the player to their pending group and starts the session once the
/// group is full.
pub fn join_game(state: &Arc<ServerState>, game_name: &str, player: PlayerConn) {
    let full_group = state.lobby.lock().join(game_name, player);
    if let Some(players) = full_group {
        start_game(state, game_name.to_string(), players);
    }
}

/// Registers and spawns a session for a freshly promoted group.
pub fn start_game(state: &Arc<ServerState>, name: String, players: Vec<PlayerConn>) {
    info!("starting game {:?}", name);
    let running = Arc::new(AtomicBool::new(true));
    state.games.lock().push(GameHandle {
        name: name.clone(),
        running: running.clone(),
    });
    let session = GameSession::new(name, players, state.decks.clone(), running);
    tokio::spawn(session.run(state.clone()));
}
