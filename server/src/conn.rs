//! Per-player line transport: framed reads with a hard length cap and a
//! per-read timeout, fire-and-forget writes.

use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

use four99_protocol::{Card, ServerMessage};

/// Longest inbound line we will buffer before kicking the sender.
pub const MAX_INPUT: usize = 64 * 1024;
/// Read timeout for the name/game handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Read timeout for bid and play responses during a game.
pub const PLAY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum RecvError {
    #[error("read timed out")]
    Timeout,
    #[error("input line too long")]
    TooLong,
    #[error("peer disconnected")]
    Disconnected,
}

/// One connected player: identity, line transport and their current hand.
/// Owned by the lobby until matchmaking completes, then exclusively by one
/// game session until teardown.
pub struct PlayerConn {
    pub name: String,
    pub hand: Vec<Card>,
    lines: Framed<TcpStream, LinesCodec>,
}

impl PlayerConn {
    pub fn new(stream: TcpStream) -> Self {
        PlayerConn {
            name: String::new(),
            hand: Vec::new(),
            lines: Framed::new(stream, LinesCodec::new_with_max_length(MAX_INPUT)),
        }
    }

    /// Sends one message. Failures are swallowed: a dead peer surfaces as a
    /// disconnect on the next read instead.
    pub async fn send(&mut self, msg: &ServerMessage) {
        let _ = self.lines.send(msg.to_string()).await;
    }

    /// Reads one line within `limit`. Timeouts and oversized lines get the
    /// matching kick notice before the error is returned; the caller decides
    /// whether that tears down a whole game or just this connection.
    pub async fn recv(&mut self, limit: Duration) -> Result<String, RecvError> {
        match timeout(limit, self.lines.next()).await {
            Err(_) => {
                self.send(&ServerMessage::Info("Sorry, too slow.".into())).await;
                Err(RecvError::Timeout)
            }
            Ok(None) => Err(RecvError::Disconnected),
            Ok(Some(Err(LinesCodecError::MaxLineLengthExceeded))) => {
                self.send(&ServerMessage::Info(
                    "No thanks, I think that's too big".into(),
                ))
                .await;
                Err(RecvError::TooLong)
            }
            Ok(Some(Err(LinesCodecError::Io(_)))) => Err(RecvError::Disconnected),
            Ok(Some(Ok(line))) => Ok(line.trim().to_string()),
        }
    }

    /// Flushes and closes the transport. Errors are ignored, the connection
    /// is going away either way.
    pub async fn close(&mut self) {
        let _ = SinkExt::<String>::close(&mut self.lines).await;
    }
}
