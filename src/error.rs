use std::io;
use std::str::Utf8Error;

use thiserror::Error;
use tokio::time::error::Elapsed;

/// Everything that can go wrong while talking to a game server.
#[derive(Debug, Error)]
pub enum GameServerError {
    #[error("failed to bind a local port: {0}")]
    FailedPortBind(#[source] io::Error),
    #[error("host is unreachable: {0}")]
    UnreachableHost(#[source] io::Error),
    #[error("failed to send packet: {0}")]
    SendError(#[source] io::Error),
    #[error("failed to receive packet: {0}")]
    ReceiveError(#[source] io::Error),
    #[error("operation timed out")]
    Timeout(#[from] Elapsed),
    #[error("string was not valid utf-8: {0}")]
    InvalidString(#[from] Utf8Error),
    #[error("unknown packet header {0}")]
    UnknownPacketHeader(i32),
    #[error("unknown packet type {0:#04x}")]
    UnknownPacketType(u8),
    #[error("split packets are not supported")]
    SplitPacket,
    #[error("unexpected end of packet")]
    UnexpectedEnd,
    #[error("invalid packet: {0}")]
    InvalidPacket(String),
    #[error("rcon authentication rejected by {0}")]
    AuthenticationFailed(String),
    #[error("connection closed by server")]
    ConnectionClosed,
    #[error("unsupported game type: {0}")]
    UnsupportedGameType(String),
    #[error("operation cancelled")]
    Cancelled,
}
