//! Remote console clients.

use async_trait::async_trait;

use crate::error::GameServerError;

pub mod quake3;
pub mod retry;
pub mod source;

pub use quake3::Quake3RconClient;
pub use retry::RetrySpec;
pub use source::SourceRconClient;

/// A player row from the `status` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RconPlayer {
    pub slot: u32,
    pub guid: String,
    pub name: String,
    pub ip_address: String,
    pub ping: u32,
    pub rate: u32,
    pub score: i32,
}

/// Console commands understood by every supported engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RconCommand {
    Status,
    Kick(u32),
    Ban(u32),
    Quit,
    MapRestart,
    MapRotate,
    MapRotation,
    Say(String),
}

impl RconCommand {
    /// The console text sent to the server.
    pub fn console_text(&self) -> String {
        match self {
            RconCommand::Status => "status".to_owned(),
            RconCommand::Kick(slot) => format!("clientkick {slot}"),
            RconCommand::Ban(slot) => format!("banclient {slot}"),
            RconCommand::Quit => "quit".to_owned(),
            RconCommand::MapRestart => "map_restart".to_owned(),
            RconCommand::MapRotate => "map_rotate".to_owned(),
            RconCommand::MapRotation => "sv_maprotation".to_owned(),
            RconCommand::Say(message) => format!("say \"{message}\""),
        }
    }
}

/// Command execution against one configured server.
///
/// Implementors only provide [RconClient::execute] and [RconClient::players],
/// every named command is a thin wrapper around [RconCommand].
#[async_trait]
pub trait RconClient: Send + Sync {
    /// Run a command and return the raw text the server printed.
    async fn execute(&self, command: RconCommand) -> Result<String, GameServerError>;

    /// Run `status` and parse the player table.
    async fn players(&self) -> Result<Vec<RconPlayer>, GameServerError>;

    async fn player_status(&self) -> Result<String, GameServerError> {
        self.execute(RconCommand::Status).await
    }

    async fn kick_player(&self, slot: u32) -> Result<String, GameServerError> {
        self.execute(RconCommand::Kick(slot)).await
    }

    async fn ban_player(&self, slot: u32) -> Result<String, GameServerError> {
        self.execute(RconCommand::Ban(slot)).await
    }

    async fn restart_server(&self) -> Result<String, GameServerError> {
        self.execute(RconCommand::Quit).await
    }

    async fn restart_map(&self) -> Result<String, GameServerError> {
        self.execute(RconCommand::MapRestart).await
    }

    async fn next_map(&self) -> Result<String, GameServerError> {
        self.execute(RconCommand::MapRotate).await
    }

    async fn map_rotation(&self) -> Result<String, GameServerError> {
        self.execute(RconCommand::MapRotation).await
    }

    async fn say(&self, message: &str) -> Result<String, GameServerError> {
        self.execute(RconCommand::Say(message.to_owned())).await
    }
}
