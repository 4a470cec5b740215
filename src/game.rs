use std::fmt;
use std::str::FromStr;

use crate::status::StatusGrammar;

/// Game types known to the rest of the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameType {
    CallOfDuty2,
    CallOfDuty4,
    CallOfDuty5,
    Insurgency,
    Left4Dead2,
    Unknown,
}

/// Wire protocol family a game speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolFamily {
    /// `FFFFFFFF` out-of-band UDP for both query and RCON.
    Quake3,
    /// A2S query over UDP, Source RCON over TCP.
    Source,
}

impl GameType {
    /// Fixed lookup from game to protocol family.
    pub fn family(&self) -> Option<ProtocolFamily> {
        match self {
            GameType::CallOfDuty2 | GameType::CallOfDuty4 | GameType::CallOfDuty5 => {
                Some(ProtocolFamily::Quake3)
            }
            GameType::Insurgency | GameType::Left4Dead2 => Some(ProtocolFamily::Source),
            GameType::Unknown => None,
        }
    }

    /// Layout of the `status` table printed by this game.
    pub fn status_grammar(&self) -> Option<StatusGrammar> {
        match self {
            GameType::CallOfDuty2 => Some(StatusGrammar::CallOfDuty2),
            GameType::CallOfDuty4 => Some(StatusGrammar::CallOfDuty4),
            GameType::CallOfDuty5 => Some(StatusGrammar::CallOfDuty5),
            GameType::Insurgency | GameType::Left4Dead2 => Some(StatusGrammar::Insurgency),
            GameType::Unknown => None,
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &str = match self {
            GameType::CallOfDuty2 => "CallOfDuty2",
            GameType::CallOfDuty4 => "CallOfDuty4",
            GameType::CallOfDuty5 => "CallOfDuty5",
            GameType::Insurgency => "Insurgency",
            GameType::Left4Dead2 => "Left4Dead2",
            GameType::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Lenient parsing, anything unrecognised is [GameType::Unknown].
impl FromStr for GameType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let game_type: GameType = match s.trim().to_ascii_lowercase().as_str() {
            "cod2" | "callofduty2" => GameType::CallOfDuty2,
            "cod4" | "callofduty4" => GameType::CallOfDuty4,
            "cod5" | "callofduty5" | "codwaw" => GameType::CallOfDuty5,
            "ins" | "insurgency" => GameType::Insurgency,
            "l4d2" | "left4dead2" => GameType::Left4Dead2,
            _ => GameType::Unknown,
        };
        Ok(game_type)
    }
}

/// One physical game server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerEndpoint {
    pub game_type: GameType,
    pub hostname: String,
    /// Query port, also the RCON port for every supported engine.
    pub query_port: u16,
    pub rcon_password: String,
}

impl ServerEndpoint {
    pub fn new(
        game_type: GameType,
        hostname: impl Into<String>,
        query_port: u16,
        rcon_password: impl Into<String>,
    ) -> Self {
        ServerEndpoint {
            game_type,
            hostname: hostname.into(),
            query_port,
            rcon_password: rcon_password.into(),
        }
    }
}
