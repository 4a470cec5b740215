//! Read-only status queries.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::GameServerError;

pub mod quake3;
pub mod source;

pub use quake3::Quake3QueryClient;
pub use source::SourceQueryClient;

/// Server status as returned by a query client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResponse {
    pub server_name: String,
    pub map: String,
    pub mod_name: String,
    pub max_players: u32,
    pub player_count: u32,
    /// Every key/value pair the engine reported, including the modeled ones.
    pub params: HashMap<String, String>,
    pub players: Vec<QueryPlayer>,
}

/// A player as seen by a query. Query protocols only identify players by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPlayer {
    pub name: String,
    pub score: i32,
    /// Reported by Quake3 engines.
    pub ping: Option<u32>,
    /// Time connected, reported by Source engines.
    pub duration: Option<Duration>,
}

/// A client able to fetch a [QueryResponse] from one server.
#[async_trait]
pub trait QueryClient: Send + Sync {
    async fn server_status(&self) -> Result<QueryResponse, GameServerError>;
}
