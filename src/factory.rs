//! Picking the right client for a game, and keeping one per server.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::GameServerError;
use crate::game::{GameType, ProtocolFamily, ServerEndpoint};
use crate::query::{Quake3QueryClient, QueryClient, SourceQueryClient};
use crate::rcon::{Quake3RconClient, RconClient, RetrySpec, SourceRconClient};
use crate::status::StatusGrammar;

fn family_of(game_type: GameType) -> Result<ProtocolFamily, GameServerError> {
    game_type
        .family()
        .ok_or_else(|| GameServerError::UnsupportedGameType(game_type.to_string()))
}

fn grammar_of(game_type: GameType) -> Result<StatusGrammar, GameServerError> {
    game_type
        .status_grammar()
        .ok_or_else(|| GameServerError::UnsupportedGameType(game_type.to_string()))
}

/// Builds query clients. Nothing touches the network until the client is used.
#[derive(Debug, Clone, Default)]
pub struct QueryClientFactory {
    config: ClientConfig,
    cancel: CancellationToken,
}

impl QueryClientFactory {
    pub fn new(config: ClientConfig, cancel: CancellationToken) -> Self {
        QueryClientFactory { config, cancel }
    }

    pub fn create_instance(
        &self,
        game_type: GameType,
        hostname: &str,
        query_port: u16,
    ) -> Result<Arc<dyn QueryClient>, GameServerError> {
        let client: Arc<dyn QueryClient> = match family_of(game_type)? {
            ProtocolFamily::Quake3 => Arc::new(Quake3QueryClient::with_config(
                hostname,
                query_port,
                self.config.clone(),
                self.cancel.child_token(),
            )),
            ProtocolFamily::Source => Arc::new(SourceQueryClient::with_config(
                hostname,
                query_port,
                self.config.clone(),
                self.cancel.child_token(),
            )),
        };
        Ok(client)
    }
}

/// Builds RCON clients. Nothing touches the network until a command is sent.
#[derive(Debug, Clone, Default)]
pub struct RconClientFactory {
    config: ClientConfig,
    cancel: CancellationToken,
}

impl RconClientFactory {
    pub fn new(config: ClientConfig, cancel: CancellationToken) -> Self {
        RconClientFactory { config, cancel }
    }

    /// `retry_override` only applies to the UDP engines, Source RCON never retries.
    pub fn create_instance(
        &self,
        server_name: &str,
        endpoint: ServerEndpoint,
        retry_override: Option<RetrySpec>,
    ) -> Result<Arc<dyn RconClient>, GameServerError> {
        let game_type: GameType = endpoint.game_type;
        let family: ProtocolFamily = family_of(game_type)?;
        let grammar: StatusGrammar = grammar_of(game_type)?;

        let client: Arc<dyn RconClient> = match family {
            ProtocolFamily::Quake3 => Arc::new(Quake3RconClient::with_config(
                server_name,
                endpoint,
                grammar,
                retry_override,
                self.config.clone(),
                self.cancel.child_token(),
            )),
            ProtocolFamily::Source => Arc::new(SourceRconClient::with_config(
                server_name,
                endpoint,
                grammar,
                self.config.clone(),
                self.cancel.child_token(),
            )),
        };
        Ok(client)
    }
}

/// Identity of a cached client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServerKey {
    /// Id assigned by the caller, usually the server's guid.
    Id(String),
    Address { hostname: String, port: u16 },
}

impl From<&ServerEndpoint> for ServerKey {
    fn from(endpoint: &ServerEndpoint) -> Self {
        ServerKey::Address {
            hostname: endpoint.hostname.clone(),
            port: endpoint.query_port,
        }
    }
}

/// Caches one query client and one RCON client per server.
///
/// Reusing the cached [SourceRconClient] keeps its authenticated TCP
/// connection alive between calls. [ClientRegistry::shutdown] cancels every
/// client handed out.
pub struct ClientRegistry {
    query_factory: QueryClientFactory,
    rcon_factory: RconClientFactory,
    query_clients: Mutex<HashMap<ServerKey, Arc<dyn QueryClient>>>,
    rcon_clients: Mutex<HashMap<ServerKey, Arc<dyn RconClient>>>,
    cancel: CancellationToken,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl ClientRegistry {
    pub fn new(config: ClientConfig) -> Self {
        let cancel: CancellationToken = CancellationToken::new();
        ClientRegistry {
            query_factory: QueryClientFactory::new(config.clone(), cancel.child_token()),
            rcon_factory: RconClientFactory::new(config, cancel.child_token()),
            query_clients: Mutex::new(HashMap::new()),
            rcon_clients: Mutex::new(HashMap::new()),
            cancel,
        }
    }

    pub fn query_client(
        &self,
        key: ServerKey,
        game_type: GameType,
        hostname: &str,
        query_port: u16,
    ) -> Result<Arc<dyn QueryClient>, GameServerError> {
        let mut clients = self.query_clients.lock();
        if let Some(client) = clients.get(&key) {
            return Ok(Arc::clone(client));
        }

        let client: Arc<dyn QueryClient> = self.query_factory.create_instance(game_type, hostname, query_port)?;
        debug!("caching {game_type} query client for {key:?}");
        clients.insert(key, Arc::clone(&client));
        Ok(client)
    }

    pub fn rcon_client(
        &self,
        key: ServerKey,
        server_name: &str,
        endpoint: ServerEndpoint,
        retry_override: Option<RetrySpec>,
    ) -> Result<Arc<dyn RconClient>, GameServerError> {
        let mut clients = self.rcon_clients.lock();
        if let Some(client) = clients.get(&key) {
            return Ok(Arc::clone(client));
        }

        let game_type: GameType = endpoint.game_type;
        let client: Arc<dyn RconClient> = self.rcon_factory.create_instance(server_name, endpoint, retry_override)?;
        debug!("caching {game_type} rcon client for {key:?}");
        clients.insert(key, Arc::clone(&client));
        Ok(client)
    }

    /// Forget both clients of a server, e.g. after its password changed.
    pub fn remove(&self, key: &ServerKey) {
        self.query_clients.lock().remove(key);
        self.rcon_clients.lock().remove(key);
    }

    /// Number of servers with at least one cached client.
    pub fn len(&self) -> usize {
        let query_clients = self.query_clients.lock();
        let rcon_clients = self.rcon_clients.lock();
        let servers: HashSet<&ServerKey> = query_clients.keys().chain(rcon_clients.keys()).collect();
        servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel every outstanding wait and drop all cached clients.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.query_clients.lock().clear();
        self.rcon_clients.lock().clear();
    }
}
