use std::time::Duration;

/// Timeouts shared by every client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Send and receive timeout of query sockets.
    pub query_timeout: Duration,
    /// Send and receive timeout of Quake3 RCON sockets.
    pub rcon_timeout: Duration,
    /// Pause between checks for more Quake3 RCON datagrams.
    ///
    /// Slow engines split long replies over several datagrams with gaps in
    /// between, shortening this truncates their output.
    pub rcon_settle: Duration,
    /// TCP connect timeout of Source RCON.
    pub connect_timeout: Duration,
    /// How long a Source RCON command waits for its response.
    pub response_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(5),
            rcon_timeout: Duration::from_secs(15),
            rcon_settle: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(10),
        }
    }
}
