use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::GameServerError;
use crate::info::{self, ServerInfo};
use crate::players;
use crate::query::{QueryClient, QueryPlayer, QueryResponse};
use crate::udp;

/// A2S_INFO followed by A2S_PLAYER against a Source engine server.
#[derive(Debug, Clone)]
pub struct SourceQueryClient {
    hostname: String,
    query_port: u16,
    config: ClientConfig,
    cancel: CancellationToken,
}

impl SourceQueryClient {
    pub fn new(hostname: impl Into<String>, query_port: u16) -> Self {
        Self::with_config(hostname, query_port, ClientConfig::default(), CancellationToken::new())
    }

    pub fn with_config(
        hostname: impl Into<String>,
        query_port: u16,
        config: ClientConfig,
        cancel: CancellationToken,
    ) -> Self {
        SourceQueryClient {
            hostname: hostname.into(),
            query_port,
            config,
            cancel,
        }
    }

    /// Only the A2S_INFO half of [QueryClient::server_status].
    pub async fn server_info(&self) -> Result<ServerInfo, GameServerError> {
        self.until_cancelled(async {
            let timeout_dur: Duration = self.config.query_timeout;
            let sock: UdpSocket = udp::connect(&self.hostname, self.query_port, timeout_dur).await?;
            info::query(&sock, timeout_dur).await
        })
        .await
    }

    async fn until_cancelled<T>(
        &self,
        exchange: impl Future<Output = Result<T, GameServerError>>,
    ) -> Result<T, GameServerError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(GameServerError::Cancelled),
            result = exchange => result,
        }
    }
}

#[async_trait]
impl QueryClient for SourceQueryClient {
    async fn server_status(&self) -> Result<QueryResponse, GameServerError> {
        let timeout_dur: Duration = self.config.query_timeout;
        let (server_info, players) = self
            .until_cancelled(async {
                let sock: UdpSocket = udp::connect(&self.hostname, self.query_port, timeout_dur).await?;
                let server_info: ServerInfo = info::query(&sock, timeout_dur).await?;
                let players: Vec<QueryPlayer> = players::query(&sock, timeout_dur).await?;
                Ok((server_info, players))
            })
            .await?;
        debug!(
            "{}:{} reports {} of {} players, {} listed",
            self.hostname,
            self.query_port,
            server_info.players,
            server_info.maxplayers,
            players.len()
        );

        Ok(into_response(server_info, players))
    }
}

/// Combine both A2S replies, keeping the Source specific fields in `params`.
pub fn into_response(server_info: ServerInfo, players: Vec<QueryPlayer>) -> QueryResponse {
    let mut params: HashMap<String, String> = HashMap::new();
    params.insert("protocol".to_owned(), server_info.protocol.to_string());
    params.insert("hostname".to_owned(), server_info.hostname.clone());
    params.insert("map".to_owned(), server_info.map.clone());
    params.insert("folder".to_owned(), server_info.folder.clone());
    params.insert("game".to_owned(), server_info.game.clone());
    params.insert("app_id".to_owned(), server_info.game_id.to_string());
    params.insert("players".to_owned(), server_info.players.to_string());
    params.insert("max_players".to_owned(), server_info.maxplayers.to_string());
    params.insert("bots".to_owned(), server_info.bots.to_string());
    params.insert("server_type".to_owned(), server_info.server_type.to_string());
    params.insert("environment".to_owned(), server_info.server_env.to_string());
    params.insert(
        "password".to_owned(),
        u8::from(server_info.password_protected).to_string(),
    );
    params.insert("secure".to_owned(), u8::from(server_info.vac_enabled).to_string());
    params.insert("version".to_owned(), server_info.version.clone());

    QueryResponse {
        server_name: server_info.hostname,
        map: server_info.map,
        mod_name: server_info.folder,
        max_players: u32::from(server_info.maxplayers),
        player_count: u32::from(server_info.players),
        params,
        players,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::tests::info_datagram;
    use crate::players::tests::players_datagram;

    #[tokio::test]
    async fn queries_info_then_players() {
        let server: UdpSocket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port: u16 = server.local_addr().unwrap().port();

        tokio::spawn(async move {
            let mut buf = [0u8; 1400];

            let (_, peer) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(buf[4], 0x54);
            server.send_to(&info_datagram(), peer).await.unwrap();

            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..len], &[0xFF, 0xFF, 0xFF, 0xFF, 0x55, 0xFF, 0xFF, 0xFF, 0xFF]);
            server
                .send_to(&[0xFF, 0xFF, 0xFF, 0xFF, 0x41, 0xAA, 0xBB, 0xCC, 0xDD], peer)
                .await
                .unwrap();

            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..len], &[0xFF, 0xFF, 0xFF, 0xFF, 0x55, 0xAA, 0xBB, 0xCC, 0xDD]);
            server.send_to(&players_datagram(), peer).await.unwrap();
        });

        let client: SourceQueryClient = SourceQueryClient::new("127.0.0.1", port);
        let response: QueryResponse = client.server_status().await.unwrap();

        assert_eq!(response.server_name, "My Insurgency Server");
        assert_eq!(response.map, "ministry_coop");
        assert_eq!(response.mod_name, "insurgency");
        assert_eq!(response.max_players, 32);
        assert_eq!(response.player_count, 12);
        assert_eq!(response.params.get("bots").map(String::as_str), Some("4"));
        assert_eq!(response.params.get("version").map(String::as_str), Some("2.4.2.1"));
        assert_eq!(response.players.len(), 1);
        assert_eq!(response.players[0].name, "Carl");
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let server: UdpSocket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port: u16 = server.local_addr().unwrap().port();

        let config: ClientConfig = ClientConfig {
            query_timeout: Duration::from_millis(100),
            ..ClientConfig::default()
        };
        let client: SourceQueryClient =
            SourceQueryClient::with_config("127.0.0.1", port, config, CancellationToken::new());
        assert!(matches!(
            client.server_status().await,
            Err(GameServerError::Timeout(_))
        ));
        drop(server);
    }

    #[tokio::test]
    async fn cancellation_stops_a_pending_query() {
        let server: UdpSocket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port: u16 = server.local_addr().unwrap().port();

        let cancel: CancellationToken = CancellationToken::new();
        let client: SourceQueryClient =
            SourceQueryClient::with_config("127.0.0.1", port, ClientConfig::default(), cancel.child_token());

        let pending = tokio::spawn(async move { client.server_status().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(GameServerError::Cancelled)));
        drop(server);
    }
}
