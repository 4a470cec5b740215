use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use regex::Regex;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::GameServerError;
use crate::query::{QueryClient, QueryPlayer, QueryResponse};
use crate::udp;

const GET_STATUS: &str = "getstatus";
/// Key that ends the server parameters.
const FINAL_KEY: &str = "final";
/// Key that is never kept.
const SKIPPED_KEY: &str = "querid";

/// `score ping "name"`
fn player_regex() -> &'static Regex {
    static PLAYER: OnceLock<Regex> = OnceLock::new();
    // literal pattern covered by tests
    PLAYER.get_or_init(|| Regex::new(r#"^(-?\d+)\s+(-?\d+)\s+"(.*)"$"#).expect("invalid player regex"))
}

/// `getstatus` query against a Quake3 derived engine.
#[derive(Debug, Clone)]
pub struct Quake3QueryClient {
    hostname: String,
    query_port: u16,
    config: ClientConfig,
    cancel: CancellationToken,
}

impl Quake3QueryClient {
    pub fn new(hostname: impl Into<String>, query_port: u16) -> Self {
        Self::with_config(hostname, query_port, ClientConfig::default(), CancellationToken::new())
    }

    pub fn with_config(
        hostname: impl Into<String>,
        query_port: u16,
        config: ClientConfig,
        cancel: CancellationToken,
    ) -> Self {
        Quake3QueryClient {
            hostname: hostname.into(),
            query_port,
            config,
            cancel,
        }
    }
}

#[async_trait]
impl QueryClient for Quake3QueryClient {
    async fn server_status(&self) -> Result<QueryResponse, GameServerError> {
        let timeout_dur: Duration = self.config.query_timeout;
        let sock: UdpSocket = udp::connect(&self.hostname, self.query_port, timeout_dur).await?;

        let datagrams: Vec<Vec<u8>> = udp::exchange(
            &sock,
            &udp::envelope(GET_STATUS),
            timeout_dur,
            Duration::ZERO,
            &self.cancel,
        )
        .await?;

        let mut text: String = String::new();
        for datagram in &datagrams {
            text.push_str(&String::from_utf8_lossy(udp::strip_envelope(datagram)));
        }
        debug!(
            "{}:{} answered getstatus with {} bytes",
            self.hostname,
            self.query_port,
            text.len()
        );

        Ok(parse_status_response(&text))
    }
}

/// Parse the text of a `statusResponse`, envelope already removed.
///
/// Line 0 is the response name, line 1 the `\key\value` server parameters
/// and every following line a `score ping "name"` player row.
pub fn parse_status_response(text: &str) -> QueryResponse {
    let mut lines = text.split('\n');
    let _echo: Option<&str> = lines.next();
    let params: HashMap<String, String> = lines.next().map(parse_params).unwrap_or_default();

    let players: Vec<QueryPlayer> = lines.filter_map(parse_player).collect();

    let param = |key: &str| params.get(key).cloned().unwrap_or_default();
    let mod_name: String = params
        .get("gamename")
        .or_else(|| params.get("fs_game"))
        .cloned()
        .unwrap_or_default();

    QueryResponse {
        server_name: param("sv_hostname"),
        map: param("mapname"),
        mod_name,
        max_players: param("sv_maxclients").trim().parse().unwrap_or(0),
        player_count: players.len() as u32,
        players,
        params,
    }
}

/// `\key\value\key\value...`, stopping at the `final` key.
fn parse_params(line: &str) -> HashMap<String, String> {
    let mut params: HashMap<String, String> = HashMap::new();
    if !line.starts_with('\\') {
        return params;
    }
    let mut fields = line.trim_end_matches('\r').split('\\').skip_while(|f| f.is_empty());

    while let Some(key) = fields.next() {
        if key == FINAL_KEY {
            break;
        }
        let value: &str = fields.next().unwrap_or_default();
        if key == SKIPPED_KEY {
            continue;
        }
        params.insert(key.to_owned(), value.to_owned());
    }

    params
}

fn parse_player(line: &str) -> Option<QueryPlayer> {
    let caps = player_regex().captures(line.trim_end_matches(['\r', '\0']))?;
    Some(QueryPlayer {
        name: caps[3].to_string(),
        score: caps[1].parse().ok()?,
        ping: caps[2].parse().ok(),
        duration: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_players_after_header_lines() {
        let response: QueryResponse =
            parse_status_response("17 client/playerstate\nscore ping name\n5 23 \"Alice\"\n10 40 \"Bob\"");

        assert_eq!(response.players.len(), 2);
        assert_eq!(response.player_count, 2);
        assert_eq!(response.players[0].name, "Alice");
        assert_eq!(response.players[0].score, 5);
        assert_eq!(response.players[0].ping, Some(23));
        assert_eq!(response.players[1].name, "Bob");
        assert_eq!(response.players[1].score, 10);
        assert_eq!(response.players[1].ping, Some(40));
    }

    #[test]
    fn keeps_every_param_until_final() {
        let text: &str = "statusResponse\n\\sv_hostname\\^1XI ^7Server\\mapname\\mp_crash\\gamename\\Call of Duty 4\\sv_maxclients\\24\\querid\\99\\shortversion\\1.7\\final\\\\after\\x\n-3 999 \"Zed \\\"Z\\\"\"\n";
        let response: QueryResponse = parse_status_response(text);

        assert_eq!(response.server_name, "^1XI ^7Server");
        assert_eq!(response.map, "mp_crash");
        assert_eq!(response.mod_name, "Call of Duty 4");
        assert_eq!(response.max_players, 24);
        assert_eq!(response.params.get("shortversion").map(String::as_str), Some("1.7"));
        assert!(!response.params.contains_key("querid"));
        assert!(!response.params.contains_key("after"));
        assert_eq!(response.players.len(), 1);
        assert_eq!(response.players[0].score, -3);
    }

    #[tokio::test]
    async fn queries_fake_server() {
        let server: UdpSocket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port: u16 = server.local_addr().unwrap().port();

        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..len], b"\xFF\xFF\xFF\xFFgetstatus");
            let reply: Vec<u8> =
                udp::envelope("statusResponse\n\\mapname\\mp_carentan\n0 50 \"Alice\"\n");
            server.send_to(&reply, peer).await.unwrap();
        });

        let client: Quake3QueryClient = Quake3QueryClient::new("127.0.0.1", port);
        let response: QueryResponse = client.server_status().await.unwrap();
        assert_eq!(response.map, "mp_carentan");
        assert_eq!(response.players[0].name, "Alice");
    }
}
