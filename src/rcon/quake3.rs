use async_trait::async_trait;
use log::{debug, info};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::config::ClientConfig;
use crate::error::GameServerError;
use crate::game::ServerEndpoint;
use crate::rcon::retry::{retry, RetrySpec};
use crate::rcon::{RconClient, RconCommand, RconPlayer};
use crate::status::StatusGrammar;
use crate::udp;

/// `print\n` framing in front of console output, counted from the start of the datagram.
const PRINT_MARKER: &[u8] = b"print";
const PRINT_OFFSET: usize = 4;
const PRINT_FRAMING: usize = 10;

/// Connectionless UDP RCON used by Call of Duty 2, 4 and 5.
///
/// A fresh socket is opened for every command. Commands that fail are
/// retried according to the configured [RetrySpec], or a freshly randomized
/// default one per command.
#[derive(Debug, Clone)]
pub struct Quake3RconClient {
    server_name: String,
    endpoint: ServerEndpoint,
    grammar: StatusGrammar,
    retry_override: Option<RetrySpec>,
    config: ClientConfig,
    cancel: CancellationToken,
}

impl Quake3RconClient {
    pub fn new(
        server_name: impl Into<String>,
        endpoint: ServerEndpoint,
        grammar: StatusGrammar,
        retry_override: Option<RetrySpec>,
    ) -> Self {
        Self::with_config(
            server_name,
            endpoint,
            grammar,
            retry_override,
            ClientConfig::default(),
            CancellationToken::new(),
        )
    }

    pub fn with_config(
        server_name: impl Into<String>,
        endpoint: ServerEndpoint,
        grammar: StatusGrammar,
        retry_override: Option<RetrySpec>,
        config: ClientConfig,
        cancel: CancellationToken,
    ) -> Self {
        Quake3RconClient {
            server_name: server_name.into(),
            endpoint,
            grammar,
            retry_override,
            config,
            cancel,
        }
    }

    fn retry_spec(&self) -> RetrySpec {
        self.retry_override.clone().unwrap_or_default()
    }

    /// One attempt: send `rcon <password> <command>` and gather the reply.
    async fn send_command(&self, command: &str) -> Result<String, GameServerError> {
        let sock: UdpSocket = udp::connect(
            &self.endpoint.hostname,
            self.endpoint.query_port,
            self.config.rcon_timeout,
        )
        .await?;

        let request: Vec<u8> = udp::envelope(&format!(
            "rcon {} {}",
            self.endpoint.rcon_password, command
        ));
        let datagrams: Vec<Vec<u8>> = udp::exchange(
            &sock,
            &request,
            self.config.rcon_timeout,
            self.config.rcon_settle,
            &self.cancel,
        )
        .await?;

        Ok(decode_reply(&datagrams))
    }
}

/// Concatenate console output, dropping `print` framing and NUL bytes.
pub fn decode_reply(datagrams: &[Vec<u8>]) -> String {
    let mut text: String = String::new();
    for datagram in datagrams {
        let printed: bool = datagram
            .get(PRINT_OFFSET..PRINT_OFFSET + PRINT_MARKER.len())
            .map_or(false, |marker| marker == PRINT_MARKER);
        let body: &[u8] = if printed {
            datagram.get(PRINT_FRAMING..).unwrap_or_default()
        } else {
            udp::strip_envelope(datagram)
        };
        text.push_str(&String::from_utf8_lossy(body));
    }
    text.replace('\0', "")
}

#[async_trait]
impl RconClient for Quake3RconClient {
    async fn execute(&self, command: RconCommand) -> Result<String, GameServerError> {
        let console_text: String = command.console_text();
        let what: String = format!("{} `{}`", self.server_name, console_text);
        debug!("executing {what}");

        let retry_spec: RetrySpec = self.retry_spec();
        let reply: String = retry(&retry_spec, &self.cancel, &what, || {
            self.send_command(&console_text)
        })
        .await?;

        info!("{what} returned {} bytes", reply.len());
        Ok(reply)
    }

    async fn players(&self) -> Result<Vec<RconPlayer>, GameServerError> {
        let status: String = self.player_status().await?;
        Ok(self.grammar.parse(&status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameType;
    use std::time::Duration;

    fn print_datagram(text: &str) -> Vec<u8> {
        udp::envelope(&format!("print\n{text}"))
    }

    #[test]
    fn strips_print_framing_and_nuls() {
        let datagrams: Vec<Vec<u8>> = vec![print_datagram("map: mp_crash\n"), print_datagram("line\0two\n")];
        assert_eq!(decode_reply(&datagrams), "map: mp_crash\nlinetwo\n");
    }

    #[test]
    fn default_backoff_is_drawn_per_command() {
        let endpoint: ServerEndpoint = ServerEndpoint::new(GameType::CallOfDuty2, "127.0.0.1", 1, "secret");
        let randomized: Quake3RconClient =
            Quake3RconClient::new("cod2", endpoint.clone(), StatusGrammar::CallOfDuty2, None);
        let drawn: Vec<RetrySpec> = (0..4).map(|_| randomized.retry_spec()).collect();
        assert!(drawn.iter().all(|spec| spec.retries() == 3));
        assert!(drawn.windows(2).any(|pair| pair[0] != pair[1]));

        let fixed: RetrySpec = RetrySpec::new(vec![Duration::from_millis(10)]);
        let overridden: Quake3RconClient =
            Quake3RconClient::new("cod2", endpoint, StatusGrammar::CallOfDuty2, Some(fixed.clone()));
        assert_eq!(overridden.retry_spec(), fixed);
        assert_eq!(overridden.retry_spec(), fixed);
    }

    #[tokio::test]
    async fn sends_password_and_parses_players() {
        let server: UdpSocket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port: u16 = server.local_addr().unwrap().port();

        tokio::spawn(async move {
            let mut buf = [0u8; 256];
            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..len], b"\xFF\xFF\xFF\xFFrcon secret status");
            server
                .send_to(&print_datagram("map: mp_crash\nnum score ping guid name lastmsg address qport rate\n"), peer)
                .await
                .unwrap();
            server
                .send_to(
                    &print_datagram("--- ----- ----\n  0 15 48 0123456789abcdef0123456789abcdef Dave^7 0 81.2.3.4:28960 12345 25000\n"),
                    peer,
                )
                .await
                .unwrap();
        });

        let endpoint: ServerEndpoint = ServerEndpoint::new(GameType::CallOfDuty4, "127.0.0.1", port, "secret");
        let config: ClientConfig = ClientConfig {
            rcon_settle: Duration::from_millis(200),
            ..ClientConfig::default()
        };
        let client: Quake3RconClient = Quake3RconClient::with_config(
            "test server",
            endpoint,
            StatusGrammar::CallOfDuty4,
            Some(RetrySpec::none()),
            config,
            CancellationToken::new(),
        );

        let players: Vec<RconPlayer> = client.players().await.unwrap();
        assert_eq!(players.len(), 1);
        assert_eq!(players[0].name, "Dave^7");
        assert_eq!(players[0].guid, "0123456789abcdef0123456789abcdef");
    }

    #[tokio::test]
    async fn retries_silent_server_then_fails() {
        let server: UdpSocket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port: u16 = server.local_addr().unwrap().port();

        let endpoint: ServerEndpoint = ServerEndpoint::new(GameType::CallOfDuty2, "127.0.0.1", port, "secret");
        let config: ClientConfig = ClientConfig {
            rcon_timeout: Duration::from_millis(50),
            ..ClientConfig::default()
        };
        let client: Quake3RconClient = Quake3RconClient::with_config(
            "silent",
            endpoint,
            StatusGrammar::CallOfDuty2,
            Some(RetrySpec::new(vec![Duration::ZERO; 3])),
            config,
            CancellationToken::new(),
        );

        assert!(matches!(
            client.say("hello").await,
            Err(GameServerError::Timeout(_))
        ));

        // initial attempt plus three retries
        let mut buf = [0u8; 64];
        let mut seen: usize = 0;
        while let Ok(Ok(_)) = tokio::time::timeout(Duration::from_millis(100), server.recv_from(&mut buf)).await {
            assert!(buf.starts_with(b"\xFF\xFF\xFF\xFFrcon secret say \"hello\""));
            seen += 1;
        }
        assert_eq!(seen, 4);
    }
}
