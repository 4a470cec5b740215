use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::codec::{PacketReassembler, RconPacket, RconPacketType};
use crate::config::ClientConfig;
use crate::error::GameServerError;
use crate::game::ServerEndpoint;
use crate::rcon::{RconClient, RconCommand, RconPlayer};
use crate::status::StatusGrammar;

const AUTH_REQUEST_ID: i32 = 1;
const FIRST_COMMAND_ID: i32 = 2;
/// Size of a single socket read, packets may span several.
const READ_CHUNK: usize = 4096;

/// What the reader task saw on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReaderEvent {
    Authenticated,
    AuthRejected,
    Response { request_id: i32, body: String },
}

/// A live, authenticated TCP connection.
struct Connection {
    writer: OwnedWriteHalf,
    events: mpsc::UnboundedReceiver<ReaderEvent>,
    reader: JoinHandle<()>,
    next_request_id: i32,
}

impl Connection {
    fn take_request_id(&mut self) -> i32 {
        let request_id: i32 = self.next_request_id;
        self.next_request_id = match request_id.checked_add(1) {
            Some(next) => next,
            None => FIRST_COMMAND_ID,
        };
        request_id
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Persistent TCP RCON used by Source engine games such as Insurgency.
///
/// The connection is opened and authenticated by the first command and
/// reused afterwards. Commands on one client run one at a time.
pub struct SourceRconClient {
    server_name: String,
    endpoint: ServerEndpoint,
    grammar: StatusGrammar,
    config: ClientConfig,
    cancel: CancellationToken,
    connection: Mutex<Option<Connection>>,
}

impl SourceRconClient {
    pub fn new(server_name: impl Into<String>, endpoint: ServerEndpoint, grammar: StatusGrammar) -> Self {
        Self::with_config(
            server_name,
            endpoint,
            grammar,
            ClientConfig::default(),
            CancellationToken::new(),
        )
    }

    pub fn with_config(
        server_name: impl Into<String>,
        endpoint: ServerEndpoint,
        grammar: StatusGrammar,
        config: ClientConfig,
        cancel: CancellationToken,
    ) -> Self {
        SourceRconClient {
            server_name: server_name.into(),
            endpoint,
            grammar,
            config,
            cancel,
            connection: Mutex::new(None),
        }
    }

    /// Whether an authenticated connection is currently held.
    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    async fn connect(&self) -> Result<Connection, GameServerError> {
        let address = (self.endpoint.hostname.as_str(), self.endpoint.query_port);
        let stream: TcpStream = timeout(self.config.connect_timeout, TcpStream::connect(address))
            .await?
            .map_err(GameServerError::UnreachableHost)?;
        let (read_half, writer) = stream.into_split();

        let (tx, events) = mpsc::unbounded_channel::<ReaderEvent>();
        let reader: JoinHandle<()> = tokio::spawn(read_loop(self.server_name.clone(), read_half, tx));
        let mut connection: Connection = Connection {
            writer,
            events,
            reader,
            next_request_id: FIRST_COMMAND_ID,
        };

        let auth: RconPacket = RconPacket::new(
            AUTH_REQUEST_ID,
            RconPacketType::AUTH,
            self.endpoint.rcon_password.as_str(),
        );
        connection
            .writer
            .write_all(&auth.encode())
            .await
            .map_err(GameServerError::SendError)?;

        let deadline: Instant = Instant::now() + self.config.response_timeout;
        loop {
            match self.next_event(&mut connection, deadline).await? {
                ReaderEvent::Authenticated => {
                    info!("authenticated with {}", self.server_name);
                    return Ok(connection);
                }
                ReaderEvent::AuthRejected => {
                    warn!("{} rejected the rcon password", self.server_name);
                    return Err(GameServerError::AuthenticationFailed(self.server_name.clone()));
                }
                // servers send an empty response value ahead of the auth response
                ReaderEvent::Response { .. } => continue,
            }
        }
    }

    async fn next_event(
        &self,
        connection: &mut Connection,
        deadline: Instant,
    ) -> Result<ReaderEvent, GameServerError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(GameServerError::Cancelled),
            event = timeout_at(deadline, connection.events.recv()) => {
                event?.ok_or(GameServerError::ConnectionClosed)
            }
        }
    }

    /// Send one command over `connection` and wait for the matching response.
    async fn exchange(&self, connection: &mut Connection, command: &str) -> Result<String, GameServerError> {
        let request_id: i32 = connection.take_request_id();
        let packet: RconPacket = RconPacket::new(request_id, RconPacketType::EXEC_COMMAND, command);
        connection
            .writer
            .write_all(&packet.encode())
            .await
            .map_err(GameServerError::SendError)?;

        let deadline: Instant = Instant::now() + self.config.response_timeout;
        loop {
            match self.next_event(connection, deadline).await? {
                ReaderEvent::Response { request_id: id, body } if id == request_id => return Ok(body),
                stale => debug!("{} discarding {stale:?}", self.server_name),
            }
        }
    }

    async fn try_execute(&self, command: &str) -> Result<String, GameServerError> {
        // held for the whole exchange, one command in flight per connection
        let mut guard = self.connection.lock().await;

        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }
        let connection: &mut Connection = guard.as_mut().ok_or(GameServerError::ConnectionClosed)?;

        let result: Result<String, GameServerError> = self.exchange(connection, command).await;
        if let Err(
            GameServerError::SendError(_)
            | GameServerError::ReceiveError(_)
            | GameServerError::ConnectionClosed,
        ) = &result
        {
            // reconnect on the next command
            *guard = None;
        }
        result
    }
}

/// Reassemble packets from the socket and hand them to the command side.
///
/// Exactly one of these runs per connection.
async fn read_loop(server_name: String, mut read_half: OwnedReadHalf, tx: mpsc::UnboundedSender<ReaderEvent>) {
    let mut reassembler: PacketReassembler = PacketReassembler::new();
    let mut buf: Vec<u8> = vec![0u8; READ_CHUNK];

    loop {
        let len: usize = match read_half.read(&mut buf).await {
            Ok(0) => {
                info!("{server_name} closed the rcon connection");
                return;
            }
            Ok(len) => len,
            Err(e) => {
                warn!("{server_name} rcon read failed: {e}");
                return;
            }
        };

        let packets: Vec<RconPacket> = match reassembler.push(&buf[..len]) {
            Ok(packets) => packets,
            Err(e) => {
                warn!("{server_name} sent a corrupt rcon stream: {e}");
                return;
            }
        };

        for packet in packets {
            debug!(
                "{server_name} packet #{} id {} {:?}",
                reassembler.packet_count(),
                packet.request_id,
                packet.packet_type
            );
            let event: ReaderEvent = match packet.packet_type {
                RconPacketType::AUTH_RESPONSE if packet.request_id == -1 => ReaderEvent::AuthRejected,
                RconPacketType::AUTH_RESPONSE => ReaderEvent::Authenticated,
                RconPacketType::RESPONSE_VALUE => ReaderEvent::Response {
                    request_id: packet.request_id,
                    body: packet.body1,
                },
                other => {
                    warn!("{server_name} sent unknown packet type {other:?}");
                    continue;
                }
            };
            if tx.send(event).is_err() {
                return;
            }
        }
    }
}

#[async_trait]
impl RconClient for SourceRconClient {
    /// Failures are logged and reported as empty output, only cancellation
    /// is returned as an error.
    async fn execute(&self, command: RconCommand) -> Result<String, GameServerError> {
        let console_text: String = command.console_text();
        match self.try_execute(&console_text).await {
            Ok(body) => Ok(body),
            Err(GameServerError::Cancelled) => Err(GameServerError::Cancelled),
            Err(e) => {
                error!("{} `{console_text}` failed: {e}", self.server_name);
                Ok(String::new())
            }
        }
    }

    async fn players(&self) -> Result<Vec<RconPlayer>, GameServerError> {
        let status: String = self.player_status().await?;
        Ok(self.grammar.parse(&status))
    }
}
