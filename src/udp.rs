//! UDP plumbing shared by the query and Quake3 RCON clients.

use std::io;
use std::time::Duration;

use log::debug;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::GameServerError;

/// Every Quake3 out-of-band datagram starts with this, in both directions.
pub const OOB_PREFIX: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];

/// Large enough for any single datagram an engine sends.
const MAX_DATAGRAM: usize = 64 * 1024;

/// Wrap an ASCII payload in the out-of-band envelope.
pub fn envelope(payload: &str) -> Vec<u8> {
    let mut datagram: Vec<u8> = Vec::with_capacity(OOB_PREFIX.len() + payload.len());
    datagram.extend_from_slice(&OOB_PREFIX);
    datagram.extend_from_slice(payload.as_bytes());
    datagram
}

/// The payload of an out-of-band datagram, or the datagram itself if it has no envelope.
pub fn strip_envelope(datagram: &[u8]) -> &[u8] {
    datagram.strip_prefix(&OOB_PREFIX[..]).unwrap_or(datagram)
}

/// Bind an arbitrary local port and connect it to `hostname:port`.
pub async fn connect(hostname: &str, port: u16, timeout_dur: Duration) -> Result<UdpSocket, GameServerError> {
    // just arbitrarily bind any port, doesn't matter really
    let sock: UdpSocket = UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(GameServerError::FailedPortBind)?;

    // connecting
    timeout(timeout_dur, sock.connect((hostname, port)))
        .await?
        .map_err(GameServerError::UnreachableHost)?;

    Ok(sock)
}

/// Send `request`, then collect every datagram the server answers with.
///
/// The first datagram is awaited for up to `timeout_dur`. After that the
/// socket is checked again every `settle` until nothing more is waiting.
pub async fn exchange(
    sock: &UdpSocket,
    request: &[u8],
    timeout_dur: Duration,
    settle: Duration,
    cancel: &CancellationToken,
) -> Result<Vec<Vec<u8>>, GameServerError> {
    // sending
    timeout(timeout_dur, sock.send(request))
        .await?
        .map_err(GameServerError::SendError)?;

    // receiving packets
    let mut buf: Vec<u8> = vec![0u8; MAX_DATAGRAM];
    let len: usize = tokio::select! {
        _ = cancel.cancelled() => return Err(GameServerError::Cancelled),
        received = timeout(timeout_dur, sock.recv(&mut buf)) => received?.map_err(GameServerError::ReceiveError)?,
    };
    let mut datagrams: Vec<Vec<u8>> = vec![buf[..len].to_vec()];

    loop {
        if !settle.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(GameServerError::Cancelled),
                _ = tokio::time::sleep(settle) => {}
            }
        }
        match sock.try_recv(&mut buf) {
            Ok(len) => datagrams.push(buf[..len].to_vec()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => return Err(GameServerError::ReceiveError(e)),
        }
    }

    debug!("received {} datagram(s)", datagrams.len());
    Ok(datagrams)
}
