use std::time::Duration;

use log::debug;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::error::GameServerError;
use crate::packet::{PacketType, RequestPacket, ResponsePacket, MAX_PACKET_SIZE};
use crate::parse::{get_string, get_u16, get_u8};

/// Server information as obtained by [query].
#[derive(Debug, Clone, PartialEq)]
pub struct ServerInfo {
    /// A2S_INFO protocol version
    pub protocol: u8,
    /// Server hostname
    pub hostname: String,
    /// Current map
    pub map: String,
    /// Location of server files
    pub folder: String,
    /// Name of game
    pub game: String,
    /// Steam ID of game
    pub game_id: u16,
    /// Current players
    pub players: u8,
    /// Max players
    pub maxplayers: u8,
    /// Current bots
    pub bots: u8,
    /// Server type:
    /// - `d`: Dedicated
    /// - `l`: Listen (non-dedicated)
    /// - `p`: SourceTV relay (proxy)
    pub server_type: char,
    /// Server environment:
    /// - `l`: Linux
    /// - `w`: Windows
    /// - `o`: Mac
    pub server_env: char,
    /// Is the server password protected?
    pub password_protected: bool,
    /// Is the server VAC enabled?
    pub vac_enabled: bool,
    /// Version of the game installed on the server
    pub version: String,
    //TODO: parse the extra data flag (port, steam id, keywords) following the version
}

impl ServerInfo {
    /// Parse a [ResponsePacket] into its' corresponding [ServerInfo].
    pub fn parse(packet: ResponsePacket) -> Result<ServerInfo, GameServerError> {
        let data: Vec<u8> = packet.expect_type(PacketType::InfoResponse)?.into_body();
        let mut offset: usize = 0;

        let protocol: u8 = get_u8(&data, &mut offset)?;
        let hostname: String = get_string(&data, &mut offset)?;
        let map: String = get_string(&data, &mut offset)?;
        let folder: String = get_string(&data, &mut offset)?;
        let game: String = get_string(&data, &mut offset)?;
        let game_id: u16 = get_u16(&data, &mut offset)?;
        let players: u8 = get_u8(&data, &mut offset)?;
        let maxplayers: u8 = get_u8(&data, &mut offset)?;
        let bots: u8 = get_u8(&data, &mut offset)?;
        let server_type: char = char::from(get_u8(&data, &mut offset)?);
        let server_env: char = char::from(get_u8(&data, &mut offset)?);
        let password_protected: bool = get_u8(&data, &mut offset)? == 1;
        let vac_enabled: bool = get_u8(&data, &mut offset)? == 1;
        // some older servers stop before the version
        let version: String = get_string(&data, &mut offset).unwrap_or_default();

        Ok(ServerInfo {
            protocol,
            hostname,
            map,
            folder,
            game,
            game_id,
            players,
            maxplayers,
            bots,
            server_type,
            server_env,
            password_protected,
            vac_enabled,
            version,
        })
    }
}

/// Query a connected `sock` with the Source Query Protocol A2S_INFO query.
///
/// Each send and receive is bounded by `timeout_dur`. If the server
/// challenges the first request, the request is repeated once with the
/// challenge appended.
pub async fn query(sock: &UdpSocket, timeout_dur: Duration) -> Result<ServerInfo, GameServerError> {
    // sending initial packet
    let packet: ResponsePacket = send_recv(sock, RequestPacket::info(None), timeout_dur).await?;

    // absolving challenge
    if packet.packet_type() == &PacketType::Challenge {
        let req_packet: RequestPacket = RequestPacket::info(Some(packet.into_body()));
        let packet: ResponsePacket = send_recv(sock, req_packet, timeout_dur).await?;
        ServerInfo::parse(packet)
    // no challenge?
    } else {
        ServerInfo::parse(packet)
    }
}

pub(crate) async fn send_recv(
    sock: &UdpSocket,
    packet: RequestPacket,
    timeout_dur: Duration,
) -> Result<ResponsePacket, GameServerError> {
    let datagram: Vec<u8> = send_recv_raw(sock, packet, timeout_dur).await?;
    ResponsePacket::unpack(&datagram)
}

pub(crate) async fn send_recv_raw(
    sock: &UdpSocket,
    packet: RequestPacket,
    timeout_dur: Duration,
) -> Result<Vec<u8>, GameServerError> {
    // sending
    debug!("sending {:?} request", packet.packet_type());
    timeout(timeout_dur, sock.send(&packet.pack()))
        .await?
        .map_err(GameServerError::SendError)?;

    // receiving packet
    let mut resp_buf: [u8; MAX_PACKET_SIZE] = [0u8; MAX_PACKET_SIZE];
    let len: usize = timeout(timeout_dur, sock.recv(&mut resp_buf))
        .await?
        .map_err(GameServerError::ReceiveError)?;

    Ok(resp_buf[..len].to_vec())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn info_datagram() -> Vec<u8> {
        let mut data: Vec<u8> = vec![0xFF, 0xFF, 0xFF, 0xFF, 0x49, 17];
        data.extend_from_slice(b"My Insurgency Server\0");
        data.extend_from_slice(b"ministry_coop\0");
        data.extend_from_slice(b"insurgency\0");
        data.extend_from_slice(b"Insurgency\0");
        data.extend_from_slice(&222880u32.to_le_bytes()[..2]);
        data.extend_from_slice(&[12, 32, 4, b'd', b'l', 0, 1]);
        data.extend_from_slice(b"2.4.2.1\0");
        data
    }

    #[test]
    fn parses_every_field() {
        let packet: ResponsePacket = ResponsePacket::unpack(&info_datagram()).unwrap();
        let info: ServerInfo = ServerInfo::parse(packet).unwrap();

        assert_eq!(info.protocol, 17);
        assert_eq!(info.hostname, "My Insurgency Server");
        assert_eq!(info.map, "ministry_coop");
        assert_eq!(info.folder, "insurgency");
        assert_eq!(info.game, "Insurgency");
        assert_eq!(info.game_id, (222880u32 & 0xFFFF) as u16);
        assert_eq!(info.players, 12);
        assert_eq!(info.maxplayers, 32);
        assert_eq!(info.bots, 4);
        assert_eq!(info.server_type, 'd');
        assert_eq!(info.server_env, 'l');
        assert!(!info.password_protected);
        assert!(info.vac_enabled);
        assert_eq!(info.version, "2.4.2.1");
    }

    #[test]
    fn truncated_info_is_an_error() {
        let mut data: Vec<u8> = info_datagram();
        data.truncate(30);
        let packet: ResponsePacket = ResponsePacket::unpack(&data).unwrap();
        assert!(ServerInfo::parse(packet).is_err());
    }

    #[tokio::test]
    async fn answers_info_challenge() {
        let server: UdpSocket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 1400];
            let (_, peer) = server.recv_from(&mut buf).await.unwrap();
            server
                .send_to(&[0xFF, 0xFF, 0xFF, 0xFF, 0x41, 1, 2, 3, 4], peer)
                .await
                .unwrap();
            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[len - 4..len], &[1, 2, 3, 4]);
            server.send_to(&info_datagram(), peer).await.unwrap();
        });

        let sock: UdpSocket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sock.connect(server_addr).await.unwrap();
        let info: ServerInfo = query(&sock, Duration::from_secs(5)).await.unwrap();
        assert_eq!(info.map, "ministry_coop");
    }
}
