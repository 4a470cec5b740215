use std::time::Duration;

use tokio::net::UdpSocket;

use crate::error::GameServerError;
use crate::info::send_recv_raw;
use crate::packet::{PacketType, RequestPacket, ResponsePacket};
use crate::parse::{get_f32, get_i32, get_string, get_u8};
use crate::query::QueryPlayer;

/// Parse a raw A2S_PLAYER response datagram.
///
/// Byte 5 holds the player count, followed by one record per player:
/// `index(1) name(cstring) score(i32) duration(f32 seconds)`.
/// A record cut short by the end of the datagram ends the list.
pub fn parse_players(datagram: &[u8]) -> Result<Vec<QueryPlayer>, GameServerError> {
    let data: Vec<u8> = ResponsePacket::unpack(datagram)?
        .expect_type(PacketType::PlayersResponse)?
        .into_body();
    let mut offset: usize = 0;

    let count: u8 = get_u8(&data, &mut offset)?;
    let mut players: Vec<QueryPlayer> = Vec::with_capacity(count as usize);
    for _ in 0..count {
        match parse_player(&data, &mut offset) {
            Ok(player) => players.push(player),
            Err(GameServerError::UnexpectedEnd) => break,
            Err(e) => return Err(e),
        }
    }

    Ok(players)
}

fn parse_player(data: &[u8], offset: &mut usize) -> Result<QueryPlayer, GameServerError> {
    let _index: u8 = get_u8(data, offset)?;
    let name: String = get_string(data, offset)?;
    let score: i32 = get_i32(data, offset)?;
    let duration: f32 = get_f32(data, offset)?;

    Ok(QueryPlayer {
        name,
        score,
        ping: None,
        duration: Duration::try_from_secs_f32(duration).ok(),
    })
}

/// Query a connected `sock` for its player list with A2S_PLAYER.
///
/// The first request asks for a challenge, which is then echoed back.
/// Servers that skip the challenge and answer straight away are accepted too.
pub async fn query(sock: &UdpSocket, timeout_dur: Duration) -> Result<Vec<QueryPlayer>, GameServerError> {
    let datagram: Vec<u8> = send_recv_raw(sock, RequestPacket::players(None), timeout_dur).await?;
    let packet: ResponsePacket = ResponsePacket::unpack(&datagram)?;

    // absolving challenge
    if packet.packet_type() == &PacketType::Challenge {
        let req_packet: RequestPacket = RequestPacket::players(Some(packet.into_body()));
        let datagram: Vec<u8> = send_recv_raw(sock, req_packet, timeout_dur).await?;
        parse_players(&datagram)
    } else {
        parse_players(&datagram)
    }
}
