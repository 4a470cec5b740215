//! One view of a server built from both its query and RCON answers.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use log::warn;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::error::GameServerError;
use crate::query::{QueryClient, QueryResponse};
use crate::rcon::{RconClient, RconPlayer};

fn color_code() -> &'static Regex {
    static COLOR_CODE: OnceLock<Regex> = OnceLock::new();
    COLOR_CODE.get_or_init(|| Regex::new(r"\^[0-9]").expect("invalid color code regex"))
}

/// Normalized form used to match the same player across both protocols.
///
/// Quake3 `^N` color codes are dropped, `status` appends `^7` to every name.
pub fn normalize_name(name: &str) -> String {
    let plain = color_code().replace_all(name, "");
    plain.trim().nfkc().flat_map(char::to_lowercase).collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusPlayer {
    pub name: String,
    pub score: i32,
    pub ping: Option<u32>,
    pub duration: Option<Duration>,
    /// Everything below is only known once matched to an RCON row.
    pub slot: Option<u32>,
    pub guid: String,
    pub ip_address: String,
    pub rate: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameServerStatus {
    pub server_name: String,
    pub map: String,
    pub mod_name: String,
    pub max_players: u32,
    pub player_count: u32,
    pub params: HashMap<String, String>,
    pub players: Vec<StatusPlayer>,
}

impl GameServerStatus {
    /// Merge a query roster with RCON player rows.
    ///
    /// The query roster decides who is listed; RCON rows that don't match
    /// any queried name are left out.
    pub fn merge(query: QueryResponse, rcon_players: &[RconPlayer]) -> Self {
        let by_name: HashMap<String, &RconPlayer> = rcon_players
            .iter()
            .map(|player| (normalize_name(&player.name), player))
            .collect();

        let players: Vec<StatusPlayer> = query
            .players
            .into_iter()
            .map(|queried| {
                let mut player: StatusPlayer = StatusPlayer {
                    ping: queried.ping,
                    duration: queried.duration,
                    score: queried.score,
                    ..StatusPlayer::default()
                };
                if let Some(rcon) = by_name.get(&normalize_name(&queried.name)) {
                    player.slot = Some(rcon.slot);
                    player.guid = rcon.guid.clone();
                    player.ip_address = rcon.ip_address.clone();
                    player.rate = Some(rcon.rate);
                    player.ping = player.ping.or(Some(rcon.ping));
                }
                player.name = queried.name;
                player
            })
            .collect();

        GameServerStatus {
            server_name: query.server_name,
            map: query.map,
            mod_name: query.mod_name,
            max_players: query.max_players,
            player_count: query.player_count,
            params: query.params,
            players,
        }
    }

    /// Query the server, then ask RCON for player details.
    ///
    /// Query failures are returned. RCON failures only cost the extra
    /// details, the query roster is still returned.
    pub async fn fetch(
        query_client: &dyn QueryClient,
        rcon_client: Option<&dyn RconClient>,
    ) -> Result<Self, GameServerError> {
        let query: QueryResponse = query_client.server_status().await?;
        let rcon_players: Vec<RconPlayer> = match rcon_client {
            Some(rcon_client) => match rcon_client.players().await {
                Ok(players) => players,
                Err(GameServerError::Cancelled) => return Err(GameServerError::Cancelled),
                Err(e) => {
                    warn!("rcon player list unavailable: {e}");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        Ok(Self::merge(query, &rcon_players))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::query::quake3::parse_status_response;
    use crate::query::QueryPlayer;
    use crate::rcon::RconCommand;
    use crate::status::StatusGrammar;

    fn queried(name: &str, score: i32) -> QueryPlayer {
        QueryPlayer {
            name: name.to_owned(),
            score,
            ping: Some(40),
            duration: None,
        }
    }

    fn rcon(name: &str, guid: &str) -> RconPlayer {
        RconPlayer {
            slot: 7,
            guid: guid.to_owned(),
            name: name.to_owned(),
            ip_address: "10.0.0.1".to_owned(),
            ping: 80,
            rate: 25000,
            score: 99,
        }
    }

    #[test]
    fn matched_players_gain_rcon_identity() {
        let query: QueryResponse = QueryResponse {
            server_name: "XI".to_owned(),
            players: vec![queried("Dave", 5), queried("Erin", 2)],
            player_count: 2,
            ..QueryResponse::default()
        };
        let status: GameServerStatus =
            GameServerStatus::merge(query, &[rcon("Dave", "ABC123"), rcon("Mallory", "FFF")]);

        assert_eq!(status.server_name, "XI");
        assert_eq!(status.players.len(), 2);

        let dave: &StatusPlayer = &status.players[0];
        assert_eq!(dave.name, "Dave");
        assert_eq!(dave.guid, "ABC123");
        assert_eq!(dave.score, 5);
        assert_eq!(dave.ip_address, "10.0.0.1");
        assert_eq!(dave.rate, Some(25000));
        assert_eq!(dave.slot, Some(7));

        let erin: &StatusPlayer = &status.players[1];
        assert_eq!(erin.guid, "");
        assert_eq!(erin.ip_address, "");
        assert_eq!(erin.slot, None);
    }

    #[test]
    fn names_match_across_case_and_normalization() {
        assert_eq!(normalize_name("  DAVE "), normalize_name("dave"));
        // precomposed vs combining accent
        assert_eq!(normalize_name("Jos\u{e9}"), normalize_name("Jose\u{301}"));
        // fullwidth forms fold under NFKC
        assert_eq!(normalize_name("\u{ff24}ave"), "dave");

        let query: QueryResponse = QueryResponse {
            players: vec![queried("Jos\u{e9}", 1)],
            ..QueryResponse::default()
        };
        let status: GameServerStatus = GameServerStatus::merge(query, &[rcon("JOSE\u{301}", "G1")]);
        assert_eq!(status.players[0].guid, "G1");
        assert_eq!(status.players[0].name, "Jos\u{e9}");
    }

    #[test]
    fn cod_color_reset_does_not_break_the_join() {
        assert_eq!(normalize_name("Dave^7"), "dave");
        assert_eq!(normalize_name("^1Red^2Green^7"), "redgreen");

        let query: QueryResponse =
            parse_status_response("statusResponse\n\\sv_hostname\\XI\\mapname\\mp_crash\n15 48 \"Dave\"\n");
        let rcon_players: Vec<RconPlayer> = StatusGrammar::CallOfDuty4.parse(
            "map: mp_crash
num score ping guid                             name            lastmsg address               qport rate
--- ----- ---- -------------------------------- --------------- ------- --------------------- ----- -----
  0    15   48 0123456789abcdef0123456789abcdef Dave^7                0 81.2.3.4:28960        12345 25000
",
        );
        assert_eq!(rcon_players[0].name, "Dave^7");

        let status: GameServerStatus = GameServerStatus::merge(query, &rcon_players);
        assert_eq!(status.players[0].name, "Dave");
        assert_eq!(status.players[0].guid, "0123456789abcdef0123456789abcdef");
        assert_eq!(status.players[0].ip_address, "81.2.3.4");
    }

    /// Answers with the roster, or fails as if the server hung up.
    struct FakeQuery(Option<QueryResponse>);

    #[async_trait]
    impl QueryClient for FakeQuery {
        async fn server_status(&self) -> Result<QueryResponse, GameServerError> {
            self.0.clone().ok_or(GameServerError::ConnectionClosed)
        }
    }

    enum FakeRcon {
        Players(Vec<RconPlayer>),
        Refused,
        Cancelled,
    }

    #[async_trait]
    impl RconClient for FakeRcon {
        async fn execute(&self, _command: RconCommand) -> Result<String, GameServerError> {
            Ok(String::new())
        }

        async fn players(&self) -> Result<Vec<RconPlayer>, GameServerError> {
            match self {
                FakeRcon::Players(players) => Ok(players.clone()),
                FakeRcon::Refused => Err(GameServerError::AuthenticationFailed("fake".to_owned())),
                FakeRcon::Cancelled => Err(GameServerError::Cancelled),
            }
        }
    }

    fn roster() -> FakeQuery {
        FakeQuery(Some(QueryResponse {
            server_name: "XI".to_owned(),
            players: vec![queried("Dave", 5)],
            player_count: 1,
            ..QueryResponse::default()
        }))
    }

    #[tokio::test]
    async fn fetch_joins_both_protocols() {
        let rcon: FakeRcon = FakeRcon::Players(vec![rcon("Dave", "ABC123")]);
        let status: GameServerStatus = GameServerStatus::fetch(&roster(), Some(&rcon)).await.unwrap();
        assert_eq!(status.server_name, "XI");
        assert_eq!(status.players[0].guid, "ABC123");

        let status: GameServerStatus = GameServerStatus::fetch(&roster(), None).await.unwrap();
        assert_eq!(status.players[0].guid, "");
    }

    #[tokio::test]
    async fn fetch_returns_query_errors() {
        let query: FakeQuery = FakeQuery(None);
        let rcon: FakeRcon = FakeRcon::Players(vec![rcon("Dave", "ABC123")]);
        assert!(matches!(
            GameServerStatus::fetch(&query, Some(&rcon)).await,
            Err(GameServerError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn fetch_keeps_roster_when_rcon_fails() {
        let status: GameServerStatus = GameServerStatus::fetch(&roster(), Some(&FakeRcon::Refused))
            .await
            .unwrap();
        assert_eq!(status.players.len(), 1);
        assert_eq!(status.players[0].name, "Dave");
        assert_eq!(status.players[0].guid, "");
        assert_eq!(status.players[0].slot, None);
    }

    #[tokio::test]
    async fn fetch_passes_cancellation_through() {
        assert!(matches!(
            GameServerStatus::fetch(&roster(), Some(&FakeRcon::Cancelled)).await,
            Err(GameServerError::Cancelled)
        ));
    }
}
