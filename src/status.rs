//! Parsing of the text printed by the `status` console command.
//!
//! Every engine prints its own table, so each one gets a literal regex.
//! Lines that don't match (headers, bots, connecting clients with no
//! address yet) are skipped.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::rcon::RconPlayer;

/// Which engine printed the `status` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusGrammar {
    CallOfDuty2,
    CallOfDuty4,
    CallOfDuty5,
    Insurgency,
}

/// Ping shown for clients still connecting (`CNCT`) or timing out (`ZMBI`).
pub const UNRESPONSIVE_PING: u32 = 999;

// num score ping guid name lastmsg address qport rate
const COD2_STATUS: &str = r"^\s*(\d+)\s+(-?\d+)\s+(\d+|CNCT|ZMBI)\s+(\d+)\s+(.+?)\s+(\d+)\s+(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}):(-?\d+)\s+(-?\d+)\s+(\d+)$";
const COD4_STATUS: &str = r"^\s*(\d+)\s+(-?\d+)\s+(\d+|CNCT|ZMBI)\s+([0-9a-fA-F]+)\s+(.+?)\s+(\d+)\s+(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}):(-?\d+)\s+(-?\d+)\s+(\d+)$";
const COD5_STATUS: &str = r"^\s*(\d+)\s+(-?\d+)\s+(\d+|CNCT|ZMBI)\s+(\d+)\s+(.+?)\s+(\d+)\s+(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}):(-?\d+)\s+(-?\d+)\s+(\d+)$";
// # userid [slot] "name" uniqueid connected ping loss state rate adr
const SOURCE_STATUS: &str = r#"^#\s*(\d+)\s+(?:\d+\s+)?"(.*)"\s+(\S+)\s+(\d+:\d+(?::\d+)?)\s+(\d+)\s+(\d+)\s+(\w+)\s+(\d+)\s+(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}):(\d+)$"#;

fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    // patterns are literals covered by tests
    cell.get_or_init(|| Regex::new(pattern).expect("invalid status regex"))
}

impl StatusGrammar {
    fn regex(&self) -> &'static Regex {
        static COD2: OnceLock<Regex> = OnceLock::new();
        static COD4: OnceLock<Regex> = OnceLock::new();
        static COD5: OnceLock<Regex> = OnceLock::new();
        static SOURCE: OnceLock<Regex> = OnceLock::new();

        match self {
            StatusGrammar::CallOfDuty2 => compiled(&COD2, COD2_STATUS),
            StatusGrammar::CallOfDuty4 => compiled(&COD4, COD4_STATUS),
            StatusGrammar::CallOfDuty5 => compiled(&COD5, COD5_STATUS),
            StatusGrammar::Insurgency => compiled(&SOURCE, SOURCE_STATUS),
        }
    }

    /// Header lines printed before the player table.
    fn header_lines(&self) -> usize {
        match self {
            // map, column names, dashes
            StatusGrammar::CallOfDuty2 | StatusGrammar::CallOfDuty4 | StatusGrammar::CallOfDuty5 => 3,
            // variable length, rows are recognised by the leading '#'
            StatusGrammar::Insurgency => 0,
        }
    }

    /// Parse a single table row.
    pub fn parse_line(&self, line: &str) -> Option<RconPlayer> {
        let caps: Captures = self.regex().captures(line.trim_end())?;
        match self {
            StatusGrammar::Insurgency => Some(RconPlayer {
                slot: caps[1].parse().ok()?,
                name: caps[2].to_string(),
                guid: caps[3].to_string(),
                ping: caps[5].parse().ok()?,
                rate: caps[8].parse().ok()?,
                ip_address: caps[9].to_string(),
                score: 0,
            }),
            _ => Some(RconPlayer {
                slot: caps[1].parse().ok()?,
                score: caps[2].parse().ok()?,
                ping: caps[3].parse().unwrap_or(UNRESPONSIVE_PING),
                guid: caps[4].to_string(),
                name: caps[5].to_string(),
                ip_address: caps[7].to_string(),
                rate: caps[10].parse().ok()?,
            }),
        }
    }

    /// Parse the whole `status` response into players.
    pub fn parse(&self, status: &str) -> Vec<RconPlayer> {
        status
            .lines()
            .filter(|line| !line.trim().is_empty())
            .skip(self.header_lines())
            .filter_map(|line| self.parse_line(line))
            .collect()
    }
}
