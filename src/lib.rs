//! Async clients for querying and remote-controlling dedicated game servers.
//!
//! Two protocol families are supported:
//! - Quake3 out-of-band UDP (`getstatus` and `rcon`), spoken by Call of Duty 2, 4 and 5
//! - Source engine [A2S queries](https://developer.valvesoftware.com/wiki/Server_queries)
//!   and [Source RCON](https://developer.valvesoftware.com/wiki/Source_RCON_Protocol) over TCP
pub mod codec;
pub mod config;
pub mod error;
pub mod factory;
pub mod game;
pub mod info;
pub mod packet;
pub mod players;
pub mod query;
pub mod rcon;
pub mod server_status;
pub mod status;
pub mod udp;
mod parse;

pub use config::ClientConfig;
pub use error::GameServerError;
pub use factory::{ClientRegistry, QueryClientFactory, RconClientFactory, ServerKey};
pub use game::{GameType, ServerEndpoint};
pub use query::{QueryClient, QueryPlayer, QueryResponse};
pub use rcon::{RconClient, RconCommand, RconPlayer, RetrySpec};
pub use server_status::GameServerStatus;
