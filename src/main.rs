use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::info;

use gsproto::{
    ClientConfig, ClientRegistry, GameServerStatus, GameType, QueryClient, QueryResponse, RconClient,
    RetrySpec, ServerEndpoint, ServerKey,
};

/// Query and remote-control Call of Duty and Source engine servers.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Game type, e.g. cod2, cod4, cod5, insurgency, l4d2
    #[arg(short, long)]
    game: String,
    /// Server hostname or IP address
    #[arg(short = 'H', long)]
    host: String,
    /// Query port, also used for RCON
    #[arg(short, long)]
    port: u16,
    /// RCON password
    #[arg(long, default_value = "")]
    password: String,
    /// Query timeout in seconds
    #[arg(long, default_value = "5")]
    timeout: u64,
    /// Comma separated RCON retry delays in milliseconds, randomized if omitted
    #[arg(long, value_delimiter = ',')]
    retry_ms: Option<Vec<u64>>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Server parameters and players from the query protocol
    Query,
    /// Player table from RCON `status`
    Players,
    /// Query roster merged with RCON player details
    Status,
    /// Run an RCON command
    Rcon {
        #[command(subcommand)]
        action: RconAction,
    },
}

#[derive(Subcommand, Debug)]
enum RconAction {
    Status,
    Kick { slot: u32 },
    Ban { slot: u32 },
    Say { message: String },
    RestartMap,
    NextMap,
    MapRotation,
    /// Shut the server process down
    Quit,
}

fn print_query(response: &QueryResponse) {
    println!("{} ({}) on {}", response.server_name, response.mod_name, response.map);
    println!("{}/{} players", response.player_count, response.max_players);
    let mut keys: Vec<&String> = response.params.keys().collect();
    keys.sort();
    for key in keys {
        println!("  {key} = {}", response.params[key]);
    }
    for player in &response.players {
        println!("{:>6} {:>5} {}", player.score, player.ping.unwrap_or(0), player.name);
    }
}

async fn run(args: Args, registry: &ClientRegistry) -> Result<(), Box<dyn std::error::Error>> {
    let game_type: GameType = args.game.parse()?;
    let endpoint: ServerEndpoint = ServerEndpoint::new(game_type, args.host, args.port, args.password);
    let key: ServerKey = ServerKey::from(&endpoint);
    let retry: Option<RetrySpec> = args
        .retry_ms
        .map(|delays| RetrySpec::new(delays.into_iter().map(Duration::from_millis).collect()));
    let server_name: String = format!("{}:{}", endpoint.hostname, endpoint.query_port);

    let query_client = || -> Result<Arc<dyn QueryClient>, gsproto::GameServerError> {
        registry.query_client(key.clone(), game_type, &endpoint.hostname, endpoint.query_port)
    };
    let rcon_client = || -> Result<Arc<dyn RconClient>, gsproto::GameServerError> {
        registry.rcon_client(key.clone(), &server_name, endpoint.clone(), retry.clone())
    };

    match args.command {
        Command::Query => print_query(&query_client()?.server_status().await?),
        Command::Players => {
            for player in rcon_client()?.players().await? {
                println!(
                    "{:>3} {:>6} {:>4} {:<32} {:<16} {} {}",
                    player.slot, player.score, player.ping, player.guid, player.ip_address, player.rate, player.name
                );
            }
        }
        Command::Status => {
            let rcon: Option<Arc<dyn RconClient>> = if endpoint.rcon_password.is_empty() {
                None
            } else {
                Some(rcon_client()?)
            };
            let status: GameServerStatus = GameServerStatus::fetch(query_client()?.as_ref(), rcon.as_deref()).await?;
            println!("{} on {}", status.server_name, status.map);
            for player in &status.players {
                println!("{:>6} {:<32} {:<16} {}", player.score, player.guid, player.ip_address, player.name);
            }
        }
        Command::Rcon { action } => {
            let client: Arc<dyn RconClient> = rcon_client()?;
            let output: String = match action {
                RconAction::Status => client.player_status().await?,
                RconAction::Kick { slot } => client.kick_player(slot).await?,
                RconAction::Ban { slot } => client.ban_player(slot).await?,
                RconAction::Say { message } => client.say(&message).await?,
                RconAction::RestartMap => client.restart_map().await?,
                RconAction::NextMap => client.next_map().await?,
                RconAction::MapRotation => client.map_rotation().await?,
                RconAction::Quit => client.restart_server().await?,
            };
            print!("{output}");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = Args::parse();

    let config: ClientConfig = ClientConfig {
        query_timeout: Duration::from_secs(args.timeout),
        ..ClientConfig::default()
    };
    let registry: ClientRegistry = ClientRegistry::new(config);

    tokio::select! {
        result = run(args, &registry) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, cancelling outstanding requests");
            registry.shutdown();
            Ok(())
        }
    }
}
