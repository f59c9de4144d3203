mod net;

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;

use arena::sync::SessionState;
use arena::{Team, VehicleKind};

use net::{ClientConfig, NetworkClient, Script};

#[derive(Parser)]
#[command(name = "arena-client")]
#[command(about = "Headless vehicle arena client")]
struct Args {
    #[arg(
        short,
        long,
        default_value = "127.0.0.1:27015",
        help = "Server address to connect to"
    )]
    server: String,

    #[arg(short, long, default_value = "driver")]
    nickname: String,

    #[arg(long)]
    password: Option<String>,

    #[arg(long, value_parser = parse_team, default_value = "none")]
    team: Team,

    #[arg(long, value_parser = parse_vehicle, default_value = "buggy")]
    vehicle: VehicleKind,

    #[arg(long, value_enum, default_value_t = Script::Forward)]
    script: Script,

    #[arg(long, default_value_t = 64, help = "Largest roster to track; match the server's max players")]
    max_players: usize,

    #[arg(short, long, default_value_t = 0, help = "Seconds to stay connected, 0 for forever")]
    duration: u64,

    #[arg(long, default_value_t = 5)]
    status_secs: u64,
}

fn parse_team(value: &str) -> Result<Team, String> {
    [Team::None, Team::Blue, Team::Red]
        .into_iter()
        .find(|t| t.as_str().eq_ignore_ascii_case(value))
        .ok_or_else(|| format!("unknown team '{}'", value))
}

fn parse_vehicle(value: &str) -> Result<VehicleKind, String> {
    VehicleKind::ALL
        .into_iter()
        .find(|k| k.as_str().eq_ignore_ascii_case(value))
        .ok_or_else(|| format!("unknown vehicle '{}'", value))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let server: SocketAddr = args
        .server
        .parse()
        .with_context(|| format!("invalid server address {}", args.server))?;

    let config = ClientConfig {
        nickname: args.nickname,
        password: args.password,
        team: args.team,
        vehicle: args.vehicle,
        script: args.script,
        max_players: args.max_players,
        ..ClientConfig::default()
    };

    let mut client = NetworkClient::connect(server, config)?;
    let started = Instant::now();
    let limit = (args.duration > 0).then(|| Duration::from_secs(args.duration));
    let status_every = Duration::from_secs(args.status_secs.max(1));
    let mut last_status = Instant::now();

    loop {
        client.update();

        if client.is_finished() {
            break;
        }
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
        if last_status.elapsed() >= status_every {
            last_status = Instant::now();
            log::info!("{}", client.status_line());
        }

        std::thread::sleep(client.until_next().min(Duration::from_millis(2)));
    }

    for (rank, entry) in client.sync().scores().iter().enumerate() {
        log::info!(
            "#{} client-{} round {} game {}",
            rank + 1,
            entry.player,
            entry.round_score,
            entry.game_score
        );
    }

    match client.state() {
        SessionState::Rejected(reason) => anyhow::bail!("join rejected: {}", reason),
        SessionState::Disconnected => anyhow::bail!("server connection lost"),
        _ => client.disconnect(),
    }

    Ok(())
}
