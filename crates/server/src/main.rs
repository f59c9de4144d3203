mod config;
mod events;
mod server;
mod tui;

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use config::ServerConfig;
use server::GameServer;
use tui::TuiState;

#[derive(Parser)]
#[command(name = "arena-server")]
#[command(about = "Vehicle arena game server")]
struct Args {
    /// TOML file with server and game settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    bind: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,

    #[arg(short, long)]
    tick_rate: Option<u32>,

    #[arg(long)]
    broadcast_rate: Option<u32>,

    #[arg(short, long)]
    max_players: Option<usize>,

    #[arg(long)]
    password: Option<String>,

    #[arg(long, help = "Seed for spawn positions and pickups")]
    seed: Option<u64>,

    #[arg(long, help = "Ticks per round, 0 for endless")]
    round_ticks: Option<u32>,

    #[arg(long)]
    headless: bool,
}

impl Args {
    fn into_config(self) -> Result<(ServerConfig, bool)> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(tick_rate) = self.tick_rate {
            config.game.tick_rate = tick_rate;
        }
        if let Some(broadcast_rate) = self.broadcast_rate {
            config.game.broadcast_rate = broadcast_rate;
        }
        if let Some(max_players) = self.max_players {
            config.game.max_players = max_players;
        }
        if self.password.is_some() {
            config.game.password = self.password;
        }
        if self.seed.is_some() {
            config.game.seed = self.seed;
        }
        if let Some(round_ticks) = self.round_ticks {
            config.game.round_ticks = round_ticks;
        }

        Ok((config, self.headless))
    }
}

fn main() -> Result<()> {
    let (config, headless) = Args::parse().into_config()?;
    let bind_addr: SocketAddr = format!("{}:{}", config.bind, config.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", config.bind, config.port))?;

    let mut server = GameServer::new(bind_addr, config)?;

    if headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
        log::info!("Server started on {}", server.local_addr());
        server.run();
        log::info!("Server shutting down");
    } else {
        run_with_tui(&mut server)?;
    }

    Ok(())
}

fn run_with_tui(server: &mut GameServer) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let running = server.running();
    let mut tui_state = TuiState::new();

    tui_state.log_info(format!("Server started on {}", server.local_addr()));

    while running.load(Ordering::SeqCst) {
        server.tick_once();

        for event in server.drain_events() {
            match event {
                events::ServerEvent::Error { message } => tui_state.log_error(message),
                event if event.is_warning() => tui_state.log_warn(event.describe()),
                event => tui_state.log_info(event.describe()),
            }
        }

        if let Some(identity) = tui_state.take_pending_kick() {
            server.kick(identity);
        }
        if tui_state.take_end_round() {
            server.end_round();
        }

        if event::poll(Duration::from_millis(1))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    let players = server.player_infos();
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => {
                            running.store(false, Ordering::SeqCst);
                        }
                        KeyCode::Up => tui_state.select_prev(players.len()),
                        KeyCode::Down => tui_state.select_next(players.len()),
                        KeyCode::Char('k') | KeyCode::Char('K') => tui_state.request_kick(&players),
                        KeyCode::Char('r') | KeyCode::Char('R') => tui_state.request_end_round(),
                        _ => {}
                    }
                }
            }
        }

        let stats = server.stats();
        let players = server.player_infos();
        terminal.draw(|frame| {
            tui::render(frame, &tui_state, &stats, &players);
        })?;
    }

    server.shutdown_connections();

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    Ok(())
}
