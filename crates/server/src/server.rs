use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use arena::net::{DisconnectReason, NetworkStats};
use arena::sync::{Target, TickOutput};
use arena::{FixedTimestep, Identity, Message, NetEvent, ServerSync, Team, TransportDispatcher};

use crate::config::ServerConfig;
use crate::events::ServerEvent;

/// Owns the socket side and the simulation, and runs them at the fixed tick
/// rate.
pub struct GameServer {
    dispatcher: TransportDispatcher,
    sync: ServerSync,
    timestep: FixedTimestep,
    last_frame: Instant,
    pending_disconnects: Vec<(Identity, DisconnectReason)>,
    pending_events: VecDeque<ServerEvent>,
    running: Arc<AtomicBool>,
    start_time: Instant,
    status_interval: Duration,
}

impl GameServer {
    pub fn new(addr: SocketAddr, config: ServerConfig) -> Result<Self> {
        let dispatcher = TransportDispatcher::bind(addr, config.dispatcher())
            .with_context(|| format!("binding {}", addr))?;
        let timestep = FixedTimestep::new(config.game.tick_rate);

        Ok(Self {
            dispatcher,
            sync: ServerSync::new(config.game),
            timestep,
            last_frame: Instant::now(),
            pending_disconnects: Vec::new(),
            pending_events: VecDeque::new(),
            running: Arc::new(AtomicBool::new(true)),
            start_time: Instant::now(),
            status_interval: Duration::from_secs(config.status_interval_secs.max(1)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.dispatcher.local_addr()
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.pending_events.drain(..)
    }

    /// Headless loop with a periodic status line.
    pub fn run(&mut self) {
        let mut last_status = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            self.tick_once();

            for event in self.pending_events.drain(..) {
                if event.is_warning() {
                    log::warn!("{}", event.describe());
                } else {
                    log::debug!("{}", event.describe());
                }
            }

            if last_status.elapsed() >= self.status_interval {
                last_status = Instant::now();
                log::info!("{}", self.stats().status_line());
            }

            std::thread::sleep(self.timestep.until_next().min(Duration::from_millis(2)));
        }
        self.shutdown_connections();
    }

    /// Runs however many ticks are due since the last call.
    pub fn tick_once(&mut self) {
        let now = Instant::now();
        self.timestep
            .accumulate(now.duration_since(self.last_frame).as_secs_f32());
        self.last_frame = now;

        while self.timestep.consume_tick() {
            self.step(Instant::now());
        }
    }

    fn step(&mut self, now: Instant) {
        let mut events = self.dispatcher.poll(now);
        let kicked: Vec<Identity> = self.pending_disconnects.iter().map(|(id, _)| *id).collect();
        events.extend(
            self.pending_disconnects
                .drain(..)
                .map(|(identity, reason)| NetEvent::Disconnected { identity, reason }),
        );

        let output = self.sync.tick(events);
        self.record_events(&output);
        output.deliver(&mut self.dispatcher, now);

        for identity in kicked {
            self.dispatcher.close_after_flush(identity);
        }
        self.dispatcher.flush(now);
    }

    fn record_events(&mut self, output: &TickOutput) {
        for out in &output.messages {
            let event = match (&out.message, out.target) {
                (Message::PlayerJoined { player, nickname, .. }, Target::All) => ServerEvent::PlayerJoined {
                    identity: Identity(*player),
                    nickname: nickname.clone(),
                },
                (Message::PlayerLeft { player, reason }, _) => ServerEvent::PlayerLeft {
                    identity: Identity(*player),
                    reason: *reason,
                },
                (Message::JoinRejected { reason }, Target::One(identity)) => ServerEvent::JoinRejected {
                    identity,
                    reason: reason.clone(),
                },
                (Message::PlayerDied { player, killer }, _) => ServerEvent::PlayerDied {
                    victim: Identity(*player),
                    killer: killer.map(Identity),
                },
                (Message::ChatMessage { from: Some(from), text }, _) => ServerEvent::Chat {
                    identity: Identity(*from),
                    text: text.clone(),
                },
                _ => continue,
            };
            self.pending_events.push_back(event);
        }

        let round_ticks = self.sync.config().round_ticks;
        if round_ticks > 0 && output.tick > 0 && output.tick % round_ticks == 0 {
            self.pending_events.push_back(ServerEvent::RoundEnded);
        }
    }

    /// Removes the player on the next tick and closes the connection.
    pub fn kick(&mut self, identity: Identity) {
        if self.dispatcher.is_connected(identity) {
            self.pending_disconnects
                .push((identity, DisconnectReason::Kicked));
        } else {
            self.pending_events.push_back(ServerEvent::Error {
                message: format!("cannot kick {}: not connected", identity),
            });
        }
    }

    pub fn end_round(&mut self) {
        self.sync.end_round();
        self.pending_events.push_back(ServerEvent::RoundEnded);
    }

    pub fn shutdown_connections(&mut self) {
        let players: Vec<Identity> = self.sync.players().iter().map(|(_, p)| p.identity).collect();
        let count = players.len();
        for identity in players {
            self.kick(identity);
        }
        self.step(Instant::now());
        log::info!("closed {} connections", count);
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            tick: self.sync.current_tick(),
            player_count: self.sync.players().len(),
            max_players: self.sync.config().max_players,
            vehicle_count: self.sync.physics().vehicle_count(),
            pickup_count: self.sync.pickups().active().count(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            network_stats: self.dispatcher.stats(),
        }
    }

    pub fn player_infos(&self) -> Vec<PlayerInfo> {
        let players = self.sync.players();
        players
            .score_order()
            .into_iter()
            .filter_map(|id| players.get(id))
            .map(|p| PlayerInfo {
                identity: p.identity,
                nickname: p.nickname.clone(),
                team: p.team,
                is_vip: p.is_vip,
                alive: p.alive,
                health: p.health,
                round_score: p.round_score,
                game_score: p.game_score,
                rtt_ms: self.dispatcher.rtt_ms(p.identity),
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ServerStats {
    pub tick: u32,
    pub player_count: usize,
    pub max_players: usize,
    pub vehicle_count: usize,
    pub pickup_count: usize,
    pub uptime_secs: u64,
    pub network_stats: NetworkStats,
}

impl ServerStats {
    pub fn status_line(&self) -> String {
        let net = &self.network_stats;
        format!(
            "tick {} | players {}/{} | vehicles {} | pickups {} | rtt {:.1}ms | {} sent / {} recv | {} dropped | {} malformed",
            self.tick,
            self.player_count,
            self.max_players,
            self.vehicle_count,
            self.pickup_count,
            net.rtt_ms,
            net.packets_sent,
            net.packets_received,
            net.dropped_inbound + net.dropped_outbound,
            net.malformed,
        )
    }
}

#[derive(Debug, Clone)]
pub struct PlayerInfo {
    pub identity: Identity,
    pub nickname: String,
    pub team: Team,
    pub is_vip: bool,
    pub alive: bool,
    pub health: f32,
    pub round_score: u32,
    pub game_score: u32,
    pub rtt_ms: Option<f32>,
}
