use std::net::SocketAddr;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use arena::net::SERVER_IDENTITY;
use arena::sync::SessionState;
use arena::{ClientSync, FixedTimestep, Message, Team, TransportDispatcher};

use super::config::ClientConfig;

/// Client tick rate used until the server announces its own.
const FALLBACK_TICK_RATE: u32 = 60;

/// A headless player: joins, picks a team, spawns and drives a script.
pub struct NetworkClient {
    dispatcher: TransportDispatcher,
    sync: ClientSync,
    config: ClientConfig,
    timestep: FixedTimestep,
    last_frame: Instant,
    tick: u32,
    setup_sent: bool,
    dead_since: Option<u32>,
}

impl NetworkClient {
    pub fn connect(server: SocketAddr, config: ClientConfig) -> Result<Self> {
        log::info!("Connecting to {}", server);

        let mut dispatcher = TransportDispatcher::connect(server, config.dispatcher.clone())
            .with_context(|| format!("connecting to {}", server))?;
        let mut sync = ClientSync::headless(config.max_players);

        let now = Instant::now();
        let join = sync.join_request(&config.nickname, config.password.clone());
        dispatcher.unicast(SERVER_IDENTITY, join, now);
        dispatcher.flush(now);

        Ok(Self {
            dispatcher,
            sync,
            config,
            timestep: FixedTimestep::new(FALLBACK_TICK_RATE),
            last_frame: now,
            tick: 0,
            setup_sent: false,
            dead_since: None,
        })
    }

    pub fn state(&self) -> &SessionState {
        self.sync.state()
    }

    pub fn sync(&self) -> &ClientSync {
        &self.sync
    }

    /// Done once rejected or disconnected.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.sync.state(),
            SessionState::Rejected(_) | SessionState::Disconnected
        )
    }

    pub fn update(&mut self) {
        let now = Instant::now();
        self.timestep
            .accumulate(now.duration_since(self.last_frame).as_secs_f32());
        self.last_frame = now;

        self.sync.handle(self.dispatcher.poll(now));
        self.adopt_server_rate();

        while self.timestep.consume_tick() {
            self.step(now);
        }
        self.dispatcher.flush(now);
    }

    pub fn until_next(&self) -> Duration {
        self.timestep.until_next()
    }

    fn adopt_server_rate(&mut self) {
        let rate = self.sync.tick_rate();
        if rate > 0 && rate != self.timestep.tick_rate() {
            log::debug!("switching to server tick rate {}", rate);
            self.timestep = FixedTimestep::new(rate);
        }
    }

    fn step(&mut self, now: Instant) {
        if !self.sync.is_joined() {
            return;
        }

        if !self.setup_sent {
            self.setup_sent = true;
            if self.config.team != Team::None {
                self.send(Message::TeamSelect {
                    team: self.config.team,
                }, now);
            }
            self.request_spawn(now);
        }

        let local = self.sync.local_identity();
        let driving = local
            .and_then(|id| self.sync.players().get_by_identity(id))
            .is_some_and(|p| p.is_driving());

        if driving {
            self.dead_since = None;
        } else {
            let since = *self.dead_since.get_or_insert(self.tick);
            if self.tick.wrapping_sub(since) >= self.config.respawn_after_ticks {
                self.dead_since = Some(self.tick);
                self.request_spawn(now);
            }
        }

        let input = self.config.script.sample(self.tick, self.timestep.tick_rate());
        if let Some(message) = self.sync.sample_input(input) {
            self.send(message, now);
        }
        self.tick = self.tick.wrapping_add(1);
    }

    fn request_spawn(&mut self, now: Instant) {
        self.send(Message::SpawnRequest {
            vehicle: self.config.vehicle,
        }, now);
    }

    fn send(&mut self, message: Message, now: Instant) {
        if !self.dispatcher.unicast(SERVER_IDENTITY, message, now) {
            log::warn!("outbound queue full, dropping message");
        }
    }

    pub fn disconnect(&mut self) {
        let now = Instant::now();
        if self.sync.is_joined() {
            self.send(Message::Quit, now);
            self.dispatcher.flush(now);
        }
        log::info!("Disconnected");
    }

    pub fn status_line(&self) -> String {
        let sync = &self.sync;
        let position = sync
            .local_identity()
            .and_then(|id| sync.vehicle_state(id))
            .map(|s| {
                let p = s.position();
                format!("({:.1}, {:.1}, {:.1})", p.x, p.y, p.z)
            })
            .unwrap_or_else(|| "-".to_string());
        let score = sync
            .local_identity()
            .and_then(|id| sync.players().get_by_identity(id))
            .map(|p| p.round_score)
            .unwrap_or(0);

        format!(
            "{:?} | players {} | pickups {} | at {} | score {} | rtt {}",
            sync.state(),
            sync.players().len(),
            sync.pickups().len(),
            position,
            score,
            self.dispatcher
                .rtt_ms(SERVER_IDENTITY)
                .map(|ms| format!("{:.1}ms", ms))
                .unwrap_or_else(|| "-".to_string()),
        )
    }
}
