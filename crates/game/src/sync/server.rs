use std::collections::HashSet;
use std::f32::consts::PI;
use std::time::Instant;

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::config::SyncConfig;
use crate::input::InputSample;
use crate::net::{
    DisconnectReason, MAX_CHAT_LEN, MAX_NICKNAME_LEN, MAX_SNAPSHOTS_PER_BATCH, Message,
    MessageHandler, NetEvent, ScoreEntry, SnapshotEntry, TransportDispatcher, route,
    sequence_greater_than,
};
use crate::physics::{PhysicsWorld, VehicleKind};
use crate::pickup::{PickupError, PickupEvent, PickupId, PickupKind, PickupManager};
use crate::player::{DirectoryError, Effects, Identity, MAX_HEALTH, PlayerDirectory, SnapshotOutcome, Team};
use crate::snapshot::VehicleSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    All,
    One(Identity),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub target: Target,
    pub message: Message,
}

#[derive(Debug, Default)]
pub struct TickOutput {
    pub tick: u32,
    /// In send order. A connection starts receiving `Target::All` messages
    /// right after its `JoinAccepted`.
    pub messages: Vec<Outgoing>,
    pub closed: Vec<Identity>,
}

impl TickOutput {
    pub fn broadcasts(&self) -> impl Iterator<Item = &Message> + '_ {
        self.messages
            .iter()
            .filter(|out| out.target == Target::All)
            .map(|out| &out.message)
    }

    pub fn sent_to(&self, identity: Identity) -> impl Iterator<Item = &Message> + '_ {
        self.messages
            .iter()
            .filter(move |out| out.target == Target::All || out.target == Target::One(identity))
            .map(|out| &out.message)
    }

    pub fn deliver(self, dispatcher: &mut TransportDispatcher, now: Instant) {
        for out in self.messages {
            match out.target {
                Target::All => {
                    dispatcher.broadcast(out.message, now);
                }
                Target::One(identity) => {
                    let accepted = matches!(out.message, Message::JoinAccepted { .. });
                    dispatcher.unicast(identity, out.message, now);
                    if accepted {
                        dispatcher.mark_joined(identity);
                    }
                }
            }
        }

        for identity in self.closed {
            dispatcher.close_after_flush(identity);
        }
    }
}

/// The authoritative simulation.
pub struct ServerSync {
    config: SyncConfig,
    players: PlayerDirectory,
    pickups: PickupManager,
    physics: PhysicsWorld,
    rng: StdRng,
    tick: u32,
    contacts: HashSet<(Identity, Identity)>,
    scores_dirty: bool,
    output: TickOutput,
}

impl ServerSync {
    pub fn new(config: SyncConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut physics = PhysicsWorld::new(config.drive);
        physics.add_ground(config.arena.floor_half_size());

        Self {
            players: PlayerDirectory::with_capacity(config.max_players),
            pickups: PickupManager::new(config.arena, config.pickups),
            physics,
            rng,
            tick: 0,
            contacts: HashSet::new(),
            scores_dirty: false,
            output: TickOutput::default(),
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn current_tick(&self) -> u32 {
        self.tick
    }

    pub fn players(&self) -> &PlayerDirectory {
        &self.players
    }

    pub fn pickups(&self) -> &PickupManager {
        &self.pickups
    }

    pub fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    pub fn physics_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.physics
    }

    pub fn vehicle_state(&self, identity: Identity) -> Option<VehicleSnapshot> {
        let handle = self.players.get_by_identity(identity)?.vehicle?;
        self.physics.vehicle_state(handle)
    }

    pub fn spawn_pickup(&mut self, kind: PickupKind, position: Vec3) -> Result<PickupId, PickupError> {
        self.pickups.spawn(kind, position, self.tick)
    }

    pub fn tick(&mut self, events: Vec<NetEvent>) -> TickOutput {
        let tick = self.tick;
        self.output = TickOutput {
            tick,
            ..TickOutput::default()
        };

        for event in events {
            match event {
                NetEvent::Message { from, message } => route(self, from, message),
                NetEvent::Disconnected { identity, reason } => self.remove_player(identity, reason),
            }
        }

        self.drive_vehicles();
        self.physics.advance(self.config.dt());
        self.resolve_collisions();
        self.check_fall_out();

        self.pickups.refill(tick, &mut self.rng);
        self.pickups
            .collect_overlaps(tick, &mut self.players, &self.physics, &mut self.rng);
        self.publish_pickup_events();

        self.publish_snapshots(tick);

        let round_ticks = self.config.round_ticks;
        if round_ticks > 0 && tick > 0 && tick % round_ticks == 0 {
            self.end_round();
        }
        if self.scores_dirty {
            let scores = self.score_entries();
            self.broadcast(Message::ScoreSync { scores });
            self.scores_dirty = false;
        }

        self.pickups.reap(tick);
        self.tick = tick.wrapping_add(1);

        std::mem::take(&mut self.output)
    }

    pub fn end_round(&mut self) {
        self.players.end_round();
        self.scores_dirty = true;
        log::info!("round ended at tick {}", self.tick);
    }

    pub fn score_entries(&self) -> Vec<ScoreEntry> {
        self.players
            .score_order()
            .into_iter()
            .filter_map(|id| self.players.get(id))
            .map(|p| ScoreEntry {
                player: p.identity.0,
                round_score: p.round_score,
                game_score: p.game_score,
            })
            .collect()
    }

    fn send(&mut self, to: Identity, message: Message) {
        self.output.messages.push(Outgoing {
            target: Target::One(to),
            message,
        });
    }

    fn broadcast(&mut self, message: Message) {
        self.output.messages.push(Outgoing {
            target: Target::All,
            message,
        });
    }

    fn reject(&mut self, from: Identity, reason: &str, close: bool) {
        log::info!("rejecting join from {}: {}", from, reason);
        self.send(
            from,
            Message::JoinRejected {
                reason: reason.to_string(),
            },
        );
        if close {
            self.output.closed.push(from);
        }
    }

    fn send_world_state(&mut self, to: Identity) {
        let mut messages = Vec::new();

        for (_, player) in self.players.iter() {
            if player.identity == to {
                continue;
            }
            messages.push(Message::PlayerJoined {
                player: player.identity.0,
                nickname: player.nickname.clone(),
                team: player.team,
            });
            if player.is_vip && player.team != Team::None {
                messages.push(Message::VipDeclared {
                    team: player.team,
                    player: player.identity.0,
                });
            }
            if !player.is_driving() {
                continue;
            }
            let state = player.vehicle.and_then(|h| self.physics.vehicle_state(h));
            if let (Some(vehicle), Some(state)) = (player.vehicle_kind, state) {
                messages.push(Message::PlayerSpawned {
                    player: player.identity.0,
                    vehicle,
                    state,
                });
            }
        }

        for pickup in self.pickups.active() {
            messages.push(Message::PickupSpawn {
                pickup: pickup.id.raw(),
                kind: pickup.kind,
                position: pickup.position.to_array(),
            });
        }

        for message in messages {
            self.send(to, message);
        }
    }

    fn remove_player(&mut self, identity: Identity, reason: DisconnectReason) {
        let Some(player) = self.players.leave(identity, &mut self.physics) else {
            return;
        };
        self.contacts.retain(|(a, b)| *a != identity && *b != identity);

        self.broadcast(Message::PlayerLeft {
            player: identity.0,
            reason,
        });
        if player.is_vip {
            self.elect_vip(player.team);
        }
        self.scores_dirty = true;
    }

    fn elect_vip(&mut self, team: Team) {
        if team == Team::None {
            return;
        }
        match self.players.select_vip(team, &mut self.rng) {
            Ok(id) => {
                let Some(identity) = self.players.get(id).map(|p| p.identity) else {
                    return;
                };
                log::info!("{} is the {} VIP", identity, team.as_str());
                self.broadcast(Message::VipDeclared {
                    team,
                    player: identity.0,
                });
            }
            Err(e) => log::debug!("no VIP elected: {}", e),
        }
    }

    fn drive_vehicles(&mut self) {
        let dt = self.config.dt();
        for (_, player) in self.players.iter_mut() {
            player.effects.tick();
            if !player.is_driving() {
                continue;
            }
            if let Some(handle) = player.vehicle {
                self.physics
                    .drive(handle, &player.last_input, player.drive_modifiers(), dt);
            }
        }
    }

    fn resolve_collisions(&mut self) {
        let combat = self.config.combat;
        let vehicles: Vec<(Identity, Vec3, Vec3, f32)> = self
            .players
            .iter()
            .filter(|(_, p)| p.is_driving())
            .filter_map(|(_, p)| {
                let state = p.vehicle.and_then(|h| self.physics.vehicle_state(h))?;
                Some((
                    p.identity,
                    state.position(),
                    state.linear_velocity(),
                    p.drive_modifiers().mass_scale,
                ))
            })
            .collect();

        let reach_sq = combat.contact_distance * combat.contact_distance;
        let mut touching = HashSet::new();
        let mut hits = Vec::new();

        for (i, &(a, pos_a, vel_a, mass_a)) in vehicles.iter().enumerate() {
            for &(b, pos_b, vel_b, mass_b) in &vehicles[i + 1..] {
                if pos_a.distance_squared(pos_b) > reach_sq {
                    continue;
                }
                let pair = (a.min(b), a.max(b));
                touching.insert(pair);
                if self.contacts.contains(&pair) {
                    continue;
                }

                let closing = (vel_a - vel_b).length();
                if closing < combat.min_impact_speed {
                    continue;
                }
                let base = (closing - combat.min_impact_speed) * combat.damage_per_speed;
                if vel_a.length_squared() >= vel_b.length_squared() {
                    hits.push((b, a, base * mass_a / mass_b));
                } else {
                    hits.push((a, b, base * mass_b / mass_a));
                }
            }
        }
        self.contacts = touching;

        for (victim, attacker, damage) in hits {
            let died = self
                .players
                .get_by_identity_mut(victim)
                .is_some_and(|p| p.damage(damage, Some(attacker)));
            log::debug!("{} rammed {} for {:.1}", attacker, victim, damage);
            if died {
                self.kill_player(victim, Some(attacker));
            }
        }
    }

    fn check_fall_out(&mut self) {
        let fallen: Vec<(Identity, Option<Identity>)> = self
            .players
            .iter()
            .filter(|(_, p)| p.is_driving())
            .filter_map(|(_, p)| {
                let state = p.vehicle.and_then(|h| self.physics.vehicle_state(h))?;
                self.config
                    .arena
                    .is_fallen(state.position())
                    .then_some((p.identity, p.last_attacker))
            })
            .collect();

        for (victim, attacker) in fallen {
            self.kill_player(victim, attacker);
        }
    }

    fn kill_player(&mut self, victim: Identity, killer: Option<Identity>) {
        let Some(player) = self.players.get_by_identity_mut(victim) else {
            return;
        };
        if !player.alive {
            return;
        }
        player.alive = false;
        player.health = 0.0;
        player.effects = Effects::default();
        player.last_input = InputSample::IDLE;
        let vehicle = player.vehicle.take();

        if let Some(handle) = vehicle {
            self.physics.release_vehicle(handle);
        }

        let killer = killer.filter(|k| *k != victim && self.players.contains(*k));
        if let Some(killer) = killer {
            if self.players.add_score(killer, self.config.combat.kill_points).is_ok() {
                self.scores_dirty = true;
            }
        }

        match killer {
            Some(killer) => log::info!("{} was destroyed by {}", victim, killer),
            None => log::info!("{} was destroyed", victim),
        }
        self.broadcast(Message::PlayerDied {
            player: victim.0,
            killer: killer.map(|k| k.0),
        });
    }

    fn publish_pickup_events(&mut self) {
        for event in self.pickups.drain_events() {
            let message = match event {
                PickupEvent::Spawned { id, kind, position } => Message::PickupSpawn {
                    pickup: id.raw(),
                    kind,
                    position: position.to_array(),
                },
                PickupEvent::Collected { id, collector } => Message::PickupCollect {
                    pickup: id.raw(),
                    collector: collector.0,
                },
            };
            self.broadcast(message);
        }
    }

    fn publish_snapshots(&mut self, tick: u32) {
        let mut entries = Vec::new();

        for id in self.players.ids() {
            let Some((identity, handle)) = self
                .players
                .get(id)
                .filter(|p| p.is_driving())
                .and_then(|p| Some((p.identity, p.vehicle?)))
            else {
                continue;
            };
            let Some(state) = self.physics.vehicle_state(handle) else {
                continue;
            };

            match self.players.record_snapshot(id, tick, state) {
                SnapshotOutcome::Applied => entries.push(SnapshotEntry {
                    player: identity.0,
                    snapshot: state,
                }),
                outcome => log::warn!("{} snapshot not recorded: {:?}", identity, outcome),
            }
        }

        if entries.is_empty() || tick % self.config.broadcast_interval() != 0 {
            return;
        }
        for chunk in entries.chunks(MAX_SNAPSHOTS_PER_BATCH) {
            self.broadcast(Message::VehicleSnapshotBatch {
                tick,
                entries: chunk.to_vec(),
            });
        }
    }
}

impl MessageHandler for ServerSync {
    fn on_join(&mut self, from: Identity, nickname: String, password: Option<String>) {
        if self.players.contains(from) {
            self.reject(from, "Already joined", false);
            return;
        }

        let nickname: String = nickname.trim().chars().take(MAX_NICKNAME_LEN).collect();
        if nickname.is_empty() {
            self.reject(from, "Nickname must not be empty", true);
            return;
        }

        let password_ok = self
            .config
            .password
            .as_deref()
            .is_none_or(|expected| password.as_deref() == Some(expected));
        if !password_ok {
            self.reject(from, "Invalid password", true);
            return;
        }

        match self.players.join(from, &nickname) {
            Ok(_) => {}
            Err(DirectoryError::Registry(_)) => {
                self.reject(from, "Server full", true);
                return;
            }
            Err(e) => {
                log::warn!("join from {} failed: {}", from, e);
                self.reject(from, "Already joined", false);
                return;
            }
        }

        self.send(
            from,
            Message::JoinAccepted {
                player: from.0,
                tick_rate: self.config.tick_rate,
                broadcast_rate: self.config.broadcast_rate,
            },
        );
        self.send_world_state(from);
        self.broadcast(Message::PlayerJoined {
            player: from.0,
            nickname,
            team: Team::None,
        });
        self.scores_dirty = true;
    }

    fn on_quit(&mut self, from: Identity) {
        self.remove_player(from, DisconnectReason::Graceful);
        self.output.closed.push(from);
    }

    fn on_team_select(&mut self, from: Identity, team: Team) {
        let previous = match self.players.set_team(from, team) {
            Ok(previous) => previous,
            Err(e) => {
                log::debug!("team select ignored: {}", e);
                return;
            }
        };
        if previous == team {
            return;
        }

        log::info!("{} moved to team {}", from, team.as_str());
        self.broadcast(Message::TeamChanged {
            player: from.0,
            team,
        });

        for affected in [previous, team] {
            if affected != Team::None && self.players.vip_of(affected).is_none() {
                self.elect_vip(affected);
            }
        }
    }

    fn on_spawn_request(&mut self, from: Identity, vehicle: VehicleKind) {
        match self.players.get_by_identity(from) {
            Some(player) if player.is_driving() => {
                log::debug!("{} is already driving", from);
                return;
            }
            Some(_) => {}
            None => {
                log::debug!("spawn request from unknown {}", from);
                return;
            }
        }

        let mut position = self.config.arena.sample_position(&mut self.rng);
        position.y = PhysicsWorld::spawn_height(vehicle);
        let yaw = self.rng.gen_range(-PI..PI);
        let state = VehicleSnapshot::at_rest(position, yaw);
        let handle = self.physics.spawn_vehicle(vehicle, &state);

        if let Some(player) = self.players.get_by_identity_mut(from) {
            player.alive = true;
            player.health = MAX_HEALTH;
            player.effects = Effects::default();
            player.last_input = InputSample::IDLE;
            player.last_attacker = None;
            player.vehicle = Some(handle);
            player.vehicle_kind = Some(vehicle);
        }

        log::info!("{} spawned a {} at {:?}", from, vehicle.as_str(), position);
        self.broadcast(Message::PlayerSpawned {
            player: from.0,
            vehicle,
            state,
        });
    }

    fn on_player_input(&mut self, from: Identity, tick: u32, input: InputSample) {
        let newer = self
            .players
            .get_by_identity(from)
            .map(|p| p.last_input_tick.is_none_or(|last| sequence_greater_than(tick, last)));
        if newer != Some(true) {
            return;
        }

        if self.players.set_input(from, input) {
            if let Some(player) = self.players.get_by_identity_mut(from) {
                player.last_input_tick = Some(tick);
            }
        }
    }

    fn on_chat(&mut self, from: Identity, _sender: Option<Identity>, text: String) {
        let Some(nickname) = self.players.get_by_identity(from).map(|p| p.nickname.clone()) else {
            return;
        };
        let text: String = text.chars().take(MAX_CHAT_LEN).collect();
        if text.trim().is_empty() {
            return;
        }

        log::info!("[chat] {}: {}", nickname, text);
        self.broadcast(Message::ChatMessage {
            from: Some(from.0),
            text,
        });
    }
}
