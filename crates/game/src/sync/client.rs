use std::collections::{BTreeMap, VecDeque};

use glam::Vec3;

use crate::input::InputSample;
use crate::net::{
    DisconnectReason, Message, MessageHandler, NetEvent, SERVER_IDENTITY, ScoreEntry, SnapshotEntry,
    route,
};
use crate::physics::{PhysicsWorld, VehicleKind};
use crate::pickup::PickupKind;
use crate::player::{DirectoryError, Identity, MAX_HEALTH, PlayerDirectory, SnapshotOutcome, Team};
use crate::snapshot::VehicleSnapshot;

const CHAT_HISTORY: usize = 64;

/// Whatever draws pickups on the client. Proxies are created and destroyed
/// as the server announces them.
pub trait PickupScene {
    fn create(&mut self, pickup: u32, kind: PickupKind, position: Vec3);
    fn destroy(&mut self, pickup: u32);
}

#[derive(Debug, Default)]
pub struct NullScene;

impl PickupScene for NullScene {
    fn create(&mut self, _pickup: u32, _kind: PickupKind, _position: Vec3) {}

    fn destroy(&mut self, _pickup: u32) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Joined,
    Rejected(String),
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemotePickup {
    pub kind: PickupKind,
    pub position: Vec3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub from: Option<Identity>,
    pub text: String,
}

pub struct ClientSync<S: PickupScene = NullScene> {
    state: SessionState,
    nickname: String,
    local: Option<Identity>,
    players: PlayerDirectory,
    physics: PhysicsWorld,
    pickups: BTreeMap<u32, RemotePickup>,
    scene: S,
    scores: Vec<ScoreEntry>,
    chat: VecDeque<ChatLine>,
    tick_rate: u32,
    broadcast_rate: u32,
    input_tick: u32,
}

impl ClientSync<NullScene> {
    pub fn headless(max_players: usize) -> Self {
        Self::new(NullScene, max_players)
    }
}

impl<S: PickupScene> ClientSync<S> {
    pub fn new(scene: S, max_players: usize) -> Self {
        Self {
            state: SessionState::Connecting,
            nickname: String::new(),
            local: None,
            players: PlayerDirectory::with_capacity(max_players),
            physics: PhysicsWorld::default(),
            pickups: BTreeMap::new(),
            scene,
            scores: Vec::new(),
            chat: VecDeque::with_capacity(CHAT_HISTORY),
            tick_rate: 0,
            broadcast_rate: 0,
            input_tick: 0,
        }
    }

    pub fn join_request(&mut self, nickname: &str, password: Option<String>) -> Message {
        self.nickname = nickname.to_string();
        self.state = SessionState::Connecting;
        Message::Join {
            nickname: nickname.to_string(),
            password,
        }
    }

    pub fn handle(&mut self, events: Vec<NetEvent>) {
        for event in events {
            match event {
                NetEvent::Message { from, message } if from == SERVER_IDENTITY => {
                    route(self, from, message)
                }
                NetEvent::Message { from, message } => {
                    log::debug!("dropping {} from {}", message.name(), from)
                }
                NetEvent::Disconnected { identity, reason } if identity == SERVER_IDENTITY => {
                    log::warn!("lost connection to server: {}", reason.as_str());
                    self.state = SessionState::Disconnected;
                }
                NetEvent::Disconnected { .. } => {}
            }
        }
    }

    pub fn handle_message(&mut self, message: Message) {
        route(self, SERVER_IDENTITY, message);
    }

    pub fn sample_input(&mut self, input: InputSample) -> Option<Message> {
        if self.state != SessionState::Joined {
            return None;
        }
        let identity = self.local?;
        self.players.set_input(identity, input);

        let tick = self.input_tick;
        self.input_tick = self.input_tick.wrapping_add(1);
        Some(Message::PlayerInput {
            tick,
            input: input.bits(),
        })
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_joined(&self) -> bool {
        self.state == SessionState::Joined
    }

    pub fn local_identity(&self) -> Option<Identity> {
        self.local
    }

    pub fn players(&self) -> &PlayerDirectory {
        &self.players
    }

    pub fn pickups(&self) -> &BTreeMap<u32, RemotePickup> {
        &self.pickups
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scores(&self) -> &[ScoreEntry] {
        &self.scores
    }

    pub fn chat(&self) -> impl Iterator<Item = &ChatLine> + '_ {
        self.chat.iter()
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn broadcast_rate(&self) -> u32 {
        self.broadcast_rate
    }

    pub fn vehicle_state(&self, identity: Identity) -> Option<VehicleSnapshot> {
        let handle = self.players.get_by_identity(identity)?.vehicle?;
        self.physics.vehicle_state(handle)
    }

    fn add_player(&mut self, identity: Identity, nickname: &str, team: Team) {
        match self.players.join(identity, nickname) {
            Ok(_) | Err(DirectoryError::DuplicateIdentity(_)) => {}
            Err(e) => {
                log::warn!("cannot track {}: {}", identity, e);
                return;
            }
        }
        if let Some(player) = self.players.get_by_identity_mut(identity) {
            player.nickname = nickname.to_string();
        }
        if let Err(e) = self.players.set_team(identity, team) {
            log::debug!("{}", e);
        }
    }

    fn release_vehicle(&mut self, identity: Identity) {
        let Some(player) = self.players.get_by_identity_mut(identity) else {
            return;
        };
        if let Some(handle) = player.vehicle.take() {
            self.physics.release_vehicle(handle);
        }
    }
}

impl<S: PickupScene> MessageHandler for ClientSync<S> {
    fn on_join_accepted(
        &mut self,
        _from: Identity,
        player: Identity,
        tick_rate: u32,
        broadcast_rate: u32,
    ) {
        log::info!("joined as {} ({} Hz, snapshots at {} Hz)", player, tick_rate, broadcast_rate);
        self.state = SessionState::Joined;
        self.local = Some(player);
        self.tick_rate = tick_rate;
        self.broadcast_rate = broadcast_rate;

        let nickname = self.nickname.clone();
        self.add_player(player, &nickname, Team::None);
    }

    fn on_join_rejected(&mut self, _from: Identity, reason: String) {
        if self.state == SessionState::Joined {
            log::debug!("ignoring rejection while joined: {}", reason);
            return;
        }
        log::warn!("join rejected: {}", reason);
        self.state = SessionState::Rejected(reason);
    }

    fn on_player_joined(&mut self, _from: Identity, player: Identity, nickname: String, team: Team) {
        self.add_player(player, &nickname, team);
    }

    fn on_player_left(&mut self, _from: Identity, player: Identity, reason: DisconnectReason) {
        if self.players.leave(player, &mut self.physics).is_some() {
            log::info!("{} left ({})", player, reason.as_str());
        }
    }

    fn on_team_changed(&mut self, _from: Identity, player: Identity, team: Team) {
        if let Err(e) = self.players.set_team(player, team) {
            log::debug!("{}", e);
        }
    }

    fn on_vip_declared(&mut self, _from: Identity, team: Team, player: Identity) {
        for id in self.players.team_members(team) {
            if let Some(member) = self.players.get_mut(id) {
                member.is_vip = member.identity == player;
            }
        }
    }

    fn on_player_spawned(
        &mut self,
        _from: Identity,
        player: Identity,
        vehicle: VehicleKind,
        state: VehicleSnapshot,
    ) {
        if !self.players.contains(player) {
            log::debug!("spawn for unknown {}", player);
            return;
        }
        self.release_vehicle(player);
        let handle = self.physics.spawn_vehicle(vehicle, &state);

        if let Some(entry) = self.players.get_by_identity_mut(player) {
            entry.alive = true;
            entry.health = MAX_HEALTH;
            entry.vehicle = Some(handle);
            entry.vehicle_kind = Some(vehicle);
            entry.last_snapshot = Some(state);
        }
    }

    fn on_player_died(&mut self, _from: Identity, player: Identity, killer: Option<Identity>) {
        self.release_vehicle(player);
        if let Some(entry) = self.players.get_by_identity_mut(player) {
            entry.alive = false;
            entry.health = 0.0;
            entry.last_attacker = killer;
        }
    }

    fn on_snapshot_batch(&mut self, _from: Identity, tick: u32, entries: Vec<SnapshotEntry>) {
        for entry in entries {
            let identity = Identity(entry.player);
            match self
                .players
                .apply_snapshot(identity, tick, entry.snapshot, &mut self.physics)
            {
                Ok(SnapshotOutcome::Applied) => {}
                Ok(outcome) => log::trace!("{} snapshot at tick {}: {:?}", identity, tick, outcome),
                Err(e) => log::debug!("{}", e),
            }
        }
    }

    fn on_pickup_spawn(&mut self, _from: Identity, pickup: u32, kind: PickupKind, position: Vec3) {
        if self.pickups.contains_key(&pickup) {
            return;
        }
        self.pickups.insert(pickup, RemotePickup { kind, position });
        self.scene.create(pickup, kind, position);
    }

    fn on_pickup_collect(&mut self, _from: Identity, pickup: u32, collector: Identity) {
        if self.pickups.remove(&pickup).is_some() {
            log::debug!("{} picked up {}", collector, pickup);
            self.scene.destroy(pickup);
        }
    }

    fn on_chat(&mut self, _from: Identity, sender: Option<Identity>, text: String) {
        let name = sender
            .and_then(|s| self.players.get_by_identity(s))
            .map(|p| p.nickname.clone())
            .unwrap_or_else(|| "server".to_string());
        log::info!("[chat] {}: {}", name, text);

        if self.chat.len() >= CHAT_HISTORY {
            self.chat.pop_front();
        }
        self.chat.push_back(ChatLine { from: sender, text });
    }

    fn on_score_sync(&mut self, _from: Identity, scores: Vec<ScoreEntry>) {
        for entry in &scores {
            if let Some(player) = self.players.get_by_identity_mut(Identity(entry.player)) {
                player.round_score = entry.round_score;
                player.game_score = entry.game_score;
            }
        }
        self.scores = scores;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingScene {
        live: Vec<u32>,
    }

    impl PickupScene for RecordingScene {
        fn create(&mut self, pickup: u32, _kind: PickupKind, _position: Vec3) {
            self.live.push(pickup);
        }

        fn destroy(&mut self, pickup: u32) {
            self.live.retain(|p| *p != pickup);
        }
    }

    fn joined_client() -> ClientSync {
        let mut client = ClientSync::headless(8);
        client.join_request("me", None);
        client.handle_message(Message::JoinAccepted {
            player: 4,
            tick_rate: 60,
            broadcast_rate: 20,
        });
        client
    }

    fn batch(tick: u32, player: u32, x: f32) -> Message {
        Message::VehicleSnapshotBatch {
            tick,
            entries: vec![SnapshotEntry {
                player,
                snapshot: VehicleSnapshot::at_rest(Vec3::new(x, 0.6, 0.0), 0.0),
            }],
        }
    }

    #[test]
    fn test_no_input_before_join() {
        let mut client = ClientSync::headless(8);
        client.join_request("me", None);
        assert!(client.sample_input(InputSample::forward()).is_none());
    }

    #[test]
    fn test_input_ticks_increase() {
        let mut client = joined_client();
        let first = client.sample_input(InputSample::forward());
        let second = client.sample_input(InputSample::IDLE);

        assert!(matches!(first, Some(Message::PlayerInput { tick: 0, .. })));
        assert!(matches!(second, Some(Message::PlayerInput { tick: 1, .. })));
        assert_eq!(client.local_identity(), Some(Identity(4)));
    }

    #[test]
    fn test_rejection_recorded() {
        let mut client = ClientSync::headless(8);
        client.join_request("me", None);
        client.handle_message(Message::JoinRejected {
            reason: "Server full".to_string(),
        });
        assert_eq!(client.state(), &SessionState::Rejected("Server full".to_string()));
    }

    #[test]
    fn test_stale_batch_discarded() {
        let mut client = joined_client();
        client.handle_message(Message::PlayerSpawned {
            player: 4,
            vehicle: VehicleKind::Buggy,
            state: VehicleSnapshot::at_rest(Vec3::new(0.0, 0.6, 0.0), 0.0),
        });

        client.handle_message(batch(30, 4, 5.0));
        client.handle_message(batch(27, 4, -5.0));

        let state = client.vehicle_state(Identity(4)).unwrap();
        assert!((state.position().x - 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_pickup_proxies_follow_server() {
        let mut client = ClientSync::new(RecordingScene::default(), 8);
        client.handle_message(Message::PickupSpawn {
            pickup: 1,
            kind: PickupKind::Health,
            position: [1.0, 0.75, 2.0],
        });
        client.handle_message(Message::PickupSpawn {
            pickup: 2,
            kind: PickupKind::Mass,
            position: [3.0, 0.75, 2.0],
        });
        client.handle_message(Message::PickupCollect {
            pickup: 1,
            collector: 4,
        });

        assert_eq!(client.scene().live, vec![2]);
        assert_eq!(client.pickups().len(), 1);
    }

    #[test]
    fn test_roster_and_vip() {
        let mut client = joined_client();
        client.handle_message(Message::PlayerJoined {
            player: 7,
            nickname: "other".to_string(),
            team: Team::Red,
        });
        client.handle_message(Message::VipDeclared {
            team: Team::Red,
            player: 7,
        });

        let other = client.players().get_by_identity(Identity(7)).unwrap();
        assert_eq!(other.team, Team::Red);
        assert!(other.is_vip);

        client.handle_message(Message::PlayerLeft {
            player: 7,
            reason: DisconnectReason::Graceful,
        });
        assert!(!client.players().contains(Identity(7)));
    }

    #[test]
    fn test_messages_from_non_server_dropped() {
        let mut client = joined_client();
        client.handle(vec![NetEvent::Message {
            from: Identity(9),
            message: Message::PlayerJoined {
                player: 9,
                nickname: "spoof".to_string(),
                team: Team::None,
            },
        }]);
        assert!(!client.players().contains(Identity(9)));
    }
}
