use glam::Vec3;

use super::protocol::{DisconnectReason, Message, ScoreEntry, SnapshotEntry};
use crate::input::InputSample;
use crate::physics::VehicleKind;
use crate::pickup::PickupKind;
use crate::player::{Identity, Team};
use crate::snapshot::VehicleSnapshot;

fn unexpected(from: Identity, kind: &str) {
    log::debug!("ignoring unexpected {} from {}", kind, from);
}

/// One callback per message kind. Each side overrides the messages it
/// accepts; anything else is logged and dropped.
#[allow(unused_variables)]
pub trait MessageHandler {
    fn on_join(&mut self, from: Identity, nickname: String, password: Option<String>) {
        unexpected(from, "join");
    }

    fn on_quit(&mut self, from: Identity) {
        unexpected(from, "quit");
    }

    fn on_team_select(&mut self, from: Identity, team: Team) {
        unexpected(from, "team_select");
    }

    fn on_spawn_request(&mut self, from: Identity, vehicle: VehicleKind) {
        unexpected(from, "spawn_request");
    }

    fn on_player_input(&mut self, from: Identity, tick: u32, input: InputSample) {
        unexpected(from, "player_input");
    }

    fn on_snapshot_batch(&mut self, from: Identity, tick: u32, entries: Vec<SnapshotEntry>) {
        unexpected(from, "vehicle_snapshot_batch");
    }

    fn on_pickup_spawn(&mut self, from: Identity, pickup: u32, kind: PickupKind, position: Vec3) {
        unexpected(from, "pickup_spawn");
    }

    fn on_pickup_collect(&mut self, from: Identity, pickup: u32, collector: Identity) {
        unexpected(from, "pickup_collect");
    }

    fn on_chat(&mut self, from: Identity, sender: Option<Identity>, text: String) {
        unexpected(from, "chat_message");
    }

    fn on_score_sync(&mut self, from: Identity, scores: Vec<ScoreEntry>) {
        unexpected(from, "score_sync");
    }

    fn on_join_accepted(&mut self, from: Identity, player: Identity, tick_rate: u32, broadcast_rate: u32) {
        unexpected(from, "join_accepted");
    }

    fn on_join_rejected(&mut self, from: Identity, reason: String) {
        unexpected(from, "join_rejected");
    }

    fn on_player_joined(&mut self, from: Identity, player: Identity, nickname: String, team: Team) {
        unexpected(from, "player_joined");
    }

    fn on_player_left(&mut self, from: Identity, player: Identity, reason: DisconnectReason) {
        unexpected(from, "player_left");
    }

    fn on_team_changed(&mut self, from: Identity, player: Identity, team: Team) {
        unexpected(from, "team_changed");
    }

    fn on_vip_declared(&mut self, from: Identity, team: Team, player: Identity) {
        unexpected(from, "vip_declared");
    }

    fn on_player_spawned(
        &mut self,
        from: Identity,
        player: Identity,
        vehicle: VehicleKind,
        state: VehicleSnapshot,
    ) {
        unexpected(from, "player_spawned");
    }

    fn on_player_died(&mut self, from: Identity, player: Identity, killer: Option<Identity>) {
        unexpected(from, "player_died");
    }

    fn on_heartbeat(&mut self, from: Identity) {}
}

pub fn route<H: MessageHandler + ?Sized>(handler: &mut H, from: Identity, message: Message) {
    match message {
        Message::Join { nickname, password } => handler.on_join(from, nickname, password),
        Message::Quit => handler.on_quit(from),
        Message::TeamSelect { team } => handler.on_team_select(from, team),
        Message::SpawnRequest { vehicle } => handler.on_spawn_request(from, vehicle),
        Message::PlayerInput { tick, input } => {
            handler.on_player_input(from, tick, InputSample::from_bits(input))
        }
        Message::VehicleSnapshotBatch { tick, entries } => {
            handler.on_snapshot_batch(from, tick, entries)
        }
        Message::PickupSpawn {
            pickup,
            kind,
            position,
        } => handler.on_pickup_spawn(from, pickup, kind, Vec3::from_array(position)),
        Message::PickupCollect { pickup, collector } => {
            handler.on_pickup_collect(from, pickup, Identity(collector))
        }
        Message::ChatMessage { from: sender, text } => {
            handler.on_chat(from, sender.map(Identity), text)
        }
        Message::ScoreSync { scores } => handler.on_score_sync(from, scores),
        Message::JoinAccepted {
            player,
            tick_rate,
            broadcast_rate,
        } => handler.on_join_accepted(from, Identity(player), tick_rate, broadcast_rate),
        Message::JoinRejected { reason } => handler.on_join_rejected(from, reason),
        Message::PlayerJoined {
            player,
            nickname,
            team,
        } => handler.on_player_joined(from, Identity(player), nickname, team),
        Message::PlayerLeft { player, reason } => {
            handler.on_player_left(from, Identity(player), reason)
        }
        Message::TeamChanged { player, team } => {
            handler.on_team_changed(from, Identity(player), team)
        }
        Message::VipDeclared { team, player } => {
            handler.on_vip_declared(from, team, Identity(player))
        }
        Message::PlayerSpawned {
            player,
            vehicle,
            state,
        } => handler.on_player_spawned(from, Identity(player), vehicle, state),
        Message::PlayerDied { player, killer } => {
            handler.on_player_died(from, Identity(player), killer.map(Identity))
        }
        Message::Heartbeat => handler.on_heartbeat(from),
    }
}
