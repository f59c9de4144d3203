use std::collections::HashMap;

use rand::Rng;
use rand::seq::SliceRandom;

use super::state::{Identity, Player, Team};
use crate::input::InputSample;
use crate::net::sequence_greater_than;
use crate::physics::PhysicsWorld;
use crate::registry::{EntityId, EntityRegistry, RegistryError};
use crate::snapshot::VehicleSnapshot;

pub type PlayerId = EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("{0} already has a player")]
    DuplicateIdentity(Identity),
    #[error("no player for {0}")]
    NotFound(Identity),
    #[error("no players on team {}", .0.as_str())]
    NoPlayers(Team),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Applied,
    Stale,
    Invalid,
}

#[derive(Debug)]
pub struct PlayerDirectory {
    players: EntityRegistry<Player>,
    by_identity: HashMap<Identity, PlayerId>,
    next_join_order: u64,
}

impl PlayerDirectory {
    pub fn with_capacity(max_players: usize) -> Self {
        Self {
            players: EntityRegistry::with_capacity(max_players),
            by_identity: HashMap::with_capacity(max_players),
            next_join_order: 0,
        }
    }

    pub fn join(&mut self, identity: Identity, nickname: &str) -> Result<PlayerId, DirectoryError> {
        if self.by_identity.contains_key(&identity) {
            return Err(DirectoryError::DuplicateIdentity(identity));
        }

        let join_order = self.next_join_order;
        let id = self
            .players
            .create(Player::new(identity, nickname, join_order))?;

        self.next_join_order += 1;
        self.by_identity.insert(identity, id);

        log::info!("{} joined as '{}' ({})", identity, nickname, id);
        Ok(id)
    }

    pub fn leave(&mut self, identity: Identity, physics: &mut PhysicsWorld) -> Option<Player> {
        let id = self.by_identity.remove(&identity)?;

        if let Some(handle) = self.players.get_mut(id).and_then(|p| p.vehicle.take()) {
            physics.release_vehicle(handle);
        }

        let player = self.players.remove(id)?;
        log::info!("{} left ('{}')", identity, player.nickname);
        Some(player)
    }

    pub fn set_input(&mut self, identity: Identity, input: InputSample) -> bool {
        match self.get_by_identity_mut(identity) {
            Some(player) => {
                player.last_input = input;
                true
            }
            None => false,
        }
    }

    pub fn record_snapshot(
        &mut self,
        id: PlayerId,
        tick: u32,
        snapshot: VehicleSnapshot,
    ) -> SnapshotOutcome {
        let Some(player) = self.players.get_mut(id) else {
            return SnapshotOutcome::Invalid;
        };
        Self::store_snapshot(player, tick, snapshot)
    }

    /// Snapshots not newer than the last applied tick are discarded.
    pub fn apply_snapshot(
        &mut self,
        identity: Identity,
        tick: u32,
        snapshot: VehicleSnapshot,
        physics: &mut PhysicsWorld,
    ) -> Result<SnapshotOutcome, DirectoryError> {
        let player = self
            .get_by_identity_mut(identity)
            .ok_or(DirectoryError::NotFound(identity))?;

        let outcome = Self::store_snapshot(player, tick, snapshot);
        if outcome == SnapshotOutcome::Applied {
            if let Some(handle) = player.vehicle {
                physics.set_vehicle_state(handle, &snapshot);
            }
        }
        Ok(outcome)
    }

    fn store_snapshot(player: &mut Player, tick: u32, snapshot: VehicleSnapshot) -> SnapshotOutcome {
        if !snapshot.is_finite() {
            return SnapshotOutcome::Invalid;
        }
        if let Some(last) = player.last_snapshot_tick {
            if !sequence_greater_than(tick, last) {
                return SnapshotOutcome::Stale;
            }
        }

        player.last_snapshot = Some(snapshot);
        player.last_snapshot_tick = Some(tick);
        SnapshotOutcome::Applied
    }

    pub fn score_order(&self) -> Vec<PlayerId> {
        let mut order: Vec<(PlayerId, u32, u64)> = self
            .players
            .iter()
            .map(|(id, p)| (id, p.round_score, p.join_order()))
            .collect();

        order.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        order.into_iter().map(|(id, _, _)| id).collect()
    }

    pub fn select_vip<R: Rng + ?Sized>(
        &mut self,
        team: Team,
        rng: &mut R,
    ) -> Result<PlayerId, DirectoryError> {
        let members = self.team_members(team);
        let chosen = *members
            .choose(rng)
            .ok_or(DirectoryError::NoPlayers(team))?;

        for id in members {
            if let Some(player) = self.players.get_mut(id) {
                player.is_vip = id == chosen;
            }
        }

        Ok(chosen)
    }

    pub fn vip_of(&self, team: Team) -> Option<PlayerId> {
        self.players
            .iter()
            .find(|(_, p)| p.team == team && p.is_vip)
            .map(|(id, _)| id)
    }

    pub fn team_members(&self, team: Team) -> Vec<PlayerId> {
        self.players
            .iter()
            .filter(|(_, p)| p.team == team)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn set_team(&mut self, identity: Identity, team: Team) -> Result<Team, DirectoryError> {
        let player = self
            .get_by_identity_mut(identity)
            .ok_or(DirectoryError::NotFound(identity))?;

        let previous = player.team;
        if previous != team {
            player.team = team;
            player.is_vip = false;
        }
        Ok(previous)
    }

    pub fn add_score(&mut self, identity: Identity, points: u32) -> Result<u32, DirectoryError> {
        let player = self
            .get_by_identity_mut(identity)
            .ok_or(DirectoryError::NotFound(identity))?;
        player.round_score = player.round_score.saturating_add(points);
        Ok(player.round_score)
    }

    pub fn end_round(&mut self) {
        for (_, player) in self.players.iter_mut() {
            player.game_score = player.game_score.saturating_add(player.round_score);
            player.round_score = 0;
        }
    }

    pub fn id_of(&self, identity: Identity) -> Option<PlayerId> {
        self.by_identity.get(&identity).copied()
    }

    pub fn contains(&self, identity: Identity) -> bool {
        self.by_identity.contains_key(&identity)
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    pub fn get_by_identity(&self, identity: Identity) -> Option<&Player> {
        self.id_of(identity).and_then(|id| self.players.get(id))
    }

    pub fn get_by_identity_mut(&mut self, identity: Identity) -> Option<&mut Player> {
        let id = self.id_of(identity)?;
        self.players.get_mut(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlayerId, &Player)> + '_ {
        self.players.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PlayerId, &mut Player)> + '_ {
        self.players.iter_mut()
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.players.ids()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.players.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.players.capacity()
    }
}
