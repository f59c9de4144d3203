use std::collections::VecDeque;

use glam::Vec3;
use rand::Rng;

use super::kind::{Effect, PickupKind};
use crate::arena::ArenaConfig;
use crate::physics::PhysicsWorld;
use crate::player::{Identity, Player, PlayerDirectory};
use crate::registry::{EntityId, EntityRegistry, RegistryError};

pub type PickupId = EntityId;

#[derive(Debug, Clone, PartialEq)]
pub struct Pickup {
    pub id: PickupId,
    pub kind: PickupKind,
    pub position: Vec3,
    pub collected: bool,
    pub created_tick: u32,
    pub collector: Option<Identity>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PickupEvent {
    Spawned {
        id: PickupId,
        kind: PickupKind,
        position: Vec3,
    },
    Collected {
        id: PickupId,
        collector: Identity,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PickupError {
    #[error("no pickup {0}")]
    NotFound(PickupId),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectOutcome {
    Collected {
        kind: PickupKind,
        replacement: Option<PickupId>,
    },
    AlreadyCollected,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PickupSettings {
    pub capacity: usize,
    /// Level the refill keeps the arena at. Slots above it stay free so a
    /// random pickup can always be rerolled.
    pub max_active: usize,
    /// Ticks a reaped slot stays empty. Zero refills it on the next tick.
    pub respawn_delay_ticks: u32,
    pub touch_radius: f32,
}

impl Default for PickupSettings {
    fn default() -> Self {
        Self {
            capacity: 20,
            max_active: 16,
            respawn_delay_ticks: 0,
            touch_radius: 2.5,
        }
    }
}

#[derive(Debug)]
pub struct PickupManager {
    pickups: EntityRegistry<Pickup>,
    arena: ArenaConfig,
    settings: PickupSettings,
    pending_respawns: VecDeque<u32>,
    events: Vec<PickupEvent>,
}

impl PickupManager {
    pub fn new(arena: ArenaConfig, settings: PickupSettings) -> Self {
        Self {
            pickups: EntityRegistry::with_capacity(settings.capacity),
            arena,
            settings,
            pending_respawns: VecDeque::new(),
            events: Vec::new(),
        }
    }

    pub fn spawn(
        &mut self,
        kind: PickupKind,
        position: Vec3,
        tick: u32,
    ) -> Result<PickupId, PickupError> {
        let id = self.pickups.create_with(|id| Pickup {
            id,
            kind,
            position,
            collected: false,
            created_tick: tick,
            collector: None,
        })?;

        log::debug!("pickup {} ({}) spawned at {:?}", id, kind.as_str(), position);
        self.events.push(PickupEvent::Spawned { id, kind, position });
        Ok(id)
    }

    pub fn spawn_random<R: Rng + ?Sized>(
        &mut self,
        kind: PickupKind,
        tick: u32,
        rng: &mut R,
    ) -> Result<PickupId, PickupError> {
        let mut position = self.arena.sample_position(rng);
        position.y = self.arena.pickup_height;
        self.spawn(kind, position, tick)
    }

    pub fn refill<R: Rng + ?Sized>(&mut self, tick: u32, rng: &mut R) -> usize {
        while self.pending_respawns.front().is_some_and(|&due| due <= tick) {
            self.pending_respawns.pop_front();
        }

        let waiting = self.pending_respawns.len();
        let count = self
            .settings
            .max_active
            .saturating_sub(self.pickups.len() + waiting)
            .min(self.pickups.free_slots());

        let mut spawned = 0;
        for _ in 0..count {
            let kind = PickupKind::random(rng);
            match self.spawn_random(kind, tick, rng) {
                Ok(_) => spawned += 1,
                Err(e) => {
                    log::warn!("pickup refill stopped: {}", e);
                    break;
                }
            }
        }
        spawned
    }

    /// Check-and-set on the collected flag, so repeated overlaps within a tick
    /// apply the effect once.
    pub fn collect<R: Rng + ?Sized>(
        &mut self,
        id: PickupId,
        player: &mut Player,
        tick: u32,
        rng: &mut R,
    ) -> Result<CollectOutcome, PickupError> {
        let pickup = self.pickups.get_mut(id).ok_or(PickupError::NotFound(id))?;
        if pickup.collected {
            return Ok(CollectOutcome::AlreadyCollected);
        }
        pickup.collected = true;
        pickup.collector = Some(player.identity);
        let kind = pickup.kind;

        let replacement = match kind.effect() {
            Effect::Grant(apply) => {
                apply(player);
                None
            }
            Effect::Reroll => {
                let next = PickupKind::random_concrete(rng);
                match self.spawn_random(next, tick, rng) {
                    Ok(new_id) => Some(new_id),
                    Err(e) => {
                        log::warn!("random pickup {} could not reroll: {}", id, e);
                        None
                    }
                }
            }
        };

        self.pickups.mark_for_removal(id);
        self.events.push(PickupEvent::Collected {
            id,
            collector: player.identity,
        });
        log::debug!("{} collected pickup {} ({})", player.identity, id, kind.as_str());

        Ok(CollectOutcome::Collected { kind, replacement })
    }

    pub fn collect_overlaps<R: Rng + ?Sized>(
        &mut self,
        tick: u32,
        players: &mut PlayerDirectory,
        physics: &PhysicsWorld,
        rng: &mut R,
    ) -> usize {
        let candidates: Vec<(PickupId, Vec3)> = self
            .pickups
            .iter()
            .filter(|(_, p)| !p.collected)
            .map(|(id, p)| (id, p.position))
            .collect();
        if candidates.is_empty() {
            return 0;
        }

        let radius_sq = self.settings.touch_radius * self.settings.touch_radius;
        let mut collected = 0;

        for player_id in players.ids() {
            let Some(player) = players.get_mut(player_id) else {
                continue;
            };
            if !player.is_driving() {
                continue;
            }
            let Some(state) = player.vehicle.and_then(|h| physics.vehicle_state(h)) else {
                continue;
            };
            let vehicle = state.position();

            for &(pickup_id, position) in &candidates {
                let dx = vehicle.x - position.x;
                let dz = vehicle.z - position.z;
                if dx * dx + dz * dz > radius_sq {
                    continue;
                }
                if let Ok(CollectOutcome::Collected { .. }) =
                    self.collect(pickup_id, player, tick, rng)
                {
                    collected += 1;
                }
            }
        }

        collected
    }

    pub fn reap(&mut self, tick: u32) -> Vec<PickupId> {
        let reaped: Vec<PickupId> = self.pickups.reap().into_iter().map(|(id, _)| id).collect();

        let due = tick.saturating_add(self.settings.respawn_delay_ticks);
        for _ in &reaped {
            self.pending_respawns.push_back(due);
        }
        reaped
    }

    pub fn drain_events(&mut self) -> Vec<PickupEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn get(&self, id: PickupId) -> Option<&Pickup> {
        self.pickups.get(id)
    }

    pub fn active(&self) -> impl Iterator<Item = &Pickup> + '_ {
        self.pickups
            .iter()
            .map(|(_, p)| p)
            .filter(|p| !p.collected)
    }

    pub fn len(&self) -> usize {
        self.pickups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pickups.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.pickups.capacity()
    }

    pub fn is_full(&self) -> bool {
        self.pickups.is_full()
    }

    pub fn arena(&self) -> &ArenaConfig {
        &self.arena
    }
}
