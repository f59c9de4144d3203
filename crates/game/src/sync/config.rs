use crate::arena::ArenaConfig;
use crate::net::{DEFAULT_BROADCAST_RATE, DEFAULT_TICK_RATE};
use crate::physics::DriveTuning;
use crate::pickup::PickupSettings;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    pub contact_distance: f32,
    pub min_impact_speed: f32,
    pub damage_per_speed: f32,
    pub kill_points: u32,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            contact_distance: 3.0,
            min_impact_speed: 6.0,
            damage_per_speed: 4.0,
            kill_points: 1,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub tick_rate: u32,
    /// Snapshot batches per second. Reliable events go out every tick.
    pub broadcast_rate: u32,
    pub max_players: usize,
    pub password: Option<String>,
    /// Length of a round in ticks; 0 keeps one round running forever.
    pub round_ticks: u32,
    pub seed: Option<u64>,
    pub arena: ArenaConfig,
    pub pickups: PickupSettings,
    pub drive: DriveTuning,
    pub combat: CombatConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            broadcast_rate: DEFAULT_BROADCAST_RATE,
            max_players: 16,
            password: None,
            round_ticks: 0,
            seed: None,
            arena: ArenaConfig::default(),
            pickups: PickupSettings::default(),
            drive: DriveTuning::default(),
            combat: CombatConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }

    pub fn broadcast_interval(&self) -> u32 {
        (self.tick_rate / self.broadcast_rate.max(1)).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rates() {
        let config = SyncConfig::default();
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.broadcast_interval(), 3);
    }

    #[test]
    fn test_broadcast_interval_never_zero() {
        let config = SyncConfig {
            tick_rate: 10,
            broadcast_rate: 30,
            ..SyncConfig::default()
        };
        assert_eq!(config.broadcast_interval(), 1);
    }
}
