use arena::{DispatcherConfig, Team, VehicleKind};

use super::input::Script;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub nickname: String,
    pub password: Option<String>,
    pub team: Team,
    pub vehicle: VehicleKind,
    pub script: Script,
    /// Roster size the local mirror can track; at least the server's player limit.
    pub max_players: usize,
    /// Client ticks to wait after dying before asking to respawn.
    pub respawn_after_ticks: u32,
    pub dispatcher: DispatcherConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            nickname: "driver".to_string(),
            password: None,
            team: Team::None,
            vehicle: VehicleKind::Buggy,
            script: Script::Forward,
            max_players: 64,
            respawn_after_ticks: 180,
            dispatcher: DispatcherConfig {
                max_peers: 1,
                ..DispatcherConfig::default()
            },
        }
    }
}
