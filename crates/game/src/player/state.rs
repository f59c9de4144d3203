use std::fmt;

use crate::input::InputSample;
use crate::physics::{DriveModifiers, VehicleHandle, VehicleKind};
use crate::snapshot::VehicleSnapshot;

pub const MAX_HEALTH: f32 = 100.0;
pub const SPEED_BOOST_SCALE: f32 = 1.5;
pub const MASS_BOOST_SCALE: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(pub u32);

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[rkyv(derive(Debug))]
#[serde(rename_all = "lowercase")]
pub enum Team {
    #[default]
    None,
    Blue,
    Red,
}

impl Team {
    pub const PLAYABLE: [Team; 2] = [Team::Blue, Team::Red];

    pub fn as_str(self) -> &'static str {
        match self {
            Team::None => "none",
            Team::Blue => "blue",
            Team::Red => "red",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Effects {
    pub speed_ticks: u32,
    pub mass_ticks: u32,
}

impl Effects {
    pub fn tick(&mut self) {
        self.speed_ticks = self.speed_ticks.saturating_sub(1);
        self.mass_ticks = self.mass_ticks.saturating_sub(1);
    }

    pub fn modifiers(&self) -> DriveModifiers {
        DriveModifiers {
            speed_scale: if self.speed_ticks > 0 {
                SPEED_BOOST_SCALE
            } else {
                1.0
            },
            mass_scale: if self.mass_ticks > 0 {
                MASS_BOOST_SCALE
            } else {
                1.0
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    pub identity: Identity,
    pub nickname: String,
    pub team: Team,
    pub round_score: u32,
    pub game_score: u32,
    pub alive: bool,
    pub is_vip: bool,
    pub health: f32,
    pub effects: Effects,
    pub last_input: InputSample,
    pub last_input_tick: Option<u32>,
    pub last_snapshot: Option<VehicleSnapshot>,
    pub last_snapshot_tick: Option<u32>,
    pub vehicle: Option<VehicleHandle>,
    pub vehicle_kind: Option<VehicleKind>,
    pub last_attacker: Option<Identity>,
    join_order: u64,
}

impl Player {
    pub fn new(identity: Identity, nickname: impl Into<String>, join_order: u64) -> Self {
        Self {
            identity,
            nickname: nickname.into(),
            team: Team::None,
            round_score: 0,
            game_score: 0,
            alive: false,
            is_vip: false,
            health: MAX_HEALTH,
            effects: Effects::default(),
            last_input: InputSample::IDLE,
            last_input_tick: None,
            last_snapshot: None,
            last_snapshot_tick: None,
            vehicle: None,
            vehicle_kind: None,
            last_attacker: None,
            join_order,
        }
    }

    pub fn join_order(&self) -> u64 {
        self.join_order
    }

    pub fn is_driving(&self) -> bool {
        self.alive && self.vehicle.is_some()
    }

    pub fn heal(&mut self, amount: f32) {
        self.health = (self.health + amount).min(MAX_HEALTH);
    }

    pub fn damage(&mut self, amount: f32, attacker: Option<Identity>) -> bool {
        if !self.alive || amount <= 0.0 {
            return false;
        }
        if attacker.is_some() {
            self.last_attacker = attacker;
        }
        let was_alive = self.health > 0.0;
        self.health = (self.health - amount).max(0.0);
        was_alive && self.health <= 0.0
    }

    pub fn drive_modifiers(&self) -> DriveModifiers {
        self.effects.modifiers()
    }
}
