use rand::Rng;
use rand::seq::SliceRandom;

use crate::player::Player;

pub const HEALTH_BONUS: f32 = 35.0;
pub const SPEED_BOOST_TICKS: u32 = 300;
pub const MASS_BOOST_TICKS: u32 = 300;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[rkyv(derive(Debug))]
#[serde(rename_all = "lowercase")]
pub enum PickupKind {
    Health,
    Speed,
    Mass,
    Random,
}

pub type EffectFn = fn(&mut Player);

#[derive(Debug, Clone, Copy)]
pub enum Effect {
    Grant(EffectFn),
    Reroll,
}

// Indexed by `PickupKind::index`.
const EFFECTS: [Effect; 4] = [
    Effect::Grant(grant_health),
    Effect::Grant(grant_speed),
    Effect::Grant(grant_mass),
    Effect::Reroll,
];

fn grant_health(player: &mut Player) {
    player.heal(HEALTH_BONUS);
}

fn grant_speed(player: &mut Player) {
    player.effects.speed_ticks = SPEED_BOOST_TICKS;
}

fn grant_mass(player: &mut Player) {
    player.effects.mass_ticks = MASS_BOOST_TICKS;
}

impl PickupKind {
    pub const ALL: [PickupKind; 4] = [
        PickupKind::Health,
        PickupKind::Speed,
        PickupKind::Mass,
        PickupKind::Random,
    ];
    pub const CONCRETE: [PickupKind; 3] = [PickupKind::Health, PickupKind::Speed, PickupKind::Mass];

    pub fn index(self) -> usize {
        match self {
            PickupKind::Health => 0,
            PickupKind::Speed => 1,
            PickupKind::Mass => 2,
            PickupKind::Random => 3,
        }
    }

    pub fn effect(self) -> Effect {
        EFFECTS[self.index()]
    }

    pub fn is_concrete(self) -> bool {
        matches!(self.effect(), Effect::Grant(_))
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        *Self::ALL.choose(rng).unwrap_or(&PickupKind::Health)
    }

    pub fn random_concrete<R: Rng + ?Sized>(rng: &mut R) -> Self {
        *Self::CONCRETE.choose(rng).unwrap_or(&PickupKind::Health)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PickupKind::Health => "health",
            PickupKind::Speed => "speed",
            PickupKind::Mass => "mass",
            PickupKind::Random => "random",
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::player::Identity;

    #[test]
    fn test_table_matches_kinds() {
        for (i, kind) in PickupKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
        assert!(PickupKind::CONCRETE.iter().all(|k| k.is_concrete()));
        assert!(!PickupKind::Random.is_concrete());
    }

    #[test]
    fn test_effects_grant_to_player() {
        let mut player = Player::new(Identity(1), "a", 0);
        player.health = 10.0;

        for kind in PickupKind::CONCRETE {
            if let Effect::Grant(apply) = kind.effect() {
                apply(&mut player);
            }
        }

        assert_eq!(player.health, 10.0 + HEALTH_BONUS);
        assert_eq!(player.effects.speed_ticks, SPEED_BOOST_TICKS);
        assert_eq!(player.effects.mass_ticks, MASS_BOOST_TICKS);
    }

    #[test]
    fn test_random_concrete_never_random() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..200 {
            assert!(PickupKind::random_concrete(&mut rng).is_concrete());
        }
    }
}
