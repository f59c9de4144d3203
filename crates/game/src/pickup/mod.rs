mod kind;
mod manager;

pub use kind::{
    Effect, EffectFn, HEALTH_BONUS, MASS_BOOST_TICKS, PickupKind, SPEED_BOOST_TICKS,
};
pub use manager::{
    CollectOutcome, Pickup, PickupError, PickupEvent, PickupId, PickupManager, PickupSettings,
};
