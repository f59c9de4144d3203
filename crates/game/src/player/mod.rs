mod directory;
mod state;

pub use directory::{DirectoryError, PlayerDirectory, PlayerId, SnapshotOutcome};
pub use state::{
    Effects, Identity, MASS_BOOST_SCALE, MAX_HEALTH, Player, SPEED_BOOST_SCALE, Team,
};
