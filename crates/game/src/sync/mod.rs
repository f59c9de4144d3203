mod client;
mod config;
mod server;
mod timestep;

pub use client::{ChatLine, ClientSync, NullScene, PickupScene, RemotePickup, SessionState};
pub use config::{CombatConfig, SyncConfig};
pub use server::{Outgoing, ServerSync, Target, TickOutput};
pub use timestep::FixedTimestep;
