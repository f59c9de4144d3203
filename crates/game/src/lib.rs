pub mod arena;
pub mod input;
pub mod net;
pub mod physics;
pub mod pickup;
pub mod player;
pub mod registry;
pub mod snapshot;
pub mod sync;

pub use arena::ArenaConfig;
pub use input::{InputFlags, InputSample};
pub use net::{
    DispatcherConfig, Message, MessageHandler, NetEvent, NetworkStats, Packet, PacketError,
    TransportDispatcher,
};
pub use physics::{PhysicsWorld, VehicleHandle, VehicleKind};
pub use pickup::{Pickup, PickupKind, PickupManager, PickupSettings};
pub use player::{Identity, Player, PlayerDirectory, Team};
pub use registry::{EntityId, EntityRegistry, RegistryError};
pub use snapshot::VehicleSnapshot;
pub use sync::{ClientSync, FixedTimestep, ServerSync, SyncConfig};
