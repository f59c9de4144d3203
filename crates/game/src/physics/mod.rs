mod vehicle;
mod world;

pub use vehicle::{DriveModifiers, DriveTuning, VehicleKind, VehicleSpec};
pub use world::{PhysicsWorld, VehicleHandle};
