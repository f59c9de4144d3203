use std::collections::HashMap;

use glam::{Quat, Vec3};
use rapier3d::prelude::*;

use super::vehicle::{DriveModifiers, DriveTuning, VehicleKind, approach};
use crate::input::InputSample;
use crate::snapshot::VehicleSnapshot;

const GROUND_HALF_THICKNESS: Real = 0.1;
const SPAWN_CLEARANCE: Real = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VehicleHandle(RigidBodyHandle);

#[derive(Debug)]
struct VehicleBody {
    kind: VehicleKind,
    steer: f32,
    mass_scale: f32,
}

pub struct PhysicsWorld {
    pipeline: PhysicsPipeline,
    integration_parameters: IntegrationParameters,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    gravity: Vector,
    vehicles: HashMap<VehicleHandle, VehicleBody>,
    tuning: DriveTuning,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new(DriveTuning::default())
    }
}

impl PhysicsWorld {
    pub fn new(tuning: DriveTuning) -> Self {
        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = 1.0 / 60.0;

        Self {
            pipeline: PhysicsPipeline::new(),
            integration_parameters,
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            gravity: Vector::new(0.0, -9.81, 0.0),
            vehicles: HashMap::new(),
            tuning,
        }
    }

    pub fn add_ground(&mut self, half_size: Real) -> ColliderHandle {
        let collider = ColliderBuilder::cuboid(half_size, GROUND_HALF_THICKNESS, half_size)
            .translation(Vector::new(0.0, -GROUND_HALF_THICKNESS, 0.0))
            .friction(0.0)
            .build();
        self.colliders.insert(collider)
    }

    pub fn advance(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;
        self.integration_parameters.min_ccd_dt = dt / 100.0;

        self.pipeline.step(
            self.gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            &(),
            &(),
        );
    }

    pub fn spawn_height(kind: VehicleKind) -> f32 {
        kind.spec().half_extents.y + SPAWN_CLEARANCE
    }

    pub fn spawn_vehicle(&mut self, kind: VehicleKind, state: &VehicleSnapshot) -> VehicleHandle {
        let spec = kind.spec();
        let position = state.position();

        let body = RigidBodyBuilder::dynamic()
            .translation(Vector::new(position.x, position.y, position.z))
            .ccd_enabled(true)
            .build();
        let handle = self.bodies.insert(body);

        let collider = ColliderBuilder::cuboid(
            spec.half_extents.x,
            spec.half_extents.y,
            spec.half_extents.z,
        )
        .mass(spec.mass)
        .friction(0.0)
        .restitution(0.2)
        .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);

        let vehicle = VehicleHandle(handle);
        self.vehicles.insert(
            vehicle,
            VehicleBody {
                kind,
                steer: 0.0,
                mass_scale: 1.0,
            },
        );
        self.set_vehicle_state(vehicle, state);

        vehicle
    }

    pub fn release_vehicle(&mut self, handle: VehicleHandle) -> bool {
        if self.vehicles.remove(&handle).is_none() {
            return false;
        }

        self.bodies.remove(
            handle.0,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
        true
    }

    pub fn contains(&self, handle: VehicleHandle) -> bool {
        self.vehicles.contains_key(&handle)
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn vehicle_kind(&self, handle: VehicleHandle) -> Option<VehicleKind> {
        self.vehicles.get(&handle).map(|v| v.kind)
    }

    pub fn vehicle_state(&self, handle: VehicleHandle) -> Option<VehicleSnapshot> {
        let vehicle = self.vehicles.get(&handle)?;
        let body = self.bodies.get(handle.0)?;

        let t = body.translation();
        let r = *body.rotation();
        let w = body.angvel();
        let v = body.linvel();

        Some(VehicleSnapshot::new(
            Vec3::new(t.x, t.y, t.z),
            Quat::from_xyzw(r.x, r.y, r.z, r.w),
            Vec3::new(w.x, w.y, w.z),
            Vec3::new(v.x, v.y, v.z),
            vehicle.steer,
        ))
    }

    /// Hard teleport. Non-finite states are refused and leave the body untouched.
    pub fn set_vehicle_state(&mut self, handle: VehicleHandle, state: &VehicleSnapshot) -> bool {
        if !state.is_finite() {
            return false;
        }
        let Some(vehicle) = self.vehicles.get_mut(&handle) else {
            return false;
        };
        let Some(body) = self.bodies.get_mut(handle.0) else {
            return false;
        };

        let p = state.position();
        let q = state.orientation().normalize();
        let w = state.angular_velocity();
        let v = state.linear_velocity();

        let rotation = Rotation::from_xyzw(q.x, q.y, q.z, q.w).normalize();
        body.set_position(Pose::from_parts(Vector::new(p.x, p.y, p.z), rotation), true);
        body.set_angvel(Vector::new(w.x, w.y, w.z), true);
        body.set_linvel(Vector::new(v.x, v.y, v.z), true);
        vehicle.steer = state.steer;

        true
    }

    pub fn drive(
        &mut self,
        handle: VehicleHandle,
        input: &InputSample,
        modifiers: DriveModifiers,
        dt: f32,
    ) {
        let Some(vehicle) = self.vehicles.get_mut(&handle) else {
            return;
        };
        let spec = vehicle.kind.spec();

        if vehicle.mass_scale != modifiers.mass_scale {
            if let Some(body) = self.bodies.get(handle.0) {
                for collider_handle in body.colliders().to_vec() {
                    if let Some(collider) = self.colliders.get_mut(collider_handle) {
                        collider.set_mass(spec.mass * modifiers.mass_scale);
                    }
                }
            }
            vehicle.mass_scale = modifiers.mass_scale;
        }

        let Some(body) = self.bodies.get_mut(handle.0) else {
            return;
        };

        let r = *body.rotation();
        let rotation = Quat::from_xyzw(r.x, r.y, r.z, r.w);
        let mut forward = rotation * Vec3::NEG_Z;
        forward.y = 0.0;
        let forward = forward.normalize_or_zero();

        let v = body.linvel();
        let velocity = Vec3::new(v.x, v.y, v.z);

        let max_speed = spec.max_speed * modifiers.speed_scale;
        let min_speed = -max_speed * self.tuning.reverse_factor;
        let mut speed = velocity.dot(forward);

        let throttle = input.throttle();
        if throttle != 0.0 {
            speed += throttle * spec.acceleration * dt;
        } else {
            speed *= (1.0 - self.tuning.coast_drag * dt).max(0.0);
        }
        if input.handbrake {
            speed = approach(speed, 0.0, self.tuning.handbrake_decel * dt);
        }
        let speed = speed.clamp(min_speed, max_speed);

        vehicle.steer = approach(vehicle.steer, input.steer(), self.tuning.steer_rate * dt);
        let grip = if max_speed > 0.0 {
            (speed / max_speed).clamp(-1.0, 1.0)
        } else {
            0.0
        };
        let yaw_rate = vehicle.steer * spec.turn_rate * grip;

        let planar = forward * speed;
        body.set_linvel(Vector::new(planar.x, velocity.y, planar.z), true);
        body.set_angvel(Vector::new(0.0, yaw_rate, 0.0), true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn world_with_ground() -> PhysicsWorld {
        let mut world = PhysicsWorld::default();
        world.add_ground(100.0);
        world
    }

    fn spawn(world: &mut PhysicsWorld, x: f32) -> VehicleHandle {
        let y = PhysicsWorld::spawn_height(VehicleKind::Buggy);
        world.spawn_vehicle(
            VehicleKind::Buggy,
            &VehicleSnapshot::at_rest(Vec3::new(x, y, 0.0), 0.0),
        )
    }

    #[test]
    fn test_spawn_and_release() {
        let mut world = world_with_ground();
        let handle = spawn(&mut world, 0.0);

        assert!(world.contains(handle));
        assert_eq!(world.vehicle_kind(handle), Some(VehicleKind::Buggy));
        assert!(world.vehicle_state(handle).is_some());

        assert!(world.release_vehicle(handle));
        assert!(!world.release_vehicle(handle));
        assert!(world.vehicle_state(handle).is_none());
        assert_eq!(world.vehicle_count(), 0);
    }

    #[test]
    fn test_forward_input_moves_forward() {
        let mut world = world_with_ground();
        let handle = spawn(&mut world, 0.0);
        let start = world.vehicle_state(handle).unwrap().position();

        let mut last = 0.0;
        for _ in 0..10 {
            world.drive(handle, &InputSample::forward(), DriveModifiers::default(), DT);
            world.advance(DT);

            let pos = world.vehicle_state(handle).unwrap().position();
            let travelled = (pos - start).dot(Vec3::NEG_Z);
            assert!(travelled > last);
            last = travelled;
        }
    }

    #[test]
    fn test_teleport_overwrites_state() {
        let mut world = world_with_ground();
        let handle = spawn(&mut world, 0.0);

        let target = VehicleSnapshot::new(
            Vec3::new(5.0, 2.0, -3.0),
            Quat::from_rotation_y(1.0),
            Vec3::new(0.0, 0.5, 0.0),
            Vec3::new(1.0, 0.0, 2.0),
            0.3,
        );
        assert!(world.set_vehicle_state(handle, &target));

        let state = world.vehicle_state(handle).unwrap();
        assert!((state.position() - target.position()).length() < 1e-4);
        assert!((state.linear_velocity() - target.linear_velocity()).length() < 1e-4);
        assert_eq!(state.steer, 0.3);
    }

    #[test]
    fn test_non_finite_teleport_refused() {
        let mut world = world_with_ground();
        let handle = spawn(&mut world, 0.0);
        let before = world.vehicle_state(handle).unwrap();

        let mut bad = before;
        bad.position[0] = f32::INFINITY;

        assert!(!world.set_vehicle_state(handle, &bad));
        assert_eq!(world.vehicle_state(handle).unwrap(), before);
    }

    #[test]
    fn test_steering_turns_while_moving() {
        let mut world = world_with_ground();
        let handle = spawn(&mut world, 0.0);
        let input = InputSample::new(true, false, true, false, false);

        for _ in 0..60 {
            world.drive(handle, &input, DriveModifiers::default(), DT);
            world.advance(DT);
        }

        let state = world.vehicle_state(handle).unwrap();
        assert!(state.steer > 0.9);
        assert!(state.forward().dot(Vec3::NEG_Z) < 0.99);
    }
}
