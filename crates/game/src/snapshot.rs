use glam::{Quat, Vec3};
use rkyv::{Archive, Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct VehicleSnapshot {
    pub position: [f32; 3],
    pub orientation: [f32; 4],
    pub angular_velocity: [f32; 3],
    pub linear_velocity: [f32; 3],
    pub steer: f32,
}

impl Default for VehicleSnapshot {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            orientation: [0.0, 0.0, 0.0, 1.0],
            angular_velocity: [0.0; 3],
            linear_velocity: [0.0; 3],
            steer: 0.0,
        }
    }
}

impl VehicleSnapshot {
    pub fn new(
        position: Vec3,
        orientation: Quat,
        angular_velocity: Vec3,
        linear_velocity: Vec3,
        steer: f32,
    ) -> Self {
        Self {
            position: position.to_array(),
            orientation: orientation.to_array(),
            angular_velocity: angular_velocity.to_array(),
            linear_velocity: linear_velocity.to_array(),
            steer,
        }
    }

    pub fn at_rest(position: Vec3, yaw: f32) -> Self {
        Self::new(
            position,
            Quat::from_rotation_y(yaw),
            Vec3::ZERO,
            Vec3::ZERO,
            0.0,
        )
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn orientation(&self) -> Quat {
        Quat::from_array(self.orientation)
    }

    pub fn angular_velocity(&self) -> Vec3 {
        Vec3::from_array(self.angular_velocity)
    }

    pub fn linear_velocity(&self) -> Vec3 {
        Vec3::from_array(self.linear_velocity)
    }

    /// Vehicles face -Z in their local frame.
    pub fn forward(&self) -> Vec3 {
        self.orientation() * Vec3::NEG_Z
    }

    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|v| v.is_finite())
            && self.orientation.iter().all(|v| v.is_finite())
            && self.angular_velocity.iter().all(|v| v.is_finite())
            && self.linear_velocity.iter().all(|v| v.is_finite())
            && self.steer.is_finite()
            && self.orientation().length_squared() > f32::EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_rest_faces_yaw() {
        let snapshot = VehicleSnapshot::at_rest(Vec3::new(1.0, 0.5, 2.0), 0.0);
        assert!((snapshot.forward() - Vec3::NEG_Z).length() < 1e-5);
        assert_eq!(snapshot.position(), Vec3::new(1.0, 0.5, 2.0));
        assert_eq!(snapshot.linear_velocity(), Vec3::ZERO);
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut snapshot = VehicleSnapshot::default();
        assert!(snapshot.is_finite());

        snapshot.linear_velocity[1] = f32::NAN;
        assert!(!snapshot.is_finite());

        let degenerate = VehicleSnapshot {
            orientation: [0.0; 4],
            ..VehicleSnapshot::default()
        };
        assert!(!degenerate.is_finite());
    }
}
