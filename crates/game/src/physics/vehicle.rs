use glam::Vec3;

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
pub enum VehicleKind {
    #[default]
    Buggy,
    Truck,
    Tank,
}

#[derive(Debug, Clone, Copy)]
pub struct VehicleSpec {
    pub half_extents: Vec3,
    pub mass: f32,
    pub max_speed: f32,
    pub acceleration: f32,
    pub turn_rate: f32,
}

impl VehicleKind {
    pub const ALL: [VehicleKind; 3] = [VehicleKind::Buggy, VehicleKind::Truck, VehicleKind::Tank];

    pub fn spec(self) -> VehicleSpec {
        match self {
            VehicleKind::Buggy => VehicleSpec {
                half_extents: Vec3::new(0.9, 0.5, 1.6),
                mass: 800.0,
                max_speed: 28.0,
                acceleration: 18.0,
                turn_rate: 2.4,
            },
            VehicleKind::Truck => VehicleSpec {
                half_extents: Vec3::new(1.2, 0.8, 2.4),
                mass: 2000.0,
                max_speed: 22.0,
                acceleration: 11.0,
                turn_rate: 1.6,
            },
            VehicleKind::Tank => VehicleSpec {
                half_extents: Vec3::new(1.4, 0.7, 2.2),
                mass: 3500.0,
                max_speed: 16.0,
                acceleration: 8.0,
                turn_rate: 1.2,
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VehicleKind::Buggy => "buggy",
            VehicleKind::Truck => "truck",
            VehicleKind::Tank => "tank",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveModifiers {
    pub speed_scale: f32,
    pub mass_scale: f32,
}

impl Default for DriveModifiers {
    fn default() -> Self {
        Self {
            speed_scale: 1.0,
            mass_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct DriveTuning {
    pub reverse_factor: f32,
    pub coast_drag: f32,
    pub handbrake_decel: f32,
    pub steer_rate: f32,
}

impl Default for DriveTuning {
    fn default() -> Self {
        Self {
            reverse_factor: 0.5,
            coast_drag: 1.5,
            handbrake_decel: 30.0,
            steer_rate: 4.0,
        }
    }
}

pub(crate) fn approach(current: f32, target: f32, max_delta: f32) -> f32 {
    if current < target {
        (current + max_delta).min(target)
    } else {
        (current - max_delta).max(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heavier_vehicles_are_slower() {
        let buggy = VehicleKind::Buggy.spec();
        let tank = VehicleKind::Tank.spec();

        assert!(tank.mass > buggy.mass);
        assert!(tank.max_speed < buggy.max_speed);
    }

    #[test]
    fn test_approach_does_not_overshoot() {
        assert_eq!(approach(0.0, 1.0, 0.25), 0.25);
        assert_eq!(approach(0.9, 1.0, 0.25), 1.0);
        assert_eq!(approach(-0.1, -1.0, 2.0), -1.0);
    }
}
