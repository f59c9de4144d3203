use glam::Vec3;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    pub radius_x: f32,
    pub radius_z: f32,
    pub margin: f32,
    pub pickup_height: f32,
    pub fall_out_height: f32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            radius_x: 60.0,
            radius_z: 40.0,
            margin: 4.0,
            pickup_height: 0.75,
            fall_out_height: -15.0,
        }
    }
}

impl ArenaConfig {
    /// Uniform point in a disc of radius `Rx - margin`, squashed along Z onto
    /// the oval. Returned at ground level.
    pub fn sample_position<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec3 {
        let rx = (self.radius_x - self.margin).max(0.0);
        let rz = (self.radius_z - self.margin).max(0.0);
        if rx <= 0.0 {
            return Vec3::ZERO;
        }

        let x = rng.gen_range(-rx..=rx);
        let extent = (rx * rx - x * x).max(0.0).sqrt();
        let z = if extent > 0.0 {
            rng.gen_range(-extent..=extent)
        } else {
            0.0
        };

        Vec3::new(x, 0.0, z * (rz / rx))
    }

    pub fn contains(&self, position: Vec3) -> bool {
        if self.radius_x <= 0.0 || self.radius_z <= 0.0 {
            return false;
        }
        let nx = position.x / self.radius_x;
        let nz = position.z / self.radius_z;
        nx * nx + nz * nz <= 1.0
    }

    pub fn floor_half_size(&self) -> f32 {
        self.radius_x.max(self.radius_z)
    }

    pub fn is_fallen(&self, position: Vec3) -> bool {
        position.y < self.fall_out_height
    }
}
