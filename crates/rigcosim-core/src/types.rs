use glam::{DQuat, DVec3};
use crate::Scalar;

pub type Vec3 = DVec3;
pub type Quat = DQuat;

/// Magnitude of gravitational acceleration (m/s^2).
pub const GRAVITY_ACC: Scalar = 9.81;
/// World frame: Z up, X forward, Y left.
pub const GRAVITY: Vec3 = Vec3::new(0.0, 0.0, -GRAVITY_ACC);

#[inline] pub fn vec3(x: Scalar, y: Scalar, z: Scalar) -> Vec3 { Vec3::new(x, y, z) }
#[inline] pub fn iso(pos: Vec3, rot: Quat) -> Isometry { Isometry { pos, rot } }

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Isometry { pub pos: Vec3, pub rot: Quat }

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Velocity { pub lin: Vec3, pub ang: Vec3 }

impl Default for Isometry {
    fn default() -> Self { Self { pos: Vec3::ZERO, rot: Quat::IDENTITY } }
}

impl Isometry {
    #[inline] pub fn transform_point(&self, p: Vec3) -> Vec3 { self.pos + self.rot * p }
    #[inline] pub fn transform_vector(&self, v: Vec3) -> Vec3 { self.rot * v }
}

impl Velocity {
    /// Velocity of a point at world offset `r` from the body origin.
    #[inline] pub fn at_offset(&self, r: Vec3) -> Vec3 { self.lin + self.ang.cross(r) }
}
