use crate::types::Vec3;
use crate::Scalar;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb { pub min: Vec3, pub max: Vec3 }

impl Aabb {
    #[inline] pub fn new(min: Vec3, max: Vec3) -> Self { Self { min, max } }
    #[inline] pub fn from_sphere(c: Vec3, r: Scalar) -> Self {
        Self { min: c - Vec3::splat(r), max: c + Vec3::splat(r) }
    }
    #[inline] pub fn overlaps(&self, o: &Aabb) -> bool {
        self.min.x <= o.max.x && self.max.x >= o.min.x &&
        self.min.y <= o.max.y && self.max.y >= o.min.y &&
        self.min.z <= o.max.z && self.max.z >= o.min.z
    }
    #[inline] pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }
    pub fn extents(&self) -> Vec3 { self.max - self.min }
}
