use rigcosim_core::{Aabb, Scalar, Vec3};

/// Open-top box holding a granular bed: floor at z = 0, four side walls on the patch boundary.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Container {
    pub half_length: Scalar,
    pub half_width: Scalar,
    pub wall_thickness: Scalar,
    pub wall_height: Scalar,
}

/// Inward normal and offset of each wall plane; signed distance is `n.p - offset`.
pub const NUM_WALLS: usize = 5;

impl Container {
    fn planes(&self) -> [(Vec3, Scalar); NUM_WALLS] {
        [
            (Vec3::Z, 0.0),
            (Vec3::X, -self.half_length),
            (Vec3::NEG_X, -self.half_length),
            (Vec3::Y, -self.half_width),
            (Vec3::NEG_Y, -self.half_width),
        ]
    }

    /// `(wall, inward normal, overlap)` for every wall a sphere penetrates.
    pub fn wall_contacts(&self, p: Vec3, r: Scalar) -> impl Iterator<Item = (u8, Vec3, Scalar)> {
        self.planes().into_iter().enumerate().filter_map(move |(w, (n, off))| {
            let overlap = r - (n.dot(p) - off);
            (overlap > 0.0).then_some((w as u8, n, overlap))
        })
    }

    /// Interior volume a bed of `depth` may be sampled in, keeping `r` clear of every wall.
    pub fn fill_region(&self, depth: Scalar, r: Scalar) -> Aabb {
        Aabb::new(
            Vec3::new(-self.half_length + r, -self.half_width + r, r),
            Vec3::new(self.half_length - r, self.half_width - r, (depth - r).max(r)),
        )
    }

    /// Outer extent including wall thickness.
    pub fn bounds(&self) -> Aabb {
        let t = self.wall_thickness;
        Aabb::new(
            Vec3::new(-self.half_length - t, -self.half_width - t, -t),
            Vec3::new(self.half_length + t, self.half_width + t, self.wall_height),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corner_sphere_touches_three_walls() {
        let c = Container { half_length: 1.0, half_width: 0.5, wall_thickness: 0.1, wall_height: 0.4 };
        let hits: Vec<_> = c.wall_contacts(Vec3::new(0.99, -0.49, 0.005), 0.02).collect();
        assert_eq!(hits.iter().map(|h| h.0).collect::<Vec<_>>(), vec![0, 2, 3]);
        assert!((hits[0].2 - 0.015).abs() < 1e-12);
        assert_eq!(hits[1].1, Vec3::NEG_X);
        assert_eq!(c.wall_contacts(Vec3::new(0.0, 0.0, 0.1), 0.02).count(), 0);
        assert!(c.bounds().contains(c.fill_region(0.2, 0.02).max));
    }
}
