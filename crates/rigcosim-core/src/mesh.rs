use core::f64::consts::PI;
use crate::types::Vec3;
use crate::{CosimError, CosimResult, Scalar};

/// Triangle surface mesh of a tire, expressed in the wheel frame (spin axis = Y).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TriMesh {
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
}

impl TriMesh {
    /// Tread surface of a cylinder: `n_circ` divisions around, `n_width` rings across.
    pub fn cylinder(radius: Scalar, width: Scalar, n_circ: u32, n_width: u32) -> CosimResult<Self> {
        if n_circ < 3 || n_width < 2 {
            return Err(CosimError::config(format!(
                "tire mesh needs at least 3x2 divisions (got {n_circ}x{n_width})")));
        }
        if !(radius > 0.0 && width > 0.0) {
            return Err(CosimError::config("tire radius and width must be positive"));
        }
        let nv = (n_circ * n_width) as usize;
        let mut vertices = Vec::with_capacity(nv);
        let mut normals = Vec::with_capacity(nv);
        for j in 0..n_width {
            let y = -0.5 * width + width * j as Scalar / (n_width - 1) as Scalar;
            for i in 0..n_circ {
                let th = 2.0 * PI * i as Scalar / n_circ as Scalar;
                let (s, c) = th.sin_cos();
                vertices.push(Vec3::new(radius * c, y, radius * s));
                normals.push(Vec3::new(c, 0.0, s));
            }
        }
        let idx = |i: u32, j: u32| (i % n_circ) + j * n_circ;
        let mut triangles = Vec::with_capacity((2 * n_circ * (n_width - 1)) as usize);
        for j in 0..n_width - 1 {
            for i in 0..n_circ {
                let (a, b, c, d) = (idx(i, j), idx(i + 1, j), idx(i, j + 1), idx(i + 1, j + 1));
                // outward winding
                triangles.push([a, d, b]);
                triangles.push([a, c, d]);
            }
        }
        Ok(Self { vertices, normals, triangles })
    }

    #[inline] pub fn num_vertices(&self) -> usize { self.vertices.len() }
    #[inline] pub fn num_triangles(&self) -> usize { self.triangles.len() }

    pub fn triangle_area(&self, t: usize) -> Scalar {
        let [a, b, c] = self.triangles[t];
        let (pa, pb, pc) = (self.vertices[a as usize], self.vertices[b as usize], self.vertices[c as usize]);
        0.5 * (pb - pa).cross(pc - pa).length()
    }

    /// Lumped area per vertex (one third of each adjacent triangle).
    pub fn vertex_areas(&self) -> Vec<Scalar> {
        let mut out = vec![0.0; self.vertices.len()];
        for (t, tri) in self.triangles.iter().enumerate() {
            let a = self.triangle_area(t) / 3.0;
            for &v in tri { out[v as usize] += a; }
        }
        out
    }

    pub fn total_area(&self) -> Scalar {
        (0..self.triangles.len()).map(|t| self.triangle_area(t)).sum()
    }

    /// Every index in range, normals paired with vertices.
    pub fn validate(&self) -> CosimResult<()> {
        if self.vertices.is_empty() || self.triangles.is_empty() {
            return Err(CosimError::protocol("tire mesh is empty"));
        }
        if self.normals.len() != self.vertices.len() {
            return Err(CosimError::protocol(format!(
                "mesh has {} normals for {} vertices", self.normals.len(), self.vertices.len())));
        }
        let nv = self.vertices.len() as u32;
        if let Some(t) = self.triangles.iter().position(|tri| tri.iter().any(|&v| v >= nv)) {
            return Err(CosimError::protocol(format!("triangle {t} references a missing vertex")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cylinder_counts_and_area() {
        let m = TriMesh::cylinder(0.5, 0.2, 64, 5).unwrap();
        assert_eq!(m.num_vertices(), 64 * 5);
        assert_eq!(m.num_triangles(), 2 * 64 * 4);
        m.validate().unwrap();

        let exact = 2.0 * PI * 0.5 * 0.2;
        let rel = (m.total_area() - exact).abs() / exact;
        assert!(rel < 0.01, "area off by {rel}");

        let lumped: f64 = m.vertex_areas().iter().sum();
        assert!((lumped - m.total_area()).abs() < 1e-12);
    }

    #[test]
    fn normals_point_outward() {
        let m = TriMesh::cylinder(0.4, 0.1, 12, 2).unwrap();
        for (t, tri) in m.triangles.iter().enumerate() {
            let [a, b, c] = tri.map(|v| m.vertices[v as usize]);
            let n = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;
            let radial = Vec3::new(centroid.x, 0.0, centroid.z);
            assert!(n.dot(radial) > 0.0, "triangle {t} faces inward");
        }
    }

    #[test]
    fn rejects_degenerate_divisions() {
        assert!(TriMesh::cylinder(0.5, 0.2, 2, 5).is_err());
        assert!(TriMesh::cylinder(0.5, 0.2, 8, 1).is_err());
        assert!(TriMesh::cylinder(-0.5, 0.2, 8, 2).is_err());
    }
}
