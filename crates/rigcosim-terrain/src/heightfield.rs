use glam::{DVec2, UVec2};
use rigcosim_core::{Scalar, Vec3};

/// Regular grid heightfield over the XY plane; heights along +Z.
#[derive(Clone, Debug)]
pub struct HeightField {
    pub dims: UVec2,      // nx, ny
    pub cell: DVec2,      // sx, sy (m per cell)
    pub origin: DVec2,    // world XY of node (0,0)
    pub heights: Vec<Scalar>,
}

impl HeightField {
    pub fn flat(dims: UVec2, cell: DVec2, origin: DVec2, h: Scalar) -> Self {
        let n = (dims.x as usize) * (dims.y as usize);
        Self { dims, cell, origin, heights: vec![h; n] }
    }

    #[inline] pub fn len(&self) -> usize { self.heights.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.heights.is_empty() }

    #[inline] pub fn idx(&self, x: u32, y: u32) -> usize {
        (x as usize) + (y as usize) * (self.dims.x as usize)
    }
    #[inline] fn h(&self, x: i64, y: i64) -> Scalar { self.heights[self.idx(x as u32, y as u32)] }

    pub fn node_xy(&self, i: usize) -> DVec2 {
        let nx = self.dims.x as usize;
        self.origin + DVec2::new((i % nx) as Scalar, (i / nx) as Scalar) * self.cell
    }

    /// Nearest grid node to world (x, y), or None outside the grid.
    pub fn nearest(&self, x: Scalar, y: Scalar) -> Option<usize> {
        let fx = ((x - self.origin.x) / self.cell.x).round();
        let fy = ((y - self.origin.y) / self.cell.y).round();
        if fx < 0.0 || fy < 0.0 || fx >= self.dims.x as Scalar || fy >= self.dims.y as Scalar {
            return None;
        }
        Some(self.idx(fx as u32, fy as u32))
    }

    pub fn range(&self) -> (Scalar, Scalar) {
        let (mut lo, mut hi) = (Scalar::INFINITY, Scalar::NEG_INFINITY);
        for &h in &self.heights { lo = lo.min(h); hi = hi.max(h); }
        (lo, hi)
    }

    /// Bilinear height at world (x, y), clamped to the grid.
    pub fn sample_height(&self, x: Scalar, y: Scalar) -> Scalar {
        let nx = self.dims.x as i64; let ny = self.dims.y as i64;
        let fx = ((x - self.origin.x) / self.cell.x).clamp(0.0, (nx - 1) as Scalar - 1e-9).max(0.0);
        let fy = ((y - self.origin.y) / self.cell.y).clamp(0.0, (ny - 1) as Scalar - 1e-9).max(0.0);
        let x0 = fx.floor() as i64; let x1 = (x0 + 1).min(nx - 1);
        let y0 = fy.floor() as i64; let y1 = (y0 + 1).min(ny - 1);
        let tx = fx - x0 as Scalar;  let ty = fy - y0 as Scalar;

        let a = self.h(x0, y0) * (1.0 - tx) + self.h(x1, y0) * tx;
        let b = self.h(x0, y1) * (1.0 - tx) + self.h(x1, y1) * tx;
        a * (1.0 - ty) + b * ty
    }

    /// Central-difference unit normal at world (x, y).
    pub fn sample_normal(&self, x: Scalar, y: Scalar) -> Vec3 {
        let hx0 = self.sample_height(x - self.cell.x, y);
        let hx1 = self.sample_height(x + self.cell.x, y);
        let hy0 = self.sample_height(x, y - self.cell.y);
        let hy1 = self.sample_height(x, y + self.cell.y);

        let ddx = (hx1 - hx0) / (2.0 * self.cell.x.max(1e-9));
        let ddy = (hy1 - hy0) / (2.0 * self.cell.y.max(1e-9));

        Vec3::new(-ddx, -ddy, 1.0).normalize_or_zero()
    }
}
