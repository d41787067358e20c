use rigcosim_core::{Aabb, Scalar, Vec3, XorShift64};

use crate::config::SamplingMethod;

/// Densest packing of equal spheres.
const HCP_FRACTION: Scalar = 0.74;
/// Candidates tried around each active point before it retires.
const PD_ATTEMPTS: usize = 30;

/// Center spacing that yields `fraction` for an HCP arrangement, never closer than touching.
pub fn spacing_for_fraction(radius: Scalar, fraction: Scalar) -> Scalar {
    2.0 * radius * (HCP_FRACTION / fraction.clamp(1e-3, HCP_FRACTION)).cbrt().max(1.001)
}

/// Particle centers inside `region` for the given method.
/// `randomize` jitters lattice points (within the spacing slack) and seeds the
/// Poisson-disk front at a random point instead of the region center.
pub fn sample_centers(
    method: SamplingMethod,
    region: &Aabb,
    radius: Scalar,
    fraction: Scalar,
    randomize: bool,
    seed: u64,
) -> Vec<Vec3> {
    let d = spacing_for_fraction(radius, fraction);
    let mut rng = XorShift64::new(seed);
    let mut pts = match method {
        SamplingMethod::PoissonDisk => poisson_disk(region, d, randomize, &mut rng),
        SamplingMethod::HcpPack => hcp(region, d),
        SamplingMethod::RegularGrid => regular(region, d),
    };
    if randomize && method != SamplingMethod::PoissonDisk {
        let slack = 0.5 * (d - 2.0 * radius) * 0.99;
        for p in pts.iter_mut() {
            let j = Vec3::new(rng.range(-slack, slack), rng.range(-slack, slack), rng.range(-slack, slack)) / 3f64.sqrt();
            *p = (*p + j).clamp(region.min, region.max);
        }
    }
    pts
}

fn regular(region: &Aabb, d: Scalar) -> Vec<Vec3> {
    let e = region.extents();
    let n = [(e.x / d).floor() as usize + 1, (e.y / d).floor() as usize + 1, (e.z / d).floor() as usize + 1];
    let mut out = Vec::with_capacity(n[0] * n[1] * n[2]);
    for k in 0..n[2] {
        for j in 0..n[1] {
            for i in 0..n[0] {
                out.push(region.min + Vec3::new(i as Scalar, j as Scalar, k as Scalar) * d);
            }
        }
    }
    out
}

fn hcp(region: &Aabb, d: Scalar) -> Vec<Vec3> {
    let dy = 0.5 * 3f64.sqrt() * d;
    let dz = (2.0 / 3.0f64).sqrt() * d;
    let mut out = Vec::new();
    let mut k = 0usize;
    loop {
        let z = region.min.z + k as Scalar * dz;
        if z > region.max.z { break; }
        let mut j = 0usize;
        loop {
            let y = region.min.y + dy * (j as Scalar + if k % 2 == 1 { 1.0 / 3.0 } else { 0.0 });
            if y > region.max.y { break; }
            let x_off = if (j + k) % 2 == 1 { 0.5 * d } else { 0.0 };
            let mut i = 0usize;
            loop {
                let x = region.min.x + x_off + i as Scalar * d;
                if x > region.max.x { break; }
                out.push(Vec3::new(x, y, z));
                i += 1;
            }
            j += 1;
        }
        k += 1;
    }
    out
}

/// Bridson's algorithm on a background grid of cell size d/sqrt(3).
fn poisson_disk(region: &Aabb, d: Scalar, randomize: bool, rng: &mut XorShift64) -> Vec<Vec3> {
    let cell = d / 3f64.sqrt();
    let e = region.extents();
    let dims = [
        (e.x / cell).floor() as i64 + 1,
        (e.y / cell).floor() as i64 + 1,
        (e.z / cell).floor() as i64 + 1,
    ];
    let cell_of = |p: Vec3| -> [i64; 3] {
        let q = (p - region.min) / cell;
        [(q.x.floor() as i64).min(dims[0] - 1), (q.y.floor() as i64).min(dims[1] - 1), (q.z.floor() as i64).min(dims[2] - 1)]
    };
    let flat = |c: [i64; 3]| (c[0] + dims[0] * (c[1] + dims[1] * c[2])) as usize;
    let mut grid = vec![u32::MAX; (dims[0] * dims[1] * dims[2]) as usize];
    let mut pts: Vec<Vec3> = Vec::new();
    let mut active: Vec<usize> = Vec::new();

    let first = if randomize {
        Vec3::new(rng.range(region.min.x, region.max.x), rng.range(region.min.y, region.max.y), rng.range(region.min.z, region.max.z))
    } else {
        0.5 * (region.min + region.max)
    };
    grid[flat(cell_of(first))] = 0;
    pts.push(first);
    active.push(0);

    let d2 = d * d;
    while !active.is_empty() {
        let a = (rng.next_u32() as usize) % active.len();
        let base = pts[active[a]];
        let mut placed = false;
        for _ in 0..PD_ATTEMPTS {
            // uniform direction, radius in [d, 2d]
            let u = rng.range(-1.0, 1.0);
            let phi = rng.range(0.0, 2.0 * core::f64::consts::PI);
            let s = (1.0 - u * u).sqrt();
            let dir = Vec3::new(s * phi.cos(), s * phi.sin(), u);
            let cand = base + dir * rng.range(d, 2.0 * d);
            if !region.contains(cand) { continue; }
            let c = cell_of(cand);
            let mut ok = true;
            'scan: for dz in -2..=2 {
                for dy in -2..=2 {
                    for dx in -2..=2 {
                        let n = [c[0] + dx, c[1] + dy, c[2] + dz];
                        if n.iter().zip(dims).any(|(&v, m)| v < 0 || v >= m) { continue; }
                        let g = grid[flat(n)];
                        if g != u32::MAX && pts[g as usize].distance_squared(cand) < d2 {
                            ok = false;
                            break 'scan;
                        }
                    }
                }
            }
            if ok {
                grid[flat(c)] = pts.len() as u32;
                active.push(pts.len());
                pts.push(cand);
                placed = true;
                break;
            }
        }
        if !placed { active.swap_remove(a); }
    }
    pts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> Aabb { Aabb::new(Vec3::new(-0.2, -0.1, 0.02), Vec3::new(0.2, 0.1, 0.18)) }

    fn min_distance(p: &[Vec3]) -> Scalar {
        let mut m = Scalar::INFINITY;
        for i in 0..p.len() {
            for j in i + 1..p.len() { m = m.min(p[i].distance(p[j])); }
        }
        m
    }

    #[test]
    fn lattices_never_overlap() {
        for method in [SamplingMethod::HcpPack, SamplingMethod::RegularGrid, SamplingMethod::PoissonDisk] {
            for randomize in [false, true] {
                let p = sample_centers(method, &region(), 0.02, 0.5, randomize, 11);
                assert!(!p.is_empty());
                assert!(min_distance(&p) >= 0.04, "{method:?} randomize={randomize}");
                assert!(p.iter().all(|x| region().contains(*x)));
            }
        }
    }

    #[test]
    fn denser_target_gives_more_particles() {
        let loose = sample_centers(SamplingMethod::HcpPack, &region(), 0.02, 0.3, false, 1).len();
        let dense = sample_centers(SamplingMethod::HcpPack, &region(), 0.02, 0.74, false, 1).len();
        assert!(dense > loose, "{dense} <= {loose}");
    }

    #[test]
    fn sampling_is_reproducible() {
        let a = sample_centers(SamplingMethod::PoissonDisk, &region(), 0.02, 0.5, true, 99);
        let b = sample_centers(SamplingMethod::PoissonDisk, &region(), 0.02, 0.5, true, 99);
        assert_eq!(a, b);
    }
}
