//! Accelerated DEM: one gather kernel invocation per particle.
//!
//! The device is a dedicated worker pool. Each kernel invocation reads the
//! whole bed and the tire surface but writes only its own particle's force,
//! torque and contact history, so results do not depend on scheduling. Tire
//! contact is evaluated against the tire triangles and each particle keeps
//! only its deepest triangle contact.

use rayon::prelude::*;

use rigcosim_core::{CosimResult, Scalar, TerrainKind, TriMesh, Vec3, WorkerPool};
use rigcosim_materials::{contact_force, CompositeMaterial, ContactGeometry, ContactModel};

use crate::checkpoint::Layout;
use crate::config::{GranularConfig, TerrainConfig};
use super::container::Container;
use super::grid::CellGrid;
use super::particles::Particles;
use super::{Bed, GranularSolver, TireContact};

/// Compute queue the accelerated variant launches kernels on.
#[derive(Debug)]
pub struct GpuDevice {
    pool: WorkerPool,
}

impl GpuDevice {
    pub fn open(threads: usize) -> CosimResult<Self> {
        Ok(Self { pool: WorkerPool::new("granular-gpu", threads)? })
    }

    /// Run `kernel` for every index in `0..n`; results come back in index order.
    pub fn launch<T, F>(&self, n: usize, kernel: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Send + Sync,
    {
        self.pool.install(|| (0..n).into_par_iter().map(kernel).collect())
    }

    pub fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R { self.pool.install(f) }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
enum Partner {
    Particle(u32),
    Wall(u8),
    Triangle(u32),
}

type ContactList = Vec<(Partner, Vec3)>;

#[inline]
fn history_of(list: &ContactList, p: Partner) -> Vec3 {
    list.binary_search_by(|e| e.0.cmp(&p)).map_or(Vec3::ZERO, |k| list[k].1)
}

/// Closest point on triangle `abc` to `p` and its barycentric weights.
pub fn closest_point_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> (Vec3, [Scalar; 3]) {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 { return (a, [1.0, 0.0, 0.0]); }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 { return (b, [0.0, 1.0, 0.0]); }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return (a + ab * v, [1.0 - v, v, 0.0]);
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 { return (c, [0.0, 0.0, 1.0]); }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return (a + ac * w, [1.0 - w, 0.0, w]);
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (b + (c - b) * w, [0.0, 1.0 - w, w]);
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    (a + ab * v + ac * w, [1.0 - v - w, v, w])
}

/// What one kernel invocation produces for its particle.
struct Gathered {
    force: Vec3,
    torque: Vec3,
    contacts: ContactList,
    /// Tire triangle reaction split over its vertices.
    reaction: Option<([u32; 3], [Vec3; 3])>,
}

/// Read-only view of the tire surface for one substep.
struct Surface<'a> {
    mesh: &'a TriMesh,
    vpos: Vec<Vec3>,
    vvel: &'a [Vec3],
    vertex_mass: Scalar,
    material: &'a CompositeMaterial,
    bins: &'a CellGrid,
}

pub struct GpuDem {
    device: GpuDevice,
    grid: CellGrid,
    bins: CellGrid,
    history: Vec<ContactList>,
    forces: Vec<Vec3>,
    torques: Vec<Vec3>,
}

#[inline]
fn reduced(a: Scalar, b: Scalar) -> Scalar {
    if a + b > 0.0 { a * b / (a + b) } else { 0.0 }
}

#[allow(clippy::too_many_arguments)]
fn gather(
    i: usize,
    ps: &Particles,
    grid: &CellGrid,
    container: &Container,
    model: &ContactModel,
    mat: &CompositeMaterial,
    old: &ContactList,
    surface: Option<&Surface<'_>>,
    h: Scalar,
) -> Gathered {
    let (pi, ri, mi) = (ps.pos[i], ps.radius[i], ps.mass(i));
    let spin = |n: Vec3| ps.vel[i] + ps.omega[i].cross(-ri * n);
    let mut out = Gathered { force: Vec3::ZERO, torque: Vec3::ZERO, contacts: Vec::new(), reaction: None };
    let apply = |out: &mut Gathered, key: Partner, n: Vec3, geom: ContactGeometry, m: &CompositeMaterial| {
        let mut hist = history_of(old, key);
        let f = contact_force(model, m, &geom, Some(&mut hist), h);
        out.contacts.push((key, hist));
        out.force += f;
        out.torque += (-ri * n).cross(f);
        f
    };

    let mut near = Vec::new();
    grid.for_each_near(pi, |j| near.push(j));
    near.sort_unstable();
    for j in near {
        let j = j as usize;
        if j == i { continue; }
        let rj = ps.radius[j];
        let d = pi - ps.pos[j];
        let dist = d.length();
        let overlap = ri + rj - dist;
        if overlap <= 0.0 || dist <= 0.0 { continue; }
        let n = d / dist;
        let geom = ContactGeometry {
            normal: n,
            overlap,
            eff_radius: reduced(ri, rj),
            eff_mass: reduced(mi, ps.mass(j)),
            rel_vel: spin(n) - (ps.vel[j] + ps.omega[j].cross(rj * n)),
        };
        apply(&mut out, Partner::Particle(j as u32), n, geom, mat);
    }

    for (w, n, overlap) in container.wall_contacts(pi, ri) {
        let geom = ContactGeometry { normal: n, overlap, eff_radius: ri, eff_mass: mi, rel_vel: spin(n) };
        apply(&mut out, Partner::Wall(w), n, geom, mat);
    }

    if let Some(s) = surface {
        // deepest triangle only
        let mut best: Option<(Scalar, u32, Vec3, Vec3, [Scalar; 3])> = None;
        for t in s.bins.cell_ids(pi) {
            let [a, b, c] = s.mesh.triangles[t as usize];
            let (va, vb, vc) = (s.vpos[a as usize], s.vpos[b as usize], s.vpos[c as usize]);
            let (q, bary) = closest_point_triangle(pi, va, vb, vc);
            let d = pi - q;
            let dist = d.length();
            let overlap = ri - dist;
            if overlap <= 0.0 { continue; }
            let n = if dist > 1e-12 { d / dist } else { (vb - va).cross(vc - va).normalize_or_zero() };
            if best.map_or(true, |b| overlap > b.0) { best = Some((overlap, t, n, q, bary)); }
        }
        if let Some((overlap, t, n, _, bary)) = best {
            let tri = s.mesh.triangles[t as usize];
            let v_surf = (0..3).map(|k| s.vvel[tri[k] as usize] * bary[k]).sum::<Vec3>();
            let geom = ContactGeometry {
                normal: n,
                overlap,
                eff_radius: ri,
                eff_mass: reduced(mi, s.vertex_mass),
                rel_vel: spin(n) - v_surf,
            };
            let f = apply(&mut out, Partner::Triangle(t), n, geom, s.material);
            out.reaction = Some((tri, [-f * bary[0], -f * bary[1], -f * bary[2]]));
        }
    }

    out.contacts.sort_unstable_by(|a, b| a.0.cmp(&b.0));
    out
}

impl GranularSolver for GpuDem {
    type Params = ();
    const KIND: TerrainKind = TerrainKind::GranularGpu;
    const LAYOUT: Layout = Layout::ColumnMajor;

    fn create(cfg: &TerrainConfig, g: &GranularConfig, _: ()) -> CosimResult<Self> {
        Ok(Self {
            device: GpuDevice::open(cfg.threads)?,
            grid: CellGrid::new(2.0 * g.radius),
            bins: CellGrid::new(2.0 * g.radius),
            history: Vec::new(),
            forces: Vec::new(),
            torques: Vec::new(),
        })
    }

    fn prepare(&mut self, bed: &mut Bed) {
        let rmax = bed.particles.radius.iter().copied().fold(0.0, Scalar::max);
        if rmax > 0.0 {
            self.grid = CellGrid::new(2.0 * rmax);
            self.bins = CellGrid::new(2.0 * rmax);
        }
        self.history = vec![Vec::new(); bed.particles.len()];
    }

    fn substep(&mut self, bed: &mut Bed, tire: Option<TireContact<'_>>, h: Scalar) {
        let np = bed.particles.len();
        self.grid.rebuild(&bed.particles.pos);

        let rmax = self.grid.cell_size() * 0.5;
        let mut tire = tire;
        let surface = tire.as_ref().map(|t| {
            let p = &t.proxies;
            let vpos: Vec<Vec3> = (0..p.len()).map(|v| p.position(v, t.tau)).collect();
            self.bins.clear();
            for (k, tri) in p.tire.mesh.triangles.iter().enumerate() {
                let (a, b, c) = (vpos[tri[0] as usize], vpos[tri[1] as usize], vpos[tri[2] as usize]);
                let lo = a.min(b).min(c) - Vec3::splat(rmax);
                let hi = a.max(b).max(c) + Vec3::splat(rmax);
                self.bins.insert_box(lo, hi, k as u32);
            }
            self.bins.sort();
            vpos
        });
        let surface = match (&tire, surface) {
            (Some(t), Some(vpos)) => Some(Surface {
                mesh: &t.proxies.tire.mesh,
                vpos,
                vvel: &t.proxies.state.vvel,
                vertex_mass: t.proxies.vertex_mass(),
                material: t.material,
                bins: &self.bins,
            }),
            _ => None,
        };

        let (ps, grid, container, model, mat, history) =
            (&bed.particles, &self.grid, &bed.container, &bed.model, &bed.material, &self.history);
        let gathered = self.device.launch(np, |i| {
            gather(i, ps, grid, container, model, mat, &history[i], surface.as_ref(), h)
        });
        drop(surface);

        self.forces.clear();
        self.torques.clear();
        let mut reactions = Vec::new();
        for (i, g) in gathered.into_iter().enumerate() {
            self.forces.push(g.force);
            self.torques.push(g.torque);
            self.history[i] = g.contacts;
            if let Some(r) = g.reaction { reactions.push(r); }
        }
        if let Some(t) = tire.as_mut() {
            for (tri, f) in reactions {
                for k in 0..3 { t.proxies.forces[tri[k] as usize] += f[k]; }
            }
        }

        let (forces, torques, particles) = (&self.forces, &self.torques, &mut bed.particles);
        self.device.install(|| particles.integrate(forces, torques, h));
    }

    fn forget_contacts(&mut self) {
        self.history.iter_mut().for_each(Vec::clear);
    }
}
