//! Weakly compressible SPH bed.
//!
//! Particles are SPH markers of mass `rho0 * d^3` for the sampling spacing
//! `d`. Density is summed with a cubic-spline kernel of support `2h`,
//! pressure follows the Tait equation (tension clipped), and Monaghan
//! artificial viscosity damps approaching pairs. Walls and tire proxies push
//! back through the same contact law the DEM beds use.

use std::collections::BTreeMap;
use core::f64::consts::PI;

use rayon::prelude::*;

use rigcosim_core::{CosimError, CosimResult, Scalar, StepHasher, TerrainKind, Vec3, WorkerPool};
use rigcosim_materials::{contact_force, ContactGeometry};

use crate::checkpoint::{Checkpoint, Layout};
use crate::config::{GranularConfig, SphParams, TerrainConfig};
use super::grid::CellGrid;
use super::particles::{ParticleDesc, Particles};
use super::sampling::spacing_for_fraction;
use super::{pack, Bed, GranularSolver, TireContact};

/// x, y, z, vx, vy, vz, density, radius
pub const SPH_COLUMNS: usize = 8;

#[inline]
fn kernel(r: Scalar, h: Scalar) -> Scalar {
    let q = r / h;
    let sigma = 1.0 / (PI * h * h * h);
    if q < 1.0 {
        sigma * (1.0 - 1.5 * q * q + 0.75 * q * q * q)
    } else if q < 2.0 {
        sigma * 0.25 * (2.0 - q).powi(3)
    } else {
        0.0
    }
}

/// dW/dr
#[inline]
fn kernel_slope(r: Scalar, h: Scalar) -> Scalar {
    let q = r / h;
    let sigma = 1.0 / (PI * h * h * h * h);
    if q < 1.0 {
        sigma * (-3.0 * q + 2.25 * q * q)
    } else if q < 2.0 {
        -sigma * 0.75 * (2.0 - q) * (2.0 - q)
    } else {
        0.0
    }
}

pub struct SphSolver {
    params: SphParams,
    pool: WorkerPool,
    grid: CellGrid,
    spacing: Scalar,
    h: Scalar,
    rho0: Scalar,
    mass: Scalar,
    rho: Vec<Scalar>,
    walls: BTreeMap<(u32, u8), Vec3>,
    tire: BTreeMap<(u32, u32), Vec3>,
    forces: Vec<Vec3>,
}

impl SphSolver {
    pub fn smoothing_length(&self) -> Scalar { self.h }
    pub fn densities(&self) -> &[Scalar] { &self.rho }

    #[inline]
    fn pressure(&self, rho: Scalar) -> Scalar {
        let b = self.rho0 * self.params.sound_speed * self.params.sound_speed / self.params.gamma;
        (b * ((rho / self.rho0).powf(self.params.gamma) - 1.0)).max(0.0)
    }
}

impl GranularSolver for SphSolver {
    type Params = SphParams;
    const KIND: TerrainKind = TerrainKind::GranularSph;
    const LAYOUT: Layout = Layout::RowMajor;
    const COLUMNS: usize = SPH_COLUMNS;

    fn create(cfg: &TerrainConfig, g: &GranularConfig, params: SphParams) -> CosimResult<Self> {
        params.validate()?;
        let spacing = spacing_for_fraction(g.radius, g.volume_fraction);
        let h = params.kernel_factor * spacing;
        Ok(Self {
            pool: WorkerPool::new("granular-sph", cfg.threads)?,
            grid: CellGrid::new(2.0 * h),
            spacing,
            h,
            rho0: g.density,
            mass: g.density * spacing.powi(3),
            rho: Vec::new(),
            walls: BTreeMap::new(),
            tire: BTreeMap::new(),
            forces: Vec::new(),
            params,
        })
    }

    fn prepare(&mut self, bed: &mut Bed) {
        let n = bed.particles.len();
        bed.particles.inv_mass.iter_mut().for_each(|m| *m = 1.0 / self.mass);
        bed.particles.inv_inertia.iter_mut().for_each(|i| *i = 0.0);
        if self.rho.len() != n { self.rho = vec![self.rho0; n]; }
    }

    fn hash_params(&self, h: &mut StepHasher) {
        let p = &self.params;
        for v in [p.kernel_factor, p.sound_speed, p.gamma, p.alpha, self.spacing] { h.update_f64(v); }
    }

    fn substep(&mut self, bed: &mut Bed, mut tire: Option<TireContact<'_>>, dt: Scalar) {
        let ps = &bed.particles;
        let np = ps.len();
        let (h, m) = (self.h, self.mass);
        self.grid.rebuild(&ps.pos);

        let grid = &self.grid;
        let rho: Vec<Scalar> = self.pool.install(|| {
            (0..np).into_par_iter().map(|i| {
                let mut sum = 0.0;
                let mut near = Vec::new();
                grid.for_each_near(ps.pos[i], |j| near.push(j));
                near.sort_unstable();
                for j in near { sum += m * kernel(ps.pos[i].distance(ps.pos[j as usize]), h); }
                sum
            }).collect()
        });
        let pressure: Vec<Scalar> = rho.iter().map(|&r| self.pressure(r)).collect();

        let (c, alpha) = (self.params.sound_speed, self.params.alpha);
        let (rho_ref, p_ref) = (&rho, &pressure);
        let sph: Vec<Vec3> = self.pool.install(|| {
            (0..np).into_par_iter().map(|i| {
                let mut near = Vec::new();
                grid.for_each_near(ps.pos[i], |j| near.push(j));
                near.sort_unstable();
                let mut acc = Vec3::ZERO;
                let pi_term = p_ref[i] / (rho_ref[i] * rho_ref[i]);
                for j in near {
                    let j = j as usize;
                    if j == i { continue; }
                    let rij = ps.pos[i] - ps.pos[j];
                    let dist = rij.length();
                    if dist <= 0.0 || dist >= 2.0 * h { continue; }
                    let grad = rij * (kernel_slope(dist, h) / dist);
                    let vij = ps.vel[i] - ps.vel[j];
                    let approach = vij.dot(rij);
                    let visc = if approach < 0.0 {
                        let mu = h * approach / (dist * dist + 0.01 * h * h);
                        -alpha * c * mu / (0.5 * (rho_ref[i] + rho_ref[j]))
                    } else {
                        0.0
                    };
                    acc -= grad * (m * (pi_term + p_ref[j] / (rho_ref[j] * rho_ref[j]) + visc));
                }
                acc * m
            }).collect()
        });
        self.forces = sph;

        let (model, mat) = (&bed.model, &bed.material);
        let mut walls = BTreeMap::new();
        let mut tire_hist = BTreeMap::new();
        for i in 0..np {
            let (r, p, v) = (ps.radius[i], ps.pos[i], ps.vel[i]);
            for (w, n, overlap) in bed.container.wall_contacts(p, r) {
                let geom = ContactGeometry { normal: n, overlap, eff_radius: r, eff_mass: m, rel_vel: v };
                let key = (i as u32, w);
                let mut hist = self.walls.get(&key).copied().unwrap_or(Vec3::ZERO);
                self.forces[i] += contact_force(model, mat, &geom, Some(&mut hist), dt);
                walls.insert(key, hist);
            }
        }
        if let Some(t) = tire.as_mut() {
            let rc = t.proxies.radius();
            let mv = t.proxies.vertex_mass();
            let eff_mass = if m + mv > 0.0 { m * mv / (m + mv) } else { 0.0 };
            for vtx in 0..t.proxies.len() {
                let q = t.proxies.position(vtx, t.tau);
                let mut near = Vec::new();
                grid.for_each_near(q, |j| near.push(j));
                near.sort_unstable();
                for j in near {
                    let i = j as usize;
                    let r = ps.radius[i];
                    let d = ps.pos[i] - q;
                    let dist = d.length();
                    let overlap = r + rc - dist;
                    if overlap <= 0.0 || dist <= 0.0 { continue; }
                    let n = d / dist;
                    let geom = ContactGeometry {
                        normal: n,
                        overlap,
                        eff_radius: r * rc / (r + rc),
                        eff_mass,
                        rel_vel: ps.vel[i] - t.proxies.velocity(vtx),
                    };
                    let key = (j, vtx as u32);
                    let mut hist = self.tire.get(&key).copied().unwrap_or(Vec3::ZERO);
                    let f = contact_force(model, t.material, &geom, Some(&mut hist), dt);
                    tire_hist.insert(key, hist);
                    self.forces[i] += f;
                    t.proxies.forces[vtx] -= f;
                }
            }
            self.tire = tire_hist;
        }
        self.walls = walls;
        self.rho = rho;

        let zero = vec![Vec3::ZERO; np];
        let (forces, particles) = (&self.forces, &mut bed.particles);
        self.pool.install(|| particles.integrate(forces, &zero, dt));
    }

    fn forget_contacts(&mut self) {
        self.walls.clear();
        self.tire.clear();
    }

    fn encode(&self, bed: &Bed) -> Vec<f64> {
        let p = &bed.particles;
        let rows: Vec<[f64; SPH_COLUMNS]> = (0..p.len())
            .map(|i| {
                let (x, v) = (p.pos[i], p.vel[i]);
                [x.x, x.y, x.z, v.x, v.y, v.z, self.rho[i], p.radius[i]]
            })
            .collect();
        pack(&rows, Self::LAYOUT)
    }

    fn decode(&mut self, bed: &mut Bed, c: &Checkpoint) -> CosimResult<()> {
        let mut particles = Particles::with_capacity(c.rows);
        let mut rho = Vec::with_capacity(c.rows);
        for i in 0..c.rows {
            let r = c.row::<SPH_COLUMNS>(i);
            if !(r[6] > 0.0 && r[7] > 0.0) {
                return Err(CosimError::checkpoint(format!("SPH record {i} has non-positive density or radius")));
            }
            particles.add(ParticleDesc {
                pos: Vec3::new(r[0], r[1], r[2]),
                vel: Vec3::new(r[3], r[4], r[5]),
                omega: Vec3::ZERO,
                radius: r[7],
                density: bed.density,
                tag: 0,
            });
            rho.push(r[6]);
        }
        bed.particles = particles;
        self.rho = rho;
        self.prepare(bed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_is_normalized() {
        // integrate W over a fine lattice
        let h = 0.05;
        let step = h / 10.0;
        let mut sum = 0.0;
        for i in -25..=25 {
            for j in -25..=25 {
                for k in -25..=25 {
                    let r = Vec3::new(i as f64, j as f64, k as f64).length() * step;
                    sum += kernel(r, h) * step * step * step;
                }
            }
        }
        assert!((sum - 1.0).abs() < 1e-2, "integral {sum}");
        assert!(kernel_slope(0.5 * h, h) < 0.0);
        assert_eq!(kernel(2.0 * h, h), 0.0);
    }

    #[test]
    fn tait_pressure_never_pulls() {
        let cfg = TerrainConfig::default();
        let s = SphSolver::create(&cfg, &GranularConfig::default(), SphParams::default()).unwrap();
        assert_eq!(s.pressure(0.9 * s.rho0), 0.0);
        assert!(s.pressure(1.01 * s.rho0) > 0.0);
        assert!((s.smoothing_length() - 1.2 * s.spacing).abs() < 1e-15);
    }
}
