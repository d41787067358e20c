use std::collections::BTreeMap;

use rigcosim_core::{Aabb, CosimResult, Scalar, TerrainKind, Vec3, WorkerPool};
use rigcosim_materials::{contact_force, ContactGeometry};

use crate::checkpoint::Layout;
use crate::config::{GranularConfig, TerrainConfig};
use super::broadphase::pairs_sap;
use super::{Bed, GranularSolver, TireContact};

type History<K> = BTreeMap<K, Vec3>;

/// Pairwise DEM: sweep-and-prune over particles and tire proxy spheres,
/// contact forces accumulated serially in pair order.
pub struct CpuDem {
    pool: WorkerPool,
    pairs: History<(u32, u32)>,
    walls: History<(u32, u8)>,
    tire: History<(u32, u32)>,
    forces: Vec<Vec3>,
    torques: Vec<Vec3>,
    aabbs: Vec<Aabb>,
}

#[inline]
fn reduced(a: Scalar, b: Scalar) -> Scalar {
    if a + b > 0.0 { a * b / (a + b) } else { 0.0 }
}

impl GranularSolver for CpuDem {
    type Params = ();
    const KIND: TerrainKind = TerrainKind::GranularCpu;
    const LAYOUT: Layout = Layout::RowMajor;

    fn create(cfg: &TerrainConfig, _g: &GranularConfig, _: ()) -> CosimResult<Self> {
        Ok(Self {
            pool: WorkerPool::new("granular-cpu", cfg.threads)?,
            pairs: BTreeMap::new(),
            walls: BTreeMap::new(),
            tire: BTreeMap::new(),
            forces: Vec::new(),
            torques: Vec::new(),
            aabbs: Vec::new(),
        })
    }

    fn substep(&mut self, bed: &mut Bed, mut tire: Option<TireContact<'_>>, h: Scalar) {
        let ps = &bed.particles;
        let np = ps.len();
        let (model, mat) = (&bed.model, &bed.material);
        self.forces.clear();
        self.forces.resize(np, Vec3::ZERO);
        self.torques.clear();
        self.torques.resize(np, Vec3::ZERO);

        self.aabbs.clear();
        self.aabbs.extend((0..np).map(|i| Aabb::from_sphere(ps.pos[i], ps.radius[i])));
        if let Some(t) = &tire {
            let r = t.proxies.radius();
            self.aabbs.extend((0..t.proxies.len()).map(|v| Aabb::from_sphere(t.proxies.position(v, t.tau), r)));
        }

        let mut pairs = History::new();
        let mut tire_hist = History::new();
        for (i, j) in pairs_sap(&self.aabbs) {
            // proxies sit after the particles, so i < j makes i a particle
            if i >= np { continue; }
            let (ri, pi) = (ps.radius[i], ps.pos[i]);
            if j < np {
                let rj = ps.radius[j];
                let d = pi - ps.pos[j];
                let dist = d.length();
                let overlap = ri + rj - dist;
                if overlap <= 0.0 || dist <= 0.0 { continue; }
                let n = d / dist;
                let vi = ps.vel[i] + ps.omega[i].cross(-ri * n);
                let vj = ps.vel[j] + ps.omega[j].cross(rj * n);
                let geom = ContactGeometry {
                    normal: n,
                    overlap,
                    eff_radius: reduced(ri, rj),
                    eff_mass: reduced(ps.mass(i), ps.mass(j)),
                    rel_vel: vi - vj,
                };
                let key = (i as u32, j as u32);
                let mut hist = self.pairs.get(&key).copied().unwrap_or(Vec3::ZERO);
                let f = contact_force(model, mat, &geom, Some(&mut hist), h);
                pairs.insert(key, hist);
                self.forces[i] += f;
                self.forces[j] -= f;
                self.torques[i] += (-ri * n).cross(f);
                self.torques[j] += (rj * n).cross(-f);
            } else if let Some(t) = tire.as_mut() {
                let v = j - np;
                let rc = t.proxies.radius();
                let d = pi - t.proxies.position(v, t.tau);
                let dist = d.length();
                let overlap = ri + rc - dist;
                if overlap <= 0.0 || dist <= 0.0 { continue; }
                let n = d / dist;
                let geom = ContactGeometry {
                    normal: n,
                    overlap,
                    eff_radius: reduced(ri, rc),
                    eff_mass: reduced(ps.mass(i), t.proxies.vertex_mass()),
                    rel_vel: ps.vel[i] + ps.omega[i].cross(-ri * n) - t.proxies.velocity(v),
                };
                let key = (i as u32, v as u32);
                let mut hist = self.tire.get(&key).copied().unwrap_or(Vec3::ZERO);
                let f = contact_force(model, t.material, &geom, Some(&mut hist), h);
                tire_hist.insert(key, hist);
                self.forces[i] += f;
                self.torques[i] += (-ri * n).cross(f);
                t.proxies.forces[v] -= f;
            }
        }

        let mut walls = History::new();
        for i in 0..np {
            let (r, p) = (ps.radius[i], ps.pos[i]);
            for (w, n, overlap) in bed.container.wall_contacts(p, r) {
                let geom = ContactGeometry {
                    normal: n,
                    overlap,
                    eff_radius: r,
                    eff_mass: ps.mass(i),
                    rel_vel: ps.vel[i] + ps.omega[i].cross(-r * n),
                };
                let key = (i as u32, w);
                let mut hist = self.walls.get(&key).copied().unwrap_or(Vec3::ZERO);
                let f = contact_force(model, mat, &geom, Some(&mut hist), h);
                walls.insert(key, hist);
                self.forces[i] += f;
                self.torques[i] += (-r * n).cross(f);
            }
        }
        self.pairs = pairs;
        self.walls = walls;
        if tire.is_some() { self.tire = tire_hist; }

        let (forces, torques, particles) = (&self.forces, &self.torques, &mut bed.particles);
        self.pool.install(|| particles.integrate(forces, torques, h));
    }

    fn forget_contacts(&mut self) {
        self.pairs.clear();
        self.walls.clear();
        self.tire.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::granular::{Container, ParticleDesc, Particles};
    use rigcosim_materials::{composite, preset, ContactModel, MaterialPreset};

    fn bed(particles: Particles) -> Bed {
        let m = preset(MaterialPreset::GranularSmc);
        Bed {
            particles,
            container: Container { half_length: 0.5, half_width: 0.5, wall_thickness: 0.1, wall_height: 0.5 },
            model: ContactModel::default(),
            material: composite(&m, &m),
            density: 2500.0,
        }
    }

    fn sphere(pos: Vec3, vel: Vec3) -> ParticleDesc {
        ParticleDesc { pos, vel, omega: Vec3::ZERO, radius: 0.02, density: 2500.0, tag: 0 }
    }

    #[test]
    fn particle_comes_to_rest_on_the_floor() {
        let mut p = Particles::default();
        p.add(sphere(Vec3::new(0.0, 0.0, 0.05), Vec3::ZERO));
        let mut b = bed(p);
        let mut dem = CpuDem::create(&TerrainConfig::default(), &GranularConfig::default(), ()).unwrap();
        for _ in 0..5000 { dem.substep(&mut b, None, 1e-4); }
        let z = b.particles.pos[0].z;
        assert!(z > 0.015 && z < 0.02, "resting height {z}");
        assert!(b.particles.vel[0].length() < 1e-2);
        assert_eq!(dem.walls.len(), 1);
    }

    #[test]
    fn head_on_collision_conserves_momentum() {
        let mut p = Particles::default();
        p.add(sphere(Vec3::new(-0.03, 0.0, 0.3), Vec3::new(0.5, 0.0, 0.0)));
        p.add(sphere(Vec3::new(0.03, 0.0, 0.3), Vec3::new(-0.5, 0.0, 0.0)));
        let mut b = bed(p);
        let mut dem = CpuDem::create(&TerrainConfig::default(), &GranularConfig::default(), ()).unwrap();
        for _ in 0..600 { dem.substep(&mut b, None, 1e-4); }
        let px = b.particles.vel[0].x + b.particles.vel[1].x;
        assert!(px.abs() < 1e-9, "net momentum {px}");
        assert!(b.particles.vel[0].x < 0.5, "first sphere should have been slowed");
        assert!(b.particles.pos[0].x < b.particles.pos[1].x);
    }
}
