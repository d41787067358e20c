use rayon::prelude::*;
use rigcosim_core::{Scalar, Vec3, GRAVITY};

/// Input descriptor when adding a particle.
#[derive(Copy, Clone, Debug)]
pub struct ParticleDesc {
    pub pos: Vec3,
    pub vel: Vec3,
    pub omega: Vec3,
    pub radius: Scalar,
    pub density: Scalar,
    pub tag: u32,
}

/// Checkpoint record: position, velocity, angular velocity, radius, material tag.
pub type ParticleRecord = [f64; 11];

/// SoA sphere storage with deterministic id = index semantics.
#[derive(Clone, Debug, Default)]
pub struct Particles {
    pub pos: Vec<Vec3>,
    pub vel: Vec<Vec3>,
    pub omega: Vec<Vec3>,
    pub radius: Vec<Scalar>,
    pub inv_mass: Vec<Scalar>,
    pub inv_inertia: Vec<Scalar>,
    pub tag: Vec<u32>,
}

impl Particles {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            pos:         Vec::with_capacity(cap),
            vel:         Vec::with_capacity(cap),
            omega:       Vec::with_capacity(cap),
            radius:      Vec::with_capacity(cap),
            inv_mass:    Vec::with_capacity(cap),
            inv_inertia: Vec::with_capacity(cap),
            tag:         Vec::with_capacity(cap),
        }
    }

    pub fn add(&mut self, d: ParticleDesc) -> u32 {
        let mass = d.density * 4.0 / 3.0 * core::f64::consts::PI * d.radius.powi(3);
        let inertia = 0.4 * mass * d.radius * d.radius;
        self.pos.push(d.pos);
        self.vel.push(d.vel);
        self.omega.push(d.omega);
        self.radius.push(d.radius);
        self.inv_mass.push(if mass > 0.0 { 1.0 / mass } else { 0.0 });
        self.inv_inertia.push(if inertia > 0.0 { 1.0 / inertia } else { 0.0 });
        self.tag.push(d.tag);
        (self.pos.len() as u32) - 1
    }

    #[inline] pub fn len(&self) -> usize { self.pos.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.pos.is_empty() }
    #[inline] pub fn mass(&self, i: usize) -> Scalar {
        let im = self.inv_mass[i];
        if im > 0.0 { 1.0 / im } else { 0.0 }
    }

    pub fn clear(&mut self) { *self = Self::default(); }

    /// Semi-implicit Euler under gravity. Runs on the caller's rayon pool.
    pub fn integrate(&mut self, forces: &[Vec3], torques: &[Vec3], dt: Scalar) {
        self.vel.par_iter_mut()
            .zip(self.pos.par_iter_mut())
            .zip(self.inv_mass.par_iter())
            .zip(forces.par_iter())
            .for_each(|(((v, x), &im), f)| {
                if im == 0.0 { return; }
                *v += (*f * im + GRAVITY) * dt;
                *x += *v * dt;
            });
        self.omega.par_iter_mut()
            .zip(self.inv_inertia.par_iter())
            .zip(torques.par_iter())
            .for_each(|((w, &ii), t)| *w += *t * ii * dt);
    }

    pub fn kinetic_energy(&self) -> Scalar {
        (0..self.len())
            .map(|i| {
                let m = self.mass(i);
                let ii = self.inv_inertia[i];
                let rot = if ii > 0.0 { self.omega[i].length_squared() / ii } else { 0.0 };
                0.5 * (m * self.vel[i].length_squared() + rot)
            })
            .sum()
    }

    /// Highest particle top, or `floor` for an empty bed.
    pub fn top_height(&self, floor: Scalar) -> Scalar {
        self.pos.iter().zip(&self.radius).map(|(p, r)| p.z + r).fold(floor, Scalar::max)
    }

    pub fn record(&self, i: usize) -> ParticleRecord {
        let (p, v, w) = (self.pos[i], self.vel[i], self.omega[i]);
        [p.x, p.y, p.z, v.x, v.y, v.z, w.x, w.y, w.z, self.radius[i], self.tag[i] as f64]
    }

    pub fn from_records(records: impl IntoIterator<Item = ParticleRecord>, density: Scalar) -> Self {
        let it = records.into_iter();
        let mut out = Self::with_capacity(it.size_hint().0);
        for r in it {
            out.add(ParticleDesc {
                pos: Vec3::new(r[0], r[1], r[2]),
                vel: Vec3::new(r[3], r[4], r[5]),
                omega: Vec3::new(r[6], r[7], r[8]),
                radius: r[9],
                density,
                tag: r[10] as u32,
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_fall_and_records() {
        let mut p = Particles::default();
        let id = p.add(ParticleDesc {
            pos: Vec3::new(0.0, 0.0, 1.0), vel: Vec3::ZERO, omega: Vec3::ZERO,
            radius: 0.02, density: 2500.0, tag: 3,
        });
        assert_eq!(id, 0);
        let m = p.mass(0);
        assert!((m - 2500.0 * 4.0 / 3.0 * core::f64::consts::PI * 8e-6).abs() < 1e-12);

        p.integrate(&[Vec3::ZERO], &[Vec3::ZERO], 0.01);
        assert!((p.vel[0].z + 0.0981).abs() < 1e-12);
        assert!(p.kinetic_energy() > 0.0);

        let back = Particles::from_records([p.record(0)], 2500.0);
        assert_eq!(back.pos, p.pos);
        assert_eq!(back.vel, p.vel);
        assert_eq!(back.tag, vec![3]);
        assert_eq!(back.inv_mass, p.inv_mass);
        assert!((p.top_height(0.0) - (p.pos[0].z + 0.02)).abs() < 1e-15);
    }
}
