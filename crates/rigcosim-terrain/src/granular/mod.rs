//! Particle-bed terrains.
//!
//! [`GranularTerrain`] owns the bed, the container and the tire proxies and
//! drives a [`GranularSolver`] through substeps no longer than the configured
//! maximum. The solver decides how contact forces are gathered: pairwise
//! sweep-and-prune DEM ([`CpuDem`]), a per-particle gather kernel on the
//! device queue ([`GpuDem`]), or weakly compressible SPH ([`SphSolver`]).

pub mod particles;
pub mod sampling;
pub mod broadphase;
pub mod grid;
pub mod container;
pub mod dem;
pub mod gpu;
pub mod sph;

use std::path::Path;

use tracing::{debug, info};

use rigcosim_comm::{MeshState, TireInfo};
use rigcosim_core::{ceil_steps, CosimError, CosimResult, Scalar, StepHasher, TerrainKind, Vec3};
use rigcosim_materials::{composite, CompositeMaterial, ContactModel};

use crate::checkpoint::{fingerprint, Checkpoint, Layout};
use crate::config::{GranularConfig, SettlingConfig, TerrainConfig};
use crate::output::{frame_path, write_vertex_forces, CsvWriter};
use crate::proxy::TireProxies;
use crate::settle::{run_settling, SettleReport, Settleable};
use crate::{RenderSnapshot, TerrainBackend};

pub use container::Container;
pub use dem::CpuDem;
pub use gpu::{GpuDem, GpuDevice};
pub use particles::{ParticleDesc, ParticleRecord, Particles};
pub use sph::SphSolver;

/// Columns of a [`ParticleRecord`].
pub const RECORD_COLUMNS: usize = 11;

/// Particle state plus everything a solver needs to evaluate bed contacts.
#[derive(Debug)]
pub struct Bed {
    pub particles: Particles,
    pub container: Container,
    pub model: ContactModel,
    /// Particle-particle and particle-wall pair material.
    pub material: CompositeMaterial,
    pub density: Scalar,
}

/// Tire proxies as seen by one substep starting `tau` seconds into the coupling step.
pub struct TireContact<'a> {
    pub proxies: &'a mut TireProxies,
    pub material: &'a CompositeMaterial,
    pub tau: Scalar,
}

/// Force evaluation and integration of one bed substep.
pub trait GranularSolver: Send + Sized {
    type Params: Send;
    const KIND: TerrainKind;
    const LAYOUT: Layout;
    const COLUMNS: usize = RECORD_COLUMNS;

    fn create(cfg: &TerrainConfig, g: &GranularConfig, params: Self::Params) -> CosimResult<Self>;

    /// Fix up freshly sampled or restored particles.
    fn prepare(&mut self, _bed: &mut Bed) {}

    /// Solver parameters that invalidate a checkpoint when changed.
    fn hash_params(&self, _h: &mut StepHasher) {}

    /// Accumulate tire reactions into `tire.proxies.forces` and integrate the bed by `h`.
    fn substep(&mut self, bed: &mut Bed, tire: Option<TireContact<'_>>, h: Scalar);

    /// Drop tangential contact history.
    fn forget_contacts(&mut self);

    fn encode(&self, bed: &Bed) -> Vec<f64> {
        let rows: Vec<ParticleRecord> = (0..bed.particles.len()).map(|i| bed.particles.record(i)).collect();
        pack(&rows, Self::LAYOUT)
    }

    fn decode(&mut self, bed: &mut Bed, c: &Checkpoint) -> CosimResult<()> {
        bed.particles = Particles::from_records((0..c.rows).map(|i| c.row::<RECORD_COLUMNS>(i)), bed.density);
        self.prepare(bed);
        Ok(())
    }
}

/// Flatten fixed-width records in the requested layout.
pub fn pack<const N: usize>(rows: &[[f64; N]], layout: Layout) -> Vec<f64> {
    match layout {
        Layout::RowMajor => rows.iter().flat_map(|r| r.iter().copied()).collect(),
        Layout::ColumnMajor => (0..N).flat_map(|c| rows.iter().map(move |r| r[c])).collect(),
    }
}

pub struct GranularTerrain<S: GranularSolver> {
    cfg: TerrainConfig,
    gcfg: GranularConfig,
    bed: Bed,
    solver: S,
    tire: Option<(TireProxies, CompositeMaterial)>,
    time: Scalar,
    surface: Scalar,
    settled: bool,
    fingerprint: u64,
}

impl<S: GranularSolver> GranularTerrain<S> {
    pub fn new(cfg: TerrainConfig, gcfg: GranularConfig, params: S::Params) -> CosimResult<Self> {
        cfg.validate()?;
        gcfg.validate(&cfg)?;
        let container = Container {
            half_length: cfg.half_length(),
            half_width: cfg.half_width(),
            wall_thickness: gcfg.wall_thickness,
            wall_height: 2.0 * gcfg.initial_depth,
        };
        let centers = sampling::sample_centers(
            gcfg.sampling,
            &container.fill_region(gcfg.initial_depth, gcfg.radius),
            gcfg.radius,
            gcfg.volume_fraction,
            gcfg.randomize,
            gcfg.seed,
        );
        let mut particles = Particles::with_capacity(centers.len());
        for pos in centers {
            particles.add(ParticleDesc {
                pos, vel: Vec3::ZERO, omega: Vec3::ZERO,
                radius: gcfg.radius, density: gcfg.density, tag: 0,
            });
        }
        let mut solver = S::create(&cfg, &gcfg, params)?;
        let mut bed = Bed {
            particles,
            container,
            model: cfg.model,
            material: composite(&cfg.material, &cfg.material),
            density: gcfg.density,
        };
        solver.prepare(&mut bed);
        let fingerprint = fingerprint(S::KIND, &cfg, |h| {
            h.update_f64(gcfg.radius);
            h.update_f64(gcfg.density);
            h.update_f64(gcfg.wall_thickness);
            solver.hash_params(h);
        });
        info!(terrain = %S::KIND, particles = bed.particles.len(), "granular bed sampled");
        Ok(Self {
            surface: bed.particles.top_height(0.0),
            cfg, gcfg, bed, solver,
            tire: None,
            time: 0.0,
            settled: false,
            fingerprint,
        })
    }

    pub fn particles(&self) -> &Particles { &self.bed.particles }
    pub fn fingerprint(&self) -> u64 { self.fingerprint }
    pub fn granular_config(&self) -> &GranularConfig { &self.gcfg }

    fn write_particles(&self, path: &Path) -> CosimResult<()> {
        let p = &self.bed.particles;
        let mut w = CsvWriter::create(path, "x,y,z,vx,vy,vz,r")?;
        for i in 0..p.len() {
            let (x, v) = (p.pos[i], p.vel[i]);
            w.row(&[x.x, x.y, x.z, v.x, v.y, v.z, p.radius[i]])?;
        }
        w.finish()
    }

    fn tire_mut(&mut self) -> CosimResult<&mut (TireProxies, CompositeMaterial)> {
        self.tire.as_mut().ok_or_else(|| CosimError::protocol(format!("{} terrain has no tire attached", S::KIND)))
    }
}

impl<S: GranularSolver> Settleable for GranularTerrain<S> {
    fn settling(&self) -> SettlingConfig { self.gcfg.settling }

    fn settle_step(&mut self, h: Scalar) {
        self.solver.substep(&mut self.bed, None, h);
    }

    fn kinetic_energy(&self) -> Scalar { self.bed.particles.kinetic_energy() }

    fn write_settling_frame(&self, frame: u64, dir: &Path) -> CosimResult<()> {
        self.write_particles(&frame_path(dir, "settling", frame))
    }

    fn finish_settling(&mut self) -> Scalar {
        self.solver.forget_contacts();
        self.time = 0.0;
        self.surface = self.bed.particles.top_height(0.0);
        self.settled = true;
        self.surface
    }
}

impl<S: GranularSolver> TerrainBackend for GranularTerrain<S> {
    fn kind(&self) -> TerrainKind { S::KIND }
    fn config(&self) -> &TerrainConfig { &self.cfg }
    fn surface_height(&self) -> Scalar { self.surface }

    fn initialize(&mut self, tire: &TireInfo) -> CosimResult<()> {
        let mat = composite(&tire.material, &self.cfg.material);
        self.tire = Some((TireProxies::new(tire, &self.cfg.proxy), mat));
        Ok(())
    }

    fn update_tire_state(&mut self, state: &MeshState) -> CosimResult<()> {
        self.tire_mut()?.0.update(state)
    }

    fn contact_forces(&self) -> &[Vec3] {
        self.tire.as_ref().map_or(&[], |(p, _)| p.forces.as_slice())
    }

    fn advance(&mut self, dt: Scalar) -> CosimResult<()> {
        let n = ceil_steps(dt / self.gcfg.max_step).max(1) as usize;
        let h = dt / n as Scalar;
        let (proxies, mat) = self.tire.as_mut()
            .ok_or_else(|| CosimError::protocol(format!("{} terrain has no tire attached", S::KIND)))?;
        proxies.clear_forces();
        for k in 0..n {
            let contact = TireContact { proxies: &mut *proxies, material: &*mat, tau: k as Scalar * h };
            self.solver.substep(&mut self.bed, Some(contact), h);
        }
        // reaction averaged over the substeps
        proxies.scale_forces(1.0 / n as Scalar);
        debug!(terrain = %S::KIND, substeps = n, contacts = proxies.num_loaded(), fz = proxies.total_force().z, "granular advance");
        self.time += dt;
        Ok(())
    }

    fn time(&self) -> Scalar { self.time }

    fn output(&self, frame: u64, dir: &Path) -> CosimResult<()> {
        self.write_particles(&frame_path(dir, "particles", frame))?;
        match &self.tire {
            Some((p, _)) => write_vertex_forces(dir, frame, &p.state.vpos, &p.forces),
            None => Ok(()),
        }
    }

    fn write_checkpoint(&self, path: &Path) -> CosimResult<()> {
        let data = self.solver.encode(&self.bed);
        Checkpoint::new(S::KIND, S::LAYOUT, self.fingerprint, self.time, S::COLUMNS, data)?.write(path)?;
        info!(terrain = %S::KIND, path = %path.display(), particles = self.bed.particles.len(), "checkpoint written");
        Ok(())
    }

    fn read_checkpoint(&mut self, path: &Path) -> CosimResult<()> {
        let c = Checkpoint::read(path)?;
        c.expect(S::KIND, self.fingerprint, S::LAYOUT, S::COLUMNS)?;
        self.solver.decode(&mut self.bed, &c)?;
        self.solver.forget_contacts();
        self.time = c.time;
        self.surface = self.bed.particles.top_height(0.0);
        self.settled = true;
        info!(terrain = %S::KIND, path = %path.display(), particles = self.bed.particles.len(), "checkpoint restored");
        Ok(())
    }

    fn needs_settling(&self) -> bool { !self.settled }

    fn settle(&mut self, out_dir: &Path) -> CosimResult<SettleReport> {
        run_settling(self, out_dir)
    }

    fn render_snapshot(&self) -> RenderSnapshot {
        let p = &self.bed.particles;
        let (contacts, f) = self.tire.as_ref()
            .map_or((0, Vec3::ZERO), |(t, _)| (t.num_loaded(), t.total_force()));
        RenderSnapshot {
            terrain: S::KIND.name(),
            time: self.time,
            surface_height: self.surface,
            bodies: (0..p.len()).map(|i| [p.pos[i].x, p.pos[i].y, p.pos[i].z, p.radius[i]]).collect(),
            contacts,
            contact_force: f.to_array(),
        }
    }
}
