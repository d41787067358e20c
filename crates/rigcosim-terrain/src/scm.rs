//! Soil contact model: a height grid that yields plastically under the tire.
//!
//! Each grid node carries the current surface height (zero until the soil is
//! first compacted) and the shear displacement accumulated while a vertex
//! slides over it. Normal pressure is elastic up to the Bekker bearing
//! capacity of the total sinkage; beyond it the node flows plastically.
//! Shear follows Mohr-Coulomb with Janosi-Hanamoto mobilization.

use std::collections::BTreeMap;
use std::path::Path;

use glam::{DVec2, UVec2};
use tracing::debug;

use rigcosim_comm::{MeshState, TireInfo};
use rigcosim_core::{CosimError, CosimResult, Scalar, StepHasher, TerrainKind, Vec3};

use crate::checkpoint::{fingerprint, Checkpoint, Layout};
use crate::config::{ScmParams, TerrainConfig};
use crate::heightfield::HeightField;
use crate::output::{frame_path, write_vertex_forces, CsvWriter};
use crate::proxy::TireProxies;
use crate::{RenderSnapshot, TerrainBackend};

const MIN_SLIP_SPEED: Scalar = 1e-9;

pub struct ScmTerrain {
    cfg: TerrainConfig,
    params: ScmParams,
    hf: HeightField,
    shear: Vec<Scalar>,
    proxies: Option<TireProxies>,
    time: Scalar,
    fingerprint: u64,
}

fn hash_params(p: &ScmParams, h: &mut StepHasher) {
    for v in [p.grid_spacing, p.kphi, p.kc, p.n, p.cohesion, p.friction_deg, p.janosi, p.elastic_k, p.damping] {
        h.update_f64(v);
    }
}

impl ScmTerrain {
    pub fn new(cfg: TerrainConfig, params: ScmParams) -> CosimResult<Self> {
        cfg.validate()?;
        params.validate()?;
        let nx = ((cfg.patch_length / params.grid_spacing).round() as u32).max(1) + 1;
        let ny = ((cfg.patch_width / params.grid_spacing).round() as u32).max(1) + 1;
        let cell = DVec2::new(cfg.patch_length / (nx - 1) as Scalar, cfg.patch_width / (ny - 1) as Scalar);
        let hf = HeightField::flat(UVec2::new(nx, ny), cell, DVec2::new(-cfg.half_length(), -cfg.half_width()), 0.0);
        let fingerprint = fingerprint(TerrainKind::Scm, &cfg, |h| hash_params(&params, h));
        debug!(nx, ny, "SCM grid");
        Ok(Self { shear: vec![0.0; hf.len()], hf, cfg, params, proxies: None, time: 0.0, fingerprint })
    }

    pub fn heightfield(&self) -> &HeightField { &self.hf }
    pub fn shear(&self) -> &[Scalar] { &self.shear }

    /// Deepest plastic sinkage on the grid.
    pub fn max_sinkage(&self) -> Scalar { -self.hf.range().0 }
}

impl TerrainBackend for ScmTerrain {
    fn kind(&self) -> TerrainKind { TerrainKind::Scm }
    fn config(&self) -> &TerrainConfig { &self.cfg }
    fn surface_height(&self) -> Scalar { 0.0 }

    fn initialize(&mut self, tire: &TireInfo) -> CosimResult<()> {
        self.proxies = Some(TireProxies::new(tire, &self.cfg.proxy));
        Ok(())
    }

    fn update_tire_state(&mut self, state: &MeshState) -> CosimResult<()> {
        self.proxies.as_mut()
            .ok_or_else(|| CosimError::protocol("SCM terrain has no tire attached"))?
            .update(state)
    }

    fn contact_forces(&self) -> &[Vec3] {
        self.proxies.as_ref().map_or(&[], |p| p.forces.as_slice())
    }

    fn advance(&mut self, dt: Scalar) -> CosimResult<()> {
        let proxies = self.proxies.as_mut()
            .ok_or_else(|| CosimError::protocol("SCM terrain has no tire attached"))?;
        proxies.clear_forces();
        let p = &self.params;
        let b = proxies.tire.width;
        let tan_phi = p.friction_deg.to_radians().tan();
        let r = proxies.radius();

        // node -> fastest slip seen this step
        let mut slip: BTreeMap<usize, Scalar> = BTreeMap::new();
        for i in 0..proxies.len() {
            let x = proxies.position(i, 0.5 * dt);
            let Some(node) = self.hf.nearest(x.x, x.y) else { continue };
            let bottom = x.z - r;
            let surface = self.hf.heights[node];
            let depth = surface - bottom;
            if depth <= 0.0 { continue; }

            let sinkage = (-bottom).max(0.0);
            let bearing = (p.kc / b + p.kphi) * sinkage.powf(p.n);
            let mut sigma = p.elastic_k * depth;
            if sigma > bearing {
                sigma = bearing;
                self.hf.heights[node] = (bottom + bearing / p.elastic_k).min(surface);
            }
            let v = proxies.velocity(i);
            sigma = (sigma - p.damping * v.z).max(0.0);

            let n = self.hf.sample_normal(x.x, x.y);
            let v_t = v - n * v.dot(n);
            let speed = v_t.length();
            let area = proxies.areas[i];
            let mut f = n * (sigma * area);
            if speed > MIN_SLIP_SPEED {
                let tau_max = p.cohesion + sigma * tan_phi;
                let tau = tau_max * (1.0 - (-self.shear[node] / p.janosi).exp());
                f -= v_t / speed * (tau * area);
            }
            proxies.forces[i] = f;
            slip.entry(node).and_modify(|s| *s = s.max(speed)).or_insert(speed);
        }

        for (node, j) in self.shear.iter_mut().enumerate() {
            match slip.get(&node) {
                Some(rate) => *j += rate * dt,
                None => *j = 0.0,
            }
        }
        debug!(contacts = slip.len(), fz = proxies.total_force().z, "SCM advance");
        self.time += dt;
        Ok(())
    }

    fn time(&self) -> Scalar { self.time }

    fn output(&self, frame: u64, dir: &Path) -> CosimResult<()> {
        let mut w = CsvWriter::create(&frame_path(dir, "heights", frame), "x,y,height,shear")?;
        for (i, (&h, &j)) in self.hf.heights.iter().zip(&self.shear).enumerate() {
            if h == 0.0 && j == 0.0 { continue; }
            let xy = self.hf.node_xy(i);
            w.row(&[xy.x, xy.y, h, j])?;
        }
        w.finish()?;
        match &self.proxies {
            Some(p) => write_vertex_forces(dir, frame, &p.state.vpos, &p.forces),
            None => Ok(()),
        }
    }

    fn write_checkpoint(&self, path: &Path) -> CosimResult<()> {
        let rows: Vec<[f64; 2]> = self.hf.heights.iter().zip(&self.shear).map(|(&h, &j)| [h, j]).collect();
        Checkpoint::from_rows(TerrainKind::Scm, self.fingerprint, self.time, &rows)?.write(path)
    }

    fn read_checkpoint(&mut self, path: &Path) -> CosimResult<()> {
        let c = Checkpoint::read(path)?;
        c.expect(TerrainKind::Scm, self.fingerprint, Layout::RowMajor, 2)?;
        if c.rows != self.hf.len() {
            return Err(CosimError::checkpoint(format!(
                "checkpoint holds {} grid nodes, this grid has {}", c.rows, self.hf.len())));
        }
        for i in 0..c.rows {
            let [h, j] = c.row::<2>(i);
            self.hf.heights[i] = h;
            self.shear[i] = j;
        }
        self.time = c.time;
        Ok(())
    }

    fn render_snapshot(&self) -> RenderSnapshot {
        let (contacts, f) = self.proxies.as_ref()
            .map_or((0, Vec3::ZERO), |p| (p.num_loaded(), p.total_force()));
        RenderSnapshot {
            terrain: TerrainKind::Scm.name(),
            time: self.time,
            surface_height: 0.0,
            bodies: Vec::new(),
            contacts,
            contact_force: f.to_array(),
        }
    }
}
