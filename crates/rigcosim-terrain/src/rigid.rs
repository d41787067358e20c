use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use rigcosim_comm::{MeshState, TireInfo};
use rigcosim_core::{CosimError, CosimResult, Scalar, TerrainKind, Vec3};
use rigcosim_materials::{composite, contact_force, CompositeMaterial, ContactGeometry};

use crate::checkpoint::{fingerprint, Checkpoint, Layout};
use crate::config::TerrainConfig;
use crate::output::write_vertex_forces;
use crate::proxy::TireProxies;
use crate::{RenderSnapshot, TerrainBackend};

/// Flat rigid patch with its top surface at z = 0.
pub struct RigidTerrain {
    cfg: TerrainConfig,
    tire: Option<(TireProxies, CompositeMaterial)>,
    history: BTreeMap<u32, Vec3>,
    time: Scalar,
    fingerprint: u64,
}

impl RigidTerrain {
    pub fn new(cfg: TerrainConfig) -> CosimResult<Self> {
        cfg.validate()?;
        if cfg.proxy.contact_radius <= 0.0 {
            return Err(CosimError::config("rigid terrain needs a positive proxy contact radius"));
        }
        let fingerprint = fingerprint(TerrainKind::Rigid, &cfg, |_| {});
        Ok(Self { cfg, tire: None, history: BTreeMap::new(), time: 0.0, fingerprint })
    }

    /// Whether world point `p` lies over the patch.
    #[inline]
    pub fn covers(&self, p: Vec3) -> bool {
        p.x.abs() <= self.cfg.half_length() && p.y.abs() <= self.cfg.half_width()
    }

    fn tire_mut(&mut self) -> CosimResult<&mut (TireProxies, CompositeMaterial)> {
        self.tire.as_mut().ok_or_else(|| CosimError::protocol("rigid terrain has no tire attached"))
    }
}

impl TerrainBackend for RigidTerrain {
    fn kind(&self) -> TerrainKind { TerrainKind::Rigid }
    fn config(&self) -> &TerrainConfig { &self.cfg }
    fn surface_height(&self) -> Scalar { 0.0 }

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
        let model = self.cfg.model;
        let half = (self.cfg.half_length(), self.cfg.half_width());
        let mut history = std::mem::take(&mut self.history);
        let (proxies, mat) = self.tire_mut()?;
        proxies.clear_forces();
        let (r, m) = (proxies.radius(), proxies.vertex_mass());

        let mut touched = Vec::new();
        for i in 0..proxies.len() {
            // evaluated at mid-step; a fixed proxy ignores the offset
            let p = proxies.position(i, 0.5 * dt);
            if p.x.abs() > half.0 || p.y.abs() > half.1 { continue; }
            let overlap = r - p.z;
            if overlap <= 0.0 { continue; }
            let geom = ContactGeometry {
                normal: Vec3::Z,
                overlap,
                eff_radius: r,
                eff_mass: m,
                rel_vel: proxies.velocity(i),
            };
            let h = history.entry(i as u32).or_insert(Vec3::ZERO);
            proxies.forces[i] = contact_force(&model, mat, &geom, Some(h), dt);
            touched.push(i as u32);
        }
        history.retain(|k, _| touched.binary_search(k).is_ok());
        debug!(contacts = touched.len(), fz = proxies.total_force().z, "rigid terrain advance");

        self.history = history;
        self.time += dt;
        Ok(())
    }

    fn time(&self) -> Scalar { self.time }

    fn output(&self, frame: u64, dir: &Path) -> CosimResult<()> {
        match &self.tire {
            Some((p, _)) => write_vertex_forces(dir, frame, &p.state.vpos, &p.forces),
            None => Ok(()),
        }
    }

    fn write_checkpoint(&self, path: &Path) -> CosimResult<()> {
        Checkpoint::new(TerrainKind::Rigid, Layout::RowMajor, self.fingerprint, self.time, 0, Vec::new())?.write(path)
    }

    fn read_checkpoint(&mut self, path: &Path) -> CosimResult<()> {
        let c = Checkpoint::read(path)?;
        c.expect(TerrainKind::Rigid, self.fingerprint, Layout::RowMajor, 0)?;
        self.time = c.time;
        self.history.clear();
        Ok(())
    }

    fn render_snapshot(&self) -> RenderSnapshot {
        let (contacts, f) = self.tire.as_ref()
            .map_or((0, Vec3::ZERO), |(p, _)| (p.num_loaded(), p.total_force()));
        RenderSnapshot {
            terrain: TerrainKind::Rigid.name(),
            time: self.time,
            surface_height: 0.0,
            bodies: Vec::new(),
            contacts,
            contact_force: f.to_array(),
        }
    }
}
