//! Terrain side of the wheel-rig co-simulation.
//!
//! Every variant hides its physics behind [`TerrainBackend`]: the terrain node
//! feeds it tire vertex kinematics once per coupling step, advances it, and
//! reads back the per-vertex reaction forces computed during that advance.
//! Granular variants additionally settle their particle bed before coupling
//! and persist it through [`checkpoint`].

pub mod config;
pub mod proxy;
pub mod heightfield;
pub mod checkpoint;
pub mod output;
pub mod rigid;
pub mod scm;
pub mod granular;
pub mod settle;

use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use rigcosim_comm::{MeshState, TerrainInfo, TireInfo};
use rigcosim_core::{Availability, CapabilityRegistry, CosimError, CosimResult, Scalar, TerrainKind, Vec3, WorkerPool};

pub use config::{
    GranularConfig, ProxyConfig, RenderConfig, SamplingMethod, ScmParams, SettlingConfig, SphParams,
    TerrainConfig, TerrainSetup,
};
pub use checkpoint::{Checkpoint, Layout, CHECKPOINT_SETTLED};
pub use granular::{CpuDem, GpuDem, GranularTerrain, SphSolver};
pub use rigid::RigidTerrain;
pub use scm::ScmTerrain;
pub use settle::SettleReport;

/// Frame handed to the runtime visualization side channel.
#[derive(Clone, Debug, Serialize)]
pub struct RenderSnapshot {
    pub terrain: &'static str,
    pub time: Scalar,
    pub surface_height: Scalar,
    /// Particle centers and radii; empty for continuum terrains.
    pub bodies: Vec<[f64; 4]>,
    pub contacts: usize,
    pub contact_force: [f64; 3],
}

/// Contract every terrain variant fulfils toward the terrain node.
pub trait TerrainBackend: Send {
    fn kind(&self) -> TerrainKind;
    fn config(&self) -> &TerrainConfig;

    /// Height of the undisturbed surface the wheel starts on.
    fn surface_height(&self) -> Scalar;

    fn info(&self) -> TerrainInfo {
        let cfg = self.config();
        TerrainInfo {
            kind: self.kind(),
            init_height: self.surface_height(),
            patch_length: cfg.patch_length,
            patch_width: cfg.patch_width,
        }
    }

    /// Accept the tire mesh and material; called once before the first step.
    fn initialize(&mut self, tire: &TireInfo) -> CosimResult<()>;

    /// Vertex kinematics for the coming advance.
    fn update_tire_state(&mut self, state: &MeshState) -> CosimResult<()>;

    /// Force on each tire vertex from the most recent advance.
    fn contact_forces(&self) -> &[Vec3];

    fn advance(&mut self, dt: Scalar) -> CosimResult<()>;
    fn time(&self) -> Scalar;

    fn output(&self, frame: u64, dir: &Path) -> CosimResult<()>;
    fn write_checkpoint(&self, path: &Path) -> CosimResult<()>;
    fn read_checkpoint(&mut self, path: &Path) -> CosimResult<()>;

    /// Whether a fresh instance must settle before coupling.
    fn needs_settling(&self) -> bool { false }

    fn settle(&mut self, _out_dir: &Path) -> CosimResult<SettleReport> {
        Err(CosimError::config(format!("the {} terrain has no settling phase", self.kind())))
    }

    fn render_snapshot(&self) -> RenderSnapshot;
}

/// Build the requested variant after checking it is available in this process.
pub fn create_terrain(
    cfg: TerrainConfig,
    setup: TerrainSetup,
    caps: &CapabilityRegistry,
) -> CosimResult<Box<dyn TerrainBackend>> {
    let kind = setup.kind();
    caps.require_terrain(kind)?;
    cfg.validate()?;
    info!(terrain = %kind, length = cfg.patch_length, width = cfg.patch_width, threads = cfg.threads, "creating terrain");
    Ok(match setup {
        TerrainSetup::Rigid => Box::new(RigidTerrain::new(cfg)?),
        TerrainSetup::Scm(p) => Box::new(ScmTerrain::new(cfg, p)?),
        TerrainSetup::GranularCpu(g) => Box::new(GranularTerrain::<CpuDem>::new(cfg, g, ())?),
        TerrainSetup::GranularGpu(g) => Box::new(GranularTerrain::<GpuDem>::new(cfg, g, ())?),
        TerrainSetup::GranularSph(g, p) => Box::new(GranularTerrain::<SphSolver>::new(cfg, g, p)?),
    })
}

/// Mark variants this process cannot run. The accelerated granular variant
/// needs its device queue; failing to create one disables it.
pub fn probe_capabilities(caps: &mut CapabilityRegistry, threads: usize) {
    if let Availability::Unavailable(_) = caps.terrain(TerrainKind::GranularGpu) {
        return;
    }
    if let Err(e) = WorkerPool::new("gpu-probe", threads) {
        warn!(error = %e, "granular device unavailable");
        caps.disable_terrain(TerrainKind::GranularGpu, e.to_string());
    }
}
