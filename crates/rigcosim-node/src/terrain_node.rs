use std::path::Path;

use tracing::{debug, info, warn};

use rigcosim_comm::{Communicator, ContactLoad, MeshState, Message, MsgKind, TireInfo, TireState};
use rigcosim_core::{ceil_steps, CosimError, CosimResult, IoContext, NodeRole, Scalar, Vec3};
use rigcosim_terrain::{TerrainBackend, CHECKPOINT_SETTLED};

use crate::base::NodeBase;
use crate::lifecycle::NodeState;
use crate::node::CosimNode;

const RESULTS_HEADER: &str = "time,fx,fy,fz,contacts,advance_seconds";

/// Participant owning the terrain.
///
/// The load sent at step k is the reaction the terrain computed during its
/// advance of step k-1 (zero at k = 0), reduced about the wheel center of
/// that step.
pub struct TerrainNode {
    base: NodeBase,
    terrain: Box<dyn TerrainBackend>,
    tire: Option<TireInfo>,
    /// Tire kinematics the last advance used.
    mesh: MeshState,
    center: Vec3,
    step: u64,
    render_every: Option<u64>,
}

impl TerrainNode {
    pub fn new(
        terrain: Box<dyn TerrainBackend>,
        comm: Box<dyn Communicator>,
        step_size: Scalar,
        out_dir: &Path,
    ) -> CosimResult<Self> {
        let base = NodeBase::new(NodeRole::Terrain, comm, step_size, out_dir)?;
        let render = terrain.config().render;
        let render_every = (render.enabled && render.fps > 0.0)
            .then(|| ceil_steps(1.0 / (render.fps * step_size)).max(1));
        Ok(Self {
            base,
            terrain,
            tire: None,
            mesh: MeshState::default(),
            center: Vec3::ZERO,
            step: 0,
            render_every,
        })
    }

    pub fn set_verbose(&mut self, verbose: bool) { self.base.verbose = verbose; }
    pub fn terrain(&self) -> &dyn TerrainBackend { self.terrain.as_ref() }

    fn tire(&self) -> CosimResult<&TireInfo> {
        self.tire.as_ref().ok_or_else(|| CosimError::Lifecycle { op: "synchronize", state: self.base.state().name() })
    }

    /// Restore a checkpoint if one was requested, otherwise settle a fresh granular bed.
    fn prepare(&mut self) -> CosimResult<()> {
        if let Some(path) = self.terrain.config().checkpoint_input.clone() {
            self.terrain.read_checkpoint(&path)?;
            info!(terrain = %self.terrain.kind(), path = %path.display(), "terrain restored from checkpoint");
        } else if self.terrain.needs_settling() {
            let report = self.terrain.settle(self.base.out_dir())?;
            let path = self.base.out_dir().join(CHECKPOINT_SETTLED);
            self.terrain.write_checkpoint(&path)?;
            info!(
                terrain = %self.terrain.kind(), steps = report.steps, frames = report.frames,
                surface = report.surface_height, path = %path.display(), "settled terrain saved"
            );
        }
        Ok(())
    }

    fn write_render_snapshot(&self, frame: u64) -> CosimResult<()> {
        let dir = self.base.out_dir().join("render");
        std::fs::create_dir_all(&dir).io_context(|| format!("create {}", dir.display()))?;
        let path = dir.join(format!("snapshot_{frame:05}.json"));
        let text = serde_json::to_string(&self.terrain.render_snapshot())
            .map_err(|e| CosimError::config(format!("encode render snapshot: {e}")))?;
        std::fs::write(&path, text).io_context(|| format!("write {}", path.display()))
    }
}

impl CosimNode for TerrainNode {
    fn role(&self) -> NodeRole { NodeRole::Terrain }
    fn state(&self) -> NodeState { self.base.state() }
    fn out_dir(&self) -> &Path { self.base.out_dir() }

    fn initialize(&mut self) -> CosimResult<()> {
        self.base.require("initialize", &[NodeState::Created])?;
        self.prepare()?;

        let info = self.terrain.info();
        self.base.send_to_peer(&Message::new(MsgKind::TerrainInfo, 0, 0, info.to_packet()))?;
        let msg = self.base.recv_from_peer(MsgKind::TireInfo, None)?;
        let tire = TireInfo::from_packet(&msg.body)?;
        let digest = tire.digest();
        if msg.digest != digest {
            return Err(CosimError::protocol(format!(
                "tire description digest {:016x} does not match its content ({digest:016x})", msg.digest)));
        }
        self.terrain.initialize(&tire)?;
        if self.base.verbose {
            info!(
                terrain = %info.kind, tire = %tire.kind, radius = tire.radius,
                vertices = tire.mesh.num_vertices(), "terrain connected"
            );
        }
        self.tire = Some(tire);
        self.base.initialized(digest, RESULTS_HEADER)
    }

    fn barrier(&mut self, step: u64) -> CosimResult<()> { self.base.barrier(step) }

    fn synchronize(&mut self, step: u64, time: Scalar) -> CosimResult<()> {
        self.base.begin_step(step)?;
        let msg = self.base.recv_dynamic(MsgKind::TireState, step)?;
        let tire = self.tire()?;
        let state = TireState::from_packet(&msg.body, tire)?;
        let mesh = state.vertex_kinematics(tire);

        let load = ContactLoad::from_vertex_forces(tire.kind, self.terrain.contact_forces(), &self.mesh.vpos, self.center);
        let digest = self.base.digest();
        self.base.send_to_peer(&Message::new(MsgKind::ContactLoad, step, digest, load.to_packet()))?;

        self.terrain.update_tire_state(&mesh)?;
        self.mesh = mesh;
        self.center = state.pose.pos;
        self.step = step;
        debug!(step, time, contacts = load.num_contacts(), "terrain synchronized");
        Ok(())
    }

    fn advance(&mut self, dt: Scalar) -> CosimResult<()> {
        self.base.require("advance", &NodeState::ACTIVE)?;
        let terrain = &mut self.terrain;
        self.base.timed(|| terrain.advance(dt))?;
        if let Some(n) = self.render_every {
            if self.step % n == 0 {
                self.write_render_snapshot(self.step / n)?;
            }
        }
        Ok(())
    }

    fn output_data(&mut self, frame: u64) -> CosimResult<()> {
        self.base.require("output", &NodeState::ACTIVE)?;
        let f: Vec3 = self.terrain.contact_forces().iter().copied().sum();
        let contacts = self.terrain.contact_forces().iter().filter(|f| **f != Vec3::ZERO).count();
        let row = [self.terrain.time(), f.x, f.y, f.z, contacts as f64, self.base.sim_time()];
        self.base.write_results(&row)?;
        self.terrain.output(frame, self.base.out_dir())
    }

    fn write_checkpoint(&mut self, path: &Path) -> CosimResult<()> {
        self.base.require("write checkpoint", &NodeState::ACTIVE)?;
        self.terrain.write_checkpoint(path)
    }

    fn sim_time(&self) -> f64 { self.base.sim_time() }
    fn total_sim_time(&self) -> f64 { self.base.total_sim_time() }
    fn abort(&mut self, reason: &str) { self.base.abort(reason) }
    fn finalize(&mut self) -> CosimResult<()> { self.base.finalize() }
}

impl Drop for TerrainNode {
    fn drop(&mut self) {
        if let Err(e) = self.base.finalize() {
            warn!(error = %e, "terrain node could not flush its output");
        }
    }
}
