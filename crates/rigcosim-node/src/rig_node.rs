use std::path::Path;

use tracing::{debug, info, warn};

use rigcosim_comm::{Communicator, ContactLoad, Message, MsgKind, TerrainInfo, TireState};
use rigcosim_core::{CosimResult, NodeRole, Scalar};
use rigcosim_rig::{RigBackend, REPORT_HEADER};

use crate::base::NodeBase;
use crate::lifecycle::NodeState;
use crate::node::CosimNode;

/// Participant owning the wheel rig.
pub struct RigNode {
    base: NodeBase,
    rig: Box<dyn RigBackend>,
    terrain: Option<TerrainInfo>,
}

impl RigNode {
    pub fn new(rig: Box<dyn RigBackend>, comm: Box<dyn Communicator>, step_size: Scalar, out_dir: &Path) -> CosimResult<Self> {
        let base = NodeBase::new(NodeRole::Rig, comm, step_size, out_dir)?;
        Ok(Self { base, rig, terrain: None })
    }

    pub fn set_verbose(&mut self, verbose: bool) { self.base.verbose = verbose; }
    pub fn rig(&self) -> &dyn RigBackend { self.rig.as_ref() }
    /// Terrain description received during initialization.
    pub fn terrain(&self) -> Option<&TerrainInfo> { self.terrain.as_ref() }
}

impl CosimNode for RigNode {
    fn role(&self) -> NodeRole { NodeRole::Rig }
    fn state(&self) -> NodeState { self.base.state() }
    fn out_dir(&self) -> &Path { self.base.out_dir() }

    fn initialize(&mut self) -> CosimResult<()> {
        self.base.require("initialize", &[NodeState::Created])?;
        let msg = self.base.recv_from_peer(MsgKind::TerrainInfo, None)?;
        let terrain = TerrainInfo::from_packet(&msg.body)?;
        self.rig.initialize(&terrain)?;

        let tire = self.rig.tire_info();
        let digest = tire.digest();
        self.base.send_to_peer(&Message::new(MsgKind::TireInfo, 0, digest, tire.to_packet()))?;
        if self.base.verbose {
            info!(
                terrain = %terrain.kind, height = terrain.init_height,
                length = terrain.patch_length, width = terrain.patch_width,
                tire = %self.rig.kind(), vertices = tire.mesh.num_vertices(), "rig connected"
            );
        }
        self.terrain = Some(terrain);
        self.base.initialized(digest, REPORT_HEADER)
    }

    fn barrier(&mut self, step: u64) -> CosimResult<()> { self.base.barrier(step) }

    fn synchronize(&mut self, step: u64, time: Scalar) -> CosimResult<()> {
        self.base.begin_step(step)?;
        let state: TireState = self.rig.tire_state()?;
        let digest = self.base.digest();
        self.base.send_to_peer(&Message::new(MsgKind::TireState, step, digest, state.to_packet()))?;
        let reply = self.base.recv_dynamic(MsgKind::ContactLoad, step)?;
        let load = ContactLoad::from_packet(&reply.body, self.rig.tire_info())?;
        debug!(step, time, fz = load.total_force().z, contacts = load.num_contacts(), "rig synchronized");
        self.rig.apply_contact(&load)
    }

    fn advance(&mut self, dt: Scalar) -> CosimResult<()> {
        self.base.require("advance", &NodeState::ACTIVE)?;
        let rig = &mut self.rig;
        self.base.timed(|| rig.advance(dt))
    }

    fn output_data(&mut self, frame: u64) -> CosimResult<()> {
        self.base.require("output", &NodeState::ACTIVE)?;
        self.base.write_results(&self.rig.report().row())?;
        self.rig.output(frame, self.base.out_dir())
    }

    fn write_checkpoint(&mut self, path: &Path) -> CosimResult<()> {
        self.base.require("write checkpoint", &NodeState::ACTIVE)?;
        self.rig.write_checkpoint(path)
    }

    fn sim_time(&self) -> f64 { self.base.sim_time() }
    fn total_sim_time(&self) -> f64 { self.base.total_sim_time() }
    fn abort(&mut self, reason: &str) { self.base.abort(reason) }
    fn finalize(&mut self) -> CosimResult<()> { self.base.finalize() }
}

impl Drop for RigNode {
    fn drop(&mut self) {
        if let Err(e) = self.base.finalize() {
            warn!(error = %e, "rig node could not flush its output");
        }
    }
}

