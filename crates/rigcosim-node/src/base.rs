use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use rigcosim_comm::{check_participants, Communicator, Message, MsgKind};
use rigcosim_core::output::CsvWriter;
use rigcosim_core::{CosimError, CosimResult, IoContext, NodeRole, Scalar};

use crate::lifecycle::NodeState;

/// Name of the per-node results table.
pub const RESULTS_FILE: &str = "results.dat";

/// Bookkeeping every node shares: transport, lifecycle, step order, timers and results file.
pub struct NodeBase {
    role: NodeRole,
    comm: Box<dyn Communicator>,
    step_size: Scalar,
    out_dir: PathBuf,
    pub verbose: bool,
    state: NodeState,
    next_step: u64,
    digest: u64,
    last_advance: Duration,
    total_advance: Duration,
    results: Option<CsvWriter>,
}

impl NodeBase {
    /// Checks the participant count and the rank/role pairing, then creates `out_dir`.
    pub fn new(role: NodeRole, comm: Box<dyn Communicator>, step_size: Scalar, out_dir: &Path) -> CosimResult<Self> {
        check_participants(comm.size())?;
        if comm.rank() != role.rank() {
            return Err(CosimError::config(format!(
                "{role} node must run on rank {}, transport assigned rank {}", role.rank(), comm.rank())));
        }
        if !(step_size > 0.0) {
            return Err(CosimError::config(format!("step size must be positive, got {step_size}")));
        }
        std::fs::create_dir_all(out_dir).io_context(|| format!("create {}", out_dir.display()))?;
        Ok(Self {
            role,
            comm,
            step_size,
            out_dir: out_dir.to_path_buf(),
            verbose: true,
            state: NodeState::Created,
            next_step: 0,
            digest: 0,
            last_advance: Duration::ZERO,
            total_advance: Duration::ZERO,
            results: None,
        })
    }

    #[inline] pub fn role(&self) -> NodeRole { self.role }
    #[inline] pub fn state(&self) -> NodeState { self.state }
    #[inline] pub fn step_size(&self) -> Scalar { self.step_size }
    #[inline] pub fn out_dir(&self) -> &Path { &self.out_dir }
    #[inline] pub fn digest(&self) -> u64 { self.digest }

    pub fn require(&self, op: &'static str, allowed: &[NodeState]) -> CosimResult<()> {
        self.state.require(op, allowed)
    }

    /// Enter `Initialized` with the agreed static-exchange digest and open the results table.
    pub fn initialized(&mut self, digest: u64, results_header: &str) -> CosimResult<()> {
        self.digest = digest;
        self.results = Some(CsvWriter::create(&self.out_dir.join(RESULTS_FILE), results_header)?);
        self.state = NodeState::Initialized;
        if self.verbose {
            info!(node = %self.role, digest = %format!("{digest:016x}"), "initialized");
        }
        Ok(())
    }

    /// Accept `step` only if it is the next one; enters `Running`.
    pub fn begin_step(&mut self, step: u64) -> CosimResult<()> {
        self.require("synchronize", &NodeState::ACTIVE)?;
        if step != self.next_step {
            return Err(CosimError::protocol(format!(
                "{} node asked to synchronize step {step}, expected step {}", self.role, self.next_step)));
        }
        self.next_step += 1;
        self.state = NodeState::Running;
        Ok(())
    }

    /// Next step index this node accepts.
    #[inline] pub fn next_step(&self) -> u64 { self.next_step }

    pub fn barrier(&mut self, step: u64) -> CosimResult<()> {
        self.require("barrier", &NodeState::ACTIVE)?;
        self.comm.barrier(step)
    }

    pub fn send_to_peer(&mut self, msg: &Message) -> CosimResult<()> {
        self.comm.send(self.role.peer().rank(), msg)
    }

    /// Next message from the peer; must be `kind`, tagged `step` when given.
    pub fn recv_from_peer(&mut self, kind: MsgKind, step: Option<u64>) -> CosimResult<Message> {
        self.comm.recv_expect(self.role.peer().rank(), kind, step)
    }

    /// Like [`NodeBase::recv_from_peer`] and additionally checks the static-exchange digest.
    pub fn recv_dynamic(&mut self, kind: MsgKind, step: u64) -> CosimResult<Message> {
        let msg = self.recv_from_peer(kind, Some(step))?;
        if msg.digest != self.digest {
            return Err(CosimError::protocol(format!(
                "{kind:?} for step {step} carries digest {:016x}, agreed {:016x}", msg.digest, self.digest)));
        }
        Ok(msg)
    }

    /// Run `f` as the local advance and record its wall-clock time.
    pub fn timed<R>(&mut self, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let out = f();
        self.last_advance = start.elapsed();
        self.total_advance += self.last_advance;
        out
    }

    /// Wall-clock seconds of the last advance.
    #[inline] pub fn sim_time(&self) -> f64 { self.last_advance.as_secs_f64() }
    /// Wall-clock seconds summed over all advances.
    #[inline] pub fn total_sim_time(&self) -> f64 { self.total_advance.as_secs_f64() }

    pub fn write_results(&mut self, row: &[f64]) -> CosimResult<()> {
        match self.results.as_mut() {
            Some(w) => w.row(row),
            None => Err(CosimError::Lifecycle { op: "output", state: self.state.name() }),
        }
    }

    pub fn abort(&mut self, reason: &str) {
        self.comm.abort(reason);
    }

    /// Flush the results table and enter `Finalized`. Repeated calls are no-ops.
    pub fn finalize(&mut self) -> CosimResult<()> {
        if self.state == NodeState::Finalized { return Ok(()); }
        self.state = NodeState::Finalized;
        if let Some(w) = self.results.take() { w.finish()?; }
        debug!(node = %self.role, total = self.total_sim_time(), "finalized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigcosim_comm::LoopbackComm;

    #[test]
    fn rejects_three_participants() {
        let dir = tempfile::tempdir().unwrap();
        let mut world = LoopbackComm::world(3);
        let comm = world.remove(0);
        let err = NodeBase::new(NodeRole::Rig, Box::new(comm), 1e-3, dir.path()).err().unwrap();
        assert!(matches!(err, CosimError::Configuration(_)), "{err}");
    }

    #[test]
    fn rejects_role_on_wrong_rank() {
        let dir = tempfile::tempdir().unwrap();
        let (rig, _terrain) = LoopbackComm::pair();
        let err = NodeBase::new(NodeRole::Terrain, Box::new(rig), 1e-3, dir.path()).err().unwrap();
        assert!(matches!(err, CosimError::Configuration(_)), "{err}");
    }

    #[test]
    fn steps_must_arrive_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (rig, _terrain) = LoopbackComm::pair();
        let mut base = NodeBase::new(NodeRole::Rig, Box::new(rig), 1e-3, dir.path()).unwrap();
        assert!(matches!(base.begin_step(0), Err(CosimError::Lifecycle { .. })));
        base.initialized(42, "time").unwrap();
        base.begin_step(0).unwrap();
        base.begin_step(1).unwrap();
        assert!(matches!(base.begin_step(1), Err(CosimError::Protocol(_))));
        assert!(matches!(base.begin_step(3), Err(CosimError::Protocol(_))));
        assert_eq!(base.state(), NodeState::Running);
        base.write_results(&[0.5]).unwrap();
        base.finalize().unwrap();
        base.finalize().unwrap();
        let text = std::fs::read_to_string(dir.path().join(RESULTS_FILE)).unwrap();
        assert_eq!(text, "time\n5.000000e-1\n");
    }
}
