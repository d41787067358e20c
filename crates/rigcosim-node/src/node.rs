use std::path::Path;

use rigcosim_core::{CosimResult, NodeRole, Scalar};

use crate::lifecycle::NodeState;

/// Operations the driver loop runs on either participant.
pub trait CosimNode: Send {
    fn role(&self) -> NodeRole;
    fn state(&self) -> NodeState;
    fn out_dir(&self) -> &Path;

    /// Static exchange with the peer. Allowed once.
    fn initialize(&mut self) -> CosimResult<()>;

    /// Collective barrier for `step`.
    fn barrier(&mut self, step: u64) -> CosimResult<()>;

    /// Exchange the dynamic state of `step` with the peer.
    fn synchronize(&mut self, step: u64, time: Scalar) -> CosimResult<()>;

    /// Local integration over `dt`; no communication.
    fn advance(&mut self, dt: Scalar) -> CosimResult<()>;

    /// Diagnostics for output frame `frame`.
    fn output_data(&mut self, frame: u64) -> CosimResult<()>;

    fn write_checkpoint(&mut self, path: &Path) -> CosimResult<()>;

    /// Wall-clock seconds of the last advance.
    fn sim_time(&self) -> f64;
    /// Wall-clock seconds summed over all advances.
    fn total_sim_time(&self) -> f64;

    /// Tell the peer this node failed.
    fn abort(&mut self, reason: &str);

    fn finalize(&mut self) -> CosimResult<()>;
}
