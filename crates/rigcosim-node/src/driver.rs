use std::time::Instant;

use tracing::{debug, info};

use rigcosim_core::{ceil_steps, CosimError, CosimResult, Scalar};

use crate::node::CosimNode;

/// File the driver writes after the last step.
pub const CHECKPOINT_END: &str = "checkpoint_end.dat";

/// Fixed-step run parameters.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DriverConfig {
    pub sim_time: Scalar,
    pub step_size: Scalar,
    /// Write output frames at `output_fps`.
    pub output: bool,
    pub output_fps: Scalar,
}

impl Default for DriverConfig {
    fn default() -> Self { Self { sim_time: 2.0, step_size: 1e-4, output: true, output_fps: 100.0 } }
}

impl DriverConfig {
    pub fn validate(&self) -> CosimResult<()> {
        if !(self.step_size > 0.0) {
            return Err(CosimError::config(format!("step size must be positive, got {}", self.step_size)));
        }
        if !(self.sim_time >= 0.0) {
            return Err(CosimError::config(format!("simulation time cannot be negative, got {}", self.sim_time)));
        }
        if self.output && !(self.output_fps > 0.0) {
            return Err(CosimError::config("output frequency must be positive"));
        }
        Ok(())
    }

    /// `ceil(sim_time / step_size)`
    pub fn sim_steps(&self) -> u64 { ceil_steps(self.sim_time / self.step_size) }

    /// `ceil(1 / (output_fps * step_size))`, at least 1.
    pub fn output_steps(&self) -> u64 { ceil_steps(1.0 / (self.output_fps * self.step_size)).max(1) }
}

/// What a finished run did.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub steps: u64,
    pub frames: u64,
}

/// Initialize `node`, run the coupled loop and write the final checkpoint.
///
/// Any failure is reported to the peer before it is returned, unless the
/// failure is the peer's own abort.
pub fn run_cosim(node: &mut dyn CosimNode, cfg: &DriverConfig) -> CosimResult<RunSummary> {
    match drive(node, cfg) {
        Ok(summary) => Ok(summary),
        Err(e) => {
            if !e.is_peer_abort() {
                node.abort(&e.to_string());
            }
            Err(e)
        }
    }
}

fn drive(node: &mut dyn CosimNode, cfg: &DriverConfig) -> CosimResult<RunSummary> {
    cfg.validate()?;
    node.initialize()?;

    let sim_steps = cfg.sim_steps();
    let output_steps = cfg.output_steps();
    let role = node.role();
    info!(node = %role, sim_steps, output_steps, step_size = cfg.step_size, "starting co-simulation");

    let start = Instant::now();
    let mut frames = 0;
    for step in 0..sim_steps {
        let time = step as Scalar * cfg.step_size;
        node.barrier(step)?;
        node.synchronize(step, time)?;
        node.advance(cfg.step_size)?;
        debug!(node = %role, step, time, advance = node.sim_time(), total = node.total_sim_time(), "step");
        if cfg.output && step % output_steps == 0 {
            node.output_data(frames)?;
            frames += 1;
        }
    }

    let path = node.out_dir().join(CHECKPOINT_END);
    node.write_checkpoint(&path)?;
    node.finalize()?;
    info!(
        node = %role, steps = sim_steps, frames, wall = start.elapsed().as_secs_f64(),
        advance_total = node.total_sim_time(), "co-simulation finished"
    );
    Ok(RunSummary { steps: sim_steps, frames })
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use rigcosim_core::NodeRole;

    use super::*;
    use crate::lifecycle::NodeState;

    #[derive(Debug, PartialEq)]
    enum Call { Init, Barrier(u64), Sync(u64), Advance, Output(u64), Checkpoint(PathBuf), Abort, Finalize }

    struct Recorder {
        calls: Vec<Call>,
        fail_at: Option<u64>,
        dir: PathBuf,
    }

    impl Recorder {
        fn new(fail_at: Option<u64>) -> Self { Self { calls: Vec::new(), fail_at, dir: PathBuf::from("out") } }
    }

    impl CosimNode for Recorder {
        fn role(&self) -> NodeRole { NodeRole::Rig }
        fn state(&self) -> NodeState { NodeState::Running }
        fn out_dir(&self) -> &Path { &self.dir }
        fn initialize(&mut self) -> CosimResult<()> { self.calls.push(Call::Init); Ok(()) }
        fn barrier(&mut self, step: u64) -> CosimResult<()> { self.calls.push(Call::Barrier(step)); Ok(()) }
        fn synchronize(&mut self, step: u64, _time: Scalar) -> CosimResult<()> {
            self.calls.push(Call::Sync(step));
            if self.fail_at == Some(step) { return Err(CosimError::protocol("injected")); }
            Ok(())
        }
        fn advance(&mut self, _dt: Scalar) -> CosimResult<()> { self.calls.push(Call::Advance); Ok(()) }
        fn output_data(&mut self, frame: u64) -> CosimResult<()> { self.calls.push(Call::Output(frame)); Ok(()) }
        fn write_checkpoint(&mut self, path: &Path) -> CosimResult<()> {
            self.calls.push(Call::Checkpoint(path.to_path_buf()));
            Ok(())
        }
        fn sim_time(&self) -> f64 { 0.0 }
        fn total_sim_time(&self) -> f64 { 0.0 }
        fn abort(&mut self, _reason: &str) { self.calls.push(Call::Abort); }
        fn finalize(&mut self) -> CosimResult<()> { self.calls.push(Call::Finalize); Ok(()) }
    }

    #[test]
    fn step_counts() {
        let cfg = DriverConfig { sim_time: 0.01, step_size: 1e-4, output: true, output_fps: 100.0 };
        assert_eq!(cfg.sim_steps(), 100);
        assert_eq!(cfg.output_steps(), 100);
        let cfg = DriverConfig { sim_time: 0.0105, ..cfg };
        assert_eq!(cfg.sim_steps(), 105);
        let cfg = DriverConfig { sim_time: 0.01 + 5e-14, ..cfg };
        assert_eq!(cfg.sim_steps(), 101);
        let cfg = DriverConfig { output_fps: 1e6, ..cfg };
        assert_eq!(cfg.output_steps(), 1);
        let bad = DriverConfig { step_size: 0.0, ..cfg };
        assert!(matches!(bad.validate(), Err(CosimError::Configuration(_))));
    }

    #[test]
    fn loop_order_and_frames() {
        let mut node = Recorder::new(None);
        let cfg = DriverConfig { sim_time: 0.007, step_size: 1e-3, output: true, output_fps: 333.0 };
        let summary = run_cosim(&mut node, &cfg).unwrap();
        // output every ceil(1000/333) = 4 steps: frames at steps 0 and 4
        assert_eq!(summary, RunSummary { steps: 7, frames: 2 });

        let mut expect = vec![Call::Init];
        for step in 0..7 {
            expect.push(Call::Barrier(step));
            expect.push(Call::Sync(step));
            expect.push(Call::Advance);
            if step % 4 == 0 { expect.push(Call::Output(step / 4)); }
        }
        expect.push(Call::Checkpoint(Path::new("out").join(CHECKPOINT_END)));
        expect.push(Call::Finalize);
        assert_eq!(node.calls, expect);
    }

    #[test]
    fn disabled_output_writes_no_frames() {
        let mut node = Recorder::new(None);
        let cfg = DriverConfig { sim_time: 0.01, step_size: 1e-4, output: false, output_fps: 100.0 };
        assert_eq!(run_cosim(&mut node, &cfg).unwrap(), RunSummary { steps: 100, frames: 0 });
        assert!(!node.calls.iter().any(|c| matches!(c, Call::Output(_))));
    }

    #[test]
    fn failure_aborts_the_peer_without_advancing() {
        let mut node = Recorder::new(Some(2));
        let cfg = DriverConfig { sim_time: 0.01, step_size: 1e-3, output: false, output_fps: 1.0 };
        let err = run_cosim(&mut node, &cfg).unwrap_err();
        assert!(matches!(err, CosimError::Protocol(_)));
        assert_eq!(node.calls.iter().filter(|c| **c == Call::Advance).count(), 2);
        assert_eq!(node.calls.last(), Some(&Call::Abort));
        assert!(!node.calls.iter().any(|c| matches!(c, Call::Checkpoint(_))));
    }
}
