use std::path::Path;

use tracing::{debug, info};

use rigcosim_core::{ceil_steps, CosimResult, IoContext, Scalar};

use crate::config::SettlingConfig;

/// Outcome of a settling run.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SettleReport {
    pub steps: u64,
    pub frames: u64,
    /// Simulated settling time actually spent.
    pub time: Scalar,
    pub kinetic_energy: Scalar,
    pub surface_height: Scalar,
    pub stopped_early: bool,
}

/// A bed that can run uncoupled dynamics toward rest.
pub trait Settleable {
    fn settling(&self) -> SettlingConfig;
    fn settle_step(&mut self, h: Scalar);
    fn kinetic_energy(&self) -> Scalar;
    fn write_settling_frame(&self, frame: u64, dir: &Path) -> CosimResult<()>;
    /// Reset the clock after settling; returns the settled surface height.
    fn finish_settling(&mut self) -> Scalar;
}

/// Run the bed for the configured settling time without any tire.
///
/// Frames go to `<out_dir>/settling/` when enabled. With a kinetic-energy
/// threshold the run stops early once the bed has been set in motion (its
/// energy exceeded the threshold) and then dropped back below it.
pub fn run_settling<S: Settleable + ?Sized>(bed: &mut S, out_dir: &Path) -> CosimResult<SettleReport> {
    let cfg = bed.settling();
    let steps = ceil_steps(cfg.time / cfg.step_size);
    let every = ceil_steps(1.0 / (cfg.fps * cfg.step_size)).max(1);
    let frames_dir = out_dir.join("settling");
    if cfg.output {
        std::fs::create_dir_all(&frames_dir).io_context(|| format!("create {}", frames_dir.display()))?;
    }
    info!(time = cfg.time, step = cfg.step_size, steps, "settling granular bed");

    let mut report = SettleReport {
        steps: 0, frames: 0, time: 0.0, kinetic_energy: 0.0, surface_height: 0.0, stopped_early: false,
    };
    let mut peak: Scalar = 0.0;
    for k in 0..steps {
        if cfg.output && k % every == 0 {
            bed.write_settling_frame(report.frames, &frames_dir)?;
            report.frames += 1;
        }
        bed.settle_step(cfg.step_size);
        report.steps += 1;

        if let Some(limit) = cfg.max_kinetic_energy {
            let ke = bed.kinetic_energy();
            peak = peak.max(ke);
            if peak > limit && ke < limit {
                debug!(step = k, ke, "bed at rest");
                report.stopped_early = true;
                break;
            }
        }
    }
    report.time = report.steps as Scalar * cfg.step_size;
    report.kinetic_energy = bed.kinetic_energy();
    report.surface_height = bed.finish_settling();
    info!(steps = report.steps, ke = report.kinetic_energy, surface = report.surface_height, "settling done");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accelerates for ten steps, then stops dead.
    struct Faller { n: u32, v: Scalar, cfg: SettlingConfig }

    impl Settleable for Faller {
        fn settling(&self) -> SettlingConfig { self.cfg }
        fn settle_step(&mut self, h: Scalar) {
            self.n += 1;
            self.v = if self.n <= 10 { 10.0 * h * self.n as Scalar } else { 0.0 };
        }
        fn kinetic_energy(&self) -> Scalar { 0.5 * self.v * self.v }
        fn write_settling_frame(&self, _: u64, _: &Path) -> CosimResult<()> { Ok(()) }
        fn finish_settling(&mut self) -> Scalar { 0.25 }
    }

    #[test]
    fn runs_full_time_and_counts_frames() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SettlingConfig { time: 0.1, step_size: 1e-3, output: true, fps: 100.0, max_kinetic_energy: None };
        let mut d = Faller { n: 0, v: 0.0, cfg };
        let r = run_settling(&mut d, dir.path()).unwrap();
        assert_eq!(r.steps, 100);
        assert_eq!(r.frames, 10);
        assert!(!r.stopped_early);
        assert_eq!(r.surface_height, 0.25);
        assert!(dir.path().join("settling").is_dir());
    }

    #[test]
    fn energy_threshold_stops_after_motion() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SettlingConfig { time: 1.0, step_size: 1e-2, output: false, fps: 100.0, max_kinetic_energy: Some(0.1) };
        let mut d = Faller { n: 0, v: 0.0, cfg };
        let r = run_settling(&mut d, dir.path()).unwrap();
        assert!(r.stopped_early);
        assert_eq!(r.steps, 11);
        assert_eq!(r.kinetic_energy, 0.0);
        assert!(!dir.path().join("settling").exists());
    }
}
