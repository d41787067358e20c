use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rigcosim_core::{CapabilityRegistry, NodeRole, TerrainKind, TireKind};
use rigcosim_node::{run_loopback, run_tcp, DriverConfig, RunConfig, RunSummary};
use rigcosim_terrain::{probe_capabilities, SphParams, TerrainSetup};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum TireArg { Rigid, Flexible }

#[derive(Copy, Clone, Debug, ValueEnum)]
enum TransportArg { Loopback, Tcp }

#[derive(Parser, Debug)]
#[command(name = "rig_cosim", version, about = "Single-wheel test rig coupled to a terrain model")]
struct Opts {
    /// Terrain model: 0 rigid, 1 SCM, 2 granular (CPU), 3 granular (GPU), 4 granular (SPH)
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..5))]
    terrain_type: u32,
    /// Simulated time (s)
    #[arg(long, default_value_t = 10.0)]
    sim_time: f64,
    /// Coupling step (s)
    #[arg(long, default_value_t = 1e-4)]
    step_size: f64,
    /// Carrier forward speed (m/s)
    #[arg(long, default_value_t = 0.5)]
    init_vel: f64,
    /// Longitudinal slip, below 1
    #[arg(long, default_value_t = 0.0)]
    slip: f64,
    /// Inter-particle cohesion pressure (Pa)
    #[arg(long, default_value_t = 0.0)]
    coh_pressure: f64,
    /// Ballast mass carried by the wheel (kg)
    #[arg(long, default_value_t = 200.0)]
    sys_mass: f64,
    /// Warnings only
    #[arg(long)]
    quiet: bool,
    /// Disable runtime render snapshots
    #[arg(long)]
    no_render: bool,
    /// Disable output frames
    #[arg(long)]
    no_output: bool,
    /// Restart the terrain from an earlier run (granular: settled bed, SCM: final soil state)
    #[arg(long)]
    use_checkpoint: bool,
    #[arg(long, default_value_t = 1)]
    threads_rig: usize,
    #[arg(long, default_value_t = 1)]
    threads_terrain: usize,
    /// Appended to the run directory name
    #[arg(long, default_value = "")]
    suffix: String,
    #[arg(long, value_enum, default_value_t = TireArg::Rigid)]
    tire: TireArg,
    /// Tire description (JSON)
    #[arg(long)]
    tire_json: Option<PathBuf>,
    /// SPH parameters (JSON)
    #[arg(long)]
    sph_json: Option<PathBuf>,
    #[arg(long, default_value = ".")]
    output_root: PathBuf,
    #[arg(long, default_value_t = 100.0)]
    output_fps: f64,
    #[arg(long, default_value_t = 100.0)]
    render_fps: f64,
    /// Participant count; the co-simulation needs exactly 2
    #[arg(long, default_value_t = 2)]
    num_procs: usize,
    #[arg(long, value_enum, default_value_t = TransportArg::Loopback)]
    transport: TransportArg,
    /// This process's rank with `--transport tcp`: 0 rig, 1 terrain
    #[arg(long)]
    rank: Option<usize>,
    /// Rig listen address with `--transport tcp`
    #[arg(long, default_value = "127.0.0.1:47321")]
    addr: String,
}

// ---------- launch-time overrides ----------
fn env_flag(key: &str) -> bool {
    std::env::var(key).map(|v| !v.is_empty() && v != "0").unwrap_or(false)
}
fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|s| s.parse::<f64>().ok())
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn run_config(opt: &Opts) -> Result<RunConfig> {
    let terrain = TerrainKind::from_index(opt.terrain_type)
        .with_context(|| format!("unknown terrain type {}", opt.terrain_type))?;
    let tire = match opt.tire { TireArg::Rigid => TireKind::Rigid, TireArg::Flexible => TireKind::Flexible };
    let mut cfg = RunConfig::new(tire, terrain);

    cfg.driver = DriverConfig {
        sim_time: opt.sim_time,
        step_size: opt.step_size,
        output: !opt.no_output,
        output_fps: opt.output_fps,
    };
    cfg.output_root = opt.output_root.clone();
    cfg.suffix = opt.suffix.clone();
    cfg.coh_pressure = opt.coh_pressure;
    cfg.use_checkpoint = opt.use_checkpoint;
    cfg.num_procs = opt.num_procs;
    cfg.verbose = !opt.quiet;

    cfg.rig.set_drive(opt.init_vel, opt.slip);
    cfg.rig.masses.system = opt.sys_mass;
    cfg.rig.set_threads(opt.threads_rig);
    if let Some(path) = &opt.tire_json {
        cfg.rig.set_tire_json_file(path).with_context(|| format!("loading tire from {}", path.display()))?;
    }

    cfg.terrain.set_threads(opt.threads_terrain);
    cfg.terrain.enable_runtime_visualization(!opt.no_render, opt.render_fps);
    if let Some(g) = cfg.setup.granular_mut() {
        if let Some(t) = env_f64("RIGCOSIM_SETTLING_TIME") {
            g.set_settling_time(t);
        }
    }
    if let Some(path) = &opt.sph_json {
        if matches!(cfg.setup, TerrainSetup::GranularSph(..)) {
            let params = SphParams::from_json_file(path)
                .with_context(|| format!("loading SPH parameters from {}", path.display()))?;
            cfg.setup.set_properties_sph(params)?;
        } else {
            warn!(path = %path.display(), "SPH parameters ignored for a non-SPH terrain");
        }
    }
    Ok(cfg)
}

fn report(role: &str, s: &RunSummary) {
    println!("{role}: {} steps, {} output frames", s.steps, s.frames);
}

fn main() -> Result<()> {
    let opt = Opts::parse();
    init_tracing(opt.quiet);
    let cfg = run_config(&opt)?;

    let mut caps = CapabilityRegistry::new();
    if env_flag("RIGCOSIM_DISABLE_GPU") {
        caps.disable_terrain(TerrainKind::GranularGpu, "disabled by RIGCOSIM_DISABLE_GPU");
    }
    probe_capabilities(&mut caps, opt.threads_terrain);
    info!(run = %cfg.layout().run_dir().display(), "output directory");

    match opt.transport {
        TransportArg::Loopback => {
            let [rig, terrain] = run_loopback(&cfg, &caps).context("co-simulation failed")?;
            report("rig", &rig);
            report("terrain", &terrain);
        }
        TransportArg::Tcp => {
            let Some(rank) = opt.rank else { bail!("--rank is required with --transport tcp") };
            let role = NodeRole::from_rank(rank).with_context(|| format!("rank {rank} is neither rig (0) nor terrain (1)"))?;
            let summary = run_tcp(&cfg, role, &opt.addr, &caps)
                .with_context(|| format!("{role} node failed"))?;
            report(role.name(), &summary);
        }
    }
    Ok(())
}
