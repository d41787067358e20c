//! Assemble both participants from one run description and start them,
//! either as two threads over the loopback transport or as one side of a
//! TCP pair.

use std::path::PathBuf;
use std::thread;

use tracing::{info, warn};

use rigcosim_comm::{check_participants, Communicator, LoopbackComm, TcpAcceptor, TcpComm};
use rigcosim_core::{CapabilityRegistry, CosimError, CosimResult, NodeRole, Scalar, TerrainKind, TireKind};
use rigcosim_materials::{cohesion_force, preset, ContactModel, MaterialPreset};
use rigcosim_rig::{create_rig, RigConfig};
use rigcosim_terrain::{create_terrain, GranularConfig, ScmParams, SphParams, TerrainConfig, TerrainSetup};

use crate::driver::{run_cosim, DriverConfig, RunSummary, CHECKPOINT_END};
use crate::layout::CosimLayout;
use crate::rig_node::RigNode;
use crate::terrain_node::TerrainNode;

/// Everything needed to start a run.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub driver: DriverConfig,
    pub rig: RigConfig,
    pub terrain: TerrainConfig,
    pub setup: TerrainSetup,
    pub output_root: PathBuf,
    pub suffix: String,
    /// Inter-particle cohesion pressure (Pa), granular terrains only.
    pub coh_pressure: Scalar,
    /// Restart the terrain from an earlier run in the same output directory:
    /// granular beds from their settled checkpoint, SCM soil from its final state.
    pub use_checkpoint: bool,
    pub num_procs: usize,
    pub verbose: bool,
}

impl RunConfig {
    /// Defaults for the given variants: the terrain patch, proxies and surface
    /// are set up the way each terrain variant is normally run.
    pub fn new(tire: TireKind, terrain: TerrainKind) -> Self {
        let mut rig = RigConfig::default();
        rig.tire_kind = tire;
        let mut tcfg = TerrainConfig::default();
        tcfg.set_patch_dimensions(10.0, 1.0);
        tcfg.set_proxy_contact_radius(0.002);
        let (material, setup) = match terrain {
            TerrainKind::Rigid => {
                tcfg.set_proxy_fixed(true);
                (MaterialPreset::RigidTerrain, TerrainSetup::Rigid)
            }
            TerrainKind::Scm => {
                tcfg.set_proxy_fixed(false);
                (MaterialPreset::ScmSoil, TerrainSetup::Scm(ScmParams::default()))
            }
            TerrainKind::GranularCpu | TerrainKind::GranularGpu => {
                tcfg.set_patch_dimensions(2.0, 0.6);
                tcfg.set_proxy_fixed(true);
                let mut g = GranularConfig::default();
                g.set_wall_thickness(0.1);
                let setup = if terrain == TerrainKind::GranularCpu {
                    TerrainSetup::GranularCpu(g)
                } else {
                    TerrainSetup::GranularGpu(g)
                };
                (MaterialPreset::GranularSmc, setup)
            }
            TerrainKind::GranularSph => {
                let mut g = GranularConfig::default();
                g.set_initial_depth(0.5);
                (MaterialPreset::SphSoil, TerrainSetup::GranularSph(g, SphParams::default()))
            }
        };
        tcfg.set_material_surface(preset(material), ContactModel::default());
        Self {
            driver: DriverConfig::default(),
            rig,
            terrain: tcfg,
            setup,
            output_root: PathBuf::from("."),
            suffix: String::new(),
            coh_pressure: 0.0,
            use_checkpoint: false,
            num_procs: 2,
            verbose: true,
        }
    }

    pub fn layout(&self) -> CosimLayout {
        CosimLayout::new(&self.output_root, self.rig.tire_kind, self.setup.kind(), &self.suffix)
    }

    /// Terrain configuration with cohesion and checkpoint input applied.
    pub fn terrain_parts(&self) -> (TerrainConfig, TerrainSetup) {
        let mut cfg = self.terrain.clone();
        let setup = self.setup.clone();
        let kind = setup.kind();
        if let TerrainSetup::GranularCpu(g) | TerrainSetup::GranularGpu(g) | TerrainSetup::GranularSph(g, _) = &setup {
            if self.coh_pressure > 0.0 {
                let adhesion = cohesion_force(g.radius, self.coh_pressure);
                cfg.material = cfg.material.with_adhesion(adhesion);
            }
            if self.use_checkpoint {
                cfg.set_input_from_checkpoint(self.layout().settled_checkpoint());
            }
        } else if self.use_checkpoint {
            match kind {
                TerrainKind::Scm => {
                    cfg.set_input_from_checkpoint(self.layout().node_dir(NodeRole::Terrain).join(CHECKPOINT_END));
                }
                _ => warn!(terrain = %kind, "terrain has no state to restart from; ignoring checkpoint"),
            }
        }
        (cfg, setup)
    }
}

/// Report a setup failure to the peer before returning it.
fn or_abort<T>(comm: &mut dyn Communicator, r: CosimResult<T>) -> CosimResult<T> {
    if let Err(e) = &r {
        comm.abort(&e.to_string());
    }
    r
}

pub fn build_rig_node(cfg: &RunConfig, mut comm: Box<dyn Communicator>, caps: &CapabilityRegistry) -> CosimResult<RigNode> {
    let rig = or_abort(comm.as_mut(), create_rig(cfg.rig.clone(), caps))?;
    let mut node = RigNode::new(rig, comm, cfg.driver.step_size, &cfg.layout().node_dir(NodeRole::Rig))?;
    node.set_verbose(cfg.verbose);
    Ok(node)
}

pub fn build_terrain_node(
    cfg: &RunConfig,
    mut comm: Box<dyn Communicator>,
    caps: &CapabilityRegistry,
) -> CosimResult<TerrainNode> {
    let (tcfg, setup) = cfg.terrain_parts();
    let terrain = or_abort(comm.as_mut(), create_terrain(tcfg, setup, caps))?;
    let mut node = TerrainNode::new(terrain, comm, cfg.driver.step_size, &cfg.layout().node_dir(NodeRole::Terrain))?;
    node.set_verbose(cfg.verbose);
    Ok(node)
}

/// Run both participants in this process, the terrain on a second thread.
///
/// Returns the rig and terrain summaries. When both sides fail, the error of
/// the side that failed first is returned rather than its peer's abort.
pub fn run_loopback(cfg: &RunConfig, caps: &CapabilityRegistry) -> CosimResult<[RunSummary; 2]> {
    check_participants(cfg.num_procs)?;
    let (rig_comm, terrain_comm) = LoopbackComm::pair();
    let mut rig = build_rig_node(cfg, Box::new(rig_comm), caps)?;
    let mut terrain = build_terrain_node(cfg, Box::new(terrain_comm), caps)?;
    let driver = cfg.driver;
    info!(run = %cfg.layout().run_dir().display(), "loopback run");

    let (r, t) = thread::scope(|s| {
        let th = s.spawn(|| run_cosim(&mut terrain, &driver));
        let r = run_cosim(&mut rig, &driver);
        let t = th.join().unwrap_or_else(|_| Err(CosimError::PeerAborted("terrain thread panicked".into())));
        (r, t)
    });
    match (r, t) {
        (Ok(r), Ok(t)) => Ok([r, t]),
        (Err(e), Err(f)) => Err(if e.is_peer_abort() { f } else { e }),
        (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
    }
}

/// Run one side of a two-process TCP pair. The rig listens on `addr`, the terrain connects to it.
pub fn run_tcp(cfg: &RunConfig, role: NodeRole, addr: &str, caps: &CapabilityRegistry) -> CosimResult<RunSummary> {
    check_participants(cfg.num_procs)?;
    match role {
        NodeRole::Rig => {
            let acceptor = TcpAcceptor::bind(addr)?;
            info!(addr = %acceptor.local_addr()?, "rig waiting for terrain");
            let comm = acceptor.accept(cfg.num_procs)?;
            let mut node = build_rig_node(cfg, Box::new(comm), caps)?;
            run_cosim(&mut node, &cfg.driver)
        }
        NodeRole::Terrain => {
            let comm = TcpComm::connect(addr, cfg.num_procs)?;
            let mut node = build_terrain_node(cfg, Box::new(comm), caps)?;
            run_cosim(&mut node, &cfg.driver)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cohesion_becomes_granular_adhesion() {
        let mut cfg = RunConfig::new(TireKind::Rigid, TerrainKind::GranularCpu);
        cfg.coh_pressure = 8e4;
        let (tcfg, _) = cfg.terrain_parts();
        assert!((tcfg.material.adhesion - 100.53).abs() < 0.01, "{}", tcfg.material.adhesion);

        let mut rigid = RunConfig::new(TireKind::Rigid, TerrainKind::Rigid);
        rigid.coh_pressure = 8e4;
        rigid.use_checkpoint = true;
        let (tcfg, _) = rigid.terrain_parts();
        assert_eq!(tcfg.material.adhesion, preset(MaterialPreset::RigidTerrain).adhesion);
        assert!(tcfg.checkpoint_input.is_none());
    }

    #[test]
    fn checkpoint_restart_sources() {
        let mut scm = RunConfig::new(TireKind::Rigid, TerrainKind::Scm);
        scm.use_checkpoint = true;
        let (tcfg, _) = scm.terrain_parts();
        assert_eq!(tcfg.checkpoint_input, Some(scm.layout().node_dir(NodeRole::Terrain).join(CHECKPOINT_END)));

        let mut granular = RunConfig::new(TireKind::Rigid, TerrainKind::GranularGpu);
        granular.use_checkpoint = true;
        let (tcfg, _) = granular.terrain_parts();
        assert_eq!(tcfg.checkpoint_input, Some(granular.layout().settled_checkpoint()));
    }

    #[test]
    fn variant_setups() {
        for kind in TerrainKind::ALL {
            let cfg = RunConfig::new(TireKind::Flexible, kind);
            assert_eq!(cfg.setup.kind(), kind);
            assert_eq!(cfg.terrain.proxy.contact_radius, 0.002);
            assert_eq!(cfg.rig.dbp_window, 0.2);
            assert_eq!(cfg.rig.masses.spindle, 15.0);
            assert!(cfg.rig.tire_pressure);
            let t = &cfg.terrain;
            match &cfg.setup {
                TerrainSetup::Rigid => {
                    assert_eq!((t.patch_length, t.patch_width), (10.0, 1.0));
                    assert!(t.proxy.fixed);
                }
                TerrainSetup::Scm(_) => {
                    assert_eq!((t.patch_length, t.patch_width), (10.0, 1.0));
                    assert!(!t.proxy.fixed);
                }
                TerrainSetup::GranularCpu(g) | TerrainSetup::GranularGpu(g) => {
                    assert_eq!((t.patch_length, t.patch_width), (2.0, 0.6));
                    assert!(t.proxy.fixed);
                    assert_eq!(g.wall_thickness, 0.1);
                    assert_eq!((g.radius, g.density), (0.02, 2500.0));
                    assert_eq!(g.settling.time, 0.4);
                }
                TerrainSetup::GranularSph(g, _) => {
                    assert_eq!((t.patch_length, t.patch_width), (10.0, 1.0));
                    assert_eq!(g.initial_depth, 0.5);
                }
            }
            t.validate().unwrap();
        }
    }

    #[test]
    fn wrong_participant_count_fails_before_any_node_exists() {
        let mut cfg = RunConfig::new(TireKind::Rigid, TerrainKind::Rigid);
        cfg.num_procs = 3;
        let dir = tempfile::tempdir().unwrap();
        cfg.output_root = dir.path().to_path_buf();
        let err = run_loopback(&cfg, &CapabilityRegistry::new()).unwrap_err();
        assert!(matches!(err, CosimError::Configuration(_)), "{err}");
        assert!(!cfg.layout().run_dir().exists());
    }
}
