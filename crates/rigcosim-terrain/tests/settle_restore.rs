use std::path::Path;

use rigcosim_comm::{MeshState, TireInfo};
use rigcosim_core::{CapabilityRegistry, CosimError, TerrainKind, TireKind, TriMesh, Vec3};
use rigcosim_materials::{preset, ContactModel, MaterialPreset};
use rigcosim_terrain::{
    create_terrain, probe_capabilities, Checkpoint, CpuDem, GpuDem, GranularConfig, GranularTerrain, Layout,
    SamplingMethod, SphParams, SphSolver, TerrainBackend, TerrainConfig, TerrainSetup, CHECKPOINT_SETTLED,
};

fn tiny_bed() -> (TerrainConfig, GranularConfig) {
    let mut cfg = TerrainConfig::default();
    cfg.set_patch_dimensions(0.3, 0.2);
    cfg.set_material_surface(preset(MaterialPreset::GranularSmc), ContactModel::default());
    cfg.set_proxy_contact_radius(0.01);
    let mut g = GranularConfig::default();
    g.set_granular_material(0.02, 2500.0);
    g.set_sampling_method(SamplingMethod::HcpPack, 0.5, false);
    g.set_initial_depth(0.1);
    g.set_settling_time(0.05);
    (cfg, g)
}

fn small_tire() -> TireInfo {
    TireInfo {
        kind: TireKind::Rigid,
        radius: 0.1,
        width: 0.08,
        mass: 5.0,
        mesh: TriMesh::cylinder(0.1, 0.08, 24, 2).unwrap(),
        material: preset(MaterialPreset::TireRubber),
    }
}

fn pressed_into(tire: &TireInfo, surface: f64) -> MeshState {
    let center = Vec3::new(0.0, 0.0, surface + tire.radius - 0.03);
    MeshState {
        vpos: tire.mesh.vertices.iter().map(|v| center + *v).collect(),
        vvel: vec![Vec3::new(0.2, 0.0, 0.0); tire.mesh.num_vertices()],
    }
}

fn drive(t: &mut dyn TerrainBackend, tire: &TireInfo, steps: usize) {
    let st = pressed_into(tire, t.surface_height());
    t.initialize(tire).unwrap();
    for _ in 0..steps {
        t.update_tire_state(&st).unwrap();
        t.advance(1e-3).unwrap();
    }
}

#[test]
fn settled_checkpoint_is_an_exact_restart_point() {
    let dir = tempfile::tempdir().unwrap();
    let (cfg, g) = tiny_bed();
    let mut a = GranularTerrain::<CpuDem>::new(cfg.clone(), g.clone(), ()).unwrap();
    assert!(a.needs_settling());
    let report = a.settle(dir.path()).unwrap();
    assert_eq!(report.steps, 500);
    assert!(!a.needs_settling());
    assert_eq!(a.time(), 0.0);
    assert!(report.surface_height > 0.0 && report.surface_height < 0.1);

    let ckpt = dir.path().join(CHECKPOINT_SETTLED);
    a.write_checkpoint(&ckpt).unwrap();

    let mut b = GranularTerrain::<CpuDem>::new(cfg, g, ()).unwrap();
    b.read_checkpoint(&ckpt).unwrap();
    assert!(!b.needs_settling());
    assert_eq!(b.particles().pos, a.particles().pos);
    assert_eq!(b.particles().vel, a.particles().vel);
    assert_eq!(b.particles().omega, a.particles().omega);
    assert_eq!(b.surface_height(), a.surface_height());

    let tire = small_tire();
    drive(&mut a, &tire, 20);
    drive(&mut b, &tire, 20);
    assert_eq!(a.particles().pos, b.particles().pos);
    assert_eq!(a.contact_forces(), b.contact_forces());
    let fz: f64 = a.contact_forces().iter().map(|f| f.z).sum();
    assert!(fz > 0.0, "bed should hold the tire up, got {fz}");
}

#[test]
fn checkpoints_refuse_other_variants_and_materials() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cpu.dat");
    let (cfg, g) = tiny_bed();
    GranularTerrain::<CpuDem>::new(cfg.clone(), g.clone(), ()).unwrap().write_checkpoint(&path).unwrap();

    let mut gpu = GranularTerrain::<GpuDem>::new(cfg.clone(), g.clone(), ()).unwrap();
    assert!(matches!(gpu.read_checkpoint(&path), Err(CosimError::Checkpoint(_))));

    let mut coarse = g.clone();
    coarse.set_granular_material(0.025, 2500.0);
    let mut other = GranularTerrain::<CpuDem>::new(cfg.clone(), coarse, ()).unwrap();
    assert!(matches!(other.read_checkpoint(&path), Err(CosimError::Checkpoint(_))));

    let mut sticky = cfg;
    sticky.material = sticky.material.with_adhesion(100.5);
    let mut other = GranularTerrain::<CpuDem>::new(sticky, g, ()).unwrap();
    assert!(matches!(other.read_checkpoint(&path), Err(CosimError::Checkpoint(_))));
}

#[test]
fn device_variant_writes_column_major_state() {
    let dir = tempfile::tempdir().unwrap();
    let (cfg, mut g) = tiny_bed();
    g.set_settling_time(0.01);
    let mut a = GranularTerrain::<GpuDem>::new(cfg.clone(), g.clone(), ()).unwrap();
    a.settle(dir.path()).unwrap();
    let path = dir.path().join(CHECKPOINT_SETTLED);
    a.write_checkpoint(&path).unwrap();
    let raw = Checkpoint::read(&path).unwrap();
    assert_eq!(raw.layout, Layout::ColumnMajor);
    assert_eq!(raw.kind, TerrainKind::GranularGpu);
    assert_eq!(raw.rows, a.particles().len());

    let mut b = GranularTerrain::<GpuDem>::new(cfg, g, ()).unwrap();
    b.read_checkpoint(&path).unwrap();
    assert_eq!(b.particles().pos, a.particles().pos);

    let tire = small_tire();
    drive(&mut a, &tire, 5);
    drive(&mut b, &tire, 5);
    assert_eq!(a.contact_forces(), b.contact_forces());
}

#[test]
fn sph_bed_settles_and_restores() {
    let dir = tempfile::tempdir().unwrap();
    let (cfg, mut g) = tiny_bed();
    g.set_settling_time(0.01);
    g.enable_settling_output(true, 1000.0);
    let mut a = GranularTerrain::<SphSolver>::new(cfg.clone(), g.clone(), SphParams::default()).unwrap();
    let report = a.settle(dir.path()).unwrap();
    assert_eq!(report.frames, 10);
    assert!(dir.path().join("settling").join("settling_00000.csv").is_file());

    let path = dir.path().join(CHECKPOINT_SETTLED);
    a.write_checkpoint(&path).unwrap();
    assert_eq!(Checkpoint::read(&path).unwrap().cols, 8);

    let mut b = GranularTerrain::<SphSolver>::new(cfg.clone(), g.clone(), SphParams::default()).unwrap();
    b.read_checkpoint(&path).unwrap();
    assert_eq!(b.particles().pos, a.particles().pos);

    let stiff = SphParams { sound_speed: 40.0, ..SphParams::default() };
    let mut c = GranularTerrain::<SphSolver>::new(cfg, g, stiff).unwrap();
    assert!(matches!(c.read_checkpoint(&path), Err(CosimError::Checkpoint(_))));
}

#[test]
fn unavailable_variant_is_a_configuration_error() {
    let (cfg, g) = tiny_bed();
    let mut caps = CapabilityRegistry::new();
    probe_capabilities(&mut caps, 2);
    assert!(caps.available_terrains().contains(&TerrainKind::GranularGpu));

    caps.disable_terrain(TerrainKind::GranularGpu, "no device");
    let err = create_terrain(cfg.clone(), TerrainSetup::GranularGpu(g.clone()), &caps).err();
    assert!(matches!(err, Some(CosimError::Configuration(_))), "{err:?}");

    let t = create_terrain(cfg, TerrainSetup::GranularCpu(g), &caps).unwrap();
    assert_eq!(t.kind(), TerrainKind::GranularCpu);
    assert!(t.needs_settling());
    assert_eq!(t.info().patch_length, 0.3);
}

#[test]
fn continuum_terrains_have_no_settling_phase() {
    let caps = CapabilityRegistry::new();
    let mut t = create_terrain(TerrainConfig::default(), TerrainSetup::Rigid, &caps).unwrap();
    assert!(!t.needs_settling());
    assert!(matches!(t.settle(Path::new(".")), Err(CosimError::Configuration(_))));
}
