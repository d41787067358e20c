use rigcosim_comm::{ContactLoad, TerrainInfo};
use rigcosim_core::{CapabilityRegistry, CosimError, TerrainKind, TireKind, Vec3, GRAVITY_ACC};
use rigcosim_rig::{create_rig, RigConfig, REPORT_HEADER};

fn flat() -> TerrainInfo {
    TerrainInfo { kind: TerrainKind::Rigid, init_height: 0.0, patch_length: 6.0, patch_width: 1.0 }
}

#[test]
fn rigid_wheel_sinks_into_spring_ground() {
    let mut cfg = RigConfig::default();
    cfg.set_drive(0.5, 0.0);
    let mass = cfg.masses.total() + cfg.tire.mass;
    let radius = cfg.tire.radius;
    let mut rig = create_rig(cfg, &CapabilityRegistry::new()).unwrap();
    rig.initialize(&flat()).unwrap();

    let (k, c) = (1e6, 2.0 * (1e6 * mass).sqrt());
    for _ in 0..3000 {
        let st = rig.tire_state().unwrap();
        let pen = radius - st.pose.pos.z;
        let fz = if pen > 0.0 { k * pen - c * st.vel.lin.z } else { 0.0 };
        rig.apply_contact(&ContactLoad::Resultant { force: Vec3::new(0.0, 0.0, fz), moment: Vec3::ZERO }).unwrap();
        rig.advance(1e-3).unwrap();
    }
    let z = rig.tire_state().unwrap().pose.pos.z;
    let sinkage = radius - z;
    assert!((sinkage - mass * GRAVITY_ACC / k).abs() < 1e-6, "sinkage {sinkage}");
    assert!((rig.time() - 3.0).abs() < 1e-9);
    assert_eq!(rig.report().row().len(), REPORT_HEADER.split(',').count());
}

#[test]
fn flexible_tread_slips_backward_under_drive() {
    let mut cfg = RigConfig::default();
    cfg.tire_kind = TireKind::Flexible;
    cfg.set_drive(1.0, 0.2);
    let mut rig = create_rig(cfg, &CapabilityRegistry::new()).unwrap();
    rig.initialize(&flat()).unwrap();
    let st = rig.tire_state().unwrap();
    let mesh = st.mesh.unwrap();
    let (i, _) = mesh.vpos.iter().enumerate()
        .min_by(|a, b| a.1.z.total_cmp(&b.1.z))
        .unwrap();
    // v - omega R = 1 - 1/0.8
    assert!((mesh.vvel[i].x + 0.25).abs() < 1e-9, "{:?}", mesh.vvel[i]);
    assert!(mesh.vpos[i].z.abs() < 1e-9);

    let dir = tempfile::tempdir().unwrap();
    rig.output(0, dir.path()).unwrap();
    let text = std::fs::read_to_string(dir.path().join("vertices_00000.csv")).unwrap();
    assert_eq!(text.lines().count(), 301);
}

#[test]
fn unavailable_tire_is_a_configuration_error() {
    let mut caps = CapabilityRegistry::new();
    caps.disable_tire(TireKind::Flexible, "no flexible solver");
    let mut cfg = RigConfig::default();
    cfg.tire_kind = TireKind::Flexible;
    assert!(matches!(create_rig(cfg, &caps), Err(CosimError::Configuration(_))));
}
