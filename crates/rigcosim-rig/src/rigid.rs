//! Rigid tire model.

use std::path::Path;

use rigcosim_comm::{ContactLoad, TerrainInfo, TireInfo, TireState};
use rigcosim_core::{CosimError, CosimResult, Scalar, TireKind};

use crate::config::RigConfig;
use crate::wheel::{RigCheckpoint, RigReport, WheelRig};
use crate::RigBackend;

/// Undeformable tire: the terrain sees the reference mesh carried by the wheel
/// and answers with a resultant force and moment at the wheel center.
pub struct RigidTire {
    cfg: RigConfig,
    info: TireInfo,
    rig: WheelRig,
}

impl RigidTire {
    /// Rigid tire from a validated configuration.
    pub fn new(cfg: RigConfig) -> CosimResult<Self> {
        cfg.validate()?;
        let info = cfg.tire.tire_info(TireKind::Rigid)?;
        let rig = WheelRig::new(&cfg);
        Ok(Self { cfg, info, rig })
    }
}

impl RigBackend for RigidTire {
    fn kind(&self) -> TireKind { TireKind::Rigid }
    fn config(&self) -> &RigConfig { &self.cfg }
    fn tire_info(&self) -> &TireInfo { &self.info }

    fn initialize(&mut self, terrain: &TerrainInfo) -> CosimResult<()> {
        self.rig.initialize(&self.cfg, terrain)
    }

    fn tire_state(&self) -> CosimResult<TireState> {
        let c = self.rig.carrier()?;
        Ok(TireState { pose: c.pose(), vel: c.velocity(), mesh: None })
    }

    fn apply_contact(&mut self, load: &ContactLoad) -> CosimResult<()> {
        match load {
            ContactLoad::Resultant { force, moment } => {
                self.rig.force = *force;
                self.rig.moment = *moment;
                Ok(())
            }
            ContactLoad::Vertices { .. } => Err(CosimError::protocol("rigid tire received per-vertex forces")),
        }
    }

    fn advance(&mut self, dt: Scalar) -> CosimResult<()> { self.rig.advance(dt) }
    fn time(&self) -> Scalar { self.rig.time }
    fn report(&self) -> RigReport { self.rig.report() }

    fn write_checkpoint(&self, path: &Path) -> CosimResult<()> {
        self.rig.checkpoint(TireKind::Rigid, Vec::new())?.write(path)
    }

    fn read_checkpoint(&mut self, path: &Path) -> CosimResult<()> {
        let ck = RigCheckpoint::read(path, TireKind::Rigid, 0)?;
        self.rig.restore(&ck)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigcosim_core::{TerrainKind, Vec3, GRAVITY_ACC};

    #[test]
    fn supported_wheel_stays_put() {
        let mut cfg = RigConfig::default();
        cfg.set_drive(1.0, 0.1);
        let mut tire = RigidTire::new(cfg.clone()).unwrap();
        assert!(matches!(tire.tire_state(), Err(CosimError::Protocol(_))));
        let terrain = TerrainInfo { kind: TerrainKind::Rigid, init_height: 0.0, patch_length: 4.0, patch_width: 1.0 };
        tire.initialize(&terrain).unwrap();
        let z0 = tire.tire_state().unwrap().pose.pos.z;
        let weight = (cfg.masses.total() + cfg.tire.mass) * GRAVITY_ACC;
        let load = ContactLoad::Resultant { force: Vec3::new(30.0, 0.0, weight), moment: Vec3::new(0.0, -12.0, 0.0) };
        for _ in 0..100 {
            tire.apply_contact(&load).unwrap();
            tire.advance(1e-3).unwrap();
        }
        let st = tire.tire_state().unwrap();
        assert!((st.pose.pos.z - z0).abs() < 1e-9);
        assert!((st.pose.pos.x - (-2.0 + 0.47 + 0.1)).abs() < 1e-9);
        let rep = tire.report();
        assert_eq!(rep.dbp, 30.0);
        assert!((rep.dbp_filtered - 30.0).abs() < 1e-9);
        assert_eq!(rep.drive_torque, 12.0);
        let bad = ContactLoad::zero(TireKind::Flexible);
        assert!(matches!(tire.apply_contact(&bad), Err(CosimError::Protocol(_))));
    }
}
