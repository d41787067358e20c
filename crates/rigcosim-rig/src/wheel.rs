//! Wheel carrier kinematics shared by both tire models.
//!
//! The carrier is driven along +X at the prescribed speed and the wheel spins
//! about +Y at the slip-derived rate; both are kinematic. Only the vertical
//! position is dynamic: it carries the total rig mass under gravity and the
//! vertical contact force.

use std::path::Path;

use serde::{Deserialize, Serialize};

use rigcosim_comm::TerrainInfo;
use rigcosim_core::{CosimError, CosimResult, IoContext, Isometry, Quat, Scalar, TireKind, Vec3, Velocity, GRAVITY_ACC};

use crate::config::RigConfig;
use crate::filter::DbpFilter;

/// Column names of [`RigReport::row`].
pub const REPORT_HEADER: &str = "time,x,z,vx,vz,omega,fx,fy,fz,mx,my,mz,dbp,dbp_filtered,drive_torque";

/// Carrier position, velocity and wheel spin.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Carrier {
    /// Wheel center (world).
    pub pos: Vec3,
    /// Wheel center velocity (world).
    pub vel: Vec3,
    /// Accumulated spin angle about +Y (rad).
    pub angle: Scalar,
    /// Prescribed spin rate about +Y (rad/s).
    pub omega: Scalar,
    /// Mass loading the vertical degree of freedom (kg).
    pub mass: Scalar,
}

impl Carrier {
    /// Carrier at the start of the patch with the tread resting on the terrain surface.
    pub fn new(cfg: &RigConfig, terrain: &TerrainInfo) -> Self {
        let r = cfg.tire.radius;
        let x0 = -0.5 * terrain.patch_length + r;
        Self {
            pos: Vec3::new(x0, 0.0, terrain.init_height + r),
            vel: Vec3::new(cfg.init_vel, 0.0, 0.0),
            angle: 0.0,
            omega: cfg.spin_rate(),
            mass: cfg.masses.total() + cfg.tire.mass,
        }
    }

    /// Wheel frame in the world.
    #[inline]
    pub fn pose(&self) -> Isometry {
        Isometry { pos: self.pos, rot: Quat::from_rotation_y(self.angle) }
    }

    /// Wheel twist in the world.
    #[inline]
    pub fn velocity(&self) -> Velocity {
        Velocity { lin: self.vel, ang: Vec3::new(0.0, self.omega, 0.0) }
    }

    /// Semi-implicit Euler step of the vertical motion under `force_z`; X and spin follow the drive.
    pub fn advance(&mut self, force_z: Scalar, dt: Scalar) {
        self.vel.z += (force_z / self.mass - GRAVITY_ACC) * dt;
        self.pos.x += self.vel.x * dt;
        self.pos.z += self.vel.z * dt;
        self.angle += self.omega * dt;
    }
}

/// One diagnostic sample of the rig.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RigReport {
    /// Rig time (s).
    pub time: Scalar,
    /// Wheel center.
    pub pos: Vec3,
    /// Wheel center velocity.
    pub vel: Vec3,
    /// Spin rate (rad/s).
    pub omega: Scalar,
    /// Contact force on the wheel.
    pub force: Vec3,
    /// Contact moment about the wheel center.
    pub moment: Vec3,
    /// Raw drawbar pull (N).
    pub dbp: Scalar,
    /// Drawbar pull through the moving-average filter (N).
    pub dbp_filtered: Scalar,
    /// Torque the drive applies to hold the spin rate (N m).
    pub drive_torque: Scalar,
}

impl RigReport {
    /// Values in the order of [`REPORT_HEADER`].
    pub fn row(&self) -> [Scalar; 15] {
        [
            self.time, self.pos.x, self.pos.z, self.vel.x, self.vel.z, self.omega,
            self.force.x, self.force.y, self.force.z,
            self.moment.x, self.moment.y, self.moment.z,
            self.dbp, self.dbp_filtered, self.drive_torque,
        ]
    }
}

/// Serialized rig state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RigCheckpoint {
    /// Tire variant name.
    pub tire: String,
    /// Rig time.
    pub time: Scalar,
    /// Wheel center.
    pub pos: [Scalar; 3],
    /// Wheel center velocity.
    pub vel: [Scalar; 3],
    /// Spin angle.
    pub angle: Scalar,
    /// Spin rate.
    pub omega: Scalar,
    /// Last applied contact force.
    pub force: [Scalar; 3],
    /// Last applied contact moment.
    pub moment: [Scalar; 3],
    /// Flexible tire node deflection and deflection rate; empty for a rigid tire.
    #[serde(default)]
    pub nodes: Vec<[Scalar; 2]>,
}

impl RigCheckpoint {
    /// Write as pretty JSON.
    pub fn write(&self, path: &Path) -> CosimResult<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| CosimError::checkpoint(format!("encode rig checkpoint: {e}")))?;
        std::fs::write(path, text).io_context(|| format!("write {}", path.display()))
    }

    /// Read and check the tire variant and node count.
    pub fn read(path: &Path, kind: TireKind, nodes: usize) -> CosimResult<Self> {
        let text = std::fs::read_to_string(path).io_context(|| format!("read {}", path.display()))?;
        let ck: Self = serde_json::from_str(&text)
            .map_err(|e| CosimError::checkpoint(format!("{}: {e}", path.display())))?;
        if ck.tire != kind.name() {
            return Err(CosimError::checkpoint(format!("checkpoint holds a {} tire, rig has a {kind} tire", ck.tire)));
        }
        if ck.nodes.len() != nodes {
            return Err(CosimError::checkpoint(format!("checkpoint has {} tire nodes, rig has {nodes}", ck.nodes.len())));
        }
        Ok(ck)
    }
}

/// Carrier, load bookkeeping and drawbar pull filter common to both tires.
#[derive(Clone, Debug)]
pub struct WheelRig {
    /// Carrier state; `None` until the terrain description arrives.
    pub carrier: Option<Carrier>,
    /// Contact force applied to the wheel for the coming advance.
    pub force: Vec3,
    /// Contact moment about the wheel center for the coming advance.
    pub moment: Vec3,
    /// Filtered drawbar pull.
    pub dbp: DbpFilter,
    /// Rig time.
    pub time: Scalar,
}

impl WheelRig {
    /// Idle rig with the configured filter window.
    pub fn new(cfg: &RigConfig) -> Self {
        Self { carrier: None, force: Vec3::ZERO, moment: Vec3::ZERO, dbp: DbpFilter::new(cfg.dbp_window), time: 0.0 }
    }

    /// Place the carrier on the terrain.
    pub fn initialize(&mut self, cfg: &RigConfig, terrain: &TerrainInfo) -> CosimResult<()> {
        if self.carrier.is_some() {
            return Err(CosimError::protocol("rig already received the terrain description"));
        }
        self.carrier = Some(Carrier::new(cfg, terrain));
        Ok(())
    }

    /// Carrier, or a protocol error before the terrain description arrived.
    pub fn carrier(&self) -> CosimResult<&Carrier> {
        self.carrier.as_ref().ok_or_else(|| CosimError::protocol("rig has not received the terrain description"))
    }

    /// Advance the carrier under the stored contact force.
    pub fn advance(&mut self, dt: Scalar) -> CosimResult<()> {
        let fz = self.force.z;
        let carrier = self.carrier.as_mut()
            .ok_or_else(|| CosimError::protocol("rig has not received the terrain description"))?;
        carrier.advance(fz, dt);
        self.dbp.push(self.force.x, dt);
        self.time += dt;
        Ok(())
    }

    /// Diagnostic sample; zero kinematics before initialization.
    pub fn report(&self) -> RigReport {
        let c = self.carrier.unwrap_or(Carrier { pos: Vec3::ZERO, vel: Vec3::ZERO, angle: 0.0, omega: 0.0, mass: 0.0 });
        RigReport {
            time: self.time,
            pos: c.pos,
            vel: c.vel,
            omega: c.omega,
            force: self.force,
            moment: self.moment,
            dbp: self.force.x,
            dbp_filtered: self.dbp.value(),
            drive_torque: -self.moment.y,
        }
    }

    /// Checkpoint record with the given tire node states.
    pub fn checkpoint(&self, kind: TireKind, nodes: Vec<[Scalar; 2]>) -> CosimResult<RigCheckpoint> {
        let c = self.carrier()?;
        Ok(RigCheckpoint {
            tire: kind.name().to_string(),
            time: self.time,
            pos: c.pos.to_array(),
            vel: c.vel.to_array(),
            angle: c.angle,
            omega: c.omega,
            force: self.force.to_array(),
            moment: self.moment.to_array(),
            nodes,
        })
    }

    /// Restore carrier and load from a checkpoint. The filter restarts empty.
    pub fn restore(&mut self, ck: &RigCheckpoint) -> CosimResult<()> {
        let c = self.carrier.as_mut()
            .ok_or_else(|| CosimError::protocol("rig has not received the terrain description"))?;
        c.pos = Vec3::from_array(ck.pos);
        c.vel = Vec3::from_array(ck.vel);
        c.angle = ck.angle;
        c.omega = ck.omega;
        self.force = Vec3::from_array(ck.force);
        self.moment = Vec3::from_array(ck.moment);
        self.time = ck.time;
        self.dbp.reset();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigcosim_core::TerrainKind;

    fn terrain() -> TerrainInfo {
        TerrainInfo { kind: TerrainKind::Rigid, init_height: 0.1, patch_length: 4.0, patch_width: 1.0 }
    }

    #[test]
    fn carrier_rolls_with_slip() {
        let mut cfg = RigConfig::default();
        cfg.set_drive(2.0, 0.5);
        let mut c = Carrier::new(&cfg, &terrain());
        assert_eq!(c.pos, Vec3::new(-2.0 + 0.47, 0.0, 0.1 + 0.47));
        assert!((c.omega - 2.0 / (0.47 * 0.5)).abs() < 1e-12);
        let weight = c.mass * GRAVITY_ACC;
        c.advance(weight, 1e-3);
        assert!(c.vel.z.abs() < 1e-12);
        assert!((c.pos.x - (-1.53 + 2e-3)).abs() < 1e-12);
        c.advance(0.0, 1e-3);
        assert!(c.vel.z < 0.0);
        // the bottom of a slipping wheel moves backward
        let bottom = c.velocity().at_offset(Vec3::new(0.0, 0.0, -0.47));
        assert!(bottom.x < 0.0);
    }

    #[test]
    fn checkpoint_checks_tire_kind() {
        let cfg = RigConfig::default();
        let mut rig = WheelRig::new(&cfg);
        assert!(matches!(rig.advance(1e-3), Err(CosimError::Protocol(_))));
        rig.initialize(&cfg, &terrain()).unwrap();
        rig.force = Vec3::new(5.0, 0.0, 100.0);
        rig.advance(1e-3).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rig.json");
        rig.checkpoint(TireKind::Rigid, Vec::new()).unwrap().write(&path).unwrap();
        assert!(matches!(RigCheckpoint::read(&path, TireKind::Flexible, 0), Err(CosimError::Checkpoint(_))));
        let ck = RigCheckpoint::read(&path, TireKind::Rigid, 0).unwrap();
        let mut other = WheelRig::new(&cfg);
        other.initialize(&cfg, &terrain()).unwrap();
        other.restore(&ck).unwrap();
        assert_eq!(other.carrier, rig.carrier);
        assert_eq!(other.report().dbp, 5.0);
    }

    #[test]
    fn checkpoint_values_survive_bit_for_bit() {
        let awkward = [0.1 + 0.2, 1.0 / 3.0, -2.0f64.sqrt(), 1e-300 * 7.0, std::f64::consts::PI * 1e12];
        let ck = RigCheckpoint {
            tire: TireKind::Flexible.name().to_string(),
            time: 0.1 * 3.0,
            pos: [awkward[0], awkward[1], awkward[2]],
            vel: [awkward[3], awkward[4], awkward[0]],
            angle: awkward[4],
            omega: awkward[1],
            force: [awkward[2], awkward[3], awkward[4]],
            moment: [awkward[1], awkward[0], awkward[3]],
            nodes: vec![[awkward[0], awkward[1]], [awkward[3], awkward[2]]],
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rig.json");
        ck.write(&path).unwrap();
        let back = RigCheckpoint::read(&path, TireKind::Flexible, 2).unwrap();
        let bits = |c: &RigCheckpoint| {
            let mut v = vec![c.time.to_bits(), c.angle.to_bits(), c.omega.to_bits()];
            for a in [c.pos, c.vel, c.force, c.moment] { v.extend(a.iter().map(|x| x.to_bits())); }
            v.extend(c.nodes.iter().flatten().map(|x| x.to_bits()));
            v
        };
        assert_eq!(bits(&back), bits(&ck));
    }
}
