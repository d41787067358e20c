//! Tire and rig configuration, including JSON tire descriptions.

use std::path::Path;

use serde::{Deserialize, Serialize};

use rigcosim_comm::TireInfo;
use rigcosim_core::{CosimError, CosimResult, IoContext, Scalar, TireKind, TriMesh};
use rigcosim_materials::{preset, ContactMaterial, MaterialPreset};

/// Tire description, loadable from a JSON file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TireSpec {
    /// Unloaded outer radius (m).
    pub radius: Scalar,
    /// Tread width (m).
    pub width: Scalar,
    /// Tire mass (kg).
    pub mass: Scalar,
    /// Mesh divisions around the circumference.
    pub divisions_circ: u32,
    /// Mesh rings across the tread.
    pub divisions_width: u32,
    /// Contact material of the tread.
    pub material: ContactMaterial,
    /// Radial structural stiffness per unit tread area (Pa/m).
    pub stiffness: Scalar,
    /// Radial damping per unit tread area (Pa s/m).
    pub damping: Scalar,
    /// Inflation pressure (Pa); only used when pressure is enabled.
    pub pressure: Scalar,
    /// Sidewall height the inflation pressure acts over (m).
    pub section_height: Scalar,
}

impl Default for TireSpec {
    fn default() -> Self {
        Self {
            radius: 0.47,
            width: 0.25,
            mass: 37.6,
            divisions_circ: 60,
            divisions_width: 5,
            material: preset(MaterialPreset::TireRubber),
            stiffness: 2e6,
            damping: 3e3,
            pressure: 200e3,
            section_height: 0.1,
        }
    }
}

impl TireSpec {
    /// Load a tire description. Missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> CosimResult<Self> {
        let text = std::fs::read_to_string(path).io_context(|| format!("read {}", path.display()))?;
        let spec: Self = serde_json::from_str(&text)
            .map_err(|e| CosimError::config(format!("invalid tire description in {}: {e}", path.display())))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Check the physical parameters.
    pub fn validate(&self) -> CosimResult<()> {
        if !(self.radius > 0.0 && self.width > 0.0 && self.mass > 0.0) {
            return Err(CosimError::config("tire radius, width and mass must be positive"));
        }
        if self.stiffness < 0.0 || self.damping < 0.0 || self.pressure < 0.0 || self.section_height <= 0.0 {
            return Err(CosimError::config("tire stiffness, damping and pressure cannot be negative"));
        }
        Ok(())
    }

    /// Tread mesh in the wheel frame.
    pub fn mesh(&self) -> CosimResult<TriMesh> {
        TriMesh::cylinder(self.radius, self.width, self.divisions_circ, self.divisions_width)
    }

    /// Static description sent to the terrain.
    pub fn tire_info(&self, kind: TireKind) -> CosimResult<TireInfo> {
        Ok(TireInfo {
            kind,
            radius: self.radius,
            width: self.width,
            mass: self.mass,
            mesh: self.mesh()?,
            material: self.material,
        })
    }
}

/// Masses of the rig bodies (kg).
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BodyMasses {
    /// Wheel rim.
    pub wheel: Scalar,
    /// Carrier and axle.
    pub carrier: Scalar,
    /// Ballast standing in for the vehicle share carried by the wheel.
    pub system: Scalar,
    /// Spindle.
    pub spindle: Scalar,
}

impl Default for BodyMasses {
    fn default() -> Self { Self { wheel: 1.0, carrier: 1.0, system: 200.0, spindle: 15.0 } }
}

impl BodyMasses {
    /// Mass loading the vertical degree of freedom, tire excluded.
    #[inline]
    pub fn total(&self) -> Scalar { self.wheel + self.carrier + self.system + self.spindle }
}

/// Everything the rig needs besides the terrain description.
#[derive(Clone, Debug)]
pub struct RigConfig {
    /// Rigid or flexible tire.
    pub tire_kind: TireKind,
    /// Tire geometry, material and structure.
    pub tire: TireSpec,
    /// Rig body masses.
    pub masses: BodyMasses,
    /// Prescribed forward speed of the carrier (m/s).
    pub init_vel: Scalar,
    /// Longitudinal slip the wheel spin is derived from.
    pub slip: Scalar,
    /// Moving-average window for the reported drawbar pull (s).
    pub dbp_window: Scalar,
    /// Add inflation pressure stiffness to the flexible tire.
    pub tire_pressure: bool,
    /// Worker threads of the flexible tire.
    pub threads: usize,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            tire_kind: TireKind::Rigid,
            tire: TireSpec::default(),
            masses: BodyMasses::default(),
            init_vel: 0.0,
            slip: 0.0,
            dbp_window: 0.2,
            tire_pressure: true,
            threads: 1,
        }
    }
}

impl RigConfig {
    /// Rig body masses.
    pub fn set_body_masses(&mut self, wheel: Scalar, carrier: Scalar, system: Scalar, spindle: Scalar) {
        self.masses = BodyMasses { wheel, carrier, system, spindle };
    }
    /// Drawbar-pull filter window (s).
    pub fn set_dbp_filter_window(&mut self, window: Scalar) { self.dbp_window = window; }
    /// Carrier speed and longitudinal slip.
    pub fn set_drive(&mut self, init_vel: Scalar, slip: Scalar) {
        self.init_vel = init_vel;
        self.slip = slip;
    }
    /// Replace the tire description with one read from JSON.
    pub fn set_tire_json_file(&mut self, path: &Path) -> CosimResult<()> {
        self.tire = TireSpec::from_json_file(path)?;
        Ok(())
    }
    /// Toggle inflation pressure on the flexible tire.
    pub fn enable_tire_pressure(&mut self, on: bool) { self.tire_pressure = on; }
    /// Worker threads of the tire model.
    pub fn set_threads(&mut self, n: usize) { self.threads = n.max(1); }

    /// Wheel spin rate for the prescribed speed and slip: `v / (R (1 - slip))`.
    pub fn spin_rate(&self) -> Scalar { self.init_vel / (self.tire.radius * (1.0 - self.slip)) }

    /// Reject settings the rig cannot run with.
    pub fn validate(&self) -> CosimResult<()> {
        self.tire.validate()?;
        if self.slip >= 1.0 {
            return Err(CosimError::config(format!("longitudinal slip {} must be below 1", self.slip)));
        }
        if self.init_vel < 0.0 {
            return Err(CosimError::config("initial velocity cannot be negative"));
        }
        let m = &self.masses;
        if !(m.wheel > 0.0 && m.carrier > 0.0 && m.system >= 0.0 && m.spindle > 0.0) {
            return Err(CosimError::config("rig body masses must be positive"));
        }
        if self.dbp_window <= 0.0 {
            return Err(CosimError::config("drawbar pull filter window must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rig_matches_the_test_stand() {
        let c = RigConfig::default();
        assert_eq!(c.masses, BodyMasses { wheel: 1.0, carrier: 1.0, system: 200.0, spindle: 15.0 });
        assert_eq!(c.masses.total(), 217.0);
        assert_eq!(c.dbp_window, 0.2);
        assert!(c.tire_pressure);
        c.validate().unwrap();
    }

    #[test]
    fn spin_rate_follows_slip() {
        let mut c = RigConfig::default();
        c.set_drive(1.0, 0.2);
        assert!((c.spin_rate() - 1.0 / (0.47 * 0.8)).abs() < 1e-12);
        c.validate().unwrap();
        c.set_drive(1.0, 1.0);
        assert!(matches!(c.validate(), Err(CosimError::Configuration(_))));
    }

    #[test]
    fn tire_json_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("tire.json");
        std::fs::write(&p, r#"{ "radius": 0.3, "material": { "friction": 0.7 } }"#).unwrap();
        let spec = TireSpec::from_json_file(&p).unwrap();
        assert_eq!(spec.radius, 0.3);
        assert_eq!(spec.width, 0.25);
        assert_eq!(spec.material.friction, 0.7);
        std::fs::write(&p, r#"{ "radius": -1.0 }"#).unwrap();
        assert!(matches!(TireSpec::from_json_file(&p), Err(CosimError::Configuration(_))));
        let info = TireSpec::default().tire_info(TireKind::Flexible).unwrap();
        assert_eq!(info.mesh.num_vertices(), 300);
    }
}
