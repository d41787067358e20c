#![deny(missing_docs)]
//! Rig side of the wheel-rig co-simulation: a single driven wheel on a
//! vertically free carrier.
//!
//! Usage:
//! - build a backend with [`create_rig`] from a [`RigConfig`].
//! - hand it the terrain description once ([`RigBackend::initialize`]).
//! - each coupling step: send [`RigBackend::tire_state`], apply the returned
//!   [`ContactLoad`], then [`RigBackend::advance`].

pub mod config;
pub mod filter;
pub mod wheel;
pub mod rigid;
pub mod flexible;

use std::path::Path;

use tracing::info;

use rigcosim_comm::{ContactLoad, TerrainInfo, TireInfo, TireState};
use rigcosim_core::{CapabilityRegistry, CosimResult, Scalar, TireKind};

pub use config::{BodyMasses, RigConfig, TireSpec};
pub use filter::DbpFilter;
pub use flexible::FlexibleTire;
pub use rigid::RigidTire;
pub use wheel::{Carrier, RigCheckpoint, RigReport, REPORT_HEADER};

/// Contract both tire variants fulfil toward the rig node.
pub trait RigBackend: Send {
    /// Tire variant.
    fn kind(&self) -> TireKind;
    /// Configuration the rig was built with.
    fn config(&self) -> &RigConfig;
    /// Static tire description sent to the terrain.
    fn tire_info(&self) -> &TireInfo;

    /// Place the wheel on the terrain; called once before the first step.
    fn initialize(&mut self, terrain: &TerrainInfo) -> CosimResult<()>;

    /// Kinematic state for the coming step.
    fn tire_state(&self) -> CosimResult<TireState>;

    /// Terrain reaction to use during the coming advance.
    fn apply_contact(&mut self, load: &ContactLoad) -> CosimResult<()>;

    /// Integrate the rig over `dt`.
    fn advance(&mut self, dt: Scalar) -> CosimResult<()>;
    /// Rig time (s).
    fn time(&self) -> Scalar;

    /// Current diagnostic sample.
    fn report(&self) -> RigReport;

    /// Per-frame files besides the results line.
    fn output(&self, _frame: u64, _dir: &Path) -> CosimResult<()> { Ok(()) }

    /// Persist the rig state.
    fn write_checkpoint(&self, path: &Path) -> CosimResult<()>;
    /// Restore a state written by [`RigBackend::write_checkpoint`].
    fn read_checkpoint(&mut self, path: &Path) -> CosimResult<()>;
}

/// Build the requested tire after checking it is available in this process.
pub fn create_rig(cfg: RigConfig, caps: &CapabilityRegistry) -> CosimResult<Box<dyn RigBackend>> {
    caps.require_tire(cfg.tire_kind)?;
    cfg.validate()?;
    info!(
        tire = %cfg.tire_kind, radius = cfg.tire.radius, init_vel = cfg.init_vel, slip = cfg.slip,
        mass = cfg.masses.total() + cfg.tire.mass, "creating rig"
    );
    Ok(match cfg.tire_kind {
        TireKind::Rigid => Box::new(RigidTire::new(cfg)?),
        TireKind::Flexible => Box::new(FlexibleTire::new(cfg)?),
    })
}
