//! Co-simulation nodes and the fixed-step driver.
//!
//! A run has exactly two participants: the [`RigNode`] on rank 0 and the
//! [`TerrainNode`] on rank 1. Both go through the same lifecycle
//! (`Created → Initialized → Running → Finalized`) driven by [`run_cosim`]:
//!
//! 1. initialize: terrain sends its description, rig answers with the tire;
//! 2. per step k: barrier(k), synchronize(k), advance, optional output;
//! 3. `checkpoint_end.dat` after the last step.
//!
//! Terrain forces lag the rig kinematics by one coupling step.

pub mod lifecycle;
pub mod base;
pub mod node;
pub mod rig_node;
pub mod terrain_node;
pub mod driver;
pub mod layout;
pub mod launch;

pub use base::{NodeBase, RESULTS_FILE};
pub use driver::{run_cosim, DriverConfig, RunSummary, CHECKPOINT_END};
pub use launch::{build_rig_node, build_terrain_node, run_loopback, run_tcp, RunConfig};
pub use layout::CosimLayout;
pub use lifecycle::NodeState;
pub use node::CosimNode;
pub use rig_node::RigNode;
pub use terrain_node::TerrainNode;
