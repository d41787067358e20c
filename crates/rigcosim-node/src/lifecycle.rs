use core::fmt;

use rigcosim_core::{CosimError, CosimResult};

/// `Created → Initialized → Running → Finalized`
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NodeState { Created, Initialized, Running, Finalized }

impl NodeState {
    pub fn name(self) -> &'static str {
        match self {
            NodeState::Created => "created",
            NodeState::Initialized => "initialized",
            NodeState::Running => "running",
            NodeState::Finalized => "finalized",
        }
    }

    /// Lifecycle error unless the node is in one of `allowed`.
    pub fn require(self, op: &'static str, allowed: &[NodeState]) -> CosimResult<()> {
        if allowed.contains(&self) { Ok(()) } else { Err(CosimError::Lifecycle { op, state: self.name() }) }
    }

    /// States in which the coupled run may proceed.
    pub const ACTIVE: [NodeState; 2] = [NodeState::Initialized, NodeState::Running];
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}
