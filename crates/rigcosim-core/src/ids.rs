use core::fmt;

/// Exactly two participants take part in a run.
pub const NUM_PARTICIPANTS: usize = 2;
pub const RIG_NODE_RANK: usize = 0;
pub const TERRAIN_NODE_RANK: usize = 1;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum NodeRole { Rig, Terrain }

impl NodeRole {
    pub fn from_rank(rank: usize) -> Option<Self> {
        match rank {
            RIG_NODE_RANK => Some(NodeRole::Rig),
            TERRAIN_NODE_RANK => Some(NodeRole::Terrain),
            _ => None,
        }
    }
    #[inline] pub fn rank(self) -> usize {
        match self { NodeRole::Rig => RIG_NODE_RANK, NodeRole::Terrain => TERRAIN_NODE_RANK }
    }
    #[inline] pub fn peer(self) -> Self {
        match self { NodeRole::Rig => NodeRole::Terrain, NodeRole::Terrain => NodeRole::Rig }
    }
    /// Name of the per-node output subdirectory.
    pub fn name(self) -> &'static str {
        match self { NodeRole::Rig => "RIG", NodeRole::Terrain => "TERRAIN" }
    }
}
impl fmt::Display for NodeRole { fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) } }

/// Terrain variants, numbered as on the command line.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum TerrainKind { Rigid = 0, Scm = 1, GranularCpu = 2, GranularGpu = 3, GranularSph = 4 }

impl TerrainKind {
    pub const ALL: [TerrainKind; 5] = [
        TerrainKind::Rigid, TerrainKind::Scm, TerrainKind::GranularCpu,
        TerrainKind::GranularGpu, TerrainKind::GranularSph,
    ];
    pub fn from_index(i: u32) -> Option<Self> {
        Self::ALL.get(i as usize).copied()
    }
    #[inline] pub fn index(self) -> u8 { self as u8 }
    pub fn name(self) -> &'static str {
        match self {
            TerrainKind::Rigid => "RIGID",
            TerrainKind::Scm => "SCM",
            TerrainKind::GranularCpu => "GRANULAR_OMP",
            TerrainKind::GranularGpu => "GRANULAR_GPU",
            TerrainKind::GranularSph => "GRANULAR_SPH",
        }
    }
    /// Granular variants need a settling phase (or a settled checkpoint) before coupling.
    #[inline] pub fn is_granular(self) -> bool {
        matches!(self, TerrainKind::GranularCpu | TerrainKind::GranularGpu | TerrainKind::GranularSph)
    }
}
impl fmt::Display for TerrainKind { fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) } }

#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum TireKind { Rigid = 0, Flexible = 1 }

impl TireKind {
    pub const ALL: [TireKind; 2] = [TireKind::Rigid, TireKind::Flexible];
    pub fn from_index(i: u32) -> Option<Self> { Self::ALL.get(i as usize).copied() }
    #[inline] pub fn index(self) -> u8 { self as u8 }
    pub fn name(self) -> &'static str {
        match self { TireKind::Rigid => "RIGID", TireKind::Flexible => "FLEXIBLE" }
    }
}
impl fmt::Display for TireKind { fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) } }
