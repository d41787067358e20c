use std::path::{Path, PathBuf};

use rigcosim_core::{NodeRole, TerrainKind, TireKind};
use rigcosim_terrain::CHECKPOINT_SETTLED;

/// `<root>/RIG_COSIM/<tire>_<terrain><suffix>/{RIG,TERRAIN}`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CosimLayout {
    run_dir: PathBuf,
}

impl CosimLayout {
    pub fn new(output_root: &Path, tire: TireKind, terrain: TerrainKind, suffix: &str) -> Self {
        let name = format!("{}_{}{suffix}", tire.name(), terrain.name());
        Self { run_dir: output_root.join("RIG_COSIM").join(name) }
    }

    #[inline] pub fn run_dir(&self) -> &Path { &self.run_dir }

    pub fn node_dir(&self, role: NodeRole) -> PathBuf { self.run_dir.join(role.name()) }

    /// Where the terrain node leaves its settled bed.
    pub fn settled_checkpoint(&self) -> PathBuf { self.node_dir(NodeRole::Terrain).join(CHECKPOINT_SETTLED) }
}
