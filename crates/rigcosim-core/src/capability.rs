use std::collections::BTreeMap;

use crate::ids::{TerrainKind, TireKind};
use crate::{CosimError, CosimResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unavailable(String),
}

/// Which backend variants this process can run, decided at launch time.
#[derive(Clone, Debug)]
pub struct CapabilityRegistry {
    terrain: BTreeMap<TerrainKind, Availability>,
    tire: BTreeMap<TireKind, Availability>,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self {
            terrain: TerrainKind::ALL.iter().map(|&k| (k, Availability::Available)).collect(),
            tire: TireKind::ALL.iter().map(|&k| (k, Availability::Available)).collect(),
        }
    }
}

impl CapabilityRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn set_terrain(&mut self, kind: TerrainKind, a: Availability) { self.terrain.insert(kind, a); }
    pub fn set_tire(&mut self, kind: TireKind, a: Availability) { self.tire.insert(kind, a); }

    pub fn disable_terrain(&mut self, kind: TerrainKind, reason: impl Into<String>) {
        self.set_terrain(kind, Availability::Unavailable(reason.into()));
    }
    pub fn disable_tire(&mut self, kind: TireKind, reason: impl Into<String>) {
        self.set_tire(kind, Availability::Unavailable(reason.into()));
    }

    pub fn terrain(&self, kind: TerrainKind) -> &Availability {
        self.terrain.get(&kind).unwrap_or(&Availability::Available)
    }
    pub fn tire(&self, kind: TireKind) -> &Availability {
        self.tire.get(&kind).unwrap_or(&Availability::Available)
    }

    pub fn require_terrain(&self, kind: TerrainKind) -> CosimResult<()> {
        match self.terrain(kind) {
            Availability::Available => Ok(()),
            Availability::Unavailable(why) => Err(CosimError::config(format!(
                "terrain variant {kind} is not available in this build: {why}"))),
        }
    }
    pub fn require_tire(&self, kind: TireKind) -> CosimResult<()> {
        match self.tire(kind) {
            Availability::Available => Ok(()),
            Availability::Unavailable(why) => Err(CosimError::config(format!(
                "tire variant {kind} is not available in this build: {why}"))),
        }
    }

    pub fn available_terrains(&self) -> Vec<TerrainKind> {
        self.terrain.iter().filter(|(_, a)| **a == Availability::Available).map(|(&k, _)| k).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_variant_is_a_configuration_error() {
        let mut reg = CapabilityRegistry::new();
        reg.require_terrain(TerrainKind::GranularGpu).unwrap();
        reg.disable_terrain(TerrainKind::GranularGpu, "no device");
        let err = reg.require_terrain(TerrainKind::GranularGpu).unwrap_err();
        assert!(matches!(err, CosimError::Configuration(ref m) if m.contains("no device")));
        assert_eq!(reg.available_terrains().len(), 4);
        reg.require_tire(TireKind::Flexible).unwrap();
    }
}
