use crate::contact::ContactMaterial;

/// Material catalog used by the stock rig and terrain setups.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MaterialPreset {
    TireRubber,
    RigidTerrain,
    ScmSoil,
    GranularSmc,
    GranularNsc,
    SphSoil,
}

pub fn preset(id: MaterialPreset) -> ContactMaterial {
    use MaterialPreset::*;
    match id {
        TireRubber   => ContactMaterial { friction: 0.9, restitution: 0.1, young: 2e7, poisson: 0.3, kn: 2e5, gn: 40.0, kt: 2e5, gt: 20.0, ..ContactMaterial::default() },
        RigidTerrain => ContactMaterial { friction: 0.9, restitution: 0.0, young: 8e5, poisson: 0.3, kn: 1e6, gn: 6e1, kt: 4e5, gt: 4e1, ..ContactMaterial::default() },
        ScmSoil      => ContactMaterial { friction: 0.9, restitution: 0.0, young: 2e6, poisson: 0.3, kn: 1e6, gn: 6e1, kt: 4e5, gt: 4e1, ..ContactMaterial::default() },
        GranularSmc  => ContactMaterial { friction: 0.9, restitution: 0.0, young: 8e5, poisson: 0.3, kn: 1e7, gn: 1e4, kt: 1e7, gt: 1e4, ..ContactMaterial::default() },
        GranularNsc  => ContactMaterial::nsc(0.9, 0.0, 0.0),
        SphSoil      => ContactMaterial { friction: 0.8, restitution: 0.0, young: 1e6, poisson: 0.3, kn: 1e6, gn: 1e3, kt: 1e6, gt: 1e3, ..ContactMaterial::default() },
    }
}
