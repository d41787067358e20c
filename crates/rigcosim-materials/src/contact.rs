use core::f64::consts::PI;
use serde::{Deserialize, Serialize};
use rigcosim_core::{Scalar, StepHasher};

/// Contact formulation requested by a participant.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ContactMethod {
    /// Smooth (penalty) contact.
    Smc = 0,
    /// Non-smooth (complementarity) contact; evaluated through a stiff penalty surrogate.
    Nsc = 1,
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ContactForceModel { Hooke = 0, Hertz = 1 }

#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum TangentialDisplacementModel {
    /// Tangential force from relative sliding velocity only.
    None = 0,
    /// Displacement from the current step only.
    OneStep = 1,
    /// Displacement accumulated over the life of a contact.
    MultiStep = 2,
}

/// Surface description one participant owns.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactMaterial {
    pub method: ContactMethod,
    pub friction: Scalar,
    pub restitution: Scalar,
    /// Young's modulus (Pa).
    pub young: Scalar,
    pub poisson: Scalar,
    /// Constant adhesion force (N), subtracted from the normal force.
    pub adhesion: Scalar,
    pub kn: Scalar,
    pub gn: Scalar,
    pub kt: Scalar,
    pub gt: Scalar,
}

impl Default for ContactMaterial {
    fn default() -> Self {
        Self {
            method: ContactMethod::Smc,
            friction: 0.6,
            restitution: 0.4,
            young: 2e5,
            poisson: 0.3,
            adhesion: 0.0,
            kn: 2e5,
            gn: 40.0,
            kt: 2e5,
            gt: 20.0,
        }
    }
}

impl ContactMaterial {
    /// Non-smooth material: friction, restitution and cohesion only.
    pub fn nsc(friction: Scalar, restitution: Scalar, cohesion: Scalar) -> Self {
        Self { method: ContactMethod::Nsc, friction, restitution, adhesion: cohesion, ..Self::default() }
    }

    pub fn with_adhesion(mut self, adhesion: Scalar) -> Self { self.adhesion = adhesion; self }

    pub fn hash_into(&self, h: &mut StepHasher) {
        h.update_u32(self.method as u32);
        for v in [self.friction, self.restitution, self.young, self.poisson, self.adhesion,
                  self.kn, self.gn, self.kt, self.gt] {
            h.update_f64(v);
        }
    }

    /// Flat real encoding, in field order (method excluded).
    pub fn to_reals(&self) -> [Scalar; 9] {
        [self.friction, self.restitution, self.young, self.poisson, self.adhesion,
         self.kn, self.gn, self.kt, self.gt]
    }

    pub fn from_reals(method: ContactMethod, r: [Scalar; 9]) -> Self {
        let [friction, restitution, young, poisson, adhesion, kn, gn, kt, gt] = r;
        Self { method, friction, restitution, young, poisson, adhesion, kn, gn, kt, gt }
    }
}

impl ContactMethod {
    pub fn from_u32(v: u32) -> Option<Self> {
        match v { 0 => Some(Self::Smc), 1 => Some(Self::Nsc), _ => None }
    }
}

/// System-wide settings of the smooth-contact law.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactModel {
    pub force_model: ContactForceModel,
    pub tangential: TangentialDisplacementModel,
    /// Derive stiffness/damping from Young's modulus, Poisson ratio and restitution.
    pub use_material_properties: bool,
}

impl Default for ContactModel {
    fn default() -> Self {
        Self {
            force_model: ContactForceModel::Hertz,
            tangential: TangentialDisplacementModel::OneStep,
            use_material_properties: true,
        }
    }
}

impl ContactModel {
    pub fn hash_into(&self, h: &mut StepHasher) {
        h.update_u32(self.force_model as u32);
        h.update_u32(self.tangential as u32);
        h.update_u32(self.use_material_properties as u32);
    }
}

/// Cohesive force for a particle of `radius` under cohesion `pressure`: pi * r^2 * p.
#[inline]
pub fn cohesion_force(radius: Scalar, pressure: Scalar) -> Scalar {
    PI * radius * radius * pressure
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cohesion_matches_reference_value() {
        let f = cohesion_force(0.02, 8e4);
        assert!((f - 100.530_964_914_873_4).abs() < 1e-9, "{f}");
        assert_eq!(cohesion_force(0.02, 0.0), 0.0);
    }

    #[test]
    fn material_reads_partial_json() {
        let m: ContactMaterial = serde_json::from_str(r#"{ "friction": 0.9, "young": 8e5 }"#).unwrap();
        assert_eq!(m.friction, 0.9);
        assert_eq!(m.young, 8e5);
        assert_eq!(m.method, ContactMethod::Smc);
        assert_eq!(ContactMaterial::from_reals(m.method, m.to_reals()), m);
    }

    #[test]
    fn fingerprint_tracks_every_field() {
        let a = ContactMaterial::default();
        let b = a.with_adhesion(1.0);
        let mut ha = StepHasher::new(); a.hash_into(&mut ha);
        let mut hb = StepHasher::new(); b.hash_into(&mut hb);
        assert_ne!(ha.finalize(), hb.finalize());
    }
}
