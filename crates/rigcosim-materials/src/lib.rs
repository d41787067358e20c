//! Contact materials shared by the tire and every terrain variant.
//!
//! `ContactMaterial` is what a participant declares for its surface,
//! `composite` mixes two of them into the pair values the force law uses,
//! and `contact_force` evaluates the smooth (penalty) contact law.

pub mod contact;
pub mod smc;
pub mod presets;

pub use contact::{
    cohesion_force, ContactMaterial, ContactMethod, ContactForceModel, ContactModel,
    TangentialDisplacementModel,
};
pub use smc::{composite, contact_force, CompositeMaterial, ContactGeometry};
pub use presets::{preset, MaterialPreset};
