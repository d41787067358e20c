use core::f64::consts::PI;
use rigcosim_core::{Scalar, Vec3};

use crate::contact::{ContactForceModel, ContactMaterial, ContactMethod, ContactModel, TangentialDisplacementModel};

const MIN_RESTITUTION: Scalar = 0.01;
const MAX_RESTITUTION: Scalar = 1.0 - 1e-6;
/// Characteristic impact speed for Hooke stiffness from material properties (m/s).
const CHAR_VEL: Scalar = 1.0;

/// Pair values after mixing two surfaces.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CompositeMaterial {
    pub method: ContactMethod,
    pub e_eff: Scalar,
    pub g_eff: Scalar,
    pub mu: Scalar,
    pub cr: Scalar,
    pub adhesion: Scalar,
    pub kn: Scalar,
    pub gn: Scalar,
    pub kt: Scalar,
    pub gt: Scalar,
}

#[inline]
fn recip_or_zero(x: Scalar) -> Scalar { if x > 0.0 { 1.0 / x } else { 0.0 } }

/// Symmetric mix: series elastic moduli, min friction/adhesion, mean restitution and coefficients.
pub fn composite(a: &ContactMaterial, b: &ContactMaterial) -> CompositeMaterial {
    let inv_e = (1.0 - a.poisson * a.poisson) * recip_or_zero(a.young)
        + (1.0 - b.poisson * b.poisson) * recip_or_zero(b.young);
    let inv_g = 2.0 * (2.0 - a.poisson) * (1.0 + a.poisson) * recip_or_zero(a.young)
        + 2.0 * (2.0 - b.poisson) * (1.0 + b.poisson) * recip_or_zero(b.young);
    let method = if a.method == ContactMethod::Nsc || b.method == ContactMethod::Nsc {
        ContactMethod::Nsc
    } else {
        ContactMethod::Smc
    };
    CompositeMaterial {
        method,
        e_eff: recip_or_zero(inv_e),
        g_eff: recip_or_zero(inv_g),
        mu: a.friction.min(b.friction),
        cr: 0.5 * (a.restitution + b.restitution),
        adhesion: a.adhesion.min(b.adhesion),
        kn: 0.5 * (a.kn + b.kn),
        gn: 0.5 * (a.gn + b.gn),
        kt: 0.5 * (a.kt + b.kt),
        gt: 0.5 * (a.gt + b.gt),
    }
}

/// Kinematics of one contact. `normal` points from the other surface into body A,
/// `rel_vel` is the velocity of A relative to the other surface at the contact point.
#[derive(Copy, Clone, Debug)]
pub struct ContactGeometry {
    pub normal: Vec3,
    pub overlap: Scalar,
    pub eff_radius: Scalar,
    pub eff_mass: Scalar,
    pub rel_vel: Vec3,
}

struct Coefficients { kn: Scalar, kt: Scalar, gn: Scalar, gt: Scalar }

fn coefficients(model: &ContactModel, mat: &CompositeMaterial, g: &ContactGeometry) -> Coefficients {
    // NSC surfaces go through the material-derived Hooke surrogate.
    let (force_model, use_mp) = match mat.method {
        ContactMethod::Nsc => (ContactForceModel::Hooke, true),
        ContactMethod::Smc => (model.force_model, model.use_material_properties),
    };
    let m = g.eff_mass;
    let loge = mat.cr.clamp(MIN_RESTITUTION, MAX_RESTITUTION).ln();
    match force_model {
        ContactForceModel::Hooke if use_mp => {
            let tmp_k = (16.0 / 15.0) * g.eff_radius.sqrt() * mat.e_eff;
            let tmp_g = 1.0 + (PI / loge).powi(2);
            let kn = if tmp_k > 0.0 { tmp_k * (m * CHAR_VEL * CHAR_VEL / tmp_k).powf(0.2) } else { 0.0 };
            let gn = (4.0 * m * kn / tmp_g).sqrt();
            Coefficients { kn, kt: kn, gn, gt: gn }
        }
        ContactForceModel::Hooke => Coefficients { kn: mat.kn, kt: mat.kt, gn: m * mat.gn, gt: m * mat.gt },
        ContactForceModel::Hertz => {
            let sqrt_rd = (g.eff_radius * g.overlap).max(0.0).sqrt();
            if use_mp {
                let sn = 2.0 * mat.e_eff * sqrt_rd;
                let st = 8.0 * mat.g_eff * sqrt_rd;
                let beta = loge / (loge * loge + PI * PI).sqrt();
                let c = -2.0 * (5.0_f64 / 6.0).sqrt() * beta;
                Coefficients {
                    kn: (2.0 / 3.0) * sn,
                    kt: st,
                    gn: c * (sn * m).sqrt(),
                    gt: c * (st * m).sqrt(),
                }
            } else {
                Coefficients {
                    kn: mat.kn * sqrt_rd,
                    kt: mat.kt * sqrt_rd,
                    gn: mat.gn * m * sqrt_rd,
                    gt: mat.gt * m * sqrt_rd,
                }
            }
        }
    }
}

/// Force on body A. `history` carries the tangential displacement between calls
/// for the multi-step model; it is rewritten on every call.
pub fn contact_force(
    model: &ContactModel,
    mat: &CompositeMaterial,
    g: &ContactGeometry,
    history: Option<&mut Vec3>,
    dt: Scalar,
) -> Vec3 {
    if g.overlap <= 0.0 {
        if let Some(h) = history { *h = Vec3::ZERO; }
        return Vec3::ZERO;
    }
    let c = coefficients(model, mat, g);
    let n = g.normal;
    let v_n = g.rel_vel.dot(n);
    let v_t = g.rel_vel - n * v_n;

    let f_n = c.kn * g.overlap - c.gn * v_n;
    if f_n <= 0.0 {
        // separating faster than the spring pushes
        if let Some(h) = history { *h = Vec3::ZERO; }
        return Vec3::ZERO;
    }

    let mut delta_t = match (model.tangential, history.as_deref()) {
        (TangentialDisplacementModel::None, _) => Vec3::ZERO,
        (TangentialDisplacementModel::MultiStep, Some(h)) => {
            let prev = *h - n * h.dot(n);
            prev + v_t * dt
        }
        _ => v_t * dt,
    };

    let mut f_t = -c.kt * delta_t - c.gt * v_t;
    let limit = mat.mu * f_n;
    let mag = f_t.length();
    if mag > limit {
        f_t *= if mag > 0.0 { limit / mag } else { 0.0 };
        if c.kt > 0.0 && model.tangential != TangentialDisplacementModel::None {
            delta_t = -(f_t + c.gt * v_t) / c.kt;
        }
    }
    if let Some(h) = history { *h = delta_t; }

    n * (f_n - mat.adhesion) + f_t
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets::{preset, MaterialPreset};

    fn geom(overlap: Scalar, rel_vel: Vec3) -> ContactGeometry {
        ContactGeometry { normal: Vec3::Z, overlap, eff_radius: 0.01, eff_mass: 0.05, rel_vel }
    }

    fn granular() -> CompositeMaterial {
        let m = preset(MaterialPreset::GranularSmc);
        composite(&m, &m)
    }

    #[test]
    fn no_overlap_no_force() {
        let model = ContactModel::default();
        let mut h = Vec3::X;
        let f = contact_force(&model, &granular(), &geom(-1e-4, Vec3::ZERO), Some(&mut h), 1e-4);
        assert_eq!(f, Vec3::ZERO);
        assert_eq!(h, Vec3::ZERO);
    }

    #[test]
    fn hertz_pushes_apart_and_stiffens() {
        let model = ContactModel::default();
        let mat = granular();
        let f1 = contact_force(&model, &mat, &geom(1e-4, Vec3::ZERO), None, 1e-4);
        let f2 = contact_force(&model, &mat, &geom(4e-4, Vec3::ZERO), None, 1e-4);
        assert!(f1.z > 0.0);
        // F ~ delta^1.5 for Hertz
        let ratio = f2.z / f1.z;
        assert!((ratio - 8.0).abs() < 1e-6, "ratio {ratio}");
    }

    #[test]
    fn friction_is_capped_by_coulomb() {
        let model = ContactModel { tangential: TangentialDisplacementModel::MultiStep, ..ContactModel::default() };
        let mat = granular();
        let mut h = Vec3::ZERO;
        let g = geom(2e-4, Vec3::new(5.0, 0.0, 0.0));
        let mut f = Vec3::ZERO;
        for _ in 0..50 { f = contact_force(&model, &mat, &g, Some(&mut h), 1e-3); }
        let ft = Vec3::new(f.x, f.y, 0.0).length();
        assert!(f.x < 0.0, "friction opposes sliding");
        assert!(ft <= mat.mu * f.z + 1e-9, "{ft} vs {}", mat.mu * f.z);
        assert!(h.length() > 0.0);
    }

    #[test]
    fn adhesion_reduces_normal_force() {
        let model = ContactModel::default();
        let base = preset(MaterialPreset::GranularSmc);
        let sticky = base.with_adhesion(0.5);
        let f0 = contact_force(&model, &composite(&base, &base), &geom(1e-4, Vec3::ZERO), None, 1e-4);
        let f1 = contact_force(&model, &composite(&sticky, &sticky), &geom(1e-4, Vec3::ZERO), None, 1e-4);
        assert!((f0.z - f1.z - 0.5).abs() < 1e-9);
        // adhesion of a pair is limited by the less sticky side
        let tire = preset(MaterialPreset::TireRubber);
        assert_eq!(composite(&tire, &sticky).adhesion, 0.0);
    }

    #[test]
    fn nsc_surrogate_produces_repulsion() {
        let m = ContactMaterial::nsc(0.9, 0.0, 0.0);
        let mat = composite(&m, &m);
        let f = contact_force(&ContactModel::default(), &mat, &geom(1e-4, Vec3::new(0.0, 0.0, -0.1)), None, 1e-4);
        assert!(f.z > 0.0);
    }
}
