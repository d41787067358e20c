use rigcosim_comm::{MeshState, TireInfo};
use rigcosim_core::{CosimError, CosimResult, Scalar, Vec3};

use crate::config::ProxyConfig;

/// Terrain-side stand-in for the tire: one proxy per mesh vertex.
#[derive(Clone, Debug)]
pub struct TireProxies {
    pub tire: TireInfo,
    pub areas: Vec<Scalar>,
    pub state: MeshState,
    /// Force exerted by the terrain on each vertex during the last advance.
    pub forces: Vec<Vec3>,
    radius: Scalar,
    fixed: bool,
}

impl TireProxies {
    pub fn new(tire: &TireInfo, cfg: &ProxyConfig) -> Self {
        let nv = tire.mesh.num_vertices();
        Self {
            tire: tire.clone(),
            areas: tire.mesh.vertex_areas(),
            state: MeshState { vpos: tire.mesh.vertices.clone(), vvel: vec![Vec3::ZERO; nv] },
            forces: vec![Vec3::ZERO; nv],
            radius: cfg.contact_radius,
            fixed: cfg.fixed,
        }
    }

    #[inline] pub fn len(&self) -> usize { self.forces.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.forces.is_empty() }
    #[inline] pub fn radius(&self) -> Scalar { self.radius }
    #[inline] pub fn vertex_mass(&self) -> Scalar { self.tire.vertex_mass() }

    pub fn update(&mut self, st: &MeshState) -> CosimResult<()> {
        if st.vpos.len() != self.len() || st.vvel.len() != self.len() {
            return Err(CosimError::protocol(format!(
                "terrain expects {} proxies, tire state has {}", self.len(), st.vpos.len())));
        }
        self.state.vpos.clone_from(&st.vpos);
        self.state.vvel.clone_from(&st.vvel);
        Ok(())
    }

    /// Proxy position `tau` seconds into the current coupling step.
    #[inline]
    pub fn position(&self, i: usize, tau: Scalar) -> Vec3 {
        if self.fixed { self.state.vpos[i] } else { self.state.vpos[i] + self.state.vvel[i] * tau }
    }

    #[inline] pub fn velocity(&self, i: usize) -> Vec3 { self.state.vvel[i] }

    pub fn clear_forces(&mut self) { self.forces.iter_mut().for_each(|f| *f = Vec3::ZERO); }

    pub fn scale_forces(&mut self, s: Scalar) { self.forces.iter_mut().for_each(|f| *f *= s); }

    pub fn num_loaded(&self) -> usize { self.forces.iter().filter(|f| **f != Vec3::ZERO).count() }

    pub fn total_force(&self) -> Vec3 { self.forces.iter().copied().sum() }
}
