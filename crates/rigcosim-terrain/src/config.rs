use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use rigcosim_core::{CosimError, CosimResult, IoContext, Scalar, TerrainKind};
use rigcosim_materials::{ContactMaterial, ContactModel};

/// How the terrain represents tire vertices.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ProxyConfig {
    /// Fixed proxies hold the synchronized position for the whole step;
    /// free proxies move with the synchronized vertex velocity.
    pub fixed: bool,
    pub contact_radius: Scalar,
}

impl Default for ProxyConfig {
    fn default() -> Self { Self { fixed: false, contact_radius: 0.002 } }
}

/// Runtime visualization side channel. Never feeds back into the physics.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct RenderConfig {
    pub enabled: bool,
    pub fps: Scalar,
}

/// Settings every terrain variant shares.
#[derive(Clone, Debug)]
pub struct TerrainConfig {
    pub patch_length: Scalar,
    pub patch_width: Scalar,
    pub proxy: ProxyConfig,
    pub material: ContactMaterial,
    pub model: ContactModel,
    pub render: RenderConfig,
    /// Restore this checkpoint instead of building (and settling) a fresh terrain.
    pub checkpoint_input: Option<PathBuf>,
    pub threads: usize,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            patch_length: 10.0,
            patch_width: 1.0,
            proxy: ProxyConfig::default(),
            material: ContactMaterial::default(),
            model: ContactModel::default(),
            render: RenderConfig::default(),
            checkpoint_input: None,
            threads: 1,
        }
    }
}

impl TerrainConfig {
    pub fn set_patch_dimensions(&mut self, length: Scalar, width: Scalar) {
        self.patch_length = length;
        self.patch_width = width;
    }
    pub fn set_proxy_fixed(&mut self, fixed: bool) { self.proxy.fixed = fixed; }
    pub fn set_proxy_contact_radius(&mut self, r: Scalar) { self.proxy.contact_radius = r; }
    pub fn set_material_surface(&mut self, material: ContactMaterial, model: ContactModel) {
        self.material = material;
        self.model = model;
    }
    pub fn enable_runtime_visualization(&mut self, enabled: bool, fps: Scalar) {
        self.render = RenderConfig { enabled, fps };
    }
    pub fn set_input_from_checkpoint(&mut self, path: impl Into<PathBuf>) {
        self.checkpoint_input = Some(path.into());
    }
    pub fn set_threads(&mut self, n: usize) { self.threads = n.max(1); }

    pub fn validate(&self) -> CosimResult<()> {
        if !(self.patch_length > 0.0 && self.patch_width > 0.0) {
            return Err(CosimError::config("terrain patch dimensions must be positive"));
        }
        if self.proxy.contact_radius < 0.0 {
            return Err(CosimError::config("proxy contact radius cannot be negative"));
        }
        if self.render.enabled && self.render.fps <= 0.0 {
            return Err(CosimError::config("render fps must be positive"));
        }
        Ok(())
    }

    #[inline] pub fn half_length(&self) -> Scalar { 0.5 * self.patch_length }
    #[inline] pub fn half_width(&self) -> Scalar { 0.5 * self.patch_width }
}

/// Particle arrangement used to fill a granular container.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SamplingMethod {
    PoissonDisk,
    HcpPack,
    RegularGrid,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SettlingConfig {
    /// Simulated settling duration (s).
    pub time: Scalar,
    pub step_size: Scalar,
    pub output: bool,
    pub fps: Scalar,
    /// Stop early once the bed's kinetic energy drops below this (J).
    pub max_kinetic_energy: Option<Scalar>,
}

impl Default for SettlingConfig {
    fn default() -> Self {
        Self { time: 0.4, step_size: 1e-4, output: false, fps: 100.0, max_kinetic_energy: None }
    }
}

/// Particle bed setup shared by the three granular variants.
#[derive(Clone, Debug, PartialEq)]
pub struct GranularConfig {
    pub radius: Scalar,
    pub density: Scalar,
    pub sampling: SamplingMethod,
    pub volume_fraction: Scalar,
    pub randomize: bool,
    pub seed: u64,
    pub initial_depth: Scalar,
    pub wall_thickness: Scalar,
    pub settling: SettlingConfig,
    /// Largest internal step; coupling steps are subdivided to respect it.
    pub max_step: Scalar,
}

impl Default for GranularConfig {
    fn default() -> Self {
        Self {
            radius: 0.02,
            density: 2500.0,
            sampling: SamplingMethod::PoissonDisk,
            volume_fraction: 0.5,
            randomize: true,
            seed: 0x5EED_CAFE,
            initial_depth: 0.2,
            wall_thickness: 0.1,
            settling: SettlingConfig::default(),
            max_step: 1e-4,
        }
    }
}

impl GranularConfig {
    pub fn set_granular_material(&mut self, radius: Scalar, density: Scalar) {
        self.radius = radius;
        self.density = density;
    }
    pub fn set_sampling_method(&mut self, method: SamplingMethod, volume_fraction: Scalar, randomize: bool) {
        self.sampling = method;
        self.volume_fraction = volume_fraction;
        self.randomize = randomize;
    }
    pub fn set_settling_time(&mut self, t: Scalar) { self.settling.time = t; }
    pub fn enable_settling_output(&mut self, enabled: bool, fps: Scalar) {
        self.settling.output = enabled;
        self.settling.fps = fps;
    }
    pub fn set_initial_depth(&mut self, depth: Scalar) { self.initial_depth = depth; }
    pub fn set_wall_thickness(&mut self, t: Scalar) { self.wall_thickness = t; }

    pub fn validate(&self, patch: &TerrainConfig) -> CosimResult<()> {
        if !(self.radius > 0.0 && self.density > 0.0) {
            return Err(CosimError::config("granular radius and density must be positive"));
        }
        if !(self.volume_fraction > 0.0 && self.volume_fraction <= 0.74) {
            return Err(CosimError::config(format!(
                "volume fraction {} outside (0, 0.74]", self.volume_fraction)));
        }
        if self.initial_depth < 2.0 * self.radius {
            return Err(CosimError::config("initial depth must hold at least one particle layer"));
        }
        if patch.patch_length < 2.0 * self.radius || patch.patch_width < 2.0 * self.radius {
            return Err(CosimError::config("patch is smaller than one particle"));
        }
        if !(self.settling.step_size > 0.0 && self.max_step > 0.0) || self.settling.time < 0.0 {
            return Err(CosimError::config("settling time and step sizes must be positive"));
        }
        Ok(())
    }
}

/// Soil parameters of the deformable (SCM) terrain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScmParams {
    /// Grid spacing (m).
    pub grid_spacing: Scalar,
    /// Bekker frictional modulus (Pa/m^n).
    pub kphi: Scalar,
    /// Bekker cohesive modulus (Pa/m^(n-1)).
    pub kc: Scalar,
    /// Bekker exponent.
    pub n: Scalar,
    /// Mohr-Coulomb cohesion (Pa).
    pub cohesion: Scalar,
    pub friction_deg: Scalar,
    /// Janosi-Hanamoto shear coefficient (m).
    pub janosi: Scalar,
    /// Elastic stiffness (Pa/m).
    pub elastic_k: Scalar,
    /// Vertical damping (Pa s/m).
    pub damping: Scalar,
}

impl Default for ScmParams {
    fn default() -> Self {
        Self {
            grid_spacing: 5e-2,
            kphi: 0.2e6,
            kc: 0.0,
            n: 1.1,
            cohesion: 0.0,
            friction_deg: 30.0,
            janosi: 0.01,
            elastic_k: 4e7,
            damping: 3e4,
        }
    }
}

impl ScmParams {
    pub fn validate(&self) -> CosimResult<()> {
        if !(self.grid_spacing > 0.0 && self.janosi > 0.0 && self.elastic_k > 0.0 && self.n > 0.0) {
            return Err(CosimError::config("SCM spacing, Janosi coefficient, stiffness and exponent must be positive"));
        }
        Ok(())
    }
}

/// Weakly compressible SPH parameters of the continuum granular terrain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SphParams {
    /// Smoothing length as a multiple of the initial spacing.
    pub kernel_factor: Scalar,
    /// Artificial speed of sound (m/s).
    pub sound_speed: Scalar,
    /// Tait exponent.
    pub gamma: Scalar,
    /// Monaghan artificial viscosity.
    pub alpha: Scalar,
}

impl Default for SphParams {
    fn default() -> Self { Self { kernel_factor: 1.2, sound_speed: 10.0, gamma: 7.0, alpha: 0.5 } }
}

impl SphParams {
    pub fn from_json_file(path: &Path) -> CosimResult<Self> {
        let text = std::fs::read_to_string(path).io_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&text)
            .map_err(|e| CosimError::config(format!("invalid SPH parameters in {}: {e}", path.display())))
    }

    pub fn validate(&self) -> CosimResult<()> {
        if !(self.kernel_factor > 0.0 && self.sound_speed > 0.0 && self.gamma > 0.0 && self.alpha >= 0.0) {
            return Err(CosimError::config("SPH parameters must be positive"));
        }
        Ok(())
    }
}

/// Variant selection plus the variant-specific configuration.
#[derive(Clone, Debug)]
pub enum TerrainSetup {
    Rigid,
    Scm(ScmParams),
    GranularCpu(GranularConfig),
    GranularGpu(GranularConfig),
    GranularSph(GranularConfig, SphParams),
}

impl TerrainSetup {
    pub fn kind(&self) -> TerrainKind {
        match self {
            TerrainSetup::Rigid => TerrainKind::Rigid,
            TerrainSetup::Scm(_) => TerrainKind::Scm,
            TerrainSetup::GranularCpu(_) => TerrainKind::GranularCpu,
            TerrainSetup::GranularGpu(_) => TerrainKind::GranularGpu,
            TerrainSetup::GranularSph(..) => TerrainKind::GranularSph,
        }
    }

    pub fn granular_mut(&mut self) -> Option<&mut GranularConfig> {
        match self {
            TerrainSetup::GranularCpu(g) | TerrainSetup::GranularGpu(g) | TerrainSetup::GranularSph(g, _) => Some(g),
            _ => None,
        }
    }

    pub fn set_properties_scm(&mut self, params: ScmParams) -> CosimResult<()> {
        params.validate()?;
        match self {
            TerrainSetup::Scm(p) => {
                *p = params;
                Ok(())
            }
            other => Err(CosimError::config(format!("SCM properties do not apply to {} terrain", other.kind()))),
        }
    }

    pub fn set_properties_sph(&mut self, params: SphParams) -> CosimResult<()> {
        params.validate()?;
        match self {
            TerrainSetup::GranularSph(_, p) => {
                *p = params;
                Ok(())
            }
            other => Err(CosimError::config(format!("SPH properties do not apply to {} terrain", other.kind()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granular_validation() {
        let t = TerrainConfig::default();
        let mut g = GranularConfig::default();
        g.validate(&t).unwrap();
        g.set_sampling_method(SamplingMethod::HcpPack, 0.9, false);
        assert!(g.validate(&t).is_err());
        g.set_sampling_method(SamplingMethod::HcpPack, 0.5, false);
        g.set_initial_depth(0.01);
        assert!(g.validate(&t).is_err());
    }

    #[test]
    fn variant_properties_only_apply_to_their_terrain() {
        let mut scm = TerrainSetup::Scm(ScmParams::default());
        let soft = ScmParams { kphi: 0.1e6, ..ScmParams::default() };
        scm.set_properties_scm(soft.clone()).unwrap();
        assert!(matches!(&scm, TerrainSetup::Scm(p) if *p == soft));
        assert!(matches!(scm.set_properties_sph(SphParams::default()), Err(CosimError::Configuration(_))));

        let mut rigid = TerrainSetup::Rigid;
        assert!(matches!(rigid.set_properties_scm(ScmParams::default()), Err(CosimError::Configuration(_))));

        let mut sph = TerrainSetup::GranularSph(GranularConfig::default(), SphParams::default());
        let bad = SphParams { sound_speed: 0.0, ..SphParams::default() };
        assert!(sph.set_properties_sph(bad).is_err());
        sph.set_properties_sph(SphParams { alpha: 0.1, ..SphParams::default() }).unwrap();
    }

    #[test]
    fn sph_params_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("sph.json");
        std::fs::write(&p, r#"{ "sound_speed": 20.0 }"#).unwrap();
        let s = SphParams::from_json_file(&p).unwrap();
        assert_eq!(s.sound_speed, 20.0);
        assert_eq!(s.gamma, 7.0);
        std::fs::write(&p, "not json").unwrap();
        assert!(matches!(SphParams::from_json_file(&p), Err(CosimError::Configuration(_))));
        assert!(matches!(SphParams::from_json_file(&dir.path().join("missing.json")), Err(CosimError::Io { .. })));
    }

    #[test]
    fn setup_kind_and_patch_checks() {
        assert_eq!(TerrainSetup::Scm(ScmParams::default()).kind(), TerrainKind::Scm);
        let mut s = TerrainSetup::GranularSph(GranularConfig::default(), SphParams::default());
        assert!(s.granular_mut().is_some());
        let mut t = TerrainConfig::default();
        t.set_patch_dimensions(0.0, 1.0);
        assert!(t.validate().is_err());
    }
}
