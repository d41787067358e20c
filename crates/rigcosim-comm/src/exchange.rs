//! Typed payloads of the rig/terrain exchange and their packet encodings.
//!
//! Setup: terrain sends [`TerrainInfo`], rig answers with [`TireInfo`].
//! Every step: rig sends [`TireState`], terrain answers with [`ContactLoad`].

use rigcosim_core::{
    CosimError, CosimResult, Isometry, Scalar, StepHasher, TerrainKind, TireKind, TriMesh, Vec3, Velocity,
};
use rigcosim_materials::{ContactMaterial, ContactMethod};

use crate::packet::Packet;

/// Terrain description the rig needs to place the wheel.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TerrainInfo {
    pub kind: TerrainKind,
    /// Height of the undisturbed terrain surface (m).
    pub init_height: Scalar,
    pub patch_length: Scalar,
    pub patch_width: Scalar,
}

impl TerrainInfo {
    pub fn to_packet(&self) -> Packet {
        let mut p = Packet::with_capacity(1, 3);
        p.push_u32(self.kind.index() as u32);
        p.push_f64(self.init_height);
        p.push_f64(self.patch_length);
        p.push_f64(self.patch_width);
        p
    }

    pub fn from_packet(p: &Packet) -> CosimResult<Self> {
        let mut r = p.reader();
        let k = r.u32()?;
        let kind = TerrainKind::from_index(k)
            .ok_or_else(|| CosimError::protocol(format!("unknown terrain kind {k}")))?;
        let info = Self { kind, init_height: r.f64()?, patch_length: r.f64()?, patch_width: r.f64()? };
        r.finish()?;
        Ok(info)
    }
}

/// Static tire description: contact surface (wheel frame) and contact material.
#[derive(Clone, Debug, PartialEq)]
pub struct TireInfo {
    pub kind: TireKind,
    pub radius: Scalar,
    pub width: Scalar,
    pub mass: Scalar,
    pub mesh: TriMesh,
    pub material: ContactMaterial,
}

impl TireInfo {
    pub fn to_packet(&self) -> Packet {
        let m = &self.mesh;
        let mut p = Packet::with_capacity(5 + 3 * m.num_triangles(), 12 + 6 * m.num_vertices());
        p.push_u32(self.kind.index() as u32);
        p.push_u32(self.material.method as u32);
        p.push_f64(self.radius);
        p.push_f64(self.width);
        p.push_f64(self.mass);
        for v in self.material.to_reals() { p.push_f64(v); }
        p.push_u32(m.num_vertices() as u32);
        for (v, n) in m.vertices.iter().zip(&m.normals) {
            p.push_vec3(*v);
            p.push_vec3(*n);
        }
        p.push_u32(m.num_triangles() as u32);
        for t in &m.triangles { p.ints.extend_from_slice(t); }
        p
    }

    pub fn from_packet(p: &Packet) -> CosimResult<Self> {
        let mut r = p.reader();
        let k = r.u32()?;
        let kind = TireKind::from_index(k).ok_or_else(|| CosimError::protocol(format!("unknown tire kind {k}")))?;
        let mm = r.u32()?;
        let method = ContactMethod::from_u32(mm)
            .ok_or_else(|| CosimError::protocol(format!("unknown contact method {mm}")))?;
        let (radius, width, mass) = (r.f64()?, r.f64()?, r.f64()?);
        let mut mat = [0.0; 9];
        for v in mat.iter_mut() { *v = r.f64()?; }
        let nv = r.count(0, 6)?;
        let mut mesh = TriMesh { vertices: Vec::with_capacity(nv), normals: Vec::with_capacity(nv), triangles: Vec::new() };
        for _ in 0..nv {
            mesh.vertices.push(r.vec3()?);
            mesh.normals.push(r.vec3()?);
        }
        let nt = r.count(3, 0)?;
        mesh.triangles.reserve(nt);
        for _ in 0..nt { mesh.triangles.push([r.u32()?, r.u32()?, r.u32()?]); }
        r.finish()?;
        mesh.validate()?;
        if !(radius > 0.0 && width > 0.0 && mass > 0.0) {
            return Err(CosimError::protocol("tire radius, width and mass must be positive"));
        }
        Ok(Self { kind, radius, width, mass, mesh, material: ContactMaterial::from_reals(method, mat) })
    }

    /// Digest both participants carry in every per-step message.
    pub fn digest(&self) -> u64 {
        let p = self.to_packet();
        let mut h = StepHasher::new();
        h.update_bytes(b"TIREv1\0");
        for v in &p.ints { h.update_u32(*v); }
        for v in &p.reals { h.update_f64(*v); }
        h.finalize_u64()
    }

    #[inline] pub fn vertex_mass(&self) -> Scalar { self.mass / self.mesh.num_vertices().max(1) as Scalar }
}

/// World-frame vertex positions and velocities.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshState {
    pub vpos: Vec<Vec3>,
    pub vvel: Vec<Vec3>,
}

impl MeshState {
    #[inline] pub fn len(&self) -> usize { self.vpos.len() }
    #[inline] pub fn is_empty(&self) -> bool { self.vpos.is_empty() }
}

/// Rig kinematics for one step. A rigid tire sends only the wheel pose and twist;
/// a flexible tire also sends its deformed mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct TireState {
    pub pose: Isometry,
    pub vel: Velocity,
    pub mesh: Option<MeshState>,
}

impl TireState {
    pub fn to_packet(&self) -> Packet {
        let nv = self.mesh.as_ref().map_or(0, MeshState::len);
        let mut p = Packet::with_capacity(2, 13 + 6 * nv);
        p.push_vec3(self.pose.pos);
        p.push_quat(self.pose.rot);
        p.push_vec3(self.vel.lin);
        p.push_vec3(self.vel.ang);
        match &self.mesh {
            None => p.push_u32(0),
            Some(m) => {
                p.push_u32(1);
                p.push_u32(m.len() as u32);
                for v in &m.vpos { p.push_vec3(*v); }
                for v in &m.vvel { p.push_vec3(*v); }
            }
        }
        p
    }

    /// Decode and check the vertex count against the agreed mesh.
    pub fn from_packet(p: &Packet, tire: &TireInfo) -> CosimResult<Self> {
        let mut r = p.reader();
        let pose = Isometry { pos: r.vec3()?, rot: r.quat()? };
        let vel = Velocity { lin: r.vec3()?, ang: r.vec3()? };
        let mesh = match (r.u32()?, tire.kind) {
            (0, TireKind::Rigid) => None,
            (1, TireKind::Flexible) => {
                let nv = r.count(0, 6)?;
                if nv != tire.mesh.num_vertices() {
                    return Err(CosimError::protocol(format!(
                        "tire state has {nv} vertices, mesh has {}", tire.mesh.num_vertices())));
                }
                let mut m = MeshState { vpos: Vec::with_capacity(nv), vvel: Vec::with_capacity(nv) };
                for _ in 0..nv { m.vpos.push(r.vec3()?); }
                for _ in 0..nv { m.vvel.push(r.vec3()?); }
                Some(m)
            }
            (flag, kind) => {
                return Err(CosimError::protocol(format!("mesh flag {flag} does not match a {kind} tire")));
            }
        };
        r.finish()?;
        Ok(Self { pose, vel, mesh })
    }

    /// Vertex kinematics in the world frame. Rigid tires carry the reference mesh with the wheel.
    pub fn vertex_kinematics(&self, tire: &TireInfo) -> MeshState {
        if let Some(m) = &self.mesh { return m.clone(); }
        let mut out = MeshState {
            vpos: Vec::with_capacity(tire.mesh.num_vertices()),
            vvel: Vec::with_capacity(tire.mesh.num_vertices()),
        };
        for v in &tire.mesh.vertices {
            let r = self.pose.transform_vector(*v);
            out.vpos.push(self.pose.pos + r);
            out.vvel.push(self.vel.at_offset(r));
        }
        out
    }
}

/// Terrain reaction for one step.
#[derive(Clone, Debug, PartialEq)]
pub enum ContactLoad {
    /// Resultant force and moment about the wheel center (rigid tire).
    Resultant { force: Vec3, moment: Vec3 },
    /// Forces on the vertices in contact (flexible tire).
    Vertices { indices: Vec<u32>, forces: Vec<Vec3> },
}

impl ContactLoad {
    pub fn zero(kind: TireKind) -> Self {
        match kind {
            TireKind::Rigid => ContactLoad::Resultant { force: Vec3::ZERO, moment: Vec3::ZERO },
            TireKind::Flexible => ContactLoad::Vertices { indices: Vec::new(), forces: Vec::new() },
        }
    }

    /// Reduce per-vertex terrain forces to the form a tire of `kind` consumes.
    pub fn from_vertex_forces(kind: TireKind, forces: &[Vec3], vpos: &[Vec3], center: Vec3) -> Self {
        match kind {
            TireKind::Rigid => {
                let (mut force, mut moment) = (Vec3::ZERO, Vec3::ZERO);
                for (f, p) in forces.iter().zip(vpos) {
                    force += *f;
                    moment += (*p - center).cross(*f);
                }
                ContactLoad::Resultant { force, moment }
            }
            TireKind::Flexible => {
                let mut indices = Vec::new();
                let mut out = Vec::new();
                for (i, f) in forces.iter().enumerate() {
                    if *f != Vec3::ZERO {
                        indices.push(i as u32);
                        out.push(*f);
                    }
                }
                ContactLoad::Vertices { indices, forces: out }
            }
        }
    }

    pub fn total_force(&self) -> Vec3 {
        match self {
            ContactLoad::Resultant { force, .. } => *force,
            ContactLoad::Vertices { forces, .. } => forces.iter().copied().sum(),
        }
    }

    pub fn num_contacts(&self) -> usize {
        match self {
            ContactLoad::Resultant { force, .. } => usize::from(*force != Vec3::ZERO),
            ContactLoad::Vertices { indices, .. } => indices.len(),
        }
    }

    pub fn to_packet(&self) -> Packet {
        match self {
            ContactLoad::Resultant { force, moment } => {
                let mut p = Packet::with_capacity(1, 6);
                p.push_u32(0);
                p.push_vec3(*force);
                p.push_vec3(*moment);
                p
            }
            ContactLoad::Vertices { indices, forces } => {
                let mut p = Packet::with_capacity(2 + indices.len(), 3 * forces.len());
                p.push_u32(1);
                p.push_u32(indices.len() as u32);
                p.ints.extend_from_slice(indices);
                for f in forces { p.push_vec3(*f); }
                p
            }
        }
    }

    pub fn from_packet(p: &Packet, tire: &TireInfo) -> CosimResult<Self> {
        let mut r = p.reader();
        let load = match (r.u32()?, tire.kind) {
            (0, TireKind::Rigid) => ContactLoad::Resultant { force: r.vec3()?, moment: r.vec3()? },
            (1, TireKind::Flexible) => {
                let n = r.count(1, 3)?;
                let nv = tire.mesh.num_vertices() as u32;
                let mut indices = Vec::with_capacity(n);
                for _ in 0..n {
                    let i = r.u32()?;
                    if i >= nv {
                        return Err(CosimError::protocol(format!("contact on vertex {i} of a {nv}-vertex mesh")));
                    }
                    indices.push(i);
                }
                let mut forces = Vec::with_capacity(n);
                for _ in 0..n { forces.push(r.vec3()?); }
                ContactLoad::Vertices { indices, forces }
            }
            (tag, kind) => {
                return Err(CosimError::protocol(format!("load tag {tag} does not match a {kind} tire")));
            }
        };
        r.finish()?;
        Ok(load)
    }
}
