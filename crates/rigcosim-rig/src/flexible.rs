//! Lumped-mass flexible tire.
//!
//! Every tread node sits on a radial spring-damper anchored to the rim. The
//! node deflection `d` is measured inward along the reference normal; the
//! terrain load drives it, structural (plus optional inflation) stiffness and
//! damping restore it, and the rim feels the spring-damper reaction plus the
//! tangential part of the node loads.

use std::path::Path;

use rayon::prelude::*;
use tracing::debug;

use rigcosim_comm::{ContactLoad, MeshState, TerrainInfo, TireInfo, TireState};
use rigcosim_core::output::{frame_path, CsvWriter};
use rigcosim_core::{CosimError, CosimResult, Scalar, TireKind, Vec3, WorkerPool};

use crate::config::RigConfig;
use crate::wheel::{RigCheckpoint, RigReport, WheelRig};
use crate::RigBackend;

#[derive(Copy, Clone, Debug, Default, PartialEq)]
struct Node {
    deflection: Scalar,
    rate: Scalar,
}

/// Tire whose tread nodes deflect radially under the terrain load.
pub struct FlexibleTire {
    cfg: RigConfig,
    info: TireInfo,
    rig: WheelRig,
    pool: WorkerPool,
    nodes: Vec<Node>,
    stiffness: Vec<Scalar>,
    damping: Vec<Scalar>,
    node_mass: Scalar,
    loads: Vec<Vec3>,
}

impl FlexibleTire {
    /// Flexible tire from a validated configuration.
    pub fn new(cfg: RigConfig) -> CosimResult<Self> {
        cfg.validate()?;
        let info = cfg.tire.tire_info(TireKind::Flexible)?;
        let pool = WorkerPool::new("tire", cfg.threads)?;
        let spec = &cfg.tire;
        let areas = info.mesh.vertex_areas();
        let pressure = if cfg.tire_pressure { spec.pressure / spec.section_height } else { 0.0 };
        let stiffness = areas.iter().map(|a| (spec.stiffness + pressure) * a).collect();
        let damping = areas.iter().map(|a| spec.damping * a).collect();
        let nv = info.mesh.num_vertices();
        debug!(nodes = nv, pressure = cfg.tire_pressure, "flexible tire");
        Ok(Self {
            node_mass: info.vertex_mass(),
            rig: WheelRig::new(&cfg),
            nodes: vec![Node::default(); nv],
            loads: vec![Vec3::ZERO; nv],
            cfg, info, pool, stiffness, damping,
        })
    }

    /// Inward deflection of every node (m).
    pub fn deflections(&self) -> Vec<Scalar> {
        self.nodes.iter().map(|n| n.deflection).collect()
    }

    /// Radial stiffness of node `i` (N/m).
    #[inline]
    pub fn node_stiffness(&self, i: usize) -> Scalar { self.stiffness[i] }

    fn mesh_state(&self) -> CosimResult<MeshState> {
        let c = self.rig.carrier()?;
        let (pose, vel) = (c.pose(), c.velocity());
        let mesh = &self.info.mesh;
        let mut out = MeshState { vpos: Vec::with_capacity(self.nodes.len()), vvel: Vec::with_capacity(self.nodes.len()) };
        for ((x, n), node) in mesh.vertices.iter().zip(&mesh.normals).zip(&self.nodes) {
            let r = pose.transform_vector(*x - *n * node.deflection);
            let nw = pose.transform_vector(*n);
            out.vpos.push(pose.pos + r);
            out.vvel.push(vel.at_offset(r) - nw * node.rate);
        }
        Ok(out)
    }
}

impl RigBackend for FlexibleTire {
    fn kind(&self) -> TireKind { TireKind::Flexible }
    fn config(&self) -> &RigConfig { &self.cfg }
    fn tire_info(&self) -> &TireInfo { &self.info }

    fn initialize(&mut self, terrain: &TerrainInfo) -> CosimResult<()> {
        self.rig.initialize(&self.cfg, terrain)
    }

    fn tire_state(&self) -> CosimResult<TireState> {
        let c = self.rig.carrier()?;
        Ok(TireState { pose: c.pose(), vel: c.velocity(), mesh: Some(self.mesh_state()?) })
    }

    fn apply_contact(&mut self, load: &ContactLoad) -> CosimResult<()> {
        let ContactLoad::Vertices { indices, forces } = load else {
            return Err(CosimError::protocol("flexible tire received a resultant load"));
        };
        if indices.len() != forces.len() {
            return Err(CosimError::protocol("vertex load has mismatched index and force counts"));
        }
        self.loads.iter_mut().for_each(|f| *f = Vec3::ZERO);
        for (&i, f) in indices.iter().zip(forces) {
            let slot = self.loads.get_mut(i as usize)
                .ok_or_else(|| CosimError::protocol(format!("load on vertex {i} of a {}-node tire", self.nodes.len())))?;
            *slot = *f;
        }
        Ok(())
    }

    fn advance(&mut self, dt: Scalar) -> CosimResult<()> {
        let pose = self.rig.carrier()?.pose();
        let mesh = &self.info.mesh;
        let (m, cap) = (self.node_mass, self.cfg.tire.section_height);
        let (stiffness, damping, loads) = (&self.stiffness, &self.damping, &self.loads);

        // rim reaction from the node state the terrain saw this step
        let mut force = Vec3::ZERO;
        let mut moment = Vec3::ZERO;
        for (i, node) in self.nodes.iter().enumerate() {
            let n = pose.transform_vector(mesh.normals[i]);
            let f = loads[i];
            let spring = stiffness[i] * node.deflection + damping[i] * node.rate;
            let rim = -n * spring + (f - n * f.dot(n));
            let r = pose.transform_vector(mesh.vertices[i] - mesh.normals[i] * node.deflection);
            force += rim;
            moment += r.cross(rim);
        }
        self.rig.force = force;
        self.rig.moment = moment;

        let nodes = &mut self.nodes;
        self.pool.install(|| {
            nodes.par_iter_mut().enumerate().for_each(|(i, node)| {
                let n = pose.transform_vector(mesh.normals[i]);
                let inward = -loads[i].dot(n);
                let acc = (inward - stiffness[i] * node.deflection - damping[i] * node.rate) / m;
                node.rate += acc * dt;
                node.deflection += node.rate * dt;
                if node.deflection > cap {
                    node.deflection = cap;
                    node.rate = node.rate.min(0.0);
                }
            });
        });
        self.rig.advance(dt)
    }

    fn time(&self) -> Scalar { self.rig.time }
    fn report(&self) -> RigReport { self.rig.report() }

    fn output(&self, frame: u64, dir: &Path) -> CosimResult<()> {
        let st = self.mesh_state()?;
        let mut w = CsvWriter::create(&frame_path(dir, "vertices", frame), "x,y,z,vx,vy,vz,deflection,fx,fy,fz")?;
        for (i, (p, v)) in st.vpos.iter().zip(&st.vvel).enumerate() {
            let f = self.loads[i];
            w.row(&[p.x, p.y, p.z, v.x, v.y, v.z, self.nodes[i].deflection, f.x, f.y, f.z])?;
        }
        w.finish()
    }

    fn write_checkpoint(&self, path: &Path) -> CosimResult<()> {
        let nodes = self.nodes.iter().map(|n| [n.deflection, n.rate]).collect();
        self.rig.checkpoint(TireKind::Flexible, nodes)?.write(path)
    }

    fn read_checkpoint(&mut self, path: &Path) -> CosimResult<()> {
        let ck = RigCheckpoint::read(path, TireKind::Flexible, self.nodes.len())?;
        self.rig.restore(&ck)?;
        for (node, [d, r]) in self.nodes.iter_mut().zip(&ck.nodes) {
            *node = Node { deflection: *d, rate: *r };
        }
        Ok(())
    }
}
