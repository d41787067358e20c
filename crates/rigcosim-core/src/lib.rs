pub mod scalar;
pub mod ids;
pub mod types;
pub mod error;
pub mod hash;
pub mod rng;
pub mod aabb;
pub mod mesh;
pub mod capability;
pub mod pool;
pub mod output;

pub use scalar::{ceil_steps, Scalar};
pub use ids::{NodeRole, TerrainKind, TireKind, NUM_PARTICIPANTS, RIG_NODE_RANK, TERRAIN_NODE_RANK};
pub use types::{Vec3, Quat, Isometry, Velocity, vec3, iso, GRAVITY, GRAVITY_ACC};
pub use error::{CosimError, CosimResult, IoContext};
pub use hash::{StepHasher, hash_vec3, hash_quat, digest_u64};
pub use rng::XorShift64;
pub use aabb::Aabb;
pub use mesh::TriMesh;
pub use capability::{Availability, CapabilityRegistry};
pub use pool::WorkerPool;
