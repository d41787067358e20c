use blake3::Hasher;
use crate::types::{Quat, Vec3};

/// Incremental blake3 digest over little-endian encoded values.
pub struct StepHasher(Hasher);

impl Default for StepHasher {
    fn default() -> Self { Self::new() }
}

impl StepHasher {
    pub fn new() -> Self { StepHasher(Hasher::new()) }
    pub fn update_bytes(&mut self, bytes: &[u8]) { self.0.update(bytes); }
    #[inline] pub fn update_u32(&mut self, v: u32) { self.0.update(&v.to_le_bytes()); }
    #[inline] pub fn update_u64(&mut self, v: u64) { self.0.update(&v.to_le_bytes()); }
    #[inline] pub fn update_f64(&mut self, v: f64) { self.0.update(&v.to_le_bytes()); }
    /// Length-prefixed so adjacent strings cannot alias.
    pub fn update_str(&mut self, s: &str) {
        self.update_u64(s.len() as u64);
        self.0.update(s.as_bytes());
    }
    pub fn finalize(self) -> [u8; 32] { *self.0.finalize().as_bytes() }
    pub fn finalize_u64(self) -> u64 { digest_u64(&self.finalize()) }
}

/// First eight digest bytes as a little-endian u64.
#[inline]
pub fn digest_u64(d: &[u8; 32]) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&d[..8]);
    u64::from_le_bytes(b)
}

#[inline]
pub fn hash_vec3(h: &mut StepHasher, v: &Vec3) {
    for c in [v.x, v.y, v.z] { h.update_f64(c); }
}

#[inline]
pub fn hash_quat(h: &mut StepHasher, q: &Quat) {
    for c in [q.x, q.y, q.z, q.w] { h.update_f64(c); }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_prefix_prevents_aliasing() {
        let mut a = StepHasher::new();
        a.update_str("ab");
        a.update_str("c");
        let mut b = StepHasher::new();
        b.update_str("a");
        b.update_str("bc");
        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn vec3_hash_is_stable() {
        let v = Vec3::new(1.0, -2.0, 0.5);
        let mut a = StepHasher::new();
        hash_vec3(&mut a, &v);
        let mut b = StepHasher::new();
        hash_vec3(&mut b, &v);
        assert_eq!(a.finalize_u64(), b.finalize_u64());
    }
}
