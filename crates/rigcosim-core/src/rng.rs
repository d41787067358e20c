use crate::Scalar;

/// Seeded generator for reproducible particle sampling.
#[derive(Copy, Clone, Debug)]
pub struct XorShift64 { state: u64 }

impl XorShift64 {
    pub fn new(seed: u64) -> Self { Self { state: seed | 1 } }
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x >> 12; x ^= x << 25; x ^= x >> 27;
        self.state = x;
        ((x.wrapping_mul(2685821657736338717)) >> 32) as u32
    }
    /// Uniform in [0, 1) with 53 random bits.
    pub fn next_f64(&mut self) -> Scalar {
        let hi = self.next_u32() as u64;
        let lo = self.next_u32() as u64;
        let bits = ((hi << 32) | lo) >> 11;
        bits as Scalar * (1.0 / (1u64 << 53) as Scalar)
    }
    #[inline] pub fn range(&mut self, lo: Scalar, hi: Scalar) -> Scalar { lo + (hi - lo) * self.next_f64() }
    pub fn state(&self) -> u64 { self.state }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = XorShift64::new(42);
        let mut b = XorShift64::new(42);
        for _ in 0..100 { assert_eq!(a.next_u32(), b.next_u32()); }
    }

    #[test]
    fn unit_interval() {
        let mut r = XorShift64::new(7);
        for _ in 0..10_000 {
            let x = r.next_f64();
            assert!((0.0..1.0).contains(&x));
        }
        let y = r.range(-2.0, -1.0);
        assert!((-2.0..-1.0).contains(&y));
    }
}
