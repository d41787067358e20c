/// All co-simulation state is carried in double precision.
pub type Scalar = f64;

/// Number of fixed steps covering the quotient `q` (a duration over a step).
///
/// The last few ulps of division round-off are ignored, so 0.01 / 1e-4 is
/// 100 steps, while anything genuinely past an integer rounds up.
#[inline]
pub fn ceil_steps(q: Scalar) -> u64 {
    (q * (1.0 - 4.0 * Scalar::EPSILON)).ceil().max(0.0) as u64
}
