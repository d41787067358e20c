//! Drawbar pull smoothing.

use std::collections::VecDeque;

use rigcosim_core::Scalar;

/// Moving average over a fixed time window.
///
/// Samples carry their own duration, so the window holds regardless of the
/// coupling step. The average is recomputed from the stored samples on every
/// query so repeated runs give bitwise identical values.
#[derive(Clone, Debug)]
pub struct DbpFilter {
    window: Scalar,
    samples: VecDeque<(Scalar, Scalar)>,
    span: Scalar,
}

impl DbpFilter {
    /// Filter averaging over the last `window` seconds.
    pub fn new(window: Scalar) -> Self {
        Self { window, samples: VecDeque::new(), span: 0.0 }
    }

    /// Window length (s).
    #[inline]
    pub fn window(&self) -> Scalar { self.window }

    /// Record `value` held for `dt` seconds.
    pub fn push(&mut self, value: Scalar, dt: Scalar) {
        self.samples.push_back((dt, value));
        self.span += dt;
        while self.samples.len() > 1 {
            let (front_dt, _) = self.samples[0];
            if self.span - front_dt < self.window - 1e-12 { break; }
            self.span -= front_dt;
            self.samples.pop_front();
        }
    }

    /// Time-weighted mean of the samples in the window; zero before the first sample.
    pub fn value(&self) -> Scalar {
        let (mut wsum, mut tsum) = (0.0, 0.0);
        for (dt, v) in &self.samples {
            wsum += dt * v;
            tsum += dt;
        }
        if tsum > 0.0 { wsum / tsum } else { 0.0 }
    }

    /// Drop every sample.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.span = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_over_window() {
        let mut f = DbpFilter::new(0.01);
        assert_eq!(f.value(), 0.0);
        for _ in 0..10 { f.push(2.0, 1e-3); }
        assert!((f.value() - 2.0).abs() < 1e-12);
        // ten more samples replace the window completely
        for _ in 0..10 { f.push(4.0, 1e-3); }
        assert!((f.value() - 4.0).abs() < 1e-9, "{}", f.value());
        for _ in 0..5 { f.push(0.0, 1e-3); }
        assert!((f.value() - 2.0).abs() < 1e-9, "{}", f.value());
    }

    #[test]
    fn short_window_tracks_last_sample() {
        let mut f = DbpFilter::new(1e-6);
        f.push(1.0, 1e-3);
        f.push(-3.0, 1e-3);
        assert_eq!(f.value(), -3.0);
        f.reset();
        assert_eq!(f.value(), 0.0);
    }
}
