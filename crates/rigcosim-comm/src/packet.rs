use rigcosim_core::{CosimError, CosimResult, Quat, Scalar, Vec3};

/// Message body: an integer array and a real array, in the order written.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Packet {
    pub ints: Vec<u32>,
    pub reals: Vec<f64>,
}

impl Packet {
    pub fn new() -> Self { Self::default() }
    pub fn with_capacity(ints: usize, reals: usize) -> Self {
        Self { ints: Vec::with_capacity(ints), reals: Vec::with_capacity(reals) }
    }

    #[inline] pub fn push_u32(&mut self, v: u32) { self.ints.push(v); }
    #[inline] pub fn push_f64(&mut self, v: Scalar) { self.reals.push(v); }
    #[inline] pub fn push_vec3(&mut self, v: Vec3) { self.reals.extend_from_slice(&[v.x, v.y, v.z]); }
    #[inline] pub fn push_quat(&mut self, q: Quat) { self.reals.extend_from_slice(&[q.x, q.y, q.z, q.w]); }

    pub fn push_str(&mut self, s: &str) {
        self.push_u32(s.len() as u32);
        self.ints.extend(s.bytes().map(u32::from));
    }

    pub fn reader(&self) -> PacketReader<'_> { PacketReader { p: self, i: 0, r: 0 } }
}

/// Sequential reader; running past the end is a protocol error.
pub struct PacketReader<'a> {
    p: &'a Packet,
    i: usize,
    r: usize,
}

impl<'a> PacketReader<'a> {
    pub fn u32(&mut self) -> CosimResult<u32> {
        let v = self.p.ints.get(self.i).copied()
            .ok_or_else(|| CosimError::protocol("message body ended early (ints)"))?;
        self.i += 1;
        Ok(v)
    }

    pub fn f64(&mut self) -> CosimResult<Scalar> {
        let v = self.p.reals.get(self.r).copied()
            .ok_or_else(|| CosimError::protocol("message body ended early (reals)"))?;
        self.r += 1;
        Ok(v)
    }

    pub fn vec3(&mut self) -> CosimResult<Vec3> { Ok(Vec3::new(self.f64()?, self.f64()?, self.f64()?)) }

    pub fn quat(&mut self) -> CosimResult<Quat> {
        let (x, y, z, w) = (self.f64()?, self.f64()?, self.f64()?, self.f64()?);
        Ok(Quat::from_xyzw(x, y, z, w))
    }

    pub fn string(&mut self) -> CosimResult<String> {
        let n = self.u32()? as usize;
        let mut bytes = Vec::with_capacity(n);
        for _ in 0..n {
            let b = self.u32()?;
            bytes.push(u8::try_from(b).map_err(|_| CosimError::protocol("string byte out of range"))?);
        }
        String::from_utf8(bytes).map_err(|_| CosimError::protocol("string is not utf-8"))
    }

    /// Element count guarded against the remaining body size.
    pub fn count(&mut self, ints_per: usize, reals_per: usize) -> CosimResult<usize> {
        let n = self.u32()? as usize;
        let ints_left = self.p.ints.len() - self.i;
        let reals_left = self.p.reals.len() - self.r;
        if n.saturating_mul(ints_per) > ints_left || n.saturating_mul(reals_per) > reals_left {
            return Err(CosimError::protocol(format!("declared count {n} exceeds message body")));
        }
        Ok(n)
    }

    /// The whole body must have been consumed.
    pub fn finish(self) -> CosimResult<()> {
        if self.i != self.p.ints.len() || self.r != self.p.reals.len() {
            return Err(CosimError::protocol(format!(
                "trailing data in message body ({} ints, {} reals unread)",
                self.p.ints.len() - self.i, self.p.reals.len() - self.r)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_detects_short_and_long_bodies() {
        let mut p = Packet::new();
        p.push_u32(7);
        p.push_vec3(Vec3::new(1.0, 2.0, 3.0));
        p.push_str("abort: io");

        let mut r = p.reader();
        assert_eq!(r.u32().unwrap(), 7);
        assert_eq!(r.vec3().unwrap(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(r.string().unwrap(), "abort: io");
        assert!(r.f64().is_err());

        let mut r = p.reader();
        r.u32().unwrap();
        assert!(matches!(r.finish(), Err(CosimError::Protocol(_))));
    }

    #[test]
    fn count_is_bounded_by_body() {
        let mut p = Packet::new();
        p.push_u32(1_000_000);
        p.push_f64(1.0);
        assert!(p.reader().count(0, 3).is_err());
    }
}
