//! Binary terrain checkpoints.
//!
//! A checkpoint is a fixed header followed by `rows x cols` f64 values. The
//! header names the terrain variant and a fingerprint of the configuration the
//! state was produced with; restoring into anything else is refused.

use std::path::Path;

use bytemuck::{Pod, Zeroable};
use rigcosim_core::{CosimError, CosimResult, IoContext, Scalar, StepHasher, TerrainKind};

use crate::config::TerrainConfig;

pub const MAGIC: u32 = 0x5450_4B43;
pub const VER:   u16 = 1;
pub const HDR_LEN: usize = core::mem::size_of::<CkptHdr>();

/// Checkpoint written after the settling phase of a granular terrain.
pub const CHECKPOINT_SETTLED: &str = "checkpoint_settled.dat";

#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Layout {
    /// One record per row.
    RowMajor = 0,
    /// One column after another.
    ColumnMajor = 1,
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct CkptHdr {
    magic:       u32,
    ver:         u16,
    kind:        u8,
    layout:      u8,
    rows:        u64,
    cols:        u32,
    _pad:        u32,
    fingerprint: u64,
    time:        f64,
    digest:      [u8; 32],
}

#[derive(Clone, Debug, PartialEq)]
pub struct Checkpoint {
    pub kind: TerrainKind,
    pub layout: Layout,
    pub fingerprint: u64,
    pub time: Scalar,
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

impl Checkpoint {
    pub fn new(kind: TerrainKind, layout: Layout, fingerprint: u64, time: Scalar, cols: usize, data: Vec<f64>) -> CosimResult<Self> {
        let rows = match cols {
            0 if data.is_empty() => 0,
            0 => return Err(CosimError::checkpoint("values without columns")),
            c if data.len() % c == 0 => data.len() / c,
            c => return Err(CosimError::checkpoint(format!("{} values do not fill {c} columns", data.len()))),
        };
        Ok(Self { kind, layout, fingerprint, time, rows, cols, data })
    }

    /// Row-major checkpoint from fixed-width records.
    pub fn from_rows<const N: usize>(kind: TerrainKind, fingerprint: u64, time: Scalar, rows: &[[f64; N]]) -> CosimResult<Self> {
        let data = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Self::new(kind, Layout::RowMajor, fingerprint, time, N, data)
    }

    #[inline]
    pub fn value(&self, row: usize, col: usize) -> f64 {
        match self.layout {
            Layout::RowMajor => self.data[row * self.cols + col],
            Layout::ColumnMajor => self.data[col * self.rows + row],
        }
    }

    pub fn row<const N: usize>(&self, r: usize) -> [f64; N] {
        core::array::from_fn(|c| self.value(r, c))
    }

    fn body_digest(data: &[f64]) -> [u8; 32] {
        let mut h = StepHasher::new();
        h.update_bytes(bytemuck::cast_slice(data));
        h.finalize()
    }

    pub fn write(&self, path: &Path) -> CosimResult<()> {
        let hdr = CkptHdr {
            magic: MAGIC, ver: VER, kind: self.kind.index(), layout: self.layout as u8,
            rows: self.rows as u64, cols: self.cols as u32, _pad: 0,
            fingerprint: self.fingerprint, time: self.time,
            digest: Self::body_digest(&self.data),
        };
        let mut buf = Vec::with_capacity(HDR_LEN + 8 * self.data.len());
        buf.extend_from_slice(bytemuck::bytes_of(&hdr));
        buf.extend_from_slice(bytemuck::cast_slice(&self.data));
        std::fs::write(path, buf).io_context(|| format!("write checkpoint {}", path.display()))
    }

    pub fn read(path: &Path) -> CosimResult<Self> {
        let buf = std::fs::read(path).io_context(|| format!("read checkpoint {}", path.display()))?;
        if buf.len() < HDR_LEN {
            return Err(CosimError::checkpoint(format!("{} is too short to be a checkpoint", path.display())));
        }
        let (hbytes, body) = buf.split_at(HDR_LEN);
        let hdr: CkptHdr = bytemuck::pod_read_unaligned(hbytes);
        if hdr.magic != MAGIC || hdr.ver != VER {
            return Err(CosimError::checkpoint(format!("{} is not a version {VER} checkpoint", path.display())));
        }
        let kind = TerrainKind::from_index(hdr.kind as u32)
            .ok_or_else(|| CosimError::checkpoint(format!("unknown terrain kind {}", hdr.kind)))?;
        let layout = match hdr.layout {
            0 => Layout::RowMajor,
            1 => Layout::ColumnMajor,
            l => return Err(CosimError::checkpoint(format!("unknown layout {l}"))),
        };
        let bytes = usize::try_from(hdr.rows).ok()
            .and_then(|rows| rows.checked_mul(hdr.cols as usize))
            .and_then(|n| n.checked_mul(8))
            .ok_or_else(|| CosimError::checkpoint("checkpoint dimensions overflow"))?;
        if body.len() != bytes {
            return Err(CosimError::checkpoint(format!(
                "{} holds {} bytes of state, header declares {}x{}", path.display(), body.len(), hdr.rows, hdr.cols)));
        }
        let data: Vec<f64> = body.chunks_exact(8).map(bytemuck::pod_read_unaligned::<f64>).collect();
        if Self::body_digest(&data) != hdr.digest {
            return Err(CosimError::checkpoint(format!("{} is corrupt (digest mismatch)", path.display())));
        }
        Ok(Self {
            kind, layout, fingerprint: hdr.fingerprint, time: hdr.time,
            rows: hdr.rows as usize, cols: hdr.cols as usize, data,
        })
    }

    /// Refuse state produced by another variant, another configuration or another record layout.
    pub fn expect(&self, kind: TerrainKind, fingerprint: u64, layout: Layout, cols: usize) -> CosimResult<()> {
        if self.kind != kind {
            return Err(CosimError::checkpoint(format!(
                "checkpoint was written by the {} terrain, cannot load into {kind}", self.kind)));
        }
        if self.fingerprint != fingerprint {
            return Err(CosimError::checkpoint(format!(
                "checkpoint fingerprint {:#018x} does not match this {kind} configuration ({fingerprint:#018x})",
                self.fingerprint)));
        }
        if self.layout != layout || self.cols != cols {
            return Err(CosimError::checkpoint(format!(
                "checkpoint records have {} columns ({:?}), expected {cols} ({layout:?})", self.cols, self.layout)));
        }
        Ok(())
    }
}

/// Digest of everything that makes a terrain state valid: variant, patch,
/// surface material and contact model, plus variant-specific parameters.
pub fn fingerprint(kind: TerrainKind, cfg: &TerrainConfig, extra: impl FnOnce(&mut StepHasher)) -> u64 {
    let mut h = StepHasher::new();
    h.update_bytes(b"TERRAINv1\0");
    h.update_u32(kind.index() as u32);
    h.update_f64(cfg.patch_length);
    h.update_f64(cfg.patch_width);
    cfg.material.hash_into(&mut h);
    cfg.model.hash_into(&mut h);
    extra(&mut h);
    h.finalize_u64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_72_bytes() {
        assert_eq!(HDR_LEN, 72);
    }

    #[test]
    fn write_read_and_expect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ckpt.dat");
        let c = Checkpoint::from_rows(TerrainKind::Scm, 42, 1.5, &[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]).unwrap();
        c.write(&path).unwrap();
        let back = Checkpoint::read(&path).unwrap();
        assert_eq!(back, c);
        assert_eq!(back.row::<2>(1), [3.0, 4.0]);
        back.expect(TerrainKind::Scm, 42, Layout::RowMajor, 2).unwrap();
        assert!(matches!(back.expect(TerrainKind::Rigid, 42, Layout::RowMajor, 2), Err(CosimError::Checkpoint(_))));
        assert!(matches!(back.expect(TerrainKind::Scm, 43, Layout::RowMajor, 2), Err(CosimError::Checkpoint(_))));
        assert!(matches!(back.expect(TerrainKind::Scm, 42, Layout::ColumnMajor, 2), Err(CosimError::Checkpoint(_))));
    }

    #[test]
    fn column_major_addressing() {
        let c = Checkpoint::new(TerrainKind::GranularGpu, Layout::ColumnMajor, 0, 0.0, 2, vec![1.0, 2.0, 3.0, 10.0, 20.0, 30.0]).unwrap();
        assert_eq!(c.rows, 3);
        assert_eq!(c.row::<2>(2), [3.0, 30.0]);
    }

    #[test]
    fn corrupt_and_truncated_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ckpt.dat");
        Checkpoint::from_rows(TerrainKind::GranularCpu, 1, 0.0, &[[1.0; 4]; 8]).unwrap().write(&path).unwrap();
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 3;
        bytes[last] ^= 0x55;
        std::fs::write(&path, &bytes).unwrap();
        assert!(matches!(Checkpoint::read(&path), Err(CosimError::Checkpoint(_))));
        std::fs::write(&path, &bytes[..bytes.len() - 8]).unwrap();
        assert!(matches!(Checkpoint::read(&path), Err(CosimError::Checkpoint(_))));
        assert!(matches!(Checkpoint::read(&dir.path().join("nope.dat")), Err(CosimError::Io { .. })));
    }

    #[test]
    fn oversized_header_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.dat");
        let hdr = CkptHdr {
            magic: MAGIC, ver: VER, kind: TerrainKind::GranularCpu.index(), layout: Layout::RowMajor as u8,
            rows: 1 << 61, cols: 1, _pad: 0, fingerprint: 0, time: 0.0,
            digest: Checkpoint::body_digest(&[]),
        };
        std::fs::write(&path, bytemuck::bytes_of(&hdr)).unwrap();
        assert!(matches!(Checkpoint::read(&path), Err(CosimError::Checkpoint(_))));

        let hdr = CkptHdr { rows: 1 << 40, cols: u32::MAX, ..hdr };
        std::fs::write(&path, bytemuck::bytes_of(&hdr)).unwrap();
        assert!(matches!(Checkpoint::read(&path), Err(CosimError::Checkpoint(_))));
    }
}
