use bytemuck::{Pod, Zeroable};
use rigcosim_core::{CosimError, CosimResult};

use crate::packet::Packet;

pub const MAGIC: u32 = 0x4D49_5343;
pub const VER:   u16 = 1;
pub const HDR_LEN: usize = core::mem::size_of::<MsgHdr>();
/// Upper bound on one encoded message.
pub const MAX_FRAME_LEN: usize = 64 << 20;

#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MsgKind {
    Hello = 1,
    Barrier = 2,
    TerrainInfo = 3,
    TireInfo = 4,
    TireState = 5,
    ContactLoad = 6,
    Abort = 7,
}

impl MsgKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        use MsgKind::*;
        Some(match v {
            1 => Hello, 2 => Barrier, 3 => TerrainInfo, 4 => TireInfo,
            5 => TireState, 6 => ContactLoad, 7 => Abort,
            _ => return None,
        })
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct MsgHdr {
    pub magic:   u32,
    pub ver:     u16,
    pub kind:    u8,
    pub flags:   u8,
    /// Step index the message belongs to (0 for setup traffic).
    pub step:    u64,
    /// Digest of the static tire data both sides agreed on (0 before it exists).
    pub digest:  u64,
    pub n_ints:  u32,
    pub n_reals: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub kind: MsgKind,
    pub step: u64,
    pub digest: u64,
    pub body: Packet,
}

impl Message {
    pub fn new(kind: MsgKind, step: u64, digest: u64, body: Packet) -> Self {
        Self { kind, step, digest, body }
    }

    /// Header-only message.
    pub fn control(kind: MsgKind, step: u64) -> Self { Self::new(kind, step, 0, Packet::new()) }

    pub fn abort(reason: &str) -> Self {
        let mut body = Packet::new();
        body.push_str(reason);
        Self::new(MsgKind::Abort, 0, 0, body)
    }

    pub fn encode(&self) -> Vec<u8> {
        let hdr = MsgHdr {
            magic: MAGIC, ver: VER, kind: self.kind as u8, flags: 0,
            step: self.step, digest: self.digest,
            n_ints: self.body.ints.len() as u32,
            n_reals: self.body.reals.len() as u32,
        };
        let len = HDR_LEN + 8 * self.body.reals.len() + 4 * self.body.ints.len();
        let mut buf = Vec::with_capacity(len);
        buf.extend_from_slice(bytemuck::bytes_of(&hdr));
        buf.extend_from_slice(bytemuck::cast_slice(&self.body.reals));
        buf.extend_from_slice(bytemuck::cast_slice(&self.body.ints));
        buf
    }

    pub fn decode(buf: &[u8]) -> CosimResult<Self> {
        if buf.len() < HDR_LEN {
            return Err(CosimError::protocol(format!("frame of {} bytes is shorter than a header", buf.len())));
        }
        let (hbytes, pbytes) = buf.split_at(HDR_LEN);
        let hdr: MsgHdr = bytemuck::pod_read_unaligned(hbytes);
        if hdr.magic != MAGIC {
            return Err(CosimError::protocol(format!("bad magic {:#010x}", hdr.magic)));
        }
        if hdr.ver != VER {
            return Err(CosimError::protocol(format!("wire version {} (expected {VER})", hdr.ver)));
        }
        let kind = MsgKind::from_u8(hdr.kind)
            .ok_or_else(|| CosimError::protocol(format!("unknown message kind {}", hdr.kind)))?;
        let n_reals = hdr.n_reals as usize;
        let n_ints = hdr.n_ints as usize;
        let reals_len = 8 * n_reals;
        if pbytes.len() != reals_len + 4 * n_ints {
            return Err(CosimError::protocol(format!(
                "payload is {} bytes, header declares {n_reals} reals and {n_ints} ints", pbytes.len())));
        }
        let (rbytes, ibytes) = pbytes.split_at(reals_len);
        let body = Packet {
            reals: rbytes.chunks_exact(8).map(bytemuck::pod_read_unaligned::<f64>).collect(),
            ints: ibytes.chunks_exact(4).map(bytemuck::pod_read_unaligned::<u32>).collect(),
        };
        Ok(Self { kind, step: hdr.step, digest: hdr.digest, body })
    }

    /// Accept only `kind` (and `step`, if given). An Abort from the peer becomes `PeerAborted`.
    pub fn expect(self, kind: MsgKind, step: Option<u64>) -> CosimResult<Self> {
        if self.kind == MsgKind::Abort && kind != MsgKind::Abort {
            let reason = self.body.reader().string().unwrap_or_else(|_| "no reason given".into());
            return Err(CosimError::PeerAborted(reason));
        }
        if self.kind != kind {
            return Err(CosimError::protocol(format!("expected {kind:?}, received {:?}", self.kind)));
        }
        if let Some(s) = step {
            if self.step != s {
                return Err(CosimError::protocol(format!(
                    "{kind:?} for step {} arrived while at step {s}", self.step)));
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Message {
        let mut body = Packet::new();
        body.push_u32(3);
        body.push_f64(-0.25);
        body.push_f64(1e-9);
        Message::new(MsgKind::TireState, 17, 0xfeed, body)
    }

    #[test]
    fn header_is_32_bytes() {
        assert_eq!(HDR_LEN, 32);
    }

    #[test]
    fn decode_reproduces_message() {
        let m = sample();
        assert_eq!(Message::decode(&m.encode()).unwrap(), m);
    }

    #[test]
    fn decode_rejects_damaged_frames() {
        let good = sample().encode();

        let mut bad_magic = good.clone();
        bad_magic[0] ^= 0xff;
        assert!(matches!(Message::decode(&bad_magic), Err(CosimError::Protocol(_))));

        let mut bad_ver = good.clone();
        bad_ver[4] = 9;
        assert!(matches!(Message::decode(&bad_ver), Err(CosimError::Protocol(_))));

        let mut bad_kind = good.clone();
        bad_kind[6] = 200;
        assert!(matches!(Message::decode(&bad_kind), Err(CosimError::Protocol(_))));

        assert!(Message::decode(&good[..good.len() - 1]).is_err());
        assert!(Message::decode(&good[..10]).is_err());
    }

    #[test]
    fn expect_checks_kind_step_and_abort() {
        assert!(sample().expect(MsgKind::TireState, Some(17)).is_ok());
        assert!(matches!(sample().expect(MsgKind::TireState, Some(18)), Err(CosimError::Protocol(_))));
        assert!(matches!(sample().expect(MsgKind::ContactLoad, None), Err(CosimError::Protocol(_))));
        let err = Message::abort("disk full").expect(MsgKind::Barrier, Some(0)).unwrap_err();
        assert!(matches!(err, CosimError::PeerAborted(ref r) if r == "disk full"));
    }
}
