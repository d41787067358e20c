use crossbeam::channel::{unbounded, Receiver, Sender};
use rigcosim_core::{CosimError, CosimResult};

use crate::transport::Communicator;
use crate::wire::Message;

/// In-process transport: one ordered channel per (sender, receiver) pair.
/// Frames go through the wire codec so both transports see identical bytes.
pub struct LoopbackComm {
    rank: usize,
    size: usize,
    tx: Vec<Option<Sender<Vec<u8>>>>,
    rx: Vec<Option<Receiver<Vec<u8>>>>,
}

impl LoopbackComm {
    /// Build all `size` endpoints of a fully connected world; endpoint i has rank i.
    pub fn world(size: usize) -> Vec<LoopbackComm> {
        let mut comms: Vec<LoopbackComm> = (0..size)
            .map(|rank| LoopbackComm {
                rank,
                size,
                tx: (0..size).map(|_| None).collect(),
                rx: (0..size).map(|_| None).collect(),
            })
            .collect();
        for from in 0..size {
            for to in (0..size).filter(|&t| t != from) {
                let (s, r) = unbounded();
                comms[from].tx[to] = Some(s);
                comms[to].rx[from] = Some(r);
            }
        }
        comms
    }

    /// The two endpoints of a standard rig/terrain run.
    pub fn pair() -> (LoopbackComm, LoopbackComm) {
        let (s01, r01) = unbounded();
        let (s10, r10) = unbounded();
        (
            LoopbackComm { rank: 0, size: 2, tx: vec![None, Some(s01)], rx: vec![None, Some(r10)] },
            LoopbackComm { rank: 1, size: 2, tx: vec![Some(s10), None], rx: vec![Some(r01), None] },
        )
    }

    fn check_peer(&self, peer: usize) -> CosimResult<()> {
        if peer >= self.size || peer == self.rank {
            return Err(CosimError::protocol(format!(
                "rank {} cannot address rank {peer} in a world of {}", self.rank, self.size)));
        }
        Ok(())
    }
}

impl Communicator for LoopbackComm {
    fn rank(&self) -> usize { self.rank }
    fn size(&self) -> usize { self.size }

    fn send(&mut self, to: usize, msg: &Message) -> CosimResult<()> {
        self.check_peer(to)?;
        let Some(tx) = &self.tx[to] else {
            return Err(CosimError::protocol(format!("no channel to rank {to}")));
        };
        tx.send(msg.encode())
            .map_err(|_| CosimError::PeerAborted(format!("rank {to} is gone")))
    }

    fn recv(&mut self, from: usize) -> CosimResult<Message> {
        self.check_peer(from)?;
        let Some(rx) = &self.rx[from] else {
            return Err(CosimError::protocol(format!("no channel from rank {from}")));
        };
        let bytes = rx.recv()
            .map_err(|_| CosimError::PeerAborted(format!("rank {from} disconnected")))?;
        Message::decode(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::MsgKind;
    use crate::packet::Packet;

    #[test]
    fn pair_exchanges_in_order() {
        let (mut a, mut b) = LoopbackComm::pair();
        assert_eq!((a.rank(), b.rank()), (0, 1));
        for step in 0..3u64 {
            let mut body = Packet::new();
            body.push_f64(step as f64);
            a.send(1, &Message::new(MsgKind::TireState, step, 9, body)).unwrap();
        }
        for step in 0..3u64 {
            let m = b.recv_expect(0, MsgKind::TireState, Some(step)).unwrap();
            assert_eq!(m.body.reals, vec![step as f64]);
            assert_eq!(m.digest, 9);
        }
    }

    #[test]
    fn self_and_out_of_range_peers_are_rejected() {
        let (mut a, _b) = LoopbackComm::pair();
        assert!(a.send(0, &Message::control(MsgKind::Barrier, 0)).is_err());
        assert!(a.recv(5).is_err());
    }

    #[test]
    fn dropped_peer_surfaces_as_abort() {
        let (mut a, b) = LoopbackComm::pair();
        drop(b);
        assert!(matches!(a.recv(1), Err(CosimError::PeerAborted(_))));
        assert!(matches!(a.send(1, &Message::control(MsgKind::Barrier, 0)), Err(CosimError::PeerAborted(_))));
    }
}
