use rigcosim_core::{CosimError, CosimResult, NUM_PARTICIPANTS};
use tracing::warn;

use crate::wire::{Message, MsgKind};

/// Blocking point-to-point exchange between a fixed set of ranks.
pub trait Communicator: Send {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    fn send(&mut self, to: usize, msg: &Message) -> CosimResult<()>;
    /// Blocks until the next message from `from` arrives.
    fn recv(&mut self, from: usize) -> CosimResult<Message>;

    /// Receive and check kind and step; an Abort from the peer surfaces as `PeerAborted`.
    fn recv_expect(&mut self, from: usize, kind: MsgKind, step: Option<u64>) -> CosimResult<Message> {
        self.recv(from)?.expect(kind, step)
    }

    /// Collective barrier tagged with `step`; no rank leaves before all ranks reached it.
    fn barrier(&mut self, step: u64) -> CosimResult<()> {
        let me = self.rank();
        let msg = Message::control(MsgKind::Barrier, step);
        for r in (0..self.size()).filter(|&r| r != me) {
            self.send(r, &msg)?;
        }
        for r in (0..self.size()).filter(|&r| r != me) {
            self.recv_expect(r, MsgKind::Barrier, Some(step))?;
        }
        Ok(())
    }

    /// Best-effort failure notice to every other rank.
    fn abort(&mut self, reason: &str) {
        let me = self.rank();
        let msg = Message::abort(reason);
        for r in (0..self.size()).filter(|&r| r != me) {
            if let Err(e) = self.send(r, &msg) {
                warn!(rank = me, peer = r, error = %e, "could not deliver abort");
            }
        }
    }
}

/// A run has exactly two participants (rig and terrain).
pub fn check_participants(size: usize) -> CosimResult<()> {
    if size != NUM_PARTICIPANTS {
        return Err(CosimError::config(format!(
            "the wheel-rig co-simulation runs on exactly {NUM_PARTICIPANTS} participants, got {size}")));
    }
    Ok(())
}
