use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};

use rigcosim_core::{CosimError, CosimResult, IoContext, RIG_NODE_RANK, TERRAIN_NODE_RANK};
use tracing::info;

use crate::packet::Packet;
use crate::transport::{check_participants, Communicator};
use crate::wire::{Message, MsgKind, MAX_FRAME_LEN};

/// Listening side of a two-process run; the accepted link is rank 0 (rig).
pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    pub fn bind(addr: &str) -> CosimResult<Self> {
        let listener = TcpListener::bind(addr).io_context(|| format!("bind {addr}"))?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> CosimResult<SocketAddr> {
        self.listener.local_addr().io_context(|| "query listener address".into())
    }

    /// Wait for the terrain participant and run the hello handshake.
    pub fn accept(self, size: usize) -> CosimResult<TcpComm> {
        check_participants(size)?;
        let (stream, peer) = self.listener.accept().io_context(|| "accept peer".into())?;
        info!(%peer, "peer connected");
        let mut comm = TcpComm::from_stream(stream, RIG_NODE_RANK, size)?;
        let hello = comm.recv(TERRAIN_NODE_RANK)?.expect(MsgKind::Hello, None)?;
        let peer_size = hello.body.reader().u32()? as usize;
        if peer_size != size {
            comm.abort("participant count mismatch");
            return Err(CosimError::config(format!(
                "peer expects {peer_size} participants, this side {size}")));
        }
        comm.send(TERRAIN_NODE_RANK, &hello_msg(size, RIG_NODE_RANK))?;
        Ok(comm)
    }
}

fn hello_msg(size: usize, rank: usize) -> Message {
    let mut body = Packet::new();
    body.push_u32(size as u32);
    body.push_u32(rank as u32);
    Message::new(MsgKind::Hello, 0, 0, body)
}

/// Length-prefixed frames over one TCP stream. Exactly two ranks.
pub struct TcpComm {
    rank: usize,
    size: usize,
    stream: TcpStream,
}

impl TcpComm {
    /// Connect to the rig participant; this side becomes rank 1 (terrain). Single attempt.
    pub fn connect(addr: &str, size: usize) -> CosimResult<Self> {
        check_participants(size)?;
        let stream = TcpStream::connect(addr).io_context(|| format!("connect {addr}"))?;
        let mut comm = Self::from_stream(stream, TERRAIN_NODE_RANK, size)?;
        comm.send(RIG_NODE_RANK, &hello_msg(size, TERRAIN_NODE_RANK))?;
        let hello = comm.recv(RIG_NODE_RANK)?.expect(MsgKind::Hello, None)?;
        let peer_size = hello.body.reader().u32()? as usize;
        if peer_size != size {
            return Err(CosimError::config(format!(
                "peer expects {peer_size} participants, this side {size}")));
        }
        info!(%addr, "connected to peer");
        Ok(comm)
    }

    fn from_stream(stream: TcpStream, rank: usize, size: usize) -> CosimResult<Self> {
        stream.set_nodelay(true).io_context(|| "set TCP_NODELAY".into())?;
        Ok(Self { rank, size, stream })
    }

    fn peer(&self) -> usize { 1 - self.rank }

    fn check_peer(&self, r: usize) -> CosimResult<()> {
        if r != self.peer() {
            return Err(CosimError::protocol(format!("rank {} cannot address rank {r}", self.rank)));
        }
        Ok(())
    }
}

fn closed(e: std::io::Error) -> CosimError {
    match e.kind() {
        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe
        | ErrorKind::ConnectionAborted => CosimError::PeerAborted(format!("connection lost: {e}")),
        _ => CosimError::io("tcp frame", e),
    }
}

impl Communicator for TcpComm {
    fn rank(&self) -> usize { self.rank }
    fn size(&self) -> usize { self.size }

    fn send(&mut self, to: usize, msg: &Message) -> CosimResult<()> {
        self.check_peer(to)?;
        let bytes = msg.encode();
        if bytes.len() > MAX_FRAME_LEN {
            return Err(CosimError::protocol(format!("frame of {} bytes exceeds limit", bytes.len())));
        }
        self.stream.write_all(&(bytes.len() as u32).to_le_bytes()).map_err(closed)?;
        self.stream.write_all(&bytes).map_err(closed)
    }

    fn recv(&mut self, from: usize) -> CosimResult<Message> {
        self.check_peer(from)?;
        let mut len = [0u8; 4];
        self.stream.read_exact(&mut len).map_err(closed)?;
        let len = u32::from_le_bytes(len) as usize;
        if len > MAX_FRAME_LEN {
            return Err(CosimError::protocol(format!("incoming frame of {len} bytes exceeds limit")));
        }
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf).map_err(closed)?;
        Message::decode(&buf)
    }
}
