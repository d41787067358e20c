//! Transport and exchange layer.
//!
//! Messages are framed by [`wire`], carried by a [`Communicator`]
//! (in-process [`LoopbackComm`] or [`TcpComm`]), and their bodies are the
//! typed payloads from [`exchange`].

pub mod packet;
pub mod wire;
pub mod exchange;
pub mod transport;
pub mod loopback;
pub mod tcp;

pub use packet::{Packet, PacketReader};
pub use wire::{Message, MsgKind};
pub use exchange::{ContactLoad, MeshState, TerrainInfo, TireInfo, TireState};
pub use transport::{check_participants, Communicator};
pub use loopback::LoopbackComm;
pub use tcp::{TcpAcceptor, TcpComm};
