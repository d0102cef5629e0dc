//! GDB Remote Serial Protocol framing: the incremental packet receiver,
//! frame validation, reply framing with ack/retransmit, and the lexical
//! helpers shared by command handlers.

pub mod common;
mod packet;
mod recv_packet;
mod response_writer;

pub use packet::decode;
pub use packet::unescape_binary;
pub use packet::PacketError;
pub use recv_packet::RecvEvent;
pub use recv_packet::RecvPacketStateMachine;
pub use response_writer::ResponseWriter;

/// Largest inbound packet body the stub accepts, advertised to the client
/// as `PacketSize` in the `qSupported` reply.
pub const MAX_PACKET_SIZE: usize = 4096;

/// The peer vanished mid-session: EOF or an I/O failure on the stream.
///
/// Never fatal - the session catches this at every level and transitions to
/// detached.
#[derive(Debug)]
pub struct PeerClosed<E>(pub E);
