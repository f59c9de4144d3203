mod channel;
mod connection;
mod dispatcher;
mod handler;
mod protocol;
mod stats;
mod transport;

pub use channel::Channel;
pub use connection::{Peer, PeerError, PeerTable};
pub use dispatcher::{DispatcherConfig, NetEvent, SERVER_IDENTITY, TransportDispatcher};
pub use handler::{MessageHandler, route};
pub use protocol::{
    DEFAULT_BROADCAST_RATE, DEFAULT_PORT, DEFAULT_TICK_RATE, DisconnectReason, MAX_CHAT_LEN,
    MAX_NICKNAME_LEN, MAX_PACKET_SIZE, MAX_SNAPSHOTS_PER_BATCH, Message, PROTOCOL_MAGIC,
    PROTOCOL_VERSION, Packet, PacketError, PacketHeader, Reliability, ScoreEntry, SnapshotEntry,
    sequence_greater_than,
};
pub use stats::NetworkStats;
pub use transport::{Datagram, Transport, TransportError};
