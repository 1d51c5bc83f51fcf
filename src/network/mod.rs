//! Network module: the wire protocol, inter-thread queues, and the node
//! itself (§4.7, §4.8, §5, §6).

pub mod node;
pub mod protocol;
pub mod queue;
pub mod selfish;

pub use protocol::{Envelope, MsgType, PeerInfo, ProtocolError};
pub use queue::FifoQueue;
