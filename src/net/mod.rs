//! Networking module
//!
//! Packet buffers, frame codec and session management.

pub mod buffer;
pub mod packet;
pub mod session;

pub use buffer::{ByteOrder, PacketBuffer, Transform};
pub use packet::{FrameDecoder, GamePacket, PacketSize, SYNC_OPCODE};
pub use session::{Session, SessionId, SyncState};
