//! Session management module
//!
//! A session owns one connection's cipher pair, its incoming frame decoder,
//! and the outgoing byte sink. Sessions are shared between the network layer
//! and the tick driver, so all interior state is behind locks or atomics.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::crypto::isaac::IsaacPair;
use crate::error::{NetworkError, Result};
use crate::net::packet::{encode_frame, FrameDecoder, GamePacket};

/// Unique session identifier
pub type SessionId = u64;

/// Per-tick delivery state of a session.
///
/// Idle -> Queued -> Running -> Delivered, then back to Idle when the tick's
/// post pass completes. The driver uses this to assert that every connected
/// session is serviced exactly once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SyncState {
    Idle = 0,
    Queued = 1,
    Running = 2,
    Delivered = 3,
}

impl SyncState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SyncState::Queued,
            2 => SyncState::Running,
            3 => SyncState::Delivered,
            _ => SyncState::Idle,
        }
    }
}

/// One connected client's session
pub struct Session {
    /// Session identifier
    pub id: SessionId,
    /// Cipher pair for this connection
    ciphers: Mutex<IsaacPair>,
    /// Incremental decoder for the incoming stream
    decoder: Mutex<FrameDecoder>,
    /// Outgoing frame sink, drained by the connection's writer task
    sink: mpsc::UnboundedSender<Bytes>,
    /// Per-tick delivery state
    state: AtomicU8,
    /// Set once the sink is gone; further sends are silently dropped
    disconnected: AtomicBool,
}

impl Session {
    /// Create a session around an established connection.
    pub fn new(id: SessionId, ciphers: IsaacPair, sink: mpsc::UnboundedSender<Bytes>) -> Self {
        Self {
            id,
            ciphers: Mutex::new(ciphers),
            decoder: Mutex::new(FrameDecoder::new()),
            sink,
            state: AtomicU8::new(SyncState::Idle as u8),
            disconnected: AtomicBool::new(false),
        }
    }

    /// Encode a packet with this session's outgoing cipher and hand the frame
    /// to the writer task.
    pub fn send(&self, packet: &GamePacket) -> Result<()> {
        if self.disconnected.load(Ordering::Acquire) {
            return Err(NetworkError::ConnectionClosed.into());
        }

        let frame = {
            let mut ciphers = self.ciphers.lock();
            encode_frame(packet, &mut ciphers.encode)?
        };

        if self.sink.send(frame).is_err() {
            self.disconnected.store(true, Ordering::Release);
            debug!(session_id = self.id, "packet sink closed, marking session disconnected");
            return Err(NetworkError::SinkClosed.into());
        }
        Ok(())
    }

    /// Decode as many complete frames as `src` holds.
    pub fn decode_incoming(&self, src: &mut BytesMut) -> Result<Vec<GamePacket>> {
        let mut ciphers = self.ciphers.lock();
        let mut decoder = self.decoder.lock();

        let mut packets = Vec::new();
        while let Some(packet) = decoder.decode(src, &mut ciphers.decode)? {
            packets.push(packet);
        }
        Ok(packets)
    }

    /// Current per-tick delivery state
    pub fn sync_state(&self) -> SyncState {
        SyncState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Unconditionally set the delivery state.
    pub fn set_sync_state(&self, state: SyncState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Advance the delivery state, returning false if the current state was
    /// not the expected one.
    pub fn advance_sync_state(&self, from: SyncState, to: SyncState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether the connection has gone away
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    /// Mark the connection as gone.
    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.sync_state())
            .field("disconnected", &self.is_disconnected())
            .finish()
    }
}
