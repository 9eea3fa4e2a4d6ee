//! Error handling module
//!
//! Defines custom error types for the Tickforge engine.

use std::io;

use thiserror::Error;

/// Main error type for the Tickforge engine
#[derive(Error, Debug)]
pub enum TickforgeError {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Protocol-related errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Synchronization errors
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Network-specific errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Packet sink closed")]
    SinkClosed,

    #[error("Session not found: {0}")]
    SessionNotFound(u64),
}

/// Protocol-specific errors
///
/// Every variant here is fatal for the connection it occurs on: a frame
/// that cannot be decoded, or an opcode that de-obfuscates to an unknown
/// value, leaves the stream (and possibly the cipher) in an unrecoverable
/// state.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The de-obfuscated opcode does not map to a known message kind.
    /// Usually means the two cipher generators have fallen out of lockstep.
    #[error("Unknown opcode {0} after de-obfuscation (cipher desynchronized?)")]
    CipherDesynchronized(u8),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Invalid payload length: declared {declared}, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },
}

/// Synchronization-specific errors
#[derive(Error, Debug)]
pub enum SyncError {
    /// A movement segment may carry at most two directions.
    #[error("Movement segment built with {0} directions (max 2)")]
    TooManyDirections(usize),

    #[error("Actor registry is full")]
    RegistryFull,

    #[error("Actor not found at index {0}")]
    ActorNotFound(u16),

    #[error("Invalid plane {0} (must be 0-3)")]
    InvalidPlane(u8),
}

/// Result type alias for Tickforge operations
pub type Result<T> = std::result::Result<T, TickforgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NetworkError::ConnectionClosed;
        assert_eq!(err.to_string(), "Connection closed");

        let err = SyncError::TooManyDirections(3);
        assert_eq!(
            err.to_string(),
            "Movement segment built with 3 directions (max 2)"
        );

        let err = ProtocolError::FrameTooLarge {
            size: 70000,
            max: 65535,
        };
        assert_eq!(err.to_string(), "Frame too large: 70000 bytes (max: 65535)");
    }

    #[test]
    fn test_error_conversion() {
        let err: TickforgeError = SyncError::RegistryFull.into();
        assert!(matches!(err, TickforgeError::Sync(SyncError::RegistryFull)));
    }
}
