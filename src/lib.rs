//! Tickforge Synchronization Engine Library
//!
//! Core functionality for the Tickforge world server: the authoritative
//! per-tick state synchronization engine, its wire codec and the session
//! layer it delivers through.
//!
//! ## Modules
//!
//! - `config` - Server configuration management
//! - `crypto` - Opcode obfuscation (paired ISAAC generators)
//! - `error` - Error types and result definitions
//! - `game` - World state, actors and synchronization
//! - `net` - Packet buffers, framing and sessions

pub mod config;
pub mod crypto;
pub mod error;
pub mod game;
pub mod net;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{Result, TickforgeError};

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol revision the wire format targets (must match client)
pub const PROTOCOL_REVISION: u32 = 317;
