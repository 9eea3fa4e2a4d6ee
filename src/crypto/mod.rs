//! Cryptography module
//!
//! Opcode obfuscation for established connections.

pub mod isaac;

pub use isaac::{Isaac, IsaacPair};
