//! Game logic module
//!
//! World state, actors and per-tick synchronization.

pub mod actor;
pub mod position;
pub mod sync;
pub mod world;

pub use actor::{Actor, ActorRegistry, Appearance};
pub use position::{Direction, Position};
pub use world::{World, WorldSettings};
