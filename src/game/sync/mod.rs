//! Actor synchronization
//!
//! Everything behind the per-tick state packet: blocks, segments, the
//! per-observer task, the wire encoder and the tick driver.

pub mod block;
pub mod driver;
pub mod encoder;
pub mod segment;
pub mod task;

pub use block::{BlockKind, SynchronizationBlock, SynchronizationBlockSet};
pub use driver::TickSynchronizer;
pub use segment::{SegmentKind, SynchronizationSegment};
pub use task::{SynchronizationMessage, SynchronizationTask, MAX_LOCAL_ACTORS};
