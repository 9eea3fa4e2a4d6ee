//! Tick synchronization driver
//!
//! Runs the three phases of a tick: a pre pass that re-anchors viewports and
//! queues connected sessions, a parallel pass that builds and delivers one
//! packet per observer, and a post pass that clears per-tick state. The
//! parallel pass is fork-join over a snapshot of the registry, so a fault in
//! one observer's task never affects another's.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, error, warn};

use crate::error::{Result, TickforgeError};
use crate::game::actor::Actor;
use crate::game::position::Position;
use crate::game::sync::encoder::encode_message;
use crate::game::sync::task::SynchronizationTask;
use crate::game::world::World;
use crate::net::packet::GamePacket;
use crate::net::session::SyncState;

/// Margin in tiles from the viewport edge at which the client must be given
/// a new anchor
const VIEWPORT_MARGIN: i32 = 16;

/// Width of the viewport in tiles (13 regions of 8 tiles)
const VIEWPORT_WIDTH: i32 = 104;

/// Drives actor synchronization for the whole world, once per tick.
pub struct TickSynchronizer {
    pool: ThreadPool,
}

impl TickSynchronizer {
    /// Create a synchronizer with its own worker pool. `threads` of zero
    /// sizes the pool to the machine.
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("sync-worker-{i}"))
            .build()
            .map_err(|e| TickforgeError::Internal(format!("worker pool: {e}")))?;
        Ok(Self { pool })
    }

    /// Run one full tick over every registered actor.
    ///
    /// Returns the encoded packet per actor index, which is also what each
    /// connected session was sent.
    pub fn pulse(&self, world: &World) -> HashMap<u16, GamePacket> {
        let actors = world.registry().active_actors();

        // Pre pass: re-anchor viewports that drifted too close to the edge
        // and queue every connected session for this tick.
        for actor in &actors {
            if needs_new_anchor(&actor.position(), &actor.last_known_region()) {
                actor.update_last_known_region();
            }
            if let Some(session) = actor.session() {
                session.set_sync_state(SyncState::Queued);
            }
        }

        // Parallel pass: one task per observer over an immutable snapshot.
        let packets: HashMap<u16, GamePacket> = self.pool.install(|| {
            actors
                .par_iter()
                .filter_map(|actor| self.synchronize(actor, world))
                .collect()
        });

        // Post pass: per-tick state is cleared only after every observer has
        // seen it.
        for actor in &actors {
            if actor.take_excessive_actors() {
                warn!(
                    actor_index = actor.index(),
                    "local actor list at capacity, deferring adds"
                );
            }
            actor.reset_tick_state();
            if let Some(session) = actor.session() {
                session.advance_sync_state(SyncState::Delivered, SyncState::Idle);
            }
        }

        packets
    }

    /// Build, encode and deliver one observer's packet.
    ///
    /// Faults are contained to this observer: an error skips the packet, and
    /// a panic is caught before it can unwind through the worker pool and
    /// take the rest of the tick's tasks with it.
    fn synchronize(&self, actor: &Arc<Actor>, world: &World) -> Option<(u16, GamePacket)> {
        let index = actor.index()?;

        let outcome = catch_unwind(AssertUnwindSafe(|| self.build_and_deliver(actor, world, index)));
        match outcome {
            Ok(packet) => Some((index, packet?)),
            Err(_) => {
                error!(actor_index = index, "synchronization task panicked");
                None
            }
        }
    }

    fn build_and_deliver(
        &self,
        actor: &Arc<Actor>,
        world: &World,
        index: u16,
    ) -> Option<GamePacket> {
        let message = match SynchronizationTask::new(actor, world).run() {
            Ok(message) => message,
            Err(e) => {
                error!(actor_index = index, error = %e, "synchronization task failed");
                return None;
            }
        };

        let packet = match encode_message(&message) {
            Ok(packet) => packet,
            Err(e) => {
                error!(actor_index = index, error = %e, "packet encoding failed");
                return None;
            }
        };

        if let Some(session) = actor.session() {
            session.advance_sync_state(SyncState::Queued, SyncState::Running);
            if let Err(e) = session.send(&packet) {
                debug!(actor_index = index, error = %e, "packet delivery failed");
            }
            session.set_sync_state(SyncState::Delivered);
        }

        Some(packet)
    }
}

/// Whether `position` has drifted close enough to the edge of the viewport
/// anchored at `anchor` that the client needs a new one.
fn needs_new_anchor(position: &Position, anchor: &Position) -> bool {
    let base_x = 8 * ((anchor.x as i32 >> 3) - 6);
    let base_y = 8 * ((anchor.y as i32 >> 3) - 6);
    let local_x = position.x as i32 - base_x;
    let local_y = position.y as i32 - base_y;

    local_x < VIEWPORT_MARGIN
        || local_x >= VIEWPORT_WIDTH - VIEWPORT_MARGIN
        || local_y < VIEWPORT_MARGIN
        || local_y >= VIEWPORT_WIDTH - VIEWPORT_MARGIN
}
