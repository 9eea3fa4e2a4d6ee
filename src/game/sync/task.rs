//! Per-observer synchronization task
//!
//! Builds one observer's view of the tick: the observer's own segment, a
//! segment per continuing or departing local actor, and add segments for
//! actors that entered the viewport. The result is a pure description of
//! the tick; encoding to the wire happens separately.

use std::sync::Arc;

use crate::error::Result;
use crate::game::actor::Actor;
use crate::game::position::Position;
use crate::game::sync::block::BlockKind;
use crate::game::sync::segment::SynchronizationSegment;
use crate::game::world::World;

/// Hard cap on an observer's local actor list. The wire format cannot
/// describe more.
pub const MAX_LOCAL_ACTORS: usize = 255;

/// Default number of actors admitted into a viewport per tick. Bounds the
/// packet size when many actors are in range at once, such as right after
/// a teleport.
pub const DEFAULT_NEW_ACTORS_PER_PULSE: usize = 20;

/// A fully described tick for one observer
#[derive(Debug)]
pub struct SynchronizationMessage {
    /// Viewport anchor the client is currently using
    pub last_known_region: Position,
    /// The observer's position this tick
    pub position: Position,
    /// Whether the viewport was re-anchored this tick
    pub region_changed: bool,
    /// The observer's own segment
    pub own_segment: SynchronizationSegment,
    /// Size of the local list before this tick's changes
    pub prior_local_count: usize,
    /// One segment per local actor, in local list order, then adds
    pub segments: Vec<SynchronizationSegment>,
}

/// Builds the synchronization message for one observer.
pub struct SynchronizationTask<'a> {
    observer: &'a Arc<Actor>,
    world: &'a World,
}

impl<'a> SynchronizationTask<'a> {
    pub fn new(observer: &'a Arc<Actor>, world: &'a World) -> Self {
        Self { observer, world }
    }

    /// Describe this tick from the observer's point of view.
    pub fn run(&self) -> Result<SynchronizationMessage> {
        let observer = self.observer;
        let position = observer.position();
        let last_known_region = observer.last_known_region();
        let region_changed = observer.has_region_changed();
        let viewing_distance = observer.viewing_distance();

        // The observer already rendered their own chat locally; echoing it
        // back would display it twice.
        let mut own_blocks = observer.block_set();
        own_blocks.remove(BlockKind::Chat);

        let own_segment = if observer.is_teleporting() || region_changed {
            SynchronizationSegment::Teleport {
                block_set: own_blocks,
                destination: position,
            }
        } else {
            SynchronizationSegment::movement(own_blocks, observer.directions())?
        };

        let mut local = observer.local_actors();
        let prior_local_count = local.len();
        let mut segments = Vec::with_capacity(prior_local_count);

        // Walk the existing local list in order: each entry either continues
        // (movement segment) or leaves the viewport (remove segment).
        local.retain(|&index| {
            let other = match self.world.registry().get(index) {
                Some(other) => other,
                None => {
                    segments.push(SynchronizationSegment::Remove);
                    return false;
                }
            };
            let out_of_range =
                other.position().longest_delta(&position) > viewing_distance
                    || other.position().plane != position.plane;
            if other.is_teleporting() || out_of_range {
                segments.push(SynchronizationSegment::Remove);
                false
            } else {
                match SynchronizationSegment::movement(other.block_set(), other.directions()) {
                    Ok(segment) => {
                        segments.push(segment);
                        true
                    }
                    Err(_) => {
                        segments.push(SynchronizationSegment::Remove);
                        false
                    }
                }
            }
        });

        // Admit newly visible actors, a bounded number per tick.
        let mut added = 0;
        for candidate in self.world.nearby_actors(position, viewing_distance) {
            if local.len() >= MAX_LOCAL_ACTORS {
                observer.flag_excessive_actors();
                break;
            }
            if added >= self.world.settings.new_actors_per_pulse {
                break;
            }

            let index = match candidate.index() {
                Some(index) => index,
                None => continue,
            };
            if Arc::ptr_eq(&candidate, observer) || local.contains(&index) {
                continue;
            }

            local.push(index);
            added += 1;

            // A newly added actor must carry an appearance so the client can
            // build its model.
            let mut block_set = candidate.block_set();
            if !block_set.contains(BlockKind::Appearance) {
                block_set.add(candidate.appearance_block());
            }

            segments.push(SynchronizationSegment::AddActor {
                block_set,
                index,
                position: candidate.position(),
            });
        }

        Ok(SynchronizationMessage {
            last_known_region,
            position,
            region_changed,
            own_segment,
            prior_local_count,
            segments,
        })
    }
}
