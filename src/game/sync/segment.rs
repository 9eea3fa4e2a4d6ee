//! Synchronization segments
//!
//! A segment describes what one actor did this tick from an observer's point
//! of view: stood still or moved, teleported, entered the viewport, or left
//! it. Every segment except `Remove` snapshots the actor's block set at
//! build time, so later mutation of the actor does not affect the packet.

use crate::error::{Result, SyncError};
use crate::game::position::{Direction, Position};
use crate::game::sync::block::SynchronizationBlockSet;

/// Movement class of a segment, as carried in the wire type field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Type 0: no movement this tick
    NoMovement,
    /// Type 1: one step
    Walk,
    /// Type 2: two steps
    Run,
    /// Type 3: teleport or viewport re-anchor
    Teleport,
    /// An actor entering the observer's viewport
    AddActor,
    /// An actor leaving the observer's viewport
    Remove,
}

/// One actor's contribution to an observer's synchronization packet
#[derive(Debug, Clone)]
pub enum SynchronizationSegment {
    /// The actor stood still or stepped up to twice
    Movement {
        block_set: SynchronizationBlockSet,
        directions: Vec<Direction>,
    },
    /// The actor moved discontinuously
    Teleport {
        block_set: SynchronizationBlockSet,
        destination: Position,
    },
    /// The actor entered the observer's viewport
    AddActor {
        block_set: SynchronizationBlockSet,
        index: u16,
        position: Position,
    },
    /// The actor left the observer's viewport
    Remove,
}

impl SynchronizationSegment {
    /// Build a movement segment. At most two steps fit in one tick.
    pub fn movement(
        block_set: SynchronizationBlockSet,
        directions: Vec<Direction>,
    ) -> Result<Self> {
        if directions.len() > 2 {
            return Err(SyncError::TooManyDirections(directions.len()).into());
        }
        Ok(SynchronizationSegment::Movement {
            block_set,
            directions,
        })
    }

    /// The wire movement class of this segment
    pub fn kind(&self) -> SegmentKind {
        match self {
            SynchronizationSegment::Movement { directions, .. } => match directions.len() {
                0 => SegmentKind::NoMovement,
                1 => SegmentKind::Walk,
                _ => SegmentKind::Run,
            },
            SynchronizationSegment::Teleport { .. } => SegmentKind::Teleport,
            SynchronizationSegment::AddActor { .. } => SegmentKind::AddActor,
            SynchronizationSegment::Remove => SegmentKind::Remove,
        }
    }

    /// The snapshotted block set, if this segment carries one
    pub fn block_set(&self) -> Option<&SynchronizationBlockSet> {
        match self {
            SynchronizationSegment::Movement { block_set, .. }
            | SynchronizationSegment::Teleport { block_set, .. }
            | SynchronizationSegment::AddActor { block_set, .. } => Some(block_set),
            SynchronizationSegment::Remove => None,
        }
    }

    /// Whether the block section of the packet needs an entry for this
    /// segment
    pub fn requires_block_update(&self) -> bool {
        self.block_set().is_some_and(|set| !set.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::sync::block::SynchronizationBlock;

    #[test]
    fn test_movement_kind_by_step_count() {
        let stand = SynchronizationSegment::movement(SynchronizationBlockSet::new(), vec![])
            .unwrap();
        assert_eq!(stand.kind(), SegmentKind::NoMovement);

        let walk = SynchronizationSegment::movement(
            SynchronizationBlockSet::new(),
            vec![Direction::North],
        )
        .unwrap();
        assert_eq!(walk.kind(), SegmentKind::Walk);

        let run = SynchronizationSegment::movement(
            SynchronizationBlockSet::new(),
            vec![Direction::North, Direction::NorthEast],
        )
        .unwrap();
        assert_eq!(run.kind(), SegmentKind::Run);
    }

    #[test]
    fn test_three_steps_rejected() {
        let result = SynchronizationSegment::movement(
            SynchronizationBlockSet::new(),
            vec![Direction::North, Direction::North, Direction::North],
        );
        assert!(matches!(
            result,
            Err(crate::error::TickforgeError::Sync(
                SyncError::TooManyDirections(3)
            ))
        ));
    }

    #[test]
    fn test_remove_carries_no_blocks() {
        let segment = SynchronizationSegment::Remove;
        assert_eq!(segment.kind(), SegmentKind::Remove);
        assert!(segment.block_set().is_none());
        assert!(!segment.requires_block_update());
    }

    #[test]
    fn test_block_snapshot_isolated_from_actor() {
        let mut set = SynchronizationBlockSet::new();
        set.add(SynchronizationBlock::Animation { id: 1, delay: 0 });

        let segment =
            SynchronizationSegment::movement(set.clone(), vec![]).unwrap();
        set.clear();

        assert!(segment.requires_block_update());
    }
}
