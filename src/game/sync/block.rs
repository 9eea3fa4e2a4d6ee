//! Synchronization blocks
//!
//! A block is one category of per-tick visual state for an actor: a chat
//! line, an animation, a graphic, and so on. Each actor accumulates at most
//! one block per kind into a block set during the tick; the set is encoded
//! into the synchronization packet and cleared in the tick's post pass.

use std::sync::Arc;

use crate::game::actor::Appearance;

/// Longest chat message the wire format can carry; the length field is a
/// single byte.
pub const MAX_CHAT_LENGTH: usize = 255;

/// Discriminant for the block kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Graphic,
    Animation,
    ForceChat,
    Chat,
    Appearance,
    TurnToPosition,
}

/// One category of per-tick actor state
#[derive(Debug, Clone, PartialEq)]
pub enum SynchronizationBlock {
    /// A spot graphic played on the actor's tile
    Graphic { id: u16, height: u16, delay: u16 },
    /// An animation played by the actor's model
    Animation { id: u16, delay: u8 },
    /// Text displayed above the actor's head without a chat line
    ForceChat { text: String },
    /// A public chat message, rebroadcast to observers
    Chat {
        effects: u16,
        privileges: u8,
        message: Vec<u8>,
    },
    /// Full visual description of the actor
    Appearance {
        name: String,
        appearance: Appearance,
        combat_level: u8,
    },
    /// Face a world position
    TurnToPosition { x: u16, y: u16 },
}

impl SynchronizationBlock {
    /// The kind of this block
    pub fn kind(&self) -> BlockKind {
        match self {
            SynchronizationBlock::Graphic { .. } => BlockKind::Graphic,
            SynchronizationBlock::Animation { .. } => BlockKind::Animation,
            SynchronizationBlock::ForceChat { .. } => BlockKind::ForceChat,
            SynchronizationBlock::Chat { .. } => BlockKind::Chat,
            SynchronizationBlock::Appearance { .. } => BlockKind::Appearance,
            SynchronizationBlock::TurnToPosition { .. } => BlockKind::TurnToPosition,
        }
    }
}

/// An actor's accumulated blocks for the current tick.
///
/// Holds at most one block per kind; adding a second block of a kind
/// replaces the first in place, keeping the original insertion order.
/// Cloning is shallow, so a set snapshotted into a segment shares its
/// blocks with the original.
#[derive(Debug, Clone, Default)]
pub struct SynchronizationBlockSet {
    blocks: Vec<Arc<SynchronizationBlock>>,
}

impl SynchronizationBlockSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    /// Add a block, replacing any existing block of the same kind.
    ///
    /// Chat messages are truncated to [`MAX_CHAT_LENGTH`] here, so every set
    /// reaching the encoder fits the one-byte length field.
    pub fn add(&mut self, block: SynchronizationBlock) {
        let block = match block {
            SynchronizationBlock::Chat {
                effects,
                privileges,
                mut message,
            } => {
                message.truncate(MAX_CHAT_LENGTH);
                SynchronizationBlock::Chat {
                    effects,
                    privileges,
                    message,
                }
            }
            other => other,
        };
        let kind = block.kind();
        if let Some(existing) = self.blocks.iter_mut().find(|b| b.kind() == kind) {
            *existing = Arc::new(block);
        } else {
            self.blocks.push(Arc::new(block));
        }
    }

    /// Whether the set holds a block of `kind`
    pub fn contains(&self, kind: BlockKind) -> bool {
        self.blocks.iter().any(|b| b.kind() == kind)
    }

    /// The block of `kind`, if present
    pub fn get(&self, kind: BlockKind) -> Option<&SynchronizationBlock> {
        self.blocks.iter().find(|b| b.kind() == kind).map(Arc::as_ref)
    }

    /// Remove the block of `kind`, returning whether one was present.
    pub fn remove(&mut self, kind: BlockKind) -> bool {
        let before = self.blocks.len();
        self.blocks.retain(|b| b.kind() != kind);
        self.blocks.len() != before
    }

    /// Iterate the blocks in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &SynchronizationBlock> {
        self.blocks.iter().map(Arc::as_ref)
    }

    /// Discard all blocks. Idempotent.
    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    /// Whether the set holds no blocks
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of blocks in the set
    pub fn len(&self) -> usize {
        self.blocks.len()
    }
}
