//! Actors and the actor registry
//!
//! An actor is one synchronized entity in the world. Actors are shared
//! between the network layer (which mutates them from input handlers) and
//! the tick driver (which reads them from worker threads), so all mutable
//! state lives behind locks or atomics.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{Result, SyncError};
use crate::game::position::{Direction, Position};
use crate::game::sync::block::{SynchronizationBlock, SynchronizationBlockSet};
use crate::net::session::Session;

/// Largest index the wire format can carry (11 bits, with 2047 reserved as
/// the segment terminator)
pub const MAX_ACTOR_INDEX: u16 = 2046;

/// Default viewing distance in tiles
pub const DEFAULT_VIEWING_DISTANCE: u16 = 15;

/// An actor's visual description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appearance {
    /// Gender (0 = male, 1 = female)
    pub gender: u8,
    /// Head model ID
    pub head: u16,
    /// Torso model ID
    pub torso: u16,
    /// Arms model ID
    pub arms: u16,
    /// Hands model ID
    pub hands: u16,
    /// Legs model ID
    pub legs: u16,
    /// Feet model ID
    pub feet: u16,
    /// Beard model ID (male only)
    pub beard: u16,
    /// Hair color
    pub hair_color: u8,
    /// Torso color
    pub torso_color: u8,
    /// Legs color
    pub legs_color: u8,
    /// Feet color
    pub feet_color: u8,
    /// Skin color
    pub skin_color: u8,
}

impl Appearance {
    /// Create default male appearance
    pub fn default_male() -> Self {
        Self {
            gender: 0,
            head: 0,
            torso: 18,
            arms: 26,
            hands: 33,
            legs: 36,
            feet: 42,
            beard: 10,
            hair_color: 0,
            torso_color: 0,
            legs_color: 0,
            feet_color: 0,
            skin_color: 0,
        }
    }

    /// Create default female appearance
    pub fn default_female() -> Self {
        Self {
            gender: 1,
            head: 45,
            torso: 56,
            arms: 61,
            hands: 67,
            legs: 70,
            feet: 79,
            beard: 0,
            hair_color: 0,
            torso_color: 0,
            legs_color: 0,
            feet_color: 0,
            skin_color: 0,
        }
    }
}

/// One synchronized entity in the world
pub struct Actor {
    /// Display name
    pub name: String,
    /// Registry index, None while unregistered
    index: Mutex<Option<u16>>,
    /// Current absolute position
    position: RwLock<Position>,
    /// Region anchor of the client's current viewport
    last_known_region: RwLock<Position>,
    /// Steps taken this tick (walk = first only, run = both)
    directions: RwLock<(Direction, Direction)>,
    /// Set when the actor teleported this tick
    teleporting: AtomicBool,
    /// Set when the viewport anchor moved this tick
    region_changed: AtomicBool,
    /// Radius within which other actors are visible
    viewing_distance: AtomicU16,
    /// Set when the local list hit its cap this tick
    excessive_actors: AtomicBool,
    /// Combat level shown next to the name
    combat_level: AtomicU8,
    /// Moderator/administrator crown (0 = none)
    privileges: AtomicU8,
    /// Blocks accumulated for the current tick
    block_set: RwLock<SynchronizationBlockSet>,
    /// Indices of actors currently in this actor's viewport, in add order
    local_actors: Mutex<Vec<u16>>,
    /// Visual description
    appearance: RwLock<Appearance>,
    /// Connection, if this actor is driven by a client
    session: RwLock<Option<Arc<Session>>>,
}

impl Actor {
    /// Create an actor standing at `position`.
    pub fn new(name: impl Into<String>, position: Position) -> Self {
        Self {
            name: name.into(),
            index: Mutex::new(None),
            position: RwLock::new(position),
            last_known_region: RwLock::new(position),
            directions: RwLock::new((Direction::None, Direction::None)),
            teleporting: AtomicBool::new(true),
            region_changed: AtomicBool::new(false),
            viewing_distance: AtomicU16::new(DEFAULT_VIEWING_DISTANCE),
            excessive_actors: AtomicBool::new(false),
            combat_level: AtomicU8::new(3),
            privileges: AtomicU8::new(0),
            block_set: RwLock::new(SynchronizationBlockSet::new()),
            local_actors: Mutex::new(Vec::new()),
            appearance: RwLock::new(Appearance::default_male()),
            session: RwLock::new(None),
        }
    }

    /// Registry index, if registered
    pub fn index(&self) -> Option<u16> {
        *self.index.lock()
    }

    /// Whether the actor is registered in the world
    pub fn is_active(&self) -> bool {
        self.index.lock().is_some()
    }

    fn set_index(&self, index: u16) {
        *self.index.lock() = Some(index);
    }

    fn clear_index(&self) {
        *self.index.lock() = None;
    }

    /// Current position
    pub fn position(&self) -> Position {
        *self.position.read()
    }

    /// Viewport anchor position
    pub fn last_known_region(&self) -> Position {
        *self.last_known_region.read()
    }

    /// Re-anchor the viewport to the current position.
    pub fn update_last_known_region(&self) {
        *self.last_known_region.write() = self.position();
        self.region_changed.store(true, Ordering::Release);
    }

    /// Take one step, updating position and recording the direction.
    ///
    /// The first step of a tick is a walk; a second step upgrades it to a
    /// run. Further steps in the same tick are ignored.
    pub fn step(&self, direction: Direction) {
        if direction == Direction::None {
            return;
        }
        let (dx, dy) = direction.deltas();
        let mut pos = self.position.write();
        let mut dirs = self.directions.write();
        match *dirs {
            (Direction::None, _) => dirs.0 = direction,
            (_, Direction::None) => dirs.1 = direction,
            _ => return,
        }
        *pos = Position::new(
            (pos.x as i32 + dx) as u16,
            (pos.y as i32 + dy) as u16,
            pos.plane,
        );
    }

    /// Move instantly to `destination`, flagging a teleport.
    pub fn teleport(&self, destination: Position) {
        *self.position.write() = destination;
        self.teleporting.store(true, Ordering::Release);
    }

    /// Steps taken this tick, in order. Empty when standing.
    pub fn directions(&self) -> Vec<Direction> {
        let dirs = *self.directions.read();
        let mut out = Vec::with_capacity(2);
        if dirs.0 != Direction::None {
            out.push(dirs.0);
        }
        if dirs.1 != Direction::None {
            out.push(dirs.1);
        }
        out
    }

    /// Whether the actor teleported this tick
    pub fn is_teleporting(&self) -> bool {
        self.teleporting.load(Ordering::Acquire)
    }

    /// Whether the viewport anchor moved this tick
    pub fn has_region_changed(&self) -> bool {
        self.region_changed.load(Ordering::Acquire)
    }

    /// Viewing distance in tiles
    pub fn viewing_distance(&self) -> u16 {
        self.viewing_distance.load(Ordering::Acquire)
    }

    pub fn set_viewing_distance(&self, distance: u16) {
        self.viewing_distance.store(distance, Ordering::Release);
    }

    /// Record that the local list was full this tick.
    pub fn flag_excessive_actors(&self) {
        self.excessive_actors.store(true, Ordering::Release);
    }

    /// Read and reset the excessive-actors flag.
    pub fn take_excessive_actors(&self) -> bool {
        self.excessive_actors.swap(false, Ordering::AcqRel)
    }

    /// Combat level
    pub fn combat_level(&self) -> u8 {
        self.combat_level.load(Ordering::Acquire)
    }

    pub fn set_combat_level(&self, level: u8) {
        self.combat_level.store(level, Ordering::Release);
    }

    /// Privilege crown (0 = none, 1 = moderator, 2 = administrator)
    pub fn privileges(&self) -> u8 {
        self.privileges.load(Ordering::Acquire)
    }

    pub fn set_privileges(&self, privileges: u8) {
        self.privileges.store(privileges, Ordering::Release);
    }

    /// Add a block for this tick, replacing any block of the same kind.
    pub fn add_block(&self, block: SynchronizationBlock) {
        self.block_set.write().add(block);
    }

    /// Snapshot of the current block set. Shallow.
    pub fn block_set(&self) -> SynchronizationBlockSet {
        self.block_set.read().clone()
    }

    /// Appearance block built from the actor's current description
    pub fn appearance_block(&self) -> SynchronizationBlock {
        SynchronizationBlock::Appearance {
            name: self.name.clone(),
            appearance: *self.appearance.read(),
            combat_level: self.combat_level(),
        }
    }

    /// Visual description
    pub fn appearance(&self) -> Appearance {
        *self.appearance.read()
    }

    pub fn set_appearance(&self, appearance: Appearance) {
        *self.appearance.write() = appearance;
        self.add_block(self.appearance_block());
    }

    /// Exclusive access to the local actor list
    pub fn local_actors(&self) -> parking_lot::MutexGuard<'_, Vec<u16>> {
        self.local_actors.lock()
    }

    /// Attach the driving connection.
    pub fn attach_session(&self, session: Arc<Session>) {
        *self.session.write() = Some(session);
    }

    /// The driving connection, if any
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.read().clone()
    }

    /// Reset all per-tick state. Called from the tick's post pass.
    pub fn reset_tick_state(&self) {
        self.block_set.write().clear();
        *self.directions.write() = (Direction::None, Direction::None);
        self.teleporting.store(false, Ordering::Release);
        self.region_changed.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actor")
            .field("name", &self.name)
            .field("index", &self.index())
            .field("position", &self.position())
            .finish()
    }
}

/// Fixed-capacity slot arena assigning each registered actor a stable index.
///
/// Indices are 1-based (the wire format reserves 0); slot `n` holds the
/// actor with index `n + 1`.
pub struct ActorRegistry {
    slots: Vec<RwLock<Option<Arc<Actor>>>>,
}

impl ActorRegistry {
    /// Create a registry with room for `capacity` actors.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(MAX_ACTOR_INDEX as usize);
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(RwLock::new(None));
        }
        Self { slots }
    }

    /// Register an actor into the lowest free slot.
    pub fn add(&self, actor: Arc<Actor>) -> Result<u16> {
        for (slot, entry) in self.slots.iter().enumerate() {
            let mut guard = entry.write();
            if guard.is_none() {
                let index = (slot + 1) as u16;
                actor.set_index(index);
                *guard = Some(actor);
                return Ok(index);
            }
        }
        Err(SyncError::RegistryFull.into())
    }

    /// Remove the actor at `index`.
    pub fn remove(&self, index: u16) -> Result<Arc<Actor>> {
        let slot = self
            .slots
            .get(index.wrapping_sub(1) as usize)
            .ok_or(SyncError::ActorNotFound(index))?;
        let actor = slot.write().take().ok_or(SyncError::ActorNotFound(index))?;
        actor.clear_index();
        Ok(actor)
    }

    /// The actor at `index`, if registered
    pub fn get(&self, index: u16) -> Option<Arc<Actor>> {
        self.slots
            .get(index.wrapping_sub(1) as usize)
            .and_then(|slot| slot.read().clone())
    }

    /// All registered actors, in slot order
    pub fn active_actors(&self) -> Vec<Arc<Actor>> {
        self.slots
            .iter()
            .filter_map(|slot| slot.read().clone())
            .collect()
    }

    /// Number of registered actors
    pub fn count(&self) -> usize {
        self.slots.iter().filter(|s| s.read().is_some()).count()
    }

    /// Total slot count
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
