//! World state module
//!
//! The world owns the actor registry and the authoritative tick counter,
//! and drives the fixed-rate tick loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::game::actor::{Actor, ActorRegistry};
use crate::game::position::Position;
use crate::game::sync::driver::TickSynchronizer;

/// Settings the world is created with
#[derive(Debug, Clone)]
pub struct WorldSettings {
    pub name: String,
    pub tick_rate_ms: u64,
    pub max_actors: usize,
    pub viewing_distance: u16,
    pub new_actors_per_pulse: usize,
}

impl WorldSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            name: config.server_name.clone(),
            tick_rate_ms: config.tick_rate_ms,
            max_actors: config.max_actors,
            viewing_distance: config.viewing_distance,
            new_actors_per_pulse: config.new_actors_per_pulse,
        }
    }
}

/// The game world
pub struct World {
    /// World settings
    pub settings: WorldSettings,
    /// All registered actors
    registry: ActorRegistry,
    /// Ticks elapsed since startup
    tick: AtomicU64,
}

impl World {
    /// Create a world from settings.
    pub fn new(settings: WorldSettings) -> Self {
        let registry = ActorRegistry::new(settings.max_actors);
        Self {
            settings,
            registry,
            tick: AtomicU64::new(0),
        }
    }

    /// The actor registry
    pub fn registry(&self) -> &ActorRegistry {
        &self.registry
    }

    /// Register an actor, assigning it an index.
    pub fn register(&self, actor: Arc<Actor>) -> Result<u16> {
        actor.set_viewing_distance(self.settings.viewing_distance);
        let index = self.registry.add(actor.clone())?;
        info!(name = %actor.name, index, "actor registered");
        Ok(index)
    }

    /// Unregister the actor at `index`.
    pub fn unregister(&self, index: u16) -> Result<Arc<Actor>> {
        let actor = self.registry.remove(index)?;
        info!(name = %actor.name, index, "actor unregistered");
        Ok(actor)
    }

    /// Actors on the same plane within `radius` tiles of `position`, in
    /// slot order.
    pub fn nearby_actors(&self, position: Position, radius: u16) -> Vec<Arc<Actor>> {
        self.registry
            .active_actors()
            .into_iter()
            .filter(|actor| actor.position().within_distance(&position, radius))
            .collect()
    }

    /// Identifier of the map region containing `position`
    pub fn containing_region(&self, position: Position) -> u32 {
        position.region_id()
    }

    /// Ticks elapsed since startup
    pub fn current_tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    fn advance_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Run the fixed-rate tick loop until `shutdown` fires.
    ///
    /// A tick that overruns its slot is not made up for; the next tick
    /// fires on schedule.
    pub async fn run(
        self: Arc<Self>,
        synchronizer: Arc<TickSynchronizer>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut ticker = interval(Duration::from_millis(self.settings.tick_rate_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            world = %self.settings.name,
            tick_rate_ms = self.settings.tick_rate_ms,
            "tick loop started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let tick = self.advance_tick();
                    let started = std::time::Instant::now();
                    synchronizer.pulse(&self);
                    let elapsed = started.elapsed();
                    if elapsed.as_millis() as u64 > self.settings.tick_rate_ms {
                        warn!(tick, elapsed_ms = elapsed.as_millis() as u64, "tick overran its slot");
                    }
                }
                _ = shutdown.recv() => {
                    info!(world = %self.settings.name, "tick loop stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> WorldSettings {
        WorldSettings {
            name: "test".to_string(),
            tick_rate_ms: 600,
            max_actors: 64,
            viewing_distance: 15,
            new_actors_per_pulse: 20,
        }
    }

    #[test]
    fn test_register_and_unregister() {
        let world = World::new(settings());
        let actor = Arc::new(Actor::new("alice", Position::new(3200, 3200, 0)));

        let index = world.register(actor.clone()).unwrap();
        assert_eq!(actor.index(), Some(index));
        assert_eq!(actor.viewing_distance(), 15);
        assert_eq!(world.registry().count(), 1);

        world.unregister(index).unwrap();
        assert_eq!(world.registry().count(), 0);
        assert!(!actor.is_active());
    }

    #[test]
    fn test_nearby_actors_filters_plane_and_distance() {
        let world = World::new(settings());
        let center = Position::new(3200, 3200, 0);

        let close = Arc::new(Actor::new("close", Position::new(3205, 3200, 0)));
        let far = Arc::new(Actor::new("far", Position::new(3300, 3200, 0)));
        let above = Arc::new(Actor::new("above", Position::new(3200, 3200, 1)));
        world.register(close).unwrap();
        world.register(far).unwrap();
        world.register(above).unwrap();

        let nearby = world.nearby_actors(center, 15);
        assert_eq!(nearby.len(), 1);
        assert_eq!(nearby[0].name, "close");
    }

    #[test]
    fn test_containing_region() {
        let world = World::new(settings());
        let pos = Position::new(3222, 3222, 0);
        assert_eq!(world.containing_region(pos), pos.region_id());
        assert_ne!(
            world.containing_region(Position::new(3222, 3222, 0)),
            world.containing_region(Position::new(3286, 3222, 0))
        );
    }

    #[test]
    fn test_tick_counter() {
        let world = World::new(settings());
        assert_eq!(world.current_tick(), 0);
        assert_eq!(world.advance_tick(), 1);
        assert_eq!(world.advance_tick(), 2);
        assert_eq!(world.current_tick(), 2);
    }
}
