//! Tickforge world server
//!
//! Stands up the world, the tick synchronizer and a handful of wandering
//! actors driven through channel-backed sessions, then runs the tick loop
//! until interrupted.

use std::sync::Arc;

use anyhow::Result;
use rand::Rng;
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Duration};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use tickforge::crypto::isaac::IsaacPair;
use tickforge::game::actor::Actor;
use tickforge::game::position::{Direction, Position};
use tickforge::game::sync::driver::TickSynchronizer;
use tickforge::game::world::{World, WorldSettings};
use tickforge::net::session::Session;
use tickforge::ServerConfig;
use tickforge::VERSION;

/// Spawn tile for wandering actors
const SPAWN: Position = Position {
    x: 3222,
    y: 3222,
    plane: 0,
};

const WANDERER_COUNT: usize = 8;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Tickforge synchronization engine v{}", VERSION);

    let config = ServerConfig::load().await?;
    info!(
        "Configuration loaded from: {}",
        config.config_path.display()
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let world = Arc::new(World::new(WorldSettings::from_config(&config)));
    let synchronizer = Arc::new(TickSynchronizer::new(config.worker_threads)?);

    spawn_wanderers(&world, shutdown_tx.clone())?;

    let tick_world = world.clone();
    let tick_shutdown = shutdown_tx.subscribe();
    let tick_handle = tokio::spawn(async move {
        tick_world.run(synchronizer, tick_shutdown).await;
    });

    info!("Server startup complete");

    signal::ctrl_c().await?;
    info!("Shutting down server...");
    let _ = shutdown_tx.send(());
    let _ = tick_handle.await;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize the logging/tracing system
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tickforge=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .init();
}

/// Register a set of wandering actors, each with a session whose frames are
/// drained and discarded, and a task that steps them randomly each tick.
fn spawn_wanderers(world: &Arc<World>, shutdown_tx: broadcast::Sender<()>) -> Result<()> {
    let mut wanderers = Vec::with_capacity(WANDERER_COUNT);

    for i in 0..WANDERER_COUNT {
        let actor = Arc::new(Actor::new(format!("wanderer{i}"), SPAWN));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let key = rand::thread_rng().gen::<[u32; 4]>();
        actor.attach_session(Arc::new(Session::new(i as u64, IsaacPair::new(key), tx)));
        tokio::spawn(async move { while rx.recv().await.is_some() {} });

        if let Err(e) = world.register(actor.clone()) {
            error!(error = %e, "failed to register wanderer");
            continue;
        }
        wanderers.push(actor);
    }

    let tick_rate = world.settings.tick_rate_ms;
    let mut shutdown_rx = shutdown_tx.subscribe();
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_millis(tick_rate));
        let directions = [
            Direction::North,
            Direction::East,
            Direction::South,
            Direction::West,
            Direction::NorthEast,
            Direction::NorthWest,
            Direction::SouthEast,
            Direction::SouthWest,
        ];
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let mut rng = rand::thread_rng();
                    for actor in &wanderers {
                        // Stand still some ticks, wander the rest.
                        if rng.gen_bool(0.6) {
                            actor.step(directions[rng.gen_range(0..directions.len())]);
                        }
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    });

    Ok(())
}
