//! Server configuration module
//!
//! Handles loading and parsing of server configuration from files and environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::game::actor::MAX_ACTOR_INDEX;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Server name displayed in logs
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Game tick rate in milliseconds
    #[serde(default = "default_tick_rate")]
    pub tick_rate_ms: u64,

    /// Maximum number of actors in the world
    #[serde(default = "default_max_actors")]
    pub max_actors: usize,

    /// Viewing distance in tiles
    #[serde(default = "default_viewing_distance")]
    pub viewing_distance: u16,

    /// Actors admitted into a viewport per tick
    #[serde(default = "default_new_actors_per_pulse")]
    pub new_actors_per_pulse: usize,

    /// Synchronization worker threads (0 = one per core)
    #[serde(default)]
    pub worker_threads: usize,

    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,
}

// Default value functions
fn default_server_name() -> String {
    "Tickforge".to_string()
}

fn default_tick_rate() -> u64 {
    600
}

fn default_max_actors() -> usize {
    2000
}

fn default_viewing_distance() -> u16 {
    15
}

fn default_new_actors_per_pulse() -> usize {
    20
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/server.toml"),
            server_name: default_server_name(),
            tick_rate_ms: default_tick_rate(),
            max_actors: default_max_actors(),
            viewing_distance: default_viewing_distance(),
            new_actors_per_pulse: default_new_actors_per_pulse(),
            worker_threads: 0,
            debug: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from file and environment variables
    pub async fn load() -> Result<Self> {
        let config_path = env::var("TICKFORGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/server.toml"));

        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path)
                .await
                .with_context(|| {
                    format!("Failed to read config file: {}", config_path.display())
                })?;

            toml::from_str(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.config_path = config_path;
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("TICKFORGE_SERVER_NAME") {
            self.server_name = val;
        }
        if let Ok(val) = env::var("TICKFORGE_TICK_RATE_MS") {
            if let Ok(rate) = val.parse() {
                self.tick_rate_ms = rate;
            }
        }
        if let Ok(val) = env::var("TICKFORGE_MAX_ACTORS") {
            if let Ok(max) = val.parse() {
                self.max_actors = max;
            }
        }
        if let Ok(val) = env::var("TICKFORGE_VIEWING_DISTANCE") {
            if let Ok(distance) = val.parse() {
                self.viewing_distance = distance;
            }
        }
        if let Ok(val) = env::var("TICKFORGE_NEW_ACTORS_PER_PULSE") {
            if let Ok(count) = val.parse() {
                self.new_actors_per_pulse = count;
            }
        }
        if let Ok(val) = env::var("TICKFORGE_WORKER_THREADS") {
            if let Ok(threads) = val.parse() {
                self.worker_threads = threads;
            }
        }
        if let Ok(val) = env::var("TICKFORGE_DEBUG") {
            self.debug = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.tick_rate_ms < 100 || self.tick_rate_ms > 5000 {
            anyhow::bail!("Tick rate must be between 100ms and 5000ms");
        }

        if self.max_actors == 0 || self.max_actors > MAX_ACTOR_INDEX as usize {
            anyhow::bail!("Max actors must be between 1 and {}", MAX_ACTOR_INDEX);
        }

        if self.viewing_distance == 0 || self.viewing_distance > 32 {
            anyhow::bail!("Viewing distance must be between 1 and 32 tiles");
        }

        if self.new_actors_per_pulse == 0 {
            anyhow::bail!("New actors per pulse must be at least 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server_name, "Tickforge");
        assert_eq!(config.tick_rate_ms, 600);
        assert_eq!(config.max_actors, 2000);
        assert_eq!(config.viewing_distance, 15);
        assert_eq!(config.new_actors_per_pulse, 20);
    }

    #[test]
    fn test_validation() {
        let mut config = ServerConfig::default();
        assert!(config.validate().is_ok());

        config.tick_rate_ms = 50;
        assert!(config.validate().is_err());
        config.tick_rate_ms = 600;

        config.max_actors = 0;
        assert!(config.validate().is_err());
        config.max_actors = 5000;
        assert!(config.validate().is_err());
        config.max_actors = 2000;

        config.viewing_distance = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = tokio_test::block_on(ServerConfig::load()).unwrap();
        assert_eq!(config.tick_rate_ms, 600);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: ServerConfig = toml::from_str("tick_rate_ms = 300\n").unwrap();
        assert_eq!(config.tick_rate_ms, 300);
        assert_eq!(config.server_name, "Tickforge");
        assert_eq!(config.max_actors, 2000);
    }
}
