// src/config.rs
//! Engine configuration.
//!
//! All tunables are parsed once at startup from an optional `lodestar.toml`
//! next to the binary and handed around as an immutable value. UCI
//! `setoption` overrides individual numeric fields before the worker group
//! is spawned.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// All recognized engine options with their defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Self-play worker threads.
    pub num_workers: usize,
    /// Positions per predictor call.
    pub prediction_batch_size: usize,
    /// Search worker threads.
    pub search_threads: usize,
    /// In-flight games per search worker.
    pub search_parallelism: usize,
    /// Simulations per move in self-play.
    pub num_simulations: i32,
    /// Self-play game length cap, in plies.
    pub max_moves: u32,
    /// Self-play moves sampled by visit temperature before going greedy.
    pub num_sampling_moves: u32,

    pub root_dirichlet_alpha: f32,
    pub root_exploration_fraction: f32,
    pub exploration_rate_base: f32,
    pub exploration_rate_init: f32,

    pub use_sble_puct: bool,
    pub linear_exploration_rate: f32,
    pub linear_exploration_base: f32,
    pub virtual_loss_coefficient: f32,
    pub moving_average_build: f32,
    pub moving_average_cap: f32,
    pub backpropagation_puct_threshold: f32,

    pub prediction_cache_request_gibibytes: usize,
    pub prediction_cache_min_gibibytes: usize,
    /// Plies from the search root beyond which evaluations bypass the cache.
    pub prediction_cache_max_ply: u32,

    pub time_control_safety_buffer_milliseconds: i64,
    pub time_control_fraction_of_remaining: i64,
    pub search_gui_update_interval_nodes: i64,

    /// Directory with Syzygy tables; probing is disabled when unset.
    pub syzygy_path: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            prediction_batch_size: 64,
            search_threads: 4,
            search_parallelism: 8,
            num_simulations: 800,
            max_moves: 512,
            num_sampling_moves: 30,
            root_dirichlet_alpha: 0.3,
            root_exploration_fraction: 0.25,
            exploration_rate_base: 19652.0,
            exploration_rate_init: 1.25,
            use_sble_puct: false,
            linear_exploration_rate: 0.1,
            linear_exploration_base: 1.0,
            virtual_loss_coefficient: 1.0,
            moving_average_build: 1.0,
            moving_average_cap: 10000.0,
            backpropagation_puct_threshold: 0.0,
            prediction_cache_request_gibibytes: 1,
            prediction_cache_min_gibibytes: 1,
            prediction_cache_max_ply: 12,
            time_control_safety_buffer_milliseconds: 100,
            time_control_fraction_of_remaining: 28,
            search_gui_update_interval_nodes: 10000,
            syzygy_path: None,
        }
    }
}

impl EngineConfig {
    /// Load from a toml file, falling back to defaults when the file is absent.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = match std::fs::read_to_string(path) {
            Ok(text) => toml::from_str::<EngineConfig>(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => EngineConfig::default(),
            Err(e) => return Err(e.into()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search_threads == 0 {
            return Err(ConfigError::Invalid("search_threads must be > 0"));
        }
        if self.search_parallelism == 0 {
            return Err(ConfigError::Invalid("search_parallelism must be > 0"));
        }
        if self.prediction_batch_size == 0 {
            return Err(ConfigError::Invalid("prediction_batch_size must be > 0"));
        }
        if !(self.exploration_rate_base.is_finite() && self.exploration_rate_base > 0.0) {
            return Err(ConfigError::Invalid(
                "exploration_rate_base must be finite and > 0",
            ));
        }
        if !(self.virtual_loss_coefficient.is_finite() && self.virtual_loss_coefficient >= 0.0) {
            return Err(ConfigError::Invalid(
                "virtual_loss_coefficient must be finite and >= 0",
            ));
        }
        if !(self.moving_average_cap >= 1.0) {
            return Err(ConfigError::Invalid("moving_average_cap must be >= 1"));
        }
        if !(self.moving_average_build > 0.0) {
            return Err(ConfigError::Invalid("moving_average_build must be > 0"));
        }
        if self.time_control_fraction_of_remaining <= 0 {
            return Err(ConfigError::Invalid(
                "time_control_fraction_of_remaining must be > 0",
            ));
        }
        if self.prediction_cache_min_gibibytes > self.prediction_cache_request_gibibytes {
            return Err(ConfigError::Invalid(
                "prediction_cache_min_gibibytes exceeds requested size",
            ));
        }
        Ok(())
    }

    /// Apply a numeric UCI `setoption` by its canonical name. Returns false
    /// for unknown names.
    pub fn set_numeric_option(&mut self, name: &str, value: f64) -> bool {
        match name {
            "threads" | "search_threads" => self.search_threads = (value as usize).max(1),
            "parallelism" | "search_parallelism" => {
                self.search_parallelism = (value as usize).max(1)
            }
            "simulations" | "num_simulations" => self.num_simulations = (value as i32).max(1),
            "prediction_batch_size" => self.prediction_batch_size = (value as usize).max(1),
            "root_dirichlet_alpha" => self.root_dirichlet_alpha = value as f32,
            "root_exploration_fraction" => self.root_exploration_fraction = value as f32,
            "exploration_rate_base" => self.exploration_rate_base = value as f32,
            "exploration_rate_init" => self.exploration_rate_init = value as f32,
            "linear_exploration_rate" => self.linear_exploration_rate = value as f32,
            "linear_exploration_base" => self.linear_exploration_base = value as f32,
            "virtual_loss_coefficient" => self.virtual_loss_coefficient = value as f32,
            "moving_average_build" => self.moving_average_build = value as f32,
            "moving_average_cap" => self.moving_average_cap = value as f32,
            "backpropagation_puct_threshold" => {
                self.backpropagation_puct_threshold = value as f32
            }
            "prediction_cache_request_gibibytes" => {
                self.prediction_cache_request_gibibytes = (value as usize).max(1)
            }
            "prediction_cache_max_ply" => self.prediction_cache_max_ply = value as u32,
            "time_control_safety_buffer_milliseconds" => {
                self.time_control_safety_buffer_milliseconds = value as i64
            }
            "time_control_fraction_of_remaining" => {
                self.time_control_fraction_of_remaining = (value as i64).max(1)
            }
            "search_gui_update_interval_nodes" => {
                self.search_gui_update_interval_nodes = (value as i64).max(1)
            }
            _ => return false,
        }
        true
    }

    pub fn set_bool_option(&mut self, name: &str, value: bool) -> bool {
        match name {
            "use_sble_puct" => self.use_sble_puct = value,
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn parses_partial_toml() {
        let config: EngineConfig =
            toml::from_str("search_threads = 2\nuse_sble_puct = true").unwrap();
        assert_eq!(config.search_threads, 2);
        assert!(config.use_sble_puct);
        assert_eq!(config.search_parallelism, 8);
    }

    #[test]
    fn rejects_zero_threads() {
        let mut config = EngineConfig::default();
        config.search_threads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn numeric_option_round_trip() {
        let mut config = EngineConfig::default();
        assert!(config.set_numeric_option("threads", 7.0));
        assert_eq!(config.search_threads, 7);
        assert!(!config.set_numeric_option("no_such_option", 1.0));
    }
}
