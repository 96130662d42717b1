// src/main.rs
//! Lodestar entry point: load the config, attach the predictor and hand
//! control to the UCI loop.

use anyhow::Result;
use lodestar::config::EngineConfig;
use lodestar::predictor::UniformPredictor;
use lodestar::uci::UciHandler;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Diagnostics go to stderr; stdout is reserved for the UCI wire.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = EngineConfig::load("lodestar.toml")?;
    tracing::debug!(?config, "engine configured");

    // The uniform fallback stands in until a real network is attached;
    // both sides of the seam speak the same batch-predictor interface.
    let predictor = Arc::new(UniformPredictor::new(config.prediction_batch_size));

    let mut handler = UciHandler::new(config, predictor);
    handler.run();
    Ok(())
}
