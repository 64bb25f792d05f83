//! Server settings: optional TOML file layered under `RING_STREAM_*`
//! environment variables.
//!
//! | Key                                     | Default   |
//! |-----------------------------------------|-----------|
//! | `RING_STREAM_SESSION`                   | `default` |
//! | `RING_STREAM_LOG_FILTER`                | `ring_stream=debug` |
//! | `RING_STREAM_STREAMING__DEFAULT_WIDTH_METERS` | `5000` |
//! | `RING_STREAM_STREAMING__MAX_RADIUS_METERS`    | `264000000` |
//!
//! Nested keys use a double underscore.

use crate::types::StreamingConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_PREFIX: &str = "RING_STREAM";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Session name stamped on every outbound event.
    pub session: String,
    /// `tracing-subscriber` filter directive.
    pub log_filter: String,
    pub streaming: StreamingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            session: "default".into(),
            log_filter: "ring_stream=debug".into(),
            streaming: StreamingConfig::default(),
        }
    }
}

impl Settings {
    /// Load from `path` (if given) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, environment())
    }

    /// Same as [`Settings::load`] with an explicit environment source.
    pub fn load_with_env(path: Option<&Path>, env: config::Environment) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings: Settings = builder
            .add_source(env)
            .build()
            .context("failed to assemble settings")?
            .try_deserialize()
            .context("invalid settings")?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.streaming;
        anyhow::ensure!(
            s.min_floor <= s.max_floor,
            "min_floor {} above max_floor {}",
            s.min_floor,
            s.max_floor
        );
        anyhow::ensure!(
            s.max_half_width_meters > 0.0,
            "max_half_width_meters must be positive"
        );
        anyhow::ensure!(s.max_radius_meters > 0, "max_radius_meters must be positive");
        Ok(())
    }
}

/// `RING_STREAM_*` variables, nested with `__`, values parsed as numbers
/// where possible.
pub fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
