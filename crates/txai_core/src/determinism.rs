//! Run-wide reproducibility switch.
//!
//! Deterministic mode is on by default and can be set in the run config.
//! The [`DETERMINISTIC_ENV`] environment variable overrides the config so a
//! batch of runs can be flipped without editing YAML files.

use burn::prelude::Backend;

use crate::error::{CoreError, Result};
use crate::seed::Seed;

/// Environment variable controlling deterministic mode.
pub const DETERMINISTIC_ENV: &str = "TXAI_DETERMINISTIC";

/// Whether random streams are seeded from the config or from entropy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeterministicMode {
    enabled: bool,
}

impl DeterministicMode {
    /// Deterministic mode on.
    #[must_use]
    pub const fn on() -> Self {
        Self { enabled: true }
    }

    /// Deterministic mode off.
    #[must_use]
    pub const fn off() -> Self {
        Self { enabled: false }
    }

    /// Resolve the mode from the config flag and [`DETERMINISTIC_ENV`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidEnvFlag`] if the variable is set to
    /// something that is not a boolean.
    pub fn resolve(config_flag: bool) -> Result<Self> {
        let env = std::env::var(DETERMINISTIC_ENV).ok();
        Self::from_sources(config_flag, env.as_deref())
    }

    /// Resolve the mode from an explicit environment value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidEnvFlag`] for an unparseable value.
    pub fn from_sources(config_flag: bool, env_value: Option<&str>) -> Result<Self> {
        let enabled = match env_value.map(str::trim) {
            None | Some("") => config_flag,
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => true,
                "0" | "false" | "off" | "no" => false,
                _ => {
                    return Err(CoreError::InvalidEnvFlag {
                        var: DETERMINISTIC_ENV.to_string(),
                        value: v.to_string(),
                    })
                }
            },
        };
        if enabled != config_flag {
            tracing::info!(
                config = config_flag,
                enabled,
                "{DETERMINISTIC_ENV} overrides deterministic setting from config"
            );
        }
        Ok(Self { enabled })
    }

    /// True when runs must be reproducible.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The seed to use for a random stream configured with `configured`.
    #[must_use]
    pub fn seed(&self, configured: Seed) -> Seed {
        if self.enabled {
            configured
        } else {
            Seed::from_entropy()
        }
    }

    /// Seed the backend's global generator (parameter init, dropout masks).
    ///
    /// Returns the seed that was applied.
    pub fn apply<B: Backend>(&self, configured: Seed) -> Seed {
        let seed = self.seed(configured);
        B::seed(seed.value());
        tracing::debug!(seed = seed.value(), deterministic = self.enabled, "seeded backend");
        seed
    }
}

impl Default for DeterministicMode {
    fn default() -> Self {
        Self::on()
    }
}
