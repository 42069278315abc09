//! Environment-driven configuration.
//!
//! Everything has a code-level default except the realtime signaling
//! endpoint, which has no sensible fallback. `.env` files are honored via
//! `dotenvy` so local development matches deployment.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::core::realtime::RealtimeConfig;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is absent.
    #[error("missing environment variable {0}")]
    MissingVar(&'static str),

    /// A variable is present but unusable.
    #[error("invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CharivoConfig {
    /// Realtime voice session settings.
    pub realtime: RealtimeConfig,
}

impl CharivoConfig {
    /// Load from the process environment (and `.env`, when present).
    ///
    /// Recognized variables:
    /// - `CHARIVO_REALTIME_URL` (required): signaling endpoint
    /// - `CHARIVO_REALTIME_VOICE`: voice id
    /// - `CHARIVO_REALTIME_INSTRUCTIONS`: system instructions
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is fine; a malformed one is not worth dying
        // over either.
        let _ = dotenvy::dotenv();

        let signaling_url = std::env::var("CHARIVO_REALTIME_URL")
            .map_err(|_| ConfigError::MissingVar("CHARIVO_REALTIME_URL"))?;

        let realtime = RealtimeConfig {
            signaling_url,
            voice: std::env::var("CHARIVO_REALTIME_VOICE").ok(),
            instructions: std::env::var("CHARIVO_REALTIME_INSTRUCTIONS").ok(),
            ..Default::default()
        };
        realtime
            .validate()
            .map_err(|error| ConfigError::InvalidValue {
                var: "CHARIVO_REALTIME_URL",
                reason: error.to_string(),
            })?;

        debug!("configuration loaded from environment");
        Ok(Self { realtime })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment-variable tests mutate process state; keep them in one test
    // so they cannot race each other.
    #[test]
    fn test_from_env_round_trip() {
        unsafe {
            std::env::remove_var("CHARIVO_REALTIME_URL");
        }
        let error = CharivoConfig::from_env().err().unwrap();
        assert!(error.to_string().contains("CHARIVO_REALTIME_URL"));

        unsafe {
            std::env::set_var("CHARIVO_REALTIME_URL", "not a url");
        }
        let error = CharivoConfig::from_env().err().unwrap();
        assert!(matches!(error, ConfigError::InvalidValue { .. }));

        unsafe {
            std::env::set_var("CHARIVO_REALTIME_URL", "https://example.com/session");
            std::env::set_var("CHARIVO_REALTIME_VOICE", "alloy");
        }
        let config = CharivoConfig::from_env().unwrap();
        assert_eq!(config.realtime.signaling_url, "https://example.com/session");
        assert_eq!(config.realtime.voice.as_deref(), Some("alloy"));

        unsafe {
            std::env::remove_var("CHARIVO_REALTIME_URL");
            std::env::remove_var("CHARIVO_REALTIME_VOICE");
        }
    }
}
