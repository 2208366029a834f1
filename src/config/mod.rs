//! Avatar configuration.
//!
//! Sources, highest priority first: a YAML file, environment variables,
//! values from a `.env` file, defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Layering the sources
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use talking_avatar::config::AvatarConfig;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Environment only
//! let config = AvatarConfig::from_env()?;
//!
//! // YAML file with environment fallbacks
//! let config = AvatarConfig::from_file(Path::new("avatar.yaml"))?;
//! println!("Negotiating with {}", config.signaling.offer_url());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod env;
mod merge;
mod validation;
mod yaml;

pub use env::{
    ANSWER_TIMEOUT_VAR, AVATAR_ID_VAR, CONTROL_MODE_VAR, ICE_TIMEOUT_VAR, SENSITIVITY_VAR,
    SERVER_URL_VAR, WS_URL_VAR,
};
pub use yaml::YamlConfig;

use crate::core::animation::{AnimationConfig, BlinkConfig};
use crate::core::audio::AnalysisConfig;
use crate::core::signaling::SignalingConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to parse YAML config: {0}")]
    Parse(String),

    #[error("Invalid value {value:?} for {var}: {message}")]
    InvalidEnv {
        var: String,
        value: String,
        message: String,
    },

    #[error("Invalid {field}: {message}")]
    Invalid { field: String, message: String },
}

/// Substrate carrying control messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    /// In-band data channel of the negotiated connection
    #[default]
    DataChannel,
    /// Independent `/ws` socket
    WebSocket,
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMode::DataChannel => write!(f, "datachannel"),
            ControlMode::WebSocket => write!(f, "websocket"),
        }
    }
}

impl FromStr for ControlMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "datachannel" | "data_channel" | "data-channel" => Ok(ControlMode::DataChannel),
            "websocket" | "ws" => Ok(ControlMode::WebSocket),
            other => Err(format!("unknown control mode '{other}'")),
        }
    }
}

/// Control channel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub mode: ControlMode,
    /// Socket endpoint, required in websocket mode
    pub ws_url: Option<String>,
    /// How long sends wait for the channel to open
    pub open_timeout_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            mode: ControlMode::DataChannel,
            ws_url: None,
            open_timeout_ms: 5_000,
        }
    }
}

/// Media readiness settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// How long to wait for the remote video track before reporting the
    /// media as unavailable (0 waits forever)
    pub media_timeout_ms: u64,
    /// Sample rate of PCM carried in `audio` control messages
    pub synthesized_sample_rate: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            media_timeout_ms: 20_000,
            synthesized_sample_rate: 24_000,
        }
    }
}

/// Complete avatar configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    pub signaling: SignalingConfig,
    pub control: ControlConfig,
    pub analysis: AnalysisConfig,
    pub animation: AnimationConfig,
    pub blink: BlinkConfig,
    pub media: MediaConfig,
}

impl AvatarConfig {
    /// Load from environment variables, with `.env` values as fallback.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Real environment variables win over .env entries.
        let _ = dotenvy::dotenv();
        let config = merge::merge_config(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load a YAML file; fields it omits come from the environment.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let yaml = YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml))?;
        validation::validate(&config)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    fn cleanup_env_vars() {
        unsafe {
            for var in [
                SERVER_URL_VAR,
                AVATAR_ID_VAR,
                CONTROL_MODE_VAR,
                WS_URL_VAR,
                ICE_TIMEOUT_VAR,
                ANSWER_TIMEOUT_VAR,
                SENSITIVITY_VAR,
            ] {
                env::remove_var(var);
            }
        }
    }

    #[test]
    fn test_control_mode_parsing() {
        assert_eq!("WebSocket".parse::<ControlMode>(), Ok(ControlMode::WebSocket));
        assert_eq!("datachannel".parse::<ControlMode>(), Ok(ControlMode::DataChannel));
        assert!("carrier-pigeon".parse::<ControlMode>().is_err());
        assert_eq!(ControlMode::WebSocket.to_string(), "websocket");
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        cleanup_env_vars();
        let config = AvatarConfig::from_env().unwrap();
        assert_eq!(config.signaling.server_url, "http://localhost:8010");
        assert_eq!(config.signaling.avatar_id, "ai_model");
        assert_eq!(config.analysis.fft_size, 256);
        assert_eq!(config.media.media_timeout_ms, 20_000);
    }

    #[test]
    #[serial]
    fn test_from_env_validates() {
        cleanup_env_vars();
        unsafe {
            env::set_var(CONTROL_MODE_VAR, "websocket");
        }
        let err = AvatarConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("control.ws_url"));

        unsafe {
            env::set_var(WS_URL_VAR, "ws://localhost:8010/ws");
        }
        let config = AvatarConfig::from_env().unwrap();
        assert_eq!(config.control.mode, ControlMode::WebSocket);
        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("avatar.yaml");
        fs::write(
            &config_path,
            r#"
server:
  avatar_id: "yaml-avatar"
analysis:
  sensitivity: 4.0
"#,
        )
        .unwrap();

        unsafe {
            env::set_var(AVATAR_ID_VAR, "env-avatar");
            env::set_var(SENSITIVITY_VAR, "1.5");
            env::set_var(ICE_TIMEOUT_VAR, "3000");
        }

        let config = AvatarConfig::from_file(&config_path).unwrap();
        assert_eq!(config.signaling.avatar_id, "yaml-avatar");
        assert_eq!(config.analysis.sensitivity, 4.0);
        assert_eq!(config.signaling.ice_gathering_timeout_ms, 3000);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file() {
        cleanup_env_vars();
        let result = AvatarConfig::from_file(Path::new("/nonexistent/avatar.yaml"));
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    #[serial]
    fn test_from_file_rejects_invalid_values() {
        cleanup_env_vars();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("avatar.yaml");
        fs::write(
            &config_path,
            r#"
blink:
  min_interval_ms: 5000
  max_interval_ms: 3000
"#,
        )
        .unwrap();

        assert!(matches!(
            AvatarConfig::from_file(&config_path),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
