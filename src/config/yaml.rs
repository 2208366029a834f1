use std::path::Path;

use serde::Deserialize;

use super::ConfigError;
use super::ControlMode;
use crate::core::animation::{AnimationConfig, BlinkConfig};

/// Configuration file layout.
///
/// Every field is optional; anything left out falls back to environment
/// variables and then to defaults.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   url: "http://localhost:8010"
///   avatar_id: "ai_model"
///
/// control:
///   mode: "websocket"
///   ws_url: "ws://localhost:8010/ws"
///   open_timeout_ms: 5000
///
/// timeouts:
///   ice_gathering_ms: 10000
///   answer_ms: 15000
///   media_ms: 20000
///
/// analysis:
///   fft_size: 256
///   sensitivity: 5.0
///
/// animation:
///   mouth_smoothing: 0.4
///   blink_smoothing: 0.5
///
/// blink:
///   pulse_ms: 150
///   min_interval_ms: 3000
///   max_interval_ms: 5000
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub control: Option<ControlYaml>,
    pub timeouts: Option<TimeoutsYaml>,
    pub analysis: Option<AnalysisYaml>,
    pub animation: Option<AnimationConfig>,
    pub blink: Option<BlinkConfig>,
    pub media: Option<MediaYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub url: Option<String>,
    pub avatar_id: Option<String>,
    pub open_data_channel: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ControlYaml {
    pub mode: Option<ControlMode>,
    pub ws_url: Option<String>,
    pub open_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TimeoutsYaml {
    pub ice_gathering_ms: Option<u64>,
    pub answer_ms: Option<u64>,
    pub media_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AnalysisYaml {
    pub fft_size: Option<usize>,
    pub sensitivity: Option<f32>,
    pub noise_floor: Option<f32>,
    pub min_openness: Option<f32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct MediaYaml {
    pub synthesized_sample_rate: Option<u32>,
}

impl YamlConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}
