use std::env;
use std::str::FromStr;

use super::{ConfigError, ControlMode};

pub const SERVER_URL_VAR: &str = "AVATAR_SERVER_URL";
pub const AVATAR_ID_VAR: &str = "AVATAR_ID";
pub const CONTROL_MODE_VAR: &str = "AVATAR_CONTROL_MODE";
pub const WS_URL_VAR: &str = "AVATAR_WS_URL";
pub const ICE_TIMEOUT_VAR: &str = "AVATAR_ICE_TIMEOUT_MS";
pub const ANSWER_TIMEOUT_VAR: &str = "AVATAR_ANSWER_TIMEOUT_MS";
pub const SENSITIVITY_VAR: &str = "AVATAR_AUDIO_SENSITIVITY";

/// Values read from the process environment. `None` means unset.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub server_url: Option<String>,
    pub avatar_id: Option<String>,
    pub control_mode: Option<ControlMode>,
    pub ws_url: Option<String>,
    pub ice_gathering_timeout_ms: Option<u64>,
    pub answer_timeout_ms: Option<u64>,
    pub sensitivity: Option<f32>,
}

impl EnvConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            server_url: string_var(SERVER_URL_VAR),
            avatar_id: string_var(AVATAR_ID_VAR),
            control_mode: parsed_var(CONTROL_MODE_VAR)?,
            ws_url: string_var(WS_URL_VAR),
            ice_gathering_timeout_ms: parsed_var(ICE_TIMEOUT_VAR)?,
            answer_timeout_ms: parsed_var(ANSWER_TIMEOUT_VAR)?,
            sensitivity: parsed_var(SENSITIVITY_VAR)?,
        })
    }
}

fn string_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = string_var(name) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|e: T::Err| ConfigError::InvalidEnv {
            var: name.to_string(),
            value: raw.clone(),
            message: e.to_string(),
        })
}
