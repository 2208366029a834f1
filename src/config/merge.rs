use super::env::EnvConfig;
use super::yaml::YamlConfig;
use super::{AvatarConfig, ConfigError};

/// Layer environment values over defaults, then the YAML file over both.
pub fn merge_config(yaml: Option<YamlConfig>) -> Result<AvatarConfig, ConfigError> {
    let env = EnvConfig::load()?;
    Ok(merge(AvatarConfig::default(), env, yaml.unwrap_or_default()))
}

fn merge(mut config: AvatarConfig, env: EnvConfig, yaml: YamlConfig) -> AvatarConfig {
    let server = yaml.server.unwrap_or_default();
    let control = yaml.control.unwrap_or_default();
    let timeouts = yaml.timeouts.unwrap_or_default();
    let analysis = yaml.analysis.unwrap_or_default();
    let media = yaml.media.unwrap_or_default();

    let signaling = &mut config.signaling;
    if let Some(url) = server.url.or(env.server_url) {
        signaling.server_url = url;
    }
    if let Some(avatar_id) = server.avatar_id.or(env.avatar_id) {
        signaling.avatar_id = avatar_id;
    }
    if let Some(open) = server.open_data_channel {
        signaling.open_data_channel = open;
    }
    if let Some(ms) = timeouts.ice_gathering_ms.or(env.ice_gathering_timeout_ms) {
        signaling.ice_gathering_timeout_ms = ms;
    }
    if let Some(ms) = timeouts.answer_ms.or(env.answer_timeout_ms) {
        signaling.answer_timeout_ms = ms;
    }

    if let Some(mode) = control.mode.or(env.control_mode) {
        config.control.mode = mode;
    }
    if let Some(url) = control.ws_url.or(env.ws_url) {
        config.control.ws_url = Some(url);
    }
    if let Some(ms) = control.open_timeout_ms {
        config.control.open_timeout_ms = ms;
    }

    if let Some(fft_size) = analysis.fft_size {
        config.analysis.fft_size = fft_size;
    }
    if let Some(sensitivity) = analysis.sensitivity.or(env.sensitivity) {
        config.analysis.sensitivity = sensitivity;
    }
    if let Some(floor) = analysis.noise_floor {
        config.analysis.noise_floor = floor;
    }
    if let Some(min) = analysis.min_openness {
        config.analysis.min_openness = min;
    }

    if let Some(animation) = yaml.animation {
        config.animation = animation;
    }
    if let Some(blink) = yaml.blink {
        config.blink = blink;
    }

    if let Some(ms) = timeouts.media_ms {
        config.media.media_timeout_ms = ms;
    }
    if let Some(rate) = media.synthesized_sample_rate {
        config.media.synthesized_sample_rate = rate;
    }

    config
}
