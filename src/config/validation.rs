use url::Url;

use super::{AvatarConfig, ConfigError, ControlMode};
use crate::core::audio::pcm::MAX_FFT_SIZE;

const MIN_FFT_SIZE: usize = 32;

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        message: message.into(),
    }
}

pub fn validate(config: &AvatarConfig) -> Result<(), ConfigError> {
    validate_urls(config)?;
    validate_analysis(config)?;
    validate_animation(config)?;
    validate_blink(config)?;
    Ok(())
}

fn validate_urls(config: &AvatarConfig) -> Result<(), ConfigError> {
    let server = Url::parse(&config.signaling.server_url)
        .map_err(|e| invalid("signaling.server_url", e.to_string()))?;
    if !matches!(server.scheme(), "http" | "https") {
        return Err(invalid(
            "signaling.server_url",
            format!("expected http or https, got {}", server.scheme()),
        ));
    }
    if config.signaling.avatar_id.trim().is_empty() {
        return Err(invalid("signaling.avatar_id", "must not be empty"));
    }

    match (&config.control.mode, &config.control.ws_url) {
        (_, Some(ws_url)) => {
            let url = Url::parse(ws_url).map_err(|e| invalid("control.ws_url", e.to_string()))?;
            if !matches!(url.scheme(), "ws" | "wss") {
                return Err(invalid(
                    "control.ws_url",
                    format!("expected ws or wss, got {}", url.scheme()),
                ));
            }
        }
        (ControlMode::WebSocket, None) => {
            return Err(invalid("control.ws_url", "required in websocket mode"));
        }
        (ControlMode::DataChannel, None) => {}
    }
    Ok(())
}

fn validate_analysis(config: &AvatarConfig) -> Result<(), ConfigError> {
    let analysis = &config.analysis;
    if !analysis.sensitivity.is_finite() || analysis.sensitivity < 0.0 {
        return Err(invalid("analysis.sensitivity", "must be >= 0"));
    }
    if !analysis.fft_size.is_power_of_two()
        || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&analysis.fft_size)
    {
        return Err(invalid(
            "analysis.fft_size",
            format!("must be a power of two in {MIN_FFT_SIZE}..={MAX_FFT_SIZE}"),
        ));
    }
    if !(0.0..=255.0).contains(&analysis.noise_floor) {
        return Err(invalid("analysis.noise_floor", "must be within 0..=255"));
    }
    if !(0.0..=1.0).contains(&analysis.min_openness) {
        return Err(invalid("analysis.min_openness", "must be within 0..=1"));
    }
    Ok(())
}

fn validate_animation(config: &AvatarConfig) -> Result<(), ConfigError> {
    for (field, rate) in [
        ("animation.mouth_smoothing", config.animation.mouth_smoothing),
        ("animation.blink_smoothing", config.animation.blink_smoothing),
    ] {
        if !(rate > 0.0 && rate <= 1.0) {
            return Err(invalid(field, "must be within (0, 1]"));
        }
    }
    Ok(())
}

fn validate_blink(config: &AvatarConfig) -> Result<(), ConfigError> {
    let blink = &config.blink;
    if blink.min_interval_ms >= blink.max_interval_ms {
        return Err(invalid(
            "blink.min_interval_ms",
            "must be less than blink.max_interval_ms",
        ));
    }
    if blink.pulse_ms == 0 || blink.pulse_ms >= blink.min_interval_ms {
        return Err(invalid(
            "blink.pulse_ms",
            "must be positive and shorter than blink.min_interval_ms",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(result: Result<(), ConfigError>) -> String {
        match result {
            Err(ConfigError::Invalid { field, .. }) => field,
            other => panic!("expected invalid field, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        validate(&AvatarConfig::default()).unwrap();
    }

    #[test]
    fn test_rejects_negative_sensitivity() {
        let mut config = AvatarConfig::default();
        config.analysis.sensitivity = -1.0;
        assert_eq!(field_of(validate(&config)), "analysis.sensitivity");
    }

    #[test]
    fn test_rejects_bad_fft_size() {
        let mut config = AvatarConfig::default();
        config.analysis.fft_size = 300;
        assert_eq!(field_of(validate(&config)), "analysis.fft_size");
        config.analysis.fft_size = 16;
        assert_eq!(field_of(validate(&config)), "analysis.fft_size");
    }

    #[test]
    fn test_rejects_smoothing_out_of_range() {
        let mut config = AvatarConfig::default();
        config.animation.mouth_smoothing = 0.0;
        assert_eq!(field_of(validate(&config)), "animation.mouth_smoothing");

        let mut config = AvatarConfig::default();
        config.animation.blink_smoothing = 1.5;
        assert_eq!(field_of(validate(&config)), "animation.blink_smoothing");
    }

    #[test]
    fn test_rejects_inverted_blink_range() {
        let mut config = AvatarConfig::default();
        config.blink.min_interval_ms = 5000;
        config.blink.max_interval_ms = 3000;
        assert_eq!(field_of(validate(&config)), "blink.min_interval_ms");

        let mut config = AvatarConfig::default();
        config.blink.pulse_ms = 4000;
        assert_eq!(field_of(validate(&config)), "blink.pulse_ms");
    }

    #[test]
    fn test_websocket_mode_requires_url() {
        let mut config = AvatarConfig::default();
        config.control.mode = ControlMode::WebSocket;
        assert_eq!(field_of(validate(&config)), "control.ws_url");

        config.control.ws_url = Some("http://wrong-scheme".to_string());
        assert_eq!(field_of(validate(&config)), "control.ws_url");

        config.control.ws_url = Some("ws://localhost:8010/ws".to_string());
        validate(&config).unwrap();
    }

    #[test]
    fn test_rejects_unparseable_server_url() {
        let mut config = AvatarConfig::default();
        config.signaling.server_url = "not a url".to_string();
        assert_eq!(field_of(validate(&config)), "signaling.server_url");
    }
}
