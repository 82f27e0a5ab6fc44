use anyhow::{Context, Result};
use tracing::warn;

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

pub const TEMPERATURE_MIN: f32 = 0.0;
pub const TEMPERATURE_MAX: f32 = 2.0;
pub const DEFAULT_TEMPERATURE: f32 = 1.0;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub api_key: String,
    pub request_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    fn from_env_with(mut get_var: impl FnMut(&str) -> Option<String>) -> Result<Self> {
        let api_key = get_var("OPENAI_API_KEY")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .context("OPENAI_API_KEY is not set. No key, no ignition.")?;

        Ok(Self {
            api_url: get_var("OPENAI_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            api_key,
            request_timeout_secs: parse_timeout_secs(get_var("REQUEST_TIMEOUT_SECS").as_deref()),
        })
    }
}

fn parse_timeout_secs(raw: Option<&str>) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
}

/// Out-of-range temperatures are replaced with the default rather than
/// rejected, so a bad flag never aborts an otherwise valid run.
pub fn clamp_temperature(requested: f32) -> f32 {
    if (TEMPERATURE_MIN..=TEMPERATURE_MAX).contains(&requested) {
        return requested;
    }

    warn!(
        requested,
        min = TEMPERATURE_MIN,
        max = TEMPERATURE_MAX,
        default = DEFAULT_TEMPERATURE,
        "temperature outside allowed range; using default"
    );
    DEFAULT_TEMPERATURE
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{
        Config, DEFAULT_API_URL, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_TEMPERATURE,
        clamp_temperature, parse_timeout_secs,
    };

    fn config_from_pairs(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        Config::from_env_with(|key| vars.get(key).cloned())
    }

    #[test]
    fn from_env_requires_api_key() {
        let err = config_from_pairs(&[]).expect_err("missing key should fail");
        assert!(format!("{err:#}").contains("OPENAI_API_KEY"));
    }

    #[test]
    fn from_env_rejects_blank_api_key() {
        assert!(config_from_pairs(&[("OPENAI_API_KEY", "   ")]).is_err());
    }

    #[test]
    fn from_env_uses_defaults_for_optional_vars() {
        let cfg = config_from_pairs(&[("OPENAI_API_KEY", "sk-test")]).expect("key alone suffices");
        assert_eq!(cfg.api_key, "sk-test");
        assert_eq!(cfg.api_url, DEFAULT_API_URL);
        assert_eq!(cfg.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn from_env_reads_configured_values() {
        let cfg = config_from_pairs(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_API_URL", "http://localhost:8080/v1/chat/completions"),
            ("REQUEST_TIMEOUT_SECS", "15"),
        ])
        .expect("configured values should parse");
        assert_eq!(cfg.api_url, "http://localhost:8080/v1/chat/completions");
        assert_eq!(cfg.request_timeout_secs, 15);
    }

    #[test]
    fn parse_timeout_secs_uses_default_for_missing_or_invalid_values() {
        assert_eq!(parse_timeout_secs(None), DEFAULT_REQUEST_TIMEOUT_SECS);
        assert_eq!(
            parse_timeout_secs(Some("not-a-number")),
            DEFAULT_REQUEST_TIMEOUT_SECS
        );
        assert_eq!(parse_timeout_secs(Some("0")), DEFAULT_REQUEST_TIMEOUT_SECS);
        assert_eq!(parse_timeout_secs(Some("  45 ")), 45);
    }

    #[test]
    fn clamp_temperature_keeps_in_range_values() {
        assert_eq!(clamp_temperature(0.0), 0.0);
        assert_eq!(clamp_temperature(0.7), 0.7);
        assert_eq!(clamp_temperature(2.0), 2.0);
    }

    #[test]
    fn clamp_temperature_substitutes_default_when_out_of_range() {
        assert_eq!(clamp_temperature(5.0), DEFAULT_TEMPERATURE);
        assert_eq!(clamp_temperature(-0.1), DEFAULT_TEMPERATURE);
    }
}
