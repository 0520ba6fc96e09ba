use std::env;
use std::time::Duration;

use sigil_contracts::models::DEFAULT_IMAGE_MODEL;

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEMPERATURE: f32 = 1.0;
pub const DEFAULT_REQUEST_TIMEOUT_S: f64 = 90.0;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Requested model; resolved through the model selector at session start.
    pub model: String,
    /// Sampling temperature sent with every call, clamped to `0.0..=2.0`.
    pub temperature: f32,
    pub request_timeout: Duration,
    pub api_base: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_IMAGE_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            request_timeout: Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_S),
            api_base: DEFAULT_GEMINI_API_BASE.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            model: lookup("SIGIL_IMAGE_MODEL").unwrap_or(defaults.model),
            temperature: clamp_temperature(
                lookup("SIGIL_TEMPERATURE")
                    .and_then(|raw| raw.trim().parse::<f32>().ok())
                    .unwrap_or(defaults.temperature),
            ),
            request_timeout: Duration::from_secs_f64(value_as_f64(
                lookup("SIGIL_REQUEST_TIMEOUT").as_deref(),
                DEFAULT_REQUEST_TIMEOUT_S,
                15.0,
                300.0,
            )),
            api_base: lookup("GEMINI_API_BASE")
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.api_base),
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = model.filter(|value| !value.trim().is_empty()) {
            self.model = model.trim().to_string();
        }
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        if let Some(temperature) = temperature {
            self.temperature = clamp_temperature(temperature);
        }
        self
    }
}

fn clamp_temperature(value: f32) -> f32 {
    if value.is_nan() {
        return DEFAULT_TEMPERATURE;
    }
    value.clamp(0.0, 2.0)
}

fn value_as_f64(raw: Option<&str>, default: f64, min: f64, max: f64) -> f64 {
    raw.and_then(|text| text.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(default)
        .clamp(min, max)
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
