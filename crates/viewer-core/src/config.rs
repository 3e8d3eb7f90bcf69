//! Viewer configuration.
//!
//! Settings resolve in layers: built-in defaults, then an optional TOML file, then
//! `SECURE_VIEWER_*` environment variables. Hosts apply their own overrides (CLI flags)
//! on top through the `with_*` builders and finish with [`ViewerConfig::validate`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_WINDOW_RADIUS: &str = "SECURE_VIEWER_WINDOW_RADIUS";
pub const ENV_DEBOUNCE_MS: &str = "SECURE_VIEWER_DEBOUNCE_MS";
pub const ENV_MAX_CONCURRENT_RENDERS: &str = "SECURE_VIEWER_MAX_CONCURRENT_RENDERS";
pub const ENV_ENDPOINT: &str = "SECURE_VIEWER_ENDPOINT";
pub const ENV_KEY_TIMEOUT_SECS: &str = "SECURE_VIEWER_KEY_TIMEOUT_SECS";
pub const ENV_WATERMARK_OPACITY: &str = "SECURE_VIEWER_WATERMARK_OPACITY";

/// Top-level configuration for a [`DocumentViewer`](crate::DocumentViewer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Pages kept resident on each side of the current page
    pub window_radius: u32,
    /// Quiet period before viewport input is acted upon
    pub debounce_ms: u64,
    /// Upper bound on renders running at the same time
    pub max_concurrent_renders: usize,
    pub default_scale: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    pub zoom_step: f32,
    /// Vertical gap between consecutive pages, in pixels
    pub page_gap_px: f32,
    /// Unscaled page height assumed when the decoder cannot report one
    pub estimated_page_height_px: f32,
    pub watermark: WatermarkConfig,
    pub protection: ProtectionConfig,
    pub key_gate: KeyGateConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            window_radius: 2,
            debounce_ms: 150,
            max_concurrent_renders: 3,
            default_scale: 1.2,
            min_scale: 0.5,
            max_scale: 3.0,
            zoom_step: 0.25,
            page_gap_px: 20.0,
            estimated_page_height_px: 800.0,
            watermark: WatermarkConfig::default(),
            protection: ProtectionConfig::default(),
            key_gate: KeyGateConfig::default(),
        }
    }
}

/// Overlay applied to every page of a document that may not be downloaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkConfig {
    /// Blend opacity in `(0, 1]`
    pub opacity: f32,
    /// Text angle; negative values tilt the baseline upwards
    pub angle_degrees: f32,
    /// `#rrggbb`
    pub color: String,
    /// Fraction of the page width the text spans
    pub width_fraction: f32,
    pub label: String,
    /// Used when the caller has no display name
    pub fallback_name: String,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            opacity: 0.15,
            angle_degrees: -30.0,
            color: "#ff0000".to_string(),
            width_fraction: 0.6,
            label: "VIEW ONLY".to_string(),
            fallback_name: "User".to_string(),
        }
    }
}

impl WatermarkConfig {
    /// Parses [`color`](Self::color) into RGB components.
    pub fn rgb(&self) -> Result<[u8; 3], ConfigError> {
        let invalid = || ConfigError::invalid("watermark.color", "expected #rrggbb");
        let hex = self.color.strip_prefix('#').ok_or_else(invalid)?;
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(invalid());
        }

        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| invalid())
        };
        Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionConfig {
    /// Offer a decoy file when a save is intercepted
    pub decoy_enabled: bool,
    pub denial_notice: String,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            decoy_enabled: true,
            denial_notice: "This document is view-only. Saving and downloading are disabled."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyGateConfig {
    /// Base URL of the content service
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for KeyGateConfig {
    fn default() -> Self {
        Self { endpoint: "http://localhost:3000".to_string(), timeout_secs: 30 }
    }
}

impl KeyGateConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ViewerConfig {
    /// Sets the number of pages kept on each side of the current page.
    pub fn with_window_radius(mut self, radius: u32) -> Self {
        self.window_radius = radius;
        self
    }

    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    pub fn with_max_concurrent_renders(mut self, limit: usize) -> Self {
        self.max_concurrent_renders = limit;
        self
    }

    pub fn with_default_scale(mut self, scale: f32) -> Self {
        self.default_scale = scale;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.key_gate.endpoint = endpoint.into();
        self
    }

    pub fn with_key_timeout_secs(mut self, secs: u64) -> Self {
        self.key_gate.timeout_secs = secs;
        self
    }

    pub fn with_watermark_opacity(mut self, opacity: f32) -> Self {
        self.watermark.opacity = opacity;
        self
    }

    pub fn with_decoy_enabled(mut self, enabled: bool) -> Self {
        self.protection.decoy_enabled = enabled;
        self
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Clamps `scale` into `[min_scale, max_scale]`.
    pub fn clamp_scale(&self, scale: f32) -> f32 {
        scale.clamp(self.min_scale, self.max_scale)
    }

    /// Reads a TOML file. Missing keys keep their defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_toml_string()?)?;
        Ok(())
    }

    /// Defaults overlaid with the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Overlays `SECURE_VIEWER_*` environment variables.
    ///
    /// Environment variables:
    /// - `SECURE_VIEWER_WINDOW_RADIUS`: pages on each side of the current page (default: 2)
    /// - `SECURE_VIEWER_DEBOUNCE_MS`: viewport debounce in milliseconds (default: 150)
    /// - `SECURE_VIEWER_MAX_CONCURRENT_RENDERS`: render parallelism (default: 3)
    /// - `SECURE_VIEWER_ENDPOINT`: content service base URL
    /// - `SECURE_VIEWER_KEY_TIMEOUT_SECS`: key exchange timeout (default: 30)
    /// - `SECURE_VIEWER_WATERMARK_OPACITY`: watermark opacity (default: 0.15)
    ///
    /// # Errors
    /// Returns an error if any variable holds an unparsable value.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Some(radius) = env_value(ENV_WINDOW_RADIUS)? {
            self.window_radius = radius;
        }
        if let Some(ms) = env_value(ENV_DEBOUNCE_MS)? {
            self.debounce_ms = ms;
        }
        if let Some(limit) = env_value(ENV_MAX_CONCURRENT_RENDERS)? {
            self.max_concurrent_renders = limit;
        }
        if let Some(endpoint) = env_value::<String>(ENV_ENDPOINT)? {
            self.key_gate.endpoint = endpoint;
        }
        if let Some(secs) = env_value(ENV_KEY_TIMEOUT_SECS)? {
            self.key_gate.timeout_secs = secs;
        }
        if let Some(opacity) = env_value(ENV_WATERMARK_OPACITY)? {
            self.watermark.opacity = opacity;
        }
        Ok(self)
    }

    /// Resolves defaults, an optional file, and the environment, then validates.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = base.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_renders == 0 {
            return Err(ConfigError::invalid("max_concurrent_renders", "must be at least 1"));
        }
        if !(self.min_scale > 0.0 && self.min_scale <= self.max_scale) {
            return Err(ConfigError::invalid("min_scale", "must be positive and <= max_scale"));
        }
        if !(self.min_scale..=self.max_scale).contains(&self.default_scale) {
            return Err(ConfigError::invalid("default_scale", "must lie within the scale bounds"));
        }
        if !(self.zoom_step > 0.0) {
            return Err(ConfigError::invalid("zoom_step", "must be positive"));
        }
        if !(self.page_gap_px >= 0.0) {
            return Err(ConfigError::invalid("page_gap_px", "must not be negative"));
        }
        if !(self.estimated_page_height_px > 0.0) {
            return Err(ConfigError::invalid("estimated_page_height_px", "must be positive"));
        }
        if !(self.watermark.opacity > 0.0 && self.watermark.opacity <= 1.0) {
            return Err(ConfigError::invalid("watermark.opacity", "must be in (0, 1]"));
        }
        if !(self.watermark.width_fraction > 0.0 && self.watermark.width_fraction <= 1.0) {
            return Err(ConfigError::invalid("watermark.width_fraction", "must be in (0, 1]"));
        }
        self.watermark.rgb()?;
        if self.key_gate.timeout_secs == 0 {
            return Err(ConfigError::invalid("key_gate.timeout_secs", "must be at least 1"));
        }
        let endpoint = self.key_gate.endpoint.as_str();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ConfigError::invalid("key_gate.endpoint", "must be an http(s) URL"));
        }
        Ok(())
    }
}

fn env_value<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::invalid(name, format!("cannot parse {raw:?}"))),
        Err(_) => Ok(None),
    }
}

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for configuration key {key}: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed configuration file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl ConfigError {
    fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue { key: key.into(), reason: reason.into() }
    }
}
