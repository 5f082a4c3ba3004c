use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::audio::bands::Estimator;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub live: LiveConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Used when the event stream does not send its own `retry:` hint.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// How long to wait for any job update before giving up.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// How often a reader on a quiet feed checks whether it was closed. Also
    /// bounds the wait for a feed's response headers.
    #[serde(default = "default_feed_poll_ms")]
    pub feed_poll_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_peak_bars")]
    pub peak_bars: usize,
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
    #[serde(default = "default_max_frames")]
    pub max_frames: usize,
    #[serde(default)]
    pub estimator: Estimator,
}

#[derive(Debug, Deserialize)]
pub struct LiveConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    #[serde(default = "default_stereo_throttle")]
    pub stereo_throttle: u32,
    #[serde(default = "default_spectrum_points")]
    pub spectrum_points: usize,
    #[serde(default = "default_vectorscope_points")]
    pub vectorscope_points: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
            feed_poll_ms: default_feed_poll_ms(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            peak_bars: default_peak_bars(),
            frame_size: default_frame_size(),
            max_frames: default_max_frames(),
            estimator: Estimator::default(),
        }
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            fft_size: default_fft_size(),
            smoothing: default_smoothing(),
            stereo_throttle: default_stereo_throttle(),
            spectrum_points: default_spectrum_points(),
            vectorscope_points: default_vectorscope_points(),
        }
    }
}

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:4000";

fn default_base_url() -> String { DEFAULT_BASE_URL.into() }
fn default_reconnect_delay_ms() -> u64 { 3000 }
fn default_idle_timeout_secs() -> u64 { 900 }
fn default_feed_poll_ms() -> u64 { 1000 }
fn default_peak_bars() -> usize { crate::audio::peaks::DEFAULT_BAR_COUNT }
fn default_frame_size() -> usize { crate::audio::bands::DEFAULT_FRAME_SIZE }
fn default_max_frames() -> usize { crate::audio::bands::DEFAULT_MAX_FRAMES }
fn default_fps() -> u32 { 60 }
fn default_fft_size() -> usize { crate::live::analyser::DEFAULT_FFT_SIZE }
fn default_smoothing() -> f32 { crate::live::analyser::DEFAULT_SMOOTHING }
fn default_stereo_throttle() -> u32 { crate::live::stereo::DEFAULT_THROTTLE }
fn default_spectrum_points() -> usize { 128 }
fn default_vectorscope_points() -> usize { crate::render::terminal::DEFAULT_VECTORSCOPE_POINTS }

/// `explicit`, else the first of `./mixscope.toml`,
/// `~/.config/mixscope/config.toml` and the platform config dir that exists.
pub fn discover(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("mixscope.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("mixscope").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("mixscope").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            log::warn!("Invalid config {}: {}", path.display(), e);
            None
        }
    }
}
