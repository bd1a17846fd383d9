//! Configuration management for reelcast
//!
//! Handles config file loading/saving and environment overrides.
//! Config is stored at ~/.config/reelcast/config.toml

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::stream::PlayerType;

/// Default subtitle language (Stremio uses ISO 639-2 codes)
pub const DEFAULT_SUBTITLE_LANG: &str = "eng";
/// Seconds between casting device scans
pub const DEFAULT_DEVICE_POLL_SECS: u64 = 10;
/// Delay before the video surface receives its source
pub const DEFAULT_BACKEND_START_DELAY_MS: u64 = 3000;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// TMDB API key (v4 read access token)
    pub tmdb_api_key: Option<String>,
    /// Merge whole-season torrents into show results
    pub season_complete: Option<bool>,
    /// Expose per-quality start buttons (UI only)
    pub manual_quality_selection: Option<bool>,
    /// Caption track marked default
    pub subtitle_language: Option<String>,
    /// Languages requested from the subtitle provider
    pub subtitle_languages: Option<Vec<String>>,
    /// Port webtorrent serves the stream on
    pub stream_port: Option<u16>,
    /// Port the subtitle file server listens on
    pub subtitle_port: Option<u16>,
    pub device_poll_secs: Option<u64>,
    pub backend_start_delay_ms: Option<u64>,
    pub webtorrent_path: Option<String>,
    pub catt_path: Option<String>,
    /// External player for the `external` backend ("vlc" or "mpv")
    pub local_player: Option<String>,
}

impl Config {
    /// Get config file path (~/.config/reelcast/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("reelcast").join("config.toml"))
    }

    /// Load config from file, or return default if not found
    pub fn load() -> Self {
        Self::path()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|s| Self::from_toml(&s).ok())
            .unwrap_or_default()
            .with_env_overrides()
    }

    /// Load config from an explicit path
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Self::from_toml(&raw)?.with_env_overrides())
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::path().ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Apply environment overrides on top of file values
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("TMDB_API_KEY") {
            self.tmdb_api_key = Some(key);
        }
        if let Some(flag) = env_flag("REELCAST_SEASON_COMPLETE") {
            self.season_complete = Some(flag);
        }
        if let Some(flag) = env_flag("REELCAST_MANUAL_QUALITY") {
            self.manual_quality_selection = Some(flag);
        }
        if let Ok(lang) = std::env::var("REELCAST_SUBTITLE_LANG") {
            self.subtitle_language = Some(lang);
        }
        self
    }

    pub fn season_complete(&self) -> bool {
        self.season_complete.unwrap_or(false)
    }

    pub fn manual_quality_selection(&self) -> bool {
        self.manual_quality_selection.unwrap_or(false)
    }

    pub fn subtitle_language(&self) -> String {
        self.subtitle_language
            .clone()
            .unwrap_or_else(|| DEFAULT_SUBTITLE_LANG.to_string())
    }

    /// Requested languages always include the default language
    pub fn subtitle_languages(&self) -> Vec<String> {
        let default = self.subtitle_language();
        let mut langs = self.subtitle_languages.clone().unwrap_or_default();
        if !langs.iter().any(|l| l.eq_ignore_ascii_case(&default)) {
            langs.insert(0, default);
        }
        langs
    }

    pub fn stream_port(&self) -> u16 {
        self.stream_port.unwrap_or(8888)
    }

    pub fn subtitle_port(&self) -> u16 {
        self.subtitle_port.unwrap_or(8889)
    }

    pub fn device_poll_interval(&self) -> Duration {
        Duration::from_secs(self.device_poll_secs.unwrap_or(DEFAULT_DEVICE_POLL_SECS).max(1))
    }

    pub fn backend_start_delay(&self) -> Duration {
        Duration::from_millis(
            self.backend_start_delay_ms
                .unwrap_or(DEFAULT_BACKEND_START_DELAY_MS),
        )
    }

    pub fn webtorrent_path(&self) -> String {
        self.webtorrent_path
            .clone()
            .unwrap_or_else(|| "webtorrent".to_string())
    }

    pub fn catt_path(&self) -> String {
        self.catt_path.clone().unwrap_or_else(|| "catt".to_string())
    }

    pub fn local_player(&self) -> PlayerType {
        match self.local_player.as_deref() {
            Some(p) if p.eq_ignore_ascii_case("mpv") => PlayerType::Mpv,
            _ => PlayerType::Vlc,
        }
    }

    /// Directory subtitles are downloaded into
    pub fn subtitle_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("reelcast")
            .join("subtitles")
    }
}

/// Parse a boolean feature flag ("true"/"1"/"on")
fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "on" | "yes"))
}
