//! Data structures and types for reelcast
//!
//! Contains all shared models used across the crate organized by domain:
//! - **Metadata**: items, seasons and episodes
//! - **Sources**: quality labels, health classes, torrent candidates
//! - **Playback**: backend kinds, playback session, show selection
//! - **Cast**: casting devices
//! - **Subtitles**: caption tracks

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::SessionError;

// =============================================================================
// Metadata Models
// =============================================================================

/// Media kind discriminator for items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Show,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Movie => write!(f, "movie"),
            MediaKind::Show => write!(f, "show"),
        }
    }
}

impl FromStr for MediaKind {
    type Err = SessionError;

    /// Accepts both singular and plural mode names ("movies", "shows")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "movie" | "movies" => Ok(MediaKind::Movie),
            "show" | "shows" | "tv" => Ok(MediaKind::Show),
            other => Err(SessionError::InvalidSelection(format!(
                "unknown media mode '{}'",
                other
            ))),
        }
    }
}

/// External identifiers for an item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIds {
    pub imdb_id: String,
    pub tmdb_id: String,
}

/// A movie or show as returned by the metadata provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub ids: ExternalIds,
    pub title: String,
    pub kind: MediaKind,
    pub year: Option<u16>,
    pub summary: String,
    pub genres: Vec<String>,
    pub rating: Option<f32>,
    /// Runtime in minutes
    pub runtime: Option<u32>,
    pub trailer: Option<String>,
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let year_str = self.year.map(|y| format!(" ({})", y)).unwrap_or_default();
        write!(f, "{}{} [{}]", self.title, year_str, self.kind)
    }
}

/// Summary of a show season
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Season {
    pub number: u32,
    pub episode_count: u32,
    pub name: Option<String>,
}

/// Show episode information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub season: u32,
    pub episode: u32,
    pub name: String,
    pub overview: String,
}

impl fmt::Display for Episode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{:02}E{:02} - {}", self.season, self.episode, self.name)
    }
}

/// Currently selected season/episode of a show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowSelection {
    pub season: u32,
    pub episode: u32,
}

impl Default for ShowSelection {
    fn default() -> Self {
        Self {
            season: 1,
            episode: 1,
        }
    }
}

// =============================================================================
// Source Models
// =============================================================================

/// Fixed enumeration of quality tiers a torrent set is keyed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QualityLabel {
    #[serde(rename = "480p")]
    SD480p,
    #[serde(rename = "720p")]
    HD720p,
    #[serde(rename = "1080p")]
    FHD1080p,
}

impl QualityLabel {
    /// All labels, highest tier first
    pub const ALL: [QualityLabel; 3] = [
        QualityLabel::FHD1080p,
        QualityLabel::HD720p,
        QualityLabel::SD480p,
    ];

    /// Parse quality from a release name (e.g., "Torrentio\n1080p")
    ///
    /// Returns `None` for tiers outside the enumeration (4K, CAM, unknown).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        let s_lower = s.to_lowercase();
        if s_lower.contains("2160p") || s_lower.contains("4k") {
            None
        } else if s_lower.contains("1080p") {
            Some(QualityLabel::FHD1080p)
        } else if s_lower.contains("720p") {
            Some(QualityLabel::HD720p)
        } else if s_lower.contains("480p") || s_lower.contains("sd") {
            Some(QualityLabel::SD480p)
        } else {
            None
        }
    }

    /// Quality ranking for sorting (higher = better)
    pub fn rank(&self) -> u8 {
        match self {
            QualityLabel::FHD1080p => 3,
            QualityLabel::HD720p => 2,
            QualityLabel::SD480p => 1,
        }
    }
}

impl fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityLabel::FHD1080p => write!(f, "1080p"),
            QualityLabel::HD720p => write!(f, "720p"),
            QualityLabel::SD480p => write!(f, "480p"),
        }
    }
}

impl FromStr for QualityLabel {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1080p" | "1080" => Ok(QualityLabel::FHD1080p),
            "720p" | "720" => Ok(QualityLabel::HD720p),
            "480p" | "480" => Ok(QualityLabel::SD480p),
            other => Err(SessionError::InvalidSelection(format!(
                "unknown quality '{}'",
                other
            ))),
        }
    }
}

/// Coarse classification of a torrent swarm
///
/// Declaration order is the ranking order: `Unknown` is worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthClass {
    #[default]
    Unknown,
    Poor,
    Decent,
    Good,
}

impl fmt::Display for HealthClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthClass::Unknown => write!(f, "unknown"),
            HealthClass::Poor => write!(f, "poor"),
            HealthClass::Decent => write!(f, "decent"),
            HealthClass::Good => write!(f, "good"),
        }
    }
}

/// How the torrent engine should deliver a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    /// Single-episode or movie torrent
    Torrent,
    /// Whole-season pack, the engine must pick the episode file
    SeasonPack,
}

/// One torrent source for a quality tier
///
/// The default value is the placeholder candidate: a valid "no source"
/// value that must never be treated as an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TorrentCandidate {
    pub quality: Option<QualityLabel>,
    pub magnet: Option<String>,
    pub health: HealthClass,
    pub seeders: u32,
    pub delivery: Option<DeliveryMethod>,
}

impl TorrentCandidate {
    /// The "no source available" candidate
    pub fn placeholder() -> Self {
        Self::default()
    }

    pub fn is_placeholder(&self) -> bool {
        self.magnet.is_none()
    }

    /// Whether the torrent engine can be started with this candidate
    pub fn is_playable(&self) -> bool {
        self.magnet.as_deref().is_some_and(|m| !m.is_empty()) && self.delivery.is_some()
    }
}

impl fmt::Display for TorrentCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.quality {
            Some(quality) if !self.is_placeholder() => write!(
                f,
                "[{}] {} 👤{}",
                quality, self.health, self.seeders
            ),
            _ => write!(f, "no source"),
        }
    }
}

/// Per-quality candidates as returned by a torrent provider (labels may be missing)
pub type QualityMap = BTreeMap<QualityLabel, TorrentCandidate>;

/// Every quality label mapped to a candidate, plus the ideal pick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TorrentSet {
    by_quality: BTreeMap<QualityLabel, TorrentCandidate>,
    pub ideal: TorrentCandidate,
}

impl TorrentSet {
    /// All-placeholder set
    pub fn empty() -> Self {
        Self::from_parts(QualityMap::new(), TorrentCandidate::placeholder())
    }

    /// Build a set, filling labels absent from `by_quality` with placeholders
    pub fn from_parts(mut by_quality: QualityMap, ideal: TorrentCandidate) -> Self {
        for label in QualityLabel::ALL {
            by_quality.entry(label).or_default();
        }
        Self { by_quality, ideal }
    }

    pub fn get(&self, label: QualityLabel) -> &TorrentCandidate {
        // from_parts guarantees every label is present
        &self.by_quality[&label]
    }

    /// Candidates in label order, highest tier first
    pub fn iter(&self) -> impl Iterator<Item = (QualityLabel, &TorrentCandidate)> {
        QualityLabel::ALL.into_iter().map(move |l| (l, self.get(l)))
    }

    pub fn is_empty(&self) -> bool {
        self.by_quality.values().all(TorrentCandidate::is_placeholder)
            && self.ideal.is_placeholder()
    }
}

impl Default for TorrentSet {
    fn default() -> Self {
        Self::empty()
    }
}

// =============================================================================
// Playback Models
// =============================================================================

/// Closed set of playback backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Native HTML video
    #[default]
    Default,
    /// Plyr-style HTML video without readiness delay
    Plyr,
    /// External player process (VLC / mpv)
    External,
    /// Cast receiver
    Chromecast,
    /// Embedded web video
    Youtube,
}

impl BackendKind {
    /// Backends rendered on the in-app video surface
    pub fn is_surface(&self) -> bool {
        matches!(self, BackendKind::Default | BackendKind::Youtube)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Default => write!(f, "default"),
            BackendKind::Plyr => write!(f, "plyr"),
            BackendKind::External => write!(f, "external"),
            BackendKind::Chromecast => write!(f, "chromecast"),
            BackendKind::Youtube => write!(f, "youtube"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" => Ok(BackendKind::Default),
            "plyr" => Ok(BackendKind::Plyr),
            "external" | "vlc" | "mpv" => Ok(BackendKind::External),
            "chromecast" | "cast" => Ok(BackendKind::Chromecast),
            "youtube" => Ok(BackendKind::Youtube),
            other => Err(format!("unknown player backend '{}'", other)),
        }
    }
}

/// The active playback session of a controller
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlaybackSession {
    pub backend: BackendKind,
    pub serving_url: Option<String>,
    /// Torrent engine running for this session
    pub in_progress: bool,
    /// Download progress (0.0-1.0)
    pub progress: f32,
}

impl PlaybackSession {
    /// Format progress as percentage
    pub fn format_progress(&self) -> String {
        format!("{:.0}%", self.progress * 100.0)
    }
}

// =============================================================================
// Cast Models
// =============================================================================

/// Cast receiver discovered on the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastingDevice {
    pub id: String,
    pub display_name: String,
    pub model: Option<String>,
}

impl CastingDevice {
    /// Parse devices from catt scan output
    /// Format: "192.168.1.36 - Device Name - Google Inc. Chromecast"
    pub fn parse_catt_scan(output: &str) -> Vec<CastingDevice> {
        output
            .lines()
            .map(str::trim)
            .filter(|line| {
                !line.is_empty() && !line.starts_with("Scanning") && !line.contains("No devices")
            })
            .filter_map(|line| {
                let parts: Vec<&str> = line.splitn(3, " - ").collect();
                if parts.len() < 2 {
                    return None;
                }
                let address = parts[0].trim();
                address.parse::<std::net::IpAddr>().ok()?;
                Some(CastingDevice {
                    id: address.to_string(),
                    display_name: parts[1].trim().to_string(),
                    model: parts.get(2).map(|m| m.trim().to_string()),
                })
            })
            .collect()
    }
}

impl fmt::Display for CastingDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.model {
            Some(model) => write!(f, "{} ({}) - {}", self.display_name, model, self.id),
            None => write!(f, "{} - {}", self.display_name, self.id),
        }
    }
}

// =============================================================================
// Subtitle Models
// =============================================================================

/// Subtitle as delivered by a subtitle provider into a local directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleDescriptor {
    pub language_code: String,
    pub file_name: String,
}

/// A caption track ready to hand to a playback backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionTrack {
    pub language_code: String,
    pub locally_served_url: String,
    pub local_path: PathBuf,
    pub is_default: bool,
}

// =============================================================================
// Unit Tests
// =============================================================================
