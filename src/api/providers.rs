//! Collaborator interfaces consumed by the session controller
//!
//! Every trait here is implemented by a concrete client in this crate and
//! by in-memory doubles in the test suite.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::{
    CastingDevice, DeliveryMethod, Episode, Item, MediaKind, QualityMap, Season,
    SubtitleDescriptor,
};

/// Movie/show metadata lookup
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn get_item(&self, id: &str, kind: MediaKind) -> Result<Item>;

    async fn get_season_list(&self, id: &str) -> Result<Vec<Season>>;

    async fn get_season_episodes(&self, id: &str, season: u32) -> Result<Vec<Episode>>;
}

/// Which kind of torrent listing to query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorrentMode {
    Movie,
    Show,
    SeasonComplete,
}

/// Parameters for a torrent query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TorrentQuery {
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub search_query: String,
}

/// Torrent candidate search
#[async_trait]
pub trait TorrentProvider: Send + Sync {
    /// Best candidate per quality label; labels without results may be absent
    async fn query(&self, imdb_id: &str, mode: TorrentMode, query: &TorrentQuery)
        -> Result<QualityMap>;
}

/// Where and in which languages subtitles should be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleRequest {
    pub path: PathBuf,
    pub languages: Vec<String>,
}

/// Subtitle search and download into a local directory
#[async_trait]
pub trait SubtitleProvider: Send + Sync {
    async fn fetch(&self, external_id: &str, request: &SubtitleRequest)
        -> Result<Vec<SubtitleDescriptor>>;
}

/// Metadata passed to the torrent engine for file selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackMetadata {
    pub delivery: DeliveryMethod,
    pub season: u32,
    pub episode: u32,
}

/// Request to start streaming a torrent
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub magnet: String,
    pub metadata: PlaybackMetadata,
    pub supported_formats: Vec<&'static str>,
}

/// Where the engine is serving the selected file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServingInfo {
    pub url: String,
    pub file: String,
    pub files: Vec<String>,
    pub hash: String,
}

/// Events emitted by a running torrent
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Downloaded fraction (0.0-1.0)
    Progress(f32),
    /// Sent once when the file can be streamed
    Ready(ServingInfo),
}

/// A started torrent; `events` closes when the torrent is destroyed
pub struct TorrentHandle {
    pub id: Uuid,
    pub events: mpsc::Receiver<EngineEvent>,
}

/// Torrent download/seed engine
///
/// Every started handle must eventually emit [`EngineEvent::Ready`] or close
/// its event stream. The session waits on one of the two, so an engine that
/// cannot serve in time closes the stream or gives up with `Ready` after its
/// own deadline.
#[async_trait]
pub trait TorrentEngine: Send + Sync {
    async fn start(&self, request: EngineRequest) -> Result<TorrentHandle>;

    /// Release a torrent; unknown ids are ignored
    async fn destroy(&self, id: Uuid);
}

/// Cast receiver discovery
#[async_trait]
pub trait CastingDiscovery: Send + Sync {
    async fn get_devices(&self) -> Result<Vec<CastingDevice>>;

    async fn select_device(&self, id: &str);
}

/// Persisted item lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    RecentlyWatched,
    Favorites,
    WatchList,
}

/// Favorites and watch-history storage
#[async_trait]
pub trait WatchHistoryStore: Send + Sync {
    async fn get(&self, kind: HistoryKind) -> Result<Vec<Item>>;

    async fn set(&self, kind: HistoryKind, item: &Item) -> Result<()>;
}
