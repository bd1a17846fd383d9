//! Streaming infrastructure
//!
//! - backend: playback backend trait and per-kind dispatch
//! - torrent: webtorrent-cli engine
//! - cast: Chromecast discovery and control via catt
//! - player: VLC/mpv external player
//! - subtitles: Stremio subtitle download and caption track mapping
//! - file_server: HTTP server for downloaded captions
//! - monitor: periodic cast device discovery

pub mod backend;
pub mod cast;
pub mod file_server;
pub mod monitor;
pub mod player;
pub mod subtitles;
pub mod torrent;

pub use backend::{BackendSet, HtmlVideoBackend, PlaybackBackend, PlaybackBackendAdapter};
pub use cast::{CastBackend, CastManager};
pub use file_server::SubtitleServer;
pub use monitor::CastingDeviceMonitor;
pub use player::{ExternalPlayerBackend, PlayerType};
pub use subtitles::{SubtitleClient, SubtitleTrackResolver};
pub use torrent::{WebtorrentEngine, SUPPORTED_FORMATS};
