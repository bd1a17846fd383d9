//! External service clients and the interfaces they implement
//!
//! - providers: collaborator traits used by the session controller
//! - TMDB: movie/show metadata
//! - Torrentio: torrent candidates via the Stremio addon protocol

pub mod providers;
pub mod tmdb;
pub mod torrentio;

pub use providers::{
    CastingDiscovery, EngineEvent, EngineRequest, HistoryKind, MetadataProvider,
    PlaybackMetadata, ServingInfo, SubtitleProvider, SubtitleRequest, TorrentEngine,
    TorrentHandle, TorrentMode, TorrentProvider, TorrentQuery, WatchHistoryStore,
};
pub use tmdb::TmdbClient;
pub use torrentio::TorrentioClient;
