//! reelcast - torrent playback session orchestration
//!
//! Picks the best peer-to-peer source for a title across quality tiers and
//! hands the stream to one of several playback backends, while fetching
//! subtitles and discovering cast devices in the background.
//!
//! # Modules
//!
//! - `models` - items, torrent candidates, backends, caption tracks
//! - `selector` - deterministic source ranking
//! - `session` - the session controller state machine
//! - `api` - collaborator traits and HTTP clients (TMDB, Torrentio)
//! - `stream` - torrent engine, playback backends, subtitles, casting
//! - `history` - watch history storage
//! - `config` - configuration file and environment overrides

pub mod api;
pub mod config;
pub mod error;
pub mod history;
pub mod models;
pub mod selector;
pub mod session;
pub mod stream;

pub use api::{TmdbClient, TorrentioClient};
pub use error::{BackendError, SessionError};
pub use models::{
    BackendKind, CaptionTrack, CastingDevice, HealthClass, Item, MediaKind, QualityLabel,
    TorrentCandidate, TorrentSet,
};
pub use session::{Applied, LibraryMembership, SessionController, SessionPhase, StartOutcome};
