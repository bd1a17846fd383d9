//! Playback session orchestration
//!
//! [`SessionController`] is the single writer of the session record. Work
//! that waits on collaborators runs in spawned tasks which never touch the
//! record; they report back through an epoch-tagged channel and the
//! controller applies a result only if its epoch is still current.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::{
    EngineEvent, EngineRequest, HistoryKind, MetadataProvider, PlaybackMetadata, TorrentEngine,
    TorrentMode, TorrentProvider, TorrentQuery, WatchHistoryStore,
};
use crate::config::Config;
use crate::error::{Result, SessionError};
use crate::models::{
    BackendKind, CaptionTrack, CastingDevice, Episode, HealthClass, Item, MediaKind,
    PlaybackSession, QualityLabel, QualityMap, Season, ShowSelection, TorrentSet,
};
use crate::selector::{merged_set, single_source_set};
use crate::stream::{
    CastingDeviceMonitor, PlaybackBackendAdapter, SubtitleTrackResolver, SUPPORTED_FORMATS,
};

// =============================================================================
// Public Types
// =============================================================================

/// Controller lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    LoadingItem,
    FetchingSources,
    Ready,
    Starting,
    Serving,
    Stopping,
}

/// Which part of a show to (re)select
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowScope {
    /// A whole season, starting at its first episode
    Episodes,
    /// One episode
    Episode,
}

impl FromStr for ShowScope {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "episodes" => Ok(ShowScope::Episodes),
            "episode" => Ok(ShowScope::Episode),
            other => Err(SessionError::InvalidSelection(format!(
                "unknown show scope '{}'",
                other
            ))),
        }
    }
}

/// Outcome of [`SessionController::start_playback`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Engine started; the backend attaches once the stream is ready
    Started,
    /// The chosen candidate has no magnet or delivery method
    NoSource,
    /// The torrent engine refused to start
    EngineFailed,
}

/// How a delivered asynchronous result was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Updated,
    /// Issued under an older epoch and dropped
    Stale { issued: u64, current: u64 },
    /// Engine event from a torrent that was already torn down
    Orphaned,
}

/// Advisories for the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    PoorSource {
        quality: Option<QualityLabel>,
        seeders: u32,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::PoorSource { quality, seeders } => {
                let quality = quality.map(|q| q.to_string()).unwrap_or_default();
                write!(
                    f,
                    "Slow streaming: the best {} source has only {} seeders",
                    quality, seeders
                )
            }
        }
    }
}

/// Whether the loaded item is on the user's saved lists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LibraryMembership {
    pub favorite: bool,
    pub watch_list: bool,
}

/// Behavior switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Merge whole-season torrents into show results
    pub season_complete: bool,
    /// Offer per-quality starts instead of only the ideal pick
    pub manual_quality_selection: bool,
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            season_complete: config.season_complete(),
            manual_quality_selection: config.manual_quality_selection(),
        }
    }
}

/// Collaborators the controller calls directly
#[derive(Clone)]
pub struct Providers {
    pub metadata: Arc<dyn MetadataProvider>,
    pub torrents: Arc<dyn TorrentProvider>,
    pub engine: Arc<dyn TorrentEngine>,
    pub history: Arc<dyn WatchHistoryStore>,
}

// =============================================================================
// Internal Events
// =============================================================================

struct SessionEvent {
    epoch: u64,
    payload: Payload,
}

enum Payload {
    ItemLoaded(anyhow::Result<Item>),
    SeasonsLoaded(Vec<Season>),
    EpisodesLoaded { season: u32, episodes: Vec<Episode> },
    CaptionsLoaded(Vec<CaptionTrack>),
    LibraryLoaded(LibraryMembership),
    TorrentsLoaded { seq: u64, set: TorrentSet },
    Engine { torrent: Uuid, event: EngineEvent },
    EngineClosed { torrent: Uuid },
}

impl Payload {
    fn name(&self) -> &'static str {
        match self {
            Payload::ItemLoaded(_) => "item",
            Payload::SeasonsLoaded(_) => "seasons",
            Payload::EpisodesLoaded { .. } => "episodes",
            Payload::CaptionsLoaded(_) => "captions",
            Payload::LibraryLoaded(_) => "library",
            Payload::TorrentsLoaded { .. } => "torrents",
            Payload::Engine { .. } => "engine",
            Payload::EngineClosed { .. } => "engine_closed",
        }
    }

    /// Results of one-shot fetch tasks
    fn is_fetch(&self) -> bool {
        !matches!(self, Payload::Engine { .. } | Payload::EngineClosed { .. })
    }

    fn torrent(&self) -> Option<Uuid> {
        match self {
            Payload::Engine { torrent, .. } | Payload::EngineClosed { torrent } => Some(*torrent),
            _ => None,
        }
    }
}

/// The running torrent and the task forwarding its events
struct ActiveTorrent {
    id: Uuid,
    cancel: CancellationToken,
    forwarder: JoinHandle<()>,
    ready: bool,
}

// =============================================================================
// Session Controller
// =============================================================================

pub struct SessionController {
    providers: Providers,
    subtitles: Arc<SubtitleTrackResolver>,
    adapter: PlaybackBackendAdapter,
    monitor: CastingDeviceMonitor,
    options: SessionOptions,

    phase: SessionPhase,
    epoch: u64,
    item: Option<Item>,
    selection: ShowSelection,
    seasons: Vec<Season>,
    episodes: Vec<Episode>,
    torrents: TorrentSet,
    fetching_torrents: bool,
    captions: Vec<CaptionTrack>,
    library: LibraryMembership,
    backend: BackendKind,
    playback: PlaybackSession,
    playback_visible: bool,
    /// A backend was started and has not been destroyed yet
    backend_live: bool,

    active: Option<ActiveTorrent>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    pending: usize,
    fetch_seq: u64,
    advised_seq: Option<u64>,
    notices: Vec<Notice>,
}

impl SessionController {
    pub fn new(
        providers: Providers,
        subtitles: SubtitleTrackResolver,
        adapter: PlaybackBackendAdapter,
        monitor: CastingDeviceMonitor,
        options: SessionOptions,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            providers,
            subtitles: Arc::new(subtitles),
            adapter,
            monitor,
            options,
            phase: SessionPhase::Idle,
            epoch: 0,
            item: None,
            selection: ShowSelection::default(),
            seasons: Vec::new(),
            episodes: Vec::new(),
            torrents: TorrentSet::empty(),
            fetching_torrents: false,
            captions: Vec::new(),
            library: LibraryMembership::default(),
            backend: BackendKind::Default,
            playback: PlaybackSession::default(),
            playback_visible: false,
            backend_live: false,
            active: None,
            events_tx,
            events_rx,
            pending: 0,
            fetch_seq: 0,
            advised_seq: None,
            notices: Vec::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Read access
    // -------------------------------------------------------------------------

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn item(&self) -> Option<&Item> {
        self.item.as_ref()
    }

    pub fn selection(&self) -> ShowSelection {
        self.selection
    }

    pub fn seasons(&self) -> &[Season] {
        &self.seasons
    }

    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }

    pub fn torrents(&self) -> &TorrentSet {
        &self.torrents
    }

    pub fn is_fetching_torrents(&self) -> bool {
        self.fetching_torrents
    }

    pub fn captions(&self) -> &[CaptionTrack] {
        &self.captions
    }

    pub fn library(&self) -> LibraryMembership {
        self.library
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn playback(&self) -> &PlaybackSession {
        &self.playback
    }

    pub fn is_playback_visible(&self) -> bool {
        self.playback_visible
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    pub fn devices(&self) -> Vec<CastingDevice> {
        self.monitor.devices()
    }

    /// Drain advisories raised since the last call
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Start background device discovery
    pub fn begin(&mut self) {
        self.monitor.start();
    }

    /// Stop playback and device discovery
    pub async fn shutdown(&mut self) {
        self.stop_playback().await;
        self.monitor.stop().await;
        info!("session shut down");
    }

    // -------------------------------------------------------------------------
    // Selection
    // -------------------------------------------------------------------------

    /// Select an item by id; returns the epoch its results are issued under
    pub async fn select_item(&mut self, id: &str, kind: MediaKind) -> u64 {
        self.stop_playback().await;
        self.epoch += 1;
        self.item = None;
        self.selection = ShowSelection::default();
        self.seasons.clear();
        self.episodes.clear();
        self.torrents = TorrentSet::empty();
        self.fetching_torrents = false;
        self.captions.clear();
        self.library = LibraryMembership::default();
        self.playback = PlaybackSession {
            backend: self.backend,
            ..PlaybackSession::default()
        };
        self.phase = SessionPhase::LoadingItem;
        info!(id, %kind, epoch = self.epoch, "item selected");

        let metadata = Arc::clone(&self.providers.metadata);
        let id = id.to_string();
        self.spawn_fetch(async move { Payload::ItemLoaded(metadata.get_item(&id, kind).await) });
        self.epoch
    }

    /// [`Self::select_item`] with a mode string ("movie(s)" or "show(s)")
    pub async fn select_item_named(&mut self, id: &str, mode: &str) -> Result<u64> {
        let kind: MediaKind = mode.parse()?;
        Ok(self.select_item(id, kind).await)
    }

    /// Change season or episode of the loaded show
    pub async fn select_show_scope(
        &mut self,
        scope: ShowScope,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Result<u64> {
        match &self.item {
            Some(item) if item.kind == MediaKind::Show => {}
            Some(_) => {
                return Err(SessionError::InvalidSelection(
                    "selected item is not a show".to_string(),
                ))
            }
            None => {
                return Err(SessionError::InvalidSelection(
                    "no item selected".to_string(),
                ))
            }
        }

        let season = season.ok_or_else(|| {
            SessionError::InvalidSelection(format!("{:?} selection requires a season", scope))
        })?;

        match scope {
            ShowScope::Episodes => {
                self.select_episode(season, 1).await;
                self.episodes.clear();
                self.spawn_episode_list(season);
            }
            ShowScope::Episode => {
                let episode = episode.ok_or_else(|| {
                    SessionError::InvalidSelection(
                        "episode selection requires an episode".to_string(),
                    )
                })?;
                self.select_episode(season, episode).await;
            }
        }
        Ok(self.epoch)
    }

    /// [`Self::select_show_scope`] with a scope string ("episodes" or "episode")
    pub async fn select_show_scope_named(
        &mut self,
        scope: &str,
        season: Option<u32>,
        episode: Option<u32>,
    ) -> Result<u64> {
        let scope: ShowScope = scope.parse()?;
        self.select_show_scope(scope, season, episode).await
    }

    async fn select_episode(&mut self, season: u32, episode: u32) {
        self.stop_playback().await;
        self.epoch += 1;
        self.selection = ShowSelection { season, episode };
        self.captions.clear();
        info!(season, episode, epoch = self.epoch, "episode selected");
        self.fetch_sources();
    }

    /// Record the backend for the next playback
    pub async fn select_player(&mut self, kind: BackendKind, device: Option<&str>) {
        if kind.is_surface() {
            self.playback_visible = true;
        }
        if kind == BackendKind::Chromecast {
            match device {
                Some(id) => self.monitor.select_device(id).await,
                None => warn!("chromecast selected without a device"),
            }
        }
        debug!(%kind, "player selected");
        self.backend = kind;
    }

    /// [`Self::select_player`] by name; unknown names are logged and ignored
    pub async fn select_player_named(&mut self, name: &str, device: Option<&str>) -> bool {
        match name.parse::<BackendKind>() {
            Ok(kind) => {
                self.select_player(kind, device).await;
                true
            }
            Err(e) => {
                error!(name, error = %e, "backend dispatch failed");
                false
            }
        }
    }

    // -------------------------------------------------------------------------
    // Playback
    // -------------------------------------------------------------------------

    /// Start streaming the candidate for `quality`, or the ideal one
    pub async fn start_playback(&mut self, quality: Option<QualityLabel>) -> StartOutcome {
        let candidate = match quality {
            Some(label) => self.torrents.get(label).clone(),
            None => self.torrents.ideal.clone(),
        };
        let (Some(magnet), Some(delivery)) = (candidate.magnet.clone(), candidate.delivery) else {
            debug!(?quality, "no playable source");
            return StartOutcome::NoSource;
        };
        if magnet.is_empty() || self.item.is_none() {
            return StartOutcome::NoSource;
        }

        self.stop_playback().await;
        self.phase = SessionPhase::Starting;

        let request = EngineRequest {
            magnet,
            metadata: PlaybackMetadata {
                delivery,
                season: self.selection.season,
                episode: self.selection.episode,
            },
            supported_formats: SUPPORTED_FORMATS.to_vec(),
        };

        let handle = match self.providers.engine.start(request).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, "torrent engine failed to start");
                self.phase = self.settled_phase();
                return StartOutcome::EngineFailed;
            }
        };

        info!(torrent = %handle.id, source = %candidate, backend = %self.backend, "playback starting");
        let cancel = CancellationToken::new();
        let forwarder = spawn_forwarder(
            handle.id,
            handle.events,
            self.epoch,
            cancel.clone(),
            self.events_tx.clone(),
        );
        self.active = Some(ActiveTorrent {
            id: handle.id,
            cancel,
            forwarder,
            ready: false,
        });
        self.playback = PlaybackSession {
            backend: self.backend,
            serving_url: None,
            in_progress: true,
            progress: 0.0,
        };
        StartOutcome::Started
    }

    /// Tear down the running torrent and backend; returns whether anything ran
    pub async fn stop_playback(&mut self) -> bool {
        if !self.playback.in_progress && !self.playback_visible && !self.backend_live {
            return false;
        }
        self.phase = SessionPhase::Stopping;

        let kind = if self.playback.in_progress || self.backend_live {
            self.playback.backend
        } else {
            self.backend
        };
        if kind.is_surface() {
            self.adapter.pause(kind).await;
        }
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            active.forwarder.abort();
            self.providers.engine.destroy(active.id).await;
        }
        self.adapter.destroy(kind).await;

        self.playback = PlaybackSession {
            backend: self.backend,
            ..PlaybackSession::default()
        };
        self.playback_visible = false;
        self.backend_live = false;
        self.phase = self.settled_phase();
        debug!(%kind, "playback stopped");
        true
    }

    /// Hide the video surface and return to the default backend
    pub async fn close_video(&mut self) {
        if !self.playback_visible {
            return;
        }
        self.stop_playback().await;
        self.backend = BackendKind::Default;
        self.playback.backend = BackendKind::Default;
    }

    /// Save the loaded item to favorites or the watch list; returns whether
    /// the list changed
    pub async fn add_to_library(&mut self, kind: HistoryKind) -> bool {
        let Some(item) = self.item.clone() else {
            return false;
        };
        let saved = match kind {
            HistoryKind::Favorites => &mut self.library.favorite,
            HistoryKind::WatchList => &mut self.library.watch_list,
            HistoryKind::RecentlyWatched => return false,
        };
        if *saved {
            return false;
        }
        if let Err(e) = self.providers.history.set(kind, &item).await {
            warn!(?kind, error = %e, "failed to save item");
            return false;
        }
        *saved = true;
        info!(?kind, title = %item.title, "item saved");
        true
    }

    /// Phase to rest in when nothing is playing
    fn settled_phase(&self) -> SessionPhase {
        match (&self.item, self.fetching_torrents) {
            (None, _) if self.pending > 0 => SessionPhase::LoadingItem,
            (None, _) => SessionPhase::Idle,
            (Some(_), true) => SessionPhase::FetchingSources,
            (Some(_), false) => SessionPhase::Ready,
        }
    }

    // -------------------------------------------------------------------------
    // Event application
    // -------------------------------------------------------------------------

    /// Wait for the next asynchronous result and apply it
    pub async fn next_event(&mut self) -> Option<Applied> {
        let event = self.events_rx.recv().await?;
        Some(self.apply(event).await)
    }

    /// Apply results until no fetch is outstanding and no torrent is
    /// waiting for its stream; returns the number of events handled.
    /// Terminates because a [`TorrentEngine`] handle always ends in `Ready`
    /// or a closed stream.
    pub async fn settle(&mut self) -> usize {
        let mut handled = 0;
        while self.pending > 0 || self.active.as_ref().is_some_and(|a| !a.ready) {
            if self.next_event().await.is_none() {
                break;
            }
            handled += 1;
        }
        handled
    }

    async fn apply(&mut self, event: SessionEvent) -> Applied {
        let SessionEvent { epoch, payload } = event;
        if payload.is_fetch() {
            self.pending = self.pending.saturating_sub(1);
        }

        if let Some(torrent) = payload.torrent() {
            if self.active.as_ref().map(|a| a.id) != Some(torrent) {
                debug!(%torrent, "dropping event from released torrent");
                return Applied::Orphaned;
            }
        }

        if epoch != self.epoch {
            debug!(
                result = payload.name(),
                issued = epoch,
                current = self.epoch,
                "discarding stale result"
            );
            return Applied::Stale {
                issued: epoch,
                current: self.epoch,
            };
        }

        match payload {
            Payload::ItemLoaded(Ok(item)) => self.on_item(item),
            Payload::ItemLoaded(Err(e)) => {
                warn!(error = %e, "metadata lookup failed");
                self.phase = SessionPhase::Idle;
            }
            Payload::SeasonsLoaded(seasons) => self.seasons = seasons,
            Payload::EpisodesLoaded { season, episodes } => {
                if season == self.selection.season {
                    self.episodes = episodes;
                }
            }
            Payload::CaptionsLoaded(captions) => self.captions = captions,
            Payload::LibraryLoaded(library) => self.library = library,
            Payload::TorrentsLoaded { seq, set } => self.on_torrents(seq, set),
            Payload::Engine { event, .. } => self.on_engine(event).await,
            Payload::EngineClosed { .. } => self.on_engine_closed().await,
        }
        Applied::Updated
    }

    fn on_item(&mut self, item: Item) {
        info!(title = %item.title, kind = %item.kind, "item loaded");
        let kind = item.kind;
        let id = item.id.clone();
        self.spawn_library_lookup(&item);
        self.item = Some(item);

        if kind == MediaKind::Show {
            let metadata = Arc::clone(&self.providers.metadata);
            self.spawn_fetch(async move {
                let seasons = match metadata.get_season_list(&id).await {
                    Ok(seasons) => seasons,
                    Err(e) => {
                        warn!(error = %e, "season list unavailable");
                        Vec::new()
                    }
                };
                Payload::SeasonsLoaded(seasons)
            });
            self.spawn_episode_list(self.selection.season);
        }
        self.fetch_sources();
    }

    fn on_torrents(&mut self, seq: u64, set: TorrentSet) {
        self.fetching_torrents = false;
        if self.phase == SessionPhase::FetchingSources {
            self.phase = SessionPhase::Ready;
        }
        info!(ideal = %set.ideal, "sources ranked");

        if set.ideal.health == HealthClass::Poor && self.advised_seq != Some(seq) {
            self.advised_seq = Some(seq);
            self.notices.push(Notice::PoorSource {
                quality: set.ideal.quality,
                seeders: set.ideal.seeders,
            });
        }
        self.torrents = set;
    }

    async fn on_engine(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Progress(fraction) => {
                self.playback.progress = fraction.clamp(0.0, 1.0);
            }
            EngineEvent::Ready(info) => {
                if let Some(active) = self.active.as_mut() {
                    active.ready = true;
                }
                self.phase = SessionPhase::Serving;
                self.playback.serving_url = Some(info.url.clone());
                info!(url = info.url.as_str(), file = info.file.as_str(), "serving torrent");

                let kind = self.playback.backend;
                if kind.is_surface() {
                    self.playback_visible = true;
                }
                let Some(item) = self.item.clone() else {
                    return;
                };
                match self.adapter.start(kind, &info.url, &item, &self.captions).await {
                    Ok(()) => self.backend_live = true,
                    Err(e) => error!(%kind, error = %e, "backend dispatch failed"),
                }
                self.record_watched(&item).await;
            }
        }
    }

    /// The engine stream ended on its own. The handle is released here; a
    /// backend that was already attached stays up until `stop_playback`.
    async fn on_engine_closed(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        if active.ready {
            debug!(torrent = %active.id, "torrent engine finished");
        } else {
            error!(torrent = %active.id, "torrent engine stopped before the stream was ready");
        }
        active.cancel.cancel();
        self.providers.engine.destroy(active.id).await;
        self.playback.in_progress = false;
        self.phase = self.settled_phase();
    }

    /// Add to recently watched unless already present
    async fn record_watched(&self, item: &Item) {
        let history = &self.providers.history;
        let watched = match history.get(HistoryKind::RecentlyWatched).await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "watch history unavailable");
                return;
            }
        };
        if watched.iter().any(|w| w.ids == item.ids && w.kind == item.kind) {
            return;
        }
        if let Err(e) = history.set(HistoryKind::RecentlyWatched, item).await {
            warn!(error = %e, "failed to record watch history");
        }
    }

    // -------------------------------------------------------------------------
    // Fetch tasks
    // -------------------------------------------------------------------------

    fn spawn_fetch<F>(&mut self, fetch: F)
    where
        F: Future<Output = Payload> + Send + 'static,
    {
        self.pending += 1;
        let tx = self.events_tx.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let payload = fetch.await;
            let _ = tx.send(SessionEvent { epoch, payload });
        });
    }

    fn spawn_library_lookup(&mut self, item: &Item) {
        let history = Arc::clone(&self.providers.history);
        let item = item.clone();
        self.spawn_fetch(async move {
            let (favorites, watch_list) = tokio::join!(
                history.get(HistoryKind::Favorites),
                history.get(HistoryKind::WatchList)
            );
            let contains = |list: anyhow::Result<Vec<Item>>| match list {
                Ok(list) => list.iter().any(|i| i.ids == item.ids && i.kind == item.kind),
                Err(e) => {
                    warn!(error = %e, "library lists unavailable");
                    false
                }
            };
            Payload::LibraryLoaded(LibraryMembership {
                favorite: contains(favorites),
                watch_list: contains(watch_list),
            })
        });
    }

    fn spawn_episode_list(&mut self, season: u32) {
        let Some(item) = &self.item else {
            return;
        };
        let metadata = Arc::clone(&self.providers.metadata);
        let id = item.id.clone();
        self.spawn_fetch(async move {
            let episodes = match metadata.get_season_episodes(&id, season).await {
                Ok(episodes) => episodes,
                Err(e) => {
                    warn!(season, error = %e, "episode list unavailable");
                    Vec::new()
                }
            };
            Payload::EpisodesLoaded { season, episodes }
        });
    }

    /// Fetch captions and torrents for the current item and selection
    fn fetch_sources(&mut self) {
        let Some(item) = self.item.clone() else {
            return;
        };
        self.phase = SessionPhase::FetchingSources;
        self.torrents = TorrentSet::empty();
        self.fetching_torrents = true;
        self.fetch_seq += 1;

        let selection = self.selection;
        let subtitle_id = match item.kind {
            MediaKind::Movie => item.ids.imdb_id.clone(),
            MediaKind::Show => format!(
                "{}:{}:{}",
                item.ids.imdb_id, selection.season, selection.episode
            ),
        };
        let subtitles = Arc::clone(&self.subtitles);
        self.spawn_fetch(async move { Payload::CaptionsLoaded(subtitles.resolve(&subtitle_id).await) });

        let torrents = Arc::clone(&self.providers.torrents);
        let season_complete = self.options.season_complete;
        let seq = self.fetch_seq;
        self.spawn_fetch(async move {
            let set = fetch_torrents(torrents.as_ref(), &item, selection, season_complete).await;
            Payload::TorrentsLoaded { seq, set }
        });
    }
}

/// Forward engine events until cancelled or the engine closes its stream
fn spawn_forwarder(
    torrent: Uuid,
    mut events: mpsc::Receiver<EngineEvent>,
    epoch: u64,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                next = events.recv() => next,
            };
            let payload = match next {
                Some(event) => Payload::Engine { torrent, event },
                None => Payload::EngineClosed { torrent },
            };
            let closed = matches!(payload, Payload::EngineClosed { .. });
            if tx.send(SessionEvent { epoch, payload }).is_err() || closed {
                return;
            }
        }
    })
}

/// Query the torrent provider for an item and rank the results
async fn fetch_torrents(
    provider: &dyn TorrentProvider,
    item: &Item,
    selection: ShowSelection,
    season_complete: bool,
) -> TorrentSet {
    let imdb_id = item.ids.imdb_id.as_str();
    if imdb_id.is_empty() {
        warn!(title = %item.title, "item has no IMDB id, no sources");
        return TorrentSet::empty();
    }

    let is_show = item.kind == MediaKind::Show;
    let query = |mode: TorrentMode| async move {
        let params = TorrentQuery {
            season: is_show.then_some(selection.season),
            episode: is_show.then_some(selection.episode),
            search_query: item.title.clone(),
        };
        provider.query(imdb_id, mode, &params).await
    };

    match item.kind {
        MediaKind::Movie => degrade(query(TorrentMode::Movie).await, "movie")
            .map_or_else(TorrentSet::empty, single_source_set),
        MediaKind::Show if !season_complete => degrade(query(TorrentMode::Show).await, "episode")
            .map_or_else(TorrentSet::empty, single_source_set),
        MediaKind::Show => {
            let (episode, season) = tokio::join!(
                query(TorrentMode::Show),
                query(TorrentMode::SeasonComplete)
            );
            match (degrade(episode, "episode"), degrade(season, "season")) {
                (None, None) => TorrentSet::empty(),
                (episode, season) => {
                    merged_set(episode.unwrap_or_default(), season.unwrap_or_default())
                }
            }
        }
    }
}

/// Provider failures degrade to "no results"
fn degrade(result: anyhow::Result<QualityMap>, source: &str) -> Option<QualityMap> {
    match result {
        Ok(map) => Some(map),
        Err(e) => {
            warn!(source, error = %e, "torrent provider failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_scope_parse() {
        assert_eq!("episodes".parse::<ShowScope>().unwrap(), ShowScope::Episodes);
        assert_eq!(" Episode ".parse::<ShowScope>().unwrap(), ShowScope::Episode);
        assert!(matches!(
            "season".parse::<ShowScope>(),
            Err(SessionError::InvalidSelection(_))
        ));
    }

    #[test]
    fn test_poor_source_notice_text() {
        let notice = Notice::PoorSource {
            quality: Some(QualityLabel::HD720p),
            seeders: 3,
        };
        assert_eq!(
            notice.to_string(),
            "Slow streaming: the best 720p source has only 3 seeders"
        );
    }

    #[test]
    fn test_options_from_config() {
        let config = Config {
            season_complete: Some(true),
            ..Config::default()
        };
        let options = SessionOptions::from(&config);
        assert!(options.season_complete);
        assert!(!options.manual_quality_selection);
    }
}
