//! Shared in-memory collaborators for controller tests
//!
//! Every mock records its calls. Engine and backend calls go into one
//! shared log so tests can assert the order of teardown and start.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use reelcast::api::{
    CastingDiscovery, EngineEvent, EngineRequest, HistoryKind, MetadataProvider, ServingInfo,
    SubtitleProvider, SubtitleRequest, TorrentEngine, TorrentHandle, TorrentMode,
    TorrentProvider, TorrentQuery, WatchHistoryStore,
};
use reelcast::error::BackendError;
use reelcast::models::{
    CaptionTrack, CastingDevice, DeliveryMethod, Episode, ExternalIds, HealthClass, Item,
    MediaKind, QualityLabel, QualityMap, Season, SubtitleDescriptor, TorrentCandidate,
};
use reelcast::session::{Providers, SessionController, SessionOptions};
use reelcast::stream::{
    BackendSet, CastingDeviceMonitor, PlaybackBackend, PlaybackBackendAdapter,
    SubtitleTrackResolver,
};

pub type Log = Arc<Mutex<Vec<String>>>;

// =============================================================================
// Fixtures
// =============================================================================

pub fn movie(id: &str, imdb_id: &str, title: &str) -> Item {
    Item {
        id: id.to_string(),
        ids: ExternalIds {
            imdb_id: imdb_id.to_string(),
            tmdb_id: id.to_string(),
        },
        title: title.to_string(),
        kind: MediaKind::Movie,
        year: Some(1999),
        summary: String::new(),
        genres: vec![],
        rating: None,
        runtime: None,
        trailer: None,
    }
}

pub fn show(id: &str, imdb_id: &str, title: &str) -> Item {
    Item {
        kind: MediaKind::Show,
        ..movie(id, imdb_id, title)
    }
}

pub fn candidate(
    quality: QualityLabel,
    seeders: u32,
    health: HealthClass,
    delivery: DeliveryMethod,
) -> TorrentCandidate {
    TorrentCandidate {
        quality: Some(quality),
        magnet: Some(format!(
            "magnet:?xt=urn:btih:{}-{}-{:?}",
            quality, seeders, delivery
        )),
        health,
        seeders,
        delivery: Some(delivery),
    }
}

/// Map of candidates keyed by their own quality label
pub fn quality_map(candidates: &[TorrentCandidate]) -> QualityMap {
    candidates
        .iter()
        .filter_map(|c| c.quality.map(|q| (q, c.clone())))
        .collect()
}

// =============================================================================
// Metadata
// =============================================================================

#[derive(Default)]
pub struct MockMetadata {
    items: Mutex<HashMap<String, (Item, Duration)>>,
    pub calls: Mutex<Vec<String>>,
}

impl MockMetadata {
    pub fn add(&self, item: Item, latency: Duration) {
        self.items
            .lock()
            .unwrap()
            .insert(item.id.clone(), (item, latency));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataProvider for MockMetadata {
    async fn get_item(&self, id: &str, _kind: MediaKind) -> Result<Item> {
        self.calls.lock().unwrap().push(format!("item:{}", id));
        let entry = self.items.lock().unwrap().get(id).cloned();
        let Some((item, latency)) = entry else {
            bail!("no item {}", id);
        };
        tokio::time::sleep(latency).await;
        Ok(item)
    }

    async fn get_season_list(&self, id: &str) -> Result<Vec<Season>> {
        self.calls.lock().unwrap().push(format!("seasons:{}", id));
        Ok((1..=3)
            .map(|number| Season {
                number,
                episode_count: 8,
                name: Some(format!("Season {}", number)),
            })
            .collect())
    }

    async fn get_season_episodes(&self, id: &str, season: u32) -> Result<Vec<Episode>> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("episodes:{}:{}", id, season));
        Ok((1..=8)
            .map(|episode| Episode {
                season,
                episode,
                name: format!("Episode {}", episode),
                overview: String::new(),
            })
            .collect())
    }
}

// =============================================================================
// Torrents
// =============================================================================

/// Per-mode responses; `None` makes the query fail
#[derive(Default)]
pub struct MockTorrents {
    movie: Mutex<Option<QualityMap>>,
    show: Mutex<Option<QualityMap>>,
    season: Mutex<Option<QualityMap>>,
    pub calls: Mutex<Vec<String>>,
}

impl MockTorrents {
    pub fn set(&self, mode: TorrentMode, response: Option<QualityMap>) {
        *self.slot(mode).lock().unwrap() = response;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn slot(&self, mode: TorrentMode) -> &Mutex<Option<QualityMap>> {
        match mode {
            TorrentMode::Movie => &self.movie,
            TorrentMode::Show => &self.show,
            TorrentMode::SeasonComplete => &self.season,
        }
    }
}

#[async_trait]
impl TorrentProvider for MockTorrents {
    async fn query(
        &self,
        imdb_id: &str,
        mode: TorrentMode,
        query: &TorrentQuery,
    ) -> Result<QualityMap> {
        let scope = match (query.season, query.episode) {
            (Some(s), Some(e)) => format!(":{}:{}", s, e),
            _ => String::new(),
        };
        self.calls
            .lock()
            .unwrap()
            .push(format!("{:?}:{}{}", mode, imdb_id, scope));
        match self.slot(mode).lock().unwrap().clone() {
            Some(map) => Ok(map),
            None => bail!("provider unavailable"),
        }
    }
}

// =============================================================================
// Subtitles
// =============================================================================

#[derive(Default)]
pub struct MockSubtitles {
    pub fail: AtomicBool,
    pub calls: Mutex<Vec<String>>,
}

impl MockSubtitles {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubtitleProvider for MockSubtitles {
    async fn fetch(
        &self,
        external_id: &str,
        request: &SubtitleRequest,
    ) -> Result<Vec<SubtitleDescriptor>> {
        self.calls.lock().unwrap().push(external_id.to_string());
        if self.fail.load(Ordering::SeqCst) {
            bail!("subtitle service down");
        }
        Ok(request
            .languages
            .iter()
            .map(|lang| SubtitleDescriptor {
                language_code: lang.clone(),
                file_name: format!("{}_{}.vtt", external_id.replace(':', "_"), lang),
            })
            .collect())
    }
}

// =============================================================================
// Torrent engine
// =============================================================================

/// Engine double; handles are labelled t1, t2, ... in start order
pub struct MockEngine {
    log: Log,
    pub fail: AtomicBool,
    pub auto_ready: AtomicBool,
    handles: Mutex<Vec<(Uuid, String, Option<mpsc::Sender<EngineEvent>>)>>,
    started: AtomicUsize,
}

impl MockEngine {
    pub fn new(log: Log) -> Self {
        Self {
            log,
            fail: AtomicBool::new(false),
            auto_ready: AtomicBool::new(true),
            handles: Mutex::new(Vec::new()),
            started: AtomicUsize::new(0),
        }
    }

    pub fn serving_url(label: &str) -> String {
        format!("http://127.0.0.1:8888/{}", label)
    }

    /// Send an event on the most recently started, still alive torrent
    pub async fn emit(&self, event: EngineEvent) -> bool {
        let tx = self
            .handles
            .lock()
            .unwrap()
            .last()
            .and_then(|(_, _, tx)| tx.clone());
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Close the event stream of the most recent torrent without a destroy;
    /// the handle itself stays registered until destroyed
    pub fn crash(&self) {
        if let Some(entry) = self.handles.lock().unwrap().last_mut() {
            entry.2 = None;
        }
    }

    /// Handles started and not yet destroyed
    pub fn live_handles(&self) -> usize {
        self.handles.lock().unwrap().len()
    }
}

#[async_trait]
impl TorrentEngine for MockEngine {
    async fn start(&self, request: EngineRequest) -> Result<TorrentHandle> {
        if self.fail.load(Ordering::SeqCst) {
            self.log.lock().unwrap().push("engine:start-failed".to_string());
            bail!("webtorrent exploded");
        }
        let label = format!("t{}", self.started.fetch_add(1, Ordering::SeqCst) + 1);
        self.log
            .lock()
            .unwrap()
            .push(format!("engine:start:{}", label));

        let id = Uuid::new_v4();
        let (tx, events) = mpsc::channel(16);
        if self.auto_ready.load(Ordering::SeqCst) {
            let _ = tx.try_send(EngineEvent::Progress(0.25));
            let _ = tx.try_send(EngineEvent::Ready(ServingInfo {
                url: Self::serving_url(&label),
                file: "video.mp4".to_string(),
                files: vec!["video.mp4".to_string()],
                hash: request.magnet.clone(),
            }));
        }
        self.handles.lock().unwrap().push((id, label, Some(tx)));
        Ok(TorrentHandle { id, events })
    }

    async fn destroy(&self, id: Uuid) {
        let mut handles = self.handles.lock().unwrap();
        if let Some(pos) = handles.iter().position(|(h, _, _)| *h == id) {
            let (_, label, _) = handles.remove(pos);
            self.log
                .lock()
                .unwrap()
                .push(format!("engine:destroy:{}", label));
        }
    }
}

// =============================================================================
// Watch history
// =============================================================================

/// Appends blindly so duplicate protection must come from the caller
#[derive(Default)]
pub struct MockHistory {
    lists: Mutex<HashMap<HistoryKind, Vec<Item>>>,
}

#[async_trait]
impl WatchHistoryStore for MockHistory {
    async fn get(&self, kind: HistoryKind) -> Result<Vec<Item>> {
        Ok(self
            .lists
            .lock()
            .unwrap()
            .get(&kind)
            .cloned()
            .unwrap_or_default())
    }

    async fn set(&self, kind: HistoryKind, item: &Item) -> Result<()> {
        self.lists
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push(item.clone());
        Ok(())
    }
}

// =============================================================================
// Casting discovery
// =============================================================================

pub struct MockDiscovery {
    pub calls: AtomicUsize,
    devices: Vec<CastingDevice>,
    /// Calls after this many fail
    fail_after: Option<usize>,
    pub selected: Mutex<Vec<String>>,
}

impl MockDiscovery {
    pub fn new(devices: Vec<CastingDevice>, fail_after: Option<usize>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            devices,
            fail_after,
            selected: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CastingDiscovery for MockDiscovery {
    async fn get_devices(&self) -> Result<Vec<CastingDevice>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_after.is_some_and(|limit| n > limit) {
            bail!("mdns timeout");
        }
        Ok(self.devices.clone())
    }

    async fn select_device(&self, id: &str) {
        self.selected.lock().unwrap().push(id.to_string());
    }
}

pub fn device(id: &str, name: &str) -> CastingDevice {
    CastingDevice {
        id: id.to_string(),
        display_name: name.to_string(),
        model: None,
    }
}

// =============================================================================
// Playback backends
// =============================================================================

pub struct RecordingBackend {
    name: &'static str,
    log: Log,
    fail: bool,
}

impl RecordingBackend {
    pub fn new(name: &'static str, log: Log) -> Self {
        Self {
            name,
            log,
            fail: false,
        }
    }

    pub fn failing(name: &'static str, log: Log) -> Self {
        Self {
            name,
            log,
            fail: true,
        }
    }
}

#[async_trait]
impl PlaybackBackend for RecordingBackend {
    async fn start(
        &mut self,
        serving_url: &str,
        _item: &Item,
        captions: &[CaptionTrack],
    ) -> Result<(), BackendError> {
        self.log.lock().unwrap().push(format!(
            "{}:start:{}:{}",
            self.name,
            serving_url,
            captions.len()
        ));
        if self.fail {
            return Err(BackendError::StartFailed(format!("{} unavailable", self.name)));
        }
        Ok(())
    }

    async fn pause(&mut self) {
        self.log.lock().unwrap().push(format!("{}:pause", self.name));
    }

    async fn destroy(&mut self) {
        self.log.lock().unwrap().push(format!("{}:destroy", self.name));
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub controller: SessionController,
    pub log: Log,
    pub metadata: Arc<MockMetadata>,
    pub torrents: Arc<MockTorrents>,
    pub subtitles: Arc<MockSubtitles>,
    pub engine: Arc<MockEngine>,
    pub history: Arc<MockHistory>,
    pub discovery: Arc<MockDiscovery>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(SessionOptions::default())
    }

    pub fn with_options(options: SessionOptions) -> Self {
        Self::build(options, false)
    }

    /// Harness whose external player backend fails to start
    pub fn with_failing_external() -> Self {
        Self::build(SessionOptions::default(), true)
    }

    fn build(options: SessionOptions, failing_external: bool) -> Self {
        let log: Log = Arc::default();
        let metadata = Arc::new(MockMetadata::default());
        let torrents = Arc::new(MockTorrents::default());
        let subtitles = Arc::new(MockSubtitles::default());
        let engine = Arc::new(MockEngine::new(log.clone()));
        let history = Arc::new(MockHistory::default());
        let discovery = Arc::new(MockDiscovery::new(
            vec![device("192.168.1.50", "Living Room")],
            None,
        ));

        let external: Box<dyn PlaybackBackend> = if failing_external {
            Box::new(RecordingBackend::failing("external", log.clone()))
        } else {
            Box::new(RecordingBackend::new("external", log.clone()))
        };
        let adapter = PlaybackBackendAdapter::new(
            BackendSet {
                default: Box::new(RecordingBackend::new("default", log.clone())),
                plyr: Box::new(RecordingBackend::new("plyr", log.clone())),
                external,
                chromecast: Box::new(RecordingBackend::new("chromecast", log.clone())),
                youtube: Box::new(RecordingBackend::new("youtube", log.clone())),
            },
            Duration::ZERO,
        );

        let resolver = SubtitleTrackResolver::new(
            subtitles.clone(),
            "eng",
            vec!["eng".to_string(), "spa".to_string()],
            PathBuf::from("/tmp/reelcast-subtitles"),
            "http://127.0.0.1:8889",
        );
        let monitor = CastingDeviceMonitor::new(discovery.clone(), Duration::from_millis(20));

        let providers = Providers {
            metadata: metadata.clone(),
            torrents: torrents.clone(),
            engine: engine.clone(),
            history: history.clone(),
        };
        let controller = SessionController::new(providers, resolver, adapter, monitor, options);

        Self {
            controller,
            log,
            metadata,
            torrents,
            subtitles,
            engine,
            history,
            discovery,
        }
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    /// Register a movie with the given sources and select it
    pub async fn load_movie(&mut self, item: Item, sources: &[TorrentCandidate]) {
        self.torrents
            .set(TorrentMode::Movie, Some(quality_map(sources)));
        let id = item.id.clone();
        self.metadata.add(item, Duration::ZERO);
        self.controller.select_item(&id, MediaKind::Movie).await;
        self.controller.settle().await;
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
