//! Playback backends behind one capability surface
//!
//! Each [`BackendKind`] owns exactly one backend instance. The adapter
//! dispatches by exhaustive match so every kind is always routable.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::BackendError;
use crate::models::{BackendKind, CaptionTrack, Item};

/// Uniform contract every player backend implements
#[async_trait]
pub trait PlaybackBackend: Send {
    /// Begin rendering/streaming `serving_url`
    async fn start(
        &mut self,
        serving_url: &str,
        item: &Item,
        captions: &[CaptionTrack],
    ) -> Result<(), BackendError>;

    async fn pause(&mut self);

    /// Release the backend; safe on a never-started or destroyed instance
    async fn destroy(&mut self);
}

/// One instance per backend kind
pub struct BackendSet {
    pub default: Box<dyn PlaybackBackend>,
    pub plyr: Box<dyn PlaybackBackend>,
    pub external: Box<dyn PlaybackBackend>,
    pub chromecast: Box<dyn PlaybackBackend>,
    pub youtube: Box<dyn PlaybackBackend>,
}

/// Routes start/pause/destroy to the instance for a backend kind
pub struct PlaybackBackendAdapter {
    backends: BackendSet,
    start_delay: Duration,
}

impl PlaybackBackendAdapter {
    pub fn new(backends: BackendSet, start_delay: Duration) -> Self {
        Self {
            backends,
            start_delay,
        }
    }

    fn backend_mut(&mut self, kind: BackendKind) -> &mut dyn PlaybackBackend {
        match kind {
            BackendKind::Default => self.backends.default.as_mut(),
            BackendKind::Plyr => self.backends.plyr.as_mut(),
            BackendKind::External => self.backends.external.as_mut(),
            BackendKind::Chromecast => self.backends.chromecast.as_mut(),
            BackendKind::Youtube => self.backends.youtube.as_mut(),
        }
    }

    pub async fn start(
        &mut self,
        kind: BackendKind,
        serving_url: &str,
        item: &Item,
        captions: &[CaptionTrack],
    ) -> Result<(), BackendError> {
        // The video surface needs a moment before it accepts a source
        if kind.is_surface() && !self.start_delay.is_zero() {
            debug!(%kind, delay_ms = self.start_delay.as_millis() as u64, "waiting for video surface");
            tokio::time::sleep(self.start_delay).await;
        }
        info!(%kind, url = serving_url, title = %item.title, "starting playback backend");
        self.backend_mut(kind).start(serving_url, item, captions).await
    }

    pub async fn pause(&mut self, kind: BackendKind) {
        self.backend_mut(kind).pause().await;
    }

    pub async fn destroy(&mut self, kind: BackendKind) {
        debug!(%kind, "destroying playback backend");
        self.backend_mut(kind).destroy().await;
    }
}

// =============================================================================
// HTML Video (system browser)
// =============================================================================

/// Plays the stream in the system browser's native HTML video element
pub struct HtmlVideoBackend {
    label: &'static str,
    opener: String,
    source: Option<String>,
}

impl HtmlVideoBackend {
    pub fn new(label: &'static str) -> Self {
        Self::with_opener(label, default_opener())
    }

    /// Use a custom command to open URLs
    pub fn with_opener(label: &'static str, opener: impl Into<String>) -> Self {
        Self {
            label,
            opener: opener.into(),
            source: None,
        }
    }

    /// Currently attached source, if any
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }
}

fn default_opener() -> &'static str {
    if cfg!(target_os = "macos") {
        "open"
    } else if cfg!(target_os = "windows") {
        "explorer"
    } else {
        "xdg-open"
    }
}

#[async_trait]
impl PlaybackBackend for HtmlVideoBackend {
    async fn start(
        &mut self,
        serving_url: &str,
        _item: &Item,
        _captions: &[CaptionTrack],
    ) -> Result<(), BackendError> {
        let status = Command::new(&self.opener)
            .arg(serving_url)
            .status()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    BackendError::NotFound(self.opener.clone())
                } else {
                    BackendError::Io(e)
                }
            })?;

        if !status.success() {
            return Err(BackendError::StartFailed(format!(
                "{} exited with {}",
                self.opener, status
            )));
        }
        self.source = Some(serving_url.to_string());
        Ok(())
    }

    async fn pause(&mut self) {
        // The browser tab owns its own transport controls
        debug!(backend = self.label, "pause requested on browser video");
    }

    async fn destroy(&mut self) {
        self.source = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExternalIds, MediaKind};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    struct Named(&'static str, Recorder);

    #[async_trait]
    impl PlaybackBackend for Named {
        async fn start(
            &mut self,
            url: &str,
            _item: &Item,
            _captions: &[CaptionTrack],
        ) -> Result<(), BackendError> {
            self.1 .0.lock().unwrap().push(format!("{}:start:{}", self.0, url));
            Ok(())
        }

        async fn pause(&mut self) {
            self.1 .0.lock().unwrap().push(format!("{}:pause", self.0));
        }

        async fn destroy(&mut self) {
            self.1 .0.lock().unwrap().push(format!("{}:destroy", self.0));
        }
    }

    fn item() -> Item {
        Item {
            id: "603".to_string(),
            ids: ExternalIds::default(),
            title: "The Matrix".to_string(),
            kind: MediaKind::Movie,
            year: None,
            summary: String::new(),
            genres: vec![],
            rating: None,
            runtime: None,
            trailer: None,
        }
    }

    fn adapter(recorder: &Recorder) -> PlaybackBackendAdapter {
        PlaybackBackendAdapter::new(
            BackendSet {
                default: Box::new(Named("default", recorder.clone())),
                plyr: Box::new(Named("plyr", recorder.clone())),
                external: Box::new(Named("external", recorder.clone())),
                chromecast: Box::new(Named("chromecast", recorder.clone())),
                youtube: Box::new(Named("youtube", recorder.clone())),
            },
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn test_dispatch_routes_to_matching_backend() {
        let recorder = Recorder::default();
        let mut adapter = adapter(&recorder);

        adapter
            .start(BackendKind::Chromecast, "http://x/0", &item(), &[])
            .await
            .unwrap();
        adapter.pause(BackendKind::Youtube).await;
        adapter.destroy(BackendKind::External).await;

        let calls = recorder.0.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec!["chromecast:start:http://x/0", "youtube:pause", "external:destroy"]
        );
    }

    #[tokio::test]
    async fn test_html_backend_destroy_is_idempotent() {
        let mut backend = HtmlVideoBackend::with_opener("default", "true");
        backend.destroy().await;
        backend.destroy().await;
        assert!(backend.source().is_none());
    }

    #[tokio::test]
    async fn test_html_backend_missing_opener() {
        let mut backend = HtmlVideoBackend::with_opener("default", "reelcast-no-such-opener");
        let err = backend.start("http://x/0", &item(), &[]).await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
        assert!(backend.source().is_none());
    }
}
