//! Chromecast control via catt CLI
//!
//! Discovers Chromecast devices and controls playback using catt.
//! catt provides a simpler interface than native Cast protocol.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::backend::PlaybackBackend;
use crate::api::CastingDiscovery;
use crate::error::BackendError;
use crate::models::{CaptionTrack, CastingDevice, Item};

/// Chromecast manager using catt CLI
pub struct CastManager {
    catt_path: String,
    /// Address of the device selected for casting
    selected: Mutex<Option<String>>,
}

impl CastManager {
    pub fn new() -> Self {
        Self::with_path("catt")
    }

    /// Create with custom catt path
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            catt_path: path.into(),
            selected: Mutex::new(None),
        }
    }

    pub fn selected(&self) -> Option<String> {
        self.selected.lock().ok().and_then(|s| s.clone())
    }

    fn set_selected(&self, id: &str) {
        if let Ok(mut selected) = self.selected.lock() {
            *selected = Some(id.to_string());
        }
    }

    /// Discover available Chromecast devices
    pub async fn discover(&self) -> Result<Vec<CastingDevice>> {
        let output = Command::new(&self.catt_path)
            .arg("scan")
            .output()
            .await
            .with_context(|| format!("Failed to run {} scan", self.catt_path))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let devices = CastingDevice::parse_catt_scan(&stdout);
        if !devices.is_empty() {
            return Ok(devices);
        }
        // Some catt versions report to stderr
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(CastingDevice::parse_catt_scan(&stderr))
    }

    /// Run a catt subcommand against the selected device
    async fn run(&self, args: &[&str]) -> Result<(), BackendError> {
        let device = self.selected().ok_or(BackendError::NoDevice)?;
        let output = Command::new(&self.catt_path)
            .arg("-d")
            .arg(&device)
            .args(args)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    BackendError::NotFound(self.catt_path.clone())
                } else {
                    BackendError::Io(e)
                }
            })?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(BackendError::StartFailed(stderr.trim().to_string()))
        }
    }

    /// Cast a URL to the selected device
    pub async fn cast(&self, url: &str, subtitle: Option<&Path>) -> Result<(), BackendError> {
        let sub = subtitle.map(|p| p.display().to_string());
        let mut args = vec!["cast", url];
        if let Some(sub) = sub.as_deref() {
            args.push("-s");
            args.push(sub);
        }
        self.run(&args).await
    }

    pub async fn pause(&self) -> Result<(), BackendError> {
        self.run(&["pause"]).await
    }

    pub async fn stop(&self) -> Result<(), BackendError> {
        self.run(&["stop"]).await
    }
}

impl Default for CastManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CastingDiscovery for CastManager {
    async fn get_devices(&self) -> Result<Vec<CastingDevice>> {
        self.discover().await
    }

    async fn select_device(&self, id: &str) {
        info!(device = id, "cast device selected");
        self.set_selected(id);
    }
}

/// Playback backend that casts through a shared [`CastManager`]
pub struct CastBackend {
    manager: Arc<CastManager>,
    casting: bool,
}

impl CastBackend {
    pub fn new(manager: Arc<CastManager>) -> Self {
        Self {
            manager,
            casting: false,
        }
    }
}

#[async_trait]
impl PlaybackBackend for CastBackend {
    async fn start(
        &mut self,
        serving_url: &str,
        item: &Item,
        captions: &[CaptionTrack],
    ) -> Result<(), BackendError> {
        let subtitle = captions
            .iter()
            .find(|c| c.is_default)
            .map(|c| c.local_path.as_path());
        debug!(title = %item.title, device = ?self.manager.selected(), "casting");
        self.manager.cast(serving_url, subtitle).await?;
        self.casting = true;
        Ok(())
    }

    async fn pause(&mut self) {
        if !self.casting {
            return;
        }
        if let Err(e) = self.manager.pause().await {
            warn!(error = %e, "cast pause failed");
        }
    }

    async fn destroy(&mut self) {
        if !std::mem::take(&mut self.casting) {
            return;
        }
        if let Err(e) = self.manager.stop().await {
            warn!(error = %e, "cast stop failed");
        }
    }
}
