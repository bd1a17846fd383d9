//! External player backend - VLC/mpv
//!
//! Opens the serving URL in a desktop player instead of the built-in
//! surface. The default caption track is handed over as a side-loaded file.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::backend::PlaybackBackend;
use crate::error::BackendError;
use crate::models::{CaptionTrack, Item};

/// Supported external players
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerType {
    #[default]
    Vlc,
    Mpv,
}

impl PlayerType {
    /// Executable to launch
    pub fn command(&self) -> &'static str {
        match self {
            PlayerType::Vlc => {
                #[cfg(target_os = "macos")]
                if Path::new("/Applications/VLC.app").exists() {
                    return "/Applications/VLC.app/Contents/MacOS/VLC";
                }
                "vlc"
            }
            PlayerType::Mpv => "mpv",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PlayerType::Vlc => "VLC",
            PlayerType::Mpv => "mpv",
        }
    }

    /// Player-specific arguments for a stream, its title and an optional subtitle file
    fn args(&self, url: &str, title: &str, subtitle: Option<&Path>) -> Vec<String> {
        let mut args = vec![url.to_string()];
        match self {
            PlayerType::Vlc => {
                if let Some(sub) = subtitle {
                    args.push("--sub-file".to_string());
                    args.push(sub.display().to_string());
                }
                args.push(format!("--meta-title={}", title));
                args.push("--no-video-title-show".to_string());
            }
            PlayerType::Mpv => {
                if let Some(sub) = subtitle {
                    args.push(format!("--sub-file={}", sub.display()));
                }
                args.push(format!("--force-media-title={}", title));
                args.push("--force-window=immediate".to_string());
            }
        }
        args
    }
}

impl std::fmt::Display for PlayerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Playback backend driving a VLC or mpv child process
pub struct ExternalPlayerBackend {
    player: PlayerType,
    child: Option<Child>,
}

impl ExternalPlayerBackend {
    pub fn new(player: PlayerType) -> Self {
        Self {
            player,
            child: None,
        }
    }

    pub fn player(&self) -> PlayerType {
        self.player
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    fn spawn(&self, url: &str, title: &str, subtitle: Option<&Path>) -> Result<Child, BackendError> {
        let command = self.player.command();
        Command::new(command)
            .args(self.player.args(url, title, subtitle))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    BackendError::NotFound(command.to_string())
                } else {
                    BackendError::Io(e)
                }
            })
    }
}

/// The default track's file, if it exists on disk
fn default_subtitle(captions: &[CaptionTrack]) -> Option<&Path> {
    let track = captions.iter().find(|c| c.is_default)?;
    if track.local_path.exists() {
        Some(track.local_path.as_path())
    } else {
        warn!(path = %track.local_path.display(), "subtitle file missing, playing without");
        None
    }
}

#[async_trait]
impl PlaybackBackend for ExternalPlayerBackend {
    async fn start(
        &mut self,
        serving_url: &str,
        item: &Item,
        captions: &[CaptionTrack],
    ) -> Result<(), BackendError> {
        // One window at a time
        self.destroy().await;
        let child = self.spawn(serving_url, &item.title, default_subtitle(captions))?;
        debug!(player = %self.player, pid = ?child.id(), "external player started");
        self.child = Some(child);
        Ok(())
    }

    async fn pause(&mut self) {
        // Player windows have their own controls
    }

    async fn destroy(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                debug!(player = %self.player, error = %e, "player already exited");
            }
        }
    }
}
