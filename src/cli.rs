//! CLI - Command Line Interface for reelcast
//!
//! Every session operation is scriptable. All output is JSON-parseable.
//!
//! # Examples
//!
//! ```bash
//! # Rank sources for a movie
//! reelcast sources 603
//!
//! # Rank sources for an episode, merging season packs
//! reelcast sources 1396 --type show -s 2 -e 3 --season-complete
//!
//! # Stream to a Chromecast
//! reelcast play 603 --player chromecast -d 192.168.1.36
//! ```

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::path::PathBuf;

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for CLI operations (semantic for scripting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    /// General error
    Error = 1,
    /// Invalid arguments or selection
    InvalidArgs = 2,
    /// Metadata or provider lookup failed
    NetworkError = 3,
    /// No cast device found
    DeviceNotFound = 4,
    /// No playable source
    NoStreams = 5,
    /// Torrent engine or backend failed
    PlaybackFailed = 6,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> std::process::ExitCode {
        std::process::ExitCode::from(code as u8)
    }
}

// =============================================================================
// Main CLI Structure
// =============================================================================

/// reelcast - stream torrents to your player or TV
#[derive(Parser, Debug)]
#[command(
    name = "reelcast",
    version,
    about = "Find the best torrent source for a title and stream it",
    long_about = "Ranks torrent sources across quality tiers, then streams the \
                  best one to the browser, VLC/mpv or a Chromecast with subtitles.",
    after_help = "EXAMPLES:\n\
                  reelcast sources 603                      Rank movie sources\n\
                  reelcast sources 1396 -t show -s 1 -e 2   Rank episode sources\n\
                  reelcast play 603 -p external             Play in VLC/mpv\n\
                  reelcast devices --json                   List cast devices"
)]
pub struct Cli {
    /// Output format as JSON (default for non-TTY)
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Cast device address
    #[arg(long, short = 'd', global = true)]
    pub device: Option<String>,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Check if JSON output should be used
    pub fn should_json(&self) -> bool {
        self.json || !std::io::stdout().is_terminal()
    }
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rank torrent sources for a movie or episode
    #[command(visible_alias = "src")]
    Sources(SourcesCmd),

    /// Stream a title with the chosen player
    Play(PlayCmd),

    /// Download subtitles for a title
    #[command(visible_alias = "sub")]
    Subtitles(SubtitlesCmd),

    /// List available Chromecast devices
    #[command(visible_alias = "dev")]
    Devices(DevicesCmd),
}

/// Which item and episode to select
#[derive(Args, Debug, Clone)]
pub struct Selection {
    /// TMDB or IMDB id (e.g., 603 or tt0133093)
    #[arg(required = true)]
    pub id: String,

    /// Media type: movie or show
    #[arg(long = "type", short = 't', default_value = "movie")]
    pub media_type: String,

    /// Season number (for shows)
    #[arg(long, short = 's')]
    pub season: Option<u32>,

    /// Episode number (for shows)
    #[arg(long, short = 'e')]
    pub episode: Option<u32>,

    /// Merge whole-season torrents into show results
    #[arg(long)]
    pub season_complete: bool,
}

impl Selection {
    /// Whether an explicit episode scope was requested
    pub fn has_scope(&self) -> bool {
        self.season.is_some() || self.episode.is_some()
    }
}

// =============================================================================
// Sources Command
// =============================================================================

/// Rank sources per quality and show the ideal pick
#[derive(Args, Debug)]
pub struct SourcesCmd {
    #[command(flatten)]
    pub selection: Selection,
}

// =============================================================================
// Play Command
// =============================================================================

/// Start the torrent engine and hand the stream to a player
#[derive(Args, Debug)]
pub struct PlayCmd {
    #[command(flatten)]
    pub selection: Selection,

    /// Quality tier (1080p, 720p, 480p); defaults to the ideal source
    #[arg(long, short = 'Q')]
    pub quality: Option<String>,

    /// Player: default, plyr, external, chromecast, youtube
    #[arg(long, short = 'p', default_value = "default")]
    pub player: String,
}

// =============================================================================
// Subtitles Command
// =============================================================================

/// Download subtitles into the subtitle directory
#[derive(Args, Debug)]
pub struct SubtitlesCmd {
    /// IMDB ID (e.g., tt1877830)
    #[arg(required = true)]
    pub imdb_id: String,

    /// Language codes, comma-separated (default: configured languages)
    #[arg(long, short = 'l')]
    pub lang: Option<String>,

    /// Season number (for TV shows)
    #[arg(long, short = 's')]
    pub season: Option<u32>,

    /// Episode number (for TV shows)
    #[arg(long, short = 'e')]
    pub episode: Option<u32>,
}

impl SubtitlesCmd {
    /// Parse language codes into a vector
    pub fn languages(&self) -> Option<Vec<String>> {
        self.lang.as_ref().map(|l| {
            l.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
    }

    /// Provider id: "tt123" or "tt123:season:episode"
    pub fn external_id(&self) -> String {
        match (self.season, self.episode) {
            (Some(s), Some(e)) => format!("{}:{}:{}", self.imdb_id, s, e),
            _ => self.imdb_id.clone(),
        }
    }
}

// =============================================================================
// Devices Command
// =============================================================================

/// List Chromecast devices on the network
#[derive(Args, Debug)]
pub struct DevicesCmd {}

// =============================================================================
// JSON Output Types
// =============================================================================

/// Generic JSON output wrapper with status
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonOutput<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "is_zero")]
    pub exit_code: i32,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

impl<T: Serialize> JsonOutput<T> {
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            exit_code: 0,
        }
    }

    pub fn error_msg(msg: impl Into<String>, code: ExitCode) -> JsonOutput<()> {
        JsonOutput::<()> {
            data: None,
            error: Some(msg.into()),
            exit_code: code.into(),
        }
    }
}

// =============================================================================
// Output Helpers
// =============================================================================

/// Output handler for consistent formatting
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    pub fn new(cli: &Cli) -> Self {
        Self {
            json: cli.should_json(),
            quiet: cli.quiet,
        }
    }

    /// Print success data
    pub fn print<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(&JsonOutput::success(data))?);
        } else {
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Ok(())
    }

    /// Print error and return exit code
    pub fn error(&self, msg: impl Into<String>, code: ExitCode) -> ExitCode {
        let msg = msg.into();
        if self.json {
            let output = JsonOutput::<()>::error_msg(&msg, code);
            if let Ok(json) = serde_json::to_string_pretty(&output) {
                eprintln!("{}", json);
            }
        } else if !self.quiet {
            eprintln!("Error: {}", msg);
        }
        code
    }

    /// Print info message (suppressed in quiet mode)
    pub fn info(&self, msg: impl std::fmt::Display) {
        if !self.quiet && !self.json {
            eprintln!("{}", msg);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_sources_command() {
        let cli = Cli::parse_from([
            "reelcast", "sources", "1396", "-t", "show", "-s", "2", "-e", "3", "--season-complete",
        ]);
        let Command::Sources(cmd) = cli.command else {
            panic!("Expected Sources command");
        };
        assert_eq!(cmd.selection.id, "1396");
        assert_eq!(cmd.selection.media_type, "show");
        assert_eq!(cmd.selection.season, Some(2));
        assert_eq!(cmd.selection.episode, Some(3));
        assert!(cmd.selection.season_complete);
        assert!(cmd.selection.has_scope());
    }

    #[test]
    fn test_play_defaults() {
        let cli = Cli::parse_from(["reelcast", "--device", "192.168.1.36", "play", "603"]);
        let Command::Play(cmd) = cli.command else {
            panic!("Expected Play command");
        };
        assert_eq!(cmd.player, "default");
        assert_eq!(cmd.quality, None);
        assert_eq!(cmd.selection.media_type, "movie");
        assert!(!cmd.selection.has_scope());
        assert_eq!(cli.device.as_deref(), Some("192.168.1.36"));
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["reelcast", "--json", "--quiet", "devices"]);
        assert!(cli.json);
        assert!(cli.quiet);
        assert!(matches!(cli.command, Command::Devices(_)));
    }

    #[test]
    fn test_subtitles_languages() {
        let cli = Cli::parse_from(["reelcast", "sub", "tt0903747", "-l", "eng, spa", "-s", "1", "-e", "5"]);
        let Command::Subtitles(cmd) = cli.command else {
            panic!("Expected Subtitles command");
        };
        assert_eq!(cmd.languages(), Some(vec!["eng".to_string(), "spa".to_string()]));
        assert_eq!(cmd.external_id(), "tt0903747:1:5");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(i32::from(ExitCode::Success), 0);
        assert_eq!(i32::from(ExitCode::InvalidArgs), 2);
        assert_eq!(i32::from(ExitCode::PlaybackFailed), 6);
    }

    #[test]
    fn test_json_error_output() {
        let out = JsonOutput::<()>::error_msg("no sources", ExitCode::NoStreams);
        let json = serde_json::to_string(&out).unwrap();
        assert_eq!(json, r#"{"error":"no sources","exit_code":5}"#);
    }
}
