//! Stremio Subtitle Client
//!
//! Free subtitle search using Stremio's public addon endpoint.
//! No API key required - uses Stremio's OpenSubtitles v3 addon.
//!
//! Downloads are converted from SRT to WebVTT, which every backend accepts,
//! and written into the directory the subtitle file server exposes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::api::{SubtitleProvider, SubtitleRequest};
use crate::models::{CaptionTrack, SubtitleDescriptor};

/// Stremio subtitle response
#[derive(Debug, Deserialize)]
struct StremioResponse {
    subtitles: Vec<StremioSubtitle>,
}

/// Single subtitle from Stremio
#[derive(Debug, Deserialize)]
struct StremioSubtitle {
    url: String,
    lang: String,
}

/// Subtitle client using Stremio's free public endpoint
pub struct SubtitleClient {
    base_url: String,
    client: reqwest::Client,
}

impl SubtitleClient {
    pub fn new() -> Self {
        Self::with_base_url("https://opensubtitles-v3.strem.io")
    }

    /// Create with custom base URL (for testing)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Listing URL for an id; "tt123:1:2" addresses a show episode
    fn listing_url(&self, external_id: &str) -> String {
        let kind = if external_id.contains(':') { "series" } else { "movie" };
        format!(
            "{}/subtitles/{}/{}.json",
            self.base_url,
            kind,
            normalize_imdb_id(external_id)
        )
    }

    /// All subtitles listed for an id, in provider order
    async fn search(&self, external_id: &str) -> Result<Vec<StremioSubtitle>> {
        let url = self.listing_url(external_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch subtitle listing")?;

        if !response.status().is_success() {
            return Err(anyhow!("Stremio API error: {}", response.status()));
        }

        let listing: StremioResponse = response.json().await?;
        Ok(listing.subtitles)
    }

    /// Download one subtitle and write it as WebVTT to `dest`
    async fn download_to(&self, subtitle: &StremioSubtitle, dest: &Path) -> Result<()> {
        let response = self.client.get(&subtitle.url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "Failed to download subtitle: {}",
                response.status()
            ));
        }
        let srt = response.text().await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, srt_to_webvtt(&srt))
            .await
            .with_context(|| format!("Failed to write {}", dest.display()))?;
        Ok(())
    }
}

impl Default for SubtitleClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubtitleProvider for SubtitleClient {
    async fn fetch(
        &self,
        external_id: &str,
        request: &SubtitleRequest,
    ) -> Result<Vec<SubtitleDescriptor>> {
        let listing = self.search(external_id).await?;
        let mut descriptors = Vec::new();

        for lang in &request.languages {
            let Some(subtitle) = listing.iter().find(|s| lang_matches(&s.lang, lang)) else {
                debug!(external_id, lang = lang.as_str(), "no subtitle for language");
                continue;
            };

            let file_name = format!("{}_{}.vtt", file_stem(external_id), lang);
            let dest = request.path.join(&file_name);
            // Already on disk from an earlier session
            if !dest.exists() {
                if let Err(e) = self.download_to(subtitle, &dest).await {
                    warn!(external_id, lang = lang.as_str(), error = %e, "subtitle download failed");
                    continue;
                }
            }
            descriptors.push(SubtitleDescriptor {
                language_code: lang.clone(),
                file_name,
            });
        }

        Ok(descriptors)
    }
}

/// Maps provider descriptors to caption tracks served by the local file server
pub struct SubtitleTrackResolver {
    provider: Arc<dyn SubtitleProvider>,
    preferred_lang: String,
    languages: Vec<String>,
    dir: PathBuf,
    base_url: String,
}

impl SubtitleTrackResolver {
    pub fn new(
        provider: Arc<dyn SubtitleProvider>,
        preferred_lang: impl Into<String>,
        languages: Vec<String>,
        dir: PathBuf,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            preferred_lang: preferred_lang.into(),
            languages,
            dir,
            base_url: base_url.into(),
        }
    }

    /// Caption tracks for an item; provider failure yields no tracks
    pub async fn resolve(&self, external_id: &str) -> Vec<CaptionTrack> {
        let request = SubtitleRequest {
            path: self.dir.clone(),
            languages: self.languages.clone(),
        };

        let descriptors = match self.provider.fetch(external_id, &request).await {
            Ok(descriptors) => descriptors,
            Err(e) => {
                warn!(external_id, error = %e, "subtitle provider failed");
                return Vec::new();
            }
        };

        let mut default_taken = false;
        descriptors
            .into_iter()
            .map(|d| {
                let is_default =
                    !default_taken && d.language_code.eq_ignore_ascii_case(&self.preferred_lang);
                default_taken |= is_default;
                CaptionTrack {
                    locally_served_url: format!(
                        "{}/{}",
                        self.base_url.trim_end_matches('/'),
                        urlencoding::encode(&d.file_name)
                    ),
                    local_path: self.dir.join(&d.file_name),
                    language_code: d.language_code,
                    is_default,
                }
            })
            .collect()
    }
}

/// Convert SRT content to WebVTT format
///
/// Timestamps change from 00:00:00,000 to 00:00:00.000 and the WEBVTT
/// header is prepended. Dialogue lines are left alone.
pub fn srt_to_webvtt(srt: &str) -> String {
    let srt = srt.trim_start_matches('\u{feff}');
    if srt.starts_with("WEBVTT") {
        return srt.to_string();
    }

    let mut webvtt = String::from("WEBVTT\n\n");
    for line in srt.lines() {
        if line.contains(" --> ") {
            webvtt.push_str(&line.replace(',', "."));
        } else {
            webvtt.push_str(line);
        }
        webvtt.push('\n');
    }
    webvtt
}

/// Normalize IMDB ID to have "tt" prefix
fn normalize_imdb_id(imdb_id: &str) -> String {
    if imdb_id.starts_with("tt") {
        imdb_id.to_string()
    } else {
        format!("tt{}", imdb_id)
    }
}

/// Filesystem-safe stem for an id ("tt1:2:3" -> "tt1_2_3")
fn file_stem(external_id: &str) -> String {
    external_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Stremio mixes ISO 639-2 codes with shorter variants ("pob", "pt")
fn lang_matches(offered: &str, wanted: &str) -> bool {
    offered.eq_ignore_ascii_case(wanted)
        || (wanted.len() < offered.len() && offered.to_lowercase().starts_with(&wanted.to_lowercase()))
}
