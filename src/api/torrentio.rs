//! Torrentio addon client
//!
//! Fetches stream sources from the Torrentio Stremio addon and reduces them
//! to one ranked candidate per quality label.

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use super::providers::{TorrentMode, TorrentProvider, TorrentQuery};
use crate::models::{DeliveryMethod, QualityLabel, QualityMap, TorrentCandidate};
use crate::selector::{classify_health, merge_and_rank};

/// Torrentio API response
#[derive(Debug, Deserialize)]
struct TorrentioResponse {
    streams: Vec<TorrentioStream>,
}

/// Individual stream from Torrentio
#[derive(Debug, Deserialize)]
struct TorrentioStream {
    name: String,
    title: String,
    #[serde(rename = "infoHash")]
    info_hash: String,
}

impl TorrentioStream {
    /// Whether the release is a whole-season pack rather than one episode
    fn is_season_pack(&self) -> bool {
        let (Some(episode), Some(season)) = (episode_marker(), season_marker()) else {
            return false;
        };
        let release = self.title.lines().next().unwrap_or(&self.title);
        !episode.is_match(release) && season.is_match(release)
    }

    /// Convert to a candidate; `None` for tiers outside the label set
    fn into_candidate(self, display_name: &str, delivery: DeliveryMethod) -> Option<TorrentCandidate> {
        let quality = QualityLabel::from_str_loose(&self.name)?;
        let seeders = parse_seeds(&self.title);
        Some(TorrentCandidate {
            quality: Some(quality),
            magnet: Some(to_magnet(&self.info_hash, display_name)),
            health: classify_health(seeders),
            seeders,
            delivery: Some(delivery),
        })
    }
}

fn episode_marker() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bS\d{1,2}[ ._-]?E\d{1,3}\b|\b\d{1,2}x\d{2}\b").ok())
        .as_ref()
}

fn season_marker() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bS\d{1,2}\b|\bseason[ ._-]?\d{1,2}\b|\bcomplete\b").ok())
        .as_ref()
}

/// Generate magnet URL for an info hash
pub fn to_magnet(info_hash: &str, display_name: &str) -> String {
    format!(
        "magnet:?xt=urn:btih:{}&dn={}",
        info_hash,
        urlencoding::encode(display_name)
    )
}

/// Parse seeds from title string (e.g., "👤 142" or "👤 1.2k")
pub fn parse_seeds(title: &str) -> u32 {
    static EMOJI: OnceLock<Option<Regex>> = OnceLock::new();
    static TEXT: OnceLock<Option<Regex>> = OnceLock::new();

    let emoji = EMOJI.get_or_init(|| Regex::new(r"👤\s*(\d+(?:\.\d+)?)\s*(k)?").ok());
    if let Some(caps) = emoji.as_ref().and_then(|re| re.captures(title)) {
        let num: f32 = caps
            .get(1)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0.0);
        let multiplier = if caps.get(2).is_some() { 1000.0 } else { 1.0 };
        return (num * multiplier) as u32;
    }

    let text = TEXT.get_or_init(|| Regex::new(r"seeds?:\s*(\d+)").ok());
    let lower = title.to_lowercase();
    text.as_ref()
        .and_then(|re| re.captures(&lower))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Torrentio addon client
pub struct TorrentioClient {
    base_url: String,
    client: reqwest::Client,
}

impl TorrentioClient {
    /// Create a new Torrentio client with default settings
    pub fn new() -> Self {
        Self::with_base_url("https://torrentio.strem.fun")
    }

    /// Create a client with a custom base URL (for testing)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn stream_url(&self, imdb_id: &str, mode: TorrentMode, query: &TorrentQuery) -> Result<String> {
        match mode {
            TorrentMode::Movie => Ok(format!("{}/stream/movie/{}.json", self.base_url, imdb_id)),
            TorrentMode::Show | TorrentMode::SeasonComplete => {
                let season = query.season.context("show query requires a season")?;
                // Season packs are listed under every episode; ask for the first
                let episode = match mode {
                    TorrentMode::SeasonComplete => query.episode.unwrap_or(1),
                    _ => query.episode.context("show query requires an episode")?,
                };
                Ok(format!(
                    "{}/stream/series/{}:{}:{}.json",
                    self.base_url, imdb_id, season, episode
                ))
            }
        }
    }

    /// Fetch and parse streams from a Torrentio URL
    async fn fetch_streams(&self, url: &str) -> Result<Vec<TorrentioStream>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to fetch from Torrentio")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Torrentio returned HTTP {}", status);
        }

        let text = response
            .text()
            .await
            .context("Failed to read response body")?;

        let data: TorrentioResponse =
            serde_json::from_str(&text).context("Failed to parse JSON response")?;
        Ok(data.streams)
    }
}

impl Default for TorrentioClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TorrentProvider for TorrentioClient {
    async fn query(
        &self,
        imdb_id: &str,
        mode: TorrentMode,
        query: &TorrentQuery,
    ) -> Result<QualityMap> {
        let url = self.stream_url(imdb_id, mode, query)?;
        let streams = self.fetch_streams(&url).await?;

        let delivery = match mode {
            TorrentMode::SeasonComplete => DeliveryMethod::SeasonPack,
            _ => DeliveryMethod::Torrent,
        };
        let display_name = if query.search_query.is_empty() {
            imdb_id
        } else {
            query.search_query.as_str()
        };

        let candidates: Vec<TorrentCandidate> = streams
            .into_iter()
            .filter(|s| match mode {
                TorrentMode::Movie => true,
                TorrentMode::Show => !s.is_season_pack(),
                TorrentMode::SeasonComplete => s.is_season_pack(),
            })
            .filter_map(|s| s.into_candidate(display_name, delivery))
            .collect();

        let results = QualityLabel::ALL
            .into_iter()
            .filter_map(|label| {
                let best = merge_and_rank(candidates.iter().filter(|c| c.quality == Some(label)));
                (!best.is_placeholder()).then_some((label, best))
            })
            .collect();

        Ok(results)
    }
}
