//! TMDB (The Movie Database) API client
//!
//! Provides item metadata, season lists and episode listings.
//! API docs: https://developer.themoviedb.org/docs

use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::providers::MetadataProvider;
use crate::models::{Episode, ExternalIds, Item, MediaKind, Season};

/// TMDB API error types
#[derive(Error, Debug)]
pub enum TmdbError {
    #[error("Resource not found (404)")]
    NotFound,

    #[error("Rate limited (429), retries exhausted")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No TMDB API key configured (set TMDB_API_KEY)")]
    MissingApiKey,

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
}

/// TMDB API client
pub struct TmdbClient {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl TmdbClient {
    /// Create a new TMDB client with the given API key
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(api_key, "https://api.themoviedb.org/3")
    }

    /// Create a client with a custom base URL (for testing)
    pub fn with_base_url(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            max_retries: 3,
        }
    }

    /// Make an authenticated GET request with retry logic for rate limits
    async fn get<T: for<'de> Deserialize<'de>>(&self, endpoint: &str) -> Result<T> {
        let api_key = self.api_key.as_deref().ok_or(TmdbError::MissingApiKey)?;
        let url = format!("{}{}", self.base_url, endpoint);
        let mut retries = 0;

        loop {
            let response = self
                .client
                .get(&url)
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Accept", "application/json")
                .send()
                .await?;

            match response.status() {
                StatusCode::OK => {
                    let body = response.text().await?;
                    let parsed: T = serde_json::from_str(&body).map_err(|e| {
                        TmdbError::InvalidResponse(format!("JSON parse error: {}", e))
                    })?;
                    return Ok(parsed);
                }
                StatusCode::NOT_FOUND => {
                    return Err(TmdbError::NotFound.into());
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    retries += 1;
                    if retries >= self.max_retries {
                        return Err(TmdbError::RateLimited.into());
                    }

                    let wait_secs = response
                        .headers()
                        .get("Retry-After")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .unwrap_or(2u64.pow(retries));

                    debug!(endpoint, wait_secs, "TMDB rate limited, retrying");
                    tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                    continue;
                }
                status => {
                    return Err(TmdbError::ServerError(status.as_u16()).into());
                }
            }
        }
    }

    /// Resolve an IMDB id ("tt...") to a TMDB id; numeric ids pass through
    async fn resolve_id(&self, id: &str, kind: MediaKind) -> Result<String> {
        if !id.starts_with("tt") {
            return Ok(id.to_string());
        }

        let endpoint = format!("/find/{}?external_source=imdb_id", id);
        let response: FindResponse = self.get(&endpoint).await?;
        let results = match kind {
            MediaKind::Movie => response.movie_results,
            MediaKind::Show => response.tv_results,
        };
        results
            .first()
            .map(|r| r.id.to_string())
            .ok_or_else(|| TmdbError::NotFound.into())
    }

    /// Get movie or show details
    pub async fn item(&self, id: &str, kind: MediaKind) -> Result<Item> {
        let tmdb_id = self.resolve_id(id, kind).await?;
        let path = match kind {
            MediaKind::Movie => "movie",
            MediaKind::Show => "tv",
        };
        let endpoint = format!("/{}/{}?append_to_response=external_ids,videos", path, tmdb_id);
        let response: ItemResponse = self.get(&endpoint).await?;
        Ok(response.into_item(kind))
    }

    /// Get the seasons of a show, specials excluded
    pub async fn seasons(&self, id: &str) -> Result<Vec<Season>> {
        let tmdb_id = self.resolve_id(id, MediaKind::Show).await?;
        let response: ItemResponse = self.get(&format!("/tv/{}", tmdb_id)).await?;
        Ok(response
            .seasons
            .into_iter()
            .filter(|s| s.season_number > 0)
            .map(SeasonRaw::into_season)
            .collect())
    }

    /// Get episodes for a season
    pub async fn episodes(&self, id: &str, season: u32) -> Result<Vec<Episode>> {
        let tmdb_id = self.resolve_id(id, MediaKind::Show).await?;
        let endpoint = format!("/tv/{}/season/{}", tmdb_id, season);
        let response: SeasonResponse = self.get(&endpoint).await?;
        Ok(response.into_episodes(season))
    }
}

#[async_trait]
impl MetadataProvider for TmdbClient {
    async fn get_item(&self, id: &str, kind: MediaKind) -> Result<Item> {
        self.item(id, kind).await
    }

    async fn get_season_list(&self, id: &str) -> Result<Vec<Season>> {
        self.seasons(id).await
    }

    async fn get_season_episodes(&self, id: &str, season: u32) -> Result<Vec<Episode>> {
        self.episodes(id, season).await
    }
}

// =============================================================================
// Response Structures (internal deserialization)
// =============================================================================

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(default)]
    movie_results: Vec<FindResult>,
    #[serde(default)]
    tv_results: Vec<FindResult>,
}

#[derive(Debug, Deserialize)]
struct FindResult {
    id: u64,
}

/// Movie and TV detail responses share this shape
#[derive(Debug, Deserialize)]
struct ItemResponse {
    id: u64,
    // Movies use "title", TV uses "name"
    title: Option<String>,
    name: Option<String>,
    // Movies use "release_date", TV uses "first_air_date"
    release_date: Option<String>,
    first_air_date: Option<String>,
    runtime: Option<u32>,
    #[serde(default)]
    episode_run_time: Vec<u32>,
    #[serde(default)]
    genres: Vec<GenreRaw>,
    overview: Option<String>,
    vote_average: Option<f32>,
    #[serde(default)]
    seasons: Vec<SeasonRaw>,
    external_ids: Option<ExternalIdsRaw>,
    // Movie details carry imdb_id at the top level as well
    imdb_id: Option<String>,
    videos: Option<VideosRaw>,
}

impl ItemResponse {
    fn into_item(self, kind: MediaKind) -> Item {
        let year = self
            .release_date
            .as_deref()
            .or(self.first_air_date.as_deref())
            .and_then(extract_year);

        let imdb_id = self
            .external_ids
            .and_then(|e| e.imdb_id)
            .or(self.imdb_id)
            .unwrap_or_default();

        let trailer = self.videos.and_then(|v| {
            v.results
                .into_iter()
                .find(|v| v.site == "YouTube" && v.kind == "Trailer")
                .map(|v| format!("https://www.youtube.com/watch?v={}", v.key))
        });

        Item {
            id: self.id.to_string(),
            ids: ExternalIds {
                imdb_id,
                tmdb_id: self.id.to_string(),
            },
            title: self.title.or(self.name).unwrap_or_default(),
            kind,
            year,
            summary: self.overview.unwrap_or_default(),
            genres: self.genres.into_iter().map(|g| g.name).collect(),
            rating: self.vote_average,
            runtime: self.runtime.or(self.episode_run_time.first().copied()),
            trailer,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SeasonResponse {
    episodes: Vec<EpisodeRaw>,
}

impl SeasonResponse {
    fn into_episodes(self, season: u32) -> Vec<Episode> {
        self.episodes
            .into_iter()
            .map(|e| Episode {
                season,
                episode: e.episode_number,
                name: e.name,
                overview: e.overview.unwrap_or_default(),
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct GenreRaw {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SeasonRaw {
    season_number: u32,
    episode_count: u32,
    name: Option<String>,
}

impl SeasonRaw {
    fn into_season(self) -> Season {
        Season {
            number: self.season_number,
            episode_count: self.episode_count,
            name: self.name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EpisodeRaw {
    episode_number: u32,
    name: String,
    overview: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExternalIdsRaw {
    imdb_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideosRaw {
    results: Vec<VideoRaw>,
}

#[derive(Debug, Deserialize)]
struct VideoRaw {
    key: String,
    site: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Extract year from a date string like "2022-03-04"
fn extract_year(date: &str) -> Option<u16> {
    date.get(..4)?.parse().ok()
}
