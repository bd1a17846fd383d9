//! Torrent streaming via webtorrent-cli
//!
//! Each started torrent is one webtorrent subprocess serving the selected
//! file over HTTP. A driver task per torrent forwards download progress and
//! reports once the stream answers requests.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{EngineEvent, EngineRequest, ServingInfo, TorrentEngine, TorrentHandle};
use crate::models::DeliveryMethod;

/// Container formats every backend can play
pub const SUPPORTED_FORMATS: &[&str] = &["mp4", "mkv", "webm", "m4v", "mov", "avi"];

const READY_POLL: Duration = Duration::from_secs(2);

/// webtorrent-cli backed engine
pub struct WebtorrentEngine {
    webtorrent_path: String,
    port: u16,
    host: String,
    ready_timeout: Duration,
    running: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

/// Settings a driver task needs
#[derive(Clone)]
struct DriveConfig {
    webtorrent_path: String,
    port: u16,
    host: String,
    ready_timeout: Duration,
}

impl WebtorrentEngine {
    /// Serve on `port` at the machine's LAN address
    pub fn new(webtorrent_path: impl Into<String>, port: u16) -> Self {
        let host = match local_ip_address::local_ip() {
            Ok(ip) => ip.to_string(),
            Err(e) => {
                warn!(error = %e, "no LAN address, serving on loopback");
                "127.0.0.1".to_string()
            }
        };
        Self {
            webtorrent_path: webtorrent_path.into(),
            port,
            host,
            ready_timeout: Duration::from_secs(60),
            running: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    fn drive_config(&self) -> DriveConfig {
        DriveConfig {
            webtorrent_path: self.webtorrent_path.clone(),
            port: self.port,
            host: self.host.clone(),
            ready_timeout: self.ready_timeout,
        }
    }

    fn spawn_listing(&self, magnet: &str) -> Result<Child> {
        Command::new(&self.webtorrent_path)
            .arg(magnet)
            .arg("--select")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    anyhow::anyhow!(
                        "webtorrent not found. Install with: npm install -g webtorrent-cli"
                    )
                } else {
                    anyhow::anyhow!("Failed to start webtorrent: {}", e)
                }
            })
    }
}

#[async_trait]
impl TorrentEngine for WebtorrentEngine {
    async fn start(&self, request: EngineRequest) -> Result<TorrentHandle> {
        if !request.magnet.starts_with("magnet:?") {
            bail!("Invalid magnet link. Must start with 'magnet:?'");
        }

        // Spawning here surfaces a missing binary to the caller
        let listing = self.spawn_listing(&request.magnet)?;
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(32);
        let config = self.drive_config();

        info!(%id, delivery = ?request.metadata.delivery, "starting torrent");
        let task = tokio::spawn(async move {
            if let Err(e) = drive(config, request, listing, tx).await {
                warn!(%id, error = %e, "torrent stream ended");
            }
        });

        if let Ok(mut running) = self.running.lock() {
            running.insert(id, task);
        }
        Ok(TorrentHandle { id, events: rx })
    }

    async fn destroy(&self, id: Uuid) {
        let task = self.running.lock().ok().and_then(|mut r| r.remove(&id));
        if let Some(task) = task {
            // The subprocess is killed when the aborted task drops it
            task.abort();
            debug!(%id, "torrent destroyed");
        }
    }
}

impl Drop for WebtorrentEngine {
    fn drop(&mut self) {
        if let Ok(running) = self.running.get_mut() {
            for (_, task) in running.drain() {
                task.abort();
            }
        }
    }
}

/// Pick the file, stream it and report progress until aborted
async fn drive(
    config: DriveConfig,
    request: EngineRequest,
    listing: Child,
    tx: mpsc::Sender<EngineEvent>,
) -> Result<()> {
    let files = match tokio::time::timeout(config.ready_timeout, listing.wait_with_output()).await {
        Ok(Ok(output)) => parse_file_list(&String::from_utf8_lossy(&output.stdout)),
        Ok(Err(e)) => {
            warn!(error = %e, "file listing failed");
            Vec::new()
        }
        Err(_) => {
            warn!("file listing timed out");
            Vec::new()
        }
    };
    let (index, file) = pick_file(&files, &request);
    debug!(index, file = file.as_str(), files = files.len(), "selected torrent file");

    let mut child = Command::new(&config.webtorrent_path)
        .arg(&request.magnet)
        .arg("--port")
        .arg(config.port.to_string())
        .arg("-s")
        .arg(index.to_string())
        .arg("--not-on-top")
        .arg("--keep-seeding")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .context("Failed to start webtorrent")?;
    let stdout = child.stdout.take().context("webtorrent stdout unavailable")?;
    let mut lines = BufReader::new(stdout).lines();

    let url = format!("http://{}:{}/{}", config.host, config.port, index);
    let ready = ServingInfo {
        url: url.clone(),
        file,
        files: files.into_iter().map(|(_, name)| name).collect(),
        hash: info_hash(&request.magnet).unwrap_or_default(),
    };
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap_or_default();

    let mut ready = Some(ready);
    let mut poll = tokio::time::interval(READY_POLL);
    let deadline = tokio::time::sleep(config.ready_timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if let Some(fraction) = parse_progress(&line) {
                        let _ = tx.send(EngineEvent::Progress(fraction)).await;
                    }
                }
                None => break,
            },
            _ = poll.tick(), if ready.is_some() => {
                if stream_available(&client, &url).await {
                    if let Some(info) = ready.take() {
                        info!(url = info.url.as_str(), "stream ready");
                        let _ = tx.send(EngineEvent::Ready(info)).await;
                    }
                }
            }
            _ = &mut deadline, if ready.is_some() => {
                // Peers can be slow; the player retries on its own
                if let Some(info) = ready.take() {
                    warn!(url = info.url.as_str(), "stream not answering yet, handing it over anyway");
                    let _ = tx.send(EngineEvent::Ready(info)).await;
                }
            }
        }
    }

    let status = child.wait().await?;
    if ready.is_some() {
        bail!("webtorrent exited with {} before the stream was ready", status);
    }
    Ok(())
}

/// HEAD the serving URL (webtorrent answers 200 or 206 once streaming)
async fn stream_available(client: &reqwest::Client, url: &str) -> bool {
    match client.head(url).send().await {
        Ok(resp) => resp.status().is_success() || resp.status().as_u16() == 206,
        Err(_) => false,
    }
}

/// Parse `webtorrent --select` output into (index, file name) pairs
fn parse_file_list(output: &str) -> Vec<(usize, String)> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = RE
        .get_or_init(|| Regex::new(r"^\s*(\d+)\s+(.+?)(?:\s+\([^)]*\))?\s*$").ok())
        .as_ref()
    else {
        return Vec::new();
    };

    output
        .lines()
        .filter_map(|line| {
            let caps = re.captures(line)?;
            let index = caps.get(1)?.as_str().parse().ok()?;
            Some((index, caps.get(2)?.as_str().to_string()))
        })
        .collect()
}

/// Choose the file to stream: the requested episode inside a season pack,
/// otherwise the first playable file
fn pick_file(files: &[(usize, String)], request: &EngineRequest) -> (usize, String) {
    let playable: Vec<&(usize, String)> = files
        .iter()
        .filter(|(_, name)| has_supported_format(name, &request.supported_formats))
        .collect();

    let episode = match request.metadata.delivery {
        DeliveryMethod::SeasonPack => {
            let meta = &request.metadata;
            Regex::new(&format!(
                r"(?i)S0*{s}[ ._-]?E0*{e}(?:\D|$)|(?:^|\D){s}x0*{e}(?:\D|$)",
                s = meta.season,
                e = meta.episode
            ))
            .ok()
            .and_then(|re| playable.iter().find(|(_, name)| re.is_match(name)).copied())
        }
        DeliveryMethod::Torrent => None,
    };

    episode
        .or_else(|| playable.first().copied())
        .cloned()
        .unwrap_or((0, String::new()))
}

fn has_supported_format(name: &str, formats: &[&str]) -> bool {
    if formats.is_empty() {
        return true;
    }
    name.rsplit_once('.')
        .map(|(_, ext)| formats.iter().any(|f| f.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Download percentage from a webtorrent status line, as a fraction
fn parse_progress(line: &str) -> Option<f32> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%").ok()).as_ref()?;
    let percent: f32 = re.captures(line)?.get(1)?.as_str().parse().ok()?;
    Some((percent / 100.0).clamp(0.0, 1.0))
}

/// Info hash from a magnet URI
fn info_hash(magnet: &str) -> Option<String> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RE
        .get_or_init(|| Regex::new(r"(?i)urn:btih:([0-9a-f]{40}|[a-z2-7]{32})").ok())
        .as_ref()?;
    Some(re.captures(magnet)?.get(1)?.as_str().to_lowercase())
}
