//! CLI Command Handlers
//!
//! Each handler wires the session controller from config, runs one
//! operation and returns an ExitCode.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use reelcast::api::{SubtitleProvider, SubtitleRequest, TmdbClient, TorrentioClient};
use reelcast::config::Config;
use reelcast::history::JsonHistoryStore;
use reelcast::models::{
    CaptionTrack, CastingDevice, Item, MediaKind, QualityLabel, ShowSelection, TorrentCandidate,
};
use reelcast::session::{
    Providers, SessionController, SessionOptions, SessionPhase, ShowScope, StartOutcome,
};
use reelcast::stream::{
    BackendSet, CastBackend, CastManager, CastingDeviceMonitor, ExternalPlayerBackend,
    HtmlVideoBackend, PlaybackBackendAdapter, SubtitleClient, SubtitleServer,
    SubtitleTrackResolver, WebtorrentEngine,
};

use crate::cli::{DevicesCmd, ExitCode, Output, PlayCmd, Selection, SourcesCmd, SubtitlesCmd};

// =============================================================================
// Wiring
// =============================================================================

/// Build a controller with the concrete adapters
async fn build_controller(
    config: &Config,
    season_complete: bool,
) -> Result<(SessionController, SubtitleServer)> {
    let subtitle_dir = Config::subtitle_dir();
    tokio::fs::create_dir_all(&subtitle_dir).await?;
    let server = SubtitleServer::bind(subtitle_dir.clone(), config.subtitle_port()).await?;
    let host = local_ip_address::local_ip()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|_| "127.0.0.1".to_string());

    let resolver = SubtitleTrackResolver::new(
        Arc::new(SubtitleClient::new()),
        config.subtitle_language(),
        config.subtitle_languages(),
        subtitle_dir,
        format!("http://{}:{}", host, server.port()),
    );

    let cast = Arc::new(CastManager::with_path(config.catt_path()));
    let adapter = PlaybackBackendAdapter::new(
        BackendSet {
            default: Box::new(HtmlVideoBackend::new("default")),
            plyr: Box::new(HtmlVideoBackend::new("plyr")),
            external: Box::new(ExternalPlayerBackend::new(config.local_player())),
            chromecast: Box::new(CastBackend::new(Arc::clone(&cast))),
            youtube: Box::new(HtmlVideoBackend::new("youtube")),
        },
        config.backend_start_delay(),
    );
    let monitor = CastingDeviceMonitor::new(cast, config.device_poll_interval());

    let providers = Providers {
        metadata: Arc::new(TmdbClient::new(config.tmdb_api_key.clone())),
        torrents: Arc::new(TorrentioClient::new()),
        engine: Arc::new(WebtorrentEngine::new(
            config.webtorrent_path(),
            config.stream_port(),
        )),
        history: Arc::new(JsonHistoryStore::open_default()?),
    };

    let mut options = SessionOptions::from(config);
    options.season_complete |= season_complete;

    let controller = SessionController::new(providers, resolver, adapter, monitor, options);
    Ok((controller, server))
}

/// Select the item (and episode) and wait for its sources
async fn select(
    controller: &mut SessionController,
    selection: &Selection,
    output: &Output,
) -> Result<(), ExitCode> {
    output.info(format!("Loading {}...", selection.id));
    if let Err(e) = controller
        .select_item_named(&selection.id, &selection.media_type)
        .await
    {
        return Err(output.error(e.to_string(), ExitCode::InvalidArgs));
    }
    controller.settle().await;

    if controller.item().is_none() {
        return Err(output.error(
            format!("Could not load metadata for {}", selection.id),
            ExitCode::NetworkError,
        ));
    }

    if selection.has_scope() {
        let scope = if selection.episode.is_some() {
            ShowScope::Episode
        } else {
            ShowScope::Episodes
        };
        if let Err(e) = controller
            .select_show_scope(scope, selection.season, selection.episode)
            .await
        {
            return Err(output.error(e.to_string(), ExitCode::InvalidArgs));
        }
        controller.settle().await;
    }

    for notice in controller.take_notices() {
        output.info(format!("Warning: {}", notice));
    }
    Ok(())
}

// =============================================================================
// Sources Command
// =============================================================================

#[derive(Serialize)]
struct SourcesReport<'a> {
    item: &'a Item,
    #[serde(skip_serializing_if = "Option::is_none")]
    selection: Option<ShowSelection>,
    sources: Vec<SourceRow<'a>>,
    ideal: &'a TorrentCandidate,
    captions: &'a [CaptionTrack],
}

#[derive(Serialize)]
struct SourceRow<'a> {
    label: QualityLabel,
    #[serde(flatten)]
    candidate: &'a TorrentCandidate,
}

pub async fn sources_cmd(cmd: SourcesCmd, config: &Config, output: &Output) -> ExitCode {
    let (mut controller, server) =
        match build_controller(config, cmd.selection.season_complete).await {
            Ok(wired) => wired,
            Err(e) => return output.error(format!("Startup failed: {}", e), ExitCode::Error),
        };

    let code = match select(&mut controller, &cmd.selection, output).await {
        Ok(()) => print_sources(&controller, output),
        Err(code) => code,
    };

    controller.shutdown().await;
    server.shutdown().await;
    code
}

fn print_sources(controller: &SessionController, output: &Output) -> ExitCode {
    let Some(item) = controller.item() else {
        return output.error("No item loaded", ExitCode::Error);
    };
    let torrents = controller.torrents();
    if torrents.is_empty() {
        return output.error("No sources found", ExitCode::NoStreams);
    }

    let report = SourcesReport {
        item,
        selection: (item.kind == MediaKind::Show).then(|| controller.selection()),
        sources: torrents
            .iter()
            .map(|(label, candidate)| SourceRow { label, candidate })
            .collect(),
        ideal: &torrents.ideal,
        captions: controller.captions(),
    };
    if let Err(e) = output.print(&report) {
        return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
    }
    ExitCode::Success
}

// =============================================================================
// Play Command
// =============================================================================

pub async fn play_cmd(
    cmd: PlayCmd,
    device: Option<&str>,
    config: &Config,
    output: &Output,
) -> ExitCode {
    let quality = match cmd.quality.as_deref().map(str::parse::<QualityLabel>) {
        None => None,
        Some(Ok(label)) => Some(label),
        Some(Err(e)) => return output.error(e.to_string(), ExitCode::InvalidArgs),
    };

    let (mut controller, server) =
        match build_controller(config, cmd.selection.season_complete).await {
            Ok(wired) => wired,
            Err(e) => return output.error(format!("Startup failed: {}", e), ExitCode::Error),
        };
    controller.begin();

    let code = play(&mut controller, &cmd, quality, device, output).await;

    controller.shutdown().await;
    server.shutdown().await;
    code
}

async fn play(
    controller: &mut SessionController,
    cmd: &PlayCmd,
    quality: Option<QualityLabel>,
    device: Option<&str>,
    output: &Output,
) -> ExitCode {
    if !controller.select_player_named(&cmd.player, device).await {
        return output.error(
            format!("Unknown player '{}'", cmd.player),
            ExitCode::InvalidArgs,
        );
    }
    if let Err(code) = select(controller, &cmd.selection, output).await {
        return code;
    }
    if quality.is_some() && !controller.options().manual_quality_selection {
        output.info("Note: manual quality selection is disabled in config; using it anyway");
    }

    match controller.start_playback(quality).await {
        StartOutcome::Started => {}
        StartOutcome::NoSource => {
            return output.error("No playable source for this selection", ExitCode::NoStreams)
        }
        StartOutcome::EngineFailed => {
            return output.error("Torrent engine failed to start", ExitCode::PlaybackFailed)
        }
    }

    output.info("Connecting to peers...");
    controller.settle().await;
    if controller.phase() != SessionPhase::Serving {
        return output.error("Stream never became ready", ExitCode::PlaybackFailed);
    }

    if let Some(url) = controller.playback().serving_url.clone() {
        output.info(format!("Streaming at {} (Ctrl-C to stop)", url));
    }

    // Keep applying progress until interrupted
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            applied = controller.next_event() => {
                if applied.is_none() || !controller.playback().in_progress {
                    break;
                }
            }
        }
    }
    output.info(format!(
        "Stopping at {} downloaded",
        controller.playback().format_progress()
    ));
    controller.stop_playback().await;
    ExitCode::Success
}

// =============================================================================
// Subtitles Command
// =============================================================================

#[derive(Serialize)]
struct SubtitleFile {
    language: String,
    path: String,
}

pub async fn subtitles_cmd(cmd: SubtitlesCmd, config: &Config, output: &Output) -> ExitCode {
    let dir = Config::subtitle_dir();
    let request = SubtitleRequest {
        path: dir.clone(),
        languages: cmd.languages().unwrap_or_else(|| config.subtitle_languages()),
    };

    output.info(format!("Fetching subtitles for: {}", cmd.imdb_id));
    match SubtitleClient::new().fetch(&cmd.external_id(), &request).await {
        Ok(found) if found.is_empty() => {
            output.error("No subtitles found", ExitCode::NoStreams)
        }
        Ok(found) => {
            let files: Vec<SubtitleFile> = found
                .into_iter()
                .map(|d| SubtitleFile {
                    path: dir.join(&d.file_name).display().to_string(),
                    language: d.language_code,
                })
                .collect();
            if let Err(e) = output.print(&files) {
                return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
            }
            ExitCode::Success
        }
        Err(e) => output.error(
            format!("Subtitle fetch failed: {}", e),
            ExitCode::NetworkError,
        ),
    }
}

// =============================================================================
// Devices Command
// =============================================================================

pub async fn devices_cmd(_cmd: DevicesCmd, config: &Config, output: &Output) -> ExitCode {
    output.info("Scanning for Chromecast devices...");

    let manager = CastManager::with_path(config.catt_path());
    match manager.discover().await {
        Ok(devices) if devices.is_empty() => {
            output.error("No Chromecast devices found", ExitCode::DeviceNotFound)
        }
        Ok(devices) => print_devices(&devices, output),
        Err(e) => output.error(
            format!("Device scan failed: {} (install with: pip install catt)", e),
            ExitCode::Error,
        ),
    }
}

fn print_devices(devices: &[CastingDevice], output: &Output) -> ExitCode {
    if let Err(e) = output.print(devices) {
        return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
    }
    ExitCode::Success
}
