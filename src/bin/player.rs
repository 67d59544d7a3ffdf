//! Take Player
//!
//! Plays a JSON track list through the default output device.
//!
//! Usage: `player <tracks.json> [takes-dir]`. Without a directory the takes
//! are fetched from the storage API.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use multitake::{
    audio::{device::list_output_devices, AudioContext},
    config::EngineConfig,
    loader::{BufferCache, FileFetcher, TrackFetcher},
    tracks::Track,
    transport::{TransportController, TransportState},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting take player");

    let mut args = std::env::args().skip(1);
    let tracks_path = PathBuf::from(args.next().context("usage: player <tracks.json> [takes-dir]")?);
    let takes_dir = args.next().map(PathBuf::from);

    let config = EngineConfig::load_or_default();

    // List available output devices
    println!("\n=== Available Output Devices ===");
    for device in list_output_devices() {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}:", device.name, default_marker);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();

    let text = std::fs::read_to_string(&tracks_path)
        .with_context(|| format!("reading {}", tracks_path.display()))?;
    let tracks: Vec<Track> = serde_json::from_str(&text).context("parsing track list")?;

    let fetcher: Arc<dyn TrackFetcher> = match takes_dir {
        Some(dir) => {
            tracing::info!("Reading takes from {}", dir.display());
            Arc::new(FileFetcher::new(dir))
        }
        None => http_fetcher(&config)?,
    };

    let context = AudioContext::open(&config.audio)?;
    tracing::info!(
        "Output: {} @ {} Hz",
        context.device_name().unwrap_or("offline"),
        context.sample_rate()
    );

    let cache = Arc::new(BufferCache::new(fetcher));
    let transport = TransportController::new(context.clone(), cache, config.transport.clone());

    let report = transport.play(tracks).await?;
    for failure in &report.failed {
        tracing::warn!("{}", failure);
    }
    if report.started.is_empty() {
        tracing::warn!("Nothing to play");
        context.close();
        return Ok(());
    }

    let mut status = transport.subscribe();
    let mut last_second = u64::MAX;
    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                if current.state != TransportState::Playing {
                    continue;
                }
                let second = current.current_time as u64;
                if second != last_second {
                    last_second = second;
                    tracing::info!("{:.1}s / {:.1}s", current.current_time, current.duration);
                }
                if current.current_time >= current.duration {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    transport.close();
    context.close();
    Ok(())
}

#[cfg(feature = "http")]
fn http_fetcher(config: &EngineConfig) -> Result<Arc<dyn TrackFetcher>> {
    use multitake::loader::HttpFetcher;

    tracing::info!("Fetching takes from {}", config.storage.api_url);
    let fetcher = HttpFetcher::from_config(&config.storage)
        .map_err(|e| anyhow::anyhow!("HTTP client: {:?}", e))?;
    Ok(Arc::new(fetcher))
}

#[cfg(not(feature = "http"))]
fn http_fetcher(_config: &EngineConfig) -> Result<Arc<dyn TrackFetcher>> {
    anyhow::bail!("built without the `http` feature; pass a takes directory")
}
