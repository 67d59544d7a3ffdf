//! Click Track
//!
//! Runs the metronome on the default output device until Ctrl-C.
//!
//! Usage: `click [bpm] [beats-per-bar]`

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use multitake::{
    audio::AudioContext,
    config::EngineConfig,
    metronome::{Metronome, SettingsUpdate, TimeSignature},
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

    let config = EngineConfig::load_or_default();

    let mut args = std::env::args().skip(1);
    let bpm = match args.next() {
        Some(arg) => arg.parse::<u32>().context("bpm must be a whole number")?,
        None => config.metronome.settings.bpm,
    };
    let beats_per_bar = match args.next() {
        Some(arg) => arg.parse::<u32>().context("beats per bar must be a whole number")?,
        None => config.metronome.settings.time_signature.beats_per_bar,
    };

    let context = AudioContext::open(&config.audio)?;
    let metronome = Metronome::new(context.clone(), config.metronome.clone());
    metronome.update_settings(SettingsUpdate {
        bpm: Some(bpm),
        time_signature: Some(TimeSignature::new(beats_per_bar, 4)),
        count_in: None,
    });
    metronome.start()?;

    let mut clicks = metronome.clicks();
    loop {
        tokio::select! {
            click = clicks.recv() => match click {
                Ok(click) => {
                    let status = metronome.status();
                    let marker = if status.counting_in { " (count-in)" } else { "" };
                    println!("bar {:>3}  beat {}{}", click.bar, status.beat_in_bar, marker);
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Missed {} clicks", n);
                }
                Err(_) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    metronome.close();
    context.close();
    Ok(())
}
