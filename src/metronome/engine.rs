//! Metronome driven by the shared audio clock
//!
//! A fixed-interval poll loop turns elapsed clock time into a beat number and
//! fires one click each time the beat number changes. Settings changes apply on
//! the next poll against the original start time, so the beat counter may jump.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::audio::context::{AudioContext, RenderSource};
use crate::config::MetronomeConfig;
use crate::error::EngineError;
use crate::metronome::click::{ClickBus, ClickKind};
use crate::metronome::settings::{BeatPosition, MetronomeSettings, SettingsUpdate};

const CLICK_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetronomeState {
    #[default]
    Stopped,
    Running,
}

/// Snapshot published after every beat and state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetronomeStatus {
    pub state: MetronomeState,
    /// 1-based beat count since start; 0 when stopped
    pub beat: u64,
    pub bar: u64,
    pub beat_in_bar: u32,
    /// Current bar lies inside the count-in
    pub counting_in: bool,
    /// Count-in beats left, the current one included
    pub count_in_beats_left: u64,
}

/// One fired click
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Click {
    pub kind: ClickKind,
    pub beat: u64,
    pub bar: u64,
    /// Clock time the click was triggered at; the bus starts it no earlier
    /// than the next render block
    pub at: f64,
}

struct MetronomeInner {
    state: MetronomeState,
    settings: MetronomeSettings,
    start_time: f64,
    last_beat: u64,
    ticker: Option<JoinHandle<()>>,
}

impl Drop for MetronomeInner {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

/// Tempo and click generator
#[derive(Clone)]
pub struct Metronome {
    context: Arc<AudioContext>,
    bus: Arc<ClickBus>,
    config: MetronomeConfig,
    inner: Arc<Mutex<MetronomeInner>>,
    status_tx: Arc<watch::Sender<MetronomeStatus>>,
    clicks_tx: broadcast::Sender<Click>,
}

impl Metronome {
    /// Create a metronome and route its click bus into `context`
    pub fn new(context: Arc<AudioContext>, config: MetronomeConfig) -> Self {
        let bus = Arc::new(ClickBus::new(config.master_gain));
        context.connect(bus.clone() as Arc<dyn RenderSource>);

        let (status_tx, _) = watch::channel(MetronomeStatus::default());
        let (clicks_tx, _) = broadcast::channel(CLICK_CHANNEL_CAPACITY);

        Self {
            context,
            bus,
            inner: Arc::new(Mutex::new(MetronomeInner {
                state: MetronomeState::Stopped,
                settings: config.settings,
                start_time: 0.0,
                last_beat: 0,
                ticker: None,
            })),
            config,
            status_tx: Arc::new(status_tx),
            clicks_tx,
        }
    }

    /// Start counting from beat 1 at the current clock time
    ///
    /// Does nothing if already running. Must be called from within a tokio
    /// runtime.
    pub fn start(&self) -> Result<(), EngineError> {
        self.context.ensure_running()?;

        let start_time = {
            let mut inner = self.inner.lock();
            if inner.state == MetronomeState::Running {
                return Ok(());
            }
            inner.state = MetronomeState::Running;
            inner.start_time = self.context.now();
            inner.last_beat = 0;
            inner.start_time
        };

        let ticker = self.spawn_ticker(start_time);
        self.inner.lock().ticker = Some(ticker);

        tracing::info!(
            "Metronome started at {} BPM",
            self.inner.lock().settings.bpm
        );
        Ok(())
    }

    /// Stop and reset the beat counter
    pub fn stop(&self) {
        {
            let mut inner = self.inner.lock();
            if let Some(ticker) = inner.ticker.take() {
                ticker.abort();
            }
            if inner.state == MetronomeState::Stopped {
                return;
            }
            inner.state = MetronomeState::Stopped;
            inner.last_beat = 0;
        }
        self.bus.clear();
        self.status_tx.send_replace(MetronomeStatus::default());
        tracing::info!("Metronome stopped");
    }

    /// Poll the clock once, sounding a click if a new beat was reached
    pub fn tick(&self) -> Option<Click> {
        let now = self.context.now();
        let (click, status) = {
            let mut inner = self.inner.lock();
            if inner.state != MetronomeState::Running {
                return None;
            }
            let position = BeatPosition::at(now - inner.start_time, &inner.settings);
            if position.beat == inner.last_beat {
                return None;
            }
            inner.last_beat = position.beat;

            let click = Click {
                kind: ClickKind::for_beat_in_bar(position.beat_in_bar),
                beat: position.beat,
                bar: position.bar,
                at: now,
            };
            (click, running_status(position, &inner.settings))
        };

        self.bus.trigger(click.kind, click.at);
        self.status_tx.send_replace(status);
        // No subscribers is fine
        let _ = self.clicks_tx.send(click);

        tracing::trace!("Beat {} (bar {}) {:?}", click.beat, click.bar, click.kind);
        Some(click)
    }

    /// Change tempo, meter or count-in; a running metronome picks it up on the
    /// next poll
    pub fn update_settings(&self, update: SettingsUpdate) -> MetronomeSettings {
        let settings = {
            let mut inner = self.inner.lock();
            inner.settings.apply(update);
            inner.settings
        };
        tracing::debug!(
            "Metronome settings: {} BPM, {}/{}, count-in {}",
            settings.bpm,
            settings.time_signature.beats_per_bar,
            settings.time_signature.beat_unit,
            settings.count_in
        );
        settings
    }

    pub fn settings(&self) -> MetronomeSettings {
        self.inner.lock().settings
    }

    pub fn state(&self) -> MetronomeState {
        self.inner.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == MetronomeState::Running
    }

    pub fn status(&self) -> MetronomeStatus {
        *self.status_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<MetronomeStatus> {
        self.status_tx.subscribe()
    }

    /// Stream of fired clicks
    pub fn clicks(&self) -> broadcast::Receiver<Click> {
        self.clicks_tx.subscribe()
    }

    pub fn bus(&self) -> &Arc<ClickBus> {
        &self.bus
    }

    /// Stop and detach from the audio context
    pub fn close(&self) {
        self.stop();
        let bus: Arc<dyn RenderSource> = self.bus.clone();
        self.context.disconnect(&bus);
    }

    fn spawn_ticker(&self, start_time: f64) -> JoinHandle<()> {
        let handle = WeakMetronome::from(self);
        let period = self.config.poll_interval();
        let mut ticker = self.context.clock().interval_from(start_time, period);

        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                match handle.upgrade() {
                    Some(metronome) => {
                        metronome.tick();
                    }
                    None => break,
                }
            }
        })
    }
}

/// Poll-loop handle that does not keep the metronome alive
struct WeakMetronome {
    context: Arc<AudioContext>,
    bus: Arc<ClickBus>,
    config: MetronomeConfig,
    inner: Weak<Mutex<MetronomeInner>>,
    status_tx: Arc<watch::Sender<MetronomeStatus>>,
    clicks_tx: broadcast::Sender<Click>,
}

impl WeakMetronome {
    fn from(metronome: &Metronome) -> Self {
        Self {
            context: metronome.context.clone(),
            bus: metronome.bus.clone(),
            config: metronome.config.clone(),
            inner: Arc::downgrade(&metronome.inner),
            status_tx: metronome.status_tx.clone(),
            clicks_tx: metronome.clicks_tx.clone(),
        }
    }

    fn upgrade(&self) -> Option<Metronome> {
        Some(Metronome {
            context: self.context.clone(),
            bus: self.bus.clone(),
            config: self.config.clone(),
            inner: self.inner.upgrade()?,
            status_tx: self.status_tx.clone(),
            clicks_tx: self.clicks_tx.clone(),
        })
    }
}

fn running_status(position: BeatPosition, settings: &MetronomeSettings) -> MetronomeStatus {
    let count_in_beats = settings.count_in_beats();
    MetronomeStatus {
        state: MetronomeState::Running,
        beat: position.beat,
        bar: position.bar,
        beat_in_bar: position.beat_in_bar,
        counting_in: position.bar <= settings.count_in as u64,
        count_in_beats_left: (count_in_beats + 1).saturating_sub(position.beat),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metronome::settings::TimeSignature;
    use std::time::Duration;

    fn metronome(bpm: u32, count_in: u32) -> Metronome {
        let context = AudioContext::offline(8_000, 1);
        let mut config = MetronomeConfig::default();
        config.settings.bpm = bpm;
        config.settings.count_in = count_in;
        Metronome::new(context, config)
    }

    fn drain(rx: &mut broadcast::Receiver<Click>) -> Vec<Click> {
        let mut clicks = Vec::new();
        while let Ok(click) = rx.try_recv() {
            clicks.push(click);
        }
        clicks
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_click_per_beat_with_downbeats() {
        let metronome = metronome(120, 0);
        let mut rx = metronome.clicks();

        metronome.start().unwrap();
        tokio::time::sleep(Duration::from_millis(2100)).await;

        let clicks = drain(&mut rx);
        let beats: Vec<u64> = clicks.iter().map(|c| c.beat).collect();
        assert_eq!(beats, vec![1, 2, 3, 4, 5]);

        let kinds: Vec<ClickKind> = clicks.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ClickKind::Downbeat,
                ClickKind::Beat,
                ClickKind::Beat,
                ClickKind::Beat,
                ClickKind::Downbeat,
            ]
        );
        assert_eq!(clicks[4].bar, 2);

        // Beats land every half second within one poll interval
        for (n, click) in clicks.iter().enumerate() {
            let expected = clicks[0].at + n as f64 * 0.5;
            assert!((click.at - expected).abs() <= 0.02, "beat {} at {}", n + 1, click.at);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tempo_change_applies_against_original_start() {
        let metronome = metronome(120, 0);
        let mut rx = metronome.clicks();

        metronome.start().unwrap();
        tokio::time::sleep(Duration::from_millis(1600)).await;
        metronome.update_settings(SettingsUpdate::bpm(60));
        tokio::time::sleep(Duration::from_millis(450)).await;

        let beats: Vec<u64> = drain(&mut rx).iter().map(|c| c.beat).collect();
        assert_eq!(beats, vec![1, 2, 3, 4, 2, 3]);
        assert_eq!(metronome.settings().bpm, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_meter_change_recounts_bars() {
        let metronome = metronome(120, 0);
        let mut rx = metronome.clicks();

        metronome.start().unwrap();
        // Beat 3 of the first 4/4 bar
        tokio::time::sleep(Duration::from_millis(1100)).await;
        metronome.update_settings(SettingsUpdate::time_signature(3, 4));
        tokio::time::sleep(Duration::from_millis(1000)).await;

        let clicks = drain(&mut rx);
        let beats: Vec<(u64, u64, ClickKind)> =
            clicks.iter().map(|c| (c.beat, c.bar, c.kind)).collect();
        assert_eq!(
            beats,
            vec![
                (1, 1, ClickKind::Downbeat),
                (2, 1, ClickKind::Beat),
                (3, 1, ClickKind::Beat),
                (4, 2, ClickKind::Downbeat),
                (5, 2, ClickKind::Beat),
            ]
        );

        let status = metronome.status();
        assert_eq!(status.beat, 5);
        assert_eq!(status.bar, 2);
        assert_eq!(status.beat_in_bar, 2);
        assert_eq!(metronome.settings().time_signature, TimeSignature::new(3, 4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_metronome_ends_poll_loop() {
        let metronome = metronome(120, 0);
        let status = metronome.subscribe();
        metronome.start().unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(status.has_changed().is_ok());

        drop(metronome);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(status.has_changed().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_count_in_status() {
        let metronome = metronome(120, 1);
        let mut status = metronome.subscribe();

        metronome.start().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let first = *status.borrow_and_update();
        assert_eq!(first.beat, 1);
        assert!(first.counting_in);
        assert_eq!(first.count_in_beats_left, 4);

        tokio::time::sleep(Duration::from_millis(2100)).await;
        let after = metronome.status();
        assert_eq!(after.bar, 2);
        assert!(!after.counting_in);
        assert_eq!(after.count_in_beats_left, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_resets_counter() {
        let metronome = metronome(120, 0);
        metronome.start().unwrap();
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert!(metronome.is_running());
        assert_eq!(metronome.status().beat, 3);

        metronome.stop();
        assert_eq!(metronome.state(), MetronomeState::Stopped);
        assert_eq!(metronome.status(), MetronomeStatus::default());
        assert_eq!(metronome.bus().active(), 0);
        assert!(metronome.tick().is_none());

        // Restart counts from 1 again
        let mut rx = metronome.clicks();
        metronome.start().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(drain(&mut rx)[0].beat, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_on_closed_context_fails() {
        let metronome = metronome(120, 0);
        metronome.context.close();
        assert_eq!(metronome.start(), Err(EngineError::Closed));
        assert!(!metronome.is_running());
    }
}
