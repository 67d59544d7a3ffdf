//! Device output stream
//!
//! cpal streams are not `Send`, so the stream lives on a dedicated thread for
//! as long as the output runs. The render callback is pulled from that thread.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::device::AudioDevice;
use crate::error::EngineError;

/// Callback filling one interleaved block (`out`, channel count)
pub type RenderFn = Arc<dyn Fn(&mut [f32], u16) + Send + Sync + 'static>;

/// Output stream on a dedicated thread
pub struct OutputStream {
    device_name: String,

    /// Whether the stream thread should keep running
    running: Arc<AtomicBool>,

    /// Silence the output without tearing the stream down
    paused: Arc<AtomicBool>,

    thread_handle: Option<JoinHandle<()>>,

    /// Channel for stream errors
    error_rx: Option<Receiver<EngineError>>,

    /// Total frames delivered to the device
    frames_rendered: Arc<AtomicU64>,

    config: StreamConfig,
}

impl OutputStream {
    /// Open the device and start pulling from `render`
    pub fn start(
        device: AudioDevice,
        sample_rate: u32,
        channels: u16,
        render: RenderFn,
    ) -> Result<Self, EngineError> {
        let config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let device_name = device.name.clone();
        let running = Arc::new(AtomicBool::new(true));
        let paused = Arc::new(AtomicBool::new(false));
        let frames_rendered = Arc::new(AtomicU64::new(0));
        let (error_tx, error_rx) = bounded::<EngineError>(16);
        let (ready_tx, ready_rx) = bounded::<Result<(), EngineError>>(1);

        let running_for_loop = running.clone();
        let paused_for_callback = paused.clone();
        let frames_for_callback = frames_rendered.clone();
        let stream_config = config.clone();

        let handle = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let cpal_device = device.into_inner();

                let stream = cpal_device.build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        data.fill(0.0);
                        if paused_for_callback.load(Ordering::Relaxed) {
                            return;
                        }
                        render(data, channels);
                        frames_for_callback
                            .fetch_add((data.len() / channels as usize) as u64, Ordering::Relaxed);
                    },
                    move |err| {
                        let _ = error_tx.try_send(EngineError::StreamError(err.to_string()));
                    },
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(EngineError::StreamError(e.to_string())));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(EngineError::StreamError(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                while running_for_loop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }

                // Stream is dropped here, stopping output
            })
            .map_err(|e| EngineError::StreamError(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(EngineError::StreamError("output thread exited".to_string()));
            }
        }

        tracing::info!(
            "Output stream started on {} ({} Hz, {} ch)",
            device_name,
            sample_rate,
            channels
        );

        Ok(Self {
            device_name,
            running,
            paused,
            thread_handle: Some(handle),
            error_rx: Some(error_rx),
            frames_rendered,
            config,
        })
    }

    /// Stop the stream and join its thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }

    /// Check for errors
    pub fn check_errors(&self) -> Option<EngineError> {
        self.error_rx.as_ref().and_then(|rx| rx.try_recv().ok())
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        self.stop();
    }
}
