//! Audio playback of agent speech
//!
//! [`PlaybackSink`] tracks at most one render at a time. Starting a new render
//! or stopping cancels the previous one, and a finished render reports back to
//! the controller tagged with its playback id.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use tokio::task::JoinHandle;

use super::decode::{PLAYBACK_SAMPLE_RATE, decode_payload};
use crate::conversation::{EventKind, EventSink};
use crate::{Error, Result};

/// How a render ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Failed(String),
}

/// Renders one opaque audio payload to completion
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Render `payload`, resolving when playback completes
    ///
    /// Cancellation drops the returned future.
    ///
    /// # Errors
    ///
    /// Returns error if the payload cannot be decoded or rendered
    async fn render(&self, payload: Vec<u8>) -> Result<()>;
}

/// Single-slot playback driver
pub struct PlaybackSink {
    sink: Arc<dyn AudioSink>,
    current: Option<(u64, JoinHandle<()>)>,
    next_id: u64,
}

impl PlaybackSink {
    #[must_use]
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self {
            sink,
            current: None,
            next_id: 0,
        }
    }

    /// Start rendering `payload`, replacing any render in progress
    ///
    /// Returns the playback id the completion event will carry.
    pub fn play(&mut self, payload: Vec<u8>, events: &EventSink) -> u64 {
        self.stop();

        self.next_id += 1;
        let id = self.next_id;
        let sink = Arc::clone(&self.sink);
        let events = events.clone();

        tracing::debug!(playback = id, bytes = payload.len(), "playback started");

        let task = tokio::spawn(async move {
            let outcome = match sink.render(payload).await {
                Ok(()) => PlaybackOutcome::Completed,
                Err(e) => PlaybackOutcome::Failed(e.to_string()),
            };
            events.post(EventKind::PlaybackFinished {
                playback: id,
                outcome,
            });
        });

        self.current = Some((id, task));
        id
    }

    /// Cancel the render in progress, if any
    pub fn stop(&mut self) {
        if let Some((id, task)) = self.current.take() {
            task.abort();
            tracing::debug!(playback = id, "playback stopped");
        }
    }

    /// Mark render `id` as finished
    ///
    /// Returns false if `id` is not the current render.
    pub fn finish(&mut self, id: u64) -> bool {
        match &self.current {
            Some((current, _)) if *current == id => {
                self.current = None;
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.current.is_some()
    }
}

impl Drop for PlaybackSink {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Plays audio to the default output device
pub struct CpalSink {
    config: StreamConfig,
}

impl CpalSink {
    /// Open the default output device
    ///
    /// # Errors
    ///
    /// Returns error if no suitable output device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let rate = SampleRate(PLAYBACK_SAMPLE_RATE);
        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| c.channels() == 1 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config.with_sample_rate(rate).config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { config })
    }
}

#[async_trait]
impl AudioSink for CpalSink {
    async fn render(&self, payload: Vec<u8>) -> Result<()> {
        let config = self.config.clone();
        let cancel = CancelOnDrop::new();
        let flag = cancel.flag();

        tokio::task::spawn_blocking(move || {
            let samples = decode_payload(&payload, PLAYBACK_SAMPLE_RATE)?;
            play_samples_blocking(&config, &samples, &flag)
        })
        .await
        .map_err(|e| Error::Playback(e.to_string()))?
    }
}

/// Discards audio; used when playback is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

#[async_trait]
impl AudioSink for NullSink {
    async fn render(&self, payload: Vec<u8>) -> Result<()> {
        tracing::debug!(bytes = payload.len(), "audio disabled, payload discarded");
        Ok(())
    }
}

/// Raises a shared flag when the owning future is dropped
struct CancelOnDrop(Arc<AtomicBool>);

impl CancelOnDrop {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Play samples on the current thread until done or cancelled
fn play_samples_blocking(
    config: &StreamConfig,
    samples: &[f32],
    cancel: &AtomicBool,
) -> Result<()> {
    if samples.is_empty() {
        return Ok(());
    }

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device".to_string()))?;

    let channels = usize::from(config.channels);
    let sample_rate = config.sample_rate.0;

    let shared: Arc<[f32]> = Arc::from(samples);
    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));

    let stream = {
        let shared = Arc::clone(&shared);
        let position = Arc::clone(&position);
        let finished = Arc::clone(&finished);

        device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = position.load(Ordering::Relaxed);

                    for frame in data.chunks_mut(channels) {
                        let sample = shared.get(pos).copied().unwrap_or_else(|| {
                            finished.store(true, Ordering::Release);
                            0.0
                        });
                        frame.fill(sample);
                        pos = (pos + 1).min(shared.len());
                    }

                    position.store(pos, Ordering::Relaxed);
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?
    };

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    let duration_ms = (shared.len() as u64 * 1000) / u64::from(sample_rate.max(1));
    let start = Instant::now();
    let timeout = Duration::from_millis(duration_ms + 500);

    while !finished.load(Ordering::Acquire) {
        if cancel.load(Ordering::Acquire) {
            tracing::debug!("playback cancelled");
            return Ok(());
        }
        if start.elapsed() > timeout {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    // Small delay to ensure audio finishes
    std::thread::sleep(Duration::from_millis(100));

    drop(stream);
    tracing::debug!(samples = shared.len(), "playback complete");

    Ok(())
}
