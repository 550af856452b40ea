//! Playback of inbound audio payloads: strictly ordered, gapless, and
//! interruptible.
//!
//! Scheduling works in output-frame units against a live device clock.
//! Each decoded payload is placed at `max(next_start, clock)` so payloads
//! never overlap previously scheduled audio and never leave dead air once
//! the cursor falls behind the clock. Barge-in clears everything at once.

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use crate::session::SessionSignals;

use super::codec::{self, PLAYBACK_SAMPLE_RATE};

/// One decoded payload placed on the output timeline.
struct ScheduledBuffer {
    start: u64,
    samples: Vec<f32>,
}

impl ScheduledBuffer {
    fn end(&self) -> u64 {
        self.start + self.samples.len() as u64
    }
}

/// Pure scheduling state: a monotonic cursor plus the set of buffers that
/// are scheduled or still sounding. Frame units at the output device rate.
pub struct PlaybackQueue {
    next_start: u64,
    sources: Vec<ScheduledBuffer>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self {
            next_start: 0,
            sources: Vec::new(),
        }
    }

    /// Schedule a buffer at `max(next_start, now)` and advance the cursor
    /// past it. Returns the chosen start frame.
    pub fn schedule(&mut self, samples: Vec<f32>, now: u64) -> u64 {
        let start = self.next_start.max(now);
        self.next_start = start + samples.len() as u64;
        self.sources.push(ScheduledBuffer { start, samples });
        start
    }

    /// Barge-in: drop every scheduled buffer and reset the cursor.
    pub fn interrupt(&mut self) {
        self.sources.clear();
        self.next_start = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn next_start(&self) -> u64 {
        self.next_start
    }

    /// Fill `out` with the frames covering positions `now..now + out.len()`,
    /// silence where nothing is scheduled, and retire buffers that finished
    /// before the end of this block.
    pub fn render(&mut self, now: u64, out: &mut [f32]) {
        for (i, slot) in out.iter_mut().enumerate() {
            let pos = now + i as u64;
            *slot = 0.0;
            // Scheduling guarantees at most one buffer covers any frame.
            for source in &self.sources {
                if pos >= source.start && pos < source.end() {
                    *slot = source.samples[(pos - source.start) as usize];
                    break;
                }
            }
        }
        let block_end = now + out.len() as u64;
        self.sources.retain(|s| s.end() > block_end);
    }
}

impl Default for PlaybackQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the output stream, the frame clock it advances, and the shared
/// queue. Lives on the session worker thread for one session.
pub struct PlaybackPipeline {
    queue: Arc<Mutex<PlaybackQueue>>,
    clock: Arc<AtomicU64>,
    sample_rate: u32,
    signals: Arc<SessionSignals>,
    _stream: cpal::Stream,
}

impl PlaybackPipeline {
    /// Open the default output device and start rendering from the queue.
    pub fn open(signals: Arc<SessionSignals>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow!("no output device available"))?;
        let config = device.default_output_config()?;

        let sample_rate = config.sample_rate();
        let channels = config.channels() as usize;

        let queue: Arc<Mutex<PlaybackQueue>> = Arc::new(Mutex::new(PlaybackQueue::new()));
        let clock = Arc::new(AtomicU64::new(0));

        let cb_queue = queue.clone();
        let cb_clock = clock.clone();
        let cb_signals = signals.clone();
        let err_fn = |err| eprintln!("[Playback] stream error: {}", err);

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => device.build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &_| {
                    let frames = data.len() / channels;
                    let now = cb_clock.load(Ordering::Relaxed);
                    let mut mono = vec![0.0f32; frames];
                    let drained = if let Ok(mut q) = cb_queue.lock() {
                        q.render(now, &mut mono);
                        q.is_empty()
                    } else {
                        true
                    };
                    for (chunk, &sample) in data.chunks_mut(channels).zip(&mono) {
                        for slot in chunk {
                            *slot = sample;
                        }
                    }
                    cb_clock.fetch_add(frames as u64, Ordering::Relaxed);
                    if drained {
                        cb_signals.set_speaking(false);
                    }
                },
                err_fn,
                None,
            )?,
            cpal::SampleFormat::I16 => device.build_output_stream(
                &config.into(),
                move |data: &mut [i16], _: &_| {
                    let frames = data.len() / channels;
                    let now = cb_clock.load(Ordering::Relaxed);
                    let mut mono = vec![0.0f32; frames];
                    let drained = if let Ok(mut q) = cb_queue.lock() {
                        q.render(now, &mut mono);
                        q.is_empty()
                    } else {
                        true
                    };
                    for (chunk, &sample) in data.chunks_mut(channels).zip(&mono) {
                        let s = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                        for slot in chunk {
                            *slot = s;
                        }
                    }
                    cb_clock.fetch_add(frames as u64, Ordering::Relaxed);
                    if drained {
                        cb_signals.set_speaking(false);
                    }
                },
                err_fn,
                None,
            )?,
            other => return Err(anyhow!("unsupported output sample format {:?}", other)),
        };

        stream.play()?;

        Ok(Self {
            queue,
            clock,
            sample_rate,
            signals,
            _stream: stream,
        })
    }

    /// Decode a 24 kHz mono payload and schedule it against the live clock.
    pub fn play(&self, payload: &[u8]) -> Result<()> {
        let planes = codec::decode_frame(payload, 1);
        let samples = planes.into_iter().next().unwrap_or_default();
        if samples.is_empty() {
            return Err(anyhow!("empty audio payload"));
        }

        let device_samples = resample_linear(&samples, PLAYBACK_SAMPLE_RATE, self.sample_rate);
        let now = self.clock.load(Ordering::Relaxed);
        if let Ok(mut queue) = self.queue.lock() {
            queue.schedule(device_samples, now);
        }
        self.signals.set_speaking(true);
        Ok(())
    }

    /// Barge-in: cut all in-flight audio immediately.
    pub fn interrupt(&self) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.interrupt();
        }
        self.signals.set_speaking(false);
    }
}

/// Linear resampling between the remote 24 kHz rate and the device rate.
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let new_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_pos = i as f64 * ratio;
        let src_idx = src_pos as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        let s1 = samples.get(src_idx).copied().unwrap_or(0.0);
        let s2 = samples.get(src_idx + 1).copied().unwrap_or(s1);

        output.push(s1 * (1.0 - frac) + s2 * frac);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_are_ordered_and_gapless() {
        let mut queue = PlaybackQueue::new();
        let durations = [2400usize, 1200, 4800, 960];
        let mut starts = Vec::new();
        for &d in &durations {
            starts.push(queue.schedule(vec![0.1; d], 0));
        }
        for i in 1..starts.len() {
            assert_eq!(starts[i], starts[i - 1] + durations[i - 1] as u64);
        }
        assert_eq!(queue.next_start(), durations.iter().sum::<usize>() as u64);
    }

    #[test]
    fn stale_cursor_snaps_forward_to_the_clock() {
        let mut queue = PlaybackQueue::new();
        queue.schedule(vec![0.0; 100], 0);
        // Device clock has moved past everything scheduled so far.
        let start = queue.schedule(vec![0.0; 50], 5_000);
        assert_eq!(start, 5_000);
        assert_eq!(queue.next_start(), 5_050);
    }

    #[test]
    fn interrupt_clears_sources_and_resets_cursor() {
        let mut queue = PlaybackQueue::new();
        for _ in 0..3 {
            queue.schedule(vec![0.5; 2400], 0);
        }
        assert!(!queue.is_empty());

        queue.interrupt();
        assert!(queue.is_empty());
        assert_eq!(queue.next_start(), 0);

        // The next payload lands at the clock, not at a stale offset.
        let start = queue.schedule(vec![0.5; 10], 7_200);
        assert_eq!(start, 7_200);
    }

    #[test]
    fn render_plays_scheduled_samples_in_place() {
        let mut queue = PlaybackQueue::new();
        queue.schedule(vec![0.25; 4], 0);
        queue.schedule(vec![-0.25; 4], 0);

        let mut out = vec![0.0f32; 10];
        queue.render(0, &mut out);
        assert_eq!(&out[..4], &[0.25; 4]);
        assert_eq!(&out[4..8], &[-0.25; 4]);
        assert_eq!(&out[8..], &[0.0; 2]);
        // Both buffers ended inside the block.
        assert!(queue.is_empty());
    }

    #[test]
    fn render_keeps_sources_that_are_still_sounding() {
        let mut queue = PlaybackQueue::new();
        queue.schedule(vec![0.5; 100], 0);

        let mut out = vec![0.0f32; 40];
        queue.render(0, &mut out);
        assert!(!queue.is_empty());

        queue.render(40, &mut out);
        queue.render(80, &mut out);
        assert!(queue.is_empty());
    }

    #[test]
    fn resample_identity_and_downsample() {
        let samples = vec![0.0f32, 0.5, 1.0, 0.5];
        assert_eq!(resample_linear(&samples, 24_000, 24_000), samples);

        let out = resample_linear(&samples, 24_000, 12_000);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 1.0);
    }
}
