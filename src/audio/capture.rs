//! Microphone capture: downmix to mono, resample to 16 kHz, push into a
//! shared buffer the session worker drains in fixed blocks.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use crate::error::SessionError;
use crate::session::SessionSignals;

use super::codec::CAPTURE_SAMPLE_RATE;

/// Samples per outbound frame. The worker sends one frame per full block.
pub const CAPTURE_BLOCK_SIZE: usize = 4096;

/// Start microphone capture. Returns the cpal Stream that must be kept
/// alive for the duration of the session; dropping it (plus raising the
/// stop signal) is the teardown, and both are safe to repeat.
pub fn start_mic_capture(
    audio_buffer: Arc<Mutex<Vec<i16>>>,
    stop_signal: Arc<AtomicBool>,
    signals: Arc<SessionSignals>,
) -> Result<cpal::Stream, SessionError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| SessionError::DeviceUnavailable("no input device".to_string()))?;
    let config = device
        .default_input_config()
        .map_err(|e| SessionError::DeviceUnavailable(e.to_string()))?;

    let sample_rate = config.sample_rate();
    let channels = config.channels() as usize;
    let err_fn = |err| eprintln!("[Capture] stream error: {}", err);

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device
            .build_input_stream(
                &config.into(),
                move |data: &[f32], _: &_| {
                    if stop_signal.load(Ordering::Relaxed) {
                        return;
                    }

                    let mono: Vec<i16> = if channels > 1 {
                        data.chunks(channels)
                            .map(|frame| {
                                let avg = frame.iter().sum::<f32>() / channels as f32;
                                (avg.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
                            })
                            .collect()
                    } else {
                        data.iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                            .collect()
                    };

                    let resampled = resample_to_16khz(&mono, sample_rate);

                    if !resampled.is_empty() {
                        let sum_sq: f64 = resampled
                            .iter()
                            .map(|&s| (s as f64 / 32768.0).powi(2))
                            .sum();
                        let rms = (sum_sq / resampled.len() as f64).sqrt() as f32;
                        signals.set_input_level(rms);
                    }

                    if let Ok(mut buf) = audio_buffer.lock() {
                        buf.extend(resampled);
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| SessionError::DeviceUnavailable(e.to_string()))?,
        cpal::SampleFormat::I16 => device
            .build_input_stream(
                &config.into(),
                move |data: &[i16], _: &_| {
                    if stop_signal.load(Ordering::Relaxed) {
                        return;
                    }

                    let mono: Vec<i16> = if channels > 1 {
                        data.chunks(channels)
                            .map(|frame| {
                                (frame.iter().map(|&s| s as i32).sum::<i32>()
                                    / frame.len() as i32) as i16
                            })
                            .collect()
                    } else {
                        data.to_vec()
                    };

                    let resampled = resample_to_16khz(&mono, sample_rate);

                    if !resampled.is_empty() {
                        let sum_sq: f64 = resampled
                            .iter()
                            .map(|&s| (s as f64 / 32768.0).powi(2))
                            .sum();
                        let rms = (sum_sq / resampled.len() as f64).sqrt() as f32;
                        signals.set_input_level(rms);
                    }

                    if let Ok(mut buf) = audio_buffer.lock() {
                        buf.extend(resampled);
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| SessionError::DeviceUnavailable(e.to_string()))?,
        other => {
            return Err(SessionError::DeviceUnavailable(format!(
                "unsupported sample format {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| SessionError::DeviceUnavailable(e.to_string()))?;
    Ok(stream)
}

/// Linear resampling to the 16 kHz the remote side expects.
fn resample_to_16khz(samples: &[i16], from_rate: u32) -> Vec<i16> {
    if from_rate == CAPTURE_SAMPLE_RATE || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / CAPTURE_SAMPLE_RATE as f64;
    let new_len = (samples.len() as f64 / ratio) as usize;
    let mut output = Vec::with_capacity(new_len);

    for i in 0..new_len {
        let src_pos = i as f64 * ratio;
        let src_idx = src_pos as usize;
        let frac = src_pos - src_idx as f64;

        let s1 = samples.get(src_idx).copied().unwrap_or(0);
        let s2 = samples.get(src_idx + 1).copied().unwrap_or(s1);

        let interpolated = s1 as f64 * (1.0 - frac) + s2 as f64 * frac;
        output.push(interpolated as i16);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_is_identity_at_target_rate() {
        let samples = vec![1i16, 2, 3, 4];
        assert_eq!(resample_to_16khz(&samples, 16_000), samples);
    }

    #[test]
    fn resample_halves_sample_count_from_32khz() {
        let samples: Vec<i16> = (0..64).collect();
        let out = resample_to_16khz(&samples, 32_000);
        assert_eq!(out.len(), 32);
        // Every output sample interpolates two adjacent inputs.
        assert_eq!(out[1], 2);
        assert_eq!(out[10], 20);
    }
}
