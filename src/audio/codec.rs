//! 16-bit PCM codec for the streaming transport.
//!
//! The remote side consumes 16 kHz mono PCM and produces 24 kHz mono PCM,
//! both as little-endian signed 16-bit samples. Encoding quantizes floats
//! in [-1.0, 1.0] to 1/32768 steps; decoding is the exact inverse at that
//! quantization level.

/// Wire mime descriptor for outbound capture frames.
pub const FRAME_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Sample rate the remote side expects for inbound (microphone) audio.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of the audio payloads the remote side sends back.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// One outbound transport unit: an encoded block of capture samples.
/// Immutable once constructed; consumed by the send path and discarded.
#[derive(Clone, Debug)]
pub struct AudioFrame {
    pub data: Vec<u8>,
    pub mime_type: &'static str,
}

impl AudioFrame {
    /// Wrap already-quantized capture samples.
    pub fn from_i16(samples: &[i16]) -> Self {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            data.extend_from_slice(&sample.to_le_bytes());
        }
        Self {
            data,
            mime_type: FRAME_MIME_TYPE,
        }
    }
}

/// Encode float samples in [-1.0, 1.0] into a transport frame.
/// Scales by 32768 and truncates, saturating at the i16 rails.
pub fn encode_frame(samples: &[f32]) -> AudioFrame {
    let quantized: Vec<i16> = samples
        .iter()
        .map(|&s| (s * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect();
    AudioFrame::from_i16(&quantized)
}

/// Decode a little-endian 16-bit payload into planar float buffers,
/// one `Vec<f32>` per channel. Channel counts >= 1 are tolerated; a
/// trailing partial sample or frame is ignored.
pub fn decode_frame(bytes: &[u8], channels: usize) -> Vec<Vec<f32>> {
    let channels = channels.max(1);
    let samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();

    let frames = samples.len() / channels;
    let mut planes = vec![Vec::with_capacity(frames); channels];
    for frame in samples.chunks_exact(channels) {
        for (plane, &sample) in planes.iter_mut().zip(frame) {
            plane.push(sample as f32 / 32768.0);
        }
    }
    planes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_quantizes_to_16_bit_steps() {
        let samples = [0.0f32, 0.5, -0.5, 0.123_456, -0.987_654, 1.0 / 32768.0];
        let frame = encode_frame(&samples);
        let decoded = decode_frame(&frame.data, 1);
        assert_eq!(decoded.len(), 1);
        for (&original, &restored) in samples.iter().zip(&decoded[0]) {
            let quantized = (original * 32768.0).trunc() / 32768.0;
            assert!(
                (restored - quantized).abs() < f32::EPSILON,
                "{original} round-tripped to {restored}, expected {quantized}"
            );
        }
    }

    #[test]
    fn encode_saturates_at_the_rails() {
        let frame = encode_frame(&[1.0, -1.5, 2.0]);
        let decoded = decode_frame(&frame.data, 1);
        assert_eq!(decoded[0][0], 32767.0 / 32768.0);
        assert_eq!(decoded[0][1], -1.0);
        assert_eq!(decoded[0][2], 32767.0 / 32768.0);
    }

    #[test]
    fn frame_carries_fixed_mime_descriptor() {
        let frame = encode_frame(&[0.25]);
        assert_eq!(frame.mime_type, "audio/pcm;rate=16000");
        assert_eq!(frame.data.len(), 2);
    }

    #[test]
    fn decode_deinterleaves_stereo() {
        let left = [100i16, 200, 300];
        let right = [-100i16, -200, -300];
        let mut bytes = Vec::new();
        for i in 0..3 {
            bytes.extend_from_slice(&left[i].to_le_bytes());
            bytes.extend_from_slice(&right[i].to_le_bytes());
        }
        let planes = decode_frame(&bytes, 2);
        assert_eq!(planes.len(), 2);
        assert_eq!(planes[0], vec![100.0 / 32768.0, 200.0 / 32768.0, 300.0 / 32768.0]);
        assert_eq!(
            planes[1],
            vec![-100.0 / 32768.0, -200.0 / 32768.0, -300.0 / 32768.0]
        );
    }

    #[test]
    fn decode_ignores_trailing_partial_sample() {
        let planes = decode_frame(&[0x00, 0x01, 0xFF], 1);
        assert_eq!(planes[0].len(), 1);
    }
}
