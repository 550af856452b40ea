//! Audio plumbing: PCM codec, microphone capture and scheduled playback.

pub mod capture;
pub mod codec;
pub mod playback;

pub use capture::{start_mic_capture, CAPTURE_BLOCK_SIZE};
pub use codec::{decode_frame, encode_frame, AudioFrame};
pub use playback::{PlaybackPipeline, PlaybackQueue};
