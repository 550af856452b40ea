//! Real-time voice session core for a holographic desktop assistant.
//!
//! Bridges live microphone capture, a bidirectional streaming AI
//! connection and scheduled audio playback into one conversational state
//! machine with barge-in support. The UI shell around it only renders
//! the exposed signals and finalized turns.

pub mod audio;
pub mod config;
pub mod error;
pub mod session;
