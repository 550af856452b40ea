//! Real-time speech session: capture, streaming exchange, jitter-buffered
//! playback and transcript assembly behind a single controller.

mod controller;
mod signals;
mod transcript;
mod websocket;
mod worker;

pub use controller::{SessionController, SessionState};
pub use signals::SessionSignals;
pub use transcript::{ConversationTurn, TranscriptBuffer};
pub use websocket::{parse_server_message, ServerEvent};
