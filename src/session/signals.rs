//! Observable session signals consumed by the UI layer.

use std::sync::{
    atomic::{AtomicBool, AtomicU32, Ordering},
    Mutex,
};

/// The four observable signals plus the live caption and input level.
/// Shared between the controller, the session worker and the UI; all
/// fields are updated from the worker side only.
pub struct SessionSignals {
    session_active: AtomicBool,
    listening: AtomicBool,
    speaking: AtomicBool,
    live_transcript: Mutex<String>,
    // RMS of the most recent capture block, stored as f32 bits.
    input_level: AtomicU32,
}

impl SessionSignals {
    pub fn new() -> Self {
        Self {
            session_active: AtomicBool::new(false),
            listening: AtomicBool::new(false),
            speaking: AtomicBool::new(false),
            live_transcript: Mutex::new(String::new()),
            input_level: AtomicU32::new(0),
        }
    }

    pub fn is_session_active(&self) -> bool {
        self.session_active.load(Ordering::SeqCst)
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// The growing user caption for the current turn.
    pub fn live_transcript(&self) -> String {
        self.live_transcript
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    pub fn input_level(&self) -> f32 {
        f32::from_bits(self.input_level.load(Ordering::Relaxed))
    }

    pub(crate) fn set_session_active(&self, active: bool) {
        self.session_active.store(active, Ordering::SeqCst);
    }

    pub(crate) fn set_listening(&self, listening: bool) {
        self.listening.store(listening, Ordering::SeqCst);
    }

    pub(crate) fn set_speaking(&self, speaking: bool) {
        self.speaking.store(speaking, Ordering::SeqCst);
    }

    pub(crate) fn set_live_transcript(&self, text: &str) {
        if let Ok(mut t) = self.live_transcript.lock() {
            t.clear();
            t.push_str(text);
        }
    }

    pub(crate) fn set_input_level(&self, rms: f32) {
        self.input_level.store(rms.to_bits(), Ordering::Relaxed);
    }

    /// Reset everything to the idle baseline.
    pub(crate) fn reset(&self) {
        self.set_session_active(false);
        self.set_listening(false);
        self.set_speaking(false);
        self.set_live_transcript("");
        self.set_input_level(0.0);
    }
}

impl Default for SessionSignals {
    fn default() -> Self {
        Self::new()
    }
}
