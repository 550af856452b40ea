//! Session lifecycle: one controller, at most one live session.
//!
//! All session state lives behind this controller rather than in module
//! globals, which is what makes the single-active-session guarantee
//! enforceable: `start` is an idempotent no-op while a session is pending
//! or active, and `stop` is an idempotent no-op when idle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;

use crate::config::Config;

use super::signals::SessionSignals;
use super::transcript::ConversationTurn;
use super::worker::run_session;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Closing,
}

/// Shared state-machine cell; written by the worker, read by everyone.
pub(crate) struct StateCell(Mutex<SessionState>);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(Mutex::new(SessionState::Idle))
    }

    pub(crate) fn get(&self) -> SessionState {
        self.0.lock().map(|s| *s).unwrap_or(SessionState::Idle)
    }

    pub(crate) fn set(&self, state: SessionState) {
        if let Ok(mut s) = self.0.lock() {
            *s = state;
        }
    }
}

struct WorkerHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

pub struct SessionController {
    config: Config,
    state: Arc<StateCell>,
    signals: Arc<SessionSignals>,
    turn_tx: mpsc::Sender<ConversationTurn>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl SessionController {
    /// Create a controller plus the receiver on which finalized
    /// conversation turns arrive, one per completed exchange.
    pub fn new(config: Config) -> (Self, mpsc::Receiver<ConversationTurn>) {
        let (turn_tx, turn_rx) = mpsc::channel();
        (
            Self {
                config,
                state: Arc::new(StateCell::new()),
                signals: Arc::new(SessionSignals::new()),
                turn_tx,
                worker: Mutex::new(None),
            },
            turn_rx,
        )
    }

    pub fn signals(&self) -> Arc<SessionSignals> {
        self.signals.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Start a session. No-op while one is pending or active. Failures
    /// (no microphone, no key, transport) are reported on stderr and
    /// leave the controller idle; nothing propagates to the caller.
    pub fn start(&self) {
        let mut slot = match self.worker.lock() {
            Ok(s) => s,
            Err(_) => return,
        };
        if let Some(handle) = slot.as_ref() {
            if !handle.thread.is_finished() {
                return;
            }
        }
        if self.state.get() != SessionState::Idle {
            return;
        }

        let stop = Arc::new(AtomicBool::new(false));
        let config = self.config.clone();
        let state = self.state.clone();
        let signals = self.signals.clone();
        let turn_tx = self.turn_tx.clone();
        let worker_stop = stop.clone();

        let thread = std::thread::spawn(move || {
            run_session(config, state, signals, worker_stop, turn_tx);
        });

        *slot = Some(WorkerHandle { stop, thread });
    }

    /// Stop the session and release the microphone and audio contexts.
    /// Safe to call when already idle.
    pub fn stop(&self) {
        let handle = match self.worker.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => return,
        };
        let Some(handle) = handle else {
            return;
        };
        handle.stop.store(true, Ordering::SeqCst);
        let _ = handle.thread.join();
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn wait_for_idle(controller: &SessionController) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while controller.state() != SessionState::Idle && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn stop_when_idle_is_a_noop() {
        let (controller, _turns) = SessionController::new(Config::default());
        controller.stop();
        controller.stop();
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(!controller.signals().is_session_active());
    }

    #[test]
    fn start_without_api_key_reports_and_returns_to_idle() {
        // Default config has no key, so the worker refuses before touching
        // any device or socket.
        let (controller, _turns) = SessionController::new(Config::default());
        controller.start();
        controller.stop();
        wait_for_idle(&controller);
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(!controller.signals().is_session_active());
        assert!(!controller.signals().is_listening());
    }

    #[test]
    fn double_start_then_stop_settles_idle() {
        let (controller, _turns) = SessionController::new(Config::default());
        controller.start();
        controller.start();
        controller.stop();
        wait_for_idle(&controller);
        assert_eq!(controller.state(), SessionState::Idle);
    }
}
