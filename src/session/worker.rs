//! Session worker thread: owns the microphone stream, the WebSocket and
//! the playback pipeline for the lifetime of one session, and serializes
//! the three inbound/outbound event streams into one loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};
use tungstenite::Message;

use crate::audio::capture::{start_mic_capture, CAPTURE_BLOCK_SIZE};
use crate::audio::codec::AudioFrame;
use crate::audio::playback::PlaybackPipeline;
use crate::config::Config;
use crate::error::SessionError;

use super::controller::{SessionState, StateCell};
use super::signals::SessionSignals;
use super::transcript::{ConversationTurn, TranscriptBuffer};
use super::websocket::{
    connect_websocket, is_setup_complete, parse_error, parse_server_message, send_audio_frame,
    send_setup_message, set_socket_nonblocking,
};

/// Cadence for draining the capture buffer into outbound frames.
const SEND_INTERVAL: Duration = Duration::from_millis(100);
const SETUP_TIMEOUT: Duration = Duration::from_secs(15);

pub(crate) fn run_session(
    config: Config,
    state: Arc<StateCell>,
    signals: Arc<SessionSignals>,
    stop: Arc<AtomicBool>,
    turn_tx: mpsc::Sender<ConversationTurn>,
) {
    state.set(SessionState::Connecting);

    if config.api_key.trim().is_empty() {
        eprintln!("[Session] failed to start: no API key configured");
        finish(&state, &signals);
        return;
    }

    let audio_buffer: Arc<Mutex<Vec<i16>>> = Arc::new(Mutex::new(Vec::new()));
    let _mic = match start_mic_capture(audio_buffer.clone(), stop.clone(), signals.clone()) {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("[Session] failed to start: {}", e);
            finish(&state, &signals);
            return;
        }
    };
    signals.set_listening(true);

    let mut socket = match connect_websocket(&config.api_key) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("[Session] {}", SessionError::Transport(e.to_string()));
            finish(&state, &signals);
            return;
        }
    };

    if let Err(e) = send_setup_message(&mut socket, &config) {
        eprintln!("[Session] {}", SessionError::Transport(e.to_string()));
        let _ = socket.close(None);
        finish(&state, &signals);
        return;
    }

    let _ = set_socket_nonblocking(&mut socket);

    // Wait for setup acknowledgment
    let setup_start = Instant::now();
    loop {
        if stop.load(Ordering::Relaxed) {
            let _ = socket.close(None);
            finish(&state, &signals);
            return;
        }

        match socket.read() {
            Ok(Message::Text(msg)) => {
                let msg = msg.as_str();
                if is_setup_complete(msg) {
                    break;
                }
                if let Some(error) = parse_error(msg) {
                    eprintln!("[Session] {}", SessionError::Transport(error));
                    let _ = socket.close(None);
                    finish(&state, &signals);
                    return;
                }
            }
            Ok(Message::Binary(data)) => {
                if let Ok(text) = String::from_utf8(data.to_vec()) {
                    if is_setup_complete(&text) {
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) => {
                eprintln!(
                    "[Session] {}",
                    SessionError::Transport("closed during setup".to_string())
                );
                finish(&state, &signals);
                return;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                if setup_start.elapsed() > SETUP_TIMEOUT {
                    eprintln!(
                        "[Session] {}",
                        SessionError::Transport("setup timeout".to_string())
                    );
                    let _ = socket.close(None);
                    finish(&state, &signals);
                    return;
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                eprintln!("[Session] {}", SessionError::Transport(e.to_string()));
                finish(&state, &signals);
                return;
            }
        }
    }

    // The connection just opened: frames captured before this point are
    // dropped, not queued.
    if let Ok(mut buf) = audio_buffer.lock() {
        buf.clear();
    }

    let playback = match PlaybackPipeline::open(signals.clone()) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("[Session] failed to start: {}", e);
            let _ = socket.close(None);
            finish(&state, &signals);
            return;
        }
    };

    state.set(SessionState::Active);
    signals.set_session_active(true);
    println!("[Session] active");

    let mut transcript = TranscriptBuffer::new();
    let mut pending: Vec<i16> = Vec::new();
    let mut last_send = Instant::now();

    'main: while !stop.load(Ordering::Relaxed) {
        if last_send.elapsed() >= SEND_INTERVAL {
            if let Ok(mut buf) = audio_buffer.lock() {
                pending.append(&mut buf);
            }
            while pending.len() >= CAPTURE_BLOCK_SIZE {
                let block: Vec<i16> = pending.drain(..CAPTURE_BLOCK_SIZE).collect();
                let frame = AudioFrame::from_i16(&block);
                if let Err(e) = send_audio_frame(&mut socket, &frame) {
                    eprintln!("[Session] {}", SessionError::Transport(e.to_string()));
                    break 'main;
                }
            }
            last_send = Instant::now();
        }

        match socket.read() {
            Ok(Message::Text(msg)) => {
                if !handle_message(msg.as_str(), &mut transcript, &playback, &signals, &turn_tx) {
                    break;
                }
            }
            Ok(Message::Binary(data)) => {
                if let Ok(text) = String::from_utf8(data.to_vec()) {
                    if !handle_message(&text, &mut transcript, &playback, &signals, &turn_tx) {
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) => {
                eprintln!(
                    "[Session] {}",
                    SessionError::Transport("connection closed by server".to_string())
                );
                break;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                std::thread::sleep(Duration::from_millis(10));
            }
            Err(e) => {
                eprintln!("[Session] {}", SessionError::Transport(e.to_string()));
                break;
            }
        }
    }

    state.set(SessionState::Closing);
    let _ = socket.close(None);
    playback.interrupt();
    finish(&state, &signals);
    println!("[Session] closed");
}

/// Dispatch one inbound message. Returns false when the session must end.
fn handle_message(
    msg: &str,
    transcript: &mut TranscriptBuffer,
    playback: &PlaybackPipeline,
    signals: &SessionSignals,
    turn_tx: &mpsc::Sender<ConversationTurn>,
) -> bool {
    if let Some(error) = parse_error(msg) {
        eprintln!("[Session] {}", SessionError::Transport(error));
        return false;
    }

    let event = parse_server_message(msg);

    if let Some(payload) = event.audio {
        if payload.is_empty() {
            eprintln!(
                "[Session] {}",
                SessionError::MalformedPayload("inline audio data")
            );
        } else if let Err(e) = playback.play(&payload) {
            // Per-payload failure; the session continues.
            eprintln!("[Session] dropped audio payload: {}", e);
        }
    }

    if let Some(text) = event.user_text {
        transcript.append_user(&text);
        signals.set_live_transcript(transcript.user_partial());
    }

    if let Some(text) = event.model_text {
        transcript.append_model(&text);
    }

    if event.interrupted {
        playback.interrupt();
        transcript.abandon();
        signals.set_live_transcript("");
    }

    if event.turn_complete {
        let turn = transcript.finalize();
        let _ = turn_tx.send(turn);
        signals.set_live_transcript("");
    }

    true
}

/// Reset signals and return the state machine to Idle. Safe to call on
/// any failure path; the mic stream and playback drop with their scope.
fn finish(state: &StateCell, signals: &SessionSignals) {
    signals.reset();
    state.set(SessionState::Idle);
}
