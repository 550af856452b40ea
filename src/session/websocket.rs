//! WebSocket connection and wire messages for the bidirectional
//! streaming session.

use anyhow::Result;
use base64::{engine::general_purpose, Engine as _};
use native_tls::TlsStream;
use std::net::TcpStream;
use std::time::Duration;
use tungstenite::WebSocket;

use crate::audio::codec::AudioFrame;
use crate::config::Config;

/// Create TLS WebSocket connection to the streaming endpoint.
pub fn connect_websocket(api_key: &str) -> Result<WebSocket<TlsStream<TcpStream>>> {
    let ws_url = format!(
        "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent?key={}",
        api_key
    );

    let url = url::Url::parse(&ws_url)?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow::anyhow!("No host in URL"))?;
    let port = 443;

    use std::net::ToSocketAddrs;
    let addr = format!("{}:{}", host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow::anyhow!("Failed to resolve hostname: {}", host))?;

    let tcp_stream = TcpStream::connect_timeout(&addr, Duration::from_secs(10))?;
    tcp_stream.set_read_timeout(Some(Duration::from_secs(30)))?;
    tcp_stream.set_write_timeout(Some(Duration::from_secs(30)))?;
    tcp_stream.set_nodelay(true)?;

    let connector = native_tls::TlsConnector::new()?;
    let tls_stream = connector.connect(host, tcp_stream)?;

    let (socket, _response) = tungstenite::client::client(&ws_url, tls_stream)?;

    Ok(socket)
}

/// Set a short read timeout so the main loop can interleave sends,
/// receives and stop checks.
pub fn set_socket_nonblocking(socket: &mut WebSocket<TlsStream<TcpStream>>) -> Result<()> {
    let stream = socket.get_mut();
    let tcp_stream = stream.get_mut();
    tcp_stream.set_read_timeout(Some(Duration::from_millis(50)))?;
    Ok(())
}

/// Send the session setup: audio-only responses with the chosen voice,
/// the persona text, and live transcription on both directions.
pub fn send_setup_message(
    socket: &mut WebSocket<TlsStream<TcpStream>>,
    config: &Config,
) -> Result<()> {
    let setup = serde_json::json!({
        "setup": {
            "model": format!("models/{}", config.model),
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": {
                            "voiceName": config.voice
                        }
                    }
                }
            },
            "systemInstruction": {
                "parts": [{
                    "text": config.system_instruction
                }]
            },
            "inputAudioTranscription": {},
            "outputAudioTranscription": {}
        }
    });

    let msg_str = setup.to_string();
    socket.write(tungstenite::Message::Text(msg_str.into()))?;
    socket.flush()?;

    Ok(())
}

/// Send one capture frame. Fire-and-forget from the caller's point of
/// view: the frame is consumed here and never queued.
pub fn send_audio_frame(
    socket: &mut WebSocket<TlsStream<TcpStream>>,
    frame: &AudioFrame,
) -> Result<()> {
    let b64_audio = general_purpose::STANDARD.encode(&frame.data);

    let msg = serde_json::json!({
        "realtime_input": {
            "media_chunks": [{
                "data": b64_audio,
                "mime_type": frame.mime_type
            }]
        }
    });

    socket.write(tungstenite::Message::Text(msg.to_string().into()))?;
    socket.flush()?;

    Ok(())
}

/// Everything one inbound server message may carry. A message usually
/// carries one of these, but each present part is handled independently
/// so a malformed part never poisons the rest.
#[derive(Debug, Default)]
pub struct ServerEvent {
    /// Decoded 24 kHz mono PCM payload.
    pub audio: Option<Vec<u8>>,
    /// Partial transcript of the user's speech.
    pub user_text: Option<String>,
    /// Partial transcript of the model's speech.
    pub model_text: Option<String>,
    /// The remote side finished its turn.
    pub turn_complete: bool,
    /// Barge-in: the user talked over in-flight assistant audio.
    pub interrupted: bool,
}

/// Parse an inbound message. Unknown or malformed parts are skipped.
pub fn parse_server_message(msg: &str) -> ServerEvent {
    let mut event = ServerEvent::default();

    let Ok(json) = serde_json::from_str::<serde_json::Value>(msg) else {
        return event;
    };
    let Some(server_content) = json.get("serverContent") else {
        return event;
    };

    if let Some(model_turn) = server_content.get("modelTurn") {
        if let Some(parts) = model_turn.get("parts").and_then(|p| p.as_array()) {
            for part in parts {
                if let Some(inline_data) = part.get("inlineData") {
                    if let Some(data_b64) = inline_data.get("data").and_then(|d| d.as_str()) {
                        if let Ok(audio_bytes) = general_purpose::STANDARD.decode(data_b64) {
                            event.audio = Some(audio_bytes);
                            break;
                        }
                    }
                }
            }
        }
    }

    if let Some(transcription) = server_content.get("inputTranscription") {
        if let Some(text) = transcription.get("text").and_then(|t| t.as_str()) {
            event.user_text = Some(text.to_string());
        }
    }

    if let Some(transcription) = server_content.get("outputTranscription") {
        if let Some(text) = transcription.get("text").and_then(|t| t.as_str()) {
            event.model_text = Some(text.to_string());
        }
    }

    if let Some(tc) = server_content.get("turnComplete") {
        if tc.as_bool().unwrap_or(false) {
            event.turn_complete = true;
        }
    }

    if let Some(flag) = server_content.get("interrupted") {
        if flag.as_bool().unwrap_or(true) {
            event.interrupted = true;
        }
    }

    event
}

/// Check if the message acknowledges the session setup.
pub fn is_setup_complete(msg: &str) -> bool {
    msg.contains("setupComplete")
}

/// Check if the message carries a server-side error.
pub fn parse_error(msg: &str) -> Option<String> {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(msg) {
        if let Some(error) = json.get("error") {
            if let Some(message) = error.get("message").and_then(|m| m.as_str()) {
                return Some(message.to_string());
            }
            return Some(error.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_audio_payload() {
        let pcm = [0u8, 1, 2, 3];
        let msg = serde_json::json!({
            "serverContent": {
                "modelTurn": {
                    "parts": [{
                        "inlineData": {
                            "mimeType": "audio/pcm;rate=24000",
                            "data": general_purpose::STANDARD.encode(pcm)
                        }
                    }]
                }
            }
        })
        .to_string();

        let event = parse_server_message(&msg);
        assert_eq!(event.audio.as_deref(), Some(&pcm[..]));
        assert!(!event.turn_complete);
        assert!(!event.interrupted);
    }

    #[test]
    fn parses_transcripts_and_turn_complete() {
        let msg = serde_json::json!({
            "serverContent": {
                "inputTranscription": { "text": "hel" },
                "outputTranscription": { "text": "hi" },
                "turnComplete": true
            }
        })
        .to_string();

        let event = parse_server_message(&msg);
        assert_eq!(event.user_text.as_deref(), Some("hel"));
        assert_eq!(event.model_text.as_deref(), Some("hi"));
        assert!(event.turn_complete);
    }

    #[test]
    fn parses_interruption_marker() {
        let msg = r#"{"serverContent":{"interrupted":true}}"#;
        assert!(parse_server_message(msg).interrupted);
    }

    #[test]
    fn malformed_audio_part_does_not_drop_sibling_transcript() {
        // inlineData present but missing its data field: the audio part
        // is ignored, the transcript in the same message still lands.
        let msg = serde_json::json!({
            "serverContent": {
                "modelTurn": {
                    "parts": [{ "inlineData": { "mimeType": "audio/pcm;rate=24000" } }]
                },
                "inputTranscription": { "text": "still here" }
            }
        })
        .to_string();

        let event = parse_server_message(&msg);
        assert!(event.audio.is_none());
        assert_eq!(event.user_text.as_deref(), Some("still here"));
    }

    #[test]
    fn non_json_message_parses_to_empty_event() {
        let event = parse_server_message("not json");
        assert!(event.audio.is_none());
        assert!(event.user_text.is_none());
        assert!(!event.turn_complete);
    }

    #[test]
    fn server_errors_are_detected() {
        assert_eq!(
            parse_error(r#"{"error":{"message":"quota exceeded"}}"#).as_deref(),
            Some("quota exceeded")
        );
        assert!(parse_error(r#"{"serverContent":{}}"#).is_none());
    }
}
