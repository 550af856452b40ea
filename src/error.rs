//! Session error taxonomy.
//!
//! None of these escape the session boundary as panics: capture and
//! connection failures are reported once on stderr and reflected in the
//! boolean session signals, per-payload decode failures are swallowed.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Microphone permission denied or no input device present.
    #[error("microphone unavailable: {0}")]
    DeviceUnavailable(String),

    /// The remote connection reported an error or closed unexpectedly.
    /// Fatal for the session, not retried.
    #[error("transport error: {0}")]
    Transport(String),

    /// An inbound message part lacked an expected field. Only that part
    /// is dropped; the rest of the message is still processed.
    #[error("malformed payload: missing {0}")]
    MalformedPayload(&'static str),
}
