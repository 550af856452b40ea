//! Per-turn transcript assembly.
//!
//! Fragments append, never replace. The remote side owns turn
//! segmentation: a turn only finalizes on its explicit completion marker,
//! and an interruption abandons the turn without emitting anything.

/// One completed user/assistant exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationTurn {
    pub user: String,
    pub model: String,
}

/// Mutable accumulators for the current turn. Exactly one exists per open
/// session; torn down with it.
#[derive(Default)]
pub struct TranscriptBuffer {
    user_partial: String,
    model_partial: String,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_user(&mut self, fragment: &str) {
        self.user_partial.push_str(fragment);
    }

    pub fn append_model(&mut self, fragment: &str) {
        self.model_partial.push_str(fragment);
    }

    /// The live caption shown while the user speaks.
    pub fn user_partial(&self) -> &str {
        &self.user_partial
    }

    /// Finalize the turn on the remote completion marker, resetting both
    /// partials so nothing leaks into the next turn.
    pub fn finalize(&mut self) -> ConversationTurn {
        ConversationTurn {
            user: std::mem::take(&mut self.user_partial),
            model: std::mem::take(&mut self.model_partial),
        }
    }

    /// Drop the turn mid-flight (barge-in). No turn is emitted.
    pub fn abandon(&mut self) {
        self.user_partial.clear();
        self.model_partial.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_accumulate_and_finalize_as_one_turn() {
        let mut buffer = TranscriptBuffer::new();
        buffer.append_user("hel");
        buffer.append_user("lo");
        buffer.append_model("hi");

        let turn = buffer.finalize();
        assert_eq!(
            turn,
            ConversationTurn {
                user: "hello".to_string(),
                model: "hi".to_string(),
            }
        );
        assert_eq!(buffer.user_partial(), "");
        assert_eq!(buffer.model_partial, "");
    }

    #[test]
    fn abandon_resets_without_emitting() {
        let mut buffer = TranscriptBuffer::new();
        buffer.append_user("half a ");
        buffer.append_model("thou");
        buffer.abandon();

        assert_eq!(buffer.user_partial(), "");
        assert_eq!(buffer.model_partial, "");

        // The next turn starts clean.
        buffer.append_user("again");
        let turn = buffer.finalize();
        assert_eq!(turn.user, "again");
        assert_eq!(turn.model, "");
    }

    #[test]
    fn consecutive_turns_do_not_leak() {
        let mut buffer = TranscriptBuffer::new();
        buffer.append_user("one");
        buffer.append_model("uno");
        buffer.finalize();

        buffer.append_user("two");
        buffer.append_model("dos");
        let turn = buffer.finalize();
        assert_eq!(turn.user, "two");
        assert_eq!(turn.model, "dos");
    }
}
