//! Stream assembler: folds start/chunk/end events into bot messages.
//!
//! The in-flight answer buffer and message id are per-controller state, reset at every
//! start and end. Chunks only ever touch the most recently appended message, and only
//! while that message is the one streaming; anything else is dropped.

use crate::message::{Message, MessageStore, StoreChange};

#[derive(Debug, Default)]
pub struct StreamAssembler {
    current_answer: String,
    current_message_id: Option<String>,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_streaming(&self) -> bool {
        self.current_message_id.is_some()
    }

    pub fn current_message_id(&self) -> Option<&str> {
        self.current_message_id.as_deref()
    }

    /// Begin a bot turn: append an empty bot message tagged `id`.
    pub fn on_start(&mut self, store: &mut MessageStore, id: &str) -> StoreChange {
        if let Some(prev) = self.current_message_id.as_deref() {
            log::debug!("answer {} started while {} was still streaming", id, prev);
        }
        self.current_answer.clear();
        self.current_message_id = Some(id.to_string());
        store.push(Message::bot(id, ""))
    }

    /// Append a fragment and rewrite the streaming message. None when nothing changed.
    pub fn on_chunk(&mut self, store: &mut MessageStore, fragment: &str) -> Option<StoreChange> {
        let Some(id) = self.current_message_id.as_deref() else {
            log::debug!("chunk with no answer in flight, ignored");
            return None;
        };
        self.current_answer.push_str(fragment);
        let change = store.replace_last_text(id, &self.current_answer);
        if change.is_none() {
            log::debug!("streaming message {} is no longer last, chunk ignored", id);
        }
        change
    }

    /// Finalize the turn. Returns true when an answer was actually in flight.
    pub fn on_end(&mut self, id: &str) -> bool {
        let Some(current) = self.current_message_id.take() else {
            log::debug!("end for {} with no answer in flight", id);
            return false;
        };
        if current != id {
            log::debug!("end for {} closes in-flight answer {}", id, current);
        }
        self.current_answer.clear();
        true
    }

    /// Forget any in-flight answer (session rotation). The partial message stays wherever
    /// the store keeps it.
    pub fn reset(&mut self) {
        self.current_answer.clear();
        self.current_message_id = None;
    }
}
