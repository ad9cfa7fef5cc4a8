//! Hooks the UI host implements to follow the conversation.

use crate::message::{Message, StoreChange};
use crate::supervisor::ConnectionState;
use crate::transport::TransportError;

/// UI collaborator. Every hook defaults to a no-op so hosts implement only what they render.
pub trait ChatObserver {
    /// The message list changed; `messages` is the list after the change.
    fn messages_changed(&mut self, _change: &StoreChange, _messages: &[Message]) {}

    /// Fired after every text mutation.
    fn scroll_to_bottom(&mut self) {}

    fn show_chat_surface(&mut self) {}

    fn hide_chat_surface(&mut self) {}

    /// The user's input field should be emptied (a message was sent).
    fn clear_input(&mut self) {}

    fn connection_state_changed(&mut self, _state: ConnectionState) {}

    fn transport_error(&mut self, _error: &TransportError) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ChatObserver for NoopObserver {}
