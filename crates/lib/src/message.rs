//! Chat turns and the ordered message store for one conversation.
//!
//! The store is append-only apart from two targeted mutations: rewriting the text of the
//! last message (streaming) and setting the feedback rating of a bot message by id.
//! Every mutation returns a [`StoreChange`] so the caller can notify observers.

use serde::{Deserialize, Serialize};

/// A single chat turn (user or bot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub text: String,
    pub is_user: bool,
    /// Feedback rating; only ever set on bot messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback_rating: Option<i32>,
}

impl Message {
    pub fn user(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            is_user: true,
            feedback_rating: None,
        }
    }

    pub fn bot(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            is_user: false,
            feedback_rating: None,
        }
    }
}

/// What changed in the store, for observers that patch a rendered list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    /// A message was pushed at `index`.
    Appended { index: usize },
    /// The last message's text was rewritten.
    ReplacedLast,
    /// The message with this id was updated in place.
    ReplacedById { id: String },
    /// The whole list was cleared or replaced.
    Reset,
}

/// Ordered list of turns in the current conversation.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn push(&mut self, message: Message) -> StoreChange {
        self.messages.push(message);
        StoreChange::Appended {
            index: self.messages.len() - 1,
        }
    }

    /// Overwrite the text of the last message if its id matches. Returns None when the
    /// store is empty or the last message is a different turn.
    pub fn replace_last_text(&mut self, id: &str, text: &str) -> Option<StoreChange> {
        let last = self.messages.last_mut()?;
        if last.id != id {
            return None;
        }
        last.text.clear();
        last.text.push_str(text);
        Some(StoreChange::ReplacedLast)
    }

    /// Most recent bot message, if any.
    pub fn last_bot(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| !m.is_user)
    }

    /// Set the rating of the bot message with `id`. User messages are never rated.
    pub fn set_rating(&mut self, id: &str, rating: i32) -> Option<StoreChange> {
        let message = self
            .messages
            .iter_mut()
            .find(|m| !m.is_user && m.id == id)?;
        message.feedback_rating = Some(rating);
        Some(StoreChange::ReplacedById { id: id.to_string() })
    }

    pub fn clear(&mut self) -> StoreChange {
        self.messages.clear();
        StoreChange::Reset
    }

    pub fn replace_all(&mut self, messages: Vec<Message>) -> StoreChange {
        self.messages = messages;
        StoreChange::Reset
    }
}
