//! History exchange: a past conversation handed back to the controller to resume.
//!
//! Wire/file shape: `{ "topicId", "sessionId", "messages": [{ "id", "user"?, "bot"? }] }`.

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// One past exchange. Either side may be missing or blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryExchange {
    pub topic_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<HistoryRecord>,
}

/// Id given to the user side of a record; the bot side keeps the record id.
pub fn user_message_id(record_id: &str) -> String {
    format!("{}:user", record_id)
}

/// Flatten records into messages, user side first. Blank sides are skipped.
pub fn to_messages(records: &[HistoryRecord]) -> Vec<Message> {
    let mut out = Vec::with_capacity(records.len() * 2);
    for record in records {
        if let Some(text) = non_blank(record.user.as_deref()) {
            out.push(Message::user(user_message_id(&record.id), text));
        }
        if let Some(text) = non_blank(record.bot.as_deref()) {
            out.push(Message::bot(record.id.clone(), text));
        }
    }
    out
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.filter(|t| !t.trim().is_empty())
}
