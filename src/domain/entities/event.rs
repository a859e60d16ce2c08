use chrono::{DateTime, Utc};

/// Identifier of a user or chat on the transport side
pub type UserId = i64;

/// An inbound event handed to the dispatcher by an event source.
///
/// The kernel never parses the wire protocol: sources build events with the
/// text already extracted. Button presses carry their opaque payload in `data`.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: String,
    pub text: String,
    pub sender_id: UserId,
    pub chat_id: i64,
    pub reply_to: Option<i64>,
    pub data: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(chat_id: i64, sender_id: UserId, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            sender_id,
            chat_id,
            reply_to: None,
            data: None,
            timestamp: Utc::now(),
        }
    }

    /// Build a callback (inline button) event
    pub fn callback(chat_id: i64, sender_id: UserId, data: impl Into<String>) -> Self {
        let mut event = Self::new(chat_id, sender_id, "");
        event.data = Some(data.into());
        event
    }

    pub fn with_reply_to(mut self, message_id: i64) -> Self {
        self.reply_to = Some(message_id);
        self
    }

    pub fn is_callback(&self) -> bool {
        self.data.is_some()
    }

    /// Short single-line preview used in log lines and error reports
    pub fn preview(&self, max_chars: usize) -> String {
        let source = self.data.as_deref().unwrap_or(&self.text);
        let mut preview: String = source.chars().take(max_chars).collect();
        if source.chars().count() > max_chars {
            preview.push('…');
        }
        preview.replace('\n', " ")
    }
}
