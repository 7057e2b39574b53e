//! Normalized chat events and output rows.

use chrono::{DateTime, Local};

/// What a captured chat event represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A new chat message.
    Message,
    /// A message was removed (by its author or a moderator).
    Deletion,
    /// A moderation action such as a ban or a timeout.
    Moderation,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Deletion => "deletion",
            Self::Moderation => "moderation",
        }
    }
}

/// One event pulled from an event source, already reduced to a common shape.
///
/// An empty `external_id` means the event has no stable identity and never
/// matches any other event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub kind: EventKind,
    pub external_id: String,
    pub author: String,
    pub text: String,
    pub observed_at: DateTime<Local>,
    pub status: String,
    pub actor: String,
}

impl ChatEvent {
    pub fn message(
        external_id: impl Into<String>,
        author: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            kind: EventKind::Message,
            external_id: external_id.into(),
            author: author.into(),
            text: text.into(),
            observed_at: Local::now(),
            status: String::new(),
            actor: String::new(),
        }
    }

    pub fn deletion(external_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Deletion,
            status: status.into(),
            ..Self::message(external_id, "", "")
        }
    }

    pub fn moderation(
        external_id: impl Into<String>,
        status: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            kind: EventKind::Moderation,
            status: status.into(),
            actor: actor.into(),
            ..Self::message(external_id, "", "")
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn observed_at(mut self, at: DateTime<Local>) -> Self {
        self.observed_at = at;
        self
    }

    /// The slot key for this event, if it carries a stable identity.
    pub fn slot_key(&self) -> Option<&str> {
        if self.external_id.is_empty() {
            None
        } else {
            Some(&self.external_id)
        }
    }
}

/// A row as written to every sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRow {
    pub observed_at: DateTime<Local>,
    pub author: String,
    pub text: String,
    pub status: String,
    pub actor: String,
}

impl ChatRow {
    /// Timestamp in the `YYYY-MM-DD HH:MM:SS` form every sink writes.
    pub fn timestamp(&self) -> String {
        format_timestamp(&self.observed_at)
    }
}

pub fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Whether a status label describes a ban (and not a timeout or deletion).
pub fn is_ban_status(status: &str) -> bool {
    let status = status.to_lowercase();
    status.contains("ban") && !status.contains("unban")
}
