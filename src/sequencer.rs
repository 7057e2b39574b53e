//! Turns a raw chat event stream into append/update instructions.
//!
//! Sources may redeliver messages (the DOM observer re-emits every visible
//! node when it is reinstalled, the API may repeat a page) and moderation
//! may arrive before, after, or without the message it targets. The
//! sequencer keeps one slot per message id so that:
//!
//! - each distinct message occupies exactly one row,
//! - deletions and moderation actions update that row instead of adding one,
//! - events without an id are always written as their own row.
//!
//! Slots live for the whole capture session.

use crate::event::{ChatEvent, ChatRow, EventKind};
use crate::sink::{RowHandle, Sink};
use crate::Result;
use rustc_hash::FxHashMap;

/// Text written for a deletion whose original message was never seen.
pub const DELETED_PLACEHOLDER: &str = "[deleted]";

/// Status written for a deletion that carries no label of its own.
pub const DEFAULT_DELETION_STATUS: &str = "Deleted";

/// What a sink should do with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkInstruction {
    /// Already captured.
    NoOp,
    /// Write a new row. `slot` is the id to register once the sink returns
    /// the row handle.
    Append { row: ChatRow, slot: Option<String> },
    /// Change the status and moderator of an existing row.
    UpdateStatus {
        handle: RowHandle,
        status: String,
        actor: String,
    },
}

/// Result of [`Sequencer::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Skipped,
    Appended(RowHandle),
    Updated(RowHandle),
}

#[derive(Debug, Default)]
pub struct Sequencer {
    slots: FxHashMap<String, RowHandle>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of message ids that own a row.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, external_id: &str) -> Option<RowHandle> {
        self.slots.get(external_id).copied()
    }

    /// Classify one event against the current slot table.
    ///
    /// Never fails and never touches the table; registration happens in
    /// [`Sequencer::register`] once the append actually produced a handle.
    pub fn handle(&self, event: ChatEvent) -> SinkInstruction {
        let existing = event.slot_key().and_then(|id| self.slots.get(id)).copied();

        match (event.kind, existing) {
            (EventKind::Message, Some(_)) => SinkInstruction::NoOp,
            (EventKind::Message, None) => {
                let slot = event.slot_key().map(str::to_string);
                SinkInstruction::Append {
                    row: ChatRow {
                        observed_at: event.observed_at,
                        author: event.author,
                        text: event.text,
                        status: String::new(),
                        actor: String::new(),
                    },
                    slot,
                }
            }
            (EventKind::Deletion | EventKind::Moderation, Some(handle)) => {
                SinkInstruction::UpdateStatus {
                    handle,
                    status: status_of(event.kind, event.status),
                    actor: event.actor,
                }
            }
            (kind @ (EventKind::Deletion | EventKind::Moderation), None) => {
                let slot = event.slot_key().map(str::to_string);
                let text = if kind == EventKind::Deletion && event.text.is_empty() {
                    DELETED_PLACEHOLDER.to_string()
                } else {
                    event.text
                };
                SinkInstruction::Append {
                    row: ChatRow {
                        observed_at: event.observed_at,
                        author: event.author,
                        text,
                        status: status_of(kind, event.status),
                        actor: event.actor,
                    },
                    slot,
                }
            }
        }
    }

    /// Record that `external_id` now owns the row behind `handle`.
    ///
    /// An id that already owns a row keeps it.
    pub fn register(&mut self, external_id: String, handle: RowHandle) {
        if external_id.is_empty() {
            return;
        }
        self.slots.entry(external_id).or_insert(handle);
    }

    /// Classify `event`, execute the instruction on `sink` and register the
    /// new slot if a row was appended.
    ///
    /// A failed append registers nothing, so a redelivery of the same event
    /// gets another chance.
    pub fn apply<S: Sink + ?Sized>(&mut self, event: ChatEvent, sink: &mut S) -> Result<Applied> {
        match self.handle(event) {
            SinkInstruction::NoOp => Ok(Applied::Skipped),
            SinkInstruction::Append { row, slot } => {
                let handle = sink.append(&row)?;
                if let Some(id) = slot {
                    self.register(id, handle);
                }
                Ok(Applied::Appended(handle))
            }
            SinkInstruction::UpdateStatus {
                handle,
                status,
                actor,
            } => {
                sink.update_status(handle, &status, &actor)?;
                Ok(Applied::Updated(handle))
            }
        }
    }
}

fn status_of(kind: EventKind, status: String) -> String {
    if kind == EventKind::Deletion && status.is_empty() {
        DEFAULT_DELETION_STATUS.to_string()
    } else {
        status
    }
}
