//! YouTube live chat capture.
//!
//! Chat events come from either the Live Chat Messages API or a DOM
//! observer injected into the chat page, pass through a [`Sequencer`] that
//! deduplicates them by message id, and end up in one or more sinks (text
//! log, SQLite, CSV, XLSX). Moderation that arrives after a message updates
//! the row already written instead of adding a second one.

pub mod config;
pub mod error;
pub mod event;
pub mod mirror;
pub mod sequencer;
pub mod session;
pub mod sink;
pub mod source;
pub mod stats;

pub use error::{Error, Result};
pub use event::{ChatEvent, ChatRow, EventKind};
pub use sequencer::{Applied, Sequencer, SinkInstruction};
pub use session::CaptureSession;
pub use sink::{RowHandle, Sink, SinkSet};
pub use source::{EventSource, RetryPolicy};
