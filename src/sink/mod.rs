//! Output writers for captured chat rows.
//!
//! Every sink accepts two operations: append a row (returning a handle) and
//! update the status/moderator fields of a row it appended earlier. Sinks
//! never see duplicates; the [`Sequencer`](crate::sequencer::Sequencer)
//! filters those out before anything is written.
//!
//! # Available Sinks
//!
//! - [`LogSink`] - Append-only text log
//! - [`SqliteSink`] - `messages` table in a SQLite database
//! - [`CsvSink`] - Delimited text file
//! - [`XlsxSink`] - Spreadsheet with `Chat`, `Moderation` and `Banned` sheets
//! - [`MemorySink`] - In-memory rows
//!
//! [`SinkSet`] fans one instruction stream out to several sinks and drops a
//! member from the set the first time it fails.

mod delimited;
mod log;
mod memory;
mod sqlite;
mod xlsx;

pub use self::delimited::{CsvLayout, CsvOptions, CsvSink};
pub use self::log::LogSink;
pub use self::memory::MemorySink;
pub use self::sqlite::SqliteSink;
pub use self::xlsx::XlsxSink;

use crate::Result;
use crate::event::ChatRow;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Opaque token a sink hands back from [`Sink::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowHandle(pub u64);

/// An output collaborator.
pub trait Sink {
    /// Human-readable name for this sink (used in logs).
    fn name(&self) -> &'static str;

    /// Write a new row and return a handle for later updates.
    fn append(&mut self, row: &ChatRow) -> Result<RowHandle>;

    /// Change only the status and moderator fields of an existing row.
    fn update_status(&mut self, handle: RowHandle, status: &str, actor: &str) -> Result<()>;

    /// Make buffered state durable.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn append(&mut self, row: &ChatRow) -> Result<RowHandle> {
        (**self).append(row)
    }

    fn update_status(&mut self, handle: RowHandle, status: &str, actor: &str) -> Result<()> {
        (**self).update_status(handle, status, actor)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

struct Member {
    sink: Box<dyn Sink + Send>,
    enabled: bool,
}

/// Fan-out over several sinks.
///
/// The set hands out its own sequential handles and remembers which handle
/// every member returned for each row, so members may use whatever handle
/// scheme they like (rowids, line indexes...).
pub struct SinkSet {
    members: Vec<Member>,
    // rows[handle] = per-member handle, None if the member was disabled at append time
    rows: Vec<Vec<Option<RowHandle>>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, sink: impl Sink + Send + 'static) {
        debug!("Sink `{}` attached", sink.name());
        self.members.push(Member {
            sink: Box::new(sink),
            enabled: true,
        });
    }

    pub fn with(mut self, sink: impl Sink + Send + 'static) -> Self {
        self.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Names of the members still receiving rows.
    pub fn active(&self) -> Vec<&'static str> {
        self.members
            .iter()
            .filter(|m| m.enabled)
            .map(|m| m.sink.name())
            .collect()
    }

    /// Flush every member and release them. Called on every session exit path.
    pub fn close(&mut self) {
        self.flush_members();
        for member in self.members.drain(..) {
            debug!("Sink `{}` closed", member.sink.name());
        }
    }

    fn flush_members(&mut self) {
        for member in self.members.iter_mut().filter(|m| m.enabled) {
            if let Err(err) = member.sink.flush() {
                disable(member, "flush", &err);
            }
        }
    }
}

impl Default for SinkSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Directory a replacement file for `path` is staged in before it is
/// persisted over the original.
fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn disable(member: &mut Member, op: &str, err: &crate::Error) {
    warn!(
        "Sink `{}` failed on {}: {}. Disabled for the rest of the session.",
        member.sink.name(),
        op,
        err
    );
    member.enabled = false;
}

impl Sink for SinkSet {
    fn name(&self) -> &'static str {
        "sinks"
    }

    fn append(&mut self, row: &ChatRow) -> Result<RowHandle> {
        let handle = RowHandle(self.rows.len() as u64);
        let mut handles = Vec::with_capacity(self.members.len());
        for member in &mut self.members {
            if !member.enabled {
                handles.push(None);
                continue;
            }
            match member.sink.append(row) {
                Ok(h) => handles.push(Some(h)),
                Err(err) => {
                    disable(member, "append", &err);
                    handles.push(None);
                }
            }
        }
        self.rows.push(handles);
        Ok(handle)
    }

    fn update_status(&mut self, handle: RowHandle, status: &str, actor: &str) -> Result<()> {
        let Some(handles) = self.rows.get(handle.0 as usize) else {
            warn!("Update for unknown row {:?} ignored", handle);
            return Ok(());
        };
        for (member, member_handle) in self.members.iter_mut().zip(handles) {
            let Some(member_handle) = member_handle else {
                continue;
            };
            if !member.enabled {
                continue;
            }
            if let Err(err) = member.sink.update_status(*member_handle, status, actor) {
                disable(member, "update", &err);
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flush_members();
        Ok(())
    }
}
