use super::{RowHandle, Sink};
use crate::Result;
use crate::event::{ChatRow, format_timestamp};
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Append-only UTF-8 text log, one `timestamp - author: text` line per row.
///
/// The log never rewrites history: a status update is recorded as a new
/// line that names the affected message.
pub struct LogSink {
    path: PathBuf,
    out: BufWriter<File>,
    // author/text per handle, to describe the message a later update refers to
    lines: Vec<(String, String)>,
}

impl LogSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!("Chat log → {}", path.display());
        Ok(Self {
            path,
            out: BufWriter::new(file),
            lines: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn append(&mut self, row: &ChatRow) -> Result<RowHandle> {
        if row.status.is_empty() {
            writeln!(self.out, "{} - {}: {}", row.timestamp(), row.author, row.text)?;
        } else {
            writeln!(
                self.out,
                "{} - [{}] {}: {}",
                row.timestamp(),
                describe(&row.status, &row.actor),
                row.author,
                row.text
            )?;
        }
        self.out.flush()?;
        self.lines.push((row.author.clone(), row.text.clone()));
        Ok(RowHandle(self.lines.len() as u64 - 1))
    }

    fn update_status(&mut self, handle: RowHandle, status: &str, actor: &str) -> Result<()> {
        let (author, text) = self
            .lines
            .get(handle.0 as usize)
            .map(|(a, t)| (a.as_str(), t.as_str()))
            .unwrap_or(("", ""));
        writeln!(
            self.out,
            "{} - [{}] {}: {}",
            format_timestamp(&Local::now()),
            describe(status, actor),
            author,
            text
        )?;
        self.out.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

fn describe(status: &str, actor: &str) -> String {
    if actor.is_empty() {
        status.to_string()
    } else {
        format!("{status} by {actor}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(author: &str, text: &str) -> ChatRow {
        ChatRow {
            observed_at: Local::now(),
            author: author.into(),
            text: text.into(),
            status: String::new(),
            actor: String::new(),
        }
    }

    #[test]
    fn writes_lines_and_update_notes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.log");
        let mut sink = LogSink::open(&path).unwrap();

        let h = sink.append(&row("alice", "hi 👋")).unwrap();
        sink.append(&row("bob", "yo")).unwrap();
        sink.update_status(h, "Banned", "mod1").unwrap();
        drop(sink);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with(" - alice: hi 👋"));
        assert!(lines[1].ends_with(" - bob: yo"));
        assert!(lines[2].ends_with(" - [Banned by mod1] alice: hi 👋"));
    }

    #[test]
    fn reopening_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.log");
        LogSink::open(&path).unwrap().append(&row("a", "1")).unwrap();
        LogSink::open(&path).unwrap().append(&row("b", "2")).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }
}
