use super::{RowHandle, Sink, parent_dir};
use crate::Result;
use crate::event::{ChatRow, is_ban_status};
use rust_xlsxwriter::{Format, Workbook};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

const HEADER: [&str; 5] = ["time", "user", "message", "status", "mod action"];
const WIDTHS: [f64; 5] = [20.0, 24.0, 80.0, 18.0, 20.0];

#[derive(Debug, Clone)]
struct SheetRow {
    time: String,
    user: String,
    message: String,
    status: String,
    actor: String,
}

impl SheetRow {
    fn cells(&self) -> [&str; 5] {
        [&self.time, &self.user, &self.message, &self.status, &self.actor]
    }
}

/// Spreadsheet with three sheets: `Chat` holds every row, `Moderation` the
/// rows with a status, `Banned` only ban rows.
///
/// The workbook lives in memory and is written out on [`Sink::flush`] by
/// replacing the file as a whole, so a crash mid-save leaves the last
/// complete workbook behind.
pub struct XlsxSink {
    path: PathBuf,
    rows: Vec<SheetRow>,
    dirty: bool,
}

impl XlsxSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut sink = Self {
            path,
            rows: Vec::new(),
            dirty: true,
        };
        // write the empty workbook once so an unwritable path fails up front
        sink.flush()?;
        info!("Chat spreadsheet → {}", sink.path.display());
        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        let mut workbook = Workbook::new();
        let bold = Format::new().set_bold();

        let all: Vec<&SheetRow> = self.rows.iter().collect();
        let moderated: Vec<&SheetRow> = self.rows.iter().filter(|r| !r.status.is_empty()).collect();
        let banned: Vec<&SheetRow> = self.rows.iter().filter(|r| is_ban_status(&r.status)).collect();

        for (name, rows) in [("Chat", all), ("Moderation", moderated), ("Banned", banned)] {
            let sheet = workbook.add_worksheet();
            sheet.set_name(name)?;
            for (col, (title, width)) in HEADER.iter().zip(WIDTHS).enumerate() {
                sheet.write_string_with_format(0, col as u16, *title, &bold)?;
                sheet.set_column_width(col as u16, width)?;
            }
            for (i, row) in rows.iter().enumerate() {
                for (col, cell) in row.cells().iter().enumerate() {
                    sheet.write_string(i as u32 + 1, col as u16, *cell)?;
                }
            }
        }

        // the previous workbook stays intact until the new one is complete on disk
        let buffer = workbook.save_to_buffer()?;
        let mut tmp = NamedTempFile::new_in(parent_dir(&self.path))?;
        tmp.write_all(&buffer)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }
}

impl Sink for XlsxSink {
    fn name(&self) -> &'static str {
        "xlsx"
    }

    fn append(&mut self, row: &ChatRow) -> Result<RowHandle> {
        self.rows.push(SheetRow {
            time: row.timestamp(),
            user: row.author.clone(),
            message: row.text.clone(),
            status: row.status.clone(),
            actor: row.actor.clone(),
        });
        self.dirty = true;
        Ok(RowHandle(self.rows.len() as u64 - 1))
    }

    fn update_status(&mut self, handle: RowHandle, status: &str, actor: &str) -> Result<()> {
        if let Some(row) = self.rows.get_mut(handle.0 as usize) {
            row.status = status.to_string();
            row.actor = actor.to_string();
            self.dirty = true;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.save()?;
        self.dirty = false;
        debug!("Wrote {} rows to {}", self.rows.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkSet;
    use calamine::{Reader, Xlsx, open_workbook};
    use chrono::Local;

    fn row(author: &str, text: &str) -> ChatRow {
        ChatRow {
            observed_at: Local::now(),
            author: author.into(),
            text: text.into(),
            status: String::new(),
            actor: String::new(),
        }
    }

    /// Data rows of `sheet` as `[user, message, status, mod action]`.
    fn read_sheet(path: &Path, sheet: &str) -> Vec<Vec<String>> {
        let mut workbook: Xlsx<_> = open_workbook(path).unwrap();
        let range = workbook.worksheet_range(sheet).unwrap();
        let mut rows = range.rows();
        let header: Vec<String> = rows.next().unwrap().iter().map(|c| c.to_string()).collect();
        assert_eq!(header, HEADER);
        rows.map(|r| r[1..].iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn flush_writes_rows_to_every_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.xlsx");
        let mut sink = XlsxSink::create(&path).unwrap();
        assert!(!sink.dirty);
        assert!(read_sheet(&path, "Chat").is_empty());

        let h = sink.append(&row("alice", "hi")).unwrap();
        sink.append(&row("bob", "spam")).unwrap();
        sink.update_status(h, "Banned", "mod1").unwrap();
        assert!(sink.dirty);
        sink.flush().unwrap();
        assert!(!sink.dirty);

        assert_eq!(
            read_sheet(&path, "Chat"),
            vec![vec!["alice", "hi", "Banned", "mod1"], vec!["bob", "spam", "", ""]]
        );
        assert_eq!(read_sheet(&path, "Moderation"), vec![vec!["alice", "hi", "Banned", "mod1"]]);
        assert_eq!(read_sheet(&path, "Banned"), vec![vec!["alice", "hi", "Banned", "mod1"]]);
    }

    #[test]
    fn saves_replace_the_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.xlsx");
        let mut sink = XlsxSink::create(&path).unwrap();
        for i in 0..3 {
            sink.append(&row("alice", &format!("message {i}"))).unwrap();
            sink.flush().unwrap();
        }

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("chat.xlsx")]);
        assert_eq!(read_sheet(&path, "Chat").len(), 3);
    }

    #[test]
    fn closing_the_set_saves_unflushed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.xlsx");
        let mut set = SinkSet::new().with(XlsxSink::create(&path).unwrap());

        let h = set.append(&row("carl", "hola")).unwrap();
        set.update_status(h, "Deleted by mod", "").unwrap();
        assert!(read_sheet(&path, "Chat").is_empty());

        set.close();
        assert_eq!(
            read_sheet(&path, "Chat"),
            vec![vec!["carl", "hola", "Deleted by mod", ""]]
        );
    }

    #[test]
    fn unwritable_path_fails_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("chat.xlsx");
        assert!(XlsxSink::create(&path).is_err());
    }
}
