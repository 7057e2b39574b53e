use super::{RowHandle, Sink, parent_dir};
use crate::Result;
use crate::event::ChatRow;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Column layout of a delimited chat file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvLayout {
    /// `AUTHOR,MESSAGE`. Status updates have nowhere to go and are ignored.
    AuthorMessage,
    /// `time,name,message,delete?`, the last column holding the status label.
    Moderation,
}

impl CsvLayout {
    fn header(&self) -> &'static [&'static str] {
        match self {
            Self::AuthorMessage => &["AUTHOR", "MESSAGE"],
            Self::Moderation => &["time", "name", "message", "delete?"],
        }
    }

    fn record(&self, row: &ChatRow) -> Vec<String> {
        match self {
            Self::AuthorMessage => vec![row.author.clone(), row.text.clone()],
            Self::Moderation => vec![
                row.timestamp(),
                row.author.clone(),
                row.text.clone(),
                status_label(&row.status, &row.actor),
            ],
        }
    }

    fn status_column(&self) -> Option<usize> {
        match self {
            Self::AuthorMessage => None,
            Self::Moderation => Some(3),
        }
    }
}

fn status_label(status: &str, actor: &str) -> String {
    if actor.is_empty() {
        status.to_string()
    } else {
        format!("{status} ({actor})")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CsvOptions {
    pub layout: CsvLayout,
    pub delimiter: u8,
    /// Start new files with a UTF-8 byte order mark so spreadsheet tools
    /// detect the encoding.
    pub bom: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            layout: CsvLayout::Moderation,
            delimiter: b',',
            bom: true,
        }
    }
}

/// Delimited text file.
///
/// Appends go straight to the end of the file. Updates rewrite the whole
/// file through a temporary file in the same directory, so the file on disk
/// is always either the old or the new version.
pub struct CsvSink {
    path: PathBuf,
    options: CsvOptions,
    has_bom: bool,
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    // index of the first row appended by this session
    first_own_row: usize,
    writer: Option<csv::Writer<File>>,
}

impl CsvSink {
    /// Open `path` for appending, writing a header if the file is new.
    /// Rows already present are kept and preserved across rewrites.
    pub fn open(path: impl AsRef<Path>, options: CsvOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let existing = match std::fs::read(&path) {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };
        // a file holding nothing but a BOM has no header to keep
        let existing = existing.filter(|bytes| {
            let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
            !body.iter().all(u8::is_ascii_whitespace)
        });

        let mut sink = Self {
            path,
            options,
            has_bom: options.bom,
            header: options.layout.header().iter().map(|s| s.to_string()).collect(),
            rows: Vec::new(),
            first_own_row: 0,
            writer: None,
        };

        match existing {
            Some(bytes) => {
                sink.has_bom = bytes.starts_with(UTF8_BOM);
                let body = if sink.has_bom { &bytes[UTF8_BOM.len()..] } else { &bytes[..] };
                let mut reader = csv::ReaderBuilder::new()
                    .delimiter(options.delimiter)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(body);
                let mut records = reader.records();
                if let Some(header) = records.next() {
                    sink.header = header?.iter().map(str::to_string).collect();
                }
                for record in records {
                    sink.rows.push(record?.iter().map(str::to_string).collect());
                }
                sink.first_own_row = sink.rows.len();
                debug!(
                    "Appending to {} ({} existing rows)",
                    sink.path.display(),
                    sink.rows.len()
                );
                sink.reopen()?;
            }
            None => {
                let mut file = File::create(&sink.path)?;
                if sink.has_bom {
                    file.write_all(UTF8_BOM)?;
                }
                let mut writer = sink.writer_for(file);
                writer.write_record(&sink.header)?;
                writer.flush()?;
                sink.writer = Some(writer);
            }
        }

        info!("Chat CSV → {}", sink.path.display());
        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer_for<W: Write>(&self, out: W) -> csv::Writer<W> {
        csv::WriterBuilder::new()
            .delimiter(self.options.delimiter)
            .flexible(true)
            .from_writer(out)
    }

    fn reopen(&mut self) -> Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = Some(self.writer_for(file));
        Ok(())
    }

    fn rewrite(&mut self) -> Result<()> {
        // release the append handle before replacing the file underneath it
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        let mut tmp = NamedTempFile::new_in(parent_dir(&self.path))?;
        if self.has_bom {
            tmp.write_all(UTF8_BOM)?;
        }
        {
            let mut writer = self.writer_for(&mut tmp);
            writer.write_record(&self.header)?;
            for record in &self.rows {
                writer.write_record(record)?;
            }
            writer.flush()?;
        }
        tmp.persist(&self.path).map_err(|err| err.error)?;

        self.reopen()
    }
}

impl Sink for CsvSink {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn append(&mut self, row: &ChatRow) -> Result<RowHandle> {
        let record = self.options.layout.record(row);
        if self.writer.is_none() {
            self.reopen()?;
        }
        if let Some(writer) = self.writer.as_mut() {
            writer.write_record(&record)?;
            writer.flush()?;
        }
        self.rows.push(record);
        Ok(RowHandle((self.rows.len() - 1 - self.first_own_row) as u64))
    }

    fn update_status(&mut self, handle: RowHandle, status: &str, actor: &str) -> Result<()> {
        let Some(column) = self.options.layout.status_column() else {
            debug!("CSV layout has no status column; update ignored");
            return Ok(());
        };
        let index = self.first_own_row + handle.0 as usize;
        let Some(record) = self.rows.get_mut(index) else {
            return Ok(());
        };
        if record.len() <= column {
            record.resize(column + 1, String::new());
        }
        record[column] = status_label(status, actor);
        self.rewrite()
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}
