//! Output layout and sink wiring.
//!
//! Files land under the logs directory:
//!
//! ```text
//! Logs/
//! ├── TXT/chat [20250301_123000].log
//! ├── ChatDatabase/chat [20250301_123000].db
//! ├── Chat Principal CSV/chat.csv            (chat [TS].csv when versioned)
//! └── Chat principal com emotes/chat [20250301_123000].xlsx
//! ```

use crate::sink::{CsvLayout, CsvOptions, CsvSink, LogSink, SinkSet, SqliteSink, XlsxSink};
use crate::{Error, Result};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const TXT_DIR: &str = "TXT";
pub const DB_DIR: &str = "ChatDatabase";
pub const CSV_DIR: &str = "Chat Principal CSV";
pub const XLSX_DIR: &str = "Chat principal com emotes";

#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub logs_dir: PathBuf,
    /// Explicit CSV path; wins over the default and versioned names.
    pub csv_file: Option<PathBuf>,
    pub csv_delimiter: u8,
    pub csv_layout: CsvLayout,
    /// Timestamped CSV name instead of the shared `chat.csv`.
    pub versioned: bool,
    pub log: bool,
    pub db: bool,
    pub csv: bool,
    pub xlsx: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            logs_dir: PathBuf::from("Logs"),
            csv_file: None,
            csv_delimiter: b',',
            csv_layout: CsvLayout::Moderation,
            versioned: false,
            log: true,
            db: true,
            csv: true,
            xlsx: true,
        }
    }
}

/// Parse a one-byte delimiter such as `,`, `;` or `\t`.
pub fn parse_delimiter(value: &str) -> Result<u8> {
    match value {
        "\\t" | "tab" => Ok(b'\t'),
        v if v.len() == 1 && v.is_ascii() => Ok(v.as_bytes()[0]),
        v => Err(Error::Config(format!(
            "CSV delimiter must be a single ASCII character, got `{v}`"
        ))),
    }
}

/// Where each enabled sink writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub log: Option<PathBuf>,
    pub db: Option<PathBuf>,
    pub csv: Option<PathBuf>,
    pub xlsx: Option<PathBuf>,
}

impl OutputPaths {
    /// Resolve file names for a session started at `started`, creating the
    /// directories they live in.
    pub fn resolve(options: &OutputOptions, started: DateTime<Local>) -> Result<Self> {
        let stamp = started.format("%Y%m%d_%H%M%S").to_string();
        let timestamped = |dir: &str, ext: &str| options.logs_dir.join(dir).join(format!("chat [{stamp}].{ext}"));

        let paths = Self {
            log: options.log.then(|| timestamped(TXT_DIR, "log")),
            db: options.db.then(|| timestamped(DB_DIR, "db")),
            csv: options.csv.then(|| match &options.csv_file {
                Some(path) => path.clone(),
                None if options.versioned => timestamped(CSV_DIR, "csv"),
                None => options.logs_dir.join(CSV_DIR).join("chat.csv"),
            }),
            xlsx: options.xlsx.then(|| timestamped(XLSX_DIR, "xlsx")),
        };

        for path in paths.iter() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(paths)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        [&self.log, &self.db, &self.csv, &self.xlsx]
            .into_iter()
            .filter_map(|p| p.as_deref())
    }

    pub fn log_summary(&self) {
        let show = |p: &Option<PathBuf>| {
            p.as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(disabled)".to_string())
        };
        info!(
            "Files will be saved to:\n  Log : {}\n  CSV : {}\n  DB  : {}\n  XLSX: {}",
            show(&self.log),
            show(&self.csv),
            show(&self.db),
            show(&self.xlsx)
        );
    }

    /// Open every configured sink. A sink that cannot be opened (locked
    /// file, bad path) is left out with a warning; capture goes on with
    /// the rest.
    pub fn open_sinks(&self, options: &OutputOptions) -> SinkSet {
        let mut sinks = SinkSet::new();

        if let Some(path) = &self.log {
            attach(&mut sinks, "log", LogSink::open(path));
        }
        if let Some(path) = &self.db {
            attach(&mut sinks, "sqlite", SqliteSink::open(path));
        }
        if let Some(path) = &self.csv {
            let csv = CsvOptions {
                layout: options.csv_layout,
                delimiter: options.csv_delimiter,
                bom: true,
            };
            attach(&mut sinks, "csv", CsvSink::open(path, csv));
        }
        if let Some(path) = &self.xlsx {
            attach(&mut sinks, "xlsx", XlsxSink::create(path));
        }
        sinks
    }
}

fn attach<S>(sinks: &mut SinkSet, name: &str, opened: Result<S>)
where
    S: crate::sink::Sink + Send + 'static,
{
    match opened {
        Ok(sink) => sinks.push(sink),
        Err(err) => warn!("{} output disabled: {}", name, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn started() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn default_layout() {
        let dir = tempfile::tempdir().unwrap();
        let options = OutputOptions {
            logs_dir: dir.path().join("Logs"),
            ..OutputOptions::default()
        };
        let paths = OutputPaths::resolve(&options, started()).unwrap();
        let logs = dir.path().join("Logs");

        assert_eq!(paths.log, Some(logs.join("TXT").join("chat [20250301_123000].log")));
        assert_eq!(paths.db, Some(logs.join("ChatDatabase").join("chat [20250301_123000].db")));
        assert_eq!(paths.csv, Some(logs.join("Chat Principal CSV").join("chat.csv")));
        assert_eq!(
            paths.xlsx,
            Some(logs.join("Chat principal com emotes").join("chat [20250301_123000].xlsx"))
        );
        assert!(logs.join("TXT").is_dir());
        assert!(logs.join("Chat principal com emotes").is_dir());
    }

    #[test]
    fn versioned_and_explicit_csv() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = OutputOptions {
            logs_dir: dir.path().to_path_buf(),
            versioned: true,
            log: false,
            db: false,
            xlsx: false,
            ..OutputOptions::default()
        };
        let paths = OutputPaths::resolve(&options, started()).unwrap();
        assert_eq!(paths.csv, Some(dir.path().join(CSV_DIR).join("chat [20250301_123000].csv")));
        assert_eq!(paths.iter().count(), 1);

        options.csv_file = Some(dir.path().join("override.csv"));
        let paths = OutputPaths::resolve(&options, started()).unwrap();
        assert_eq!(paths.csv, Some(dir.path().join("override.csv")));
    }

    #[test]
    fn delimiters() {
        assert_eq!(parse_delimiter(",").unwrap(), b',');
        assert_eq!(parse_delimiter(";").unwrap(), b';');
        assert_eq!(parse_delimiter("\\t").unwrap(), b'\t');
        assert!(parse_delimiter(";;").is_err());
        assert!(parse_delimiter("é").is_err());
    }

    #[test]
    fn unopenable_sink_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let options = OutputOptions {
            logs_dir: dir.path().to_path_buf(),
            ..OutputOptions::default()
        };
        let mut paths = OutputPaths::resolve(&options, started()).unwrap();
        // a directory where the database file should be
        let blocked = dir.path().join("blocked.db");
        std::fs::create_dir(&blocked).unwrap();
        paths.db = Some(blocked);

        let sinks = paths.open_sinks(&options);
        assert_eq!(sinks.active(), vec!["log", "csv", "xlsx"]);
    }
}
