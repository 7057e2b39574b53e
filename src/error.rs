//! Error types for chat capture.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by event sources and sinks.
///
/// The sequencer itself never fails; everything here comes from I/O at the
/// edges of a capture session.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Delimited file error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Spreadsheet writer error.
    #[error("XLSX error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Browser automation (CDP) error.
    #[error("Browser error: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),

    /// The YouTube API answered with an error payload.
    #[error("YouTube API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The video exists but has no active live chat.
    #[error("no active live chat for video `{0}`")]
    NoLiveChat(String),

    /// The injected chat observer could not be installed or read.
    #[error("chat observer error: {0}")]
    Script(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}
