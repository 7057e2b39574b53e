// src/main.rs
use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tokio::{signal, sync::watch, time::Duration};
use tracing_subscriber::EnvFilter;
use ytchatx_capture::{
    CaptureSession, SinkSet,
    config::{OutputOptions, OutputPaths, parse_delimiter},
    mirror::ChatMirror,
    sink::CsvLayout,
    source::{ApiConfig, ApiSource, BrowserSource, BrowserSourceConfig, EventSource},
};

#[derive(Parser)]
#[command(name = "ytchatx-capture", version, about = "Capture YouTube live chat to log, SQLite, CSV and XLSX")]
struct Cli {
    #[command(subcommand)]
    mode: Mode,

    #[command(flatten)]
    output: OutputArgs,

    /// Debug logging for this crate
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Mode {
    /// Poll the YouTube Live Chat Messages API
    Api {
        #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true)]
        api_key: String,

        /// Video id or full watch URL
        #[arg(long, env = "YOUTUBE_VIDEO_ID")]
        video: Option<String>,

        #[arg(long, env = "YOUTUBE_LIVE_CHAT_ID")]
        live_chat_id: Option<String>,

        #[arg(long, env = "CHAT_ID_CACHE_FILE", default_value = "chat_id.cache")]
        cache_file: PathBuf,

        /// Seconds between polls
        #[arg(long, default_value_t = 18)]
        interval: u64,
    },
    /// Drive Chromium and scrape the rendered chat
    Browser {
        /// Watch page or live_chat URL
        #[arg(long, env = "YOUTUBE_URL", conflicts_with = "video")]
        url: Option<String>,

        /// Video id or full watch URL
        #[arg(long)]
        video: Option<String>,

        /// Seconds between reads of the observer queue
        #[arg(long, env = "POLL_INTERVAL", default_value_t = 2)]
        interval: u64,

        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },
}

#[derive(Args)]
struct OutputArgs {
    #[arg(long, global = true, default_value = "Logs")]
    logs_dir: PathBuf,

    #[arg(long, global = true, env = "CHAT_CSV_FILE")]
    csv_file: Option<PathBuf>,

    #[arg(long, global = true, env = "CHAT_CSV_DELIMITER", default_value = ",")]
    csv_delimiter: String,

    #[arg(long, global = true, value_enum, default_value_t = CsvColumns::Moderation)]
    csv_layout: CsvColumns,

    /// Timestamped CSV file name instead of chat.csv
    #[arg(long, global = true)]
    versioned: bool,

    #[arg(long, global = true)]
    no_log: bool,

    #[arg(long, global = true)]
    no_db: bool,

    #[arg(long, global = true)]
    no_csv: bool,

    #[arg(long, global = true)]
    no_xlsx: bool,

    /// Print captured messages to the console
    #[arg(long, global = true)]
    mirror: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum CsvColumns {
    /// AUTHOR,MESSAGE
    Simple,
    /// time,name,message,delete?
    Moderation,
}

impl OutputArgs {
    fn options(&self) -> Result<OutputOptions> {
        Ok(OutputOptions {
            logs_dir: self.logs_dir.clone(),
            csv_file: self.csv_file.clone(),
            csv_delimiter: parse_delimiter(&self.csv_delimiter)?,
            csv_layout: match self.csv_layout {
                CsvColumns::Simple => CsvLayout::AuthorMessage,
                CsvColumns::Moderation => CsvLayout::Moderation,
            },
            versioned: self.versioned,
            log: !self.no_log,
            db: !self.no_db,
            csv: !self.no_csv,
            xlsx: !self.no_xlsx,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let crate_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new(format!("info,ytchatx_capture={crate_level}"))
            }),
        )
        .init();

    let options = cli.output.options()?;
    let paths = OutputPaths::resolve(&options, Local::now()).context("creating output directories")?;
    paths.log_summary();
    let sinks = paths.open_sinks(&options);
    if sinks.is_empty() {
        tracing::warn!("No output could be opened; messages will only be logged");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(handle_signals(shutdown_tx));

    let mirror = if cli.output.mirror {
        let (mirror, _task) = ChatMirror::spawn_console();
        Some(mirror)
    } else {
        None
    };

    match cli.mode {
        Mode::Api {
            api_key,
            video,
            live_chat_id,
            cache_file,
            interval,
        } => {
            if video.is_none() && live_chat_id.is_none() {
                bail!("API key and either a live chat id or a video id must be provided");
            }
            let config = ApiConfig {
                video_id: video,
                live_chat_id,
                cache_file: Some(cache_file),
                ..ApiConfig::new(api_key)
            };
            let source = ApiSource::connect(config)
                .await
                .context("resolving the live chat")?;
            run(source, sinks, interval, mirror, shutdown_rx).await?;
        }
        Mode::Browser {
            url,
            video,
            interval,
            headed,
        } => {
            let config = match (url, video) {
                (Some(url), _) => BrowserSourceConfig { url, headed },
                (None, Some(video)) => BrowserSourceConfig::for_video(&video, headed),
                (None, None) => bail!("either --url or --video must be provided"),
            };
            let source = BrowserSource::launch(config)
                .await
                .context("launching the browser")?;
            let mut session = build_session(source, sinks, interval, mirror);
            let outcome = session.run(shutdown_rx).await;
            session.into_source().close().await;
            outcome?;
        }
    }

    Ok(())
}

fn build_session<S: EventSource>(
    source: S,
    sinks: SinkSet,
    interval: u64,
    mirror: Option<ChatMirror>,
) -> CaptureSession<S> {
    let session = CaptureSession::new(source, sinks, Duration::from_secs(interval));
    match mirror {
        Some(mirror) => session.with_mirror(mirror),
        None => session,
    }
}

async fn run<S: EventSource>(
    source: S,
    sinks: SinkSet,
    interval: u64,
    mirror: Option<ChatMirror>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    build_session(source, sinks, interval, mirror).run(shutdown).await?;
    Ok(())
}

async fn handle_signals(shutdown: watch::Sender<bool>) {
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", err);
        return;
    }
    tracing::info!("Shutdown signal received, flushing outputs...");
    shutdown.send_replace(true);
}
