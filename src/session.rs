//! The capture loop: source → sequencer → sinks.

use crate::Result;
use crate::event::ChatEvent;
use crate::mirror::ChatMirror;
use crate::sequencer::{Applied, Sequencer};
use crate::sink::{Sink, SinkSet};
use crate::source::{EventSource, RetryPolicy};
use crate::stats::{ResourceMonitor, SessionStats};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// One capture session. Owns the only copy of the slot table, so nothing
/// here needs locking.
pub struct CaptureSession<S> {
    source: S,
    sequencer: Sequencer,
    sinks: SinkSet,
    mirror: Option<ChatMirror>,
    poll_interval: Duration,
    retry: RetryPolicy,
    stats: SessionStats,
    monitor: ResourceMonitor,
}

impl<S: EventSource> CaptureSession<S> {
    pub fn new(source: S, sinks: SinkSet, poll_interval: Duration) -> Self {
        Self {
            source,
            sequencer: Sequencer::new(),
            sinks,
            mirror: None,
            poll_interval,
            retry: RetryPolicy::default(),
            stats: SessionStats::default(),
            monitor: ResourceMonitor::new(),
        }
    }

    pub fn with_mirror(mut self, mirror: ChatMirror) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_source(self) -> S {
        self.source
    }

    /// Run events through the sequencer and into the sinks, in capture order.
    pub fn process_batch(&mut self, batch: Vec<ChatEvent>) {
        self.stats.batches += 1;
        for event in batch {
            self.process_event(event);
        }
    }

    fn process_event(&mut self, event: ChatEvent) {
        let kind = event.kind;
        let author = event.author.clone();
        let text = event.text.clone();
        let status = event.status.clone();

        let applied = match self.sequencer.apply(event, &mut self.sinks) {
            Ok(applied) => applied,
            Err(err) => {
                warn!("{} from {} not written: {}", kind.as_str(), author, err);
                return;
            }
        };

        match applied {
            Applied::Skipped => debug!("Duplicate {} skipped", kind.as_str()),
            Applied::Appended(_) => {
                if status.is_empty() {
                    info!("{}: {}", author, text);
                } else {
                    info!("[{}] {}: {}", status, author, text);
                }
                if let Some(mirror) = &self.mirror {
                    if !text.is_empty() {
                        mirror.notify(&author, &text);
                    }
                }
            }
            Applied::Updated(handle) => {
                info!("[{}] {} row {:?} updated", status, kind.as_str(), handle)
            }
        }
        self.stats.record(applied);
    }

    /// Poll until `shutdown` flips to `true` or the source fails for good.
    ///
    /// Sinks are flushed after every cycle and closed on every way out.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<SessionStats> {
        info!("Starting {} chat session...", self.source.name());
        let outcome = self.poll_loop(&mut shutdown).await;

        self.sinks.close();
        let stats = self.stats;
        info!(
            "Session finished: {} events, {} rows, {} updates, {} duplicates",
            stats.events, stats.appended, stats.updated, stats.duplicates
        );
        outcome.map(|_| stats)
    }

    async fn poll_loop(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<()> {
        while !*shutdown.borrow() {
            match self.retry.fetch(&mut self.source).await {
                Ok(batch) => {
                    if !batch.is_empty() {
                        debug!("{} events fetched", batch.len());
                    }
                    self.process_batch(batch);
                }
                Err(err) => {
                    error!("{} fetch failed after retries: {}", self.source.name(), err);
                    if self.source.reset().await {
                        warn!("{} source reset, capture continues", self.source.name());
                    } else {
                        return Err(err);
                    }
                }
            }

            if let Err(err) = self.sinks.flush() {
                warn!("Flush failed: {}", err);
            }
            self.monitor.log_usage();

            tokio::select! {
                _ = sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // sender dropped: nobody can ask us to stop any more
                        sleep(self.poll_interval).await;
                    }
                }
            }
        }
        info!("Graceful shutdown triggered");
        Ok(())
    }
}
