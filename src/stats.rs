//! Session counters and process resource logging.

use crate::sequencer::Applied;
use sysinfo::{Pid, ProcessesToUpdate, System, get_current_pid};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub batches: usize,
    pub events: usize,
    pub appended: usize,
    pub updated: usize,
    pub duplicates: usize,
}

impl SessionStats {
    pub fn record(&mut self, applied: Applied) {
        self.events += 1;
        match applied {
            Applied::Skipped => self.duplicates += 1,
            Applied::Appended(_) => self.appended += 1,
            Applied::Updated(_) => self.updated += 1,
        }
    }
}

/// Logs CPU and memory usage of the capture process.
pub struct ResourceMonitor {
    sys: System,
    pid: Option<Pid>,
}

impl ResourceMonitor {
    pub fn new() -> Self {
        Self {
            sys: System::new(),
            pid: get_current_pid().ok(),
        }
    }

    pub fn log_usage(&mut self) {
        let Some(pid) = self.pid else {
            return;
        };
        self.sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        match self.sys.process(pid) {
            Some(process) => debug!(
                "💻 Process - CPU: {:.2}%, Memory: {} KB",
                process.cpu_usage(),
                process.memory() / 1024
            ),
            None => debug!("Could not retrieve process info."),
        }
    }
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RowHandle;

    #[test]
    fn counts_each_outcome() {
        let mut stats = SessionStats::default();
        stats.record(Applied::Appended(RowHandle(0)));
        stats.record(Applied::Skipped);
        stats.record(Applied::Updated(RowHandle(0)));
        stats.record(Applied::Appended(RowHandle(1)));
        assert_eq!(
            stats,
            SessionStats {
                batches: 0,
                events: 4,
                appended: 2,
                updated: 1,
                duplicates: 1,
            }
        );
    }
}
