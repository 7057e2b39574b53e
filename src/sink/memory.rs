use super::{RowHandle, Sink};
use crate::Result;
use crate::event::ChatRow;
use std::sync::{Arc, Mutex};

/// Keeps every row in memory. Clones of [`MemorySink::rows`] observe the
/// same storage, which is how tests read back what a session wrote.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    rows: Arc<Mutex<Vec<ChatRow>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Arc<Mutex<Vec<ChatRow>>> {
        Arc::clone(&self.rows)
    }

    pub fn snapshot(&self) -> Vec<ChatRow> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }
}

impl Sink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn append(&mut self, row: &ChatRow) -> Result<RowHandle> {
        let mut rows = self
            .rows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        rows.push(row.clone());
        Ok(RowHandle(rows.len() as u64 - 1))
    }

    fn update_status(&mut self, handle: RowHandle, status: &str, actor: &str) -> Result<()> {
        let mut rows = self
            .rows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(row) = rows.get_mut(handle.0 as usize) {
            row.status = status.to_string();
            row.actor = actor.to_string();
        }
        Ok(())
    }
}
