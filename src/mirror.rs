//! Console mirror of captured messages.
//!
//! Notifications are fire-and-forget: the capture loop never waits for the
//! display, and a full or closed channel simply drops the line.

use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct ChatMirror {
    tx: Sender<(String, String)>,
}

impl ChatMirror {
    /// A mirror plus the receiving end, for callers that render lines themselves.
    pub fn channel() -> (Self, Receiver<(String, String)>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (Self { tx }, rx)
    }

    /// Spawn a task printing `author: text` lines to stdout.
    pub fn spawn_console() -> (Self, JoinHandle<()>) {
        let (mirror, mut rx) = Self::channel();
        let task = tokio::spawn(async move {
            while let Some((author, text)) = rx.recv().await {
                println!("💬 {author}: {text}");
            }
        });
        (mirror, task)
    }

    pub fn notify(&self, author: &str, text: &str) {
        match self.tx.try_send((author.to_string(), text.to_string())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("Mirror is behind, line dropped"),
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_order_and_survives_closed_receiver() {
        let (mirror, mut rx) = ChatMirror::channel();
        mirror.notify("alice", "hi");
        mirror.notify("bob", "yo");
        assert_eq!(rx.recv().await, Some(("alice".into(), "hi".into())));
        assert_eq!(rx.recv().await, Some(("bob".into(), "yo".into())));

        drop(rx);
        mirror.notify("carol", "nobody listening");
    }
}
