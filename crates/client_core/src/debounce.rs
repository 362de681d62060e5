use std::time::Duration;

use tokio::{sync::watch, task::JoinHandle};

pub const SEARCH_DEBOUNCE_DELAY: Duration = Duration::from_millis(400);

/// Two views of one search box: the raw text, updated on every keystroke
/// for the input's own display, and a settled projection that only
/// propagates once the text has been stable for the configured delay, so
/// rapid typing does not trigger a fetch per key.
///
/// The settled value travels through a watch channel; a fetch trigger
/// subscribes and keys its requests on changes.
pub struct SearchDebouncer {
    raw: String,
    delay: Duration,
    settled_tx: watch::Sender<String>,
    settled_rx: watch::Receiver<String>,
    pending: Option<JoinHandle<()>>,
}

impl SearchDebouncer {
    pub fn new(delay: Duration) -> Self {
        let (settled_tx, settled_rx) = watch::channel(String::new());
        Self {
            raw: String::new(),
            delay,
            settled_tx,
            settled_rx,
            pending: None,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn settled(&self) -> String {
        self.settled_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.settled_tx.subscribe()
    }

    /// Records a keystroke. Any flush still waiting on an earlier
    /// keystroke is aborted, so only the last value within a burst is
    /// ever published.
    pub fn input(&mut self, text: impl Into<String>) {
        self.raw = text.into();
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        let tx = self.settled_tx.clone();
        let value = self.raw.clone();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(value);
        }));
    }

    /// Publishes the raw value immediately (an explicit submit).
    pub fn flush(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        let _ = self.settled_tx.send(self.raw.clone());
    }
}

impl Default for SearchDebouncer {
    fn default() -> Self {
        Self::new(SEARCH_DEBOUNCE_DELAY)
    }
}

impl Drop for SearchDebouncer {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/debounce_tests.rs"]
mod tests;
