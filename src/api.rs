use crate::model::PerformanceMetric;
use crossbeam_channel::{Receiver, Sender};
use log::trace;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("sink rejected batch: {0}")]
    Rejected(String),

    #[error("encode error: {0}")]
    Encode(String),
}

/// Persistence boundary for flushed metric batches.
///
/// Implementations are treated as unreliable: a failed `insert_batch` is
/// logged and the batch re-queued by the caller, never surfaced to
/// application code.
pub trait MetricSink: Send + Sync {
    fn insert_batch(&self, collection: &str, rows: &[PerformanceMetric]) -> Result<(), SinkError>;
}

/// Sink that POSTs each batch as a JSON array to `{base_url}/{collection}`.
pub struct HttpSink {
    base_url: String,
}

impl HttpSink {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        HttpSink { base_url }
    }

    fn endpoint(&self, collection: &str) -> String {
        format!("{}/{}", self.base_url, collection)
    }
}

impl MetricSink for HttpSink {
    fn insert_batch(&self, collection: &str, rows: &[PerformanceMetric]) -> Result<(), SinkError> {
        let endpoint = self.endpoint(collection);
        let response = attohttpc::post(&endpoint)
            .json(&rows)
            .map_err(|e| SinkError::Encode(e.to_string()))?
            .send()
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        if response.is_success() {
            trace!("sent {} metrics to {}", rows.len(), endpoint);
            Ok(())
        } else {
            Err(SinkError::Rejected(format!(
                "{} returned status {}",
                endpoint,
                response.status()
            )))
        }
    }
}

/// In-process sink for tests and local development.
///
/// Records every accepted batch, can fail the next N calls on demand, and
/// signals each attempt on an optional channel so tests can wait for the
/// background flush worker deterministically.
pub struct MemorySink {
    batches: Mutex<Vec<(String, Vec<PerformanceMetric>)>>,
    fail_next: AtomicUsize,
    notify: Mutex<Option<Sender<usize>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink {
            batches: Mutex::new(Vec::new()),
            fail_next: AtomicUsize::new(0),
            notify: Mutex::new(None),
        }
    }

    /// Make the next `n` `insert_batch` calls fail with a transport error.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Returns a receiver that gets the row count of every subsequent
    /// `insert_batch` attempt, successful or not.
    pub fn subscribe(&self) -> Receiver<usize> {
        let (tx, rx) = crossbeam_channel::unbounded();
        *self.notify.lock().unwrap() = Some(tx);
        rx
    }

    pub fn batches(&self) -> Vec<(String, Vec<PerformanceMetric>)> {
        self.batches.lock().unwrap().clone()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub fn total_rows(&self) -> usize {
        self.batches.lock().unwrap().iter().map(|(_, b)| b.len()).sum()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        MemorySink::new()
    }
}

impl MetricSink for MemorySink {
    fn insert_batch(&self, collection: &str, rows: &[PerformanceMetric]) -> Result<(), SinkError> {
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        let result = if failing {
            Err(SinkError::Transport("injected failure".to_string()))
        } else {
            self.batches
                .lock()
                .unwrap()
                .push((collection.to_string(), rows.to_vec()));
            Ok(())
        };

        if let Some(tx) = self.notify.lock().unwrap().as_ref() {
            let _ = tx.send(rows.len());
        }
        result
    }
}
