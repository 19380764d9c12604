use crate::api::MetricSink;
use crate::client::Config;
use crate::model::{
    Attributes, MetricsSummary, PerformanceMetric, QueryMetricsSummary, QueryPerformanceMetric,
};
use crate::time::Clock;
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender};
use log::{error, trace, warn};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

struct BatcherShared {
    queue: Mutex<Vec<PerformanceMetric>>,
    query_metrics: Mutex<Vec<QueryPerformanceMetric>>,
    sink: Box<dyn MetricSink>,
    clock: Arc<dyn Clock>,
    collection: String,
    batch_size: usize,
    max_buffered: Option<usize>,
    enabled: AtomicBool,
    session_id: String,
    service: String,
    env: Option<String>,
}

/// Buffers flat measurements and flushes them to the sink in bounded
/// batches. Recording never blocks; sink traffic runs on a dedicated worker
/// thread fed through an unbounded channel.
#[derive(Clone)]
pub struct MetricBatcher {
    shared: Arc<BatcherShared>,
    flush_tx: Sender<()>,
}

impl MetricBatcher {
    pub fn new(
        config: &Config,
        sink: Box<dyn MetricSink>,
        clock: Arc<dyn Clock>,
        session_id: String,
    ) -> MetricBatcher {
        let shared = Arc::new(BatcherShared {
            queue: Mutex::new(Vec::new()),
            query_metrics: Mutex::new(Vec::new()),
            sink,
            clock,
            collection: config.metrics_collection.clone(),
            batch_size: config.batch_size.max(1),
            max_buffered: config.max_buffered_metrics,
            enabled: AtomicBool::new(config.enabled),
            session_id,
            service: config.service.clone(),
            env: config.env.clone(),
        });

        let (flush_tx, flush_rx) = crossbeam_channel::unbounded();
        let worker_shared = shared.clone();
        std::thread::spawn(move || {
            flush_worker(worker_shared, flush_rx);
        });

        MetricBatcher { shared, flush_tx }
    }

    /// Appends one metric, enriched with the session identity. Triggers an
    /// asynchronous flush once the queue reaches the batch threshold.
    pub fn record_metric(
        &self,
        name: &str,
        value: f64,
        unit: &str,
        metadata: Option<Attributes>,
    ) {
        if !self.shared.enabled.load(Ordering::Relaxed) {
            return;
        }

        let mut meta = metadata.unwrap_or_default();
        meta.insert(
            "session_id".to_string(),
            Value::from(self.shared.session_id.clone()),
        );
        meta.insert(
            "service".to_string(),
            Value::from(self.shared.service.clone()),
        );
        if let Some(env) = &self.shared.env {
            meta.insert("env".to_string(), Value::from(env.clone()));
        }

        let metric = PerformanceMetric {
            metric_name: name.to_string(),
            metric_value: value,
            metric_unit: unit.to_string(),
            metadata: meta,
            created_at: Utc::now(),
        };

        let should_flush = {
            let mut queue = self.shared.queue.lock().unwrap();
            queue.push(metric);
            queue.len() >= self.shared.batch_size
        };

        if should_flush {
            // Worker may already be gone at shutdown; the batch then leaves
            // with the final drain or a force_flush.
            let _ = self.flush_tx.send(());
        }
    }

    /// Flushes the current queue on the caller's thread. Same take/re-queue
    /// semantics as the automatic flush.
    pub fn force_flush(&self) {
        flush_once(&self.shared);
    }

    /// Times an async operation and records a metric tagged with its
    /// outcome. The result, success or failure, passes through unchanged.
    pub async fn measure_async<T, E, F, Fut>(&self, name: &str, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let start = self.shared.clock.now_ms();
        let result = op().await;
        self.record_measurement(name, start, &result);
        result
    }

    /// Synchronous counterpart of [`measure_async`](Self::measure_async).
    pub fn measure_sync<T, E, F>(&self, name: &str, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: Display,
    {
        let start = self.shared.clock.now_ms();
        let result = op();
        self.record_measurement(name, start, &result);
        result
    }

    fn record_measurement<T, E: Display>(&self, name: &str, start: f64, result: &Result<T, E>) {
        let duration = self.shared.clock.now_ms() - start;
        let mut meta = Attributes::new();
        meta.insert("success".to_string(), Value::from(result.is_ok()));
        if let Err(err) = result {
            meta.insert("error".to_string(), Value::from(err.to_string()));
        }
        self.record_metric(name, duration, "ms", Some(meta));
    }

    /// Records one intercepted query: a flat metric named after the call
    /// plus an entry in the list behind [`query_metrics_summary`](Self::query_metrics_summary).
    pub fn record_query_performance(
        &self,
        query: &str,
        duration_ms: f64,
        success: bool,
        row_count: Option<u64>,
    ) {
        if !self.shared.enabled.load(Ordering::Relaxed) {
            return;
        }

        self.shared
            .query_metrics
            .lock()
            .unwrap()
            .push(QueryPerformanceMetric {
                query: query.to_string(),
                duration_ms,
                timestamp: Utc::now(),
                success,
                row_count,
            });

        let mut meta = Attributes::new();
        meta.insert("success".to_string(), Value::from(success));
        if let Some(rows) = row_count {
            meta.insert("row_count".to_string(), Value::from(rows));
        }
        self.record_metric(query, duration_ms, "ms", Some(meta));
    }

    /// Mean, median and p95 per metric name over the buffered queue.
    ///
    /// Median is `sorted[n / 2]`; p95 is `sorted[floor(n * 0.95)]`. Both
    /// keep their small-n bias on purpose: summaries must agree across
    /// ports of this component.
    pub fn metrics_summary(&self) -> MetricsSummary {
        let queue = self.shared.queue.lock().unwrap();

        let mut by_name: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for metric in queue.iter() {
            by_name
                .entry(metric.metric_name.clone())
                .or_default()
                .push(metric.metric_value);
        }

        let mut averages = BTreeMap::new();
        let mut medians = BTreeMap::new();
        let mut p95 = BTreeMap::new();

        for (name, mut values) in by_name {
            values.sort_by(|a, b| a.total_cmp(b));
            let sum: f64 = values.iter().sum();
            averages.insert(name.clone(), sum / values.len() as f64);
            medians.insert(name.clone(), values[values.len() / 2]);
            let idx = (values.len() as f64 * 0.95).floor() as usize;
            p95.insert(name, values[idx]);
        }

        MetricsSummary {
            total_metrics: queue.len(),
            averages,
            medians,
            p95,
        }
    }

    /// Totals, mean duration, success rate and the top-10 slowest over every
    /// query recorded this session.
    pub fn query_metrics_summary(&self) -> QueryMetricsSummary {
        let query_metrics = self.shared.query_metrics.lock().unwrap();
        if query_metrics.is_empty() {
            return QueryMetricsSummary {
                total_queries: 0,
                average_duration_ms: 0.0,
                success_rate: 0.0,
                slowest_queries: Vec::new(),
            };
        }

        let total_duration: f64 = query_metrics.iter().map(|m| m.duration_ms).sum();
        let success_count = query_metrics.iter().filter(|m| m.success).count();

        let mut slowest = query_metrics.clone();
        slowest.sort_by(|a, b| b.duration_ms.total_cmp(&a.duration_ms));
        slowest.truncate(10);

        QueryMetricsSummary {
            total_queries: query_metrics.len(),
            average_duration_ms: total_duration / query_metrics.len() as f64,
            success_rate: success_count as f64 / query_metrics.len() as f64 * 100.0,
            slowest_queries: slowest,
        }
    }

    pub fn buffered_metrics(&self) -> Vec<PerformanceMetric> {
        self.shared.queue.lock().unwrap().clone()
    }

    pub fn query_metrics(&self) -> Vec<QueryPerformanceMetric> {
        self.shared.query_metrics.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.shared.queue.lock().unwrap().clear();
        self.shared.query_metrics.lock().unwrap().clear();
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }
}

fn flush_worker(shared: Arc<BatcherShared>, rx: Receiver<()>) {
    loop {
        match rx.recv() {
            Ok(()) => flush_once(&shared),
            Err(_) => {
                // All handles dropped; drain whatever is left and exit.
                flush_once(&shared);
                warn!("metric flush channel disconnected, worker exiting");
                return;
            }
        }
    }
}

fn flush_once(shared: &BatcherShared) {
    let batch = {
        let mut queue = shared.queue.lock().unwrap();
        if queue.is_empty() {
            return;
        }
        std::mem::take(&mut *queue)
    };

    trace!("flushing {} metrics to {}", batch.len(), shared.collection);

    if let Err(err) = shared.sink.insert_batch(&shared.collection, &batch) {
        error!("failed to flush {} metrics: {}", batch.len(), err);
        let mut queue = shared.queue.lock().unwrap();
        // Put the failed batch back in front of anything recorded since the
        // take, so retry order matches record order.
        let mut restored = batch;
        restored.append(&mut queue);
        *queue = restored;

        if let Some(cap) = shared.max_buffered {
            if queue.len() > cap {
                let excess = queue.len() - cap;
                queue.drain(..excess);
                warn!("metric buffer over cap, dropped {} oldest entries", excess);
            }
        }
    }
}
