use crate::api::{HttpSink, MetricSink};
use crate::interceptor::{MonitoredClient, TableOps};
use crate::metrics::MetricBatcher;
use crate::model::{
    Attributes, ErrorInfo, MetricsSummary, QueryMetricsSummary, QueryStats, Span, SpanId,
    SpanStatus, TraceId,
};
use crate::querylog::{QueryLog, DEFAULT_CAPACITY, DEFAULT_SLOW_THRESHOLD_MS};
use crate::time::{Clock, MonotonicClock};
use crate::trace::{Trace, TraceCollector};
use chrono::Utc;
use serde_json::{json, Value};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

/// Configuration settings for the monitor.
#[derive(Clone, Debug)]
pub struct Config {
    /// Name of the instrumented application, stamped on every metric.
    pub service: String,
    /// Deployment environment, stamped on every metric when set.
    pub env: Option<String>,
    /// Metrics collector host/ip, defaults to `localhost`.
    pub host: String,
    /// Metrics collector port, defaults to `4318`.
    pub port: String,
    /// Collection name metric batches are written under.
    pub metrics_collection: String,
    /// Queue length that triggers an automatic flush.
    pub batch_size: usize,
    /// Optional cap on the buffered queue after a failed flush; `None`
    /// retries forever without dropping.
    pub max_buffered_metrics: Option<usize>,
    /// Capacity of the query-stats ring.
    pub query_log_capacity: usize,
    /// Threshold used by [`Monitor::slow_queries`].
    pub slow_query_threshold_ms: f64,
    /// Turn recording on or off at construction.
    pub enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            service: String::new(),
            env: None,
            host: "localhost".to_string(),
            port: "4318".to_string(),
            metrics_collection: "performance_metrics".to_string(),
            batch_size: 10,
            max_buffered_metrics: None,
            query_log_capacity: DEFAULT_CAPACITY,
            slow_query_threshold_ms: DEFAULT_SLOW_THRESHOLD_MS,
            enabled: true,
        }
    }
}

struct MonitorInner {
    config: Config,
    clock: Arc<dyn Clock>,
    batcher: MetricBatcher,
    collector: TraceCollector,
    query_log: QueryLog,
}

/// Application-wide monitoring context: one batcher, one trace collector,
/// one query log, wired together and passed by handle wherever
/// instrumentation is needed. Cloning shares the same state.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

impl Monitor {
    /// Builds a monitor flushing to the HTTP collector named in `config`.
    pub fn new(config: Config) -> Monitor {
        let endpoint = format!("http://{}:{}/v1", config.host, config.port);
        Monitor::with_sink(config, Box::new(HttpSink::new(endpoint)))
    }

    /// Builds a monitor over a caller-supplied sink.
    pub fn with_sink(config: Config, sink: Box<dyn MetricSink>) -> Monitor {
        Monitor::with_sink_and_clock(config, sink, Arc::new(MonotonicClock::new()))
    }

    /// Full dependency injection, used by tests that need exact durations.
    pub fn with_sink_and_clock(
        config: Config,
        sink: Box<dyn MetricSink>,
        clock: Arc<dyn Clock>,
    ) -> Monitor {
        let session_id = format!("session-{}", Utc::now().timestamp_micros());
        let batcher = MetricBatcher::new(&config, sink, clock.clone(), session_id);
        let collector = TraceCollector::new(batcher.clone(), clock.clone());
        let query_log = QueryLog::new(config.query_log_capacity);
        query_log.set_enabled(config.enabled);

        Monitor {
            inner: Arc::new(MonitorInner {
                config,
                clock,
                batcher,
                collector,
                query_log,
            }),
        }
    }

    /// Wraps a table client so every call is timed, logged and traced.
    /// The wrapper exposes the same [`TableOps`] surface as `client`.
    pub fn wrap_client<C: TableOps>(&self, client: C) -> MonitoredClient<C> {
        MonitoredClient::new(client, self.clone())
    }

    // ---- metrics ----

    pub fn record_metric(&self, name: &str, value: f64, unit: &str, metadata: Option<Attributes>) {
        self.inner.batcher.record_metric(name, value, unit, metadata);
    }

    pub async fn measure_async<T, E, F, Fut>(&self, name: &str, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.inner.batcher.measure_async(name, op).await
    }

    pub fn measure_sync<T, E, F>(&self, name: &str, op: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: Display,
    {
        self.inner.batcher.measure_sync(name, op)
    }

    pub fn force_flush(&self) {
        self.inner.batcher.force_flush();
    }

    pub fn metrics_summary(&self) -> MetricsSummary {
        self.inner.batcher.metrics_summary()
    }

    pub fn query_metrics_summary(&self) -> QueryMetricsSummary {
        self.inner.batcher.query_metrics_summary()
    }

    /// Session id, buffered metrics, query metrics and both summaries as
    /// pretty JSON, for offline inspection.
    pub fn export_metrics(&self) -> String {
        let doc = json!({
            "session_id": self.inner.batcher.session_id(),
            "metrics": self.inner.batcher.buffered_metrics(),
            "query_metrics": self.inner.batcher.query_metrics(),
            "summary": self.metrics_summary(),
            "query_summary": self.query_metrics_summary(),
        });
        serde_json::to_string_pretty(&doc).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn clear_metrics(&self) {
        self.inner.batcher.clear();
    }

    // ---- spans & traces ----

    pub fn start_span(
        &self,
        name: &str,
        attributes: Attributes,
        parent: Option<SpanId>,
    ) -> SpanId {
        self.inner.collector.start_span(name, attributes, parent)
    }

    pub fn end_span(&self, id: SpanId, status: SpanStatus, error: Option<ErrorInfo>) {
        self.inner.collector.end_span(id, status, error);
    }

    pub fn add_span_attribute(&self, id: SpanId, key: &str, value: Value) {
        self.inner.collector.add_span_attribute(id, key, value);
    }

    pub fn add_span_event(&self, id: SpanId, name: &str, attributes: Option<Attributes>) {
        self.inner.collector.add_span_event(id, name, attributes);
    }

    pub async fn trace_async<T, E, F, Fut>(
        &self,
        name: &str,
        attributes: Attributes,
        op: F,
    ) -> Result<T, E>
    where
        F: FnOnce(SpanId) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.inner.collector.trace_async(name, attributes, op).await
    }

    pub fn trace_sync<T, E, F>(&self, name: &str, attributes: Attributes, op: F) -> Result<T, E>
    where
        F: FnOnce(SpanId) -> Result<T, E>,
        E: Display,
    {
        self.inner.collector.trace_sync(name, attributes, op)
    }

    pub fn get_trace_tree(&self, id: TraceId) -> Option<Trace> {
        self.inner.collector.get_trace_tree(id)
    }

    pub fn visualize_trace(&self, id: TraceId) -> Option<String> {
        self.inner.collector.visualize_trace(id)
    }

    pub fn export_trace(&self, id: TraceId) -> Option<String> {
        self.inner.collector.export_trace(id)
    }

    pub fn active_spans(&self) -> Vec<Span> {
        self.inner.collector.active_spans()
    }

    pub fn completed_trace_ids(&self) -> Vec<TraceId> {
        self.inner.collector.completed_trace_ids()
    }

    pub fn clear_traces(&self) {
        self.inner.collector.clear_traces();
    }

    // ---- query log ----

    /// Entries slower than `Config.slow_query_threshold_ms`.
    pub fn slow_queries(&self) -> Vec<QueryStats> {
        self.inner
            .query_log
            .slow_queries(self.inner.config.slow_query_threshold_ms)
    }

    pub fn failed_queries(&self) -> Vec<QueryStats> {
        self.inner.query_log.failed_queries()
    }

    pub fn generate_query_report(&self) -> String {
        self.inner.query_log.generate_report()
    }

    // ---- shared ----

    /// Gates metric recording and query logging together. Spans keep their
    /// lifecycle either way; only their metrics are dropped while disabled.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.batcher.set_enabled(enabled);
        self.inner.query_log.set_enabled(enabled);
    }

    pub fn session_id(&self) -> &str {
        self.inner.batcher.session_id()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn metrics(&self) -> &MetricBatcher {
        &self.inner.batcher
    }

    pub fn trace_collector(&self) -> &TraceCollector {
        &self.inner.collector
    }

    pub fn query_log(&self) -> &QueryLog {
        &self.inner.query_log
    }

    pub(crate) fn now_ms(&self) -> f64 {
        self.inner.clock.now_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemorySink;
    use crate::time::ManualClock;

    fn monitor() -> Monitor {
        Monitor::with_sink_and_clock(
            Config {
                service: "doc-archive".to_string(),
                batch_size: 1000,
                ..Config::default()
            },
            Box::new(MemorySink::new()),
            Arc::new(ManualClock::new(0.0)),
        )
    }

    #[test]
    fn export_metrics_is_parseable_and_carries_session() {
        let m = monitor();
        m.record_metric("page_load", 1250.0, "ms", None);
        m.metrics().record_query_performance("docs.select", 42.0, true, Some(3));

        let doc: Value = serde_json::from_str(&m.export_metrics()).unwrap();
        assert!(doc["session_id"].as_str().unwrap().starts_with("session-"));
        assert_eq!(doc["metrics"].as_array().unwrap().len(), 2);
        assert_eq!(doc["query_metrics"].as_array().unwrap().len(), 1);
        assert_eq!(doc["summary"]["total_metrics"], 2);
        assert_eq!(doc["query_summary"]["total_queries"], 1);
    }

    #[test]
    fn clones_share_state() {
        let m = monitor();
        let other = m.clone();
        m.record_metric("fcp", 100.0, "ms", None);
        assert_eq!(other.metrics_summary().total_metrics, 1);
    }

    #[test]
    fn set_enabled_gates_metrics_and_query_log() {
        let m = monitor();
        m.set_enabled(false);
        m.record_metric("dropped", 1.0, "ms", None);
        m.query_log().log(QueryStats {
            query: "select on docs".to_string(),
            table: "docs".to_string(),
            operation: "select".to_string(),
            duration_ms: 1.0,
            timestamp: Utc::now(),
            success: true,
            row_count: None,
            error: None,
        });
        assert_eq!(m.metrics_summary().total_metrics, 0);
        assert!(m.query_log().is_empty());

        m.set_enabled(true);
        m.record_metric("kept", 1.0, "ms", None);
        assert_eq!(m.metrics_summary().total_metrics, 1);
    }

    #[test]
    fn facade_span_round_trip() {
        let m = monitor();
        let id = m.start_span("request", Attributes::new(), None);
        m.add_span_attribute(id, "page", Value::from("/dashboard"));
        m.end_span(id, SpanStatus::Success, None);

        let traces = m.completed_trace_ids();
        assert_eq!(traces.len(), 1);
        let rendered = m.visualize_trace(traces[0]).unwrap();
        assert!(rendered.contains("✓ request"));

        m.clear_traces();
        assert!(m.completed_trace_ids().is_empty());
    }

    #[test]
    fn slow_queries_use_configured_threshold() {
        let m = Monitor::with_sink_and_clock(
            Config {
                slow_query_threshold_ms: 100.0,
                ..Config::default()
            },
            Box::new(MemorySink::new()),
            Arc::new(ManualClock::new(0.0)),
        );
        for (query, duration) in [("fast", 50.0), ("slow", 150.0)] {
            m.query_log().log(QueryStats {
                query: query.to_string(),
                table: "docs".to_string(),
                operation: "select".to_string(),
                duration_ms: duration,
                timestamp: Utc::now(),
                success: true,
                row_count: None,
                error: None,
            });
        }
        let slow = m.slow_queries();
        assert_eq!(slow.len(), 1);
        assert_eq!(slow[0].query, "slow");
    }
}
