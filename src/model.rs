use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Open key/value bag attached to spans and metrics.
pub type Attributes = serde_json::Map<String, Value>;

/// Handle to a span slot in the collector arena.
///
/// Spans reference each other by index rather than by generated string ids;
/// the generation tag keeps a handle from resolving after its slot has been
/// released and reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl SpanId {
    /// Position of the span's slot. Within an archived trace this is the
    /// span's pre-order position in the flattened sequence.
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.index, self.generation)
    }
}

/// Identifier of one completed (or in-progress) trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceId(pub u64);

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trace-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanStatus {
    Pending,
    Success,
    Error,
}

impl SpanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanStatus::Pending => "pending",
            SpanStatus::Success => "success",
            SpanStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SpanStatus::Pending)
    }
}

#[derive(Debug, Clone)]
pub struct Span {
    pub id: SpanId,
    pub name: String,
    pub start_ms: f64,
    pub end_ms: Option<f64>,
    /// Set exactly when `status` is terminal.
    pub duration_ms: Option<f64>,
    pub attributes: Attributes,
    pub status: SpanStatus,
    /// `None` marks a root span. A set parent that was never linked (stale
    /// or unknown id at creation) still keeps the span out of root handling.
    pub parent: Option<SpanId>,
    pub children: Vec<SpanId>,
}

#[derive(Debug, Clone)]
pub struct ErrorInfo {
    pub message: String,
    pub stack: Option<String>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        ErrorInfo {
            message: message.into(),
            stack: None,
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        let mut map = Attributes::new();
        map.insert("message".to_string(), Value::from(self.message.clone()));
        if let Some(stack) = &self.stack {
            map.insert("stack".to_string(), Value::from(stack.clone()));
        }
        Value::Object(map)
    }
}

/// One flat measurement, buffered in memory until flushed to the sink.
///
/// Field names are the sink wire shape; do not rename.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub metric_name: String,
    pub metric_value: f64,
    pub metric_unit: String,
    pub metadata: Attributes,
    pub created_at: DateTime<Utc>,
}

/// One record per intercepted table operation or procedure call.
#[derive(Debug, Clone, Serialize)]
pub struct QueryStats {
    pub query: String,
    pub table: String,
    pub operation: String,
    pub duration_ms: f64,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub row_count: Option<u64>,
    pub error: Option<String>,
}

/// Flat per-query entry behind [`QueryMetricsSummary`].
#[derive(Debug, Clone, Serialize)]
pub struct QueryPerformanceMetric {
    pub query: String,
    pub duration_ms: f64,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub row_count: Option<u64>,
}

/// Per-name statistics over the currently buffered (not yet flushed) metrics.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub total_metrics: usize,
    pub averages: BTreeMap<String, f64>,
    pub medians: BTreeMap<String, f64>,
    pub p95: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryMetricsSummary {
    pub total_queries: usize,
    pub average_duration_ms: f64,
    /// Percentage, 0..=100.
    pub success_rate: f64,
    pub slowest_queries: Vec<QueryPerformanceMetric>,
}

/// Group aggregate for one table or one operation.
#[derive(Debug, Clone, Serialize)]
pub struct QueryAggregate {
    pub count: usize,
    pub average_duration_ms: f64,
    /// Percentage, 0..=100.
    pub success_rate: f64,
}
