//! Query performance monitoring and lightweight distributed tracing:
//! spans assembled into trace trees, flat metrics batched to a remote sink,
//! and a transparent decorator that instruments any table-operation client.

pub mod api;
pub mod client;
pub mod interceptor;
pub mod metrics;
pub mod model;
pub mod querylog;
pub mod time;
pub mod trace;

pub use crate::{
    api::{HttpSink, MemorySink, MetricSink, SinkError},
    client::{Config, Monitor},
    interceptor::{MonitoredClient, ProcedureCall, QueryError, QueryResult, TableOps},
    metrics::MetricBatcher,
    model::{
        Attributes, ErrorInfo, MetricsSummary, PerformanceMetric, QueryAggregate,
        QueryMetricsSummary, QueryPerformanceMetric, QueryStats, Span, SpanId, SpanStatus,
        TraceId,
    },
    querylog::QueryLog,
    time::{Clock, ManualClock, MonotonicClock},
    trace::{Trace, TraceCollector},
};
