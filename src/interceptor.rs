use crate::client::Monitor;
use crate::model::{Attributes, QueryStats, SpanStatus};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Outcome shape shared by every table operation and procedure call:
/// failures travel in-band through `error`, never as a transport panic.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub data: Option<Value>,
    pub error: Option<QueryError>,
}

#[derive(Debug, Clone)]
pub struct QueryError {
    pub message: String,
}

impl QueryResult {
    pub fn ok(data: Value) -> QueryResult {
        QueryResult {
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> QueryResult {
        QueryResult {
            data: None,
            error: Some(QueryError {
                message: message.into(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Element count when the payload is a sequence, 1 for any other
    /// payload, `None` when there is no payload.
    pub fn row_count(&self) -> Option<u64> {
        match &self.data {
            Some(Value::Array(rows)) => Some(rows.len() as u64),
            Some(_) => Some(1),
            None => None,
        }
    }
}

/// Deferred procedure call: holding one is free, awaiting it runs the call.
///
/// Wrappers preserve this shape so a caller can pass the handle around
/// before resolving it; instrumentation fires exactly once, at resolution.
pub struct ProcedureCall<'a> {
    future: BoxFuture<'a, QueryResult>,
}

impl<'a> ProcedureCall<'a> {
    pub fn new(future: impl Future<Output = QueryResult> + Send + 'a) -> ProcedureCall<'a> {
        ProcedureCall {
            future: Box::pin(future),
        }
    }
}

impl Future for ProcedureCall<'_> {
    type Output = QueryResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().future.as_mut().poll(cx)
    }
}

/// Generic asynchronous table-operation client, the surface this crate can
/// observe. Every method resolves to a [`QueryResult`].
#[async_trait]
pub trait TableOps: Send + Sync {
    async fn select(&self, table: &str, filter: Value) -> QueryResult;
    async fn insert(&self, table: &str, rows: Value) -> QueryResult;
    async fn update(&self, table: &str, changes: Value, filter: Value) -> QueryResult;
    async fn delete(&self, table: &str, filter: Value) -> QueryResult;
    async fn upsert(&self, table: &str, rows: Value) -> QueryResult;

    fn call_procedure<'a>(&'a self, name: &str, params: Value) -> ProcedureCall<'a>;
}

/// Decorator that times, logs and traces every delegated call without
/// changing its inputs, outputs or failure behavior.
///
/// Obtained from [`Monitor::wrap_client`]; implements [`TableOps`] itself,
/// so it drops into any code written against the inner client.
pub struct MonitoredClient<C> {
    inner: C,
    monitor: Monitor,
}

impl<C: TableOps> MonitoredClient<C> {
    pub(crate) fn new(inner: C, monitor: Monitor) -> MonitoredClient<C> {
        MonitoredClient { inner, monitor }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }

    async fn observe(
        &self,
        table: &str,
        operation: &str,
        call: impl Future<Output = QueryResult> + Send,
    ) -> QueryResult {
        let mut attrs = Attributes::new();
        attrs.insert("table".to_string(), Value::from(table));
        attrs.insert("operation".to_string(), Value::from(operation));
        let span = self
            .monitor
            .trace_collector()
            .start_span(&format!("db.{operation}"), attrs, None);

        let start = self.monitor.now_ms();
        let result = call.await;
        let duration = self.monitor.now_ms() - start;

        let success = result.is_success();
        let error = result.error.as_ref().map(|e| e.message.clone());
        let row_count = if success { result.row_count() } else { None };

        self.monitor.query_log().log(QueryStats {
            query: format!("{operation} on {table}"),
            table: table.to_string(),
            operation: operation.to_string(),
            duration_ms: duration,
            timestamp: Utc::now(),
            success,
            row_count,
            error,
        });
        self.monitor.metrics().record_query_performance(
            &format!("{table}.{operation}"),
            duration,
            success,
            row_count,
        );
        let status = if success {
            SpanStatus::Success
        } else {
            SpanStatus::Error
        };
        self.monitor.trace_collector().end_span(span, status, None);

        result
    }
}

#[async_trait]
impl<C: TableOps> TableOps for MonitoredClient<C> {
    async fn select(&self, table: &str, filter: Value) -> QueryResult {
        self.observe(table, "select", self.inner.select(table, filter))
            .await
    }

    async fn insert(&self, table: &str, rows: Value) -> QueryResult {
        self.observe(table, "insert", self.inner.insert(table, rows))
            .await
    }

    async fn update(&self, table: &str, changes: Value, filter: Value) -> QueryResult {
        self.observe(table, "update", self.inner.update(table, changes, filter))
            .await
    }

    async fn delete(&self, table: &str, filter: Value) -> QueryResult {
        self.observe(table, "delete", self.inner.delete(table, filter))
            .await
    }

    async fn upsert(&self, table: &str, rows: Value) -> QueryResult {
        self.observe(table, "upsert", self.inner.upsert(table, rows))
            .await
    }

    fn call_procedure<'a>(&'a self, name: &str, params: Value) -> ProcedureCall<'a> {
        let monitor = self.monitor.clone();
        let name = name.to_string();

        let mut attrs = Attributes::new();
        attrs.insert("function".to_string(), Value::from(name.clone()));
        let span = monitor.trace_collector().start_span("db.rpc", attrs, None);
        let start = monitor.now_ms();

        let inner_call = self.inner.call_procedure(&name, params);

        ProcedureCall::new(async move {
            let result = inner_call.await;
            let duration = monitor.now_ms() - start;
            let success = result.is_success();
            let error = result.error.as_ref().map(|e| e.message.clone());

            monitor.query_log().log(QueryStats {
                query: format!("RPC: {name}"),
                table: "rpc".to_string(),
                operation: name.clone(),
                duration_ms: duration,
                timestamp: Utc::now(),
                success,
                row_count: None,
                error,
            });
            monitor.metrics().record_query_performance(
                &format!("rpc.{name}"),
                duration,
                success,
                None,
            );
            let status = if success {
                SpanStatus::Success
            } else {
                SpanStatus::Error
            };
            monitor.trace_collector().end_span(span, status, None);

            result
        })
    }
}
