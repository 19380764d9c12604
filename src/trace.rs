use crate::metrics::MetricBatcher;
use crate::model::{Attributes, ErrorInfo, Span, SpanId, SpanStatus, TraceId};
use crate::time::Clock;
use log::warn;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Immutable snapshot of one closed root span and everything reachable from
/// it, flattened in depth-first pre-order.
///
/// Span ids inside a trace are re-indexed to pre-order positions, so child
/// links index directly into [`spans`](Self::spans).
#[derive(Debug, Clone)]
pub struct Trace {
    pub id: TraceId,
    spans: Vec<Span>,
}

impl Trace {
    pub fn root(&self) -> &Span {
        &self.spans[0]
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn children<'a>(&'a self, span: &'a Span) -> impl Iterator<Item = &'a Span> {
        span.children.iter().map(move |c| &self.spans[c.index as usize])
    }
}

struct Slot {
    generation: u32,
    span: Option<Span>,
}

struct CollectorState {
    slots: Vec<Slot>,
    free: Vec<u32>,
    trace_seq: u64,
    current_trace: TraceId,
    completed: HashMap<TraceId, Trace>,
}

impl CollectorState {
    fn new() -> Self {
        CollectorState {
            slots: Vec::new(),
            free: Vec::new(),
            trace_seq: 1,
            current_trace: TraceId(1),
            completed: HashMap::new(),
        }
    }

    fn reserve(&mut self) -> SpanId {
        if let Some(index) = self.free.pop() {
            SpanId {
                index,
                generation: self.slots[index as usize].generation,
            }
        } else {
            self.slots.push(Slot {
                generation: 0,
                span: None,
            });
            SpanId {
                index: (self.slots.len() - 1) as u32,
                generation: 0,
            }
        }
    }

    fn span(&self, id: SpanId) -> Option<&Span> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.span.as_ref())
    }

    fn span_mut(&mut self, id: SpanId) -> Option<&mut Span> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.span.as_mut())
    }

    // Bumping the generation on release keeps stale ids from resolving once
    // the slot is handed out again.
    fn release(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        slot.span = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
    }

    fn rotate_trace(&mut self) {
        self.trace_seq += 1;
        self.current_trace = TraceId(self.trace_seq);
    }

    /// Pre-order walk from `root`, skipping links whose slot was already
    /// released (a stale-swept child, for instance).
    fn preorder(&self, root: SpanId) -> Vec<SpanId> {
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(span) = self.span(id) else { continue };
            order.push(id);
            for child in span.children.iter().rev() {
                stack.push(*child);
            }
        }
        order
    }

    /// Snapshots the subtree under `root` as a completed trace and releases
    /// the closed slots. Spans still pending stay live; they release
    /// themselves on close once their parent link is gone.
    fn archive(&mut self, root: SpanId, trace_id: TraceId) -> Trace {
        let order = self.preorder(root);
        let position: HashMap<SpanId, u32> = order
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i as u32))
            .collect();

        let reindex = |id: SpanId| SpanId {
            index: position[&id],
            generation: 0,
        };

        let spans: Vec<Span> = order
            .iter()
            .map(|id| {
                let span = self.span(*id).expect("span present in pre-order walk");
                let mut snapshot = span.clone();
                snapshot.id = reindex(*id);
                snapshot.parent = span
                    .parent
                    .filter(|p| position.contains_key(p))
                    .map(|p| reindex(p));
                snapshot.children = span
                    .children
                    .iter()
                    .filter(|c| position.contains_key(*c))
                    .map(|c| reindex(*c))
                    .collect();
                snapshot
            })
            .collect();

        for id in &order {
            if self.span(*id).map_or(false, |s| s.status.is_terminal()) {
                self.release(id.index);
            }
        }

        Trace {
            id: trace_id,
            spans,
        }
    }

    /// Frees a closed span that can no longer reach a root, together with
    /// its closed descendants. Pending descendants stay live and take the
    /// same path when they close.
    fn release_closed_subtree(&mut self, root: SpanId) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(span) = self.span(id) else { continue };
            if !span.status.is_terminal() {
                continue;
            }
            for child in &span.children {
                stack.push(*child);
            }
            self.release(id.index);
        }
    }
}

/// Owns every live span and every completed trace.
///
/// Live spans sit in a generational arena and link parent/child by index;
/// closing a root span snapshots its subtree into an immutable [`Trace`]
/// and rotates the collector to a fresh trace id.
pub struct TraceCollector {
    state: Mutex<CollectorState>,
    batcher: MetricBatcher,
    clock: Arc<dyn Clock>,
}

impl TraceCollector {
    pub fn new(batcher: MetricBatcher, clock: Arc<dyn Clock>) -> TraceCollector {
        TraceCollector {
            state: Mutex::new(CollectorState::new()),
            batcher,
            clock,
        }
    }

    /// Opens a pending span. A `parent` that does not name a live pending
    /// span is kept on the record but never linked; the call itself cannot
    /// fail.
    pub fn start_span(
        &self,
        name: &str,
        attributes: Attributes,
        parent: Option<SpanId>,
    ) -> SpanId {
        let mut st = self.state.lock().unwrap();
        let mut attrs = attributes;
        attrs.insert("trace_id".to_string(), Value::from(st.current_trace.0));

        let id = st.reserve();
        let span = Span {
            id,
            name: name.to_string(),
            start_ms: self.clock.now_ms(),
            end_ms: None,
            duration_ms: None,
            attributes: attrs,
            status: SpanStatus::Pending,
            parent,
            children: Vec::new(),
        };
        st.slots[id.index as usize].span = Some(span);

        if let Some(parent_id) = parent {
            match st.span_mut(parent_id) {
                Some(p) if p.status == SpanStatus::Pending => p.children.push(id),
                _ => {}
            }
        }
        id
    }

    /// Closes a span. Unknown or already-closed ids are a warning no-op, so
    /// a double close never double-counts the span metric. Closing a root
    /// archives its subtree and rotates the trace id.
    pub fn end_span(&self, id: SpanId, status: SpanStatus, error: Option<ErrorInfo>) {
        if !status.is_terminal() {
            warn!("end_span on span {} with non-terminal status, ignoring", id);
            return;
        }

        let mut st = self.state.lock().unwrap();
        let now = self.clock.now_ms();
        let current_trace = st.current_trace;

        let Some(span) = st.span_mut(id) else {
            warn!("span {} not found", id);
            return;
        };
        if span.status.is_terminal() {
            warn!("span {} already closed", id);
            return;
        }

        span.end_ms = Some(now);
        let duration = now - span.start_ms;
        span.duration_ms = Some(duration);
        span.status = status;
        if let Some(err) = &error {
            span.attributes.insert("error".to_string(), err.to_value());
        }

        let name = span.name.clone();
        let attributes = span.attributes.clone();
        let parent = span.parent;

        let mut meta = Attributes::new();
        meta.insert("status".to_string(), Value::from(status.as_str()));
        meta.insert("trace_id".to_string(), Value::from(current_trace.0));
        meta.insert("span_id".to_string(), Value::from(id.to_string()));
        meta.insert("attributes".to_string(), Value::Object(attributes));
        self.batcher
            .record_metric(&format!("span_{name}"), duration, "ms", Some(meta));

        match parent {
            None => {
                let trace = st.archive(id, current_trace);
                st.completed.insert(current_trace, trace);
                st.rotate_trace();
            }
            Some(parent_id) => {
                if st.span(parent_id).is_none() {
                    // Parent slot already released; nothing will ever
                    // archive this chain.
                    st.release_closed_subtree(id);
                }
            }
        }
    }

    /// Runs `op` under a fresh root span, closing it with the outcome. The
    /// result passes through unchanged.
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
        let id = self.start_span(name, attributes, None);
        match op(id).await {
            Ok(value) => {
                self.end_span(id, SpanStatus::Success, None);
                Ok(value)
            }
            Err(err) => {
                self.end_span(id, SpanStatus::Error, Some(ErrorInfo::new(err.to_string())));
                Err(err)
            }
        }
    }

    /// Synchronous counterpart of [`trace_async`](Self::trace_async).
    pub fn trace_sync<T, E, F>(&self, name: &str, attributes: Attributes, op: F) -> Result<T, E>
    where
        F: FnOnce(SpanId) -> Result<T, E>,
        E: Display,
    {
        let id = self.start_span(name, attributes, None);
        match op(id) {
            Ok(value) => {
                self.end_span(id, SpanStatus::Success, None);
                Ok(value)
            }
            Err(err) => {
                self.end_span(id, SpanStatus::Error, Some(ErrorInfo::new(err.to_string())));
                Err(err)
            }
        }
    }

    /// Sets an attribute on a live pending span; anything else is ignored.
    pub fn add_span_attribute(&self, id: SpanId, key: &str, value: Value) {
        let mut st = self.state.lock().unwrap();
        if let Some(span) = st.span_mut(id).filter(|s| s.status == SpanStatus::Pending) {
            span.attributes.insert(key.to_string(), value);
        }
    }

    /// Appends a timestamped event under the span's `events` attribute.
    pub fn add_span_event(&self, id: SpanId, name: &str, attributes: Option<Attributes>) {
        let now = self.clock.now_ms();
        let mut st = self.state.lock().unwrap();
        let Some(span) = st.span_mut(id).filter(|s| s.status == SpanStatus::Pending) else {
            return;
        };

        let mut event = Attributes::new();
        event.insert("name".to_string(), Value::from(name));
        event.insert("timestamp".to_string(), Value::from(now));
        if let Some(attrs) = attributes {
            event.insert("attributes".to_string(), Value::Object(attrs));
        }

        match span.attributes.get_mut("events") {
            Some(Value::Array(events)) => events.push(Value::Object(event)),
            _ => {
                span.attributes.insert(
                    "events".to_string(),
                    Value::Array(vec![Value::Object(event)]),
                );
            }
        }
    }

    pub fn active_spans(&self) -> Vec<Span> {
        let st = self.state.lock().unwrap();
        st.slots
            .iter()
            .filter_map(|slot| slot.span.as_ref())
            .filter(|span| span.status == SpanStatus::Pending)
            .cloned()
            .collect()
    }

    /// Ids of completed traces, oldest first.
    pub fn completed_trace_ids(&self) -> Vec<TraceId> {
        let st = self.state.lock().unwrap();
        let mut ids: Vec<TraceId> = st.completed.keys().copied().collect();
        ids.sort_by_key(|id| id.0);
        ids
    }

    pub fn get_trace_tree(&self, id: TraceId) -> Option<Trace> {
        self.state.lock().unwrap().completed.get(&id).cloned()
    }

    pub fn clear_traces(&self) {
        self.state.lock().unwrap().completed.clear();
    }

    /// One line per span, indented by depth: status glyph, name, duration
    /// in milliseconds to two decimals. `None` for unknown trace ids.
    pub fn visualize_trace(&self, id: TraceId) -> Option<String> {
        let st = self.state.lock().unwrap();
        let trace = st.completed.get(&id)?;
        let mut lines = Vec::new();
        render_span(trace, trace.root(), 0, &mut lines);
        Some(lines.join("\n"))
    }

    /// Pretty JSON of one completed trace, or `None` for unknown ids.
    pub fn export_trace(&self, id: TraceId) -> Option<String> {
        let st = self.state.lock().unwrap();
        let trace = st.completed.get(&id)?;
        let spans: Vec<Value> = trace
            .spans()
            .iter()
            .map(|span| {
                json!({
                    "id": span.id.index,
                    "name": span.name,
                    "duration_ms": span.duration_ms,
                    "start_ms": span.start_ms,
                    "end_ms": span.end_ms,
                    "status": span.status.as_str(),
                    "attributes": span.attributes,
                    "parent_id": span.parent.map(|p| p.index),
                })
            })
            .collect();
        let doc = json!({ "trace_id": id.0, "spans": spans });
        Some(serde_json::to_string_pretty(&doc).unwrap_or_else(|_| "{}".to_string()))
    }

    /// Evicts spans left pending longer than `max_age_ms` and returns how
    /// many were dropped. Abandoned spans otherwise sit in the arena
    /// forever; call this from a periodic task if that matters.
    pub fn sweep_stale(&self, max_age_ms: f64) -> usize {
        let now = self.clock.now_ms();
        let mut st = self.state.lock().unwrap();

        let stale: Vec<SpanId> = st
            .slots
            .iter()
            .filter_map(|slot| slot.span.as_ref())
            .filter(|span| span.status == SpanStatus::Pending && now - span.start_ms > max_age_ms)
            .map(|span| span.id)
            .collect();

        for id in &stale {
            let Some(span) = st.span(*id) else { continue };
            warn!("evicting stale pending span {} ({})", id, span.name);
            let children = span.children.clone();
            st.release(id.index);
            // Closed descendants were only reachable through this span.
            for child in children {
                st.release_closed_subtree(child);
            }
        }
        stale.len()
    }
}

fn render_span(trace: &Trace, span: &Span, depth: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    let duration = span
        .duration_ms
        .map(|d| format!("{d:.2}"))
        .unwrap_or_else(|| "?".to_string());
    let glyph = match span.status {
        SpanStatus::Success => "✓",
        SpanStatus::Error => "✗",
        SpanStatus::Pending => "⋯",
    };
    lines.push(format!("{indent}{glyph} {} ({duration}ms)", span.name));
    for child in trace.children(span) {
        render_span(trace, child, depth + 1, lines);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MemorySink, MetricSink};
    use crate::client::Config;
    use crate::model::PerformanceMetric;
    use crate::time::ManualClock;

    fn collector() -> (TraceCollector, MetricBatcher, Arc<ManualClock>) {
        let config = Config {
            // Keep span metrics buffered so tests can inspect them.
            batch_size: 1000,
            ..Config::default()
        };
        let clock = Arc::new(ManualClock::new(0.0));
        let sink: Box<dyn MetricSink> = Box::new(MemorySink::new());
        let batcher = MetricBatcher::new(&config, sink, clock.clone(), "session-test".to_string());
        let collector = TraceCollector::new(batcher.clone(), clock.clone());
        (collector, batcher, clock)
    }

    fn span_metrics(batcher: &MetricBatcher) -> Vec<PerformanceMetric> {
        batcher
            .buffered_metrics()
            .into_iter()
            .filter(|m| m.metric_name.starts_with("span_"))
            .collect()
    }

    #[test]
    fn span_closes_once_and_emits_one_metric() {
        let (collector, batcher, clock) = collector();

        let id = collector.start_span("db.select", Attributes::new(), None);
        clock.advance(5.0);
        collector.end_span(id, SpanStatus::Success, None);

        let metrics = span_metrics(&batcher);
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].metric_name, "span_db.select");
        assert_eq!(metrics[0].metric_value, 5.0);
        assert_eq!(metrics[0].metadata["status"], "success");

        // Second close is a no-op: no duplicate metric, no second trace.
        collector.end_span(id, SpanStatus::Error, None);
        assert_eq!(span_metrics(&batcher).len(), 1);
        assert_eq!(collector.completed_trace_ids().len(), 1);
    }

    #[test]
    fn root_close_archives_subtree_in_preorder() {
        let (collector, _batcher, clock) = collector();

        let root = collector.start_span("request", Attributes::new(), None);
        let a = collector.start_span("db.select", Attributes::new(), Some(root));
        let a1 = collector.start_span("decode", Attributes::new(), Some(a));
        let b = collector.start_span("render", Attributes::new(), Some(root));

        clock.advance(2.0);
        collector.end_span(a1, SpanStatus::Success, None);
        collector.end_span(a, SpanStatus::Success, None);
        collector.end_span(b, SpanStatus::Success, None);
        collector.end_span(root, SpanStatus::Success, None);

        let ids = collector.completed_trace_ids();
        assert_eq!(ids.len(), 1);
        let trace = collector.get_trace_tree(ids[0]).unwrap();

        let names: Vec<_> = trace.spans().iter().map(|s| s.name.clone()).collect();
        assert_eq!(names, vec!["request", "db.select", "decode", "render"]);

        // Links are re-indexed to pre-order positions.
        assert_eq!(trace.root().id.index(), 0);
        assert!(trace.root().parent.is_none());
        let child_indices: Vec<_> = trace.root().children.iter().map(|c| c.index()).collect();
        assert_eq!(child_indices, vec![1, 3]);
        assert_eq!(trace.spans()[2].parent.unwrap().index(), 1);

        // Everything closed, so the arena is fully drained.
        assert!(collector.active_spans().is_empty());
    }

    #[test]
    fn each_root_closure_gets_its_own_trace_id() {
        let (collector, _batcher, _clock) = collector();

        let first = collector.start_span("first", Attributes::new(), None);
        collector.end_span(first, SpanStatus::Success, None);
        let second = collector.start_span("second", Attributes::new(), None);
        collector.end_span(second, SpanStatus::Success, None);

        let ids = collector.completed_trace_ids();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert_eq!(
            collector.get_trace_tree(ids[0]).unwrap().root().name,
            "first"
        );
        assert_eq!(
            collector.get_trace_tree(ids[1]).unwrap().root().name,
            "second"
        );
    }

    #[test]
    fn unknown_parent_leaves_span_unlinked_and_unarchived() {
        let (collector, batcher, _clock) = collector();

        let ghost = SpanId {
            index: 42,
            generation: 7,
        };
        let orphan = collector.start_span("orphan", Attributes::new(), Some(ghost));
        collector.end_span(orphan, SpanStatus::Success, None);

        // The close still counts, but no trace is produced and the slot is
        // reclaimed.
        assert_eq!(span_metrics(&batcher).len(), 1);
        assert!(collector.completed_trace_ids().is_empty());
        assert!(collector.active_spans().is_empty());
    }

    #[test]
    fn stale_id_does_not_resolve_after_slot_reuse() {
        let (collector, batcher, _clock) = collector();

        let first = collector.start_span("first", Attributes::new(), None);
        collector.end_span(first, SpanStatus::Success, None);

        // Slot is reused with a bumped generation; the old id must not
        // close the new span.
        let second = collector.start_span("second", Attributes::new(), None);
        assert_eq!(second.index(), first.index());
        assert_ne!(second, first);

        collector.end_span(first, SpanStatus::Error, None);
        assert_eq!(span_metrics(&batcher).len(), 1);
        assert_eq!(collector.active_spans().len(), 1);

        collector.end_span(second, SpanStatus::Success, None);
        assert_eq!(span_metrics(&batcher).len(), 2);
    }

    #[test]
    fn pending_child_is_frozen_in_the_archived_trace() {
        let (collector, batcher, clock) = collector();

        let root = collector.start_span("request", Attributes::new(), None);
        let child = collector.start_span("slow_io", Attributes::new(), Some(root));
        clock.advance(3.0);
        collector.end_span(root, SpanStatus::Success, None);

        let ids = collector.completed_trace_ids();
        let trace = collector.get_trace_tree(ids[0]).unwrap();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace.spans()[1].status, SpanStatus::Pending);
        assert!(trace.spans()[1].duration_ms.is_none());

        // The child is still live; closing it emits its metric but cannot
        // join any trace, and the arena drains.
        collector.end_span(child, SpanStatus::Success, None);
        assert_eq!(span_metrics(&batcher).len(), 2);
        assert_eq!(collector.completed_trace_ids().len(), 1);
        assert!(collector.active_spans().is_empty());
    }

    #[test]
    fn visualize_renders_glyphs_depth_and_durations() {
        let (collector, _batcher, clock) = collector();

        let root = collector.start_span("request", Attributes::new(), None);
        let child = collector.start_span("db.select", Attributes::new(), Some(root));
        clock.advance(4.0);
        collector.end_span(child, SpanStatus::Error, None);
        clock.advance(6.0);
        collector.end_span(root, SpanStatus::Success, None);

        let id = collector.completed_trace_ids()[0];
        let rendered = collector.visualize_trace(id).unwrap();
        assert_eq!(rendered, "✓ request (10.00ms)\n  ✗ db.select (4.00ms)");

        assert!(collector.visualize_trace(TraceId(999)).is_none());
    }

    #[test]
    fn export_trace_is_parseable_json_with_reindexed_links() {
        let (collector, _batcher, clock) = collector();

        let root = collector.start_span("request", Attributes::new(), None);
        let child = collector.start_span("db.insert", Attributes::new(), Some(root));
        clock.advance(1.0);
        collector.end_span(child, SpanStatus::Success, None);
        collector.end_span(root, SpanStatus::Success, None);

        let id = collector.completed_trace_ids()[0];
        let doc: Value = serde_json::from_str(&collector.export_trace(id).unwrap()).unwrap();
        assert_eq!(doc["trace_id"], id.0);
        let spans = doc["spans"].as_array().unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0]["id"], 0);
        assert!(spans[0]["parent_id"].is_null());
        assert_eq!(spans[1]["parent_id"], 0);
        assert_eq!(spans[1]["status"], "success");
    }

    #[test]
    fn trace_async_closes_span_with_outcome() {
        let (collector, _batcher, clock) = collector();
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        let ok: Result<u32, String> = rt.block_on(collector.trace_async(
            "load_documents",
            Attributes::new(),
            |_| async { Ok(3) },
        ));
        assert_eq!(ok.unwrap(), 3);

        clock.advance(1.0);
        let err: Result<u32, String> = rt.block_on(collector.trace_async(
            "load_documents",
            Attributes::new(),
            |_| async { Err("backend down".to_string()) },
        ));
        assert_eq!(err.unwrap_err(), "backend down");

        let ids = collector.completed_trace_ids();
        assert_eq!(ids.len(), 2);
        let failed = collector.get_trace_tree(ids[1]).unwrap();
        assert_eq!(failed.root().status, SpanStatus::Error);
        assert_eq!(failed.root().attributes["error"]["message"], "backend down");
    }

    #[test]
    fn attributes_and_events_attach_to_live_spans_only() {
        let (collector, _batcher, _clock) = collector();

        let id = collector.start_span("upload", Attributes::new(), None);
        collector.add_span_attribute(id, "file_size", Value::from(1024));
        collector.add_span_event(id, "checksum_verified", None);
        collector.add_span_event(id, "thumbnail_ready", None);
        collector.end_span(id, SpanStatus::Success, None);

        // Closed span: both calls are silent no-ops.
        collector.add_span_attribute(id, "late", Value::from(true));
        collector.add_span_event(id, "late", None);

        let trace_id = collector.completed_trace_ids()[0];
        let root = collector.get_trace_tree(trace_id).unwrap().root().clone();
        assert_eq!(root.attributes["file_size"], 1024);
        let events = root.attributes["events"].as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["name"], "checksum_verified");
        assert!(root.attributes.get("late").is_none());
    }

    #[test]
    fn sweep_evicts_only_old_pending_spans() {
        let (collector, _batcher, clock) = collector();

        let _old = collector.start_span("stuck", Attributes::new(), None);
        clock.advance(60_000.0);
        let _fresh = collector.start_span("active", Attributes::new(), None);

        let evicted = collector.sweep_stale(30_000.0);
        assert_eq!(evicted, 1);

        let remaining = collector.active_spans();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "active");
    }

    #[test]
    fn ending_unknown_span_is_a_noop() {
        let (collector, batcher, _clock) = collector();
        collector.end_span(
            SpanId {
                index: 9,
                generation: 0,
            },
            SpanStatus::Success,
            None,
        );
        assert!(span_metrics(&batcher).is_empty());
        assert!(collector.completed_trace_ids().is_empty());
    }
}
