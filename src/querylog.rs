use crate::model::{QueryAggregate, QueryStats};
use chrono::Utc;
use serde_json::json;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub const DEFAULT_CAPACITY: usize = 1000;
pub const DEFAULT_SLOW_THRESHOLD_MS: f64 = 1000.0;

/// Fixed-capacity FIFO history of intercepted calls.
///
/// Aggregates are derived on demand from the ring so the log stays the
/// single source of truth.
pub struct QueryLog {
    entries: Mutex<VecDeque<QueryStats>>,
    capacity: usize,
    enabled: AtomicBool,
}

impl QueryLog {
    pub fn new(capacity: usize) -> QueryLog {
        QueryLog {
            entries: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            capacity: capacity.max(1),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn log(&self, stats: QueryStats) {
        if !self.enabled.load(Ordering::Relaxed) {
            return;
        }
        let mut entries = self.entries.lock().unwrap();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(stats);
    }

    pub fn entries(&self) -> Vec<QueryStats> {
        self.entries.lock().unwrap().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// Entries strictly slower than `threshold_ms`.
    pub fn slow_queries(&self, threshold_ms: f64) -> Vec<QueryStats> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|q| q.duration_ms > threshold_ms)
            .cloned()
            .collect()
    }

    pub fn failed_queries(&self) -> Vec<QueryStats> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|q| !q.success)
            .cloned()
            .collect()
    }

    pub fn stats_by_table(&self) -> BTreeMap<String, QueryAggregate> {
        self.aggregate(|q| q.table.clone())
    }

    pub fn stats_by_operation(&self) -> BTreeMap<String, QueryAggregate> {
        self.aggregate(|q| q.operation.clone())
    }

    fn aggregate(&self, key: impl Fn(&QueryStats) -> String) -> BTreeMap<String, QueryAggregate> {
        let entries = self.entries.lock().unwrap();
        let mut groups: BTreeMap<String, (usize, f64, usize)> = BTreeMap::new();
        for entry in entries.iter() {
            let group = groups.entry(key(entry)).or_insert((0, 0.0, 0));
            group.0 += 1;
            group.1 += entry.duration_ms;
            if entry.success {
                group.2 += 1;
            }
        }

        groups
            .into_iter()
            .map(|(name, (count, total, successes))| {
                (
                    name,
                    QueryAggregate {
                        count,
                        average_duration_ms: total / count as f64,
                        success_rate: successes as f64 / count as f64 * 100.0,
                    },
                )
            })
            .collect()
    }

    /// Deterministic text report: totals, per-table and per-operation
    /// aggregates, and the five slowest of the slow queries (descending,
    /// ties keep insertion order).
    pub fn generate_report(&self) -> String {
        let stats_by_table = self.stats_by_table();
        let stats_by_operation = self.stats_by_operation();
        let mut slow = self.slow_queries(DEFAULT_SLOW_THRESHOLD_MS);
        let failed = self.failed_queries();

        let mut lines: Vec<String> = Vec::new();
        lines.push("Database Query Performance Report".to_string());
        lines.push("═".repeat(50));
        lines.push(String::new());
        lines.push(format!("Total Queries: {}", self.len()));
        lines.push(format!("Slow Queries (>1s): {}", slow.len()));
        lines.push(format!("Failed Queries: {}", failed.len()));
        lines.push(String::new());

        lines.push("Performance by Table:".to_string());
        lines.push("─".repeat(50));
        for (table, stats) in &stats_by_table {
            lines.push(format!("{table}:"));
            lines.push(format!("  Count: {}", stats.count));
            lines.push(format!("  Avg Duration: {:.2}ms", stats.average_duration_ms));
            lines.push(format!("  Success Rate: {:.2}%", stats.success_rate));
            lines.push(String::new());
        }

        lines.push("Performance by Operation:".to_string());
        lines.push("─".repeat(50));
        for (operation, stats) in &stats_by_operation {
            lines.push(format!("{operation}:"));
            lines.push(format!("  Count: {}", stats.count));
            lines.push(format!("  Avg Duration: {:.2}ms", stats.average_duration_ms));
            lines.push(format!("  Success Rate: {:.2}%", stats.success_rate));
            lines.push(String::new());
        }

        if !slow.is_empty() {
            lines.push("Top 5 Slowest Queries:".to_string());
            lines.push("─".repeat(50));
            // Stable sort: equal durations keep their insertion order.
            slow.sort_by(|a, b| b.duration_ms.total_cmp(&a.duration_ms));
            for (i, query) in slow.iter().take(5).enumerate() {
                lines.push(format!("{}. {}", i + 1, query.query));
                lines.push(format!("   Duration: {:.2}ms", query.duration_ms));
                lines.push(format!("   Table: {}", query.table));
                lines.push(String::new());
            }
        }

        lines.join("\n")
    }

    /// Pretty JSON of the ring plus every derived view.
    pub fn export_json(&self) -> String {
        let doc = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "query_log": self.entries(),
            "slow_queries": self.slow_queries(DEFAULT_SLOW_THRESHOLD_MS),
            "failed_queries": self.failed_queries(),
            "stats_by_table": self.stats_by_table(),
            "stats_by_operation": self.stats_by_operation(),
        });
        serde_json::to_string_pretty(&doc).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }
}

impl Default for QueryLog {
    fn default() -> Self {
        QueryLog::new(DEFAULT_CAPACITY)
    }
}
