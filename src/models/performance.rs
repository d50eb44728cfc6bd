use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub operation: String,
    pub query_time_ms: f64,
    pub timestamp: DateTime<Utc>,
    pub records_processed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub query_count: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Fraction in [0, 1]; 0 before the first query.
    pub cache_hit_rate: f64,
    pub average_latency_ms: f64,
    pub cache_size: usize,
    pub slow_queries: Vec<PerformanceSample>,
}

/// Hit/miss and latency counters for cache-served operations.
#[derive(Debug)]
pub struct PerformanceTracker {
    slow_threshold: Duration,
    slow_log_size: usize,
    query_count: u64,
    cache_hits: u64,
    cache_misses: u64,
    total_latency_ms: f64,
    slow_queries: VecDeque<PerformanceSample>,
}

impl PerformanceTracker {
    pub fn new(slow_threshold: Duration, slow_log_size: usize) -> Self {
        let slow_log_size = slow_log_size.max(1);
        Self {
            slow_threshold,
            slow_log_size,
            query_count: 0,
            cache_hits: 0,
            cache_misses: 0,
            total_latency_ms: 0.0,
            slow_queries: VecDeque::with_capacity(slow_log_size),
        }
    }

    pub fn record(
        &mut self,
        operation: &str,
        elapsed: Duration,
        cache_hit: bool,
        records_processed: usize,
    ) {
        self.record_at(operation, elapsed, cache_hit, records_processed, Utc::now());
    }

    pub fn record_at(
        &mut self,
        operation: &str,
        elapsed: Duration,
        cache_hit: bool,
        records_processed: usize,
        timestamp: DateTime<Utc>,
    ) {
        let query_time_ms = elapsed.as_secs_f64() * 1000.0;
        self.query_count += 1;
        self.total_latency_ms += query_time_ms;
        if cache_hit {
            self.cache_hits += 1;
        } else {
            self.cache_misses += 1;
        }

        if elapsed > self.slow_threshold {
            log::warn!(
                "slow query '{operation}': {query_time_ms:.1}ms over {records_processed} records"
            );
            if self.slow_queries.len() == self.slow_log_size {
                self.slow_queries.pop_front();
            }
            self.slow_queries.push_back(PerformanceSample {
                operation: operation.to_string(),
                query_time_ms,
                timestamp,
                records_processed,
            });
        }
    }

    pub fn metrics(&self, cache_size: usize) -> PerformanceMetrics {
        let (cache_hit_rate, average_latency_ms) = if self.query_count == 0 {
            (0.0, 0.0)
        } else {
            (
                self.cache_hits as f64 / self.query_count as f64,
                self.total_latency_ms / self.query_count as f64,
            )
        };

        PerformanceMetrics {
            query_count: self.query_count,
            cache_hits: self.cache_hits,
            cache_misses: self.cache_misses,
            cache_hit_rate,
            average_latency_ms,
            cache_size,
            slow_queries: self.slow_queries.iter().cloned().collect(),
        }
    }

    pub fn reset(&mut self) {
        self.query_count = 0;
        self.cache_hits = 0;
        self.cache_misses = 0;
        self.total_latency_ms = 0.0;
        self.slow_queries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_hit_rate_and_average_latency() {
        let mut tracker = PerformanceTracker::new(Duration::from_millis(100), 10);
        tracker.record("a", Duration::from_millis(10), false, 5);
        tracker.record("a", Duration::from_millis(30), true, 5);

        let metrics = tracker.metrics(3);
        assert_eq!(metrics.query_count, 2);
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.cache_misses, 1);
        assert!((metrics.cache_hit_rate - 0.5).abs() < 1e-9);
        assert!((metrics.average_latency_ms - 20.0).abs() < 1e-6);
        assert_eq!(metrics.cache_size, 3);
        assert!(metrics.slow_queries.is_empty());
    }

    #[test]
    fn slow_log_keeps_only_most_recent_samples() {
        let mut tracker = PerformanceTracker::new(Duration::from_millis(100), 3);
        for i in 0..5 {
            tracker.record(&format!("op{i}"), Duration::from_millis(150), false, i);
        }
        tracker.record("fast", Duration::from_millis(5), false, 0);

        let slow = tracker.metrics(0).slow_queries;
        assert_eq!(slow.len(), 3);
        let names: Vec<_> = slow.iter().map(|s| s.operation.as_str()).collect();
        assert_eq!(names, vec!["op2", "op3", "op4"]);
        assert_eq!(slow[2].records_processed, 4);
    }

    #[test]
    fn empty_tracker_reports_zeroes() {
        let tracker = PerformanceTracker::new(Duration::from_millis(100), 10);
        let metrics = tracker.metrics(0);
        assert_eq!(metrics.query_count, 0);
        assert_eq!(metrics.cache_hit_rate, 0.0);
        assert_eq!(metrics.average_latency_ms, 0.0);
    }

    #[test]
    fn reset_clears_counters() {
        let mut tracker = PerformanceTracker::new(Duration::from_millis(1), 10);
        tracker.record("a", Duration::from_millis(5), true, 1);
        tracker.reset();
        let metrics = tracker.metrics(0);
        assert_eq!(metrics.query_count, 0);
        assert!(metrics.slow_queries.is_empty());
    }
}
