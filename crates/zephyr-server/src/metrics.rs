//! Tool-call metrics.
//!
//! The dispatcher records one sample per call. Latency percentiles are
//! computed over the most recent [`LATENCY_WINDOW`] calls; counters and
//! per-tool statistics cover the collector's whole lifetime.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Number of recent call durations kept for percentiles.
pub const LATENCY_WINDOW: usize = 1000;

#[derive(Debug, Default, Clone)]
struct ToolStats {
    calls: u64,
    errors: u64,
    total: Duration,
    min: Option<Duration>,
    max: Duration,
}

#[derive(Debug)]
struct MetricsState {
    started: Instant,
    started_at: DateTime<Utc>,
    requests: u64,
    errors: u64,
    total_latency: Duration,
    max_latency: Duration,
    window: VecDeque<Duration>,
    tools: BTreeMap<String, ToolStats>,
}

impl MetricsState {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
            requests: 0,
            errors: 0,
            total_latency: Duration::ZERO,
            max_latency: Duration::ZERO,
            window: VecDeque::with_capacity(LATENCY_WINDOW),
            tools: BTreeMap::new(),
        }
    }
}

/// Point-in-time view of the collected metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Seconds since the collector was created
    pub uptime_seconds: u64,
    /// When the collector was created
    pub started_at: DateTime<Utc>,
    /// Tool calls recorded
    pub requests: u64,
    /// Tool calls that failed
    pub errors: u64,
    /// `errors / requests`, or 0 with no requests
    pub error_rate: f64,
    /// Average call rate over the uptime
    pub requests_per_second: f64,
    /// Latency over all calls, percentiles over the recent window
    pub latency: LatencySummary,
    /// Per-tool statistics keyed by tool name
    pub tools: BTreeMap<String, ToolMetrics>,
}

/// Latency figures in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    /// Mean over all calls
    pub avg_ms: f64,
    /// Slowest call
    pub max_ms: f64,
    /// Median of the recent window
    pub p50_ms: f64,
    /// 95th percentile of the recent window
    pub p95_ms: f64,
    /// 99th percentile of the recent window
    pub p99_ms: f64,
}

/// Statistics for a single tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolMetrics {
    /// Calls recorded
    pub calls: u64,
    /// Calls that failed
    pub errors: u64,
    /// Mean latency in milliseconds
    pub avg_ms: f64,
    /// Fastest call in milliseconds
    pub min_ms: f64,
    /// Slowest call in milliseconds
    pub max_ms: f64,
}

/// Collects per-call latency and outcome.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use zephyr_server::MetricsCollector;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let metrics = MetricsCollector::new();
/// metrics.record("echo", Duration::from_millis(4), true).await;
/// metrics.record("echo", Duration::from_millis(8), false).await;
///
/// let snapshot = metrics.snapshot().await;
/// assert_eq!(snapshot.requests, 2);
/// assert_eq!(snapshot.errors, 1);
/// assert_eq!(snapshot.tools["echo"].calls, 2);
/// # }
/// ```
#[derive(Debug)]
pub struct MetricsCollector {
    state: RwLock<MetricsState>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Creates an empty collector; uptime starts now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MetricsState::new()),
        }
    }

    /// Records one tool call.
    pub async fn record(&self, tool: &str, duration: Duration, success: bool) {
        let mut state = self.state.write().await;
        state.requests += 1;
        if !success {
            state.errors += 1;
        }
        state.total_latency += duration;
        state.max_latency = state.max_latency.max(duration);

        if state.window.len() == LATENCY_WINDOW {
            state.window.pop_front();
        }
        state.window.push_back(duration);

        let stats = state.tools.entry(tool.to_string()).or_default();
        stats.calls += 1;
        if !success {
            stats.errors += 1;
        }
        stats.total += duration;
        stats.min = Some(stats.min.map_or(duration, |min| min.min(duration)));
        stats.max = stats.max.max(duration);
    }

    /// Time since the collector was created.
    pub async fn uptime(&self) -> Duration {
        self.state.read().await.started.elapsed()
    }

    /// Current metrics.
    #[allow(clippy::cast_precision_loss)]
    pub async fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.read().await;
        let uptime = state.started.elapsed();

        let mut window: Vec<Duration> = state.window.iter().copied().collect();
        window.sort_unstable();

        let latency = LatencySummary {
            avg_ms: mean_ms(state.total_latency, state.requests),
            max_ms: millis(state.max_latency),
            p50_ms: percentile(&window, 50),
            p95_ms: percentile(&window, 95),
            p99_ms: percentile(&window, 99),
        };

        let tools = state
            .tools
            .iter()
            .map(|(name, stats)| {
                let metrics = ToolMetrics {
                    calls: stats.calls,
                    errors: stats.errors,
                    avg_ms: mean_ms(stats.total, stats.calls),
                    min_ms: stats.min.map_or(0.0, millis),
                    max_ms: millis(stats.max),
                };
                (name.clone(), metrics)
            })
            .collect();

        MetricsSnapshot {
            uptime_seconds: uptime.as_secs(),
            started_at: state.started_at,
            requests: state.requests,
            errors: state.errors,
            error_rate: if state.requests == 0 {
                0.0
            } else {
                state.errors as f64 / state.requests as f64
            },
            requests_per_second: if uptime.is_zero() {
                0.0
            } else {
                state.requests as f64 / uptime.as_secs_f64()
            },
            latency,
            tools,
        }
    }

    /// Clears every counter; uptime keeps running.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        let started = state.started;
        let started_at = state.started_at;
        *state = MetricsState::new();
        state.started = started;
        state.started_at = started_at;
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

fn mean_ms(total: Duration, count: u64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    millis(total / u32::try_from(count).unwrap_or(u32::MAX))
}

/// Nearest-rank percentile of an ascending slice.
fn percentile(sorted: &[Duration], pct: usize) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (pct * sorted.len()).div_ceil(100);
    millis(sorted[rank.saturating_sub(1).min(sorted.len() - 1)])
}
