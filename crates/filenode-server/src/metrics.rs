//! Per-method request metrics.
//!
//! Counts, error counts, total latency and a coarse latency histogram for
//! each method, logged through `tracing` on a fixed interval.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Upper bounds of the latency buckets; the last bucket is open-ended.
const BUCKET_BOUNDS: [Duration; 4] = [
    Duration::from_millis(10),
    Duration::from_millis(100),
    Duration::from_millis(500),
    Duration::from_secs(1),
];

/// Labels matching [`BUCKET_BOUNDS`] plus the overflow bucket.
pub const BUCKET_LABELS: [&str; 5] = ["<10ms", "<100ms", "<500ms", "<1s", ">1s"];

/// Accumulated numbers for one method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodStats {
    pub count: u64,
    pub errors: u64,
    pub total_latency: Duration,
    pub buckets: [u64; 5],
}

impl MethodStats {
    pub fn average_latency(&self) -> Duration {
        match u32::try_from(self.count) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total_latency / n,
            Err(_) => self.total_latency / u32::MAX,
        }
    }
}

/// Request metrics registry.
#[derive(Debug, Default)]
pub struct Metrics {
    methods: Mutex<BTreeMap<&'static str, MethodStats>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished call.
    pub fn record(&self, method: &'static str, elapsed: Duration, ok: bool) {
        let bucket = BUCKET_BOUNDS
            .iter()
            .position(|bound| elapsed < *bound)
            .unwrap_or(BUCKET_BOUNDS.len());

        let mut methods = self.methods.lock();
        let stats = methods.entry(method).or_default();
        stats.count += 1;
        if !ok {
            stats.errors += 1;
        }
        stats.total_latency += elapsed;
        stats.buckets[bucket] += 1;
    }

    /// Copy of the current numbers.
    pub fn snapshot(&self) -> BTreeMap<&'static str, MethodStats> {
        self.methods.lock().clone()
    }

    /// Log one line per method.
    pub fn log_snapshot(&self) {
        for (method, stats) in self.snapshot() {
            let buckets: Vec<String> = BUCKET_LABELS
                .iter()
                .zip(stats.buckets)
                .filter(|(_, n)| *n > 0)
                .map(|(label, n)| format!("{label}={n}"))
                .collect();
            tracing::info!(
                method,
                count = stats.count,
                errors = stats.errors,
                avg_latency = ?stats.average_latency(),
                buckets = %buckets.join(","),
                "metrics snapshot"
            );
        }
    }

    /// Log a snapshot every `interval` until `shutdown` fires.
    pub fn spawn_reporter(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => self.log_snapshot(),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets() {
        let metrics = Metrics::new();
        metrics.record("stat", Duration::from_millis(1), true);
        metrics.record("stat", Duration::from_millis(50), true);
        metrics.record("stat", Duration::from_millis(700), false);
        metrics.record("stat", Duration::from_secs(3), true);

        let snapshot = metrics.snapshot();
        let stats = &snapshot["stat"];
        assert_eq!(stats.count, 4);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.buckets, [1, 1, 0, 1, 1]);
    }

    #[test]
    fn test_average() {
        let metrics = Metrics::new();
        metrics.record("list_dir", Duration::from_millis(10), true);
        metrics.record("list_dir", Duration::from_millis(30), true);
        assert_eq!(
            metrics.snapshot()["list_dir"].average_latency(),
            Duration::from_millis(20)
        );
        assert_eq!(MethodStats::default().average_latency(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_reporter_stops() {
        let metrics = Arc::new(Metrics::new());
        let shutdown = CancellationToken::new();
        let handle = Arc::clone(&metrics).spawn_reporter(Duration::from_millis(5), shutdown.clone());
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.cancel();
        handle.await.unwrap();
    }
}
