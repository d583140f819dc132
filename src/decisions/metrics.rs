//! Thread-safe operation metrics.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Counters and latency accumulator for one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpMetrics {
    /// Total invocations
    pub count: u64,
    /// Invocations that failed
    pub failures: u64,
    /// Sum of all latencies
    pub total_latency: Duration,
}

impl OpMetrics {
    /// Mean latency across all invocations.
    pub fn mean_latency(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total_latency / self.count as u32
        }
    }

    /// Success fraction in [0, 1].
    pub fn success_rate(&self) -> f64 {
        if self.count == 0 {
            1.0
        } else {
            (self.count - self.failures) as f64 / self.count as f64
        }
    }
}

/// Records latency and success per named operation.
///
/// Callers expose the snapshot as SLIs; the recorder itself never blocks
/// on anything but its own mutex.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    ops: Mutex<HashMap<String, OpMetrics>>,
}

impl MetricsRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one invocation of `op`.
    pub fn record(&self, op: &str, latency: Duration, success: bool) {
        let mut ops = self.ops.lock().expect("metrics mutex poisoned");
        let entry = ops.entry(op.to_string()).or_default();
        entry.count += 1;
        entry.total_latency += latency;
        if !success {
            entry.failures += 1;
        }
    }

    /// Copy of the metrics for one operation.
    pub fn get(&self, op: &str) -> Option<OpMetrics> {
        self.ops
            .lock()
            .expect("metrics mutex poisoned")
            .get(op)
            .cloned()
    }

    /// Copy of all metrics.
    pub fn snapshot(&self) -> HashMap<String, OpMetrics> {
        self.ops.lock().expect("metrics mutex poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates() {
        let recorder = MetricsRecorder::new();
        recorder.record("log", Duration::from_millis(2), true);
        recorder.record("log", Duration::from_millis(4), false);

        let metrics = recorder.get("log").unwrap();
        assert_eq!(metrics.count, 2);
        assert_eq!(metrics.failures, 1);
        assert_eq!(metrics.total_latency, Duration::from_millis(6));
        assert_eq!(metrics.mean_latency(), Duration::from_millis(3));
        assert_eq!(metrics.success_rate(), 0.5);
    }

    #[test]
    fn test_unknown_op_is_none() {
        let recorder = MetricsRecorder::new();
        assert!(recorder.get("nope").is_none());
    }

    #[test]
    fn test_concurrent_records_are_counted() {
        use std::sync::Arc;
        let recorder = Arc::new(MetricsRecorder::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let recorder = Arc::clone(&recorder);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    recorder.record("op", Duration::from_micros(10), true);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(recorder.get("op").unwrap().count, 800);
    }
}
