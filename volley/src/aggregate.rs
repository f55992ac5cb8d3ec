use std::{collections::BTreeMap, time::Duration};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::check::CheckResult;

/// Everything a run recorded.
///
/// `RunResult` only stores raw counters and samples. Derived statistics such as
/// percentiles or pass ratios live in [`crate::Summary`].
///
/// Every recorded iteration is checked by every check, so for each check name
/// `total_requests == passed(name) + failed(name)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub total_requests: u64,
    pub per_check_passed: BTreeMap<String, u64>,
    pub per_check_failed: BTreeMap<String, u64>,
    /// Latency of every iteration that got a response, in recording order.
    pub latency_samples: Vec<Duration>,
    /// Iterations that never produced a response.
    pub transport_failures: u64,
    /// Completed iterations per worker id.
    pub worker_iterations: BTreeMap<usize, u64>,
    /// Wall-clock time from run start until every worker stopped.
    pub elapsed: Duration,
}

impl RunResult {
    pub fn passed(&self, check: &str) -> u64 {
        self.per_check_passed.get(check).copied().unwrap_or(0)
    }

    pub fn failed(&self, check: &str) -> u64 {
        self.per_check_failed.get(check).copied().unwrap_or(0)
    }

    /// Incorporate one iteration.
    pub fn consume(&mut self, results: &[CheckResult], latency: Option<Duration>) {
        self.total_requests += 1;
        for result in results {
            let counters = if result.passed {
                &mut self.per_check_passed
            } else {
                &mut self.per_check_failed
            };
            *counters.entry(result.name.clone()).or_insert(0) += 1;
        }
        if let Some(latency) = latency {
            self.latency_samples.push(latency);
        }
    }

    /// Combine two results into one. Samples of `other` are appended after ours.
    pub fn merge(&mut self, other: Self) {
        self.total_requests += other.total_requests;
        for (name, n) in other.per_check_passed {
            *self.per_check_passed.entry(name).or_insert(0) += n;
        }
        for (name, n) in other.per_check_failed {
            *self.per_check_failed.entry(name).or_insert(0) += n;
        }
        self.latency_samples.extend(other.latency_samples);
        self.transport_failures += other.transport_failures;
        for (worker, n) in other.worker_iterations {
            *self.worker_iterations.entry(worker).or_insert(0) += n;
        }
        self.elapsed = self.elapsed.max(other.elapsed);
    }

    /// Whether every check accounts for every recorded request.
    pub fn is_consistent(&self) -> bool {
        self.per_check_passed
            .keys()
            .chain(self.per_check_failed.keys())
            .all(|name| self.passed(name) + self.failed(name) == self.total_requests)
    }
}

/// Thread-safe accumulator shared by every virtual user of a run.
///
/// All mutation goes through [`ResultAggregator::record`] under a mutex. The
/// scheduler reads it once, with [`ResultAggregator::snapshot`], after every
/// worker has stopped.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    inner: Mutex<RunResult>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// An aggregator whose counters list every given check, even ones that
    /// never pass or never fail.
    pub fn for_checks<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut result = RunResult::default();
        for name in names {
            result.per_check_passed.insert(name.to_string(), 0);
            result.per_check_failed.insert(name.to_string(), 0);
        }
        Self {
            inner: Mutex::new(result),
        }
    }

    pub fn record(&self, results: &[CheckResult], latency: Option<Duration>) {
        self.inner.lock().consume(results, latency);
    }

    /// Records an iteration that never got a response: no latency sample.
    pub fn record_transport_failure(&self, results: &[CheckResult]) {
        let mut inner = self.inner.lock();
        inner.consume(results, None);
        inner.transport_failures += 1;
    }

    pub fn snapshot(&self) -> RunResult {
        self.inner.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    fn results(status: bool, found: bool) -> Vec<CheckResult> {
        vec![
            CheckResult::new("status", status),
            CheckResult::new("found", found),
        ]
    }

    #[test]
    fn record_counts_each_check() {
        let agg = ResultAggregator::for_checks(["status", "found"]);
        agg.record(&results(true, false), Some(Duration::from_millis(5)));
        agg.record(&results(true, true), Some(Duration::from_millis(7)));
        agg.record_transport_failure(&results(false, false));

        let snap = agg.snapshot();
        assert_eq!(snap.total_requests, 3);
        assert_eq!((snap.passed("status"), snap.failed("status")), (2, 1));
        assert_eq!((snap.passed("found"), snap.failed("found")), (1, 2));
        assert_eq!(
            snap.latency_samples,
            [Duration::from_millis(5), Duration::from_millis(7)]
        );
        assert_eq!(snap.transport_failures, 1);
        assert!(snap.is_consistent());
    }

    #[test]
    fn seeded_counters_start_at_zero() {
        let snap = ResultAggregator::for_checks(["a"]).snapshot();
        assert_eq!(snap.per_check_passed["a"], 0);
        assert_eq!(snap.per_check_failed["a"], 0);
        assert!(snap.is_consistent());
    }

    #[test]
    fn snapshot_is_idempotent() {
        let agg = ResultAggregator::new();
        agg.record(&results(true, true), Some(Duration::from_millis(1)));
        assert_eq!(agg.snapshot(), agg.snapshot());
    }

    #[test]
    fn concurrent_records_are_not_lost() {
        let agg = Arc::new(ResultAggregator::for_checks(["status", "found"]));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let agg = Arc::clone(&agg);
                thread::spawn(move || {
                    for j in 0..1000 {
                        let latency = Duration::from_micros(j);
                        agg.record(&results(j % 2 == 0, i % 2 == 0), Some(latency));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let snap = agg.snapshot();
        assert_eq!(snap.total_requests, 8000);
        assert_eq!(snap.latency_samples.len(), 8000);
        assert_eq!(snap.passed("status"), 4000);
        assert_eq!(snap.passed("found"), 4000);
        assert!(snap.is_consistent());
    }

    #[test]
    fn merge_adds_counters() {
        let mut a = RunResult::default();
        a.consume(&results(true, false), Some(Duration::from_millis(1)));
        a.worker_iterations.insert(0, 1);
        let mut b = RunResult::default();
        b.consume(&results(false, false), None);
        b.transport_failures = 1;
        b.worker_iterations.insert(0, 1);
        b.worker_iterations.insert(1, 1);

        a.merge(b);
        assert_eq!(a.total_requests, 2);
        assert_eq!(a.failed("found"), 2);
        assert_eq!(a.passed("status"), 1);
        assert_eq!(a.transport_failures, 1);
        assert_eq!(a.worker_iterations[&0], 2);
        assert_eq!(a.latency_samples.len(), 1);
        assert!(a.is_consistent());
    }

    #[test]
    fn inconsistent_result_is_detected() {
        let mut r = RunResult::default();
        r.consume(&[CheckResult::new("a", true)], None);
        r.consume(&[], None);
        assert!(!r.is_consistent());
    }
}
