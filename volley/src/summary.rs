use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};

use crate::aggregate::RunResult;

/// Latency distribution of the iterations that got a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub min: Duration,
    pub mean: Duration,
    pub p50: Duration,
    pub p90: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub max: Duration,
}

/// Derived statistics of a finished run.
///
/// ```rust
/// use std::time::Duration;
/// use volley::{RunResult, Summary, CheckResult};
///
/// let mut result = RunResult::default();
/// result.consume(&[CheckResult::new("ok", true)], Some(Duration::from_millis(20)));
/// result.consume(&[CheckResult::new("ok", false)], Some(Duration::from_millis(40)));
/// result.elapsed = Duration::from_secs(1);
///
/// let summary = Summary::from(&result);
/// assert_eq!(summary.requests_per_second, 2.0);
/// assert_eq!(summary.pass_ratio["ok"], 0.5);
/// assert_eq!(summary.latency.unwrap().mean, Duration::from_millis(30));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_requests: u64,
    pub transport_failures: u64,
    pub requests_per_second: f64,
    /// Passed / evaluated, per check. 0 for a check that never ran.
    pub pass_ratio: BTreeMap<String, f64>,
    /// `None` when no iteration got a response.
    pub latency: Option<LatencySummary>,
}

impl From<&RunResult> for Summary {
    fn from(result: &RunResult) -> Self {
        let secs = result.elapsed.as_secs_f64();
        let requests_per_second = if secs > 0.0 {
            result.total_requests as f64 / secs
        } else {
            0.0
        };

        let pass_ratio = result
            .per_check_passed
            .keys()
            .chain(result.per_check_failed.keys())
            .map(|name| {
                let passed = result.passed(name);
                let total = passed + result.failed(name);
                let ratio = if total == 0 {
                    0.0
                } else {
                    passed as f64 / total as f64
                };
                (name.clone(), ratio)
            })
            .collect();

        Self {
            total_requests: result.total_requests,
            transport_failures: result.transport_failures,
            requests_per_second,
            pass_ratio,
            latency: latency_summary(&result.latency_samples),
        }
    }
}

impl From<RunResult> for Summary {
    fn from(result: RunResult) -> Self {
        Self::from(&result)
    }
}

fn latency_summary(samples: &[Duration]) -> Option<LatencySummary> {
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let (&min, &max) = (sorted.first()?, sorted.last()?);
    let total: Duration = sorted.iter().sum();

    Some(LatencySummary {
        min,
        mean: u32::try_from(sorted.len())
            .map(|n| total / n)
            .unwrap_or_else(|_| total.div_f64(sorted.len() as f64)),
        p50: percentile(&sorted, 50.0),
        p90: percentile(&sorted, 90.0),
        p95: percentile(&sorted, 95.0),
        p99: percentile(&sorted, 99.0),
        max,
    })
}

/// Nearest-rank percentile. `sorted` must be sorted and non-empty.
fn percentile(sorted: &[Duration], p: f64) -> Duration {
    let rank = (p / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::CheckResult;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn nearest_rank() {
        let sorted: Vec<_> = (1..=100).map(ms).collect();
        assert_eq!(percentile(&sorted, 50.0), ms(50));
        assert_eq!(percentile(&sorted, 99.0), ms(99));
        assert_eq!(percentile(&sorted, 100.0), ms(100));
        assert_eq!(percentile(&sorted, 0.0), ms(1));

        assert_eq!(percentile(&[ms(7)], 95.0), ms(7));
        assert_eq!(percentile(&[ms(1), ms(2), ms(3)], 50.0), ms(2));
    }

    #[test]
    fn latency_ignores_recording_order() {
        let summary = latency_summary(&[ms(30), ms(10), ms(20)]).unwrap();
        assert_eq!(summary.min, ms(10));
        assert_eq!(summary.max, ms(30));
        assert_eq!(summary.mean, ms(20));
        assert_eq!(summary.p50, ms(20));
    }

    #[test]
    fn empty_run() {
        let summary = Summary::from(RunResult::default());
        assert_eq!(summary.total_requests, 0);
        assert_eq!(summary.requests_per_second, 0.0);
        assert!(summary.latency.is_none());
        assert!(summary.pass_ratio.is_empty());
    }

    #[test]
    fn checks_that_never_ran_have_zero_ratio() {
        let mut result = RunResult::default();
        result.per_check_passed.insert("status".into(), 0);
        result.per_check_failed.insert("status".into(), 0);
        assert_eq!(Summary::from(&result).pass_ratio["status"], 0.0);
    }

    #[test]
    fn failed_iterations_count_in_ratio_but_not_latency() {
        let mut result = RunResult::default();
        result.consume(&[CheckResult::new("status", true)], Some(ms(10)));
        result.consume(&[CheckResult::new("status", false)], None);
        result.transport_failures = 1;
        result.elapsed = Duration::from_millis(500);

        let summary = Summary::from(&result);
        assert_eq!(summary.requests_per_second, 4.0);
        assert_eq!(summary.pass_ratio["status"], 0.5);
        assert_eq!(summary.transport_failures, 1);
        assert_eq!(summary.latency.unwrap().p99, ms(10));
    }
}
