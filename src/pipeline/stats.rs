//! Per-run counters.

use super::job_pool::PoolStats;
use serde::Serialize;
use std::time::Duration;

/// Statistics from one pipeline run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunStats {
    /// External jobs launched
    pub jobs_submitted: usize,

    /// Outputs already on disk, so their job was not launched
    pub outputs_skipped: usize,

    /// Stage barriers passed
    pub stages_completed: usize,

    /// Most external jobs running at once
    pub peak_concurrent_jobs: usize,

    /// Intermediate files removed
    pub files_removed: usize,

    /// Wall-clock time of the run
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
}

impl RunStats {
    pub(crate) fn absorb_pool(&mut self, pool: PoolStats) {
        self.jobs_submitted = pool.submitted;
        self.peak_concurrent_jobs = pool.peak_outstanding;
    }
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Stages: {}, Jobs: {}, Skipped: {}, Peak concurrency: {}, Removed: {}, Elapsed: {:.1}s",
            self.stages_completed,
            self.jobs_submitted,
            self.outputs_skipped,
            self.peak_concurrent_jobs,
            self.files_removed,
            self.elapsed.as_secs_f64()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_stats_display() {
        let stats = RunStats {
            jobs_submitted: 12,
            outputs_skipped: 3,
            stages_completed: 9,
            peak_concurrent_jobs: 4,
            files_removed: 6,
            elapsed: Duration::from_millis(2500),
        };
        let display = stats.to_string();
        assert!(display.contains("Jobs: 12"));
        assert!(display.contains("Skipped: 3"));
        assert!(display.contains("2.5s"));
    }

    #[test]
    fn test_run_stats_serializes_elapsed_as_seconds() {
        let stats = RunStats {
            elapsed: Duration::from_millis(1500),
            ..Default::default()
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["elapsed"], 1.5);
    }
}
