//! Bounded pool of external processes.
//!
//! Jobs are waited on strictly in submission order: when the pool is full,
//! submission blocks on the *oldest* job, even if a newer one has already
//! finished. Capacity is therefore a sliding window over the submission
//! sequence rather than a load balancer.
//!
//! Each job's stdout/stderr is drained by its own task as soon as the process
//! starts, so a chatty tool never stalls on a full pipe while the pool is
//! waiting on an older job.

use super::tools::ToolCommand;
use crate::error::{PipelineError, Result};
use std::collections::VecDeque;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Lines of stderr kept in a failure report.
const STDERR_TAIL_LINES: usize = 20;

/// One in-flight external process.
struct Job {
    stage: String,
    command: String,
    handle: JoinHandle<std::io::Result<Output>>,
}

/// Counters for everything the pool has run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Jobs launched
    pub submitted: usize,

    /// Jobs that exited successfully
    pub completed: usize,

    /// Most jobs outstanding at any one time
    pub peak_outstanding: usize,
}

/// FIFO-bounded set of running external processes.
pub struct JobPool {
    capacity: usize,
    outstanding: VecDeque<Job>,
    stats: PoolStats,
}

impl JobPool {
    /// Create a pool running at most `capacity` processes at once (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            outstanding: VecDeque::new(),
            stats: PoolStats::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of jobs launched but not yet waited on.
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Launch `command`, first waiting on the oldest job while the pool is full.
    ///
    /// Returns the failure of an older job if one is found while making room;
    /// in that case `command` is not launched.
    pub async fn submit(&mut self, stage: &str, command: ToolCommand) -> Result<()> {
        while self.outstanding.len() >= self.capacity {
            self.wait_oldest().await?;
        }

        let rendered = command.to_string();
        tracing::info!("{}", rendered);

        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PipelineError::JobSpawn {
                stage: stage.to_string(),
                program: command.program.display().to_string(),
                source,
            })?;

        let handle = tokio::spawn(child.wait_with_output());

        self.outstanding.push_back(Job {
            stage: stage.to_string(),
            command: rendered,
            handle,
        });
        self.stats.submitted += 1;
        self.stats.peak_outstanding = self.stats.peak_outstanding.max(self.outstanding.len());

        Ok(())
    }

    /// Wait for every outstanding job, oldest first.
    ///
    /// Stops at the first failure; jobs still outstanding at that point are
    /// killed.
    pub async fn drain(&mut self) -> Result<()> {
        if !self.outstanding.is_empty() {
            tracing::info!("Waiting for {} jobs to finish", self.outstanding.len());
        }
        while !self.outstanding.is_empty() {
            if let Err(e) = self.wait_oldest().await {
                self.abort_all().await;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Kill every outstanding job.
    ///
    /// Returns once each job's task has been torn down, which kills its
    /// child, so no aborted process writes anything afterwards.
    pub async fn abort_all(&mut self) {
        let jobs: Vec<Job> = self.outstanding.drain(..).collect();
        for job in &jobs {
            tracing::warn!("{}: aborting `{}`", job.stage, job.command);
            job.handle.abort();
        }
        for job in jobs {
            // Cancelled tasks resolve to a JoinError; only their completion matters.
            let _ = job.handle.await;
        }
    }

    async fn wait_oldest(&mut self) -> Result<()> {
        let Some(job) = self.outstanding.pop_front() else {
            return Ok(());
        };

        let output = job
            .handle
            .await
            .map_err(std::io::Error::other)??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            tracing::debug!("{}: {}", job.stage, stdout.trim_end());
        }

        if !output.status.success() {
            return Err(PipelineError::JobFailed {
                stage: job.stage,
                command: job.command,
                code: output.status.code(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        self.stats.completed += 1;
        Ok(())
    }
}

impl Drop for JobPool {
    fn drop(&mut self) {
        // Dropping the task drops the child, and kill_on_drop reaps it.
        for job in self.outstanding.drain(..) {
            job.handle.abort();
        }
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}
