use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::{next_fire_ms, ScheduleSpec};

const MAX_SLEEP_MS: u64 = 60_000;

/// One cycle of periodic work. An `Err` marks the cycle failed; the job
/// loop logs it and waits for the next firing — it never retries within
/// the same firing.
#[async_trait]
pub trait CycleTask: Send + Sync {
    async fn run_cycle(&self) -> Result<()>;
}

/// A spawned periodic job. Each firing is isolated: a failed cycle never
/// crashes the process or blocks the next scheduled firing.
pub struct Job {
    name: String,
    handle: JoinHandle<()>,
}

impl Job {
    pub fn spawn(name: impl Into<String>, spec: ScheduleSpec, task: Arc<dyn CycleTask>) -> Self {
        let name = name.into();
        let loop_name = name.clone();
        let handle = tokio::spawn(async move {
            loop {
                let now_ms = Utc::now().timestamp_millis();
                let next = match next_fire_ms(&spec, now_ms) {
                    Ok(next) => next,
                    Err(e) => {
                        tracing::error!("job {loop_name}: schedule unusable, stopping: {e}");
                        return;
                    }
                };

                // Sleep in bounded slices so a stop lands promptly.
                while Utc::now().timestamp_millis() < next {
                    let remaining = (next - Utc::now().timestamp_millis()).max(0) as u64;
                    tokio::time::sleep(Duration::from_millis(remaining.min(MAX_SLEEP_MS))).await;
                }

                let started = Utc::now();
                match task.run_cycle().await {
                    Ok(()) => {
                        tracing::info!(
                            "job {loop_name}: cycle ok ({}ms)",
                            (Utc::now() - started).num_milliseconds()
                        );
                    }
                    Err(e) => {
                        tracing::error!("job {loop_name}: cycle failed: {e:#}");
                    }
                }
            }
        });
        Self { name, handle }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
