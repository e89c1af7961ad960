//! Dependency-ordered unit execution
//!
//! The scheduler walks the layers of a [`TaskGraph`]. Units in one layer run
//! concurrently; the next layer starts only when the whole layer is done.
//! A unit whose upstream did not succeed is skipped. A failed unit is
//! retried from the beginning, never resumed.

use dimload_core::config::PipelineConfig;
use dimload_core::{TaskGraph, Unit};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

use crate::error::Result;
use crate::jobs::{JobOutcome, JobStatus, RunReport};

/// Runs units in dependency order
#[derive(Debug, Clone)]
pub struct Scheduler {
    owner: String,
    retries: u32,
    retry_delay: Duration,
}

impl Scheduler {
    /// Create a scheduler from the pipeline settings
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            owner: config.owner.clone(),
            retries: config.retries,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        }
    }

    /// Override the pause between attempts
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Run every task of `graph`.
    ///
    /// Returns an error only when the graph itself is unusable (cycle,
    /// unknown task, task without a unit). Unit failures are reported in
    /// the returned [`RunReport`].
    pub async fn execute(
        &self,
        graph: &TaskGraph,
        units: &HashMap<String, Arc<dyn Unit>>,
    ) -> Result<RunReport> {
        let layers = graph.layers()?;
        if let Some(missing) = graph.tasks().find(|t| !units.contains_key(*t)) {
            anyhow::bail!("task '{}' has no unit to run", missing);
        }

        let mut report = RunReport::new(&self.owner);
        let span = tracing::info_span!("run", run_id = %report.run_id);
        let mut blocked: HashSet<String> = HashSet::new();

        for layer in layers {
            let mut runnable = Vec::new();
            for task in layer {
                let failed_upstream: Vec<&str> = graph
                    .upstream_of(&task)
                    .into_iter()
                    .filter(|up| blocked.contains(*up))
                    .collect();
                if failed_upstream.is_empty() {
                    runnable.push(task);
                } else {
                    let reason = format!("upstream {} did not succeed", failed_upstream.join(", "));
                    span.in_scope(|| tracing::warn!("Skipping {}: {}", task, reason));
                    report.jobs.push(JobOutcome::skipped(task.as_str(), reason));
                    blocked.insert(task);
                }
            }

            let outcomes = join_all(
                runnable
                    .iter()
                    .map(|task| self.run_with_retries(task, units[task].as_ref())),
            )
            .instrument(span.clone())
            .await;

            for outcome in outcomes {
                if outcome.status != JobStatus::Succeeded {
                    blocked.insert(outcome.unit.clone());
                }
                report.jobs.push(outcome);
            }
        }

        Ok(report)
    }

    /// Run a single unit with retries, ignoring its dependencies
    pub async fn execute_one(&self, unit: &dyn Unit) -> RunReport {
        let mut report = RunReport::new(&self.owner);
        let span = tracing::info_span!("run", run_id = %report.run_id);
        let outcome = self
            .run_with_retries(unit.name(), unit)
            .instrument(span)
            .await;
        report.jobs.push(outcome);
        report
    }

    async fn run_with_retries(&self, name: &str, unit: &dyn Unit) -> JobOutcome {
        let started = Instant::now();
        let max_attempts = self.retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::info!("Running {} (attempt {}/{})", name, attempt, max_attempts);
            match unit.run().await {
                Ok(load) => {
                    return JobOutcome::succeeded(name, attempt, elapsed_ms(started), load);
                }
                Err(e) if attempt < max_attempts => {
                    tracing::warn!(
                        "{} failed on attempt {}: {}; retrying in {:?}",
                        name,
                        attempt,
                        e,
                        self.retry_delay
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    tracing::error!("{} failed after {} attempt(s): {}", name, attempt, e);
                    return JobOutcome::failed(name, attempt, elapsed_ms(started), e.to_string());
                }
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dimload_core::{Error, LoadReport};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Records its start order and fails a fixed number of times first
    struct Probe {
        name: &'static str,
        failures_left: AtomicU32,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Unit for Probe {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn run(&self) -> dimload_core::Result<LoadReport> {
            self.log.lock().unwrap().push(self.name);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(Error::warehouse(self.name, "simulated"));
            }
            LoadReport::new(self.name, 0, &[0u8; 0])
        }
    }

    fn probes(
        failing: &[(&'static str, u32)],
    ) -> (HashMap<String, Arc<dyn Unit>>, Arc<Mutex<Vec<&'static str>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut units: HashMap<String, Arc<dyn Unit>> = HashMap::new();
        for name in ["dim_time", "dim_product", "dim_vendor", "fact_purchase"] {
            let failures = failing
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, f)| *f)
                .unwrap_or(0);
            units.insert(
                name.to_string(),
                Arc::new(Probe {
                    name,
                    failures_left: AtomicU32::new(failures),
                    log: log.clone(),
                }),
            );
        }
        (units, log)
    }

    fn scheduler(retries: u32) -> Scheduler {
        Scheduler::new(&PipelineConfig {
            retries,
            ..PipelineConfig::default()
        })
        .with_retry_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_fact_runs_after_all_dimensions() {
        let (units, log) = probes(&[]);
        let report = scheduler(0)
            .execute(&TaskGraph::purchasing(), &units)
            .await
            .unwrap();

        assert!(report.succeeded());
        let order = log.lock().unwrap().clone();
        assert_eq!(order.len(), 4);
        assert_eq!(order[3], "fact_purchase");
        assert_eq!(report.owner, "data-engineering");
    }

    #[tokio::test]
    async fn test_failed_dimension_skips_fact() {
        let (units, log) = probes(&[("dim_vendor", 1)]);
        let report = scheduler(0)
            .execute(&TaskGraph::purchasing(), &units)
            .await
            .unwrap();

        assert!(!report.succeeded());
        assert_eq!(report.job("dim_vendor").unwrap().status, JobStatus::Failed);
        assert_eq!(report.job("dim_product").unwrap().status, JobStatus::Succeeded);
        let fact = report.job("fact_purchase").unwrap();
        assert_eq!(fact.status, JobStatus::Skipped);
        assert!(fact.error.as_deref().unwrap().contains("dim_vendor"));
        assert!(!log.lock().unwrap().contains(&"fact_purchase"));
    }

    #[tokio::test]
    async fn test_retry_reruns_whole_unit() {
        let (units, log) = probes(&[("dim_product", 2)]);
        let report = scheduler(2)
            .execute(&TaskGraph::purchasing(), &units)
            .await
            .unwrap();

        assert!(report.succeeded());
        assert_eq!(report.job("dim_product").unwrap().attempts, 3);
        let runs = log
            .lock()
            .unwrap()
            .iter()
            .filter(|n| **n == "dim_product")
            .count();
        assert_eq!(runs, 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let (units, _) = probes(&[("dim_time", 5)]);
        let report = scheduler(1)
            .execute(&TaskGraph::purchasing(), &units)
            .await
            .unwrap();

        let time = report.job("dim_time").unwrap();
        assert_eq!(time.status, JobStatus::Failed);
        assert_eq!(time.attempts, 2);
        assert_eq!(
            report.job("fact_purchase").unwrap().status,
            JobStatus::Skipped
        );
    }

    #[tokio::test]
    async fn test_missing_unit_is_an_error() {
        let (mut units, _) = probes(&[]);
        units.remove("dim_vendor");
        let result = scheduler(0).execute(&TaskGraph::purchasing(), &units).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_skip_propagates_down_a_chain() {
        let (units, _) = probes(&[("dim_time", 1)]);
        let graph = TaskGraph::new()
            .task("dim_time")
            .task("dim_product")
            .task("fact_purchase")
            .edge("dim_time", "dim_product")
            .edge("dim_product", "fact_purchase");
        let report = scheduler(0).execute(&graph, &units).await.unwrap();

        assert_eq!(report.jobs.len(), 3);
        assert_eq!(report.job("dim_product").unwrap().status, JobStatus::Skipped);
        assert_eq!(
            report.job("fact_purchase").unwrap().status,
            JobStatus::Skipped
        );
    }

    #[tokio::test]
    async fn test_execute_one() {
        let (units, _) = probes(&[]);
        let report = scheduler(0)
            .execute_one(units["fact_purchase"].as_ref())
            .await;
        assert_eq!(report.jobs.len(), 1);
        assert!(report.succeeded());
    }
}
