//! Pipeline execution engine

use anyhow::Context;
use dimload_core::units::{
    ProductDimensionBuilder, PurchaseFactBuilder, TimeDimensionBuilder, VendorDimensionBuilder,
};
use dimload_core::{Config, SourceDatabase, TaskGraph, Unit, Warehouse};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Instrument;

use crate::error::Result;
use crate::jobs::RunReport;
use crate::postgres::{PgSource, PgWarehouse};
use crate::scheduler::Scheduler;

/// Runtime engine for loading the purchasing star schema
pub struct Runtime {
    config: Config,
    source: Arc<dyn SourceDatabase>,
    warehouse: Arc<dyn Warehouse>,
    scheduler: Scheduler,
}

impl Runtime {
    /// Create a runtime over the given connectors
    pub fn new(
        config: Config,
        source: Arc<dyn SourceDatabase>,
        warehouse: Arc<dyn Warehouse>,
    ) -> Self {
        let scheduler = Scheduler::new(&config.project.pipeline);
        Self {
            config,
            source,
            warehouse,
            scheduler,
        }
    }

    /// Connect to the configured source and warehouse databases
    pub async fn connect(config: Config) -> Result<Self> {
        tracing::debug!("Connecting to source database...");
        let source = PgSource::connect(&config.project.source)
            .await
            .context("Failed to connect to source database")?;

        tracing::debug!("Connecting to warehouse...");
        let warehouse = PgWarehouse::connect(&config.project.warehouse)
            .await
            .context("Failed to connect to warehouse")?;

        Ok(Self::new(config, Arc::new(source), Arc::new(warehouse)))
    }

    /// Replace the scheduler, e.g. to shorten retry delays
    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Dependency graph of the units
    pub fn graph(&self) -> TaskGraph {
        TaskGraph::purchasing()
    }

    /// Every unit, keyed by name
    pub fn units(&self) -> HashMap<String, Arc<dyn Unit>> {
        let project = &self.config.project;
        let units: Vec<Arc<dyn Unit>> = vec![
            Arc::new(TimeDimensionBuilder::new(
                self.warehouse.clone(),
                project.time_dimension.clone(),
            )),
            Arc::new(ProductDimensionBuilder::new(
                self.source.clone(),
                self.warehouse.clone(),
            )),
            Arc::new(VendorDimensionBuilder::new(
                self.source.clone(),
                self.warehouse.clone(),
            )),
            Arc::new(PurchaseFactBuilder::new(
                self.source.clone(),
                self.warehouse.clone(),
                project.facts.clone(),
                &project.time_dimension,
            )),
        ];
        units
            .into_iter()
            .map(|unit| (unit.name().to_string(), unit))
            .collect()
    }

    /// Run every unit in dependency order
    pub async fn run(&self) -> Result<RunReport> {
        let graph = self.graph();
        graph.validate()?;
        let units = self.units();

        let span = tracing::info_span!("pipeline", project = %self.config.project.name);
        async {
            tracing::info!("Starting pipeline run");
            let report = self.scheduler.execute(&graph, &units).await?;
            log_summary(&report);
            Ok::<_, anyhow::Error>(report)
        }
        .instrument(span)
        .await
    }

    /// Run one unit by name, without its upstream units
    pub async fn run_unit(&self, name: &str) -> Result<RunReport> {
        let units = self.units();
        let unit = units.get(name).with_context(|| {
            let mut known: Vec<&str> = units.keys().map(String::as_str).collect();
            known.sort_unstable();
            format!("Unknown unit '{}' (expected one of: {})", name, known.join(", "))
        })?;

        let span = tracing::info_span!("pipeline", project = %self.config.project.name, unit = name);
        let report = self
            .scheduler
            .execute_one(unit.as_ref())
            .instrument(span)
            .await;
        log_summary(&report);
        Ok(report)
    }
}

fn log_summary(report: &RunReport) {
    if report.succeeded() {
        tracing::info!(
            run_id = %report.run_id,
            "Run finished: {} unit(s) succeeded",
            report.jobs.len()
        );
    } else {
        tracing::error!(
            run_id = %report.run_id,
            "Run finished with failures: {}",
            report.unsuccessful().join(", ")
        );
    }
}
