//! Validate configuration command

use anyhow::{Context, Result};
use dimload_core::{Config, TaskGraph};

/// Run the validate command
pub async fn run(config_path: &str) -> Result<()> {
    tracing::info!("Validating configuration: {}", config_path);

    let config = Config::load(config_path).context("Failed to load configuration")?;
    let project = &config.project;

    tracing::info!("✓ Project: {}", project.name);
    tracing::info!("✓ Owner: {}", project.pipeline.owner);
    tracing::info!(
        "✓ Calendar: {} to {}",
        project.time_dimension.start,
        project.time_dimension.end
    );
    tracing::info!(
        "✓ Warehouse schema: {} (batches of {})",
        project.warehouse.schema,
        project.warehouse.batch_size
    );

    TaskGraph::purchasing()
        .validate()
        .context("Invalid task graph")?;
    tracing::info!("✓ Task graph is well-formed");

    tracing::info!("✓ Configuration is valid");
    Ok(())
}
