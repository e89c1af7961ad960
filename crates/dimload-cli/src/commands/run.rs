//! Run the warehouse load

use anyhow::{Context, Result};
use dimload_core::Config;
use dimload_runtime::{JobStatus, RunReport, Runtime};

/// Run the run command
pub async fn run(config_path: &str, unit: Option<&str>, json: bool) -> Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    tracing::info!("Loading project '{}'", config.project.name);

    let runtime = Runtime::connect(config).await?;
    let report = match unit {
        Some(name) => runtime.run_unit(name).await?,
        None => runtime.run().await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    if !report.succeeded() {
        anyhow::bail!(
            "Run {} failed: {}",
            report.run_id,
            report.unsuccessful().join(", ")
        );
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!("Run {}", report.run_id);
    for job in &report.jobs {
        match job.status {
            JobStatus::Succeeded => {
                let (rows, digest) = job
                    .report
                    .as_ref()
                    .map(|r| (r.rows, r.digest.as_str()))
                    .unwrap_or((0, ""));
                println!(
                    "  ✓ {:<14} {:>8} rows  {} ms  sha256:{}",
                    job.unit,
                    rows,
                    job.duration_ms,
                    digest.get(..12).unwrap_or(digest)
                );
            }
            JobStatus::Failed => println!(
                "  ✗ {:<14} failed after {} attempt(s): {}",
                job.unit,
                job.attempts,
                job.error.as_deref().unwrap_or("unknown error")
            ),
            JobStatus::Skipped => println!(
                "  - {:<14} skipped: {}",
                job.unit,
                job.error.as_deref().unwrap_or("upstream failed")
            ),
        }
    }
}
