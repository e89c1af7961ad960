//! Show the execution plan

use anyhow::{Context, Result};
use dimload_core::{Config, TaskGraph};
use std::collections::BTreeMap;

/// Run the plan command
pub async fn run(config_path: &str, json: bool) -> Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    let graph = TaskGraph::purchasing();
    graph.validate()?;
    let layers = graph.layers()?;
    // Reloading a task truncates everything downstream of it
    let invalidates: BTreeMap<&str, Vec<&str>> = graph
        .tasks()
        .map(|task| (task, graph.downstream_of(task)))
        .filter(|(_, downstream)| !downstream.is_empty())
        .collect();

    if json {
        let plan = serde_json::json!({
            "project": config.project.name,
            "schema": config.project.warehouse.schema,
            "layers": layers,
            "invalidates": invalidates,
            "facts": config.project.facts,
        });
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("Plan for '{}'", config.project.name);
    for (i, layer) in layers.iter().enumerate() {
        println!("  step {}: {}", i + 1, layer.join(", "));
        for task in layer {
            let upstream = graph.upstream_of(task);
            if !upstream.is_empty() {
                println!("    {} waits for {}", task, upstream.join(", "));
            }
            if let Some(downstream) = invalidates.get(task.as_str()) {
                println!("    reloading {} empties {}", task, downstream.join(", "));
            }
        }
    }
    let facts = &config.project.facts;
    println!(
        "Lookup misses: {:?}, zero quantities: {:?}, dates outside calendar: {:?}",
        facts.on_lookup_miss, facts.on_zero_quantity, facts.on_date_out_of_range
    );
    Ok(())
}
