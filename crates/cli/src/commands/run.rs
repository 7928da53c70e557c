//! `run` command implementation.

use anyhow::{Context, Result};
use contracts::OutputBlueprint;
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::ensure_config_exists;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    ensure_config_exists(&args.config)?;

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    info!(
        stream = %blueprint.stream.id,
        attributes = blueprint.stream.attributes.len(),
        transports = blueprint.transports.len(),
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline_config = PipelineConfig {
        blueprint,
        input: args.input.clone(),
        batch_size: args.batch_size,
        max_events: if args.max_events == 0 {
            None
        } else {
            Some(args.max_events)
        },
        timeout: if args.timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(args.timeout))
        },
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    };

    let pipeline = Pipeline::new(pipeline_config);

    info!(input = ?args.input, "Starting pipeline...");

    let stats = pipeline
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        events = stats.events_read,
        batches = stats.dispatch.total_batches,
        duration_secs = stats.duration.as_secs_f64(),
        "Pipeline completed"
    );
    stats.print_summary();

    info!("Event fan-out finished");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
///
/// A handler that fails to install never resolves.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &OutputBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Stream: {}", blueprint.stream.id);
    for attribute in &blueprint.stream.attributes {
        println!("  - {} ({:?})", attribute.name, attribute.attribute_type);
    }

    println!("\nTransports ({}):", blueprint.transports.len());
    for transport in &blueprint.transports {
        println!(
            "  - {} ({}) -> {}",
            transport.name,
            transport.transport_type,
            transport.destination.as_deref().unwrap_or("-")
        );
    }

    println!(
        "\nDispatch pools: {}",
        if blueprint.share_pools {
            "shared by identical settings"
        } else {
            "one per transport"
        }
    );

    println!();
}
