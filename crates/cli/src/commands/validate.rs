//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::OutputBlueprint;
use dispatcher::{parse_properties, TransportRegistry};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    stream: String,
    attribute_count: usize,
    transport_count: usize,
    share_pools: bool,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();
    let invalid = |error: String| ValidationResult {
        valid: false,
        config_path: config_path.clone(),
        error: Some(error),
        warnings: None,
        summary: None,
    };

    if !args.config.exists() {
        return invalid(format!("File not found: {}", args.config.display()));
    }

    let blueprint = match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => blueprint,
        Err(e) => return invalid(e.to_string()),
    };

    // Build (without connecting) every transport to catch type and routing errors
    if let Err(e) = check_transports(&blueprint) {
        return invalid(e);
    }

    let warnings = collect_warnings(&blueprint);
    ValidationResult {
        valid: true,
        config_path: config_path.clone(),
        error: None,
        warnings: if warnings.is_empty() {
            None
        } else {
            Some(warnings)
        },
        summary: Some(ConfigSummary {
            version: format!("{:?}", blueprint.version),
            stream: blueprint.stream.id.clone(),
            attribute_count: blueprint.stream.attributes.len(),
            transport_count: blueprint.transports.len(),
            share_pools: blueprint.share_pools,
        }),
    }
}

fn check_transports(blueprint: &OutputBlueprint) -> Result<(), String> {
    let registry = TransportRegistry::with_builtins();
    for descriptor in &blueprint.transports {
        registry
            .create(descriptor, &blueprint.stream)
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &OutputBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    for descriptor in &blueprint.transports {
        if let Some(raw) = descriptor.properties.as_deref() {
            let properties = parse_properties(raw);
            for entry in properties.malformed() {
                warnings.push(format!(
                    "Transport '{}' ignores malformed property '{}'",
                    descriptor.name, entry
                ));
            }
        }

        if descriptor.pool.min_workers == 0 {
            warnings.push(format!(
                "Transport '{}' keeps no idle workers (pool.min_workers = 0)",
                descriptor.name
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Stream: {}", summary.stream);
            println!("  Attributes: {}", summary.attribute_count);
            println!("  Transports: {}", summary.transport_count);
            println!("  Shared pools: {}", summary.share_pools);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
