//! `info` command implementation.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use contracts::{OutputBlueprint, PoolSettings};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::ensure_config_exists;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    stream: StreamInfo,
    share_pools: bool,
    transport_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    transports: Vec<TransportInfo>,
}

#[derive(Serialize)]
struct StreamInfo {
    id: String,
    attributes: Vec<AttributeInfo>,
}

#[derive(Serialize)]
struct AttributeInfo {
    name: String,
    attribute_type: String,
}

#[derive(Serialize)]
struct TransportInfo {
    name: String,
    transport_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination: Option<String>,
    routing_key: String,
    pool: PoolSettings,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    properties: BTreeMap<String, String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    ensure_config_exists(&args.config)?;

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&blueprint, args);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint, args);
    }

    Ok(())
}

fn build_config_info(blueprint: &OutputBlueprint, args: &InfoArgs) -> ConfigInfo {
    let transports = if args.transports {
        blueprint
            .transports
            .iter()
            .map(|t| TransportInfo {
                name: t.name.clone(),
                transport_type: t.transport_type.clone(),
                destination: t.destination.clone(),
                routing_key: routing_display(t.routing_key.as_deref(), &t.name),
                pool: t.pool,
                properties: t
                    .properties
                    .as_deref()
                    .map(|raw| {
                        dispatcher::parse_properties(raw)
                            .iter()
                            .map(|(k, v)| (k.to_string(), v.to_string()))
                            .collect()
                    })
                    .unwrap_or_default(),
            })
            .collect()
    } else {
        Vec::new()
    };

    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        stream: StreamInfo {
            id: blueprint.stream.id.clone(),
            attributes: blueprint
                .stream
                .attributes
                .iter()
                .map(|a| AttributeInfo {
                    name: a.name.clone(),
                    attribute_type: format!("{:?}", a.attribute_type),
                })
                .collect(),
        },
        share_pools: blueprint.share_pools,
        transport_count: blueprint.transports.len(),
        transports,
    }
}

/// Routing key as configured, or the transport name it falls back to
fn routing_display(routing_key: Option<&str>, name: &str) -> String {
    routing_key.unwrap_or(name).to_string()
}

fn print_config_info(blueprint: &OutputBlueprint, args: &InfoArgs) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║               Event Fan-out Configuration                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    // Stream
    println!("📍 Stream");
    println!("   ├─ Version: {:?}", blueprint.version);
    println!("   ├─ Id: {}", blueprint.stream.id);
    println!("   └─ Attributes ({}):", blueprint.stream.attributes.len());
    for (i, attribute) in blueprint.stream.attributes.iter().enumerate() {
        let prefix = if i == blueprint.stream.attributes.len() - 1 {
            "└─"
        } else {
            "├─"
        };
        println!(
            "        {} {} ({:?})",
            prefix, attribute.name, attribute.attribute_type
        );
    }

    // Transports
    println!("\n📤 Transports ({})", blueprint.transports.len());
    for (i, transport) in blueprint.transports.iter().enumerate() {
        let is_last = i == blueprint.transports.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child_prefix = if is_last { "   " } else { "│  " };

        println!(
            "   {} {} ({})",
            prefix, transport.name, transport.transport_type
        );

        if args.transports {
            println!(
                "   {}  ├─ Destination: {}",
                child_prefix,
                transport.destination.as_deref().unwrap_or("-")
            );
            println!(
                "   {}  ├─ Routing key: {}",
                child_prefix,
                routing_display(transport.routing_key.as_deref(), &transport.name)
            );
            if let Some(ref properties) = transport.properties {
                println!("   {}  ├─ Properties: {}", child_prefix, properties);
            }
            println!("   {}  └─ Pool: {}", child_prefix, transport.pool);
        }
    }

    println!(
        "\n⚙️  Dispatch pools: {}",
        if blueprint.share_pools {
            "shared by identical settings"
        } else {
            "one per transport"
        }
    );

    println!();
}
