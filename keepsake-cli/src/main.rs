/*!
Keepsake CLI - Command-line interface for the Keepsake snapshot system.

This CLI provides utilities for inspecting, verifying, and managing the
service snapshots and the tracker inside a Keepsake data directory.
*/

use clap::{Parser, Subcommand};
use keepsake_core::{read_snapshot, snapshot_path, KeepsakeError, Tracker};
use std::path::PathBuf;
use tabled::{Table, Tabled};
use tracing::{error, warn};

#[derive(Parser)]
#[command(name = "keepsake")]
#[command(about = "CLI for the Keepsake service snapshot system")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Data directory holding the tracker and snapshots
    #[arg(short, long, global = true, default_value = "./keepsake-data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every tracked service and its snapshot
    List {
        /// Show additional details
        #[arg(short, long)]
        detailed: bool,
    },
    /// Show details of one service's snapshot
    Show {
        /// Service name
        service: String,
    },
    /// Verify integrity of one service's snapshot
    Verify {
        /// Service name
        service: String,
    },
    /// Delete one service's snapshot file
    Delete {
        /// Service name
        service: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Last Save")]
    last_save: String,
    #[tabled(rename = "Snapshot")]
    snapshot: String,
    #[tabled(rename = "Size")]
    size: String,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cli.command {
        Commands::List { detailed } => list_services(&cli.data_dir, detailed),
        Commands::Show { service } => show_snapshot(&cli.data_dir, &service),
        Commands::Verify { service } => verify_snapshot(&cli.data_dir, &service),
        Commands::Delete { service, force } => delete_snapshot(&cli.data_dir, &service, force),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"))
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn list_services(data_dir: &PathBuf, detailed: bool) -> Result<(), anyhow::Error> {
    if !data_dir.exists() {
        println!("No data directory found at: {}", data_dir.display());
        return Ok(());
    }

    let tracker = Tracker::load(data_dir)?;
    if tracker.is_empty() {
        println!("No services have been saved yet");
        return Ok(());
    }

    let mut rows = Vec::new();
    for (service, timestamp) in tracker.entries() {
        let path = snapshot_path(data_dir, service);
        let (snapshot, size) = if path.exists() {
            let size = std::fs::metadata(&path)
                .map(|m| format_size(m.len()))
                .unwrap_or_else(|_| "Unknown".to_string());
            let snapshot = if detailed {
                match read_snapshot(&path) {
                    Ok((metadata, _)) => metadata.snapshot_id,
                    Err(e) => {
                        warn!("Failed to read snapshot for {}: {}", service, e);
                        "unreadable".to_string()
                    }
                }
            } else {
                "present".to_string()
            };
            (snapshot, size)
        } else {
            ("absent".to_string(), "-".to_string())
        };

        rows.push(ServiceRow {
            service: service.to_string(),
            last_save: format_timestamp(timestamp),
            snapshot,
            size,
        });
    }

    rows.sort_by(|a, b| a.service.cmp(&b.service));
    let table = Table::new(rows);
    println!("{table}");

    Ok(())
}

fn show_snapshot(data_dir: &PathBuf, service: &str) -> Result<(), anyhow::Error> {
    let path = snapshot_path(data_dir, service);

    match read_snapshot(&path) {
        Ok((metadata, state)) => {
            println!("Snapshot Details:");
            println!("  Service: {}", metadata.service_name);
            println!("  Snapshot ID: {}", metadata.snapshot_id);
            println!(
                "  Created: {}",
                format_timestamp(metadata.timestamp.timestamp())
            );
            println!("  Format Version: {}", metadata.format_version);
            println!("  Content Hash: {}", metadata.content_hash);
            println!("  Compression: {}", metadata.compression_algorithm);
            println!(
                "  State Size: {}",
                format_size(metadata.uncompressed_size as u64)
            );

            if let Some(description) = &metadata.description {
                println!("  Description: {description}");
            }

            if let serde_json::Value::Object(map) = &state {
                println!("  Top-level keys: {}", map.len());
            }
        }
        Err(e) => {
            error!("Failed to read snapshot: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}

fn verify_snapshot(data_dir: &PathBuf, service: &str) -> Result<(), anyhow::Error> {
    let path = snapshot_path(data_dir, service);

    match read_snapshot(&path) {
        Ok((metadata, _state)) => {
            if metadata.service_name != service {
                error!(
                    "✗ Snapshot belongs to service '{}', not '{}'",
                    metadata.service_name, service
                );
                return Err(anyhow::anyhow!("Snapshot/service mismatch"));
            }
            println!("✓ Snapshot is valid and integrity check passed");
        }
        Err(KeepsakeError::IntegrityCheckFailed { expected, actual }) => {
            error!("✗ Integrity check failed:");
            error!("  Expected hash: {}", expected);
            error!("  Actual hash: {}", actual);
            return Err(anyhow::anyhow!("Integrity check failed"));
        }
        Err(e) => {
            error!("✗ Failed to verify snapshot: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}

fn delete_snapshot(data_dir: &PathBuf, service: &str, force: bool) -> Result<(), anyhow::Error> {
    let path = snapshot_path(data_dir, service);
    if !path.exists() {
        println!("No snapshot found for service '{service}'");
        return Ok(());
    }

    if !force {
        print!("Are you sure you want to delete the snapshot for '{service}'? (y/N): ");
        use std::io::{self, Write};
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().to_lowercase().starts_with('y') {
            println!("Deletion cancelled");
            return Ok(());
        }
    }

    std::fs::remove_file(&path)?;
    println!("✓ Snapshot deleted successfully");

    Ok(())
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_timestamp(timestamp: i64) -> String {
    use chrono::{Local, TimeZone};

    match Local.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => timestamp.to_string(),
    }
}
