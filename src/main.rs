//! CLI entry point for rust_scan.
//!
//! Runs against the built-in demo scanner:
//!
//! ```bash
//! rust_scan devices
//! rust_scan options "dev 1" --json
//! rust_scan scan "dev 1" --set resolution=600 --set mode=Gray --output page.raw
//! ```
//!
//! `scan` writes the raw frame buffer; encoding it into an image format is
//! left to other tools.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use rust_scan::adapter::MockAdapter;
use rust_scan::capture::{CapturerHandle, ScanEvent};
use rust_scan::config::Settings;
use rust_scan::option::OptionTable;
use rust_scan::{logging, DeviceListModel, ScanError};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "rust_scan")]
#[command(about = "Scan images through the device access layer", long_about = None)]
struct Cli {
    /// Configuration file (defaults to config/rust_scan.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List attached devices
    Devices,

    /// Show the options of a device
    Options {
        device: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Scan one image and write the raw pixel data
    Scan {
        device: String,

        /// Option to set before scanning
        #[arg(long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,

        /// Output file
        #[arg(long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("Failed to load configuration")?;
    logging::init_from_settings(&settings).map_err(|e| anyhow!(e))?;

    let capturer = CapturerHandle::spawn(MockAdapter::demo(), &settings.worker)?;

    let result = match cli.command {
        Commands::Devices => list_devices(&capturer).await,
        Commands::Options { device, json } => {
            show_options(&capturer, &device, json, settings.display.max_listed_values).await
        }
        Commands::Scan {
            device,
            set,
            output,
        } => scan(&capturer, &device, &set, output).await,
    };

    capturer.shutdown().await?;
    result
}

async fn list_devices(capturer: &CapturerHandle) -> Result<()> {
    let model = DeviceListModel::new(capturer.clone());
    let devices = model.refresh().await?;

    if devices.is_empty() {
        println!("No devices found");
    }
    for device in devices.iter() {
        println!(
            "{}\t{} {} ({})",
            device.name, device.vendor, device.model, device.kind
        );
    }
    Ok(())
}

async fn show_options(
    capturer: &CapturerHandle,
    device: &str,
    json: bool,
    max_listed: usize,
) -> Result<()> {
    let table = capturer.open(device).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&options_json(&table, max_listed))?);
        return Ok(());
    }

    for entry in table.entries() {
        let option = match &entry.option {
            Ok(option) => option,
            Err(e) => {
                println!("#{:<3} <unavailable: {}>", entry.index, e);
                continue;
            }
        };
        if option.is_group() {
            println!("[{}]", option.title);
            continue;
        }

        let mut line = format!(
            "#{:<3} {} ({}): {}{}",
            entry.index,
            option.title,
            option.name,
            option.display_value(),
            option.unit_suffix()
        );
        if let Some(constraint) = option.constraint_text(max_listed) {
            line.push_str(&format!("  [{}]", constraint));
        }
        if !option.caps.active {
            line.push_str("  (inactive)");
        } else if !option.caps.settable {
            line.push_str("  (read-only)");
        }
        println!("{}", line);
    }
    Ok(())
}

fn options_json(table: &OptionTable, max_listed: usize) -> serde_json::Value {
    let entries: Vec<_> = table
        .entries()
        .iter()
        .map(|entry| match &entry.option {
            Ok(option) => serde_json::json!({
                "index": entry.index,
                "name": option.name,
                "title": option.title,
                "description": option.description,
                "type": option.kind.type_name(),
                "value": option.display_value(),
                "unit": option.unit_suffix(),
                "constraint": option.constraint_text(max_listed),
                "settable": option.caps.settable,
                "active": option.caps.active,
            }),
            Err(e) => serde_json::json!({
                "index": entry.index,
                "error": e.to_string(),
            }),
        })
        .collect();

    serde_json::json!({
        "device": table.device(),
        "options": entries,
    })
}

async fn scan(
    capturer: &CapturerHandle,
    device: &str,
    assignments: &[String],
    output: PathBuf,
) -> Result<()> {
    capturer.open(device).await?;

    for assignment in assignments {
        let (name, text) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow!("expected NAME=VALUE, got \"{}\"", assignment))?;
        let table = capturer.options();
        let option = table
            .find(name)
            .ok_or_else(|| anyhow!("device \"{}\" has no option \"{}\"", device, name))?;
        let value = option.parse_value(text)?;

        let report = capturer
            .set_option(name, value)
            .await
            .with_context(|| format!("Failed to set {}", assignment))?;
        if report.inexact {
            let actual = report
                .table
                .find(name)
                .map(|o| o.display_value())
                .unwrap_or_default();
            warn!("Device adjusted {} to {}", name, actual);
        }
    }

    let mut events = capturer.subscribe();
    let progress = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ScanEvent::Started { geometry } => info!(
                    "Scanning {}x{} at {} bit",
                    geometry.pixels_per_line,
                    geometry
                        .lines
                        .map(|l| l.to_string())
                        .unwrap_or_else(|| "?".to_string()),
                    geometry.depth
                ),
                ScanEvent::Progress(p) => info!("Progress: {}", p),
                ScanEvent::Cancelling => info!("Cancelling..."),
                ScanEvent::Completed { .. } | ScanEvent::Cancelled | ScanEvent::Failed { .. } => {
                    break
                }
                _ => {}
            }
        }
    });

    let wait = capturer.start_scan().await?.wait();
    tokio::pin!(wait);
    let result = tokio::select! {
        result = &mut wait => result,
        _ = tokio::signal::ctrl_c() => {
            capturer.cancel();
            wait.await
        }
    };
    match &result {
        // ended without any session events
        Err(ScanError::NotOpen | ScanError::WorkerUnavailable) => progress.abort(),
        _ => {
            let _ = progress.await;
        }
    }

    let image = result?;
    tokio::fs::write(&output, &image.data)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Wrote {} bytes ({} lines, {} bpl) to {}",
        image.data.len(),
        image.lines(),
        image.geometry.bytes_per_line,
        output.display()
    );
    Ok(())
}
