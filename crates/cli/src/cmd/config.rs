//! Show the effective configuration

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::Path;
use watcher::WatchConfig;

pub fn run(config_path: &Path) -> Result<()> {
    let config = WatchConfig::load(config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    println!("{}", "Configuration".bold());
    let location = if config_path.exists() {
        config_path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", config_path.display())
    };
    println!("{}: {}\n", "Location".dimmed(), location.dimmed());

    println!("{}", "[debounce]".yellow());
    println!("  {} = {}", "delay_ms".cyan(), config.debounce.delay_ms);

    println!("\n{}", "[reconcile]".yellow());
    println!(
        "  {} = {} {}",
        "interval_secs".cyan(),
        config.reconcile.interval_secs,
        if config.reconcile.interval_secs == 0 {
            "(disabled)".dimmed().to_string()
        } else {
            format!("({}s)", config.reconcile.interval_secs).dimmed().to_string()
        }
    );

    let analyzers = &config.analyzers;
    println!("\n{}", "[analyzers]".yellow());
    println!("  {} = {:?}", "source_extensions".cyan(), analyzers.source_extensions);
    println!("  {} = {}", "min_reference_scopes".cyan(), analyzers.min_reference_scopes);
    println!("  {} = {}", "skip_guid_folders".cyan(), analyzers.skip_guid_folders);
    println!(
        "  {} = {:?}",
        "external_dependencies_folder".cyan(),
        analyzers.external_dependencies_folder
    );

    println!("\n{}", "Valid Ranges:".bold());
    println!("  delay_ms: 10-60000");
    println!("  interval_secs: 0-86400 (0 = disabled)");
    println!("  min_reference_scopes: >= 1");

    Ok(())
}
