//! Watch a fixture and stream deltas

use crate::cmd::{path_label, tag_label};
use crate::session::Session;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::Path;
use tokio::sync::mpsc;
use watcher::{FixtureWatcher, NamedDelta, RefreshLoop};

/// Buffered change signals / deltas between the tasks
const CHANNEL_CAPACITY: usize = 64;

pub async fn run(config_path: &Path, fixture: &Path, project: Option<&str>, document: Option<&str>) -> Result<()> {
    // 1. Build the session and the refresh loop
    let Session {
        config,
        host,
        analyzers,
        ..
    } = Session::open(config_path, fixture, project, document)?;

    let mut refresh_loop = RefreshLoop::from_config(&config);
    for analyzer in analyzers {
        refresh_loop.push(analyzer);
    }

    // 2. Wire fixture changes -> loop -> terminal
    let (signal_tx, signal_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (delta_tx, mut delta_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let _watcher = FixtureWatcher::spawn(fixture, host, signal_tx)?;
    let loop_task = tokio::spawn(refresh_loop.run(signal_rx, delta_tx));

    println!(
        "{} {} {}",
        "Watching".bold(),
        fixture.display(),
        format!("(debounce {}ms, Ctrl-C to stop)", config.debounce.delay_ms).dimmed()
    );

    // 3. Print until interrupted or the loop stops
    loop {
        tokio::select! {
            named = delta_rx.recv() => match named {
                Some(named) => print_delta(&named),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("{}", "Stopping".dimmed());
                loop_task.abort();
                return Ok(());
            }
        }
    }

    loop_task.await.context("Refresh loop panicked")?
}

fn print_delta(named: &NamedDelta) {
    println!(
        "{} {} {}",
        named.analyzer.cyan(),
        format!("+{}", named.delta.added.len()).green(),
        format!("-{}", named.delta.removed.len()).red()
    );
    for entry in &named.delta.added {
        println!("  {} {} {}  {}", "+".green(), tag_label(entry), entry.name(), path_label(entry));
    }
    for entry in &named.delta.removed {
        println!("  {} {}", "-".red(), entry.key());
    }
}
