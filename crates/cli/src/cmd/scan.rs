//! One-shot scan of a fixture

use crate::cmd::{path_label, tag_label};
use crate::session::Session;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use std::path::Path;

pub fn run(config_path: &Path, fixture: &Path, project: Option<&str>, document: Option<&str>) -> Result<()> {
    // 1. Build the session
    let mut session = Session::open(config_path, fixture, project, document)?;

    // 2. One refresh pass over every analyzer
    for analyzer in &mut session.analyzers {
        analyzer
            .refresh()
            .with_context(|| format!("Analyzer '{}' failed", analyzer.name()))?;
    }

    // 3. Display snapshots
    println!("{}", fixture.display().to_string().bold());
    println!();

    for analyzer in &session.analyzers {
        let snapshot = analyzer.snapshot();
        println!("{} {}", analyzer.name().cyan(), format!("({})", snapshot.len()).dimmed());
        if snapshot.is_empty() {
            println!("  {}", "(none)".dimmed());
        }
        for entry in snapshot {
            println!("  {} {}  {}", tag_label(entry), entry.name(), path_label(entry));
        }
        println!();
    }

    println!(
        "{} analyzers, {} entities",
        session.analyzers.len(),
        session.store.live_count()
    );
    Ok(())
}
