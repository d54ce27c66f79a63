//! CLI command implementations

pub mod config;
pub mod scan;
pub mod watch;

use owo_colors::OwoColorize;
use ts_core::{EntryHandle, VariantTag};

/// Variant tag, colored and padded for column output
pub(crate) fn tag_label(entry: &EntryHandle) -> String {
    let label = format!("{:<11}", entry.tag().map_or("unknown", VariantTag::as_str));
    match entry.tag() {
        Some(VariantTag::Resolved) => label.green().to_string(),
        Some(VariantTag::Stub) => label.yellow().to_string(),
        Some(VariantTag::Invalidated) => label.red().to_string(),
        None => label.dimmed().to_string(),
    }
}

/// Path column; folders have none
pub(crate) fn path_label(entry: &EntryHandle) -> String {
    match entry.canonical_name() {
        Some(_) => entry.file_path().display().to_string().dimmed().to_string(),
        None => String::new(),
    }
}
