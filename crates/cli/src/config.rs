use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

use nordnet_holdings_core::models::config::RawOptions;

/// Account entries keyed by entry id, in id order.
pub type Entries = BTreeMap<String, RawOptions>;

/// Read the entries file: a JSON object mapping entry id to account options.
pub fn load_entries(path: &Path) -> Result<Entries> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    parse_entries(&text).with_context(|| format!("Invalid config file {}", path.display()))
}

pub fn parse_entries(text: &str) -> Result<Entries> {
    let entries: Entries = serde_json::from_str(text)?;
    if entries.is_empty() {
        bail!("no accounts configured");
    }
    Ok(entries)
}
