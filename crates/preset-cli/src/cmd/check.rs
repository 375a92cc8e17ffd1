use crate::output::print_json;
use anyhow::Context;
use preset_core::config::{Config, WarnLevel};
use std::path::Path;

pub fn run(path: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "clients": config.clients.len(),
            "groups": config.groups.len(),
            "presets": config.presets.len(),
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!(
            "Config is valid: {} client(s), {} group(s), {} preset(s).",
            config.clients.len(),
            config.groups.len(),
            config.presets.len()
        );
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
