use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use flashpoint_core::config::{self, ProjectConfig, WarnLevel};
use flashpoint_core::paths;
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// List the project configs in the config directory
    List,

    /// Validate a project config for common mistakes
    Validate {
        /// Project config name (resolved under the config dir) or path
        config: String,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(config_dir: &Path, subcommand: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcommand {
        ConfigSubcommand::List => list(config_dir, json),
        ConfigSubcommand::Validate { config } => validate(config_dir, &config, json),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn list(config_dir: &Path, json: bool) -> anyhow::Result<()> {
    let files = config::discover(config_dir).context("failed to scan config directory")?;

    let mut entries = Vec::new();
    for path in files {
        let entry = match ProjectConfig::load(&path) {
            Ok(cfg) => serde_json::json!({
                "file": path,
                "project": cfg.project,
                "apps": cfg.apps.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
            }),
            Err(e) => serde_json::json!({
                "file": path,
                "error": e.to_string(),
            }),
        };
        entries.push(entry);
    }

    if json {
        return print_json(&entries);
    }

    if entries.is_empty() {
        println!("No project configs in {}.", config_dir.display());
        return Ok(());
    }

    let rows = entries
        .iter()
        .map(|e| {
            let file = e["file"].as_str().unwrap_or_default().to_string();
            match e.get("error").and_then(|v| v.as_str()) {
                Some(err) => vec!["-".to_string(), format!("invalid: {err}"), file],
                None => vec![
                    e["project"].as_str().unwrap_or_default().to_string(),
                    e["apps"]
                        .as_array()
                        .map(|apps| {
                            apps.iter()
                                .filter_map(|a| a.as_str())
                                .collect::<Vec<_>>()
                                .join(", ")
                        })
                        .unwrap_or_default(),
                    file,
                ],
            }
        })
        .collect();
    print_table(&["PROJECT", "APPS", "FILE"], rows);
    Ok(())
}

fn validate(config_dir: &Path, name: &str, json: bool) -> anyhow::Result<()> {
    let path = paths::project_config_path(config_dir, name);
    let config = ProjectConfig::load(&path)
        .with_context(|| format!("failed to load project config {}", path.display()))?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "project": config.project,
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    let has_errors = warnings.iter().any(|w| w.level == WarnLevel::Error);
    if has_errors {
        anyhow::bail!("config validation found errors");
    }

    Ok(())
}
